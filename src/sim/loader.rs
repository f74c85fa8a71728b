use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads a pseudocode file, one instruction per line. Blank lines and
/// `#` comments are skipped.
pub fn load_script(path: &Path) -> std::io::Result<Vec<String>> {
    let file = File::open(path)?;
    parse_script(BufReader::new(file))
}

fn parse_script(reader: impl BufRead) -> std::io::Result<Vec<String>> {
    let mut instructions = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        instructions.push(line.to_string());
    }

    Ok(instructions)
}
