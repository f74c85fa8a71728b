use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use super::loader::load_script;

use crate::config::SimulationConfig;
use crate::error::{KernelError, Result};
use crate::kernel::{lock, Pid};
use crate::services::MemoryService;

struct ProcessImage {
    size: usize,
    instructions: Vec<String>,
    data: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    used: usize,
    resident: HashMap<Pid, ProcessImage>,
    swapped: HashMap<Pid, ProcessImage>,
}

/// In-process stand-in for the memory service: a byte budget, one
/// image per process, and a swap area.
pub struct SimulatedMemory {
    capacity: usize,
    scripts_path: PathBuf,
    dump_path: PathBuf,
    state: Mutex<MemoryState>,
}

fn failure(reason: impl ToString) -> KernelError {
    KernelError::unreachable("memory", reason)
}

impl SimulatedMemory {
    pub fn new(config: &SimulationConfig) -> SimulatedMemory {
        SimulatedMemory {
            capacity: config.memory_size,
            scripts_path: config.scripts_path.clone(),
            dump_path: config.dump_path.clone(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn get_remaining_memory(&self) -> usize {
        self.capacity - lock(&self.state).used
    }

    /// Instruction at `pc`, `None` past the end of the script.
    pub fn fetch(&self, pid: Pid, pc: u32) -> Result<Option<String>> {
        let state = lock(&self.state);
        let image = state
            .resident
            .get(&pid)
            .ok_or_else(|| failure(format!("process {pid} is not resident")))?;
        Ok(image.instructions.get(pc as usize).cloned())
    }

    pub fn read(&self, pid: Pid, address: usize, size: usize) -> Result<Vec<u8>> {
        let state = lock(&self.state);
        let image = state
            .resident
            .get(&pid)
            .ok_or_else(|| failure(format!("process {pid} is not resident")))?;
        let end = address
            .checked_add(size)
            .filter(|&end| end <= image.size)
            .ok_or_else(|| failure(format!("read of {size} bytes at {address} is out of bounds")))?;
        Ok(image.data[address..end].to_vec())
    }

    pub fn write(&self, pid: Pid, address: usize, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        let image = state
            .resident
            .get_mut(&pid)
            .ok_or_else(|| failure(format!("process {pid} is not resident")))?;
        let end = address
            .checked_add(bytes.len())
            .filter(|&end| end <= image.size)
            .ok_or_else(|| failure(format!("write of {} bytes at {address} is out of bounds", bytes.len())))?;
        image.data[address..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl MemoryService for SimulatedMemory {
    fn check_capacity(&self, size: usize, _pid: Pid) -> Result<bool> {
        Ok(size <= self.get_remaining_memory())
    }

    fn create(&self, pid: Pid, size: usize, path: &str) -> Result<()> {
        let instructions = load_script(&self.scripts_path.join(path)).map_err(|err| failure(format!("{path}: {err}")))?;

        let mut state = lock(&self.state);
        if state.used + size > self.capacity {
            return Err(failure(format!("no room for process {pid}")));
        }
        state.used += size;
        state.resident.insert(
            pid,
            ProcessImage {
                size,
                instructions,
                data: vec![0; size],
            },
        );
        debug!("memory: process {pid} created with {size} bytes");
        Ok(())
    }

    fn swap_out(&self, pid: Pid) -> Result<()> {
        let mut state = lock(&self.state);
        let image = state
            .resident
            .remove(&pid)
            .ok_or_else(|| failure(format!("process {pid} is not resident")))?;
        state.used -= image.size;
        state.swapped.insert(pid, image);
        debug!("memory: process {pid} swapped out");
        Ok(())
    }

    fn swap_in(&self, pid: Pid) -> Result<()> {
        let mut state = lock(&self.state);
        let size = state
            .swapped
            .get(&pid)
            .map(|image| image.size)
            .ok_or_else(|| failure(format!("process {pid} is not swapped out")))?;
        if state.used + size > self.capacity {
            return Err(failure(format!("no room to swap in process {pid}")));
        }
        if let Some(image) = state.swapped.remove(&pid) {
            state.used += size;
            state.resident.insert(pid, image);
        }
        debug!("memory: process {pid} swapped in");
        Ok(())
    }

    fn dump(&self, pid: Pid) -> Result<()> {
        let data = {
            let state = lock(&self.state);
            state
                .resident
                .get(&pid)
                .map(|image| image.data.clone())
                .ok_or_else(|| failure(format!("process {pid} is not resident")))?
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let file = self.dump_path.join(format!("{pid}-{timestamp}.dmp"));

        fs::create_dir_all(&self.dump_path).map_err(|err| failure(err))?;
        fs::write(&file, data).map_err(|err| failure(err))?;
        info!("memory: dump of process {pid} written to {}", file.display());
        Ok(())
    }

    fn release(&self, pid: Pid) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(image) = state.resident.remove(&pid) {
            state.used -= image.size;
        }
        state.swapped.remove(&pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("kernel-planner-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn memory(name: &str, memory_size: usize) -> SimulatedMemory {
        let dir = scratch_dir(name);
        fs::write(dir.join("proc"), "NOOP\nWRITE 0 hi\nEXIT\n").unwrap();
        SimulatedMemory::new(&SimulationConfig {
            memory_size,
            scripts_path: dir.clone(),
            dump_path: dir.join("dumps"),
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_memory_create_then_fetch() {
        let memory = memory("fetch", 64);
        memory.create(1, 16, "proc").unwrap();

        assert_eq!(memory.fetch(1, 0).unwrap().as_deref(), Some("NOOP"));
        assert_eq!(memory.fetch(1, 2).unwrap().as_deref(), Some("EXIT"));
        assert_eq!(memory.fetch(1, 3).unwrap(), None);
        assert_eq!(memory.get_remaining_memory(), 48);
    }

    #[test]
    fn test_memory_check_capacity() {
        let memory = memory("capacity", 64);
        assert!(memory.check_capacity(64, 1).unwrap());
        memory.create(1, 40, "proc").unwrap();
        assert!(!memory.check_capacity(32, 2).unwrap());
        assert!(memory.check_capacity(24, 2).unwrap());
    }

    #[test]
    fn test_memory_missing_script() {
        let memory = memory("missing", 64);
        assert!(memory.create(1, 16, "nope").is_err());
        assert_eq!(memory.get_remaining_memory(), 64);
    }

    #[test]
    fn test_memory_write_then_read() {
        let memory = memory("rw", 64);
        memory.create(1, 8, "proc").unwrap();
        memory.write(1, 2, b"abc").unwrap();

        assert_eq!(memory.read(1, 2, 3).unwrap(), b"abc");
        assert!(memory.read(1, 6, 3).is_err());
        assert!(memory.write(1, 7, b"xy").is_err());
    }

    #[test]
    fn test_memory_swap_out_frees_space() {
        let memory = memory("swap", 64);
        memory.create(1, 48, "proc").unwrap();
        memory.swap_out(1).unwrap();

        assert_eq!(memory.get_remaining_memory(), 64);
        assert!(memory.fetch(1, 0).is_err());

        memory.create(2, 32, "proc").unwrap();
        assert!(memory.swap_in(1).is_err());
        memory.release(2).unwrap();
        memory.swap_in(1).unwrap();
        assert_eq!(memory.fetch(1, 0).unwrap().as_deref(), Some("NOOP"));
    }

    #[test]
    fn test_memory_dump_writes_file() {
        let memory = memory("dump", 64);
        memory.create(3, 4, "proc").unwrap();
        memory.write(3, 0, b"ok").unwrap();
        memory.dump(3).unwrap();

        let dumps: Vec<_> = fs::read_dir(&memory.dump_path).unwrap().collect();
        assert!(!dumps.is_empty());
        assert!(memory.dump(9).is_err());
    }

    #[test]
    fn test_memory_release_unknown_is_ok() {
        let memory = memory("release", 64);
        memory.release(5).unwrap();
        assert_eq!(memory.get_remaining_memory(), 64);
    }
}
