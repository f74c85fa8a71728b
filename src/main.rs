use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use env_logger::Builder as LogBuilder;
use log::{info, LevelFilter};

use kernel_planner::config::Config;
use kernel_planner::kernel::{Driver, Kernel};
use kernel_planner::services::Event;
use kernel_planner::sim::{SimulatedCpus, SimulatedIo, SimulatedMemory};

/// Runs the process planner against simulated memory, CPUs and devices.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Pseudocode file of the first process, relative to the scripts path.
    script: String,

    /// Size of the first process in bytes.
    size: usize,

    #[arg(short, long, default_value = "kernel.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config).context("Failed to load the configuration")?;

    let level: LevelFilter = config
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level {:?}", config.log_level))?;
    LogBuilder::new().filter_level(level).parse_default_env().init();

    info!("kernel-planner {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "memory service at {}:{} (simulated, {} bytes)",
        config.memory.ip, config.memory.port, config.simulation.memory_size
    );

    let (events, receiver) = unbounded();
    let memory = Arc::new(SimulatedMemory::new(&config.simulation));
    let cpus = SimulatedCpus::spawn(&config.simulation, memory.clone(), events.clone())
        .context("Failed to start the simulated CPUs")?;
    let io = Arc::new(SimulatedIo::new(events.clone()));

    for (number, id) in cpus.ids().into_iter().enumerate() {
        events.send(Event::CpuConnected {
            id,
            ip: "127.0.0.1".to_string(),
            port: 8100 + number as u16,
        })?;
    }
    for (number, name) in config.devices.iter().enumerate() {
        events.send(Event::DeviceConnected {
            name: name.clone(),
            ip: "127.0.0.1".to_string(),
            port: 8200 + number as u16,
        })?;
    }

    let auto_start = config.auto_start;
    let kernel = Arc::new(Kernel::new(config, memory, Arc::new(cpus), io));
    kernel.create_process(&args.script, args.size);

    let mut driver = Driver::new(kernel.clone(), receiver);
    driver.start().context("Failed to start the schedulers")?;

    if !auto_start {
        println!("Press Enter to start admitting processes.");
        let kernel = kernel.clone();
        thread::Builder::new().name("operator".into()).spawn(move || {
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).is_ok() {
                kernel.start_admission();
            }
        })?;
    }

    driver.run_until(|kernel| kernel.snapshot().is_all_exited());

    for line in driver.report() {
        println!("{line}");
    }
    driver.shutdown();
    Ok(())
}

