use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, warn};

use super::SimulatedMemory;

use crate::config::SimulationConfig;
use crate::error::{KernelError, Result};
use crate::kernel::{lock, Pid, SyscallOutcome, SyscallReport};
use crate::services::{CpuService, Event};

/// A pseudocode instruction, decoded from one script line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    Noop,
    Write { address: usize, data: String },
    Read { address: usize, size: usize },
    Goto(u32),
    /// Anything else is handed to the kernel as a syscall.
    Syscall { name: String, args: Vec<String> },
}

fn decode(line: &str) -> Instruction {
    let mut parts = line.split_whitespace();
    let opcode = parts.next().unwrap_or("NOOP");
    let args: Vec<&str> = parts.collect();

    match (opcode, args.as_slice()) {
        ("NOOP", []) => Instruction::Noop,
        ("WRITE", [address, data]) => match address.parse() {
            Ok(address) => Instruction::Write {
                address,
                data: data.to_string(),
            },
            Err(_) => Instruction::Noop,
        },
        ("READ", [address, size]) => match (address.parse(), size.parse()) {
            (Ok(address), Ok(size)) => Instruction::Read { address, size },
            _ => Instruction::Noop,
        },
        ("GOTO", [target]) => target.parse().map(Instruction::Goto).unwrap_or(Instruction::Noop),
        (name, args) => Instruction::Syscall {
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        },
    }
}

/// Per-CPU state shared between the handle and its execution thread.
struct CpuResources {
    id: String,
    memory: Arc<SimulatedMemory>,
    events: Sender<Event>,
    instruction_delay: Duration,
    interrupt_for: Mutex<Option<Pid>>,
}

impl CpuResources {
    fn cycle_loop(&self, dispatches: Receiver<(Pid, u32)>) {
        for (pid, pc) in dispatches.iter() {
            debug!("{}: running process {pid} from pc {pc}", self.id);
            self.execute_process(pid, pc);
        }
    }

    /// Fetch, decode and execute until the process leaves this CPU.
    fn execute_process(&self, pid: Pid, mut pc: u32) {
        loop {
            let line = match self.memory.fetch(pid, pc) {
                Ok(Some(line)) => line,
                Ok(None) => "EXIT".to_string(),
                Err(err) => {
                    error!("{}: fetch failed for process {pid}: {err}", self.id);
                    "EXIT".to_string()
                }
            };
            pc += 1;
            thread::sleep(self.instruction_delay);

            match decode(&line) {
                Instruction::Noop => {}
                Instruction::Write { address, data } => {
                    if let Err(err) = self.memory.write(pid, address, data.as_bytes()) {
                        warn!("{}: process {pid} WRITE failed: {err}", self.id);
                    }
                }
                Instruction::Read { address, size } => match self.memory.read(pid, address, size) {
                    Ok(bytes) => debug!("{}: process {pid} read {:?}", self.id, String::from_utf8_lossy(&bytes)),
                    Err(err) => warn!("{}: process {pid} READ failed: {err}", self.id),
                },
                Instruction::Goto(target) => pc = target,
                Instruction::Syscall { name, args } => {
                    let report = SyscallReport {
                        pid,
                        pc,
                        name,
                        args,
                    };
                    if self.report(report) == SyscallOutcome::Release {
                        return;
                    }
                }
            }

            if self.take_interrupt(pid) {
                self.report(SyscallReport::new(pid, pc, "INTERRUPTED", &[]));
                return;
            }
        }
    }

    fn take_interrupt(&self, pid: Pid) -> bool {
        let mut interrupt_for = lock(&self.interrupt_for);
        if *interrupt_for == Some(pid) {
            *interrupt_for = None;
            return true;
        }
        false
    }

    /// Sends `report` and waits for the kernel's answer. A rejected
    /// syscall ends the process.
    fn report(&self, report: SyscallReport) -> SyscallOutcome {
        let (pid, pc) = (report.pid, report.pc);
        let (reply, answer) = bounded(1);

        if self.events.send(Event::Syscall { report, reply: Some(reply) }).is_err() {
            return SyscallOutcome::Release;
        }
        match answer.recv() {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(reason)) => {
                error!("{}: syscall of process {pid} rejected: {reason}", self.id);
                let exit = SyscallReport::new(pid, pc, "EXIT", &[]);
                let _ = self.events.send(Event::Syscall { report: exit, reply: None });
                SyscallOutcome::Release
            }
            Err(_) => SyscallOutcome::Release,
        }
    }
}

struct CpuHandle {
    resources: Arc<CpuResources>,
    dispatches: Sender<(Pid, u32)>,
}

/// A pool of simulated CPUs, each running processes on its own thread.
pub struct SimulatedCpus {
    cpus: HashMap<String, CpuHandle>,
}

impl SimulatedCpus {
    pub fn spawn(
        config: &SimulationConfig,
        memory: Arc<SimulatedMemory>,
        events: Sender<Event>,
    ) -> std::io::Result<SimulatedCpus> {
        let mut cpus = HashMap::new();

        for number in 1..=config.cpus {
            let id = format!("cpu-{number}");
            let resources = Arc::new(CpuResources {
                id: id.clone(),
                memory: memory.clone(),
                events: events.clone(),
                instruction_delay: Duration::from_millis(config.instruction_delay_ms),
                interrupt_for: Mutex::new(None),
            });
            let (dispatches, receiver) = unbounded();

            let resources_clone = resources.clone();
            thread::Builder::new()
                .name(id.clone())
                .spawn(move || resources_clone.cycle_loop(receiver))?;

            cpus.insert(id, CpuHandle { resources, dispatches });
        }

        Ok(SimulatedCpus { cpus })
    }

    /// CPU ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cpus.keys().cloned().collect();
        ids.sort_by_key(|id| id.trim_start_matches("cpu-").parse::<u32>().unwrap_or(u32::MAX));
        ids
    }

    fn handle(&self, cpu: &str) -> Result<&CpuHandle> {
        self.cpus
            .get(cpu)
            .ok_or_else(|| KernelError::unreachable("cpu", format!("no cpu named {cpu}")))
    }
}

impl CpuService for SimulatedCpus {
    fn dispatch(&self, cpu: &str, pid: Pid, pc: u32) -> Result<()> {
        let handle = self.handle(cpu)?;
        *lock(&handle.resources.interrupt_for) = None;
        handle
            .dispatches
            .send((pid, pc))
            .map_err(|err| KernelError::unreachable("cpu", err))
    }

    fn interrupt(&self, cpu: &str, pid: Pid) -> Result<()> {
        let handle = self.handle(cpu)?;
        *lock(&handle.resources.interrupt_for) = Some(pid);
        Ok(())
    }
}
