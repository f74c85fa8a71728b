use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use log::{error, info};

use super::{BlockedEntry, Kernel, Pid, ProcessState};

use crate::error::{KernelError, Result};

/// What a CPU reports after the process it runs hits a syscall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallReport {
    pub pid: Pid,
    /// Program counter to resume from.
    pub pc: u32,
    pub name: String,
    pub args: Vec<String>,
}

impl SyscallReport {
    pub fn new(pid: Pid, pc: u32, name: &str, args: &[&str]) -> SyscallReport {
        SyscallReport {
            pid,
            pc,
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn parse(&self) -> Result<Syscall> {
        match self.name.as_str() {
            "IO" => Ok(Syscall::Io {
                device: self.arg(0)?.to_string(),
                duration_ms: self.numeric_arg(1)?,
            }),
            "INIT_PROC" => Ok(Syscall::InitProc {
                path: self.arg(0)?.to_string(),
                size: self.numeric_arg(1)?,
            }),
            "DUMP_MEMORY" => Ok(Syscall::DumpMemory),
            "EXIT" => Ok(Syscall::Exit),
            "INTERRUPTED" => Ok(Syscall::Interrupted),
            other => Err(KernelError::UnrecognizedSyscall(other.to_string())),
        }
    }

    fn arg(&self, index: usize) -> Result<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.malformed(format!("missing argument {index}")))
    }

    fn numeric_arg<T: FromStr>(&self, index: usize) -> Result<T> {
        let raw = self.arg(index)?;
        raw.parse()
            .map_err(|_| self.malformed(format!("argument {index} is not a number: {raw}")))
    }

    fn malformed(&self, reason: String) -> KernelError {
        KernelError::MalformedSyscall {
            name: self.name.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syscall {
    Io { device: String, duration_ms: u64 },
    InitProc { path: String, size: usize },
    DumpMemory,
    Exit,
    /// The CPU gave the process back after an interrupt request.
    Interrupted,
}

/// Whether the reporting CPU keeps running the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    Continue,
    Release,
}

impl Kernel {
    pub fn handle_syscall(self: &Arc<Self>, report: &SyscallReport) -> Result<SyscallOutcome> {
        let pid = report.pid;
        let syscall = report.parse().map_err(|err| {
            error!("## ({pid}) - {err}");
            err
        })?;

        let state = self.state_of(pid)?;
        if state != ProcessState::Exec {
            return Err(KernelError::NotFound {
                pid,
                expected: ProcessState::Exec,
            });
        }
        self.table.with_pcb(pid, |pcb| pcb.program_counter = report.pc)?;
        info!("## ({pid}) - requested syscall: {}", report.name);

        match syscall {
            Syscall::Io { device, duration_ms } => self.block_on_io(pid, &device, duration_ms),
            Syscall::InitProc { path, size } => {
                self.create_process(&path, size);
                Ok(SyscallOutcome::Continue)
            }
            Syscall::DumpMemory => self.dump_memory(pid),
            Syscall::Exit => {
                self.terminate(pid)?;
                Ok(SyscallOutcome::Release)
            }
            Syscall::Interrupted => {
                self.leave_cpu(pid, ProcessState::Ready)?;
                Ok(SyscallOutcome::Release)
            }
        }
    }

    /// Moves `pid` out of EXEC and gives its CPU back.
    fn leave_cpu(&self, pid: Pid, to: ProcessState) -> Result<()> {
        self.move_process(pid, ProcessState::Exec, to)?;
        self.cpus.release(pid);
        self.signals.short_term.notify();
        Ok(())
    }

    fn block_on_io(&self, pid: Pid, device: &str, duration_ms: u64) -> Result<SyscallOutcome> {
        if !self.devices.is_known(device) {
            error!("## ({pid}) requested unknown IO device {device}");
            self.terminate(pid)?;
            return Ok(SyscallOutcome::Release);
        }

        self.leave_cpu(pid, ProcessState::Blocked)?;
        let visit = self.table.with_pcb(pid, |pcb| pcb.visits(ProcessState::Blocked))?;
        self.signals.process_blocked(BlockedEntry { pid, visit });
        info!("## ({pid}) - blocked by IO: {device}");

        match self.devices.request(device, pid, duration_ms) {
            Ok(Some(dispatch)) => self.send_io(dispatch),
            Ok(None) => {}
            Err(err) => {
                error!("## ({pid}) IO request failed: {err}");
                self.terminate(pid)?;
            }
        }
        Ok(SyscallOutcome::Release)
    }

    /// The dump runs out of band; the process waits in BLOCKED and is
    /// terminated if the dump fails.
    fn dump_memory(self: &Arc<Self>, pid: Pid) -> Result<SyscallOutcome> {
        self.leave_cpu(pid, ProcessState::Blocked)?;

        let kernel = self.clone();
        thread::spawn(move || {
            let result = match kernel.memory.dump(pid) {
                Ok(()) => kernel
                    .move_process(pid, ProcessState::Blocked, ProcessState::Ready)
                    .map(|()| kernel.signals.short_term.notify()),
                Err(err) => {
                    error!("## ({pid}) memory dump failed: {err}");
                    kernel.terminate(pid)
                }
            };
            if let Err(err) = result {
                error!("## ({pid}) could not leave BLOCKED after dump: {err}");
            }
        });

        Ok(SyscallOutcome::Release)
    }
}
