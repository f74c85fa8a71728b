//! Boundaries to the remote collaborators and the events they send back.

use crossbeam_channel::Sender;

use crate::error::Result;
use crate::kernel::{Pid, SyscallOutcome, SyscallReport};

pub trait MemoryService: Send + Sync {
    /// `Ok(false)` means no room right now, not a failure.
    fn check_capacity(&self, size: usize, pid: Pid) -> Result<bool>;

    /// Loads the process image for a freshly admitted process.
    fn create(&self, pid: Pid, size: usize, path: &str) -> Result<()>;

    fn swap_out(&self, pid: Pid) -> Result<()>;

    fn swap_in(&self, pid: Pid) -> Result<()>;

    fn dump(&self, pid: Pid) -> Result<()>;

    fn release(&self, pid: Pid) -> Result<()>;
}

pub trait CpuService: Send + Sync {
    /// Starts `pid` at `pc` on the CPU. The outcome comes back later as
    /// an [`Event::Syscall`].
    fn dispatch(&self, cpu: &str, pid: Pid, pc: u32) -> Result<()>;

    /// Asks the CPU to give `pid` back as soon as possible.
    fn interrupt(&self, cpu: &str, pid: Pid) -> Result<()>;
}

pub trait IoService: Send + Sync {
    /// Fire and forget. Completion arrives as an [`Event::IoFinished`].
    fn request_sleep(&self, ip: &str, port: u16, device: &str, pid: Pid, duration_ms: u64) -> Result<()>;
}

/// What the CPU hears back about a syscall it reported.
pub type SyscallReply = std::result::Result<SyscallOutcome, String>;

/// Everything the transport layer delivers into the kernel.
#[derive(Debug, Clone)]
pub enum Event {
    CpuConnected { id: String, ip: String, port: u16 },
    DeviceConnected { name: String, ip: String, port: u16 },
    DeviceDisconnected { name: String },
    /// `reply` carries the answer back to the reporting CPU.
    Syscall {
        report: SyscallReport,
        reply: Option<Sender<SyscallReply>>,
    },
    IoFinished { device: String, pid: Pid },
}
