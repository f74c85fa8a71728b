use thiserror::Error;

use crate::kernel::{Pid, ProcessState};

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("process {pid} is not in {expected}")]
    NotFound { pid: Pid, expected: ProcessState },

    #[error("no process with pid {0}")]
    UnknownProcess(Pid),

    #[error("process {0} is not in any active queue")]
    NotActive(Pid),

    #[error("{service} request failed: {reason}")]
    Unreachable { service: &'static str, reason: String },

    #[error("unrecognized syscall: {0}")]
    UnrecognizedSyscall(String),

    #[error("malformed {name} syscall: {reason}")]
    MalformedSyscall { name: String, reason: String },

    #[error("no IO device named {0}")]
    UnknownDevice(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl KernelError {
    pub fn unreachable(service: &'static str, reason: impl ToString) -> Self {
        KernelError::Unreachable {
            service,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
