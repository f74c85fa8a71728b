mod context;
mod cpu_registry;
mod io_registry;
mod long_term_scheduler;
mod medium_term_scheduler;
mod process_control_block;
mod process_table;
mod queues;
mod short_term_scheduler;
mod signals;
mod syscall;
mod termination;

#[cfg(test)]
pub(crate) mod testing;

pub mod driver;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use context::{Kernel, QueueSnapshot};
pub use cpu_registry::{CpuIdentification, CpuRegistry};
pub use driver::Driver;
pub use io_registry::{IoDispatch, IoRegistry, IoRequest};
pub use long_term_scheduler::{Admission, LongTermScheduler};
pub use medium_term_scheduler::MediumTermScheduler;
pub use process_control_block::{Pid, ProcessControlBlock, ProcessState, StateTiming};
pub use process_table::{ProcessTable, SharedPcb};
pub use queues::QueueSet;
pub use short_term_scheduler::ShortTermScheduler;
pub use signals::{BlockedEntry, Signals, Wakeup};
pub use syscall::{Syscall, SyscallOutcome, SyscallReport};

// Every mutation under these locks leaves the guarded state consistent,
// so a panic elsewhere never invalidates it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
