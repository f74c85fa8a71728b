use std::sync::Arc;
use std::thread;

use crossbeam_channel::select;
use log::{debug, error, info};

use super::{BlockedEntry, Kernel, Pid, ProcessState};

use crate::error::{KernelError, Result};

/// Suspends processes that stay BLOCKED too long.
///
/// Each BLOCKED entry arms a one-shot timer. Timers are never cancelled:
/// when one fires it moves the process only if it is still in BLOCKED on
/// the same visit, checked under the BLOCKED queue lock that IO
/// completion also takes.
pub struct MediumTermScheduler {
    kernel: Arc<Kernel>,
}

impl MediumTermScheduler {
    pub fn new(kernel: Arc<Kernel>) -> MediumTermScheduler {
        MediumTermScheduler { kernel }
    }

    pub fn run(&self) {
        let entries = self.kernel.signals.blocked_entries();
        let fallback = self.kernel.config.fallback_interval();
        info!("medium-term scheduler running (suspension after {:?})", self.kernel.config.suspension_time());
        let stop = self.kernel.signals.medium_term.receiver();

        loop {
            let received = select! {
                recv(entries) -> entry => entry.map(Some),
                recv(stop) -> _ => Ok(None),
                default(fallback) => Ok(None),
            };
            match received {
                Ok(Some(entry)) => self.arm(entry),
                Ok(None) => {}
                Err(_) => break,
            }
            if self.kernel.is_shutting_down() {
                break;
            }
        }
    }

    fn arm(&self, entry: BlockedEntry) {
        let kernel = self.kernel.clone();
        let delay = kernel.config.suspension_time();
        debug!("## ({}) suspension timer armed for {delay:?}", entry.pid);

        thread::spawn(move || {
            thread::sleep(delay);
            if let Err(err) = kernel.suspend_if_still_blocked(entry) {
                error!("## ({}) suspension failed: {err}", entry.pid);
            }
        });
    }
}

impl Kernel {
    /// Timer expiry for `entry`. Returns whether the process was suspended.
    ///
    /// BLOCKED and SUSP.BLOCKED stay locked from the visit check through
    /// `swap_out` to the move, so IO completion either sees the process
    /// still BLOCKED or already suspended and swapped out. A failed swap
    /// leaves it in BLOCKED.
    pub fn suspend_if_still_blocked(&self, entry: BlockedEntry) -> Result<bool> {
        let BlockedEntry { pid, visit } = entry;
        let (mut blocked, mut suspended) = self.queues.lock_pair(ProcessState::Blocked, ProcessState::SuspBlocked);

        let still_blocked = blocked.contains(&pid)
            && self.table.with_pcb(pid, |pcb| pcb.visits(ProcessState::Blocked) == visit)?;
        if !still_blocked {
            debug!("## ({pid}) left BLOCKED before its suspension timer fired");
            return Ok(false);
        }

        self.memory.swap_out(pid)?;
        self.transfer(pid, ProcessState::Blocked, ProcessState::SuspBlocked, &mut blocked, &mut suspended, |_| true)?;
        drop((blocked, suspended));

        self.signals.long_term.notify();
        Ok(true)
    }

    /// IO finished for `pid`. A suspended process goes to SUSP.READY and
    /// has to be admitted again; one that is still BLOCKED goes straight
    /// to READY. Returns the state it landed in.
    pub fn resume_after_io(&self, pid: Pid) -> Result<ProcessState> {
        match self.move_process(pid, ProcessState::Blocked, ProcessState::Ready) {
            Ok(()) => {
                self.signals.short_term.notify();
                return Ok(ProcessState::Ready);
            }
            Err(KernelError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        self.move_process(pid, ProcessState::SuspBlocked, ProcessState::SuspReady)?;
        self.signals.long_term.notify();
        Ok(ProcessState::SuspReady)
    }
}
