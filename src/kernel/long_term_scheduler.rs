use std::sync::Arc;

use log::{debug, error, info};

use super::{Kernel, Pid, ProcessState};

use crate::config::LongTermPolicy;
use crate::error::Result;

/// Result of one admission attempt against a single queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(Pid),
    /// Memory has no room for this candidate yet.
    Denied(Pid),
    Empty,
}

/// Admits NEW and SUSP.READY processes into READY when memory has room.
pub struct LongTermScheduler {
    kernel: Arc<Kernel>,
}

impl LongTermScheduler {
    /// SUSP.READY goes first: those processes already held memory once.
    const CANDIDATE_QUEUES: [ProcessState; 2] = [ProcessState::SuspReady, ProcessState::New];

    pub fn new(kernel: Arc<Kernel>) -> LongTermScheduler {
        LongTermScheduler { kernel }
    }

    pub fn run(&self) {
        let fallback = self.kernel.config.fallback_interval();
        info!("long-term scheduler running ({:?})", self.kernel.config.long_term_policy);

        loop {
            self.kernel.signals.long_term.wait(fallback);
            if self.kernel.is_shutting_down() {
                break;
            }
            if !self.kernel.admission_started() {
                continue;
            }
            self.batch_step();
        }
    }

    /// Next candidate of `queue` under the configured policy.
    fn pick(&self, queue: ProcessState) -> Option<Pid> {
        match self.kernel.config.long_term_policy {
            LongTermPolicy::Fifo => self.kernel.queues.front(queue),
            LongTermPolicy::Pmcp => {
                let candidates = self.kernel.queues.to_vec(queue);
                candidates
                    .into_iter()
                    .filter_map(|pid| {
                        let size = self.kernel.table.with_pcb(pid, |pcb| pcb.get_size()).ok()?;
                        Some((pid, size))
                    })
                    .min_by_key(|&(_, size)| size)
                    .map(|(pid, _)| pid)
            }
        }
    }

    /// Tries to admit one process from `queue`.
    pub fn step(&self, queue: ProcessState) -> Result<Admission> {
        let Some(pid) = self.pick(queue) else {
            return Ok(Admission::Empty);
        };
        let (size, path) = self
            .kernel
            .table
            .with_pcb(pid, |pcb| (pcb.get_size(), pcb.get_path().to_string()))?;

        if !self.kernel.memory.check_capacity(size, pid)? {
            debug!("## ({pid}) does not fit in memory yet ({size} bytes)");
            return Ok(Admission::Denied(pid));
        }

        match queue {
            ProcessState::SuspReady => self.kernel.memory.swap_in(pid)?,
            _ => self.kernel.memory.create(pid, size, &path)?,
        }

        self.kernel.move_process(pid, queue, ProcessState::Ready)?;
        self.kernel.signals.short_term.notify();
        Ok(Admission::Admitted(pid))
    }

    /// Admits as many processes as fit, stopping a queue at its first
    /// candidate that does not.
    pub fn batch_step(&self) -> Vec<Pid> {
        let mut admitted = Vec::new();

        for queue in Self::CANDIDATE_QUEUES {
            loop {
                match self.step(queue) {
                    Ok(Admission::Admitted(pid)) => admitted.push(pid),
                    Ok(Admission::Denied(_)) | Ok(Admission::Empty) => break,
                    Err(err) => {
                        error!("admission from {queue} failed: {err}");
                        break;
                    }
                }
            }
        }

        admitted
    }
}
