use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{lock, Pid, ProcessState};

pub type QueueGuard<'a> = MutexGuard<'a, VecDeque<Pid>>;

/// The seven state queues, each behind its own lock.
///
/// Transitions that touch two queues take both locks through
/// [`QueueSet::lock_pair`], which always acquires them in state order so
/// two opposite transitions can never wait on each other.
pub struct QueueSet {
    queues: [Mutex<VecDeque<Pid>>; 7],
}

impl QueueSet {
    pub fn new() -> QueueSet {
        QueueSet {
            queues: Default::default(),
        }
    }

    pub fn lock(&self, state: ProcessState) -> QueueGuard<'_> {
        lock(&self.queues[state.index()])
    }

    /// Returns `(from, to)` guards. `from` and `to` must differ.
    pub fn lock_pair(&self, from: ProcessState, to: ProcessState) -> (QueueGuard<'_>, QueueGuard<'_>) {
        debug_assert_ne!(from, to);
        if from.index() < to.index() {
            let source = self.lock(from);
            let destination = self.lock(to);
            (source, destination)
        } else {
            let destination = self.lock(to);
            let source = self.lock(from);
            (source, destination)
        }
    }

    /// Every queue, locked in state order.
    pub fn lock_all(&self) -> [QueueGuard<'_>; 7] {
        std::array::from_fn(|index| lock(&self.queues[index]))
    }

    pub fn push(&self, state: ProcessState, pid: Pid) {
        self.lock(state).push_back(pid);
    }

    pub fn front(&self, state: ProcessState) -> Option<Pid> {
        self.lock(state).front().copied()
    }

    pub fn to_vec(&self, state: ProcessState) -> Vec<Pid> {
        self.lock(state).iter().copied().collect()
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        QueueSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_set_keeps_fifo_order() {
        let queues = QueueSet::new();
        queues.push(ProcessState::Ready, 3);
        queues.push(ProcessState::Ready, 1);
        queues.push(ProcessState::Ready, 2);

        assert_eq!(queues.front(ProcessState::Ready), Some(3));
        assert_eq!(queues.to_vec(ProcessState::Ready), vec![3, 1, 2]);
        assert!(queues.to_vec(ProcessState::New).is_empty());
    }

    #[test]
    fn test_queue_set_lock_pair_both_directions() {
        let queues = QueueSet::new();
        queues.push(ProcessState::Blocked, 4);

        {
            let (mut blocked, mut susp) = queues.lock_pair(ProcessState::Blocked, ProcessState::SuspBlocked);
            let pid = blocked.pop_front().unwrap();
            susp.push_back(pid);
        }
        {
            let (mut susp, mut blocked) = queues.lock_pair(ProcessState::SuspBlocked, ProcessState::Blocked);
            let pid = susp.pop_front().unwrap();
            blocked.push_back(pid);
        }

        assert_eq!(queues.to_vec(ProcessState::Blocked), vec![4]);
        assert!(queues.to_vec(ProcessState::SuspBlocked).is_empty());
    }

    #[test]
    fn test_queue_set_lock_all_in_state_order() {
        let queues = QueueSet::new();
        queues.push(ProcessState::Exec, 2);
        queues.push(ProcessState::Exit, 9);

        let all = queues.lock_all();
        assert_eq!(all[ProcessState::Exec.index()].front(), Some(&2));
        assert_eq!(all[ProcessState::Exit.index()].front(), Some(&9));
        assert!(all[ProcessState::New.index()].is_empty());
    }
}
