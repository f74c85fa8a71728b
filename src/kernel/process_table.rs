use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::{lock, read_lock, write_lock, Pid, ProcessControlBlock};

use crate::error::{KernelError, Result};

pub type SharedPcb = Arc<Mutex<ProcessControlBlock>>;

/// Owns every PCB, indexed by PID. Queues only hold PIDs.
pub struct ProcessTable {
    pcb_map: RwLock<HashMap<Pid, SharedPcb>>,
    next_pid: AtomicU32,
}

impl ProcessTable {
    pub fn new() -> ProcessTable {
        ProcessTable {
            pcb_map: RwLock::new(HashMap::new()),
            next_pid: AtomicU32::new(0),
        }
    }

    pub fn next_pid(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, pcb: ProcessControlBlock) -> SharedPcb {
        let pid = pcb.get_id();
        let pcb = Arc::new(Mutex::new(pcb));
        write_lock(&self.pcb_map).insert(pid, pcb.clone());
        pcb
    }

    pub fn get_pcb_for(&self, pid: Pid) -> Result<SharedPcb> {
        read_lock(&self.pcb_map)
            .get(&pid)
            .cloned()
            .ok_or(KernelError::UnknownProcess(pid))
    }

    /// Runs `f` against the PCB while holding its lock.
    pub fn with_pcb<T>(&self, pid: Pid, f: impl FnOnce(&mut ProcessControlBlock) -> T) -> Result<T> {
        let pcb = self.get_pcb_for(pid)?;
        let mut pcb = lock(&pcb);
        Ok(f(&mut pcb))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        ProcessTable::new()
    }
}
