use std::sync::{Mutex, MutexGuard};

use super::{lock, Pid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuIdentification {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub running: Option<Pid>,
    pub interrupt_pending: bool,
}

impl CpuIdentification {
    pub fn is_free(&self) -> bool {
        self.running.is_none()
    }
}

/// Known CPUs in registration order, with their busy flags.
pub struct CpuRegistry {
    cpus: Mutex<Vec<CpuIdentification>>,
}

impl CpuRegistry {
    pub fn new() -> CpuRegistry {
        CpuRegistry {
            cpus: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Vec<CpuIdentification>> {
        lock(&self.cpus)
    }

    /// Adds a free CPU, or refreshes the endpoint of a known one.
    pub fn register(&self, id: &str, ip: &str, port: u16) {
        let mut cpus = self.lock();
        match cpus.iter_mut().find(|cpu| cpu.id == id) {
            Some(cpu) => {
                cpu.ip = ip.to_string();
                cpu.port = port;
            }
            None => cpus.push(CpuIdentification {
                id: id.to_string(),
                ip: ip.to_string(),
                port,
                running: None,
                interrupt_pending: false,
            }),
        }
    }

    /// Frees the CPU running `pid`, returning its id.
    pub fn release(&self, pid: Pid) -> Option<String> {
        let mut cpus = self.lock();
        let cpu = cpus.iter_mut().find(|cpu| cpu.running == Some(pid))?;
        cpu.running = None;
        cpu.interrupt_pending = false;
        Some(cpu.id.clone())
    }

    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        self.lock().iter().filter(|cpu| cpu.is_free()).count()
    }
}

impl Default for CpuRegistry {
    fn default() -> Self {
        CpuRegistry::new()
    }
}
