//! Scripted collaborators for scheduler tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{lock, Kernel, Pid, ProcessState};

use crate::config::test_config;
use crate::error::{KernelError, Result};
use crate::services::{CpuService, IoService, MemoryService};

#[derive(Default)]
pub struct FakeMemory {
    pub deny: AtomicBool,
    pub fail_dump: AtomicBool,
    pub unreachable: AtomicBool,
    pub swap_out_delay_ms: AtomicU64,
    calls: Mutex<Vec<(&'static str, Pid)>>,
}

impl FakeMemory {
    fn record(&self, call: &'static str, pid: Pid) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(KernelError::unreachable("memory", "connection refused"));
        }
        lock(&self.calls).push((call, pid));
        Ok(())
    }

    pub fn calls(&self, call: &str) -> Vec<Pid> {
        lock(&self.calls)
            .iter()
            .filter(|(name, _)| *name == call)
            .map(|&(_, pid)| pid)
            .collect()
    }

    pub fn released(&self) -> Vec<Pid> {
        self.calls("release")
    }
}

impl MemoryService for FakeMemory {
    fn check_capacity(&self, _size: usize, pid: Pid) -> Result<bool> {
        self.record("check_capacity", pid)?;
        Ok(!self.deny.load(Ordering::SeqCst))
    }

    fn create(&self, pid: Pid, _size: usize, _path: &str) -> Result<()> {
        self.record("create", pid)
    }

    fn swap_out(&self, pid: Pid) -> Result<()> {
        lock(&self.calls).push(("swap_out_started", pid));
        thread::sleep(Duration::from_millis(self.swap_out_delay_ms.load(Ordering::SeqCst)));
        self.record("swap_out", pid)
    }

    fn swap_in(&self, pid: Pid) -> Result<()> {
        self.record("swap_in", pid)
    }

    fn dump(&self, pid: Pid) -> Result<()> {
        self.record("dump", pid)?;
        if self.fail_dump.load(Ordering::SeqCst) {
            return Err(KernelError::unreachable("memory", "dump failed"));
        }
        Ok(())
    }

    fn release(&self, pid: Pid) -> Result<()> {
        self.record("release", pid)
    }
}

#[derive(Default)]
pub struct FakeCpu {
    pub unreachable: AtomicBool,
    dispatched: Mutex<Vec<(String, Pid, u32)>>,
    interrupted: Mutex<Vec<(String, Pid)>>,
}

impl FakeCpu {
    pub fn dispatched(&self) -> Vec<Pid> {
        lock(&self.dispatched).iter().map(|(_, pid, _)| *pid).collect()
    }

    pub fn dispatched_on(&self) -> Vec<(String, Pid, u32)> {
        lock(&self.dispatched).clone()
    }

    pub fn interrupted(&self) -> Vec<(String, Pid)> {
        lock(&self.interrupted).clone()
    }
}

impl CpuService for FakeCpu {
    fn dispatch(&self, cpu: &str, pid: Pid, pc: u32) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(KernelError::unreachable("cpu", "connection refused"));
        }
        lock(&self.dispatched).push((cpu.to_string(), pid, pc));
        Ok(())
    }

    fn interrupt(&self, cpu: &str, pid: Pid) -> Result<()> {
        lock(&self.interrupted).push((cpu.to_string(), pid));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIo {
    requests: Mutex<Vec<(String, Pid, u64)>>,
}

impl FakeIo {
    pub fn requests(&self) -> Vec<(String, Pid, u64)> {
        lock(&self.requests).clone()
    }
}

impl IoService for FakeIo {
    fn request_sleep(&self, _ip: &str, _port: u16, device: &str, pid: Pid, duration_ms: u64) -> Result<()> {
        lock(&self.requests).push((device.to_string(), pid, duration_ms));
        Ok(())
    }
}

pub struct Fakes {
    pub memory: Arc<FakeMemory>,
    pub cpu: Arc<FakeCpu>,
    pub io: Arc<FakeIo>,
}

pub fn test_kernel(long_term: &str, short_term: &str, suspension_ms: u64) -> (Arc<Kernel>, Fakes) {
    let mut config = test_config(long_term, short_term, suspension_ms);
    config.devices = vec!["DISCO".to_string()];

    let fakes = Fakes {
        memory: Arc::new(FakeMemory::default()),
        cpu: Arc::new(FakeCpu::default()),
        io: Arc::new(FakeIo::default()),
    };
    let kernel = Kernel::new(config, fakes.memory.clone(), fakes.cpu.clone(), fakes.io.clone());
    (Arc::new(kernel), fakes)
}

/// Walks a fresh process NEW -> READY -> EXEC on `cpu`.
pub fn running_process(kernel: &Kernel, cpu: &str) -> Pid {
    let pid = kernel.create_process("proc", 16);
    kernel.move_process(pid, ProcessState::New, ProcessState::Ready).unwrap();
    kernel.move_process(pid, ProcessState::Ready, ProcessState::Exec).unwrap();
    let mut cpus = kernel.cpus.lock();
    let slot = cpus.iter_mut().find(|slot| slot.id == cpu).unwrap();
    slot.running = Some(pid);
    pid
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
