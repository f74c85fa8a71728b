use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::{
    lock, CpuRegistry, IoDispatch, IoRegistry, Pid, ProcessControlBlock, ProcessState, ProcessTable,
    QueueSet, Signals,
};

use crate::config::Config;
use crate::error::{KernelError, Result};
use crate::services::{CpuService, Event, IoService, MemoryService};

/// Queue contents at one instant, indexed by [`ProcessState::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    queues: [Vec<Pid>; 7],
}

impl QueueSnapshot {
    pub fn get(&self, state: ProcessState) -> &[Pid] {
        &self.queues[state.index()]
    }

    /// The queue holding `pid`, if any.
    pub fn state_of(&self, pid: Pid) -> Option<ProcessState> {
        ProcessState::ALL
            .into_iter()
            .find(|&state| self.get(state).contains(&pid))
    }

    pub fn is_all_exited(&self) -> bool {
        ProcessState::ALL
            .into_iter()
            .filter(|&state| state != ProcessState::Exit)
            .all(|state| self.get(state).is_empty())
    }
}

/// Shared scheduler state: process table, queues, registries and the
/// collaborator handles. Each tier holds an `Arc<Kernel>`.
pub struct Kernel {
    pub config: Config,
    pub table: ProcessTable,
    pub queues: QueueSet,
    pub signals: Signals,
    pub cpus: CpuRegistry,
    pub devices: IoRegistry,

    pub(crate) memory: Arc<dyn MemoryService>,
    pub(crate) cpu: Arc<dyn CpuService>,
    pub(crate) io: Arc<dyn IoService>,

    admission_started: AtomicBool,
    shutting_down: AtomicBool,
}

impl Kernel {
    pub fn new(
        config: Config,
        memory: Arc<dyn MemoryService>,
        cpu: Arc<dyn CpuService>,
        io: Arc<dyn IoService>,
    ) -> Kernel {
        let devices = IoRegistry::new(&config.devices);
        let admission_started = AtomicBool::new(config.auto_start);

        Kernel {
            config,
            table: ProcessTable::new(),
            queues: QueueSet::new(),
            signals: Signals::new(),
            cpus: CpuRegistry::new(),
            devices,
            memory,
            cpu,
            io,
            admission_started,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn create_process(&self, path: &str, size: usize) -> Pid {
        let pid = self.table.next_pid();
        let initial_estimate = std::time::Duration::from_millis(self.config.initial_estimate_ms);
        self.table
            .insert(ProcessControlBlock::new(pid, path.to_string(), size, initial_estimate));
        self.queues.push(ProcessState::New, pid);

        info!("## ({pid}) process created - state: NEW");
        self.signals.long_term.notify();
        pid
    }

    pub fn start_admission(&self) {
        if !self.admission_started.swap(true, Ordering::SeqCst) {
            info!("long-term scheduler started");
        }
        self.signals.long_term.notify();
    }

    pub fn admission_started(&self) -> bool {
        self.admission_started.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.signals.long_term.notify();
        self.signals.short_term.notify();
        self.signals.medium_term.notify();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, pid: Pid) -> Result<ProcessState> {
        self.table.with_pcb(pid, |pcb| pcb.state)
    }

    pub fn move_process(&self, pid: Pid, from: ProcessState, to: ProcessState) -> Result<()> {
        self.move_process_if(pid, from, to, |_| true).map(|_| ())
    }

    /// Moves `pid` from `from` to `to` if it is in `from` and `condition`
    /// holds for its PCB. Membership check, move and metrics update
    /// happen under both queue locks.
    pub fn move_process_if(
        &self,
        pid: Pid,
        from: ProcessState,
        to: ProcessState,
        condition: impl FnOnce(&ProcessControlBlock) -> bool,
    ) -> Result<bool> {
        let (mut source, mut destination) = self.queues.lock_pair(from, to);
        self.transfer(pid, from, to, &mut source, &mut destination, condition)
    }

    /// Same as [`Kernel::move_process`] but puts `pid` at the head of `to`.
    /// Used to undo a move whose collaborator call failed.
    pub fn restore_process(&self, pid: Pid, from: ProcessState, to: ProcessState) -> Result<()> {
        let (mut source, mut destination) = self.queues.lock_pair(from, to);
        self.transfer(pid, from, to, &mut source, &mut destination, |_| true)?;
        if let Some(position) = destination.iter().rposition(|&queued| queued == pid) {
            destination.remove(position);
            destination.push_front(pid);
        }
        Ok(())
    }

    /// Moves `pid` between two queues whose locks the caller already holds.
    pub(crate) fn transfer(
        &self,
        pid: Pid,
        from: ProcessState,
        to: ProcessState,
        source: &mut VecDeque<Pid>,
        destination: &mut VecDeque<Pid>,
        condition: impl FnOnce(&ProcessControlBlock) -> bool,
    ) -> Result<bool> {
        let pcb = self.table.get_pcb_for(pid)?;
        let position = source
            .iter()
            .position(|&queued| queued == pid)
            .ok_or(KernelError::NotFound { pid, expected: from })?;

        let mut pcb = lock(&pcb);
        if !condition(&pcb) {
            return Ok(false);
        }

        source.remove(position);
        destination.push_back(pid);
        pcb.transition(to, self.config.alpha);

        info!("## ({pid}) moved from {from} to {to}");
        Ok(true)
    }

    /// Queue contents taken under every queue lock at once, so a process
    /// moving between queues is seen in exactly one of them.
    pub fn snapshot(&self) -> QueueSnapshot {
        let all = self.queues.lock_all();
        QueueSnapshot {
            queues: std::array::from_fn(|index| all[index].iter().copied().collect()),
        }
    }

    pub fn register_cpu(&self, id: &str, ip: &str, port: u16) {
        self.cpus.register(id, ip, port);
        info!("cpu {id} connected at {ip}:{port}");
        self.signals.short_term.notify();
    }

    pub fn register_device(&self, name: &str, ip: &str, port: u16) {
        info!("IO device {name} connected at {ip}:{port}");
        if let Some(dispatch) = self.devices.register(name, ip, port) {
            self.send_io(dispatch);
        }
    }

    /// Every process executing on or waiting for the device is terminated.
    pub fn unregister_device(&self, name: &str) {
        warn!("IO device {name} disconnected");
        for pid in self.devices.unregister(name) {
            if let Err(err) = self.terminate(pid) {
                error!("## ({pid}) could not be terminated after {name} disconnected: {err}");
            }
        }
    }

    /// Sends a request to its device. A device that cannot be reached
    /// takes the requesting process down with it.
    pub(crate) fn send_io(&self, dispatch: IoDispatch) {
        let IoDispatch { device, ip, port, request } = dispatch;
        debug!("## ({}) IO started on {device} for {}ms", request.pid, request.duration_ms);

        if let Err(err) = self.io.request_sleep(&ip, port, &device, request.pid, request.duration_ms) {
            error!("## ({}) IO request to {device} failed: {err}", request.pid);
            if let Err(err) = self.terminate(request.pid) {
                error!("## ({}) could not be terminated: {err}", request.pid);
            }
        }
    }

    /// A device finished `pid`'s request: start the next one on that
    /// device and hand `pid` to the medium-term resumption path.
    pub fn io_finished(&self, device: &str, pid: Pid) -> Result<ProcessState> {
        info!("## ({pid}) finished IO");
        if let Some(next) = self.devices.finish(device, pid)? {
            self.send_io(next);
        }
        self.resume_after_io(pid)
    }

    pub fn handle_event(self: &Arc<Self>, event: Event) -> Result<()> {
        match event {
            Event::CpuConnected { id, ip, port } => self.register_cpu(&id, &ip, port),
            Event::DeviceConnected { name, ip, port } => self.register_device(&name, &ip, port),
            Event::DeviceDisconnected { name } => self.unregister_device(&name),
            Event::Syscall { report, reply } => {
                let outcome = self.handle_syscall(&report);
                if let Some(reply) = reply {
                    let response = outcome.as_ref().copied().map_err(|err| err.to_string());
                    // The caller may have stopped waiting.
                    let _ = reply.send(response);
                }
                outcome?;
            }
            Event::IoFinished { device, pid } => {
                self.io_finished(&device, pid)?;
            }
        }
        Ok(())
    }
}
