use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info};

use super::*;

use crate::services::Event;

const EVENT_POLL: Duration = Duration::from_millis(100);

/// Runs the three scheduling tiers and feeds transport events into the
/// kernel.
pub struct Driver {
    kernel: Arc<Kernel>,
    events: Receiver<Event>,
    tiers: Vec<JoinHandle<()>>,
}

impl Driver {
    pub fn new(kernel: Arc<Kernel>, events: Receiver<Event>) -> Driver {
        Driver {
            kernel,
            events,
            tiers: Vec::new(),
        }
    }

    pub fn start(&mut self) -> io::Result<()> {
        info!("Starting the driver.");

        let lts = LongTermScheduler::new(self.kernel.clone());
        let sts = ShortTermScheduler::new(self.kernel.clone());
        let mts = MediumTermScheduler::new(self.kernel.clone());

        self.tiers.push(thread::Builder::new().name("long-term".into()).spawn(move || lts.run())?);
        self.tiers.push(thread::Builder::new().name("short-term".into()).spawn(move || sts.run())?);
        self.tiers.push(thread::Builder::new().name("medium-term".into()).spawn(move || mts.run())?);
        Ok(())
    }

    /// Handles events until `done` holds for the kernel.
    pub fn run_until(&self, done: impl Fn(&Kernel) -> bool) {
        while !done(self.kernel.as_ref()) {
            match self.events.recv_timeout(EVENT_POLL) {
                Ok(event) => {
                    if let Err(err) = self.kernel.handle_event(event) {
                        error!("event failed: {err}");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// One metrics line per process that reached EXIT.
    pub fn report(&self) -> Vec<String> {
        self.kernel
            .snapshot()
            .get(ProcessState::Exit)
            .iter()
            .filter_map(|&pid| self.kernel.table.with_pcb(pid, |pcb| pcb.metrics_line()).ok())
            .collect()
    }

    pub fn shutdown(self) {
        info!("Shutting down the driver.");
        self.kernel.shutdown();
        for tier in self.tiers {
            if tier.join().is_err() {
                error!("a scheduler tier panicked");
            }
        }
    }
}
