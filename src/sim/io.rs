use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::debug;

use crate::error::{KernelError, Result};
use crate::kernel::Pid;
use crate::services::{Event, IoService};

/// IO devices that just sleep for the requested time.
pub struct SimulatedIo {
    events: Sender<Event>,
}

impl SimulatedIo {
    pub fn new(events: Sender<Event>) -> SimulatedIo {
        SimulatedIo { events }
    }
}

impl IoService for SimulatedIo {
    fn request_sleep(&self, ip: &str, port: u16, device: &str, pid: Pid, duration_ms: u64) -> Result<()> {
        debug!("{device} ({ip}:{port}): process {pid} sleeps {duration_ms}ms");

        let events = self.events.clone();
        let device = device.to_string();
        thread::Builder::new()
            .name(format!("io-{device}"))
            .spawn(move || {
                thread::sleep(Duration::from_millis(duration_ms));
                let _ = events.send(Event::IoFinished { device, pid });
            })
            .map_err(|err| KernelError::unreachable("io", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn test_io_sleeps_then_reports() {
        let (events, receiver) = unbounded();
        let io = SimulatedIo::new(events);
        let start = Instant::now();
        io.request_sleep("127.0.0.1", 8003, "DISCO", 7, 50).unwrap();

        match receiver.recv_timeout(Duration::from_secs(2)).unwrap() {
            Event::IoFinished { device, pid } => {
                assert_eq!(device, "DISCO");
                assert_eq!(pid, 7);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
