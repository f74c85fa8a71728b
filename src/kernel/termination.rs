use log::{error, info};

use super::{lock, Kernel, Pid, ProcessState};

use crate::error::{KernelError, Result};

impl Kernel {
    /// Retires `pid` from whichever queue holds it.
    ///
    /// The process lands in EXIT with every timing interval closed, its
    /// CPU and device slots are given back and memory is asked to drop
    /// its allocation. The long-term scheduler is woken afterwards since
    /// capacity may have changed.
    pub fn terminate(&self, pid: Pid) -> Result<()> {
        // Another tier may move the process between reading its state and
        // taking the queue locks; retry from its new queue in that case.
        loop {
            let state = self.state_of(pid)?;
            if state == ProcessState::Exit {
                return Err(KernelError::NotActive(pid));
            }
            match self.move_process(pid, state, ProcessState::Exit) {
                Ok(()) => break,
                Err(KernelError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        let pcb = self.table.get_pcb_for(pid)?;
        let metrics = {
            let mut pcb = lock(&pcb);
            pcb.finalize();
            pcb.metrics_line()
        };
        info!("## ({pid}) - finished");
        info!("{metrics}");

        if self.cpus.release(pid).is_some() {
            self.signals.short_term.notify();
        }
        for dispatch in self.devices.cancel(pid) {
            self.send_io(dispatch);
        }
        if let Err(err) = self.memory.release(pid) {
            error!("## ({pid}) memory release failed: {err}");
        }

        self.signals.long_term.notify();
        Ok(())
    }
}
