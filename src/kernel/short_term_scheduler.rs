use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};

use super::{Kernel, Pid, ProcessState};

use crate::config::ShortTermPolicy;
use crate::error::Result;

/// Binds READY processes to free CPUs.
pub struct ShortTermScheduler {
    kernel: Arc<Kernel>,
}

/// A dispatch decided under the locks, sent after releasing them.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Dispatch {
    cpu: String,
    pid: Pid,
    pc: u32,
}

impl ShortTermScheduler {
    pub fn new(kernel: Arc<Kernel>) -> ShortTermScheduler {
        ShortTermScheduler { kernel }
    }

    pub fn run(&self) {
        let fallback = self.kernel.config.fallback_interval();
        info!("short-term scheduler running ({:?})", self.kernel.config.short_term_policy);

        loop {
            self.kernel.signals.short_term.wait(fallback);
            if self.kernel.is_shutting_down() {
                break;
            }
            self.schedule_all();
        }
    }

    /// Dispatches until READY is empty or no CPU is free, then checks
    /// whether a running process should be preempted.
    pub fn schedule_all(&self) -> Vec<Pid> {
        let mut dispatched = Vec::new();
        loop {
            match self.schedule_next() {
                Ok(Some(pid)) => dispatched.push(pid),
                Ok(None) => break,
                Err(err) => {
                    error!("dispatch failed: {err}");
                    break;
                }
            }
        }

        if self.kernel.config.short_term_policy == ShortTermPolicy::SjfPreemptive {
            if let Err(err) = self.check_preemption() {
                error!("preemption failed: {err}");
            }
        }
        dispatched
    }

    /// Position in READY of the next process to run.
    fn select(&self, ready: &VecDeque<Pid>) -> Option<usize> {
        match self.kernel.config.short_term_policy {
            ShortTermPolicy::Fifo => (!ready.is_empty()).then_some(0),
            ShortTermPolicy::Sjf | ShortTermPolicy::SjfPreemptive => ready
                .iter()
                .enumerate()
                .filter_map(|(position, &pid)| {
                    let estimate = self.kernel.table.with_pcb(pid, |pcb| pcb.get_estimated_burst()).ok()?;
                    Some((position, estimate))
                })
                .min_by_key(|&(_, estimate)| estimate)
                .map(|(position, _)| position),
        }
    }

    /// Moves one READY process to EXEC on the first free CPU. Picking
    /// the CPU, marking it busy and moving the process happen under the
    /// registry lock so no CPU is ever handed two processes.
    pub fn schedule_next(&self) -> Result<Option<Pid>> {
        let dispatch = {
            let mut cpus = self.kernel.cpus.lock();
            let Some(cpu) = cpus.iter_mut().find(|cpu| cpu.is_free()) else {
                return Ok(None);
            };

            let (mut ready, mut exec) = self.kernel.queues.lock_pair(ProcessState::Ready, ProcessState::Exec);
            let Some(position) = self.select(&ready) else {
                return Ok(None);
            };
            let pid = ready[position];
            self.kernel
                .transfer(pid, ProcessState::Ready, ProcessState::Exec, &mut ready, &mut exec, |_| true)?;

            cpu.running = Some(pid);
            cpu.interrupt_pending = false;
            let pc = self.kernel.table.with_pcb(pid, |pcb| pcb.program_counter)?;
            Dispatch {
                cpu: cpu.id.clone(),
                pid,
                pc,
            }
        };

        if let Err(err) = self.kernel.cpu.dispatch(&dispatch.cpu, dispatch.pid, dispatch.pc) {
            self.kernel
                .restore_process(dispatch.pid, ProcessState::Exec, ProcessState::Ready)?;
            self.kernel.cpus.release(dispatch.pid);
            return Err(err);
        }

        info!("## ({}) dispatched to cpu {} at pc {}", dispatch.pid, dispatch.cpu, dispatch.pc);
        Ok(Some(dispatch.pid))
    }

    /// With every CPU busy, interrupts the running process with the most
    /// estimated time left if some READY process would finish sooner.
    pub fn check_preemption(&self) -> Result<Option<Pid>> {
        let now = Instant::now();
        let (cpu, victim, challenger) = {
            let mut cpus = self.kernel.cpus.lock();
            if cpus.is_empty() || cpus.iter().any(|cpu| cpu.is_free()) {
                return Ok(None);
            }

            let challenger = {
                let ready = self.kernel.queues.lock(ProcessState::Ready);
                let Some(position) = self.select(&ready) else {
                    return Ok(None);
                };
                let pid = ready[position];
                let estimate = self.kernel.table.with_pcb(pid, |pcb| pcb.get_estimated_burst())?;
                (pid, estimate)
            };

            let mut longest = None;
            for (index, cpu) in cpus.iter().enumerate() {
                let Some(running) = cpu.running else { continue };
                if cpu.interrupt_pending {
                    continue;
                }
                let remaining = self.kernel.table.with_pcb(running, |pcb| pcb.remaining_estimate(now))?;
                if longest.map_or(true, |(_, _, best)| remaining > best) {
                    longest = Some((index, running, remaining));
                }
            }

            let Some((index, victim, remaining)) = longest else {
                return Ok(None);
            };
            if challenger.1 >= remaining {
                return Ok(None);
            }

            cpus[index].interrupt_pending = true;
            (cpus[index].id.clone(), victim, challenger.0)
        };

        info!("## ({victim}) - preempted by process ({challenger})");
        if let Err(err) = self.kernel.cpu.interrupt(&cpu, victim) {
            if let Some(slot) = self.kernel.cpus.lock().iter_mut().find(|slot| slot.id == cpu) {
                slot.interrupt_pending = false;
            }
            return Err(err);
        }
        Ok(Some(victim))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::kernel::testing::{running_process, test_kernel};

    fn ready_process(kernel: &Kernel, estimate_ms: u64) -> Pid {
        let pid = kernel.create_process("proc", 16);
        kernel.move_process(pid, ProcessState::New, ProcessState::Ready).unwrap();
        set_estimate(kernel, pid, estimate_ms);
        pid
    }

    fn set_estimate(kernel: &Kernel, pid: Pid, estimate_ms: u64) {
        kernel
            .table
            .with_pcb(pid, |pcb| pcb.set_estimated_burst(Duration::from_millis(estimate_ms)))
            .unwrap();
    }

    #[test]
    fn test_short_term_scheduler_fifo_order_single_cpu() {
        let (kernel, fakes) = test_kernel("FIFO", "FIFO", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let a = ready_process(&kernel, 300);
        let b = ready_process(&kernel, 100);
        let c = ready_process(&kernel, 200);

        for expected in [a, b, c] {
            assert_eq!(sts.schedule_all(), vec![expected]);
            assert_eq!(sts.schedule_all(), Vec::<Pid>::new());
            kernel.move_process(expected, ProcessState::Exec, ProcessState::Exit).unwrap();
            kernel.cpus.release(expected);
        }
        assert_eq!(fakes.cpu.dispatched(), vec![a, b, c]);
    }

    #[test]
    fn test_short_term_scheduler_one_cpu_two_ready() {
        let (kernel, fakes) = test_kernel("FIFO", "FIFO", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let first = ready_process(&kernel, 100);
        let second = ready_process(&kernel, 100);

        assert_eq!(sts.schedule_all(), vec![first]);
        let snapshot = kernel.snapshot();
        assert_eq!(snapshot.get(ProcessState::Exec), &[first]);
        assert_eq!(snapshot.get(ProcessState::Ready), &[second]);
        assert_eq!(fakes.cpu.dispatched_on(), vec![("cpu-1".to_string(), first, 0)]);
    }

    #[test]
    fn test_short_term_scheduler_uses_every_free_cpu() {
        let (kernel, fakes) = test_kernel("FIFO", "FIFO", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        kernel.register_cpu("cpu-2", "127.0.0.1", 8005);
        let sts = ShortTermScheduler::new(kernel.clone());
        let first = ready_process(&kernel, 100);
        let second = ready_process(&kernel, 100);

        assert_eq!(sts.schedule_all(), vec![first, second]);
        let cpus: Vec<String> = fakes.cpu.dispatched_on().into_iter().map(|(cpu, _, _)| cpu).collect();
        assert_eq!(cpus, vec!["cpu-1", "cpu-2"]);
    }

    #[test]
    fn test_short_term_scheduler_sjf_picks_shortest() {
        let (kernel, _) = test_kernel("FIFO", "SJF", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let _long = ready_process(&kernel, 500);
        let short = ready_process(&kernel, 50);
        let _tie = ready_process(&kernel, 50);

        assert_eq!(sts.schedule_all(), vec![short]);
    }

    #[test]
    fn test_short_term_scheduler_unreachable_cpu_rolls_back() {
        let (kernel, fakes) = test_kernel("FIFO", "FIFO", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let first = ready_process(&kernel, 100);
        let second = ready_process(&kernel, 100);
        fakes.cpu.unreachable.store(true, Ordering::SeqCst);

        assert!(sts.schedule_next().is_err());
        assert_eq!(kernel.snapshot().get(ProcessState::Ready), &[first, second]);
        assert_eq!(kernel.cpus.free_count(), 1);
    }

    #[test]
    fn test_short_term_scheduler_no_cpu_no_dispatch() {
        let (kernel, _) = test_kernel("FIFO", "FIFO", 100);
        let sts = ShortTermScheduler::new(kernel.clone());
        let pid = ready_process(&kernel, 100);

        assert_eq!(sts.schedule_next().unwrap(), None);
        assert_eq!(kernel.snapshot().get(ProcessState::Ready), &[pid]);
    }

    #[test]
    fn test_short_term_scheduler_preempts_longest_remaining() {
        let (kernel, fakes) = test_kernel("FIFO", "SJF-preemptive", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let running = running_process(&kernel, "cpu-1");
        set_estimate(&kernel, running, 10_000);
        let short = ready_process(&kernel, 10);

        assert_eq!(sts.check_preemption().unwrap(), Some(running));
        assert_eq!(fakes.cpu.interrupted(), vec![("cpu-1".to_string(), running)]);
        assert_eq!(kernel.snapshot().get(ProcessState::Ready), &[short]);

        // One outstanding interrupt per CPU.
        assert_eq!(sts.check_preemption().unwrap(), None);
    }

    #[test]
    fn test_short_term_scheduler_no_preemption_when_running_is_shorter() {
        let (kernel, fakes) = test_kernel("FIFO", "SJF-preemptive", 100);
        kernel.register_cpu("cpu-1", "127.0.0.1", 8004);
        let sts = ShortTermScheduler::new(kernel.clone());
        let running = running_process(&kernel, "cpu-1");
        set_estimate(&kernel, running, 10);
        ready_process(&kernel, 10_000);

        assert_eq!(sts.check_preemption().unwrap(), None);
        assert!(fakes.cpu.interrupted().is_empty());
    }
}
