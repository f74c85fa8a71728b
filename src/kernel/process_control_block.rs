use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

pub type Pid = u32;

/// Scheduling state of a process. Each state has exactly one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessState {
    New,
    Ready,
    Exec,
    Blocked,
    SuspReady,
    SuspBlocked,
    Exit,
}

impl ProcessState {
    pub const ALL: [ProcessState; 7] = [
        ProcessState::New,
        ProcessState::Ready,
        ProcessState::Exec,
        ProcessState::Blocked,
        ProcessState::SuspReady,
        ProcessState::SuspBlocked,
        ProcessState::Exit,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessState::New => "NEW",
            ProcessState::Ready => "READY",
            ProcessState::Exec => "EXEC",
            ProcessState::Blocked => "BLOCKED",
            ProcessState::SuspReady => "SUSP.READY",
            ProcessState::SuspBlocked => "SUSP.BLOCKED",
            ProcessState::Exit => "EXIT",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Time spent in one state: the open interval (if the process is in it
/// right now) plus every closed interval before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTiming {
    pub started_at: Option<Instant>,
    pub accumulated: Duration,
}

impl StateTiming {
    fn open(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    fn close(&mut self, now: Instant) -> Duration {
        match self.started_at.take() {
            Some(start) => {
                let spent = now.saturating_duration_since(start);
                self.accumulated += spent;
                spent
            }
            None => Duration::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.started_at.is_some()
    }
}

pub struct ProcessControlBlock {
    pub program_counter: u32,
    pub state: ProcessState,

    id: Pid,
    size: usize,
    path: String,

    estimated_burst: Duration,
    last_burst: Option<Duration>,

    visits: HashMap<ProcessState, u32>,
    timings: HashMap<ProcessState, StateTiming>,
}

impl ProcessControlBlock {
    pub fn new(id: Pid, path: String, size: usize, initial_estimate: Duration) -> ProcessControlBlock {
        let mut pcb = ProcessControlBlock {
            program_counter: 0,
            state: ProcessState::New,
            id,
            size,
            path,
            estimated_burst: initial_estimate,
            last_burst: None,
            visits: HashMap::new(),
            timings: HashMap::new(),
        };
        pcb.enter(ProcessState::New, Instant::now());
        pcb
    }

    pub fn get_id(&self) -> Pid {
        self.id
    }

    pub fn get_size(&self) -> usize {
        self.size
    }

    pub fn get_path(&self) -> &str {
        &self.path
    }

    pub fn get_estimated_burst(&self) -> Duration {
        self.estimated_burst
    }

    #[cfg(test)]
    pub(crate) fn set_estimated_burst(&mut self, estimate: Duration) {
        self.estimated_burst = estimate;
    }

    pub fn get_last_burst(&self) -> Option<Duration> {
        self.last_burst
    }

    pub fn visits(&self, state: ProcessState) -> u32 {
        self.visits.get(&state).copied().unwrap_or(0)
    }

    pub fn timing(&self, state: ProcessState) -> StateTiming {
        self.timings.get(&state).copied().unwrap_or_default()
    }

    /// Time elapsed in the current EXEC burst, zero when not executing.
    pub fn exec_elapsed(&self, now: Instant) -> Duration {
        self.timing(ProcessState::Exec)
            .started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or(Duration::ZERO)
    }

    /// Estimated time left in the current burst.
    pub fn remaining_estimate(&self, now: Instant) -> Duration {
        self.estimated_burst.saturating_sub(self.exec_elapsed(now))
    }

    /// Closes the current state's interval and opens `to`'s.
    /// Leaving EXEC folds the finished burst into the SJF estimate.
    pub fn transition(&mut self, to: ProcessState, alpha: f64) {
        let now = Instant::now();
        let from = self.state;
        let spent = self.timings.entry(from).or_default().close(now);

        if from == ProcessState::Exec {
            self.last_burst = Some(spent);
            let next = alpha * spent.as_secs_f64() + (1.0 - alpha) * self.estimated_burst.as_secs_f64();
            self.estimated_burst = Duration::from_secs_f64(next.max(0.0));
        }

        self.enter(to, now);
    }

    /// Closes every open interval; called once on termination.
    pub fn finalize(&mut self) {
        let now = Instant::now();
        for timing in self.timings.values_mut() {
            timing.close(now);
        }
    }

    fn enter(&mut self, state: ProcessState, now: Instant) {
        self.state = state;
        *self.visits.entry(state).or_insert(0) += 1;
        self.timings.entry(state).or_default().open(now);
    }

    pub fn metrics_line(&self) -> String {
        let metrics: Vec<String> = ProcessState::ALL
            .iter()
            .map(|&state| {
                format!(
                    "{} ({}) ({}ms)",
                    state,
                    self.visits(state),
                    self.timing(state).accumulated.as_millis()
                )
            })
            .collect();

        format!("## ({}) - state metrics: {}", self.id, metrics.join(", "))
    }
}
