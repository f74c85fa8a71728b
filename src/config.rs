use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::KernelError;

const MIN_FALLBACK_INTERVAL_MS: u64 = 1000;

/// Order in which NEW and SUSP.READY candidates are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LongTermPolicy {
    #[serde(rename = "FIFO")]
    Fifo,
    /// Smallest process first.
    #[serde(rename = "PMCP")]
    Pmcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ShortTermPolicy {
    #[serde(rename = "FIFO")]
    Fifo,
    #[serde(rename = "SJF")]
    Sjf,
    #[serde(rename = "SJF-preemptive", alias = "SRT")]
    SjfPreemptive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub memory_size: usize,
    pub instruction_delay_ms: u64,
    pub cpus: u32,
    pub scripts_path: PathBuf,
    pub dump_path: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            memory_size: 4096,
            instruction_delay_ms: 100,
            cpus: 1,
            scripts_path: PathBuf::from("scripts"),
            dump_path: PathBuf::from("dumps"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub long_term_policy: LongTermPolicy,
    pub short_term_policy: ShortTermPolicy,
    pub suspension_time_ms: u64,
    #[serde(default = "default_initial_estimate")]
    pub initial_estimate_ms: u64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_fallback_interval")]
    pub fallback_interval_ms: u64,
    #[serde(default)]
    pub auto_start: bool,
    pub memory: Endpoint,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_initial_estimate() -> u64 {
    10_000
}

fn default_alpha() -> f64 {
    0.5
}

fn default_fallback_interval() -> u64 {
    MIN_FALLBACK_INTERVAL_MS
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, KernelError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| KernelError::Config(format!("{}: {err}", path.display())))?;
        raw.parse()
    }

    fn validate(self) -> Result<Config, KernelError> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(KernelError::Config(format!(
                "alpha must be within 0.0..=1.0, got {}",
                self.alpha
            )));
        }
        if self.fallback_interval_ms < MIN_FALLBACK_INTERVAL_MS {
            return Err(KernelError::Config(format!(
                "fallback_interval_ms must be at least {MIN_FALLBACK_INTERVAL_MS}"
            )));
        }
        if self.simulation.cpus == 0 {
            return Err(KernelError::Config("simulation needs at least one cpu".into()));
        }
        Ok(self)
    }

    pub fn suspension_time(&self) -> Duration {
        Duration::from_millis(self.suspension_time_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }
}

impl std::str::FromStr for Config {
    type Err = KernelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(raw).map_err(|err| KernelError::Config(err.to_string()))?;
        config.validate()
    }
}

#[cfg(test)]
pub(crate) fn test_config(long_term: &str, short_term: &str, suspension_ms: u64) -> Config {
    format!(
        r#"
        long_term_policy = "{long_term}"
        short_term_policy = "{short_term}"
        suspension_time_ms = {suspension_ms}
        initial_estimate_ms = 100
        alpha = 0.5
        auto_start = true

        [memory]
        ip = "127.0.0.1"
        port = 8002
        "#
    )
    .parse()
    .unwrap()
}
