use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<(String, String)> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some((prefixed, v));
        }
    }
    env_opt(key).map(|v| (key.to_string(), v))
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str) -> Result<Option<T>, ConfigError> {
    match profiled_env_opt(profile, key) {
        None => Ok(None),
        Some((key, value)) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

// ── Scheduler config ──────────────────────────────────────────

/// Knobs shared by the worker pool, event loops and the parallel map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// How long an idle event loop parks between queue polls, in microseconds.
    #[serde(default = "default_idle_poll_interval")]
    pub idle_poll_interval_micros: u64,
    /// Parallel map task budget per unit of pool parallelism.
    #[serde(default = "default_task_multiplier")]
    pub parallel_map_task_multiplier: usize,
    /// Lane count for priority mailboxes built from this config.
    #[serde(default = "default_priority_lanes")]
    pub priority_lanes: usize,
}

fn default_worker_threads() -> usize { 0 }
fn default_idle_poll_interval() -> u64 { 100 }
fn default_task_multiplier() -> usize { 16 }
fn default_priority_lanes() -> usize { 4 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            worker_threads: default_worker_threads(),
            idle_poll_interval_micros: default_idle_poll_interval(),
            parallel_map_task_multiplier: default_task_multiplier(),
            priority_lanes: default_priority_lanes(),
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Profile is read from `TICKWORK_PROFILE`. Malformed values are logged
    /// and replaced by their defaults.
    pub fn from_env() -> Self {
        let profile = env_or("TICKWORK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Lenient variant of [`SchedulerConfig::try_for_profile`].
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let defaults = Self::default();
        let lenient = |key: &str| -> Option<u64> {
            profiled_env_parse(&p, key).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring malformed scheduler setting");
                None
            })
        };
        Self {
            worker_threads: lenient("TICKWORK_WORKER_THREADS")
                .map_or(defaults.worker_threads, |v| v as usize),
            idle_poll_interval_micros: lenient("TICKWORK_IDLE_POLL_MICROS")
                .unwrap_or(defaults.idle_poll_interval_micros),
            parallel_map_task_multiplier: lenient("TICKWORK_PARALLEL_MAP_MULTIPLIER")
                .map_or(defaults.parallel_map_task_multiplier, |v| v as usize),
            priority_lanes: lenient("TICKWORK_PRIORITY_LANES")
                .map_or(defaults.priority_lanes, |v| v as usize),
            profile: p,
        }
    }

    /// Strict variant of [`SchedulerConfig::from_env`].
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let profile = env_or("TICKWORK_PROFILE", "").to_uppercase();
        Self::try_for_profile(&profile)
    }

    /// Build config for a named profile, rejecting malformed values.
    pub fn try_for_profile(profile: &str) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let defaults = Self::default();
        Ok(Self {
            worker_threads: profiled_env_parse(&p, "TICKWORK_WORKER_THREADS")?
                .unwrap_or(defaults.worker_threads),
            idle_poll_interval_micros: profiled_env_parse(&p, "TICKWORK_IDLE_POLL_MICROS")?
                .unwrap_or(defaults.idle_poll_interval_micros),
            parallel_map_task_multiplier: profiled_env_parse(&p, "TICKWORK_PARALLEL_MAP_MULTIPLIER")?
                .unwrap_or(defaults.parallel_map_task_multiplier),
            priority_lanes: profiled_env_parse(&p, "TICKWORK_PRIORITY_LANES")?
                .unwrap_or(defaults.priority_lanes),
            profile: p,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_micros(self.idle_poll_interval_micros)
    }

    /// Task budget for a parallel map running on a pool of `parallelism` threads.
    pub fn default_max_tasks(&self, parallelism: usize) -> usize {
        parallelism.max(1) * self.parallel_map_task_multiplier.max(1)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config loaded (profile: {}):", self.profile_label());
        tracing::info!("  workers:      {}", self.resolved_worker_threads());
        tracing::info!("  idle poll:    {:?}", self.idle_poll_interval());
        tracing::info!("  map tasks:    {}x parallelism", self.parallel_map_task_multiplier);
        tracing::info!("  lanes:        {}", self.priority_lanes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.idle_poll_interval_micros, 100);
        assert_eq!(config.parallel_map_task_multiplier, 16);
        assert_eq!(config.priority_lanes, 4);
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn idle_interval_and_task_budget() {
        let config = SchedulerConfig::default();
        assert_eq!(config.idle_poll_interval(), Duration::from_micros(100));
        assert_eq!(config.default_max_tasks(4), 64);
        assert_eq!(config.default_max_tasks(0), 16);
    }

    #[test]
    fn profiled_keys_override_defaults() {
        env::set_var("CFGTESTA_TICKWORK_WORKER_THREADS", "3");
        env::set_var("CFGTESTA_TICKWORK_PRIORITY_LANES", "7");

        let config = SchedulerConfig::try_for_profile("cfgtesta").unwrap();
        assert_eq!(config.profile, "CFGTESTA");
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.priority_lanes, 7);
        assert_eq!(config.idle_poll_interval_micros, 100);
    }

    #[test]
    fn malformed_values_are_rejected_or_defaulted() {
        env::set_var("CFGTESTB_TICKWORK_IDLE_POLL_MICROS", "soon");

        let err = SchedulerConfig::try_for_profile("CFGTESTB").unwrap_err();
        assert!(err.to_string().contains("CFGTESTB_TICKWORK_IDLE_POLL_MICROS"));

        let lenient = SchedulerConfig::for_profile("CFGTESTB");
        assert_eq!(lenient.idle_poll_interval_micros, 100);
    }

    #[test]
    fn deserializes_with_field_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"worker_threads": 2}"#).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.parallel_map_task_multiplier, 16);
        assert_eq!(config.priority_lanes, 4);
    }
}
