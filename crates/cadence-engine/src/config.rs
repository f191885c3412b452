//! Clock and engine configuration, validation, and error types.
//!
//! [`ClockConfig`] controls the fixed/variable timestep algorithm and the
//! pacing sleeps. [`EngineConfig`] controls the engine context and its
//! background worker pool. Both are checked with `validate()` before any
//! thread is spawned.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use cadence_core::ContextError;

/// The default fixed update quantum: 1/60 s.
pub const DEFAULT_TARGET_STEP: Duration = Duration::from_nanos(16_666_667);

// ── ClockConfig ────────────────────────────────────────────────────

/// Configuration for [`FrameClock`](crate::clock::FrameClock).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockConfig {
    /// Fixed logical-update quantum. Default: 1/60 s.
    pub target_step: Duration,
    /// Sleep before measuring elapsed time while the host is inactive.
    /// `Duration::ZERO` disables it. Default: 20 ms.
    pub inactive_sleep: Duration,
    /// Fixed-step (`true`) or variable-step (`false`) updates. Default: true.
    pub use_fixed_timestep: bool,
    /// Upper bound on unconsumed time. Anything above is discarded.
    /// Default: 500 ms.
    pub max_accumulated: Duration,
    /// A pacing sleep only happens when the time left until the next step
    /// exceeds this. Default: 2 ms.
    pub sleep_slack: Duration,
    /// Smallest sleep the platform honours reliably. Pacing sleeps are
    /// shortened by this much so the loop wakes before the step is due.
    /// Default: 1 ms.
    pub sleep_granularity: Duration,
    /// Lag above which the loop reports running slowly. Default: 5.
    pub running_slowly_threshold: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            target_step: DEFAULT_TARGET_STEP,
            inactive_sleep: Duration::from_millis(20),
            use_fixed_timestep: true,
            max_accumulated: Duration::from_millis(500),
            sleep_slack: Duration::from_millis(2),
            sleep_granularity: Duration::from_millis(1),
            running_slowly_threshold: 5,
        }
    }
}

impl ClockConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_step.is_zero() {
            return Err(ConfigError::ZeroTargetStep);
        }
        if self.max_accumulated < self.target_step {
            return Err(ConfigError::ClampBelowStep {
                max_accumulated: self.max_accumulated,
                target_step: self.target_step,
            });
        }
        if self.sleep_granularity > self.sleep_slack {
            return Err(ConfigError::GranularityAboveSlack {
                granularity: self.sleep_granularity,
                slack: self.sleep_slack,
            });
        }
        Ok(())
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Configuration for [`EngineContext`](crate::context::EngineContext).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of background worker threads. `None` = auto-detect
    /// (`available_parallelism - 1`, clamped to `[1, 16]`).
    pub worker_count: Option<usize>,
    /// Prefix for worker thread names. Workers are named `{prefix}-{i}`.
    pub worker_name_prefix: String,
    /// Frame clock configuration used by the game loop.
    pub clock: ClockConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            worker_name_prefix: "cadence-worker".to_string(),
            clock: ClockConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`. The owning thread is never
    /// a worker, so at least one dedicated worker is always spawned.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.saturating_sub(1).clamp(1, 16)
            }
        }
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_name_prefix.is_empty() {
            return Err(ConfigError::EmptyWorkerName);
        }
        self.clock.validate()
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`ClockConfig::validate`] and [`EngineConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The fixed step is zero, which would make every tick run forever.
    ZeroTargetStep,
    /// The accumulator clamp cannot hold even one step.
    ClampBelowStep {
        /// Configured clamp.
        max_accumulated: Duration,
        /// Configured step.
        target_step: Duration,
    },
    /// Pacing sleeps would overshoot: granularity exceeds the slack.
    GranularityAboveSlack {
        /// Configured granularity.
        granularity: Duration,
        /// Configured slack.
        slack: Duration,
    },
    /// Worker thread name prefix is empty.
    EmptyWorkerName,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTargetStep => write!(f, "target_step must be non-zero"),
            Self::ClampBelowStep {
                max_accumulated,
                target_step,
            } => write!(
                f,
                "max_accumulated {max_accumulated:?} is below target_step {target_step:?}"
            ),
            Self::GranularityAboveSlack { granularity, slack } => write!(
                f,
                "sleep_granularity {granularity:?} exceeds sleep_slack {slack:?}"
            ),
            Self::EmptyWorkerName => write!(f, "worker_name_prefix must not be empty"),
        }
    }
}

impl Error for ConfigError {}

impl From<ConfigError> for ContextError {
    fn from(e: ConfigError) -> Self {
        ContextError::InvalidConfig {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ClockConfig::default().validate().is_ok());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let c = ClockConfig::default();
        assert_eq!(c.target_step, Duration::from_nanos(16_666_667));
        assert_eq!(c.inactive_sleep, Duration::from_millis(20));
        assert!(c.use_fixed_timestep);
        assert_eq!(c.max_accumulated, Duration::from_millis(500));
    }

    #[test]
    fn zero_step_rejected() {
        let c = ClockConfig {
            target_step: Duration::ZERO,
            ..ClockConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroTargetStep));
    }

    #[test]
    fn clamp_below_step_rejected() {
        let c = ClockConfig {
            target_step: Duration::from_millis(100),
            max_accumulated: Duration::from_millis(50),
            ..ClockConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ClampBelowStep { .. })
        ));
    }

    #[test]
    fn granularity_above_slack_rejected() {
        let c = ClockConfig {
            sleep_slack: Duration::from_millis(1),
            sleep_granularity: Duration::from_millis(3),
            ..ClockConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::GranularityAboveSlack { .. })
        ));
    }

    #[test]
    fn empty_worker_prefix_rejected() {
        let c = EngineConfig {
            worker_name_prefix: String::new(),
            ..EngineConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::EmptyWorkerName));
    }

    #[test]
    fn worker_count_clamped() {
        let c = EngineConfig {
            worker_count: Some(0),
            ..EngineConfig::default()
        };
        assert_eq!(c.resolved_worker_count(), 1);
        let c = EngineConfig {
            worker_count: Some(1000),
            ..EngineConfig::default()
        };
        assert_eq!(c.resolved_worker_count(), 64);
        let auto = EngineConfig::default().resolved_worker_count();
        assert!((1..=16).contains(&auto));
    }

    #[test]
    fn config_error_converts_to_context_error() {
        let e: ContextError = ConfigError::ZeroTargetStep.into();
        assert_eq!(
            e,
            ContextError::InvalidConfig {
                reason: "target_step must be non-zero".to_string()
            }
        );
    }
}
