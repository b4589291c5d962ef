//! Pool configuration snapshot (spec §6, §8).

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FieldViolation, PoolError, PoolResult};

/// A cap on a count of records.
///
/// Replaces the legacy "`-1` means unbounded" integer convention with a
/// proper sum type; `Cap::Unbounded` is the `-1` of spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cap {
    /// No limit.
    Unbounded,
    /// Limited to at most `usize` instances.
    Bounded(usize),
}

impl Cap {
    /// Whether `count` is within this cap.
    #[must_use]
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(n) => count < *n,
        }
    }

    /// The numeric limit, if bounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(*n),
        }
    }

    /// Whether this cap is exactly zero (nothing may ever be allocated).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Bounded(0))
    }
}

impl From<i64> for Cap {
    /// Mirrors the legacy convention: negative values mean unbounded.
    fn from(value: i64) -> Self {
        if value < 0 {
            Self::Unbounded
        } else {
            Self::Bounded(value as usize)
        }
    }
}

impl Default for Cap {
    fn default() -> Self {
        Self::Unbounded
    }
}

/// Selection order among idle records on borrow (spec §6 `ordering`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ordering {
    /// Most recently returned record is handed out first.
    #[default]
    Lifo,
    /// Least recently returned record is handed out first.
    Fifo,
}

/// Policy applied when the pool is exhausted (spec §6 `exhausted_action`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExhaustedAction {
    /// Fail immediately with [`PoolError::NoSuchElement`].
    #[default]
    Fail,
    /// Block until an instance is available, `max_wait` elapses, or the
    /// pool closes.
    Block,
    /// Create a new instance ignoring `max_active`/`max_total`.
    Grow,
}

/// Immutable-at-construction pool tunables (spec §6, §8).
///
/// Mutating setters take effect immediately but never retroactively —
/// e.g. lowering `max_idle` does not itself destroy already-idle
/// records; the next eviction sweep reconciles (spec §4.8).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Cap on concurrently allocated records.
    pub max_active: Cap,
    /// Cap on idle records; excess are destroyed on return.
    pub max_idle: Cap,
    /// Target floor the evictor replenishes idle records to.
    pub min_idle: usize,
    /// Max block time for the `Block` exhaustion policy. `None` = ∞.
    pub max_wait: Option<Duration>,
    /// What to do when the pool is exhausted.
    pub exhausted_action: ExhaustedAction,
    /// Selection order among idle records.
    pub ordering: Ordering,
    /// Whether waiters are released in strict FIFO arrival order.
    pub fairness: bool,
    /// Validate immediately after `create`.
    pub test_on_create: bool,
    /// Validate after `activate` during borrow.
    pub test_on_borrow: bool,
    /// Validate before `passivate` during return.
    pub test_on_return: bool,
    /// Validate during evictor sweeps.
    pub test_while_idle: bool,
    /// Evictor period. `None` disables the background evictor.
    pub time_between_eviction_runs: Option<Duration>,
    /// Eviction sweep batch size. Negative values mean "1/|n| of idle".
    pub num_tests_per_eviction_run: i64,
    /// Hard idle-time threshold past which a record is always evicted.
    pub min_evictable_idle_time: Option<Duration>,
    /// Soft idle-time threshold, applied only while `|idle| > min_idle`.
    pub soft_min_evictable_idle_time: Option<Duration>,
    /// Run the abandonment detector synchronously on every borrow.
    pub remove_abandoned_on_borrow: bool,
    /// Run the abandonment detector during each eviction sweep.
    pub remove_abandoned_on_maintenance: bool,
    /// Idle-past-deadline threshold for abandonment.
    pub abandoned_timeout: Duration,
    /// Update `last_use_time` on each instance touch via the borrow guard.
    pub use_usage_tracking: bool,
    /// Emit a log record when the abandonment detector reclaims a record.
    pub log_abandoned: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: Cap::Bounded(8),
            max_idle: Cap::Bounded(8),
            min_idle: 0,
            max_wait: None,
            exhausted_action: ExhaustedAction::Block,
            ordering: Ordering::Lifo,
            fairness: false,
            test_on_create: false,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            time_between_eviction_runs: None,
            num_tests_per_eviction_run: 3,
            min_evictable_idle_time: Some(Duration::from_secs(30 * 60)),
            soft_min_evictable_idle_time: None,
            remove_abandoned_on_borrow: false,
            remove_abandoned_on_maintenance: false,
            abandoned_timeout: Duration::from_secs(5 * 60),
            use_usage_tracking: false,
            log_abandoned: false,
        }
    }
}

impl PoolConfig {
    /// Validate the snapshot, collecting every violated field rather than
    /// failing on the first one (mirrors Commons-Pool2-style batch
    /// validation).
    pub fn validate(&self) -> PoolResult<()> {
        let mut violations = Vec::new();

        if let Cap::Bounded(max_idle) = self.max_idle
            && let Cap::Bounded(max_active) = self.max_active
            && max_idle > 0
            && self.min_idle > max_idle
        {
            violations.push(FieldViolation::new(
                "min_idle",
                "must be <= max_idle when max_idle is bounded",
                self.min_idle.to_string(),
            ));
            let _ = max_active;
        }

        if self.num_tests_per_eviction_run == 0 {
            violations.push(FieldViolation::new(
                "num_tests_per_eviction_run",
                "must be nonzero",
                "0",
            ));
        }

        if self.abandoned_timeout.is_zero()
            && (self.remove_abandoned_on_borrow || self.remove_abandoned_on_maintenance)
        {
            violations.push(FieldViolation::new(
                "abandoned_timeout",
                "must be > 0 when abandonment reclamation is enabled",
                "0",
            ));
        }

        if let Some(soft) = self.soft_min_evictable_idle_time
            && let Some(hard) = self.min_evictable_idle_time
            && soft > hard
        {
            violations.push(FieldViolation::new(
                "soft_min_evictable_idle_time",
                "should not exceed min_evictable_idle_time",
                format!("{soft:?} > {hard:?}"),
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PoolError::validation(violations))
        }
    }

    /// Number of idle records to examine in one eviction sweep, given the
    /// current idle count (spec §4.4).
    #[must_use]
    pub fn eviction_batch_size(&self, idle_count: usize) -> usize {
        if self.num_tests_per_eviction_run >= 0 {
            (self.num_tests_per_eviction_run as usize).min(idle_count)
        } else {
            let denom = self.num_tests_per_eviction_run.unsigned_abs() as usize;
            if denom == 0 {
                idle_count
            } else {
                idle_count.div_ceil(denom)
            }
        }
    }
}

/// Per-key overrides for the keyed multiplexer (spec §4.6, §6).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyedPoolConfig {
    /// Base configuration applied to every sub-pool.
    pub base: PoolConfig,
    /// Cap on `|allocated(k)|` for any single key (overrides `base.max_active`).
    pub max_per_key: Cap,
    /// Cap across all keys for `Σ|allocated(k)| + Σ|idle(k)|`.
    pub max_total: Cap,
}

impl Default for KeyedPoolConfig {
    fn default() -> Self {
        Self {
            base: PoolConfig::default(),
            max_per_key: Cap::Bounded(8),
            max_total: Cap::Bounded(64),
        }
    }
}

impl KeyedPoolConfig {
    /// Validate the base config and the keyed-specific caps.
    pub fn validate(&self) -> PoolResult<()> {
        self.base.validate()?;

        if let (Cap::Bounded(total), Cap::Bounded(per_key)) = (self.max_total, self.max_per_key)
            && per_key > total
        {
            return Err(PoolError::configuration(
                "max_per_key",
                "must be <= max_total",
                per_key.to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PoolConfig`], consolidating the legacy constructor-overload
/// proliferation mentioned in spec §9 into one fluent entry point.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set `max_active`.
    #[must_use]
    pub fn max_active(mut self, cap: impl Into<Cap>) -> Self {
        self.config.max_active = cap.into();
        self
    }

    /// Set `max_idle`.
    #[must_use]
    pub fn max_idle(mut self, cap: impl Into<Cap>) -> Self {
        self.config.max_idle = cap.into();
        self
    }

    /// Set `min_idle`.
    #[must_use]
    pub fn min_idle(mut self, min_idle: usize) -> Self {
        self.config.min_idle = min_idle;
        self
    }

    /// Set `max_wait`.
    #[must_use]
    pub fn max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    /// Set `exhausted_action`.
    #[must_use]
    pub fn exhausted_action(mut self, action: ExhaustedAction) -> Self {
        self.config.exhausted_action = action;
        self
    }

    /// Set `ordering`.
    #[must_use]
    pub fn ordering(mut self, ordering: Ordering) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Enable or disable FIFO waiter fairness.
    #[must_use]
    pub fn fairness(mut self, fairness: bool) -> Self {
        self.config.fairness = fairness;
        self
    }

    /// Set the eviction sweep interval.
    #[must_use]
    pub fn time_between_eviction_runs(mut self, interval: Option<Duration>) -> Self {
        self.config.time_between_eviction_runs = interval;
        self
    }

    /// Set `min_evictable_idle_time`.
    #[must_use]
    pub fn min_evictable_idle_time(mut self, duration: Option<Duration>) -> Self {
        self.config.min_evictable_idle_time = duration;
        self
    }

    /// Set `soft_min_evictable_idle_time`.
    #[must_use]
    pub fn soft_min_evictable_idle_time(mut self, duration: Option<Duration>) -> Self {
        self.config.soft_min_evictable_idle_time = duration;
        self
    }

    /// Enable abandonment reclamation on borrow and/or maintenance.
    #[must_use]
    pub fn remove_abandoned(mut self, on_borrow: bool, on_maintenance: bool) -> Self {
        self.config.remove_abandoned_on_borrow = on_borrow;
        self.config.remove_abandoned_on_maintenance = on_maintenance;
        self
    }

    /// Set `abandoned_timeout`.
    #[must_use]
    pub fn abandoned_timeout(mut self, timeout: Duration) -> Self {
        self.config.abandoned_timeout = timeout;
        self
    }

    /// Validate with the factory on `create()`.
    #[must_use]
    pub fn test_on_create(mut self, enabled: bool) -> Self {
        self.config.test_on_create = enabled;
        self
    }

    /// Validate with the factory on `borrow()`.
    #[must_use]
    pub fn test_on_borrow(mut self, enabled: bool) -> Self {
        self.config.test_on_borrow = enabled;
        self
    }

    /// Validate with the factory on return.
    #[must_use]
    pub fn test_on_return(mut self, enabled: bool) -> Self {
        self.config.test_on_return = enabled;
        self
    }

    /// Validate idle records during the eviction sweep.
    #[must_use]
    pub fn test_while_idle(mut self, enabled: bool) -> Self {
        self.config.test_while_idle = enabled;
        self
    }

    /// Enable usage tracking (updates `last_use_time` via the borrow guard).
    #[must_use]
    pub fn use_usage_tracking(mut self, enabled: bool) -> Self {
        self.config.use_usage_tracking = enabled;
        self
    }

    /// Enable structured logging on abandonment reclamation.
    #[must_use]
    pub fn log_abandoned(mut self, enabled: bool) -> Self {
        self.config.log_abandoned = enabled;
        self
    }

    /// Validate and produce the final [`PoolConfig`].
    pub fn build(self) -> PoolResult<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-1 => Cap::Unbounded)]
    #[test_case(-100 => Cap::Unbounded)]
    #[test_case(0 => Cap::Bounded(0))]
    #[test_case(5 => Cap::Bounded(5))]
    fn cap_from_i64(value: i64) -> Cap {
        Cap::from(value)
    }

    #[test]
    fn cap_zero_allows_nothing() {
        assert!(Cap::Bounded(0).is_zero());
        assert!(!Cap::Bounded(0).allows(0));
    }

    #[test]
    fn cap_unbounded_allows_any_count() {
        assert!(Cap::Unbounded.allows(usize::MAX));
    }

    #[test]
    fn default_config_is_valid() {
        PoolConfig::default().validate().unwrap();
    }

    #[test]
    fn min_idle_over_max_idle_rejected() {
        let config = PoolConfig {
            max_idle: Cap::Bounded(2),
            min_idle: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_idle_allowed_when_max_idle_unbounded() {
        let config = PoolConfig {
            max_idle: Cap::Unbounded,
            min_idle: 1000,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn zero_eviction_batch_rejected() {
        let config = PoolConfig {
            num_tests_per_eviction_run: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn abandoned_timeout_zero_rejected_when_enabled() {
        let config = PoolConfig {
            remove_abandoned_on_borrow: true,
            abandoned_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn soft_threshold_above_hard_rejected() {
        let config = PoolConfig {
            min_evictable_idle_time: Some(Duration::from_secs(10)),
            soft_min_evictable_idle_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn eviction_batch_size_positive_caps_at_idle_count() {
        let config = PoolConfig {
            num_tests_per_eviction_run: 10,
            ..Default::default()
        };
        assert_eq!(config.eviction_batch_size(3), 3);
        assert_eq!(config.eviction_batch_size(20), 10);
    }

    #[test]
    fn eviction_batch_size_negative_is_fraction_of_idle() {
        let config = PoolConfig {
            num_tests_per_eviction_run: -2,
            ..Default::default()
        };
        // ceil(9 / 2) = 5
        assert_eq!(config.eviction_batch_size(9), 5);
        assert_eq!(config.eviction_batch_size(10), 5);
    }

    #[test]
    fn builder_produces_validated_config() {
        let config = PoolConfigBuilder::new()
            .max_active(4)
            .max_idle(4)
            .min_idle(1)
            .exhausted_action(ExhaustedAction::Block)
            .max_wait(Some(Duration::from_millis(100)))
            .build()
            .unwrap();
        assert_eq!(config.max_active, Cap::Bounded(4));
        assert_eq!(config.min_idle, 1);
    }

    #[test]
    fn builder_propagates_validation_error() {
        let result = PoolConfigBuilder::new()
            .max_idle(2)
            .min_idle(10)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn keyed_config_rejects_per_key_over_total() {
        let config = KeyedPoolConfig {
            max_per_key: Cap::Bounded(10),
            max_total: Cap::Bounded(5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn keyed_config_default_is_valid() {
        KeyedPoolConfig::default().validate().unwrap();
    }
}
