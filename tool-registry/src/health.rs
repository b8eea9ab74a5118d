//! Per-tool health records and the circuit breaker transition table.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{RegistryError, RegistryResult};

/// Circuit breaker configuration shared by every tool in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    failure_threshold: NonZeroU32,
    cooldown: Duration,
    max_cooldown: Duration,
}

impl BreakerConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(failure_threshold: NonZeroU32, cooldown: Duration, max_cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            max_cooldown,
        }
    }

    /// Consecutive failures that trip a closed circuit.
    #[must_use]
    pub const fn failure_threshold(self) -> NonZeroU32 {
        self.failure_threshold
    }

    /// Cooldown applied the first time a circuit opens.
    #[must_use]
    pub const fn cooldown(self) -> Duration {
        self.cooldown
    }

    /// Upper bound for the doubling cooldown after failed probes.
    #[must_use]
    pub const fn max_cooldown(self) -> Duration {
        self.max_cooldown
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the cooldown is zero or
    /// exceeds the maximum cooldown.
    pub fn validate(self) -> RegistryResult<()> {
        if self.cooldown.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "breaker cooldown must be greater than zero",
            ));
        }
        if self.cooldown > self.max_cooldown {
            return Err(RegistryError::InvalidConfig(
                "breaker cooldown cannot exceed max cooldown",
            ));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// A single probe request is in flight or allowed.
    HalfOpen,
}

/// Outcome of asking whether a request may reach a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; execute normally.
    Allowed,
    /// This request is the single half-open probe.
    Probe,
    /// Circuit open, or a probe is already in flight.
    Rejected {
        /// Earliest time a new attempt may be admitted.
        retry_at: DateTime<Utc>,
    },
}

impl Admission {
    /// Returns `true` unless the request was rejected.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Health snapshot for a single tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    state: CircuitState,
    consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_success: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cooldown: Option<Duration>,
    #[serde(skip)]
    probe_in_flight: bool,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
            next_retry_at: None,
            cooldown: None,
            probe_in_flight: false,
        }
    }
}

impl HealthRecord {
    /// Returns the circuit state.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the consecutive failure counter.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the time of the last successful execution.
    #[must_use]
    pub const fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Returns the time of the last failed execution.
    #[must_use]
    pub const fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    /// Returns when an open circuit will admit a probe, or when the probe of
    /// a half-open circuit expires.
    #[must_use]
    pub const fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    /// Returns `true` when the circuit is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Decides admission. A probe holds the half-open slot until its outcome
    /// is recorded, it is released, or one cooldown passes; an expired probe
    /// counts as a failed one.
    pub(crate) fn admit(&mut self, now: DateTime<Utc>, config: BreakerConfig) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let retry_at = self.next_retry_at.unwrap_or(now);
                if now >= retry_at {
                    self.state = CircuitState::HalfOpen;
                    self.start_probe(now, config);
                    Admission::Probe
                } else {
                    Admission::Rejected { retry_at }
                }
            }
            CircuitState::HalfOpen if !self.probe_in_flight => {
                self.start_probe(now, config);
                Admission::Probe
            }
            CircuitState::HalfOpen => {
                let expires_at = self.next_retry_at.unwrap_or(now);
                if now < expires_at {
                    return Admission::Rejected { retry_at: expires_at };
                }
                self.record_failure(now, config);
                Admission::Rejected {
                    retry_at: self.next_retry_at.unwrap_or(now),
                }
            }
        }
    }

    fn start_probe(&mut self, now: DateTime<Utc>, config: BreakerConfig) {
        let window = self.cooldown.unwrap_or(config.cooldown());
        self.probe_in_flight = true;
        self.next_retry_at = Some(deadline(now, window));
    }

    /// Gives up the half-open slot without an outcome. Returns `true` when a
    /// probe was in flight.
    pub(crate) fn release_probe(&mut self) -> bool {
        let released = self.state == CircuitState::HalfOpen && self.probe_in_flight;
        self.probe_in_flight = false;
        released
    }

    pub(crate) fn record(&mut self, success: bool, now: DateTime<Utc>, config: BreakerConfig) {
        if success {
            self.record_success(now);
        } else {
            self.record_failure(now, config);
        }
    }

    fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_success = Some(now);
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.next_retry_at = None;
                self.cooldown = None;
                self.probe_in_flight = false;
            }
            // Late result from an attempt admitted before the circuit tripped.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&mut self, now: DateTime<Utc>, config: BreakerConfig) {
        self.last_failure = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= config.failure_threshold().get() {
                    self.trip(now, config.cooldown());
                }
            }
            CircuitState::HalfOpen => {
                let cooldown = self
                    .cooldown
                    .map_or(config.cooldown(), |current| current.saturating_mul(2))
                    .min(config.max_cooldown());
                self.trip(now, cooldown);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        self.state = CircuitState::Open;
        self.cooldown = Some(cooldown);
        self.next_retry_at = Some(deadline(now, cooldown));
        self.probe_in_flight = false;
    }
}

fn deadline(now: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(after).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig::new(
            NonZeroU32::new(3).unwrap(),
            Duration::from_secs(10),
            Duration::from_secs(25),
        )
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    #[test]
    fn trips_after_threshold() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..2 {
            record.record(false, now, config());
            assert_eq!(record.state(), CircuitState::Closed);
        }
        record.record(false, now, config());
        assert_eq!(record.state(), CircuitState::Open);
        assert_eq!(record.next_retry_at(), Some(now + secs(10)));
    }

    #[test]
    fn success_in_closed_resets_counter() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        record.record(false, now, config());
        record.record(false, now, config());
        record.record(true, now, config());
        assert_eq!(record.consecutive_failures(), 0);
        record.record(false, now, config());
        assert_eq!(record.state(), CircuitState::Closed);
    }

    #[test]
    fn single_probe_after_cooldown() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..3 {
            record.record(false, now, config());
        }

        assert!(matches!(
            record.admit(now + secs(5), config()),
            Admission::Rejected { .. }
        ));
        assert_eq!(record.admit(now + secs(10), config()), Admission::Probe);
        assert_eq!(record.state(), CircuitState::HalfOpen);
        assert!(matches!(
            record.admit(now + secs(11), config()),
            Admission::Rejected { .. }
        ));

        record.record(true, now + secs(12), config());
        assert_eq!(record.state(), CircuitState::Closed);
        assert_eq!(record.consecutive_failures(), 0);
        assert_eq!(record.admit(now + secs(12), config()), Admission::Allowed);
    }

    #[test]
    fn failed_probe_doubles_cooldown_up_to_cap() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..3 {
            record.record(false, now, config());
        }

        let t1 = now + secs(10);
        assert_eq!(record.admit(t1, config()), Admission::Probe);
        record.record(false, t1, config());
        assert_eq!(record.state(), CircuitState::Open);
        assert_eq!(record.next_retry_at(), Some(t1 + secs(20)));

        let t2 = t1 + secs(20);
        assert_eq!(record.admit(t2, config()), Admission::Probe);
        record.record(false, t2, config());
        assert_eq!(record.next_retry_at(), Some(t2 + secs(25)));
    }

    #[test]
    fn abandoned_probe_expires_as_a_failure() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..3 {
            record.record(false, now, config());
        }

        let t1 = now + secs(10);
        assert_eq!(record.admit(t1, config()), Admission::Probe);
        assert_eq!(record.next_retry_at(), Some(t1 + secs(10)));
        assert!(matches!(
            record.admit(t1 + secs(9), config()),
            Admission::Rejected { .. }
        ));

        // Nobody reported; the expired probe re-trips with a doubled cooldown.
        let t2 = t1 + secs(10);
        assert_eq!(
            record.admit(t2, config()),
            Admission::Rejected {
                retry_at: t2 + secs(20)
            }
        );
        assert_eq!(record.state(), CircuitState::Open);
        assert_eq!(record.admit(t2 + secs(20), config()), Admission::Probe);
    }

    #[test]
    fn released_probe_frees_the_half_open_slot() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..3 {
            record.record(false, now, config());
        }
        let t1 = now + secs(10);
        assert_eq!(record.admit(t1, config()), Admission::Probe);
        assert!(record.release_probe());
        assert!(!record.release_probe());
        assert_eq!(record.state(), CircuitState::HalfOpen);
        assert_eq!(record.admit(t1 + secs(1), config()), Admission::Probe);

        record.record(true, t1 + secs(2), config());
        assert_eq!(record.state(), CircuitState::Closed);
        assert!(!record.release_probe());
    }

    #[test]
    fn late_success_does_not_close_open_circuit() {
        let now = Utc::now();
        let mut record = HealthRecord::default();
        for _ in 0..3 {
            record.record(false, now, config());
        }
        record.record(true, now, config());
        assert_eq!(record.state(), CircuitState::Open);
    }

    #[test]
    fn config_validation() {
        assert!(BreakerConfig::default().validate().is_ok());
        let bad = BreakerConfig::new(
            NonZeroU32::new(1).unwrap(),
            Duration::from_secs(60),
            Duration::from_secs(30),
        );
        assert!(bad.validate().is_err());
    }
}
