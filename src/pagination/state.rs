//! Adaptive-delay control loop state, advanced by a pure transition function.

use std::time::Duration;

use serde::Serialize;

/// Tunables for the pagination loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    pub initial_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// How often the tile count is re-read while waiting.
    pub poll_interval: Duration,
    /// Consecutive attempts without new tiles before giving up.
    pub failure_cap: u32,
    pub max_attempts: u32,
    /// Quick re-checks before concluding the load-more control is gone.
    pub control_rechecks: u32,
    pub recheck_interval: Duration,
    /// Round trips below this shrink the delay hard.
    pub fast_round_trip: Duration,
    /// Round trips below this shrink the delay gently.
    pub acceptable_round_trip: Duration,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(4000),
            poll_interval: Duration::from_millis(50),
            failure_cap: 3,
            max_attempts: 60,
            control_rechecks: 3,
            recheck_interval: Duration::from_millis(200),
            fast_round_trip: Duration::from_millis(400),
            acceptable_round_trip: Duration::from_millis(1200),
        }
    }
}

impl PaginationConfig {
    fn bound(&self, delay: Duration) -> Duration {
        delay.max(self.min_delay).min(self.max_delay)
    }

    /// Upper bound on the time a full pass can take.
    pub fn worst_case(&self) -> Duration {
        let per_attempt = self.max_delay + self.poll_interval + self.recheck_interval * (self.control_rechecks + 1);
        per_attempt * self.max_attempts
    }
}

/// What one trigger-and-wait cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub tiles_before: usize,
    pub tiles_after: usize,
    /// Time from activation until growth was seen (or the wait ran out).
    pub round_trip: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub consecutive_failures: u32,
    #[serde(with = "millis")]
    pub current_delay: Duration,
    pub pages_loaded: u32,
    pub fully_loaded: bool,
}

impl PaginationState {
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            consecutive_failures: 0,
            current_delay: config.bound(config.initial_delay),
            pages_loaded: 0,
            fully_loaded: false,
        }
    }

    /// Next state after one cycle.
    ///
    /// Growth resets the failure count and shrinks the delay by a ratio picked
    /// from the round trip. No growth escalates the delay: x1.5 on the first
    /// failure, x2 on the second, pinned to the ceiling from the third on.
    pub fn observe(self, observation: Observation, config: &PaginationConfig) -> Self {
        if observation.tiles_after > observation.tiles_before {
            let ratio = if observation.round_trip < config.fast_round_trip {
                0.5
            } else if observation.round_trip < config.acceptable_round_trip {
                0.8
            } else {
                1.0
            };
            Self {
                consecutive_failures: 0,
                current_delay: config.bound(self.current_delay.mul_f64(ratio)),
                pages_loaded: self.pages_loaded + 1,
                fully_loaded: self.fully_loaded,
            }
        } else {
            let failures = self.consecutive_failures + 1;
            let grown = match failures {
                1 => self.current_delay.mul_f64(1.5),
                2 => self.current_delay.mul_f64(2.0),
                _ => config.max_delay,
            };
            Self {
                consecutive_failures: failures,
                current_delay: config.bound(grown),
                pages_loaded: self.pages_loaded,
                fully_loaded: self.fully_loaded,
            }
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}
