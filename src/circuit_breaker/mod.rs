//! Circuit breaker registry (spec §4.17): seven independent domains, each a sliding-window
//! failure detector with a closed/open/half-open state machine. Any breaker in `Open` with
//! `priority == Critical` asserts a system-wide trading halt.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::CircuitBreakerError;
use crate::types::{BreakerConfig, BreakerDomain, BreakerEvent, BreakerPriority, BreakerState, CircuitBreaker};

fn default_config(domain: BreakerDomain) -> BreakerConfig {
    match domain {
        BreakerDomain::TradeFailureRate => BreakerConfig {
            failure_threshold: 5,
            time_window_minutes: 15,
            consecutive_failure_limit: 3,
            recovery_timeout_minutes: 30,
            test_request_limit: 3,
            recovery_success_threshold: 3,
            percentage_threshold: Some(0.5),
            priority: BreakerPriority::Critical,
        },
        BreakerDomain::Network => BreakerConfig {
            failure_threshold: 10,
            time_window_minutes: 5,
            consecutive_failure_limit: 5,
            recovery_timeout_minutes: 2,
            test_request_limit: 2,
            recovery_success_threshold: 2,
            percentage_threshold: Some(0.6),
            priority: BreakerPriority::High,
        },
        BreakerDomain::MarketVolatility => BreakerConfig {
            failure_threshold: 3,
            time_window_minutes: 30,
            consecutive_failure_limit: 2,
            recovery_timeout_minutes: 15,
            test_request_limit: 1,
            recovery_success_threshold: 2,
            percentage_threshold: None,
            priority: BreakerPriority::Medium,
        },
        BreakerDomain::SlippageRate => BreakerConfig {
            failure_threshold: 5,
            time_window_minutes: 15,
            consecutive_failure_limit: 3,
            recovery_timeout_minutes: 10,
            test_request_limit: 2,
            recovery_success_threshold: 2,
            percentage_threshold: Some(0.4),
            priority: BreakerPriority::High,
        },
        BreakerDomain::HsmFailure => BreakerConfig {
            failure_threshold: 2,
            time_window_minutes: 10,
            consecutive_failure_limit: 2,
            recovery_timeout_minutes: 20,
            test_request_limit: 1,
            recovery_success_threshold: 2,
            percentage_threshold: None,
            priority: BreakerPriority::Critical,
        },
        BreakerDomain::SystemErrors => BreakerConfig {
            failure_threshold: 10,
            time_window_minutes: 5,
            consecutive_failure_limit: 5,
            recovery_timeout_minutes: 10,
            test_request_limit: 3,
            recovery_success_threshold: 3,
            percentage_threshold: Some(0.5),
            priority: BreakerPriority::Critical,
        },
        BreakerDomain::ConfirmationTimeout => BreakerConfig {
            failure_threshold: 5,
            time_window_minutes: 20,
            consecutive_failure_limit: 4,
            recovery_timeout_minutes: 10,
            test_request_limit: 2,
            recovery_success_threshold: 2,
            percentage_threshold: Some(0.5),
            priority: BreakerPriority::High,
        },
    }
}

fn new_breaker(domain: BreakerDomain) -> CircuitBreaker {
    CircuitBreaker {
        domain,
        name: domain.display_name().to_string(),
        state: BreakerState::Closed,
        recent_events: Vec::new(),
        failure_count: 0,
        consecutive_failures: 0,
        opened_at: None,
        half_open_successes: 0,
        half_open_attempts: 0,
        config: default_config(domain),
    }
}

const ALL_DOMAINS: [BreakerDomain; 7] = [
    BreakerDomain::TradeFailureRate,
    BreakerDomain::Network,
    BreakerDomain::MarketVolatility,
    BreakerDomain::SlippageRate,
    BreakerDomain::HsmFailure,
    BreakerDomain::SystemErrors,
    BreakerDomain::ConfirmationTimeout,
];

pub struct BreakerRegistry {
    breakers: RwLock<HashMap<BreakerDomain, CircuitBreaker>>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerRegistry {
    pub fn new() -> Self {
        let mut breakers = HashMap::new();
        for domain in ALL_DOMAINS {
            breakers.insert(domain, new_breaker(domain));
        }
        Self {
            breakers: RwLock::new(breakers),
        }
    }

    /// Must be called before attempting an operation gated by `domain` (spec §4.17 "before
    /// any risky operation, check the relevant breaker"). Half-open state admits a bounded
    /// number of test requests; anything beyond that, or an open breaker still within its
    /// recovery window, is rejected.
    pub fn check(&self, domain: BreakerDomain, now: DateTime<Utc>) -> Result<(), CircuitBreakerError> {
        let mut breakers = self.breakers.write();
        let breaker = breakers.get_mut(&domain).expect("all domains pre-registered");

        if breaker.state == BreakerState::Open {
            let elapsed = breaker
                .opened_at
                .map(|t| (now - t).num_minutes())
                .unwrap_or(0);
            if elapsed >= breaker.config.recovery_timeout_minutes {
                breaker.state = BreakerState::HalfOpen;
                breaker.half_open_attempts = 0;
                breaker.half_open_successes = 0;
            } else {
                return Err(CircuitBreakerError::Open {
                    breaker_name: breaker.name.clone(),
                });
            }
        }

        if breaker.state == BreakerState::HalfOpen
            && breaker.half_open_attempts >= breaker.config.test_request_limit
        {
            return Err(CircuitBreakerError::Open {
                breaker_name: breaker.name.clone(),
            });
        }

        if breaker.state == BreakerState::HalfOpen {
            breaker.half_open_attempts += 1;
        }

        Ok(())
    }

    /// Record the outcome of an operation gated by `domain` and transition the breaker's
    /// state machine accordingly (spec §4.17 closed -> open -> half-open -> closed/open).
    pub fn record(&self, domain: BreakerDomain, success: bool, now: DateTime<Utc>) {
        let mut breakers = self.breakers.write();
        let breaker = breakers.get_mut(&domain).expect("all domains pre-registered");

        let window_start = now - chrono::Duration::minutes(breaker.config.time_window_minutes);
        breaker.recent_events.retain(|e| e.at >= window_start);
        breaker.recent_events.push(BreakerEvent { at: now, success });

        if success {
            breaker.consecutive_failures = 0;
            if breaker.state == BreakerState::HalfOpen {
                breaker.half_open_successes += 1;
                if breaker.half_open_successes >= breaker.config.recovery_success_threshold {
                    breaker.state = BreakerState::Closed;
                    breaker.failure_count = 0;
                    breaker.recent_events.clear();
                }
            }
            return;
        }

        breaker.consecutive_failures += 1;
        breaker.failure_count = breaker.recent_events.iter().filter(|e| !e.success).count() as u32;

        if breaker.state == BreakerState::HalfOpen {
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(now);
            return;
        }

        let failure_rate = breaker.recent_events.iter().filter(|e| !e.success).count() as f64
            / breaker.recent_events.len().max(1) as f64;
        let threshold_tripped = breaker
            .config
            .percentage_threshold
            .map(|t| failure_rate >= t && breaker.recent_events.len() as u32 >= breaker.config.failure_threshold)
            .unwrap_or(false);

        if breaker.consecutive_failures >= breaker.config.consecutive_failure_limit
            || breaker.failure_count >= breaker.config.failure_threshold
            || threshold_tripped
        {
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(now);
        }
    }

    /// True when any `Critical`-priority breaker is open (spec §4.17 system halt).
    pub fn system_halted(&self) -> Option<CircuitBreakerError> {
        let breakers = self.breakers.read();
        breakers.values().find_map(|b| {
            (b.state == BreakerState::Open && b.config.priority == BreakerPriority::Critical).then(|| {
                CircuitBreakerError::SystemHalt {
                    reason: format!("{} is open", b.name),
                }
            })
        })
    }

    pub fn snapshot(&self, domain: BreakerDomain) -> CircuitBreaker {
        self.breakers.read().get(&domain).expect("pre-registered").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_consecutive_failure_limit() {
        let registry = BreakerRegistry::new();
        let now = Utc::now();
        for _ in 0..3 {
            registry.check(BreakerDomain::HsmFailure, now).unwrap();
            registry.record(BreakerDomain::HsmFailure, false, now);
        }
        assert_eq!(registry.snapshot(BreakerDomain::HsmFailure).state, BreakerState::Open);
        assert!(registry.check(BreakerDomain::HsmFailure, now).is_err());
    }

    #[test]
    fn critical_breaker_open_asserts_system_halt() {
        let registry = BreakerRegistry::new();
        let now = Utc::now();
        for _ in 0..2 {
            registry.record(BreakerDomain::HsmFailure, false, now);
        }
        assert!(registry.system_halted().is_some());
    }

    #[test]
    fn half_open_recovers_to_closed_after_success_threshold() {
        let registry = BreakerRegistry::new();
        let opened_at = Utc::now();
        for _ in 0..2 {
            registry.record(BreakerDomain::HsmFailure, false, opened_at);
        }
        assert_eq!(registry.snapshot(BreakerDomain::HsmFailure).state, BreakerState::Open);

        let recovered = opened_at + chrono::Duration::minutes(21);
        registry.check(BreakerDomain::HsmFailure, recovered).unwrap();
        assert_eq!(registry.snapshot(BreakerDomain::HsmFailure).state, BreakerState::HalfOpen);

        registry.record(BreakerDomain::HsmFailure, true, recovered);
        registry.check(BreakerDomain::HsmFailure, recovered).unwrap();
        registry.record(BreakerDomain::HsmFailure, true, recovered);
        assert_eq!(registry.snapshot(BreakerDomain::HsmFailure).state, BreakerState::Closed);
    }

    /// Spec §8 Scenario E: 5 trade-execution failures within 10 minutes trips
    /// `trade_failure_rate`; a 6th attempt is rejected; after 30 minutes and 3 half-open
    /// successes it closes again.
    #[test]
    fn trade_failure_rate_breaker_matches_worked_scenario_e() {
        let registry = BreakerRegistry::new();
        let opened_at = Utc::now();
        for i in 0..5 {
            let at = opened_at + chrono::Duration::minutes(i);
            registry.record(BreakerDomain::TradeFailureRate, false, at);
        }
        assert_eq!(registry.snapshot(BreakerDomain::TradeFailureRate).state, BreakerState::Open);
        assert!(registry.check(BreakerDomain::TradeFailureRate, opened_at + chrono::Duration::minutes(6)).is_err());

        // Still within the 30-minute recovery window: stays open.
        let almost_recovered = opened_at + chrono::Duration::minutes(29);
        assert!(registry.check(BreakerDomain::TradeFailureRate, almost_recovered).is_err());
        assert_eq!(registry.snapshot(BreakerDomain::TradeFailureRate).state, BreakerState::Open);

        let recovered = opened_at + chrono::Duration::minutes(31);
        registry.check(BreakerDomain::TradeFailureRate, recovered).unwrap();
        assert_eq!(registry.snapshot(BreakerDomain::TradeFailureRate).state, BreakerState::HalfOpen);

        for _ in 0..3 {
            registry.check(BreakerDomain::TradeFailureRate, recovered).unwrap();
            registry.record(BreakerDomain::TradeFailureRate, true, recovered);
        }
        assert_eq!(registry.snapshot(BreakerDomain::TradeFailureRate).state, BreakerState::Closed);
    }
}
