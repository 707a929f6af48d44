// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Infrastructure Specifications
//!
//! Predicates deciding whether the shared `dl`, `retry` and `delay` exchanges are
//! needed by a vhost. None of them is created, or bound to, when no queue uses it.

use crate::config::Configuration;

/// A pure question asked of a configuration.
pub trait Specification {
    fn is_satisfied_by(&self, config: &Configuration) -> bool;
}

/// Satisfied when at least one queue dead-letters its messages, either through
/// `with_dl` (its own or the vhost default) or because it declares retries.
pub struct DeadLetterExchangeCanBeCreated;

impl Specification for DeadLetterExchangeCanBeCreated {
    fn is_satisfied_by(&self, config: &Configuration) -> bool {
        config
            .queues()
            .values()
            .any(|queue| queue.with_dead_letter(config.has_dead_letter_exchange()))
    }
}

/// Satisfied when at least one queue declares a non-empty retry ladder.
pub struct RetryExchangeCanBeCreated;

impl Specification for RetryExchangeCanBeCreated {
    fn is_satisfied_by(&self, config: &Configuration) -> bool {
        config.queues().values().any(|queue| queue.has_retries())
    }
}

/// Satisfied when at least one queue declares a delay.
pub struct DelayExchangeCanBeCreated;

impl Specification for DelayExchangeCanBeCreated {
    fn is_satisfied_by(&self, config: &Configuration) -> bool {
        config.queues().values().any(|queue| queue.has_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(parameters: &str, queues: &str) -> Configuration {
        Configuration::from_json_str(&format!(
            r#"{{"my_vhost": {{
                "parameters": {parameters},
                "exchanges": {{"default": {{"type": "direct", "durable": true}}}},
                "queues": {queues}
            }}}}"#
        ))
        .unwrap()
    }

    const NO_FEATURES: &str = r#"{"with_dl": false, "with_unroutable": false}"#;

    #[test]
    fn nothing_is_needed_without_queues() {
        let specs: [&dyn Specification; 3] = [
            &DeadLetterExchangeCanBeCreated,
            &RetryExchangeCanBeCreated,
            &DelayExchangeCanBeCreated,
        ];

        for queues in ["null", r#""""#, "[]", "{}"] {
            let config = config(r#"{"with_dl": true}"#, queues);
            for spec in specs {
                assert!(!spec.is_satisfied_by(&config), "queues = {queues}");
            }
        }

        let absent = Configuration::from_json_str(r#"{"my_vhost": {"parameters": {"with_dl": true}}}"#)
            .unwrap();
        for spec in specs {
            assert!(!spec.is_satisfied_by(&absent));
        }
    }

    #[test]
    fn retries_need_dead_letter_and_retry_exchanges() {
        let config = config(
            NO_FEATURES,
            r#"{"test_queue": {"durable": true, "retries": [5, 10, 15]}}"#,
        );

        assert!(DeadLetterExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(RetryExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(!DelayExchangeCanBeCreated.is_satisfied_by(&config));
    }

    #[test]
    fn vhost_dead_letter_default_applies_to_queues() {
        let config = config(r#"{"with_dl": true}"#, r#"{"test_queue": {"durable": true}}"#);

        assert!(DeadLetterExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(!RetryExchangeCanBeCreated.is_satisfied_by(&config));
    }

    #[test]
    fn queue_dead_letter_override_applies() {
        let enabled = config(NO_FEATURES, r#"{"test_queue": {"with_dl": true}}"#);
        let disabled = config(r#"{"with_dl": true}"#, r#"{"test_queue": {"with_dl": false}}"#);
        let plain = config(NO_FEATURES, r#"{"test_queue": {"durable": true}}"#);

        assert!(DeadLetterExchangeCanBeCreated.is_satisfied_by(&enabled));
        assert!(!DeadLetterExchangeCanBeCreated.is_satisfied_by(&disabled));
        assert!(!DeadLetterExchangeCanBeCreated.is_satisfied_by(&plain));
    }

    #[test]
    fn one_matching_queue_is_enough() {
        let config = config(
            NO_FEATURES,
            r#"{
                "test_queue": {"with_dl": false},
                "test_queue_2": {"with_dl": false},
                "test_queue_with_retry": {"retries": [10]}
            }"#,
        );

        assert!(DeadLetterExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(RetryExchangeCanBeCreated.is_satisfied_by(&config));
    }

    #[test]
    fn empty_retries_do_not_need_a_retry_exchange() {
        let config = config(NO_FEATURES, r#"{"test_queue": {"retries": []}}"#);

        assert!(!RetryExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(!DeadLetterExchangeCanBeCreated.is_satisfied_by(&config));
    }

    #[test]
    fn delay_needs_delay_exchange() {
        let config = config(NO_FEATURES, r#"{"q1": {}, "q2": {"delay": 5000}}"#);

        assert!(DelayExchangeCanBeCreated.is_satisfied_by(&config));
        assert!(!RetryExchangeCanBeCreated.is_satisfied_by(&config));
    }
}
