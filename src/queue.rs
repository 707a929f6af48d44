// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides types for describing RabbitMQ queues and their bindings.
//! A declared queue is normalized into a `QueueConfiguration`, which resolves the
//! vhost-level defaults for Dead Letter Queues (DLQ), retry ladders and delays,
//! and injects the dead-letter arguments the broker needs.

use crate::{
    config::{Configuration, Section},
    exchange::{ArgumentValue, Arguments},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the argument used to select the queue implementation
pub const AMQP_ARGUMENTS_QUEUE_TYPE: &str = "x-queue-type";
/// Constant for the binding argument selecting how header matches combine
pub const AMQP_ARGUMENTS_MATCH: &str = "x-match";

/// Name of the shared exchange collecting dead-lettered messages
pub const DEAD_LETTER_EXCHANGE: &str = "dl";

const DEFAULT_MATCH_MODE: &str = "all";

/// Parameters sent along with a queue creation.
///
/// This struct implements the builder pattern used for the companion queues the
/// engine derives (dead-letter, delay and retry queues).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: Arguments,
}

impl QueueParameters {
    /// Creates empty queue parameters.
    pub fn new() -> QueueParameters {
        QueueParameters::default()
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = Some(true);
        self
    }

    /// Sets whether the queue is deleted once its last consumer goes away.
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = Some(auto_delete);
        self
    }

    /// Adds a single argument to the queue.
    pub fn argument(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.to_owned(), value.into());
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue.
    ///
    /// # Parameters
    /// * `ttl` - TTL in milliseconds
    pub fn ttl(self, ttl: i64) -> Self {
        self.argument(AMQP_HEADERS_MESSAGE_TTL, ttl)
    }

    /// Sends rejected or expired messages to `exchange` with `routing_key`.
    pub fn dead_letter(self, exchange: &str, routing_key: &str) -> Self {
        self.argument(AMQP_HEADERS_DEAD_LETTER_EXCHANGE, exchange)
            .argument(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY, routing_key)
    }
}

/// A binding as written under a queue's `bindings` list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingDeclaration {
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
    #[serde(rename = "x-match", alias = "x_match")]
    pub match_mode: Option<String>,
    #[serde(default)]
    pub matches: Section<String>,
}

/// One user-declared binding request, merged with its defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSpec {
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
    pub match_mode: String,
    pub header_matches: Vec<(String, String)>,
}

impl From<&BindingDeclaration> for BindingSpec {
    fn from(decl: &BindingDeclaration) -> Self {
        BindingSpec {
            exchange: decl.exchange.clone(),
            routing_key: decl.routing_key.clone(),
            match_mode: decl
                .match_mode
                .clone()
                .unwrap_or_else(|| DEFAULT_MATCH_MODE.to_owned()),
            header_matches: decl
                .matches
                .iter()
                .map(|(header, value)| (header.to_owned(), value.clone()))
                .collect(),
        }
    }
}

impl BindingSpec {
    /// Binding arguments: the header matches plus `x-match`, or nothing when no
    /// header is matched.
    pub fn arguments(&self) -> Arguments {
        if self.header_matches.is_empty() {
            return Arguments::new();
        }

        let mut args: Arguments = self
            .header_matches
            .iter()
            .map(|(header, value)| (header.clone(), ArgumentValue::from(value.as_str())))
            .collect();
        args.insert(
            AMQP_ARGUMENTS_MATCH.to_owned(),
            ArgumentValue::from(self.match_mode.as_str()),
        );

        args
    }
}

/// A queue as written in a vhost declaration.
///
/// `with_dl`, `retries`, `delay` and `bindings` drive the derived artifacts and
/// never reach the broker; the remaining fields are passed through.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueDeclaration {
    pub durable: Option<bool>,
    pub auto_delete: Option<bool>,
    #[serde(default)]
    pub arguments: Arguments,
    pub with_dl: Option<bool>,
    pub retries: Option<Vec<u32>>,
    pub delay: Option<u32>,
    pub bindings: Option<Vec<BindingDeclaration>>,
}

impl QueueDeclaration {
    pub fn has_retries(&self) -> bool {
        self.retries.as_ref().is_some_and(|retries| !retries.is_empty())
    }

    pub fn has_delay(&self) -> bool {
        self.delay.is_some()
    }

    /// Whether messages of this queue are dead-lettered, given the vhost default.
    ///
    /// A retry ladder always dead-letters, whatever `with_dl` says.
    pub fn with_dead_letter(&self, vhost_with_dl: bool) -> bool {
        self.has_retries() || self.with_dl.unwrap_or(vhost_with_dl)
    }
}

/// Normalized per-queue policy.
///
/// Built once per declared queue at provisioning time and consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfiguration {
    name: String,
    with_dead_letter: bool,
    retries: Vec<u32>,
    bindings: Vec<BindingSpec>,
    delay: Option<u32>,
    parameters: QueueParameters,
}

impl QueueConfiguration {
    /// Resolves a declared queue against the vhost configuration.
    ///
    /// When the queue dead-letters and does not name its own dead-letter exchange,
    /// messages are routed to the shared `dl` exchange keyed by the queue name.
    pub fn new(name: &str, decl: &QueueDeclaration, config: &Configuration) -> QueueConfiguration {
        let with_dead_letter = decl.with_dead_letter(config.has_dead_letter_exchange());

        let mut parameters = QueueParameters {
            durable: decl.durable,
            auto_delete: decl.auto_delete,
            arguments: decl.arguments.clone(),
        };

        if with_dead_letter
            && !parameters
                .arguments
                .contains_key(AMQP_HEADERS_DEAD_LETTER_EXCHANGE)
        {
            parameters = parameters.dead_letter(DEAD_LETTER_EXCHANGE, name);
        }

        QueueConfiguration {
            name: name.to_owned(),
            with_dead_letter,
            retries: decl.retries.clone().unwrap_or_default(),
            bindings: decl
                .bindings
                .iter()
                .flatten()
                .map(BindingSpec::from)
                .collect(),
            delay: decl.delay,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_dead_letter(&self) -> bool {
        self.with_dead_letter
    }

    /// Delay in seconds of each retry step, in ladder order.
    pub fn retries(&self) -> &[u32] {
        &self.retries
    }

    pub fn bindings(&self) -> &[BindingSpec] {
        &self.bindings
    }

    /// Delay in milliseconds before messages reach the queue.
    pub fn delay(&self) -> Option<u32> {
        self.delay
    }

    pub fn has_delay(&self) -> bool {
        self.delay.is_some()
    }

    pub fn parameters(&self) -> &QueueParameters {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(with_dl: bool) -> Configuration {
        Configuration::from_json_str(&format!(
            r#"{{"my_vhost": {{"parameters": {{"with_dl": {with_dl}}}}}}}"#
        ))
        .unwrap()
    }

    fn declaration(json: &str) -> QueueDeclaration {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn vhost_default_drives_dead_lettering() {
        let queue = QueueConfiguration::new("q", &declaration(r#"{"durable": true}"#), &config(true));

        assert!(queue.with_dead_letter());
        assert_eq!(
            queue.parameters().arguments.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            Some(&ArgumentValue::from("dl"))
        );
        assert_eq!(
            queue.parameters().arguments.get(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            Some(&ArgumentValue::from("q"))
        );
        assert_eq!(queue.parameters().durable, Some(true));
    }

    #[test]
    fn queue_override_disables_dead_lettering() {
        let queue =
            QueueConfiguration::new("q", &declaration(r#"{"with_dl": false}"#), &config(true));

        assert!(!queue.with_dead_letter());
        assert!(queue.parameters().arguments.is_empty());
    }

    #[test]
    fn retries_force_dead_lettering() {
        let queue = QueueConfiguration::new(
            "q",
            &declaration(r#"{"with_dl": false, "retries": [5, 10]}"#),
            &config(false),
        );

        assert!(queue.with_dead_letter());
        assert_eq!(queue.retries(), &[5, 10]);
        assert!(queue
            .parameters()
            .arguments
            .contains_key(AMQP_HEADERS_DEAD_LETTER_EXCHANGE));
    }

    #[test]
    fn explicit_dead_letter_exchange_is_kept() {
        let queue = QueueConfiguration::new(
            "q",
            &declaration(r#"{"with_dl": true, "arguments": {"x-dead-letter-exchange": "custom"}}"#),
            &config(false),
        );

        let args = &queue.parameters().arguments;
        assert_eq!(
            args.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            Some(&ArgumentValue::from("custom"))
        );
        assert!(!args.contains_key(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY));
    }

    #[test]
    fn delay_and_bindings_are_extracted() {
        let queue = QueueConfiguration::new(
            "q",
            &declaration(
                r#"{"delay": 4, "bindings": [{"exchange": "ex", "routing_key": "rk"}, {"routing_key": "orphan"}]}"#,
            ),
            &config(false),
        );

        assert!(queue.has_delay());
        assert_eq!(queue.delay(), Some(4));
        assert_eq!(queue.bindings().len(), 2);
        assert_eq!(queue.bindings()[0].exchange.as_deref(), Some("ex"));
        assert_eq!(queue.bindings()[0].match_mode, "all");
        assert_eq!(queue.bindings()[1].exchange, None);
    }

    #[test]
    fn empty_retries_do_not_dead_letter() {
        let queue =
            QueueConfiguration::new("q", &declaration(r#"{"retries": []}"#), &config(false));

        assert!(!queue.with_dead_letter());
        assert!(queue.retries().is_empty());
    }

    #[test]
    fn header_matches_become_binding_arguments() {
        let decl: BindingDeclaration = serde_json::from_str(
            r#"{"exchange": "headers", "x_match": "any", "matches": {"format": "pdf", "kind": "report"}}"#,
        )
        .unwrap();

        let args = BindingSpec::from(&decl).arguments();

        assert_eq!(args.len(), 3);
        assert_eq!(args.get("format"), Some(&ArgumentValue::from("pdf")));
        assert_eq!(args.get("kind"), Some(&ArgumentValue::from("report")));
        assert_eq!(args.get(AMQP_ARGUMENTS_MATCH), Some(&ArgumentValue::from("any")));
    }

    #[test]
    fn binding_without_matches_has_no_arguments() {
        let decl: BindingDeclaration =
            serde_json::from_str(r#"{"exchange": "ex", "x-match": "any"}"#).unwrap();

        assert!(BindingSpec::from(&decl).arguments().is_empty());
    }

    #[test]
    fn companion_builder_sets_ttl_and_dead_letter() {
        let params = QueueParameters::new()
            .durable()
            .ttl(5000)
            .dead_letter("retry", "q");

        assert_eq!(params.durable, Some(true));
        assert_eq!(params.arguments.get(AMQP_HEADERS_MESSAGE_TTL), Some(&ArgumentValue::Int(5000)));
        assert_eq!(
            params.arguments.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            Some(&ArgumentValue::from("retry"))
        );
    }
}
