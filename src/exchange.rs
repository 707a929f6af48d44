// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! This module provides types for describing RabbitMQ exchanges the way a vhost
//! declaration names them. Exchanges are the routing mechanism in RabbitMQ that
//! determine how messages are distributed to queues. It also hosts the scalar
//! argument vocabulary shared by exchanges, queues and bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Argument naming the exchange that receives messages an exchange cannot route
pub const AMQP_ARGUMENTS_ALTERNATE_EXCHANGE: &str = "alternate-exchange";

/// A scalar broker argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::Str(value.to_owned())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        ArgumentValue::Str(value)
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        ArgumentValue::Int(value)
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        ArgumentValue::Bool(value)
    }
}

/// Named broker arguments, kept sorted so that rendered parameters are stable.
pub type Arguments = BTreeMap<String, ArgumentValue>;

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    #[serde(rename = "x-delayed-message")]
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
        }
    }
}

/// Parameters sent along with an exchange creation.
///
/// Unset fields are left for the broker to default. This struct implements the
/// builder pattern used for the infrastructural exchanges the engine derives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeParameters {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExchangeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: Arguments,
}

impl ExchangeParameters {
    /// Creates empty exchange parameters.
    pub fn new() -> ExchangeParameters {
        ExchangeParameters::default()
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the exchange type to Direct.
    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    /// Sets the exchange type to Topic.
    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = Some(true);
        self
    }

    /// Adds a single argument to the exchange.
    ///
    /// # Parameters
    /// * `key` - The argument name
    /// * `value` - The argument value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.to_owned(), value.into());
        self
    }

    /// Routes whatever this exchange cannot deliver to `exchange`.
    pub fn alternate_exchange(self, exchange: &str) -> Self {
        self.argument(AMQP_ARGUMENTS_ALTERNATE_EXCHANGE, exchange)
    }

    pub fn has_alternate_exchange(&self) -> bool {
        self.arguments.contains_key(AMQP_ARGUMENTS_ALTERNATE_EXCHANGE)
    }
}

/// An exchange as written in a vhost declaration.
///
/// Besides the broker parameters it may carry a `with_unroutable` override of the
/// vhost-level default, which never reaches the broker.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeDeclaration {
    #[serde(rename = "type")]
    pub kind: Option<ExchangeKind>,
    pub durable: Option<bool>,
    pub auto_delete: Option<bool>,
    pub internal: Option<bool>,
    #[serde(default)]
    pub arguments: Arguments,
    pub with_unroutable: Option<bool>,
}

impl ExchangeDeclaration {
    /// Resolves the unroutable flag against the vhost default and returns it with the
    /// parameters to create the exchange with.
    pub fn resolve(&self, vhost_with_unroutable: bool) -> (bool, ExchangeParameters) {
        let with_unroutable = self.with_unroutable.unwrap_or(vhost_with_unroutable);

        let params = ExchangeParameters {
            kind: self.kind.clone(),
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            arguments: self.arguments.clone(),
        };

        (with_unroutable, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_alternate_exchange() {
        let params = ExchangeParameters::new()
            .direct()
            .durable()
            .alternate_exchange("unroutable");

        assert_eq!(params.kind, Some(ExchangeKind::Direct));
        assert_eq!(params.durable, Some(true));
        assert!(params.has_alternate_exchange());
        assert_eq!(
            params.arguments.get(AMQP_ARGUMENTS_ALTERNATE_EXCHANGE),
            Some(&ArgumentValue::from("unroutable"))
        );
    }

    #[test]
    fn declaration_override_wins_over_vhost_default() {
        let decl: ExchangeDeclaration =
            serde_json::from_str(r#"{"type": "headers", "durable": true, "with_unroutable": false}"#)
                .unwrap();

        let (with_unroutable, params) = decl.resolve(true);

        assert!(!with_unroutable);
        assert_eq!(params.kind, Some(ExchangeKind::Headers));
        assert!(params.arguments.is_empty());
    }

    #[test]
    fn declaration_falls_back_to_vhost_default() {
        let decl: ExchangeDeclaration = serde_json::from_str(r#"{"type": "topic"}"#).unwrap();

        let (with_unroutable, _) = decl.resolve(true);

        assert!(with_unroutable);
    }

    #[test]
    fn declaration_rejects_unknown_keys() {
        let decl = serde_json::from_str::<ExchangeDeclaration>(r#"{"type": "topic", "colour": 1}"#);

        assert!(decl.is_err());
    }

    #[test]
    fn parameters_serialize_without_unset_fields() {
        let params = ExchangeParameters::new().durable();

        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            r#"{"durable":true}"#
        );
    }

    #[test]
    fn delayed_kind_maps_to_custom_lapin_kind() {
        let kind: lapin::ExchangeKind = (&ExchangeKind::XMessageDelayed).into();

        assert!(matches!(kind, lapin::ExchangeKind::Custom(ref name) if name == "x-delayed-message"));
    }
}
