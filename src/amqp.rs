// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Broker Action
//!
//! An `Action` that declares exchanges, queues and bindings through an AMQP
//! channel. The channel is already bound to a vhost, so vhost lifecycle and user
//! permissions, which only the management API exposes, are reported as unsupported.

use crate::{
    action::{Action, PermissionSet},
    channel::BrokerCredentials,
    errors::ProvisionError,
    exchange::{ArgumentValue, Arguments, ExchangeParameters},
    queue::QueueParameters,
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};

pub struct AmqpAction {
    channel: Arc<Channel>,
    vhost: Option<String>,
}

impl AmqpAction {
    /// Creates an action declaring objects through `channel`.
    ///
    /// The vhost must still be set with `set_vhost` before any declaration.
    pub fn new(channel: Arc<Channel>) -> AmqpAction {
        AmqpAction {
            channel,
            vhost: None,
        }
    }

    fn ensure_vhost_defined(&self) -> Result<(), ProvisionError> {
        match self.vhost.as_deref() {
            Some(vhost) if !vhost.is_empty() => Ok(()),
            _ => Err(ProvisionError::VhostNotDefined),
        }
    }

    fn unsupported(&self, operation: &str) -> Result<(), ProvisionError> {
        self.ensure_vhost_defined()?;
        error!(operation, "operation is not available over amqp");
        Err(ProvisionError::UnsupportedAction(operation.to_owned()))
    }
}

fn amqp_value(value: &ArgumentValue) -> AMQPValue {
    match value {
        ArgumentValue::Bool(v) => AMQPValue::Boolean(*v),
        ArgumentValue::Int(v) => AMQPValue::LongLongInt(*v),
        ArgumentValue::Float(v) => AMQPValue::Double(*v),
        ArgumentValue::Str(v) => AMQPValue::LongString(LongString::from(v.clone())),
    }
}

fn field_table(arguments: &Arguments) -> FieldTable {
    let table: BTreeMap<ShortString, AMQPValue> = arguments
        .iter()
        .map(|(key, value)| (ShortString::from(key.clone()), amqp_value(value)))
        .collect();

    FieldTable::from(table)
}

#[async_trait]
impl Action for AmqpAction {
    fn set_vhost(&mut self, vhost: &str) {
        self.vhost = Some(vhost.to_owned());
    }

    async fn create_exchange(
        &self,
        name: &str,
        parameters: &ExchangeParameters,
    ) -> Result<(), ProvisionError> {
        self.ensure_vhost_defined()?;
        debug!("creating exchange: {}", name);

        let kind = parameters.kind.clone().unwrap_or_default();

        match self
            .channel
            .exchange_declare(
                name,
                (&kind).into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: parameters.durable.unwrap_or_default(),
                    auto_delete: parameters.auto_delete.unwrap_or_default(),
                    internal: parameters.internal.unwrap_or_default(),
                    nowait: false,
                },
                field_table(&parameters.arguments),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name, "error to declare the exchange"
                );
                Err(ProvisionError::DeclareExchangeError(name.to_owned()))
            }
            _ => {
                debug!("exchange: {} was created", name);
                Ok(())
            }
        }
    }

    async fn create_queue(
        &self,
        name: &str,
        parameters: &QueueParameters,
    ) -> Result<(), ProvisionError> {
        self.ensure_vhost_defined()?;
        debug!("creating queue: {}", name);

        match self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: false,
                    durable: parameters.durable.unwrap_or_default(),
                    exclusive: false,
                    auto_delete: parameters.auto_delete.unwrap_or_default(),
                    nowait: false,
                },
                field_table(&parameters.arguments),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the queue");
                Err(ProvisionError::DeclareQueueError(name.to_owned()))
            }
            _ => {
                debug!("queue: {} was created", name);
                Ok(())
            }
        }
    }

    async fn create_binding(
        &self,
        exchange: &str,
        queue: &str,
        routing_key: Option<String>,
        arguments: &Arguments,
    ) -> Result<(), ProvisionError> {
        self.ensure_vhost_defined()?;
        let routing_key = routing_key.unwrap_or_default();
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue, exchange, routing_key
        );

        match self
            .channel
            .queue_bind(
                queue,
                exchange,
                &routing_key,
                QueueBindOptions { nowait: false },
                field_table(arguments),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(ProvisionError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn set_permissions(
        &self,
        _user: &str,
        _permissions: &PermissionSet,
    ) -> Result<(), ProvisionError> {
        self.unsupported("set_permissions")
    }

    async fn create_vhost(&self, _credentials: &BrokerCredentials) -> Result<(), ProvisionError> {
        self.unsupported("create_vhost")
    }

    async fn delete_vhost(&self) -> Result<(), ProvisionError> {
        self.unsupported("delete_vhost")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_become_a_field_table() {
        let mut arguments = Arguments::new();
        arguments.insert("x-message-ttl".to_owned(), ArgumentValue::Int(5000));
        arguments.insert("x-dead-letter-exchange".to_owned(), ArgumentValue::from("retry"));
        arguments.insert("x-single-active-consumer".to_owned(), ArgumentValue::Bool(true));

        let table = field_table(&arguments);
        let inner = table.inner();

        assert_eq!(inner.len(), 3);
        assert_eq!(
            inner.get(&ShortString::from("x-message-ttl")),
            Some(&AMQPValue::LongLongInt(5000))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString(LongString::from("retry")))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-single-active-consumer")),
            Some(&AMQPValue::Boolean(true))
        );
    }
}
