// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Provisioning
//!
//! This module derives the full set of broker objects a vhost declaration implies
//! and provisions them. Besides the declared exchanges and queues it creates the
//! unroutable sink, the shared `dl`, `retry` and `delay` exchanges and, per queue,
//! the dead-letter twin, the delay hop and the retry ladder.
//!
//! The main components are:
//! - `Intent`: one broker call, recorded but not yet issued
//! - `Topology`: the planner turning a `Configuration` into ordered intents
//! - `VhostManager`: the executor draining intents through an `Action`
//!
//! Intents are emitted so that every exchange or queue exists before anything
//! references it.

use crate::{
    action::{Action, PermissionSet},
    channel::BrokerCredentials,
    config::Configuration,
    errors::ProvisionError,
    exchange::{Arguments, ExchangeParameters},
    queue::{
        QueueConfiguration, QueueParameters, AMQP_ARGUMENTS_QUEUE_TYPE, DEAD_LETTER_EXCHANGE,
    },
    specification::{
        DeadLetterExchangeCanBeCreated, DelayExchangeCanBeCreated, RetryExchangeCanBeCreated,
        Specification,
    },
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Fanout exchange and queue collecting messages no binding accepts
pub const UNROUTABLE: &str = "unroutable";
/// Topic exchange feeding and draining the retry ladders
pub const RETRY_EXCHANGE: &str = "retry";
/// Exchange returning delayed messages to their queue
pub const DELAY_EXCHANGE: &str = "delay";

/// One broker call, in the order it must be issued.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    CreateExchange {
        name: String,
        parameters: ExchangeParameters,
    },
    CreateQueue {
        name: String,
        parameters: QueueParameters,
    },
    CreateBinding {
        exchange: String,
        queue: String,
        routing_key: Option<String>,
        arguments: Arguments,
    },
    SetPermissions {
        user: String,
        permissions: PermissionSet,
    },
}

fn dead_letter_queue_name(queue: &str) -> String {
    format!("{queue}_dl")
}

fn delay_queue_name(queue: &str, delay: u32) -> String {
    format!("{queue}_delay_{delay}")
}

fn retry_queue_name(queue: &str, seconds: u32) -> String {
    format!("{queue}_retry_{seconds}")
}

fn retry_routing_key(queue: &str, step: usize) -> String {
    format!("{queue}_retry_{step}")
}

/// Planner deriving the ordered intents of one vhost.
pub struct Topology<'tp> {
    config: &'tp Configuration,
    intents: Vec<Intent>,
}

impl<'tp> Topology<'tp> {
    /// Derives every call needed to provision `config`, in issuing order.
    ///
    /// The order is:
    /// 1. Unroutable sink and the shared `dl`, `retry` and `delay` exchanges
    /// 2. Declared exchanges
    /// 3. Declared queues, each followed by its companions and bindings
    /// 4. Permissions
    ///
    /// # Returns
    /// The intents, or `MissingExchangeInBinding` when a binding names no exchange
    pub fn plan(config: &'tp Configuration) -> Result<Vec<Intent>, ProvisionError> {
        let mut topology = Topology {
            config,
            intents: vec![],
        };

        topology.base_structure();
        topology.exchanges();
        topology.queues()?;
        topology.permissions();

        Ok(topology.intents)
    }

    fn create_exchange(&mut self, name: &str, parameters: ExchangeParameters) {
        self.intents.push(Intent::CreateExchange {
            name: name.to_owned(),
            parameters,
        });
    }

    /// Every queue gets the vhost queue type, whatever it declared.
    fn create_queue(&mut self, name: &str, mut parameters: QueueParameters) {
        if let Some(queue_type) = self.config.queue_type() {
            parameters = parameters.argument(AMQP_ARGUMENTS_QUEUE_TYPE, queue_type.as_str());
        }

        self.intents.push(Intent::CreateQueue {
            name: name.to_owned(),
            parameters,
        });
    }

    fn create_binding(
        &mut self,
        exchange: &str,
        queue: &str,
        routing_key: Option<&str>,
        arguments: Arguments,
    ) {
        self.intents.push(Intent::CreateBinding {
            exchange: exchange.to_owned(),
            queue: queue.to_owned(),
            routing_key: routing_key.map(str::to_owned),
            arguments,
        });
    }

    fn base_structure(&mut self) {
        // the sink also catches whatever the dl exchange cannot route
        if self.config.has_dead_letter_exchange() || self.config.has_unroutable_exchange() {
            self.create_exchange(UNROUTABLE, ExchangeParameters::new().fanout().durable());
            self.create_queue(UNROUTABLE, QueueParameters::new().auto_delete(false).durable());
            self.create_binding(UNROUTABLE, UNROUTABLE, None, Arguments::new());
        }

        if DeadLetterExchangeCanBeCreated.is_satisfied_by(self.config) {
            self.create_exchange(
                DEAD_LETTER_EXCHANGE,
                ExchangeParameters::new()
                    .direct()
                    .durable()
                    .alternate_exchange(UNROUTABLE),
            );
        }

        if RetryExchangeCanBeCreated.is_satisfied_by(self.config) {
            self.create_exchange(
                RETRY_EXCHANGE,
                ExchangeParameters::new()
                    .topic()
                    .durable()
                    .alternate_exchange(UNROUTABLE),
            );
        }

        if DelayExchangeCanBeCreated.is_satisfied_by(self.config) {
            self.create_exchange(DELAY_EXCHANGE, ExchangeParameters::new().durable());
        }
    }

    fn exchanges(&mut self) {
        let config = self.config;

        for (name, decl) in config.exchanges().iter() {
            let (with_unroutable, mut parameters) =
                decl.resolve(config.has_unroutable_exchange());

            if with_unroutable && !parameters.has_alternate_exchange() {
                parameters = parameters.alternate_exchange(UNROUTABLE);
            }

            self.create_exchange(name, parameters);
        }
    }

    fn queues(&mut self) -> Result<(), ProvisionError> {
        let config = self.config;

        for (name, decl) in config.queues().iter() {
            let queue = QueueConfiguration::new(name, decl, config);
            self.queue(&queue)?;
        }

        Ok(())
    }

    fn queue(&mut self, queue: &QueueConfiguration) -> Result<(), ProvisionError> {
        let name = queue.name();

        self.create_queue(name, queue.parameters().clone());

        if let Some(delay) = queue.delay() {
            self.delay_artifacts(name, delay);
        }

        if queue.with_dead_letter() {
            self.dead_letter_artifacts(name);
        }

        self.retry_ladder(name, queue.retries());

        // delayed queues receive their traffic through the delay hop
        let target = match queue.delay() {
            Some(delay) => delay_queue_name(name, delay),
            None => name.to_owned(),
        };

        for binding in queue.bindings() {
            let Some(exchange) = binding.exchange.as_deref() else {
                return Err(ProvisionError::MissingExchangeInBinding(name.to_owned()));
            };

            self.create_binding(
                exchange,
                &target,
                binding.routing_key.as_deref(),
                binding.arguments(),
            );
        }

        Ok(())
    }

    fn delay_artifacts(&mut self, name: &str, delay: u32) {
        self.create_queue(
            &delay_queue_name(name, delay),
            QueueParameters::new()
                .durable()
                .ttl(i64::from(delay))
                .dead_letter(DELAY_EXCHANGE, name),
        );
        self.create_binding(DELAY_EXCHANGE, name, Some(name), Arguments::new());
    }

    fn dead_letter_artifacts(&mut self, name: &str) {
        let dl_queue = dead_letter_queue_name(name);

        self.create_queue(&dl_queue, QueueParameters::new().durable());
        self.create_binding(DEAD_LETTER_EXCHANGE, &dl_queue, Some(name), Arguments::new());
    }

    /// Step `i` waits `retries[i]` seconds, then is routed back to the queue.
    /// Steps sharing a delay share one queue.
    fn retry_ladder(&mut self, name: &str, retries: &[u32]) {
        let mut created = HashSet::new();

        for (step, &seconds) in retries.iter().enumerate() {
            if step == 0 {
                self.create_binding(RETRY_EXCHANGE, name, Some(name), Arguments::new());
            }

            let retry_queue = retry_queue_name(name, seconds);

            if created.insert(retry_queue.clone()) {
                self.create_queue(
                    &retry_queue,
                    QueueParameters::new()
                        .durable()
                        .ttl(i64::from(seconds) * 1000)
                        .dead_letter(RETRY_EXCHANGE, name),
                );
            }

            self.create_binding(
                RETRY_EXCHANGE,
                &retry_queue,
                Some(retry_routing_key(name, step + 1).as_str()),
                Arguments::new(),
            );
        }
    }

    fn permissions(&mut self) {
        for (user, decl) in self.config.permissions().iter() {
            self.intents.push(Intent::SetPermissions {
                user: user.to_owned(),
                permissions: PermissionSet::from(decl.as_ref()),
            });
        }
    }
}

/// Provisions one vhost through an `Action`.
pub struct VhostManager<A: Action> {
    credentials: BrokerCredentials,
    action: A,
}

impl<A: Action> VhostManager<A> {
    /// Creates a manager for the vhost named in `credentials` and points `action` at it.
    pub fn new(credentials: BrokerCredentials, mut action: A) -> VhostManager<A> {
        action.set_vhost(&credentials.encoded_vhost());

        VhostManager {
            credentials,
            action,
        }
    }

    /// Deletes the vhost, then creates it again empty.
    pub async fn reset_vhost(&self) -> Result<(), ProvisionError> {
        debug!("resetting vhost: {}", self.credentials.vhost);

        self.action.delete_vhost().await?;
        self.action.create_vhost(&self.credentials).await
    }

    /// Creates every object `config` declares or implies.
    ///
    /// Nothing is sent to the broker when the configuration is invalid. Otherwise
    /// calls are issued one at a time and the first failure aborts the run,
    /// possibly leaving a partial topology behind.
    pub async fn create_mapping(&self, config: &Configuration) -> Result<(), ProvisionError> {
        info!(
            vhost = config.vhost(),
            with_dl = config.has_dead_letter_exchange(),
            with_unroutable = config.has_unroutable_exchange(),
            "creating mapping"
        );

        let intents = Topology::plan(config)?;
        self.execute(&intents).await?;

        debug!("mapping for vhost: {} was created", config.vhost());
        Ok(())
    }

    /// Issues `intents` in order, stopping at the first failure.
    pub async fn execute(&self, intents: &[Intent]) -> Result<(), ProvisionError> {
        for intent in intents {
            match intent {
                Intent::CreateExchange { name, parameters } => {
                    debug!("creating exchange: {}", name);
                    self.action.create_exchange(name, parameters).await?;
                }
                Intent::CreateQueue { name, parameters } => {
                    debug!("creating queue: {}", name);
                    self.action.create_queue(name, parameters).await?;
                }
                Intent::CreateBinding {
                    exchange,
                    queue,
                    routing_key,
                    arguments,
                } => {
                    debug!(
                        "binding queue: {} to the exchange: {} with the key: {}",
                        queue,
                        exchange,
                        routing_key.as_deref().unwrap_or("none")
                    );
                    self.action
                        .create_binding(exchange, queue, routing_key.clone(), arguments)
                        .await?;
                }
                Intent::SetPermissions { user, permissions } => {
                    debug!("granting permissions to: {}", user);
                    self.action.set_permissions(user, permissions).await?;
                }
            }
        }

        Ok(())
    }
}
