// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for Topology Provisioning
//!
//! This module provides the error taxonomy for building a vhost topology.
//! The `ProvisionError` enum covers configuration problems detected before any
//! broker call is made as well as gateway failures raised while the ordered
//! call sequence is being drained.

use thiserror::Error;

/// Represents errors that can occur while deriving or provisioning a topology.
///
/// None of these errors are recovered locally: any of them aborts the run and
/// is surfaced to the caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProvisionError {
    /// An action was invoked before the vhost was configured
    #[error("vhost must be defined")]
    VhostNotDefined,

    /// A declared binding omits its exchange
    #[error("exchange is missing in binding for queue `{0}`")]
    MissingExchangeInBinding(String),

    /// The vhost declares a queue type other than `classic` or `quorum`
    #[error("invalid queue type `{0}`")]
    InvalidQueueType(String),

    /// The raw configuration could not be turned into a typed declaration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// The gateway cannot perform the requested operation
    #[error("unsupported action `{0}`")]
    UnsupportedAction(String),
}
