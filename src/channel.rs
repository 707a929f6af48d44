// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the broker credentials and the creation of AMQP connections
//! and channels used to declare a topology.

use crate::errors::ProvisionError;
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

const CONNECTION_NAME: &str = "rabbitmq-topology";

/// Credentials and location of the broker whose vhost is provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl BrokerCredentials {
    /// The vhost name as it appears in a URI path segment.
    pub fn encoded_vhost(&self) -> String {
        self.vhost.replace('/', "%2f")
    }

    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user,
            self.password,
            self.host,
            self.port,
            self.encoded_vhost()
        )
    }
}

/// Creates a new AMQP channel for communication with RabbitMQ.
///
/// This function establishes a connection to the vhost named in `credentials`,
/// then creates a channel on that connection.
/// Both the connection and channel are wrapped in Arc for thread-safe sharing.
///
/// # Returns
/// * `Result<(Arc<Connection>, Arc<Channel>), ProvisionError>` -
///   A tuple containing the connection and channel on success, or an error on failure.
pub async fn new_amqp_channel(
    credentials: &BrokerCredentials,
) -> Result<(Arc<Connection>, Arc<Channel>), ProvisionError> {
    debug!("creating amqp connection...");
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(CONNECTION_NAME));

    let conn = match Connection::connect(&credentials.amqp_uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(ProvisionError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(ProvisionError::ChannelError)
        }
    }
}
