// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Actions
//!
//! This module defines the `Action` port through which the provisioning engine
//! reaches the broker, and a dry-run implementation that only reports what would
//! be created. Every action other than `set_vhost` fails with
//! `ProvisionError::VhostNotDefined` until a vhost has been set.

use crate::{
    channel::BrokerCredentials,
    config::PermissionDeclaration,
    errors::ProvisionError,
    exchange::{Arguments, ExchangeParameters},
    queue::QueueParameters,
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::info;

/// Permissions granted to a user on the vhost, as regular expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    pub configure: String,
    pub read: String,
    pub write: String,
}

impl From<Option<&PermissionDeclaration>> for PermissionSet {
    fn from(decl: Option<&PermissionDeclaration>) -> Self {
        let Some(decl) = decl else {
            return PermissionSet::default();
        };

        PermissionSet {
            configure: decl.configure.clone().unwrap_or_default(),
            read: decl.read.clone().unwrap_or_default(),
            write: decl.write.clone().unwrap_or_default(),
        }
    }
}

/// Trait defining the calls the engine issues against a broker.
///
/// Implementations are expected to treat the re-creation of an identical object
/// as a no-op; nothing here retries.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Action: Send + Sync {
    /// Selects the vhost every later call applies to.
    fn set_vhost(&mut self, vhost: &str);

    async fn create_exchange(
        &self,
        name: &str,
        parameters: &ExchangeParameters,
    ) -> Result<(), ProvisionError>;

    async fn create_queue(&self, name: &str, parameters: &QueueParameters)
        -> Result<(), ProvisionError>;

    /// Binds `queue` to `exchange`, without routing key when `routing_key` is `None`.
    async fn create_binding(
        &self,
        exchange: &str,
        queue: &str,
        routing_key: Option<String>,
        arguments: &Arguments,
    ) -> Result<(), ProvisionError>;

    async fn set_permissions(
        &self,
        user: &str,
        permissions: &PermissionSet,
    ) -> Result<(), ProvisionError>;

    async fn create_vhost(&self, credentials: &BrokerCredentials) -> Result<(), ProvisionError>;

    async fn delete_vhost(&self) -> Result<(), ProvisionError>;
}

/// An `Action` that performs no I/O and logs every call it receives.
#[derive(Debug, Default)]
pub struct DryRunAction {
    vhost: Option<String>,
}

impl DryRunAction {
    pub fn new() -> DryRunAction {
        DryRunAction::default()
    }

    fn vhost(&self) -> Result<&str, ProvisionError> {
        match self.vhost.as_deref() {
            Some(vhost) if !vhost.is_empty() => Ok(vhost),
            _ => Err(ProvisionError::VhostNotDefined),
        }
    }
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[async_trait]
impl Action for DryRunAction {
    fn set_vhost(&mut self, vhost: &str) {
        self.vhost = Some(vhost.to_owned());
    }

    async fn create_exchange(
        &self,
        name: &str,
        parameters: &ExchangeParameters,
    ) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(
            vhost,
            exchange = name,
            parameters = %render(parameters),
            "create exchange"
        );
        Ok(())
    }

    async fn create_queue(
        &self,
        name: &str,
        parameters: &QueueParameters,
    ) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(vhost, queue = name, parameters = %render(parameters), "create queue");
        Ok(())
    }

    async fn create_binding(
        &self,
        exchange: &str,
        queue: &str,
        routing_key: Option<String>,
        arguments: &Arguments,
    ) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(
            vhost,
            exchange,
            queue,
            routing_key = routing_key.as_deref().unwrap_or("none"),
            arguments = %render(arguments),
            "create binding"
        );
        Ok(())
    }

    async fn set_permissions(
        &self,
        user: &str,
        permissions: &PermissionSet,
    ) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(vhost, user, permissions = %render(permissions), "grant permissions");
        Ok(())
    }

    async fn create_vhost(&self, credentials: &BrokerCredentials) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(vhost, host = %credentials.host, user = %credentials.user, "create vhost");
        Ok(())
    }

    async fn delete_vhost(&self) -> Result<(), ProvisionError> {
        let vhost = self.vhost()?;
        info!(vhost, "delete vhost");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_requires_a_vhost() {
        let action = DryRunAction::new();

        assert_eq!(
            action
                .create_exchange("dl", &ExchangeParameters::new())
                .await,
            Err(ProvisionError::VhostNotDefined)
        );
        assert_eq!(
            action.delete_vhost().await,
            Err(ProvisionError::VhostNotDefined)
        );
    }

    #[tokio::test]
    async fn dry_run_rejects_an_empty_vhost() {
        let mut action = DryRunAction::new();
        action.set_vhost("");

        assert_eq!(
            action.create_queue("q", &QueueParameters::new()).await,
            Err(ProvisionError::VhostNotDefined)
        );
    }

    #[tokio::test]
    async fn dry_run_accepts_calls_once_vhost_is_set() {
        let mut action = DryRunAction::new();
        action.set_vhost("my_vhost");

        assert!(action.create_queue("q", &QueueParameters::new()).await.is_ok());
        assert!(action
            .create_binding("ex", "q", None, &Arguments::new())
            .await
            .is_ok());
        assert!(action
            .set_permissions("admin", &PermissionSet::default())
            .await
            .is_ok());
    }

    #[test]
    fn permissions_default_to_empty_strings() {
        let decl = PermissionDeclaration {
            configure: Some(".*".to_owned()),
            read: None,
            write: Some("^amq".to_owned()),
        };

        assert_eq!(
            PermissionSet::from(Some(&decl)),
            PermissionSet {
                configure: ".*".to_owned(),
                read: String::new(),
                write: "^amq".to_owned(),
            }
        );
        assert_eq!(PermissionSet::from(None), PermissionSet::default());
    }
}
