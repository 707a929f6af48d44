// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Vhost Configuration
//!
//! This module provides the read-only view over one vhost's declared topology.
//! The declaration is a strictly typed tree: unknown keys are rejected while
//! deserializing, and every section keeps the order in which its entries were
//! declared so that provisioning follows the configuration file.

use crate::{
    errors::ProvisionError,
    exchange::ExchangeDeclaration,
    queue::QueueDeclaration,
};
use serde::{
    de::{self, IgnoredAny, MapAccess, SeqAccess, Unexpected, Visitor},
    Deserialize, Deserializer,
};
use std::{fmt, io::Read, marker::PhantomData, str::FromStr};

/// Named entries of a configuration section, in declaration order.
///
/// A section written as `null`, `""` or an empty list is treated as empty, so
/// that hand-written files which leave a section blank still load.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<T>(Vec<(String, T)>);

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section(Vec::new())
    }
}

impl<T> Section<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for Section<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Section(iter.into_iter().collect())
    }
}

struct SectionVisitor<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for SectionVisitor<T>
where
    T: Deserialize<'de>,
{
    type Value = Section<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping or an empty value")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries: Vec<(String, T)> = Vec::with_capacity(map.size_hint().unwrap_or(0));

        while let Some((name, value)) = map.next_entry::<String, T>()? {
            if entries.iter().any(|(entry, _)| *entry == name) {
                return Err(de::Error::custom(format!("duplicate entry `{name}`")));
            }
            entries.push((name, value));
        }

        Ok(Section(entries))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_type(Unexpected::Seq, &self));
        }

        Ok(Section::default())
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if !value.is_empty() {
            return Err(E::invalid_value(Unexpected::Str(value), &self));
        }

        Ok(Section::default())
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Section::default())
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Section::default())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, T> Deserialize<'de> for Section<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SectionVisitor(PhantomData))
    }
}

/// Queue implementation forced on every queue of the vhost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Classic,
    Quorum,
}

impl QueueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Classic => "classic",
            QueueType::Quorum => "quorum",
        }
    }
}

impl FromStr for QueueType {
    type Err = ProvisionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "classic" => Ok(QueueType::Classic),
            "quorum" => Ok(QueueType::Quorum),
            other => Err(ProvisionError::InvalidQueueType(other.to_owned())),
        }
    }
}

/// Vhost-wide feature flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VhostParameters {
    pub with_dl: Option<bool>,
    pub with_unroutable: Option<bool>,
    pub queue_type: Option<String>,
}

/// Permissions granted to one user on the vhost.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionDeclaration {
    pub configure: Option<String>,
    pub read: Option<String>,
    pub write: Option<String>,
}

/// Everything declared for one vhost.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VhostDefinition {
    #[serde(default)]
    pub parameters: Option<VhostParameters>,
    #[serde(default)]
    pub exchanges: Section<ExchangeDeclaration>,
    #[serde(default)]
    pub queues: Section<QueueDeclaration>,
    #[serde(default)]
    pub permissions: Section<Option<PermissionDeclaration>>,
}

/// Immutable view over one vhost's declared topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    vhost: String,
    has_dead_letter_exchange: bool,
    has_unroutable_exchange: bool,
    queue_type: Option<QueueType>,
    definition: VhostDefinition,
}

impl Configuration {
    /// Builds the configuration of `vhost`, validating its queue type.
    pub fn new(vhost: &str, definition: VhostDefinition) -> Result<Configuration, ProvisionError> {
        let parameters = definition.parameters.clone().unwrap_or_default();

        let queue_type = parameters
            .queue_type
            .as_deref()
            .map(QueueType::from_str)
            .transpose()?;

        Ok(Configuration {
            vhost: vhost.to_owned(),
            has_dead_letter_exchange: parameters.with_dl.unwrap_or(false),
            has_unroutable_exchange: parameters.with_unroutable.unwrap_or(false),
            queue_type,
            definition,
        })
    }

    /// Parses a `{ <vhost>: { ... } }` JSON document.
    pub fn from_json_str(raw: &str) -> Result<Configuration, ProvisionError> {
        let root: Section<VhostDefinition> = serde_json::from_str(raw).map_err(invalid)?;
        Self::from_root(root)
    }

    pub fn from_json_slice(raw: &[u8]) -> Result<Configuration, ProvisionError> {
        let root: Section<VhostDefinition> = serde_json::from_slice(raw).map_err(invalid)?;
        Self::from_root(root)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Configuration, ProvisionError> {
        let root: Section<VhostDefinition> = serde_json::from_reader(reader).map_err(invalid)?;
        Self::from_root(root)
    }

    fn from_root(root: Section<VhostDefinition>) -> Result<Configuration, ProvisionError> {
        if root.len() != 1 {
            return Err(ProvisionError::InvalidConfiguration(format!(
                "expected exactly one vhost, found {}",
                root.len()
            )));
        }

        let Some((vhost, definition)) = root.0.into_iter().next() else {
            return Err(ProvisionError::InvalidConfiguration("missing vhost".to_owned()));
        };

        Self::new(&vhost, definition)
    }

    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    pub fn has_dead_letter_exchange(&self) -> bool {
        self.has_dead_letter_exchange
    }

    pub fn has_unroutable_exchange(&self) -> bool {
        self.has_unroutable_exchange
    }

    pub fn has_queue_type_override(&self) -> bool {
        self.queue_type.is_some()
    }

    pub fn queue_type(&self) -> Option<QueueType> {
        self.queue_type
    }

    pub fn exchanges(&self) -> &Section<ExchangeDeclaration> {
        &self.definition.exchanges
    }

    pub fn queues(&self) -> &Section<QueueDeclaration> {
        &self.definition.queues
    }

    pub fn permissions(&self) -> &Section<Option<PermissionDeclaration>> {
        &self.definition.permissions
    }
}

fn invalid(err: serde_json::Error) -> ProvisionError {
    ProvisionError::InvalidConfiguration(err.to_string())
}
