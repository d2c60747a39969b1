//! Purpose: Resolve a resource type tag to the config schema that governs it.
//! Exports: `ResourceType`, `ConfigRegistry`, `RegistryVariant`, `get_config_for`.
//! Role: Static lookup used by config finalization and the `config` command.
//! Invariants: Lookups are total; unregistered tags resolve to `ConfigSchema::Node`.
//! Invariants: `full` and `base` are separate tables even though they start identical.
//! Invariants: The process-wide registry is built once and never written afterwards.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::ConfigSchema;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Model,
    Analysis,
    Test,
    Snapshot,
    Operation,
    Seed,
    #[serde(rename = "rpc")]
    RpcCall,
    SqlOperation,
    #[serde(rename = "doc")]
    Documentation,
    Source,
    Macro,
    Exposure,
    Metric,
    Group,
    SavedQuery,
    SemanticModel,
    #[serde(rename = "unit_test")]
    Unit,
    Fixture,
}

impl ResourceType {
    pub const ALL: [ResourceType; 18] = [
        ResourceType::Model,
        ResourceType::Analysis,
        ResourceType::Test,
        ResourceType::Snapshot,
        ResourceType::Operation,
        ResourceType::Seed,
        ResourceType::RpcCall,
        ResourceType::SqlOperation,
        ResourceType::Documentation,
        ResourceType::Source,
        ResourceType::Macro,
        ResourceType::Exposure,
        ResourceType::Metric,
        ResourceType::Group,
        ResourceType::SavedQuery,
        ResourceType::SemanticModel,
        ResourceType::Unit,
        ResourceType::Fixture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Model => "model",
            ResourceType::Analysis => "analysis",
            ResourceType::Test => "test",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Operation => "operation",
            ResourceType::Seed => "seed",
            ResourceType::RpcCall => "rpc",
            ResourceType::SqlOperation => "sql_operation",
            ResourceType::Documentation => "doc",
            ResourceType::Source => "source",
            ResourceType::Macro => "macro",
            ResourceType::Exposure => "exposure",
            ResourceType::Metric => "metric",
            ResourceType::Group => "group",
            ResourceType::SavedQuery => "saved_query",
            ResourceType::SemanticModel => "semantic_model",
            ResourceType::Unit => "unit_test",
            ResourceType::Fixture => "fixture",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase().replace('-', "_");
        ResourceType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == normalized)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown resource type '{input}'"))
                    .with_hint("Use one of: model, seed, snapshot, test, source, exposure, metric, semantic_model, saved_query, unit_test, group.")
            })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegistryVariant {
    Full,
    Base,
}

impl RegistryVariant {
    pub fn from_base_flag(base: bool) -> Self {
        if base {
            RegistryVariant::Base
        } else {
            RegistryVariant::Full
        }
    }
}

const REGISTERED: [(ResourceType, ConfigSchema); 11] = [
    (ResourceType::Metric, ConfigSchema::Metric),
    (ResourceType::SemanticModel, ConfigSchema::SemanticModel),
    (ResourceType::SavedQuery, ConfigSchema::SavedQuery),
    (ResourceType::Exposure, ConfigSchema::Exposure),
    (ResourceType::Source, ConfigSchema::Source),
    (ResourceType::Seed, ConfigSchema::Seed),
    (ResourceType::Test, ConfigSchema::Test),
    (ResourceType::Model, ConfigSchema::Model),
    (ResourceType::Snapshot, ConfigSchema::Snapshot),
    (ResourceType::Unit, ConfigSchema::UnitTest),
    (ResourceType::Group, ConfigSchema::Group),
];

/// Two lookup tables from resource type to config schema.
///
/// The base table is meant for contexts where no config field is mandatory.
/// It is seeded from the same entries as the full table but can be changed
/// on its own.
#[derive(Clone, Debug)]
pub struct ConfigRegistry {
    full: HashMap<ResourceType, ConfigSchema>,
    base: HashMap<ResourceType, ConfigSchema>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        let full: HashMap<_, _> = REGISTERED.into_iter().collect();
        let base = full.clone();
        Self { full, base }
    }

    pub fn empty() -> Self {
        Self {
            full: HashMap::new(),
            base: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        variant: RegistryVariant,
        resource_type: ResourceType,
        schema: ConfigSchema,
    ) -> Option<ConfigSchema> {
        self.table_mut(variant).insert(resource_type, schema)
    }

    pub fn unregister(
        &mut self,
        variant: RegistryVariant,
        resource_type: ResourceType,
    ) -> Option<ConfigSchema> {
        self.table_mut(variant).remove(&resource_type)
    }

    pub fn config_for(&self, resource_type: ResourceType, base: bool) -> ConfigSchema {
        let table = match RegistryVariant::from_base_flag(base) {
            RegistryVariant::Full => &self.full,
            RegistryVariant::Base => &self.base,
        };
        table
            .get(&resource_type)
            .copied()
            .unwrap_or(ConfigSchema::Node)
    }

    pub fn is_registered(&self, variant: RegistryVariant, resource_type: ResourceType) -> bool {
        match variant {
            RegistryVariant::Full => self.full.contains_key(&resource_type),
            RegistryVariant::Base => self.base.contains_key(&resource_type),
        }
    }

    fn table_mut(&mut self, variant: RegistryVariant) -> &mut HashMap<ResourceType, ConfigSchema> {
        match variant {
            RegistryVariant::Full => &mut self.full,
            RegistryVariant::Base => &mut self.base,
        }
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: OnceLock<ConfigRegistry> = OnceLock::new();

pub fn registry() -> &'static ConfigRegistry {
    REGISTRY.get_or_init(ConfigRegistry::new)
}

pub fn get_config_for(resource_type: ResourceType, base: bool) -> ConfigSchema {
    let schema = registry().config_for(resource_type, base);
    tracing::debug!(%resource_type, base, schema = schema.name(), "resolved config schema");
    schema
}
