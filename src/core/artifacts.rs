//! Purpose: Artifact payloads that commands hand back to the invocation boundary.
//! Exports: `Manifest`, `ManifestNode`, `CatalogArtifact`, `CatalogTable`, `RunExecutionResult`,
//! `RunResult`, `RunStatus`, `InvocationResult`, `load_artifact`.
//! Role: Typed view of `manifest.json`, `catalog.json` and `run_results.json`.
//! Invariants: Unknown JSON fields are ignored so newer artifacts still load.
//! Invariants: Success of a payload is judged here, never by the outcome layer.
use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::resources::ResourceType;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub unique_id: String,
    pub resource_type: ResourceType,
    pub name: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub nodes: BTreeMap<String, ManifestNode>,
    #[serde(default)]
    pub sources: BTreeMap<String, ManifestNode>,
}

impl Manifest {
    pub fn all_nodes(&self) -> impl Iterator<Item = &ManifestNode> {
        self.nodes.values().chain(self.sources.values())
    }

    /// Unique ids of every node whose type is in `types`, or of all nodes when `types` is empty.
    pub fn unique_ids(&self, types: &[ResourceType]) -> Vec<String> {
        self.all_nodes()
            .filter(|node| types.is_empty() || types.contains(&node.resource_type))
            .map(|node| node.unique_id.clone())
            .collect()
    }

    pub fn counts_by_type(&self) -> BTreeMap<ResourceType, usize> {
        let mut counts = BTreeMap::new();
        for node in self.all_nodes() {
            *counts.entry(node.resource_type).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    #[serde(rename = "type")]
    pub data_type: String,
    pub index: u32,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub metadata: TableMetadata,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMetadata>,
    pub unique_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogArtifact {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub nodes: BTreeMap<String, CatalogTable>,
    #[serde(default)]
    pub sources: BTreeMap<String, CatalogTable>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl CatalogArtifact {
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "skipped")]
    Skipped,
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "runtime error")]
    RuntimeErr,
    #[serde(rename = "partial success")]
    PartialSuccess,
    #[serde(rename = "no-op")]
    NoOp,
}

impl RunStatus {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Error | RunStatus::Fail | RunStatus::RuntimeErr | RunStatus::PartialSuccess
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub unique_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub failures: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunExecutionResult {
    #[serde(default)]
    pub results: Vec<RunResult>,
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(default)]
    pub generated_at: Option<String>,
}

impl RunExecutionResult {
    pub fn failed(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|result| result.status.is_failure())
    }

    pub fn succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// What an invocation produced, by command family.
#[derive(Clone, Debug, PartialEq)]
pub enum InvocationResult {
    /// `debug`
    Bool(bool),
    /// `catalog`
    Catalog(CatalogArtifact),
    /// `ls`, `selectors`, `hub`
    Names(Vec<String>),
    /// `manifest`
    Manifest(Manifest),
    /// `init`, `config`, `completion`
    Empty,
    /// `results`
    Run(RunExecutionResult),
}

impl InvocationResult {
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationResult::Bool(_) => "bool",
            InvocationResult::Catalog(_) => "catalog",
            InvocationResult::Names(_) => "names",
            InvocationResult::Manifest(_) => "manifest",
            InvocationResult::Empty => "empty",
            InvocationResult::Run(_) => "run",
        }
    }

    pub fn to_json(&self) -> Value {
        let encoded = match self {
            InvocationResult::Bool(value) => Ok(json!(value)),
            InvocationResult::Catalog(catalog) => serde_json::to_value(catalog),
            InvocationResult::Names(names) => Ok(json!(names)),
            InvocationResult::Manifest(manifest) => serde_json::to_value(manifest),
            InvocationResult::Empty => Ok(Value::Null),
            InvocationResult::Run(run) => serde_json::to_value(run),
        };
        encoded.unwrap_or(Value::Null)
    }
}

pub fn load_artifact<T>(path: &Path) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let text = std::fs::read_to_string(path)
        .map_err(|err| Error::io("failed to read artifact", path, err))?;
    serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Config)
            .with_message("invalid artifact json")
            .with_path(path)
            .with_source(err)
    })
}
