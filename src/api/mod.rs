//! Purpose: Public Rust API boundary for sqlmill.
//! Exports: Outcome layer, config registry, selectors, hub client and project scaffolding.
//! Role: The surface the binary and external callers use; core modules stay reachable but unstable.
//! Invariants: Re-exports are additive; nothing here performs I/O on import.

pub mod hub;
pub mod init;

pub use crate::core::artifacts::{
    CatalogArtifact, InvocationResult, Manifest, RunExecutionResult, RunStatus, load_artifact,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::exit::{
    BoxError, CommandResult, ExitCode, Invocation, Outcome, Presenter, Silent, conclude,
};
pub use crate::core::metadata::{Metadata, metas};
pub use crate::core::patterns::insensitive_patterns;
pub use crate::core::resources::{ConfigRegistry, RegistryVariant, ResourceType, get_config_for};
pub use crate::core::schema::{ConfigSchema, SchemaMode};
pub use crate::core::selectors::{SelectionCriteria, SelectionSpec, Selector, SelectorConfig};
pub use hub::HubClient;
pub use init::{InitOptions, InitSummary, LinePrompter, Prompter, ScriptedPrompter};
