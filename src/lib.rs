//! Purpose: Library crate behind the `sqlmill` CLI and its tests.
//! Exports: `core` (outcomes, config registry, schemas, selectors, artifacts, errors),
//! `api` (package hub client, project scaffolding).
//! Role: The binary parses flags and presents results; everything else lives here.
//! Invariants: Library code never exits the process; `core::exit::conclude` only returns a code.
//! Invariants: Prompts and network access are reached through explicit handles.
pub mod api;
pub mod core;
