// Core modules: exit outcomes, config resolution, artifacts and project files.
pub mod artifacts;
pub mod error;
pub mod exit;
pub mod metadata;
pub mod patterns;
pub mod project;
pub mod render;
pub mod resources;
pub mod schema;
pub mod selectors;
pub mod semver;
