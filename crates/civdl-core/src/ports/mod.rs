//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.

pub mod catalog;
pub mod settings_provider;

pub use catalog::{ArtifactRef, CatalogError, CatalogPort, ResolvedArtifact};
pub use settings_provider::{SettingsProvider, SharedSettings};
