//! # fleet_plugin
//!
//! Native module loading for the distributed simulation control plane.
//!
//! Service-bus transports and component implementations can be shipped as
//! native shared libraries and loaded at runtime. This crate provides:
//!
//! - [`loader`] — the [`LoadedModule`] owned-resource type with
//!   platform-aware file-name normalization and unload pinning.
//! - [`error`] — plugin-layer error types.

pub mod error;
pub mod loader;

pub use error::LoadError;
pub use loader::{LoadedModule, SERVICE_BUS_PLUGIN_ENV, resolve_library_path};
