//! # fleet_system
//!
//! Control plane for distributed simulation systems.
//!
//! A *system* is a named set of independently running participant
//! processes. This crate discovers them over the service bus, represents
//! each one as a local [`ParticipantProxy`], resolves typed RPC component
//! proxies into them, drives their lifecycle, and relays their logs to a
//! central [`SystemLogger`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fleet_net::NatsServiceBus;
//! use fleet_system::{DiscoveryConstraint, DiscoveryEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Arc::new(NatsServiceBus::connect().await?);
//!     let engine = DiscoveryEngine::new(bus);
//!     let system = engine
//!         .discover_system(
//!             "demo_system",
//!             DiscoveryConstraint::Names(vec!["p1".into(), "p2".into()]),
//!             Duration::from_secs(5),
//!         )
//!         .await?;
//!     system.load().await?;
//!     system.initialize().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod logging;
pub mod proxy;
pub mod system;

#[cfg(test)]
pub mod testing;

pub use cache::{CacheKey, ComponentProxyCache};
pub use discovery::{DiscoveryConstraint, DiscoveryEngine};
pub use error::ControlError;
pub use identity::ParticipantIdentity;
pub use logging::{EventMonitor, Severity, SystemLogger};
pub use proxy::ParticipantProxy;
pub use system::System;
