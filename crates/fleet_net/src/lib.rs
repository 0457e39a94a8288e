//! # fleet_net
//!
//! NATS service-bus layer for the distributed simulation control plane.
//!
//! This crate provides:
//!
//! - [`subjects`] — NATS subject hierarchy constants and builders.
//! - [`messages`] — Wire types exchanged between the control plane and participants.
//! - [`codec`] — MessagePack serialisation/deserialisation helpers.
//! - [`connection`] — NATS connection management.
//! - [`bus`] — The abstract service-bus capabilities the control plane consumes.
//! - [`nats`] — The concrete NATS-backed service bus.
//! - [`error`] — Network-layer error types.

pub mod bus;
pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod nats;
pub mod subjects;

pub use bus::{InterfaceId, RpcClient, RpcProxy, ServiceBus, SystemAccess};
pub use codec::{decode, encode};
pub use connection::BusConnection;
pub use error::NetError;
pub use nats::{NatsServiceBus, NatsSystemAccess};
