//! NATS subject hierarchy.
//!
//! All control-plane subjects are prefixed with `fleet.` to namespace
//! within a shared NATS cluster. Discovery announcements are keyed by
//! system name so one cluster can carry many simulation systems.

/// Root prefix for all control-plane NATS subjects.
pub const PREFIX: &str = "fleet";

// ── Discovery ───────────────────────────────────────────────────────────────

/// Discovery probe, broadcast to every participant. The payload narrows the
/// probe to one system name or to all systems. Control plane → Participants.
pub const DISCOVERY_PROBE: &str = "fleet.discovery.probe";

/// Wildcard subscription matching announcements of every system.
pub const DISCOVERY_ANNOUNCE_ALL: &str = "fleet.discovery.announce.*";

/// Build the announcement subject for one system.
///
/// `fleet.discovery.announce.<system_name>`
#[must_use]
pub fn discovery_announce(system_name: &str) -> String {
    format!("fleet.discovery.announce.{system_name}")
}

// ── RPC ─────────────────────────────────────────────────────────────────────

/// Build the request/reply subject for one component of a participant.
///
/// `fleet.rpc.<system_name>.<participant_name>.<component_name>`
#[must_use]
pub fn rpc_request(system_name: &str, participant_name: &str, component_name: &str) -> String {
    format!("fleet.rpc.{system_name}.{participant_name}.{component_name}")
}

/// Build the component-catalogue query subject for a participant.
///
/// `fleet.components.<system_name>.<participant_name>`
#[must_use]
pub fn component_query(system_name: &str, participant_name: &str) -> String {
    format!("fleet.components.{system_name}.{participant_name}")
}

// ── Health ──────────────────────────────────────────────────────────────────

/// Build the health query subject for a participant.
///
/// `fleet.health.<system_name>.<participant_name>`
#[must_use]
pub fn health_query(system_name: &str, participant_name: &str) -> String {
    format!("fleet.health.{system_name}.{participant_name}")
}

// ── Logging relay ───────────────────────────────────────────────────────────

/// Build the subject participants publish relayed log records on.
///
/// `fleet.log.<system_name>`
#[must_use]
pub fn log_relay(system_name: &str) -> String {
    format!("fleet.log.{system_name}")
}

/// Build the log-sink registration subject for a participant.
///
/// `fleet.log.control.<system_name>.<participant_name>`
#[must_use]
pub fn log_control(system_name: &str, participant_name: &str) -> String {
    format!("fleet.log.control.{system_name}.{participant_name}")
}
