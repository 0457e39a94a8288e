//! Wire types exchanged between the control plane and participants.
//!
//! All message types derive `Serialize` and `Deserialize` for MessagePack
//! transport. RPC method parameters and results are carried as JSON values
//! inside the MessagePack envelope, so component interfaces stay
//! schema-free at this layer.

use serde::{Deserialize, Serialize};

// ── Discovery ───────────────────────────────────────────────────────────────

/// Asks participants to announce themselves.
/// Published on [`subjects::DISCOVERY_PROBE`](crate::subjects::DISCOVERY_PROBE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryProbe {
    /// Restrict the probe to one system. `None` probes every system.
    pub system_name: Option<String>,
}

/// A participant announces itself in response to a probe (or spontaneously
/// on startup). Published on
/// [`subjects::discovery_announce`](crate::subjects::discovery_announce).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAnnouncement {
    /// The participant's name, unique within its system.
    pub participant_name: String,
    /// The system this participant belongs to.
    pub system_name: String,
    /// The participant's own network URL.
    pub participant_url: String,
    /// The URL of the participant's RPC server.
    pub rpc_server_url: String,
}

// ── RPC envelope ────────────────────────────────────────────────────────────

/// A method call against one component of a participant.
/// Sent request/reply on [`subjects::rpc_request`](crate::subjects::rpc_request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// The addressed component.
    pub component: String,
    /// The interface contract the call is made against.
    pub interface_id: String,
    /// The method name.
    pub method: String,
    /// Method parameters as a JSON value.
    pub params: serde_json::Value,
}

/// Reply to an [`RpcRequest`]. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// The method result on success.
    pub result: Option<serde_json::Value>,
    /// Diagnostic text on failure.
    pub error: Option<String>,
}

/// Asks a participant which of its components implement an interface.
/// Sent request/reply on
/// [`subjects::component_query`](crate::subjects::component_query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentQuery {
    /// The interface identifier to match.
    pub interface_id: String,
}

/// Reply to a [`ComponentQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentQueryReply {
    /// Names of the components implementing the queried interface, in the
    /// participant's own registration order.
    pub components: Vec<String>,
}

// ── Health ──────────────────────────────────────────────────────────────────

/// Health of one job running inside a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHealth {
    /// The job's name.
    pub job_name: String,
    /// Diagnostic of the last execution error, if any.
    pub last_error: Option<String>,
}

/// Point-in-time health report of a participant. Never cached by the
/// control plane; every query goes to the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// The reporting participant.
    pub participant_name: String,
    /// The participant's current lifecycle state, as reported.
    pub state: String,
    /// Per-job health, empty when the participant runs no jobs.
    pub jobs: Vec<JobHealth>,
}

// ── Logging relay ───────────────────────────────────────────────────────────

/// Log severity, ordered from least to most severe. `Off` is a filter
/// level only and never appears in relayed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Diagnostic chatter.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// An operation failed.
    Error,
    /// The participant cannot continue.
    Fatal,
    /// Filter level that suppresses everything.
    Off,
}

impl Severity {
    /// Whether a record of this severity passes a minimum-threshold filter.
    ///
    /// `Off` as the threshold suppresses everything; `Fatal` passes only
    /// fatal records.
    #[must_use]
    pub fn passes(self, minimum: Severity) -> bool {
        self != Severity::Off && minimum != Severity::Off && self >= minimum
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
            Severity::Off => "off",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            "off" => Ok(Severity::Off),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// One log record relayed from a participant to the control plane.
/// Published on [`subjects::log_relay`](crate::subjects::log_relay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRelayRecord {
    /// Log time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Record severity.
    pub severity: Severity,
    /// The originating participant.
    pub participant_name: String,
    /// The participant-local logger that produced the record.
    pub logger_name: String,
    /// The log message.
    pub message: String,
}

/// Registers or removes a central log sink at a participant.
/// Sent request/reply on [`subjects::log_control`](crate::subjects::log_control).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkRegistration {
    /// The sink's identity URL; participants relay to it until deregistered.
    pub sink_url: String,
    /// `true` registers, `false` deregisters.
    pub enable: bool,
}
