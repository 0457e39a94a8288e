//! Participant identity.

use fleet_net::messages::ParticipantAnnouncement;

/// The immutable addressing facts of one participant.
///
/// Fixed at construction; a proxy refreshed after re-discovery gets a new
/// identity rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantIdentity {
    name: String,
    url: String,
    system_name: String,
    system_discovery_url: String,
    rpc_server_url: String,
}

impl ParticipantIdentity {
    /// Create an identity from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        system_name: impl Into<String>,
        system_discovery_url: impl Into<String>,
        rpc_server_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            system_name: system_name.into(),
            system_discovery_url: system_discovery_url.into(),
            rpc_server_url: rpc_server_url.into(),
        }
    }

    /// Build an identity from a discovery announcement.
    #[must_use]
    pub fn from_announcement(
        announcement: &ParticipantAnnouncement,
        system_discovery_url: &str,
    ) -> Self {
        Self::new(
            &announcement.participant_name,
            &announcement.participant_url,
            &announcement.system_name,
            system_discovery_url,
            &announcement.rpc_server_url,
        )
    }

    /// The participant's name, unique within its system.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The participant's own network URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The name of the system owning this participant.
    #[must_use]
    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// The discovery URL the participant was found through.
    #[must_use]
    pub fn system_discovery_url(&self) -> &str {
        &self.system_discovery_url
    }

    /// The URL of the participant's RPC server.
    #[must_use]
    pub fn rpc_server_url(&self) -> &str {
        &self.rpc_server_url
    }
}
