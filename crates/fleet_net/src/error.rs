//! Network-layer error types.

/// Errors that can occur during service-bus operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// NATS subscription error.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// NATS request/reply error (includes missing responders).
    #[error("NATS request error: {0}")]
    Request(#[from] async_nats::RequestError),

    /// The remote RPC endpoint reported an application-level failure.
    #[error("RPC failure: {0}")]
    Rpc(String),

    /// The participant does not expose the requested component/interface.
    #[error("participant '{participant}' has no component '{component}' implementing '{interface_id}'")]
    UnknownComponent {
        /// The addressed participant.
        participant: String,
        /// The requested component name.
        component: String,
        /// The requested interface identifier.
        interface_id: String,
    },
}
