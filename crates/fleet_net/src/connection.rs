//! NATS connection management.
//!
//! Provides a thin wrapper around `async-nats` for connecting to NATS with
//! control-plane defaults.

use tracing::info;

use crate::error::NetError;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "FLEET_NATS_URL";

/// A wrapper around an `async-nats` client with control-plane helpers.
#[derive(Debug, Clone)]
pub struct BusConnection {
    /// The underlying NATS client.
    client: async_nats::Client,
    /// The URL this connection was established against.
    url: String,
}

impl BusConnection {
    /// Connect to NATS using the URL from the `FLEET_NATS_URL` environment
    /// variable, falling back to [`DEFAULT_NATS_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect() -> Result<Self, NetError> {
        let url = std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());
        Self::connect_to(&url).await
    }

    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect_to(url: &str) -> Result<Self, NetError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!("NATS connection established");
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Returns a reference to the underlying `async-nats` client.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Returns the URL this connection was established against.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publish a MessagePack-encoded message to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn publish<T: serde::Serialize>(
        &self,
        subject: &str,
        message: &T,
    ) -> Result<(), NetError> {
        let payload = crate::codec::encode(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Send a MessagePack-encoded request and decode the reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding, the request itself (including a
    /// missing responder), or decoding the reply fails.
    pub async fn request<T, R>(&self, subject: &str, message: &T) -> Result<R, NetError>
    where
        T: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let payload = crate::codec::encode(message)?;
        let response = self
            .client
            .request(subject.to_string(), payload.into())
            .await?;
        crate::codec::decode(response.payload.as_ref())
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }
}
