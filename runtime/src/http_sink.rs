//! HTTP logging sink.
//!
//! POSTs each envelope as JSON to the logger service. Only `202 Accepted`
//! counts as success.

use event_relay_core::envelope::Envelope;
use event_relay_core::error::SinkError;
use event_relay_core::sink::EventSink;
use event_relay_core::transport::BoxFuture;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Sink that forwards envelopes to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpLogSink {
    client: Client,
    url: String,
}

impl HttpLogSink {
    /// Create a sink posting to `url` with a default client.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Create a sink posting to `url` with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Request`] if the HTTP client cannot be built.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url))
    }

    /// Create a sink with an existing client.
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The endpoint this sink posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventSink for HttpLogSink {
    fn deliver<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(envelope)
                .send()
                .await
                .map_err(|e| SinkError::Request(e.to_string()))?;

            match response.status() {
                StatusCode::ACCEPTED => Ok(()),
                status => Err(SinkError::Rejected {
                    status: status.as_u16(),
                }),
            }
        })
    }
}
