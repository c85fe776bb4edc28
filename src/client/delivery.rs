//! One-shot message delivery to the send endpoint.

use async_trait::async_trait;

use crate::protocol::SendRequest;

/// The send request failed
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// Derive the send endpoint from a stream endpoint.
///
/// A trailing `/sse` is replaced with `/message`; endpoints that do not end in `/sse`
/// are returned unchanged.
pub fn send_endpoint(stream_endpoint: &str) -> String {
    match stream_endpoint.strip_suffix("/sse") {
        Some(base) => format!("{}/message", base),
        None => stream_endpoint.to_string(),
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, url: &str, request: &SendRequest) -> Result<(), DeliveryError>;
}

/// JSON POST over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpDelivery {
    client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn deliver(&self, url: &str, request: &SendRequest) -> Result<(), DeliveryError> {
        let response = self.client.post(url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status()));
        }
        Ok(())
    }
}
