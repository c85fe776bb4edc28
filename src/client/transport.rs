//! Stream transport: opens subscriptions and reports their events.

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::frame::{FrameDecoder, EVENT_STREAM};

/// Identifies one subscription for the lifetime of a controller
pub type SubscriptionId = u64;

/// Stream-level failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("stream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("stream closed by server")]
    Closed,
}

#[derive(Debug)]
pub enum TransportEventKind {
    /// The stream is established
    Open,
    /// One complete, still encoded event block
    Frame(String),
    /// The stream failed or ended; no further events follow
    Error(TransportError),
}

/// An event tagged with the subscription that produced it
#[derive(Debug)]
pub struct TransportEvent {
    pub subscription: SubscriptionId,
    pub kind: TransportEventKind,
}

/// Handle to one open subscription. Closing is idempotent and also happens on drop.
pub struct Subscription {
    id: SubscriptionId,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.on_close.is_some()
    }

    /// Close the subscription. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        match self.on_close.take() {
            Some(on_close) => {
                on_close();
                true
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Something that can open a stream subscription
pub trait Transport: Send + Sync {
    /// Start a subscription. Its events are sent to `events`, tagged with `id`.
    fn open(
        &self,
        endpoint: &str,
        id: SubscriptionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Subscription;
}

/// Server-Sent Events over HTTP
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for SseTransport {
    fn open(
        &self,
        endpoint: &str,
        id: SubscriptionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Subscription {
        let task = tokio::spawn(read_stream(
            self.client.clone(),
            endpoint.to_string(),
            id,
            events,
        ));
        let abort = task.abort_handle();
        Subscription::new(id, move || abort.abort())
    }
}

/// Drive one stream until it fails or ends
async fn read_stream(
    client: reqwest::Client,
    endpoint: String,
    id: SubscriptionId,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let emit = |kind: TransportEventKind| {
        // The controller may already be gone; nothing left to tell
        let _ = events.send(TransportEvent {
            subscription: id,
            kind,
        });
    };

    let response = match client
        .get(&endpoint)
        .header(reqwest::header::ACCEPT, EVENT_STREAM)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            emit(TransportEventKind::Error(e.into()));
            return;
        }
    };

    if !response.status().is_success() {
        emit(TransportEventKind::Error(TransportError::Status(
            response.status(),
        )));
        return;
    }

    tracing::debug!("Subscription {} open on {}", id, endpoint);
    emit(TransportEventKind::Open);

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for block in decoder.push(&bytes) {
                    emit(TransportEventKind::Frame(block));
                }
            }
            Err(e) => {
                emit(TransportEventKind::Error(e.into()));
                return;
            }
        }
    }

    emit(TransportEventKind::Error(TransportError::Closed));
}
