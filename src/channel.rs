//! Broadcast channel: opens streams and fans posted messages out to them.

use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::frame::{self, BroadcastFrame};
use crate::registry::{ClientId, ClientRegistry, FrameSink};

/// Prefix the server puts in front of every echoed message
pub const ECHO_PREFIX: &str = "Echo from server: ";

/// Format the broadcast content for a posted message
pub fn echo_content(message: &str) -> String {
    format!("{}{}", ECHO_PREFIX, message)
}

#[derive(Clone)]
pub struct BroadcastChannel {
    registry: ClientRegistry,
    welcome: String,
}

impl BroadcastChannel {
    pub fn new(welcome: impl Into<String>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            welcome: welcome.into(),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Open a new stream: queue the welcome frame, then register the stream.
    ///
    /// The welcome is queued before registration so it is always the first frame.
    pub async fn subscribe(&self) -> StreamSubscription {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let welcome = frame::encode(&BroadcastFrame::message(self.welcome.as_str()));
        if let Err(e) = tx.write_frame(&welcome) {
            tracing::warn!("Failed to queue welcome frame: {}", e);
        }

        let id = self.registry.register(Arc::new(tx)).await;
        tracing::info!("Client {} connected", id);

        StreamSubscription {
            receiver: rx,
            guard: RegistrationGuard {
                registry: self.registry.clone(),
                id,
            },
        }
    }

    /// Echo a posted message to every open stream
    pub async fn publish(&self, message: &str) -> usize {
        let delivered = self.registry.broadcast(&echo_content(message)).await;
        tracing::debug!("Broadcast to {} client(s)", delivered);
        delivered
    }

    /// Drop every registration; open streams end once their queued frames drain
    pub async fn close_all(&self) -> usize {
        let closed = self.registry.clear().await;
        if closed > 0 {
            tracing::info!("Closed {} open stream(s)", closed);
        }
        closed
    }
}

/// Receiving side of one registered stream.
///
/// Dropping it unregisters the stream.
pub struct StreamSubscription {
    receiver: mpsc::UnboundedReceiver<String>,
    guard: RegistrationGuard,
}

impl StreamSubscription {
    pub fn id(&self) -> &ClientId {
        &self.guard.id
    }

    /// Next encoded frame, or `None` once the registry let go of the stream
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Turn the subscription into a body stream of encoded frames
    pub fn into_stream(self) -> impl Stream<Item = Result<String, Infallible>> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|encoded| (Ok::<_, Infallible>(encoded), subscription))
        })
    }
}

/// Unregisters its stream when dropped
struct RegistrationGuard {
    registry: ClientRegistry,
    id: ClientId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if registry.unregister(&id).await {
                        tracing::info!("Client {} disconnected", id);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to unregister client {}", id),
        }
    }
}
