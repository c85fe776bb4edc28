//! Server-side registry of open streams.
//!
//! All structural mutation goes through one lock. `broadcast` copies the current
//! members out of the lock before writing, so a stream closing mid-broadcast cannot
//! disturb the iteration.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::frame::{self, BroadcastFrame};

/// Opaque registration id
pub type ClientId = String;

/// A write to one stream failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryWriteError {
    #[error("stream is closed")]
    Closed,
}

/// Writable handle to one open stream
pub trait FrameSink: Send + Sync {
    /// Write one encoded frame. A single call writes the whole frame or nothing.
    fn write_frame(&self, encoded: &str) -> Result<(), RegistryWriteError>;
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn write_frame(&self, encoded: &str) -> Result<(), RegistryWriteError> {
        self.send(encoded.to_string())
            .map_err(|_| RegistryWriteError::Closed)
    }
}

/// Registry of open streams, cheap to clone
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<ClientId, Arc<dyn FrameSink>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sink as a broadcast target and return its fresh id
    pub async fn register(&self, sink: Arc<dyn FrameSink>) -> ClientId {
        let mut clients = self.clients.write().await;
        let id = loop {
            let candidate = ulid::Ulid::new().to_string();
            if !clients.contains_key(&candidate) {
                break candidate;
            }
        };
        clients.insert(id.clone(), sink);
        tracing::debug!("Registered client {} ({} open)", id, clients.len());
        id
    }

    /// Remove a registration. Returns whether it was present; absent ids are a no-op.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(id).is_some();
        if removed {
            tracing::debug!("Unregistered client {} ({} open)", id, clients.len());
        }
        removed
    }

    /// Encode `content` as a message frame and write it to every registered stream.
    ///
    /// A failing sink is unregistered without affecting delivery to the others.
    /// Returns the number of streams the frame was written to.
    pub async fn broadcast(&self, content: &str) -> usize {
        let encoded = frame::encode(&BroadcastFrame::message(content));

        let snapshot: Vec<(ClientId, Arc<dyn FrameSink>)> = self
            .clients
            .read()
            .await
            .iter()
            .map(|(id, sink)| (id.clone(), Arc::clone(sink)))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sink) in snapshot {
            match sink.write_frame(&encoded) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!("Dropping client {} after failed write: {}", id, e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.unregister(&id).await;
        }

        delivered
    }

    /// Remove every registration, ending their streams
    pub async fn clear(&self) -> usize {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.clients.read().await.contains_key(id)
    }
}
