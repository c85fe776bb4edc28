//! Connection controller: owns one subscription and turns transport events into a
//! four-state connection status.
//!
//! ```text
//! disconnected --connect--> connecting --open--> connected
//!                               |                    |
//!                               +------error---------+--> error --connect--> connecting
//! any state --disconnect--> disconnected
//! ```
//!
//! Events are tagged with the subscription that produced them. Anything from a
//! subscription other than the current one is dropped, so a replaced or closed
//! subscription can never leak frames or status changes into the new one.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::transport::{
    Subscription, SubscriptionId, Transport, TransportEvent, TransportEventKind,
};
use crate::frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Connection Error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("endpoint is empty")]
    EmptyEndpoint,
}

/// Outcome of handling one transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    StatusChanged(ConnectionStatus),
    /// Content of an inbound `message` frame
    Message(String),
}

pub struct ConnectionController {
    transport: Arc<dyn Transport>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    status: watch::Sender<ConnectionStatus>,
    endpoint: String,
    subscription: Option<Subscription>,
    next_subscription: SubscriptionId,
}

impl ConnectionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            events_tx,
            events_rx,
            status,
            endpoint: String::new(),
            subscription: None,
            next_subscription: 1,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Endpoint of the current subscription, empty when disconnected
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Observe status changes
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Open a subscription to `endpoint`, closing any previous one first.
    ///
    /// Valid from every state; the controller moves to `Connecting`.
    pub fn connect(&mut self, endpoint: &str) -> Result<(), ConnectError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConnectError::EmptyEndpoint);
        }

        self.close_subscription();

        let id = self.next_subscription;
        self.next_subscription += 1;

        self.endpoint = endpoint.to_string();
        self.set_status(ConnectionStatus::Connecting);
        tracing::info!("Connecting to {} (subscription {})", endpoint, id);

        let subscription = self
            .transport
            .open(endpoint, id, self.events_tx.clone());
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Close the subscription if any and return to `Disconnected`
    pub fn disconnect(&mut self) {
        self.close_subscription();
        self.endpoint.clear();
        if self.set_status(ConnectionStatus::Disconnected) {
            tracing::info!("Disconnected");
        }
    }

    /// Wait for the next transport event
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    /// Apply one transport event to the state machine
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<ControllerEvent> {
        let current = self.subscription.as_ref().map(Subscription::id);
        if current != Some(event.subscription) {
            tracing::debug!(
                "Ignoring event from stale subscription {}",
                event.subscription
            );
            return None;
        }

        match event.kind {
            TransportEventKind::Open => {
                if self.status() != ConnectionStatus::Connecting {
                    return None;
                }
                self.set_status(ConnectionStatus::Connected);
                tracing::info!("Connected to {}", self.endpoint);
                Some(ControllerEvent::StatusChanged(ConnectionStatus::Connected))
            }
            TransportEventKind::Frame(block) => {
                if self.status() != ConnectionStatus::Connected {
                    return None;
                }
                match frame::decode(&block) {
                    Ok(frame) if frame.is_message() => {
                        tracing::debug!("Received message: {}", frame.content);
                        Some(ControllerEvent::Message(frame.content))
                    }
                    Ok(frame) => {
                        tracing::debug!("Skipping frame of kind {:?}", frame.kind);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame: {}", e);
                        None
                    }
                }
            }
            TransportEventKind::Error(e) => {
                tracing::error!("Stream error on {}: {}", self.endpoint, e);
                // No automatic retry; the caller reconnects explicitly
                self.close_subscription();
                self.set_status(ConnectionStatus::Error);
                Some(ControllerEvent::StatusChanged(ConnectionStatus::Error))
            }
        }
    }

    fn close_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            if subscription.close() {
                tracing::debug!("Closed subscription {}", subscription.id());
            }
        }
    }

    /// Returns whether the status actually changed
    fn set_status(&self, status: ConnectionStatus) -> bool {
        self.status.send_replace(status) != status
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.close_subscription();
    }
}
