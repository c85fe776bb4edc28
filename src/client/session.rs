//! Message session: the local conversation log and the send policy.
//!
//! Sends are echoed into the log right away. Without a live connection a canned
//! reply follows after a short delay and nothing goes over the network. With one,
//! the message is posted to the send endpoint and the reply arrives over the stream;
//! a failed post produces an apology entry instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::controller::{ConnectError, ConnectionController, ConnectionStatus, ControllerEvent};
use super::delivery::{send_endpoint, Delivery, DeliveryError, HttpDelivery};
use super::transport::{SseTransport, TransportEvent};
use crate::config::ClientConfig;
use crate::protocol::SendRequest;

pub const NO_CONNECTION_REPLY: &str =
    "I'm not connected to an MCP server right now. Please connect to a server to start chatting!";
pub const DELIVERY_FAILED_REPLY: &str =
    "Sorry, I couldn't send your message. Please check your connection.";

/// Unique within one session
pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// What processing one event did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Appended(ChatMessage),
    StatusChanged(ConnectionStatus),
    /// The event had no visible effect
    Idle,
}

/// Background work finishing
#[derive(Debug)]
enum Completion {
    NoConnectionReply,
    DeliveryFailed(DeliveryError),
}

enum Next {
    Transport(TransportEvent),
    Completion(Completion),
}

pub struct MessageSession {
    controller: ConnectionController,
    delivery: Arc<dyn Delivery>,
    reply_delay: Duration,
    user_id: Option<String>,
    log: Vec<ChatMessage>,
    composing: bool,
    next_id: MessageId,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl MessageSession {
    pub fn new(
        controller: ConnectionController,
        delivery: Arc<dyn Delivery>,
        reply_delay: Duration,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            delivery,
            reply_delay,
            user_id: None,
            log: Vec::new(),
            composing: false,
            next_id: 1,
            completions_tx,
            completions_rx,
        }
    }

    /// Session talking SSE and HTTP, configured from `config`
    pub fn from_config(config: &ClientConfig) -> Self {
        let controller = ConnectionController::new(Arc::new(SseTransport::new()));
        let mut session = Self::new(controller, Arc::new(HttpDelivery::new()), config.reply_delay);
        session.user_id = config.user_id.clone();
        session
    }

    /// Attach a user id to every send request
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    /// Whether a reply is being waited for
    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn status(&self) -> ConnectionStatus {
        self.controller.status()
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    pub fn connect(&mut self, endpoint: &str) -> Result<(), ConnectError> {
        self.controller.connect(endpoint)
    }

    pub fn disconnect(&mut self) {
        self.controller.disconnect();
    }

    /// Send `text`. Returns the echoed entry, or `None` if `text` is blank.
    pub fn send(&mut self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            return None;
        }

        let message = self.append(Sender::User, text.to_string());
        self.composing = true;

        if !self.controller.status().is_connected() {
            let delay = self.reply_delay;
            let completions = self.completions_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = completions.send(Completion::NoConnectionReply);
            });
            return Some(message);
        }

        let url = send_endpoint(self.controller.endpoint());
        let request = SendRequest {
            message: text.to_string(),
            user_id: self.user_id.clone(),
        };
        let delivery = self.delivery.clone();
        let completions = self.completions_tx.clone();
        tracing::debug!("Posting message to {}", url);
        tokio::spawn(async move {
            if let Err(e) = delivery.deliver(&url, &request).await {
                let _ = completions.send(Completion::DeliveryFailed(e));
            }
        });

        Some(message)
    }

    /// Wait for the next transport event or background completion and apply it
    pub async fn process_next(&mut self) -> SessionUpdate {
        let next = tokio::select! {
            Some(event) = self.controller.next_event() => Next::Transport(event),
            Some(completion) = self.completions_rx.recv() => Next::Completion(completion),
            else => return SessionUpdate::Idle,
        };

        match next {
            Next::Transport(event) => self.apply_transport(event),
            Next::Completion(completion) => self.apply_completion(completion),
        }
    }

    fn apply_transport(&mut self, event: TransportEvent) -> SessionUpdate {
        match self.controller.handle_event(event) {
            Some(ControllerEvent::StatusChanged(status)) => {
                if status == ConnectionStatus::Error {
                    self.composing = false;
                }
                SessionUpdate::StatusChanged(status)
            }
            Some(ControllerEvent::Message(content)) => {
                self.composing = false;
                SessionUpdate::Appended(self.append(Sender::Remote, content))
            }
            None => SessionUpdate::Idle,
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> SessionUpdate {
        let content = match completion {
            Completion::NoConnectionReply => NO_CONNECTION_REPLY,
            Completion::DeliveryFailed(e) => {
                tracing::warn!("Error sending message: {}", e);
                DELIVERY_FAILED_REPLY
            }
        };
        self.composing = false;
        SessionUpdate::Appended(self.append(Sender::Remote, content.to_string()))
    }

    fn append(&mut self, sender: Sender, content: String) -> ChatMessage {
        let message = ChatMessage {
            id: self.next_id,
            content,
            sender,
            timestamp: Utc::now(),
        };
        self.next_id += 1;
        self.log.push(message.clone());
        message
    }
}
