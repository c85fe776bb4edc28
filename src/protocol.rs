use serde::{Deserialize, Serialize};

/// Body of a send request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub message: String,
    /// Sender id supplied by the client, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Acknowledgment returned for every accepted send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: String,
}

pub const MESSAGE_RECEIVED: &str = "Message received";
