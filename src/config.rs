//! Environment-driven configuration for the server and the client.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the Mock MCP SSE Server!";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001/sse";
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1000);

/// Read an env var, trimmed, treating empty values as unset
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Content of the frame sent to every newly opened stream
    pub welcome_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    /// CHAT_BIND_ADDR and CHAT_WELCOME_MESSAGE override the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match env_value("CHAT_BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid CHAT_BIND_ADDR {:?} ({}), using {}",
                    raw,
                    e,
                    DEFAULT_BIND_ADDR
                );
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        let welcome_message =
            env_value("CHAT_WELCOME_MESSAGE").unwrap_or(defaults.welcome_message);

        Self {
            bind_addr,
            welcome_message,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream endpoint; the send endpoint is derived from it
    pub server_url: String,
    /// Delay before the canned reply when sending without a connection
    pub reply_delay: Duration,
    /// Optional user id attached to every send request
    pub user_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reply_delay: DEFAULT_REPLY_DELAY,
            user_id: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from CHAT_SERVER_URL, CHAT_REPLY_DELAY_MS and CHAT_USER_ID
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let reply_delay = match env_value("CHAT_REPLY_DELAY_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(
                        "Invalid CHAT_REPLY_DELAY_MS {:?} ({}), using {:?}",
                        raw,
                        e,
                        DEFAULT_REPLY_DELAY
                    );
                    defaults.reply_delay
                }
            },
            None => defaults.reply_delay,
        };

        Self {
            server_url: env_value("CHAT_SERVER_URL").unwrap_or(defaults.server_url),
            reply_delay,
            user_id: env_value("CHAT_USER_ID"),
        }
    }
}
