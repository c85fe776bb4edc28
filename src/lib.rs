// Public API for the binaries and integration tests

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod frame;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sse;
pub mod state;
