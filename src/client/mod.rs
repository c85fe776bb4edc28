//! Chat client: stream subscription, connection state and the message session.

pub mod controller;
pub mod delivery;
pub mod session;
pub mod transport;

pub use controller::{ConnectError, ConnectionController, ConnectionStatus, ControllerEvent};
pub use delivery::{send_endpoint, Delivery, DeliveryError, HttpDelivery};
pub use session::{ChatMessage, MessageSession, Sender, SessionUpdate};
pub use transport::{SseTransport, Subscription, Transport, TransportError, TransportEvent};
