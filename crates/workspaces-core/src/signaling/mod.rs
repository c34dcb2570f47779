//! Typed relay transport.
//!
//! The relay is stateless from the client's point of view: messages are
//! delivered in order, at most once per connection, with no ack or retry
//! layer. [`SignalingClient`] is the WebSocket implementation.

mod client;
mod connection;
mod types;

pub use client::SignalingClient;
pub use types::{SignalingClientConfig, SignalingCommand, SignalingEvent};

use async_trait::async_trait;

use crate::protocol::ClientMessage;

/// Outbound half of the relay connection, as seen by the session.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Queue a message for the relay. Delivery is best-effort.
    async fn emit(&self, message: ClientMessage);
}
