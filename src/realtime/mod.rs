//! Realtime voice channel.
//!
//! Wraps the backend WebSocket in [`RealtimeClient`]: a connection driver
//! with exponential-backoff reconnect, ordered listener fan-out, and
//! fire-and-forget sends that drop cleanly when disconnected.

mod client;
mod listeners;
mod reconnect;

pub use client::{RealtimeClient, RealtimeConfig};
pub use listeners::{Listener, ListenerId, ListenerRegistry, dispatch};
pub use reconnect::ReconnectPolicy;
