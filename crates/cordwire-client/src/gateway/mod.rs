//! Gateway session state machine.

pub mod client;
pub mod heartbeat;
pub mod state;

#[cfg(test)]
pub(crate) mod memory;

pub use client::GatewayClient;
pub use heartbeat::{Beat, HeartbeatTracker, MISSED_ACK_THRESHOLD};
pub use state::{ConnectOptions, GatewayState, Session, ShutdownHandle, CLOSE_NORMAL};
