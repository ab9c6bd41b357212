//! cordwire-core: shared protocol library for cordwire.
//!
//! Provides gateway message types and op codes, the JSON frame codec, the
//! event table and handler registry, the error type, and abstract transport
//! traits.

pub mod codec;
pub mod error;
pub mod events;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{frame_decode, frame_encode, payload_decode};
pub use error::{CordError, CordResult, EntityKind, LimitKind};
pub use events::{Event, EventDispatcher, HandlerId};
pub use messages::{GatewayMessage, OpCode, ShardInfo, GATEWAY_VERSION};
pub use transport::{BoxFuture, Connection, Connector, FrameSink, FrameStream};
