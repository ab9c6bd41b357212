//! Abstract gateway transport.
//!
//! A connection is split into a sending half and a receiving half so the
//! heartbeat can go out while a receive is pending. Only one receive may be
//! outstanding on a [`FrameStream`] at a time, which `&mut self` enforces.

use std::future::Future;
use std::pin::Pin;

use crate::error::CordResult;

/// Boxed `Send` future used by the object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sending half of a gateway connection.
pub trait FrameSink: Send {
    /// Send one text frame.
    fn send(&mut self, frame: String) -> BoxFuture<'_, CordResult<()>>;

    /// Close the connection.
    ///
    /// `Some(code)` sends a close frame carrying the code first; `None` drops
    /// the link without telling the peer, which keeps the session resumable.
    fn close(&mut self, code: Option<u16>) -> BoxFuture<'_, CordResult<()>>;
}

/// Receiving half of a gateway connection.
pub trait FrameStream: Send {
    /// Receive the next text frame. `Ok(None)` means the peer closed the link.
    fn next_frame(&mut self) -> BoxFuture<'_, CordResult<Option<String>>>;
}

/// An open gateway connection.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens gateway connections.
pub trait Connector: Send + Sync {
    /// Perform the transport handshake against a full endpoint URL.
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CordResult<Connection>>;
}
