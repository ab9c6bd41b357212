//! In-process gateway connector for driving the client from tests.
//!
//! Every `connect` hands a [`ServerLink`] to the test through a
//! [`MemoryServer`], which then plays the gateway's part of the conversation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use cordwire_core::transport::{BoxFuture, Connection, Connector, FrameSink, FrameStream};
use cordwire_core::{CordError, CordResult};

/// A frame the client wrote.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClientFrame {
    Text(String),
    Close(u16),
}

pub(crate) struct MemoryConnector {
    links: mpsc::UnboundedSender<ServerLink>,
    refusals: Arc<AtomicUsize>,
}

pub(crate) struct MemoryServer {
    links: mpsc::UnboundedReceiver<ServerLink>,
    refusals: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub(crate) fn new() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refusals = Arc::new(AtomicUsize::new(0));
        (
            Self {
                links: tx,
                refusals: refusals.clone(),
            },
            MemoryServer { links: rx, refusals },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CordResult<Connection>> {
        Box::pin(async move {
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(CordError::Transport("connection refused".into()));
            }

            let (to_client, client_rx) = mpsc::unbounded_channel();
            let (client_tx, from_client) = mpsc::unbounded_channel();
            self.links
                .send(ServerLink {
                    url: url.to_string(),
                    to_client: Some(to_client),
                    from_client,
                })
                .map_err(|_| CordError::Transport("memory server gone".into()))?;

            Ok(Connection {
                sink: Box::new(MemorySink {
                    tx: Some(client_tx),
                }),
                stream: Box::new(MemoryStream { rx: client_rx }),
            })
        })
    }
}

impl MemoryServer {
    /// Wait for the client's next connection.
    pub(crate) async fn accept(&mut self) -> ServerLink {
        self.links.recv().await.expect("connector dropped")
    }

    /// Make the next `n` connection attempts fail.
    pub(crate) fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<ClientFrame>>,
}

impl FrameSink for MemorySink {
    fn send(&mut self, frame: String) -> BoxFuture<'_, CordResult<()>> {
        Box::pin(async move {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| CordError::Transport("sink closed".into()))?;
            tx.send(ClientFrame::Text(frame))
                .map_err(|_| CordError::Transport("peer gone".into()))
        })
    }

    fn close(&mut self, code: Option<u16>) -> BoxFuture<'_, CordResult<()>> {
        Box::pin(async move {
            if let (Some(tx), Some(code)) = (self.tx.take(), code) {
                let _ = tx.send(ClientFrame::Close(code));
            }
            Ok(())
        })
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameStream for MemoryStream {
    fn next_frame(&mut self) -> BoxFuture<'_, CordResult<Option<String>>> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }
}

/// The server's side of one connection.
pub(crate) struct ServerLink {
    pub(crate) url: String,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl ServerLink {
    pub(crate) fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.to_string());
        }
    }

    pub(crate) fn send(&self, msg: Value) {
        self.send_raw(&msg.to_string());
    }

    pub(crate) fn hello(&self, heartbeat_interval_ms: u64) {
        self.send(json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}}));
    }

    pub(crate) fn dispatch(&self, event: &str, seq: u64, d: Value) {
        self.send(json!({"op": 0, "t": event, "s": seq, "d": d}));
    }

    pub(crate) fn ready(&self, session_id: &str, seq: u64) {
        self.dispatch("READY", seq, json!({"session_id": session_id, "v": 6}));
    }

    pub(crate) fn heartbeat_ack(&self) {
        self.send(json!({"op": 11}));
    }

    /// Close the link from the server side.
    pub(crate) fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next frame from the client; `None` once the client dropped the link.
    pub(crate) async fn recv(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    /// Next text frame from the client, parsed.
    pub(crate) async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            Some(ClientFrame::Text(text)) => serde_json::from_str(&text).expect("client sent JSON"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Next message with op code `op`, skipping heartbeats.
    pub(crate) async fn expect_op(&mut self, op: u64) -> Value {
        loop {
            let msg = self.recv_json().await;
            if msg["op"] == json!(op) {
                return msg;
            }
            assert_eq!(msg["op"], json!(1), "unexpected frame while waiting for op {op}: {msg}");
        }
    }

    /// Wait until the client drops or closes the link, returning the close code if any.
    pub(crate) async fn closed(&mut self) -> Option<u16> {
        loop {
            match self.recv().await {
                None => return None,
                Some(ClientFrame::Close(code)) => return Some(code),
                Some(ClientFrame::Text(_)) => {}
            }
        }
    }
}
