//! WebSocket gateway transport.
//!
//! One gateway frame is one text message. The connection is split so the
//! driver can send a heartbeat while a receive is pending.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cordwire_core::error::{CordError, CordResult};
use cordwire_core::transport::{BoxFuture, Connection, Connector, FrameSink, FrameStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens gateway connections over `ws://` or `wss://`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CordResult<Connection>> {
        Box::pin(async move {
            let lower = url.to_lowercase();
            if !lower.starts_with("ws://") && !lower.starts_with("wss://") {
                return Err(CordError::Transport(format!(
                    "unsupported URL scheme: {url} (expected ws:// or wss://)"
                )));
            }

            let (ws_stream, _response) = connect_async(url)
                .await
                .map_err(|e| CordError::Transport(format!("WebSocket connect error: {e}")))?;

            tracing::info!("WebSocket connected to {}", url);

            let (sink, stream) = ws_stream.split();
            Ok(Connection {
                sink: Box::new(WebSocketSink { sink: Some(sink) }),
                stream: Box::new(WebSocketFrames { stream }),
            })
        })
    }
}

/// Sending half. `None` once closed.
struct WebSocketSink {
    sink: Option<SplitSink<WsStream, Message>>,
}

impl FrameSink for WebSocketSink {
    fn send(&mut self, frame: String) -> BoxFuture<'_, CordResult<()>> {
        Box::pin(async move {
            let sink = self
                .sink
                .as_mut()
                .ok_or_else(|| CordError::Transport("WebSocket already closed".into()))?;
            sink.send(Message::Text(frame))
                .await
                .map_err(|e| CordError::Transport(format!("WS write error: {e}")))
        })
    }

    fn close(&mut self, code: Option<u16>) -> BoxFuture<'_, CordResult<()>> {
        Box::pin(async move {
            let Some(mut sink) = self.sink.take() else {
                return Ok(());
            };
            if let Some(code) = code {
                let frame = close_frame(code);
                sink.send(Message::Close(Some(frame)))
                    .await
                    .map_err(|e| CordError::Transport(format!("WS close error: {e}")))?;
            }
            Ok(())
        })
    }
}

/// Close frame carrying `code` unchanged, including codes RFC 6455 reserves
/// (such as the default 2000). A strict peer may reject those; the close is
/// best-effort and its errors only reach the log.
fn close_frame(code: u16) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    }
}

struct WebSocketFrames {
    stream: SplitStream<WsStream>,
}

impl FrameStream for WebSocketFrames {
    fn next_frame(&mut self) -> BoxFuture<'_, CordResult<Option<String>>> {
        Box::pin(async move {
            while let Some(msg) = self.stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => return Ok(Some(text)),
                    Ok(Message::Binary(data)) => {
                        return String::from_utf8(data)
                            .map(Some)
                            .map_err(|e| CordError::Codec(format!("binary frame is not UTF-8: {e}")));
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "WebSocket close frame received");
                        return Ok(None);
                    }
                    // tungstenite answers pings itself on the next write
                    Ok(_) => continue,
                    Err(e) => return Err(CordError::Transport(format!("WS read error: {e}"))),
                }
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let connector = WebSocketConnector::new();
        let err = match connector.connect("https://gateway.test").await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, CordError::Transport(_)));
    }

    #[test]
    fn close_code_is_sent_unchanged() {
        assert_eq!(u16::from(close_frame(2000).code), 2000);
        assert_eq!(u16::from(close_frame(4000).code), 4000);
        assert_eq!(close_frame(1000).code, CloseCode::Normal);
    }
}
