//! Gateway connection state and session bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::Notify;

use cordwire_core::ShardInfo;

/// Normal closure code sent by [`GatewayClient::disconnect`](super::GatewayClient::disconnect).
pub const CLOSE_NORMAL: u16 = 2000;

/// Life-cycle state of a gateway client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// No connection and no driver task.
    Disconnected,
    /// Opening the transport and waiting for Hello.
    Connecting,
    /// Identify sent, waiting for READY.
    Identifying,
    /// Resume sent, waiting for RESUMED.
    Resuming,
    /// Session established; heartbeat and read loop running.
    Ready,
    /// The link was lost and the driver is resuming or re-identifying.
    Recovering,
    /// Shutting down on request.
    Disconnecting,
    /// Recovery gave up or the server invalidated the session.
    Failed,
}

impl GatewayState {
    /// Whether a new `connect` or `resume` may start from this state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Recovering => "recovering",
            Self::Disconnecting => "disconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An established gateway session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Captured from READY.
    pub session_id: String,
    /// Highest sequence number seen on a dispatch, if any.
    pub last_sequence: Option<u64>,
    /// Base URL the session was opened against.
    pub gateway_url: String,
    pub shard: Option<ShardInfo>,
    pub heartbeat_interval: Duration,
}

/// Options for a fresh identify.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub shard: Option<ShardInfo>,
    /// Initial presence; the online default is used when absent.
    pub presence: Option<Value>,
}

impl ConnectOptions {
    pub fn with_shard(mut self, shard: ShardInfo) -> Self {
        self.shard = Some(shard);
        self
    }

    pub fn with_presence(mut self, presence: Value) -> Self {
        self.presence = Some(presence);
        self
    }
}

#[derive(Debug)]
pub(crate) struct ShutdownSignal {
    triggered: AtomicBool,
    close_code: AtomicU16,
    send_close: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            close_code: AtomicU16::new(CLOSE_NORMAL),
            send_close: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    pub(crate) fn trigger(&self, close_code: u16, send_close: bool) {
        self.close_code.store(close_code, Ordering::SeqCst);
        self.send_close.store(send_close, Ordering::SeqCst);
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Close code to emit, or `None` to drop the link silently.
    pub(crate) fn close_code(&self) -> Option<u16> {
        self.send_close
            .load(Ordering::SeqCst)
            .then(|| self.close_code.load(Ordering::SeqCst))
    }

    pub(crate) fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
        self.close_code.store(CLOSE_NORMAL, Ordering::SeqCst);
        self.send_close.store(true, Ordering::SeqCst);
        // Drop a permit left over from an earlier trigger.
        let _ = self.notify.notified().now_or_never();
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Stops a running gateway driver from any context.
///
/// `trigger` only touches atomics and a [`Notify`] permit, so it is safe to
/// call from a signal-handling task or a synchronous callback.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    pub(crate) signal: Arc<ShutdownSignal>,
}

impl ShutdownHandle {
    /// Request a normal shutdown that sends close code 2000.
    pub fn trigger(&self) {
        self.signal.trigger(CLOSE_NORMAL, true);
    }

    /// Request a shutdown with an explicit close code. With `send_close` false
    /// the link is dropped without a close frame so the session stays resumable.
    pub fn trigger_with(&self, close_code: u16, send_close: bool) {
        self.signal.trigger(close_code, send_close);
    }

    pub fn is_triggered(&self) -> bool {
        self.signal.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_states() {
        assert!(GatewayState::Disconnected.is_idle());
        assert!(GatewayState::Failed.is_idle());
        assert!(!GatewayState::Ready.is_idle());
        assert!(!GatewayState::Recovering.is_idle());
        assert_eq!(GatewayState::Resuming.to_string(), "resuming");
    }

    #[test]
    fn shutdown_signal_records_close_code() {
        let handle = ShutdownHandle {
            signal: Arc::new(ShutdownSignal::new()),
        };
        assert!(!handle.is_triggered());
        assert_eq!(handle.signal.close_code(), Some(CLOSE_NORMAL));

        handle.trigger_with(4000, false);
        assert!(handle.is_triggered());
        assert_eq!(handle.signal.close_code(), None);

        handle.signal.reset();
        assert!(!handle.is_triggered());
        handle.trigger_with(1001, true);
        assert_eq!(handle.signal.close_code(), Some(1001));
    }

    #[tokio::test]
    async fn trigger_wakes_a_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.notified().await })
        };
        tokio::task::yield_now().await;
        signal.trigger(CLOSE_NORMAL, true);
        waiter.await.unwrap();
    }

    #[test]
    fn connect_options_builders() {
        let opts = ConnectOptions::default()
            .with_shard(ShardInfo::new(1, 4))
            .with_presence(serde_json::json!({"status": "idle"}));
        assert_eq!(opts.shard, Some(ShardInfo::new(1, 4)));
        assert_eq!(opts.presence.unwrap()["status"], "idle");
    }
}
