//! The gateway client.
//!
//! `GatewayClient` performs the opening handshake on the caller's task, then
//! hands the connection to a driver task that owns it for the rest of its
//! life: heartbeats, the read loop, event dispatch, and recovery after a lost
//! link all happen inside one `select!` loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use cordwire_core::codec::{frame_decode, frame_encode, payload_decode};
use cordwire_core::events::{Event, EventDispatcher};
use cordwire_core::messages::{
    default_presence, ConnectionProperties, GatewayMessage, HelloPayload, IdentifyPayload, OpCode,
    ReadyPayload, ResumePayload,
};
use cordwire_core::transport::{Connection, Connector, FrameSink, FrameStream};
use cordwire_core::{CordError, CordResult, ShardInfo};

use super::heartbeat::{Beat, HeartbeatTracker};
use super::state::{ConnectOptions, GatewayState, Session, ShutdownHandle, ShutdownSignal};
use crate::config::GatewayConfig;
use crate::transport::WebSocketConnector;

/// State shared between the client handle and its driver task.
struct Shared {
    state: Mutex<GatewayState>,
    session: Mutex<Option<Session>>,
    recoveries: AtomicU64,
    shutdown: Arc<ShutdownSignal>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: GatewayState) {
        let mut state = self.state();
        let prev = *state;
        if prev != next {
            debug!(from = %prev, to = %next, "gateway state");
            *state = next;
        }
    }
}

/// A client for one gateway connection.
pub struct GatewayClient {
    token: String,
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    shared: Arc<Shared>,
    outgoing: Mutex<Option<mpsc::Sender<GatewayMessage>>>,
    driver: tokio::sync::Mutex<Option<JoinHandle<CordResult<()>>>>,
}

impl GatewayClient {
    pub fn new(token: impl Into<String>, config: GatewayConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            token: token.into(),
            config,
            connector,
            dispatcher: Arc::new(EventDispatcher::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(GatewayState::Disconnected),
                session: Mutex::new(None),
                recoveries: AtomicU64::new(0),
                shutdown: Arc::new(ShutdownSignal::new()),
            }),
            outgoing: Mutex::new(None),
            driver: tokio::sync::Mutex::new(None),
        }
    }

    /// A client that connects over WebSocket.
    pub fn with_websocket(token: impl Into<String>, config: GatewayConfig) -> Self {
        Self::new(token, config, Arc::new(WebSocketConnector::new()))
    }

    /// The registry events are dispatched through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: self.shared.shutdown.clone(),
        }
    }

    pub fn state(&self) -> GatewayState {
        *self.shared.state()
    }

    /// Snapshot of the current session, if one is established.
    pub fn session(&self) -> Option<Session> {
        self.shared.session().clone()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.shared.session().as_ref().and_then(|s| s.last_sequence)
    }

    pub fn gateway_url(&self) -> Option<String> {
        self.shared.session().as_ref().map(|s| s.gateway_url.clone())
    }

    /// Number of times the driver has started recovering a lost link.
    pub fn recovery_count(&self) -> u64 {
        self.shared.recoveries.load(Ordering::SeqCst)
    }

    /// Open a new session: Hello, Identify, then wait for READY.
    ///
    /// Fails with [`CordError::AlreadyConnected`] unless the client is
    /// disconnected, and with [`CordError::InvalidSession`] if the server
    /// rejects the identify.
    pub async fn connect(&self, gateway_url: &str, options: ConnectOptions) -> CordResult<()> {
        let driver = self.claim(gateway_url, options.shard)?;
        let mut driver = driver.with_presence(options.presence.unwrap_or_else(default_presence));
        let result = driver.establish(Handshake::Identify).await;
        self.start(driver, result).await
    }

    /// Resume an earlier session: Hello, Resume, then wait for RESUMED.
    ///
    /// On [`CordError::InvalidSession`] the session is gone and the caller
    /// should fall back to [`connect`](Self::connect).
    pub async fn resume(
        &self,
        gateway_url: &str,
        session_id: &str,
        last_sequence: Option<u64>,
        shard: Option<ShardInfo>,
    ) -> CordResult<()> {
        let mut driver = self.claim(gateway_url, shard)?;
        driver.session_id = Some(session_id.to_string());
        driver.seq = last_sequence;
        let result = driver.establish(Handshake::Resume).await;
        self.start(driver, result).await
    }

    /// Stop the driver and release the connection.
    ///
    /// With `send_close` the close code is sent to the server (errors are
    /// ignored) and the session is discarded; without it the link is dropped
    /// silently and the session stays available for [`resume`](Self::resume).
    /// Returns the session as it was when the driver stopped.
    pub async fn disconnect(&self, close_code: u16, send_close: bool) -> CordResult<Option<Session>> {
        self.shared.shutdown.trigger(close_code, send_close);

        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "driver had already failed"),
                Err(e) => warn!(error = %e, "gateway driver task did not finish cleanly"),
            }
        }
        self.outgoing_slot().take();

        let session = self.session();
        if send_close {
            self.shared.session().take();
        }
        if !self.state().is_idle() {
            self.shared.set_state(GatewayState::Disconnected);
        }
        info!(close_code, send_close, "gateway disconnected");
        Ok(session)
    }

    /// Wait for the driver to stop.
    ///
    /// Returns the error that ended it when recovery gave up or the server
    /// invalidated the session; returns `Ok` after a requested shutdown.
    pub async fn wait(&self) -> CordResult<()> {
        let mut driver = self.driver.lock().await;
        let Some(handle) = driver.as_mut() else {
            return Ok(());
        };
        let result = handle
            .await
            .map_err(|e| CordError::Transport(format!("gateway driver task failed: {e}")));
        *driver = None;
        result?
    }

    /// Send a raw gateway message, such as a status update, through the driver.
    pub async fn send(&self, op: u8, d: Value) -> CordResult<()> {
        let tx = self
            .outgoing_slot()
            .clone()
            .ok_or_else(|| CordError::Transport("gateway not connected".into()))?;
        let msg = GatewayMessage {
            op: i64::from(op),
            d,
            t: None,
            s: None,
        };
        tx.send(msg)
            .await
            .map_err(|_| CordError::Transport("gateway driver stopped".into()))
    }

    fn outgoing_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<GatewayMessage>>> {
        self.outgoing.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move from an idle state to `Connecting` and build the driver that
    /// will own the connection.
    fn claim(&self, gateway_url: &str, shard: Option<ShardInfo>) -> CordResult<Driver> {
        {
            let mut state = self.shared.state();
            if !state.is_idle() {
                return Err(CordError::AlreadyConnected);
            }
            *state = GatewayState::Connecting;
        }
        self.shared.shutdown.reset();

        let (tx, rx) = mpsc::channel(256);
        *self.outgoing_slot() = Some(tx);

        Ok(Driver {
            token: self.token.clone(),
            config: self.config.clone(),
            connector: self.connector.clone(),
            dispatcher: self.dispatcher.clone(),
            shared: self.shared.clone(),
            outgoing: rx,
            gateway_url: gateway_url.to_string(),
            shard,
            presence: default_presence(),
            session_id: None,
            seq: None,
        })
    }

    async fn start(&self, driver: Driver, handshake: CordResult<Link>) -> CordResult<()> {
        match handshake {
            Ok(link) => {
                self.shared.set_state(GatewayState::Ready);
                let handle = tokio::spawn(driver.run(link));
                *self.driver.lock().await = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.outgoing_slot().take();
                self.shared.set_state(GatewayState::Disconnected);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("state", &self.state())
            .field("session", &self.session())
            .field("recoveries", &self.recovery_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Identify,
    Resume,
}

/// An open connection plus its heartbeat bookkeeping.
struct Link {
    sink: Box<dyn FrameSink>,
    stream: Box<dyn FrameStream>,
    heartbeat: HeartbeatTracker,
    ticker: Interval,
    interval: Duration,
}

impl Link {
    fn new(connection: Connection, interval: Duration) -> Self {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            sink: connection.sink,
            stream: connection.stream,
            heartbeat: HeartbeatTracker::new(),
            ticker,
            interval,
        }
    }

    async fn send(&mut self, msg: &GatewayMessage) -> CordResult<()> {
        trace!(op = msg.op, "sending gateway message");
        self.sink.send(frame_encode(msg)?).await
    }

    async fn close(mut self, code: Option<u16>) {
        if let Err(e) = self.sink.close(code).await {
            debug!(error = %e, "error closing gateway link");
        }
    }
}

/// One step of the select loop.
enum Input {
    Message(GatewayMessage),
    Shutdown,
}

/// What a processed message asks of the caller.
enum Control {
    Continue,
    Reconnect,
    InvalidSession { resumable: bool },
}

/// Why the read loop returned without an error.
enum Exit {
    Shutdown,
    Reconnect,
}

/// Owns the connection and everything the driver task mutates.
struct Driver {
    token: String,
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    shared: Arc<Shared>,
    outgoing: mpsc::Receiver<GatewayMessage>,
    gateway_url: String,
    shard: Option<ShardInfo>,
    presence: Value,
    session_id: Option<String>,
    seq: Option<u64>,
}

impl Driver {
    fn with_presence(mut self, presence: Value) -> Self {
        self.presence = presence;
        self
    }

    async fn run(mut self, mut link: Link) -> CordResult<()> {
        loop {
            let reason = match self.read_loop(&mut link).await {
                Ok(Exit::Shutdown) => {
                    self.shared.set_state(GatewayState::Disconnecting);
                    link.close(self.shared.shutdown.close_code()).await;
                    self.shared.set_state(GatewayState::Disconnected);
                    return Ok(());
                }
                Ok(Exit::Reconnect) => "server requested reconnect".to_string(),
                Err(e) if e.is_invalid_session() => {
                    error!(error = %e, "session invalidated by the server");
                    link.close(None).await;
                    self.shared.set_state(GatewayState::Failed);
                    return Err(e);
                }
                Err(e) => e.to_string(),
            };

            link.close(None).await;
            match self.recover(&reason).await {
                Ok(Some(next)) => link = next,
                Ok(None) => {
                    self.shared.set_state(GatewayState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "gateway recovery failed");
                    self.shared.set_state(GatewayState::Failed);
                    return Err(e);
                }
            }
        }
    }

    async fn read_loop(&mut self, link: &mut Link) -> CordResult<Exit> {
        loop {
            let msg = match self.next_input(link).await? {
                Input::Message(msg) => msg,
                Input::Shutdown => return Ok(Exit::Shutdown),
            };
            match self.process(link, msg).await? {
                Control::Continue => {}
                Control::Reconnect => return Ok(Exit::Reconnect),
                Control::InvalidSession { resumable } => {
                    return Err(CordError::InvalidSession { resumable })
                }
            }
        }
    }

    /// Run heartbeats and outgoing sends until a message arrives or shutdown
    /// is requested. Errors mean the link is dead.
    async fn next_input(&mut self, link: &mut Link) -> CordResult<Input> {
        loop {
            if self.shared.shutdown.is_triggered() {
                return Ok(Input::Shutdown);
            }

            tokio::select! {
                _ = link.ticker.tick() => match link.heartbeat.on_tick() {
                    Beat::Send => self.send_heartbeat(link).await?,
                    Beat::LinkDead => {
                        warn!(
                            unanswered = link.heartbeat.unanswered(),
                            "heartbeats not acknowledged"
                        );
                        return Err(CordError::Timeout);
                    }
                },
                frame = link.stream.next_frame() => {
                    let text = frame?.ok_or_else(|| {
                        CordError::Transport("gateway closed the connection".into())
                    })?;
                    return Ok(Input::Message(frame_decode(&text)?));
                }
                Some(msg) = self.outgoing.recv() => link.send(&msg).await?,
                _ = self.shared.shutdown.notified() => {}
            }
        }
    }

    async fn process(&mut self, link: &mut Link, msg: GatewayMessage) -> CordResult<Control> {
        match msg.opcode() {
            Some(OpCode::Dispatch) => {
                if let Some(s) = msg.s {
                    self.advance_sequence(s);
                }
                match msg.t.as_deref() {
                    Some(name) => {
                        trace!(event = name, seq = ?msg.s, "dispatch");
                        self.dispatcher.dispatch(name, &msg.d);
                    }
                    None => warn!(seq = ?msg.s, "dispatch without an event name"),
                }
            }
            Some(OpCode::HeartbeatAck) => {
                link.heartbeat.on_ack();
                trace!(unanswered = link.heartbeat.unanswered(), "heartbeat acknowledged");
            }
            Some(OpCode::Heartbeat) => {
                debug!("server requested a heartbeat");
                self.send_heartbeat(link).await?;
            }
            Some(OpCode::Reconnect) => {
                info!("server requested reconnect");
                return Ok(Control::Reconnect);
            }
            Some(OpCode::InvalidSession) => {
                let resumable = msg.d.as_bool().unwrap_or(false);
                return Ok(Control::InvalidSession { resumable });
            }
            _ => trace!(op = msg.op, "ignoring gateway message"),
        }
        Ok(Control::Continue)
    }

    async fn send_heartbeat(&mut self, link: &mut Link) -> CordResult<()> {
        link.send(&GatewayMessage::heartbeat(self.seq)).await?;
        link.heartbeat.on_sent();
        trace!(seq = ?self.seq, unanswered = link.heartbeat.unanswered(), "heartbeat sent");
        Ok(())
    }

    fn advance_sequence(&mut self, s: u64) {
        let next = self.seq.map_or(s, |cur| cur.max(s));
        self.seq = Some(next);
        if let Some(session) = self.shared.session().as_mut() {
            session.last_sequence = Some(next);
        }
    }

    /// Open a link and run one handshake on it.
    async fn establish(&mut self, handshake: Handshake) -> CordResult<Link> {
        let mut link = self.open_link().await?;
        let result = match handshake {
            Handshake::Identify => self.identify(&mut link).await,
            Handshake::Resume => self.resume(&mut link).await,
        };
        match result {
            Ok(()) => {
                self.publish_session(link.interval);
                Ok(link)
            }
            Err(e) => {
                link.close(None).await;
                Err(e)
            }
        }
    }

    /// Connect and read Hello, giving up as soon as shutdown is requested.
    async fn open_link(&self) -> CordResult<Link> {
        let shutdown = self.shared.shutdown.clone();
        if shutdown.is_triggered() {
            return Err(CordError::Transport("shutdown before the link opened".into()));
        }
        tokio::select! {
            link = self.read_hello() => link,
            _ = shutdown.notified() => {
                debug!("shutdown while waiting for hello");
                Err(CordError::Transport("shutdown while opening the link".into()))
            }
        }
    }

    async fn read_hello(&self) -> CordResult<Link> {
        let url = self.config.endpoint(&self.gateway_url);
        debug!(%url, "opening gateway link");
        let mut connection = self.connector.connect(&url).await?;

        let frame = connection
            .stream
            .next_frame()
            .await?
            .ok_or_else(|| CordError::Transport("gateway closed before hello".into()))?;
        let hello = frame_decode(&frame)?;
        if hello.opcode() != Some(OpCode::Hello) {
            return Err(CordError::Protocol(format!(
                "expected hello, got op {}",
                hello.op
            )));
        }
        let HelloPayload { heartbeat_interval } = payload_decode(&hello)?;
        if heartbeat_interval == 0 {
            return Err(CordError::Protocol("hello with zero heartbeat interval".into()));
        }
        debug!(heartbeat_interval, "received hello");

        Ok(Link::new(connection, Duration::from_millis(heartbeat_interval)))
    }

    async fn identify(&mut self, link: &mut Link) -> CordResult<()> {
        self.shared.set_state(GatewayState::Identifying);
        self.shared.session().take();
        self.session_id = None;
        self.seq = None;

        let payload = IdentifyPayload {
            token: self.token.clone(),
            properties: ConnectionProperties {
                os: std::env::consts::OS.to_string(),
                browser: self.config.browser.clone(),
                device: self.config.device.clone(),
            },
            compress: false,
            large_threshold: self.config.large_threshold,
            presence: self.presence.clone(),
            shard: self.shard,
        };
        link.send(&GatewayMessage::identify(&payload)?).await?;
        debug!(shard = ?self.shard, "identify sent");

        let ready = self.wait_for(link, Event::Ready).await?;
        let ready: ReadyPayload = serde_json::from_value(ready)?;
        info!(session_id = %ready.session_id, "gateway session ready");
        self.session_id = Some(ready.session_id);
        Ok(())
    }

    async fn resume(&mut self, link: &mut Link) -> CordResult<()> {
        self.shared.set_state(GatewayState::Resuming);
        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| CordError::Protocol("no session to resume".into()))?;

        let payload = ResumePayload {
            token: self.token.clone(),
            session_id: session_id.clone(),
            seq: self.seq,
        };
        link.send(&GatewayMessage::resume(&payload)?).await?;
        debug!(%session_id, seq = ?self.seq, "resume sent");

        self.wait_for(link, Event::Resumed).await?;
        info!(%session_id, seq = ?self.seq, "gateway session resumed");
        Ok(())
    }

    /// Process messages until the dispatch named `event` arrives, returning
    /// its payload. Heartbeats keep running while waiting.
    async fn wait_for(&mut self, link: &mut Link, event: Event) -> CordResult<Value> {
        loop {
            let msg = match self.next_input(link).await? {
                Input::Message(msg) => msg,
                Input::Shutdown => {
                    return Err(CordError::Transport("shutdown during handshake".into()))
                }
            };
            let awaited = (msg.opcode() == Some(OpCode::Dispatch)
                && msg.t.as_deref() == Some(event.as_str()))
            .then(|| msg.d.clone());

            match self.process(link, msg).await? {
                Control::Continue => {
                    if let Some(d) = awaited {
                        return Ok(d);
                    }
                }
                Control::Reconnect => {
                    return Err(CordError::Transport(format!(
                        "reconnect requested while waiting for {event}"
                    )))
                }
                Control::InvalidSession { resumable } => {
                    return Err(CordError::InvalidSession { resumable })
                }
            }
        }
    }

    fn publish_session(&self, heartbeat_interval: Duration) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        *self.shared.session() = Some(Session {
            session_id,
            last_sequence: self.seq,
            gateway_url: self.gateway_url.clone(),
            shard: self.shard,
            heartbeat_interval,
        });
    }

    /// Replace a lost link: resume if there is a session, re-identify if the
    /// server invalidated it. Returns `None` if shutdown was requested.
    async fn recover(&mut self, reason: &str) -> CordResult<Option<Link>> {
        self.shared.set_state(GatewayState::Recovering);
        let recovery = self.shared.recoveries.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(recovery, reason, "gateway link lost, recovering");

        let max_attempts = self.config.max_reconnect_attempts.max(1);
        let mut attempt = 0;
        loop {
            if self.shared.shutdown.is_triggered() {
                return Ok(None);
            }

            let handshake = if self.session_id.is_some() {
                Handshake::Resume
            } else {
                Handshake::Identify
            };
            let err = match self.establish(handshake).await {
                Ok(link) => {
                    self.shared.set_state(GatewayState::Ready);
                    return Ok(Some(link));
                }
                Err(e) => e,
            };

            if self.shared.shutdown.is_triggered() {
                return Ok(None);
            }

            if err.is_invalid_session() && handshake == Handshake::Resume {
                info!("session could not be resumed, identifying");
                self.session_id = None;
                self.seq = None;
                self.shared.session().take();
                self.sleep_unless_shutdown(self.config.reidentify_delay())
                    .await;
                continue;
            }

            attempt += 1;
            if attempt >= max_attempts {
                return Err(err);
            }
            let delay = self.config.reconnect_backoff(attempt);
            warn!(attempt, ?delay, error = %err, "reconnect failed, retrying");
            self.sleep_unless_shutdown(delay).await;
        }
    }

    async fn sleep_unless_shutdown(&self, delay: Duration) {
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = self.shared.shutdown.notified() => {}
        }
    }
}
