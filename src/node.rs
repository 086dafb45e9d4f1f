//! One authenticated connection to an audio node: persistent socket with
//! reconnect handling, pooled HTTP client, stats ingestion and command
//! transmission.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::NodeOptions;
use crate::error::{Error, Result};
use crate::events::{CloseReason, LavaEvent};
use crate::manager::LavaInner;
use crate::protocol::{
    NodeEvent, NodeStats, OutgoingPayload, PlayerUpdatePayload, PluginRaw,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Writer half of an active session. Dropping the sender ends the write
/// task; cancelling the token tears the whole session down.
struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

pub struct Node {
    options: NodeOptions,
    lava: Weak<LavaInner>,
    http: reqwest::Client,
    rest_base: String,
    stats: RwLock<NodeStats>,
    /// Capabilities advertised by the node, name to version.
    plugins: RwLock<HashMap<String, String>>,
    calls: AtomicU64,
    connected: AtomicBool,
    connecting: AtomicBool,
    resumed: AtomicBool,
    destroyed: AtomicBool,
    reconnect_attempts: AtomicU32,
    session: Mutex<Option<SessionHandle>>,
}

impl Node {
    pub(crate) fn new(lava: Weak<LavaInner>, options: NodeOptions) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&options.password)
            .map_err(|_| Error::Validation("'password' is not a valid header value".into()))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let scheme = if options.secure { "https" } else { "http" };
        let rest_base = format!("{scheme}://{}", options.url);

        Ok(Self {
            options,
            lava,
            http,
            rest_base,
            stats: RwLock::new(NodeStats::default()),
            plugins: RwLock::new(HashMap::new()),
            calls: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            resumed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(1),
            session: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Last-known server statistics snapshot.
    pub fn stats(&self) -> NodeStats {
        self.stats.read().clone()
    }

    /// REST calls made against this node since creation.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the current session was resumed from a previous one.
    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn plugins(&self) -> HashMap<String, String> {
        self.plugins.read().clone()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.read().contains_key(name)
    }

    fn lava(&self) -> Option<Arc<LavaInner>> {
        self.lava.upgrade()
    }

    fn emit(&self, event: LavaEvent) {
        if let Some(inner) = self.lava() {
            inner.emit(event);
        }
    }

    fn emit_error(self: &Arc<Self>, error: Error) {
        self.emit(LavaEvent::NodeError {
            node: Arc::clone(self),
            error: Arc::new(error),
        });
    }

    /// Open the socket session. No-op when already connected, connecting or
    /// destroyed; the session runs on its own task.
    pub fn connect(self: &Arc<Self>) {
        if self.is_destroyed() || self.is_connected() {
            return;
        }
        if self.connecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.run_session().await;
        });
    }

    /// Tear the node down for good: close the socket with a terminal close
    /// frame, stop any pending reconnect and deregister. Idempotent.
    pub fn destroy(self: &Arc<Self>) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("destroying node '{}'", self.name());

        if let Some(handle) = self.session.lock().take() {
            handle.cancel.cancel();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.reconnect_attempts.store(1, Ordering::SeqCst);

        if let Some(inner) = self.lava() {
            inner.handle_node_destroy(self);
        }
    }

    /// Queue a payload for transmission. Returns `Ok(false)` without error
    /// when the node is not connected or the payload fails the structural
    /// check; socket-level write failures surface as node error events.
    pub fn send(&self, payload: &OutgoingPayload) -> Result<bool> {
        if !self.is_connected() {
            return Ok(false);
        }
        let json = serde_json::to_value(payload)?;
        if !json.is_object() {
            return Ok(false);
        }
        let session = self.session.lock();
        match session.as_ref() {
            Some(handle) => Ok(handle.tx.send(Message::Text(json.to_string())).is_ok()),
            None => Ok(false),
        }
    }

    /// Push the client's resume configuration, if one is set.
    pub(crate) fn configure_resume(&self) {
        let Some(inner) = self.lava() else { return };
        let Some(config) = inner.resume_config() else {
            return;
        };
        let payload = OutgoingPayload::ConfigureResuming {
            key: config.key,
            timeout: config.timeout,
        };
        if let Err(err) = self.send(&payload) {
            warn!("node '{}' failed to configure resuming: {err}", self.name());
        }
    }

    /// GET against the node's REST surface.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .get(format!("{}{endpoint}", self.rest_base))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and parse a JSON response.
    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(format!("{}{endpoint}", self.rest_base))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// POST where only the response status matters.
    pub(crate) async fn post_status(
        &self,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<reqwest::StatusCode> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut request = self.http.post(format!("{}{endpoint}", self.rest_base));
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request.send().await?.status())
    }

    async fn establish(&self) -> Result<Socket> {
        let Some(inner) = self.lava() else {
            return Err(Error::Validation("client was dropped".into()));
        };
        let Some(client_id) = inner.client_id() else {
            return Err(Error::Validation(
                "client must be initialized before connecting nodes".into(),
            ));
        };

        let scheme = if self.options.secure { "wss" } else { "ws" };
        let mut request = format!("{scheme}://{}/", self.options.url).into_client_request()?;
        let bad_header =
            |name: &str| Error::Validation(format!("'{name}' is not a valid header value"));

        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&self.options.password)
                .map_err(|_| bad_header("password"))?,
        );
        headers.insert(
            "Num-Shards",
            HeaderValue::from_str(&inner.options.shards.to_string())
                .map_err(|_| bad_header("shards"))?,
        );
        headers.insert(
            "User-Id",
            HeaderValue::from_str(&client_id).map_err(|_| bad_header("client id"))?,
        );
        headers.insert(
            "Client-Name",
            HeaderValue::from_str(&inner.options.client_name)
                .map_err(|_| bad_header("client name"))?,
        );
        if let Some(config) = inner.resume_config() {
            headers.insert(
                "Resume-Key",
                HeaderValue::from_str(&config.key).map_err(|_| bad_header("resume key"))?,
            );
        }

        let (socket, response) = connect_async(request).await?;

        let resumed = response
            .headers()
            .get("session-resumed")
            .map(|value| value.as_bytes() == b"true")
            .unwrap_or(false);
        self.resumed.store(resumed, Ordering::SeqCst);

        Ok(socket)
    }

    async fn run_session(self: Arc<Self>) {
        let socket = match self.establish().await {
            Ok(socket) => socket,
            Err(err) => {
                self.connecting.store(false, Ordering::SeqCst);
                warn!("node '{}' failed to connect: {err}", self.name());
                self.emit_error(err);
                self.schedule_reconnect();
                return;
            }
        };

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        *self.session.lock() = Some(SessionHandle {
            tx,
            cancel: cancel.clone(),
        });
        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
        self.reconnect_attempts.store(1, Ordering::SeqCst);
        info!(
            "node '{}' connected (resumed: {})",
            self.name(),
            self.is_resumed()
        );

        tokio::spawn(Self::write_loop(
            Arc::clone(&self),
            sink,
            rx,
            cancel.clone(),
        ));

        self.configure_resume();
        self.load_plugins().await;
        if let Some(inner) = self.lava() {
            inner.handle_node_connect(&self).await;
        }

        let close = self.read_loop(stream, &cancel).await;
        cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
        *self.session.lock() = None;

        if self.is_destroyed() {
            return;
        }
        debug!(
            "node '{}' disconnected: {} {}",
            self.name(),
            close.code,
            close.reason
        );
        let terminal = close.code == 1000 && close.reason == "destroy";
        if let Some(inner) = self.lava() {
            inner.handle_node_disconnect(&self, close).await;
        }
        if !terminal {
            self.schedule_reconnect();
        }
    }

    async fn read_loop(
        self: &Arc<Self>,
        mut stream: SplitStream<Socket>,
        cancel: &CancellationToken,
    ) -> CloseReason {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return CloseReason { code: 1000, reason: "destroy".into() };
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text).await,
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) => CloseReason {
                                code: frame.code.into(),
                                reason: frame.reason.into_owned(),
                            },
                            // 1005: closed without a status code
                            None => CloseReason { code: 1005, reason: String::new() },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        self.emit_error(err.into());
                        // 1006: abnormal closure
                        return CloseReason { code: 1006, reason: String::new() };
                    }
                    None => {
                        return CloseReason { code: 1006, reason: String::new() };
                    }
                }
            }
        }
    }

    async fn write_loop(
        node: Arc<Self>,
        mut sink: SplitSink<Socket, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "destroy".into(),
                        })))
                        .await;
                    return;
                }
                message = rx.recv() => match message {
                    Some(message) => {
                        if let Err(err) = sink.send(message).await {
                            node.emit_error(err.into());
                        }
                    }
                    None => return,
                }
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                self.emit_error(err.into());
                return;
            }
        };
        let Some(op) = value.get("op").and_then(Value::as_str).map(str::to_owned) else {
            return;
        };

        match op.as_str() {
            "stats" => match serde_json::from_value::<NodeStats>(value) {
                Ok(mut stats) => {
                    stats.last_updated = now_millis();
                    *self.stats.write() = stats;
                }
                Err(err) => self.emit_error(err.into()),
            },
            "playerUpdate" => match serde_json::from_value::<PlayerUpdatePayload>(value) {
                Ok(payload) => {
                    if let Some(inner) = self.lava() {
                        inner
                            .handle_player_update(self, &payload.guild_id, payload.state)
                            .await;
                    }
                }
                Err(err) => self.emit_error(err.into()),
            },
            "event" => match serde_json::from_value::<NodeEvent>(value.clone()) {
                Ok(event) => {
                    if let Some(inner) = self.lava() {
                        inner.handle_event(self, event).await;
                    }
                }
                Err(_) => {
                    let kind = value
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    self.emit_error(Error::UnexpectedOp {
                        op: format!("event/{kind}"),
                        payload: text.to_owned(),
                    });
                }
            },
            other => self.emit_error(Error::UnexpectedOp {
                op: other.to_owned(),
                payload: text.to_owned(),
            }),
        }
    }

    async fn load_plugins(self: &Arc<Self>) {
        let list: Vec<PluginRaw> = match self.request("/plugins").await {
            Ok(list) => list,
            Err(err) => {
                debug!("node '{}' reported no plugins: {err}", self.name());
                return;
            }
        };
        {
            let mut plugins = self.plugins.write();
            plugins.clear();
            plugins.extend(list.into_iter().map(|p| (p.name, p.version)));
        }

        let Some(inner) = self.lava() else { return };
        let missing: Vec<String> = inner
            .options
            .required_plugins
            .iter()
            .filter(|name| !self.has_plugin(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!("node '{}' lacks plugins: {missing:?}", self.name());
            self.emit(LavaEvent::NodeMissingPlugins {
                node: Arc::clone(self),
                missing,
            });
        }
    }

    /// One pending reconnect at a time; this is only called from the session
    /// task after the previous attempt has fully wound down.
    fn schedule_reconnect(self: &Arc<Self>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(node.options.retry_delay).await;
            if node.is_destroyed() {
                return;
            }

            let attempts = node.reconnect_attempts.load(Ordering::SeqCst);
            if attempts >= node.options.retry_amount {
                let error = Error::ReconnectExhausted {
                    name: node.name().to_owned(),
                    attempts: node.options.retry_amount,
                };
                error!("{error}");
                node.emit_error(error);
                node.destroy();
                return;
            }

            node.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            node.emit(LavaEvent::NodeReconnect(Arc::clone(&node)));
            node.connect();
        });
    }

    #[cfg(test)]
    pub(crate) fn force_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn force_calls(&self, calls: u64) {
        self.calls.store(calls, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn force_plugin(&self, name: &str, version: &str) {
        self.plugins
            .write()
            .insert(name.to_owned(), version.to_owned());
    }

    #[cfg(test)]
    pub(crate) fn force_stats(&self, stats: NodeStats) {
        *self.stats.write() = stats;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.options.name)
            .field("url", &self.options.url)
            .field("connected", &self.is_connected())
            .field("resumed", &self.is_resumed())
            .field("destroyed", &self.is_destroyed())
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_util::test_lava;

    #[tokio::test]
    async fn send_is_a_quiet_no_op_while_disconnected() {
        let lava = test_lava();
        let node = lava
            .create_node(crate::config::NodeOptions::new("main", "localhost:2333").unwrap())
            .unwrap();

        let sent = node
            .send(&OutgoingPayload::Stop {
                guild_id: "guild".into(),
            })
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn exhausting_the_reconnect_budget_destroys_the_node() {
        let lava = test_lava();
        let mut events = lava.subscribe();
        lava.init("42").unwrap();

        // Port 1 refuses connections immediately.
        let node = lava
            .create_node(
                crate::config::NodeOptions::new("doomed", "127.0.0.1:1")
                    .unwrap()
                    .retry_amount(2)
                    .retry_delay(Duration::from_millis(10)),
            )
            .unwrap();

        let mut reconnects = 0;
        let mut exhausted = false;
        let wait = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match events.recv().await.expect("event stream stays open") {
                    LavaEvent::NodeReconnect(_) => reconnects += 1,
                    LavaEvent::NodeError { error, .. } => {
                        if matches!(*error, Error::ReconnectExhausted { .. }) {
                            exhausted = true;
                        }
                    }
                    LavaEvent::NodeDestroy(_) => break,
                    _ => {}
                }
            }
        })
        .await;

        assert!(wait.is_ok(), "node never destroyed itself");
        assert!(exhausted);
        assert_eq!(reconnects, 1);
        assert!(node.is_destroyed());
        assert!(!node.is_connected());
        assert!(lava.node("doomed").is_none());
    }
}
