//! Bellite client: request correlation, dispatch and the reactor
//!
//! [`Bellite`] owns one session with one host. It allocates request ids,
//! keeps the pending request table, decodes inbound frames and routes them,
//! and sequences `connect` → `auth` → `ready`.
//!
//! # Client Lifecycle
//!
//! 1. **Connect**: open the TCP connection (or [`Bellite::attach`] any
//!    [`MessageTransport`]); the `connect` event fires and `auth` is sent
//! 2. **Authenticate**: the reply settles [`Bellite::ready`] and fires
//!    `auth(true, payload)` then `ready`, or only `auth(false, payload)`
//! 3. **Run**: the caller drives [`Bellite::run_once`] / [`Bellite::run`],
//!    which read from the socket and dispatch synchronously
//! 4. **Close**: pending calls are rejected with
//!    [`Error::ConnectionClosed`], then `close` fires once
//!
//! # Events
//!
//! | key         | arguments              |
//! |-------------|------------------------|
//! | `connect`   | none                   |
//! | `auth`      | `[ok, payload]`        |
//! | `ready`     | none                   |
//! | `close`     | none                   |
//! | `<evtType>` | `[params]` of the push |
//!
//! # Threading
//!
//! The client is a cheap `Rc` handle and is not `Send`. All continuations
//! and listeners run on the thread that drives the reactor, inside the call
//! that settled them. Listeners that capture a clone of the client keep the
//! session alive until they are removed.

use crate::api::{BelliteApi, RpcSession};
use crate::connection_state::SessionState;
use crate::credentials::Credentials;
use crate::metrics::ClientMetrics;
use crate::request::PendingRequests;
use crate::transport::{Inbound, MessageTransport, TcpReceiver, TcpTransport, TransportTimeouts};
use bellite_core::codec::{FrameBuffer, NulJsonCodec, RpcCodec, FRAME_DELIMITER};
use bellite_core::{
    Call, Deferred, Error, ErrorReporter, EventChannel, Listener, Message, Promise, Reply, Request,
    Result,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Tracing target of the `send ==>` / `recv <==` records
pub const TRAFFIC_TARGET: &str = "bellite::traffic";

/// Runtime settings of a client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Log every frame sent and received
    pub log_traffic: bool,
    pub timeouts: TransportTimeouts,
    /// How long one reactor tick waits for inbound bytes
    pub poll_timeout: Duration,
    /// Destination of unhandled continuation and listener errors
    pub reporter: ErrorReporter,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_traffic: false,
            timeouts: TransportTimeouts::default(),
            poll_timeout: Duration::from_millis(500),
            reporter: ErrorReporter::default(),
        }
    }
}

struct Inner {
    config: ClientConfig,
    transport: RefCell<Option<Rc<dyn MessageTransport>>>,
    receiver: RefCell<Option<TcpReceiver>>,
    requests: PendingRequests,
    frames: RefCell<FrameBuffer>,
    codec: NulJsonCodec,
    events: EventChannel<Bellite>,
    state: Cell<SessionState>,
    ready: Deferred<Value>,
    metrics: Option<Rc<ClientMetrics>>,
}

/// JSON-RPC client for a Bellite host
#[derive(Clone)]
pub struct Bellite {
    inner: Rc<Inner>,
}

impl Bellite {
    /// A client with no session yet
    pub fn new(config: ClientConfig) -> Self {
        Self::with_metrics(config, None)
    }

    pub(crate) fn with_metrics(config: ClientConfig, metrics: Option<Rc<ClientMetrics>>) -> Self {
        let reporter = config.reporter.clone();
        Self {
            inner: Rc::new(Inner {
                transport: RefCell::new(None),
                receiver: RefCell::new(None),
                requests: PendingRequests::new(),
                frames: RefCell::new(FrameBuffer::new()),
                codec: NulJsonCodec,
                events: EventChannel::with_reporter(reporter.clone()),
                state: Cell::new(SessionState::Disconnected),
                ready: Deferred::with_reporter(reporter),
                metrics,
                config,
            }),
        }
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Open a TCP connection to the host and start the session
    ///
    /// Returns the ready promise. A connection failure is returned as an
    /// error and also rejects the ready promise.
    #[tracing::instrument(skip(self, credentials), fields(host = %credentials.host, port = credentials.port))]
    pub async fn connect(&self, credentials: &Credentials) -> Result<Promise<Value>> {
        if self.state().has_started() {
            return Err(Error::Internal("session already started".into()));
        }

        tracing::info!("Connecting to Bellite host");
        let connected = TcpTransport::connect(
            &credentials.host,
            credentials.port,
            self.inner.config.timeouts,
        )
        .await;

        match connected {
            Ok((transport, receiver)) => {
                *self.inner.receiver.borrow_mut() = Some(receiver);
                self.attach(Rc::new(transport), &credentials.token)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Connection to Bellite host failed");
                self.record_error("connect");
                self.inner.ready.reject(error.clone());
                Err(error)
            }
        }
    }

    /// Start a session over an already connected transport
    ///
    /// Fires `connect`, sends `auth` with `token` and returns the ready
    /// promise. Inbound bytes must be fed through [`Bellite::receive_bytes`]
    /// unless the transport came from [`Bellite::connect`].
    pub fn attach(&self, transport: Rc<dyn MessageTransport>, token: &str) -> Result<Promise<Value>> {
        if self.state().has_started() {
            return Err(Error::Internal("session already started".into()));
        }

        *self.inner.transport.borrow_mut() = Some(transport);
        self.set_state(SessionState::Connecting);
        tracing::info!("Connected to Bellite host");
        self.emit("connect", &[]);
        if self.inner.transport.borrow().is_none() {
            // Closed by a `connect` listener
            return Ok(self.ready());
        }

        self.set_state(SessionState::Authenticating);
        let on_success = Rc::downgrade(&self.inner);
        let on_failure = Rc::downgrade(&self.inner);
        self.auth(token).then(
            move |payload| {
                if let Some(client) = Self::from_weak(&on_success) {
                    client.on_auth_succeeded(payload);
                }
                Ok(())
            },
            move |error| {
                if let Some(client) = Self::from_weak(&on_failure) {
                    client.on_auth_failed(error);
                }
                Ok(())
            },
        );

        Ok(self.ready())
    }

    /// Give up on a session that was never started
    ///
    /// Rejects the ready promise with `error` and leaves the client
    /// disconnected.
    pub(crate) fn abandon(&self, error: Error) {
        self.inner.ready.reject(error);
    }

    fn on_auth_succeeded(&self, payload: Value) {
        if self.state() == SessionState::Authenticating {
            self.set_state(SessionState::Ready);
        }
        tracing::info!("Authenticated with Bellite host");
        self.inner.ready.resolve(payload.clone());
        self.emit("auth", &[Value::Bool(true), payload]);
        self.emit("ready", &[]);
    }

    fn on_auth_failed(&self, error: Error) {
        self.set_state(SessionState::Closed);
        let payload = match &error {
            Error::Rpc(payload) => payload.clone(),
            other => json!(other.to_string()),
        };
        tracing::warn!(error = %error, "Bellite host refused authentication");
        self.inner.ready.reject(error);
        self.emit("auth", &[Value::Bool(false), payload]);
    }

    /// Settles with the `auth` reply payload once the session is ready
    pub fn ready(&self) -> Promise<Value> {
        self.inner.ready.promise()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.set(state);
        if let Some(metrics) = &self.inner.metrics {
            metrics.update_session_state(state.metric_value());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .transport
            .borrow()
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    /// Number of calls still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.inner.requests.pending_count()
    }

    /// Subscribe to a lifecycle event or a host event type
    pub fn on<F>(&self, key: impl Into<String>, listener: F) -> Listener<Bellite>
    where
        F: Fn(&Bellite, &[Value]) -> Result<()> + 'static,
    {
        self.inner.events.subscribe(key, listener)
    }

    pub fn off(&self, key: &str, listener: &Listener<Bellite>) -> bool {
        self.inner.events.unsubscribe(key, listener)
    }

    /// Fire `key` locally; returns how many listeners ran
    pub fn emit(&self, key: &str, args: &[Value]) -> usize {
        self.inner.events.emit(self, key, args)
    }

    pub fn events(&self) -> &EventChannel<Bellite> {
        &self.inner.events
    }

    /// Close the session
    ///
    /// Returns `false` if there was nothing to close.
    pub fn close(&self) -> bool {
        let Some(transport) = self.inner.transport.borrow_mut().take() else {
            return false;
        };
        self.inner.receiver.borrow_mut().take();
        transport.close();

        self.inner.frames.borrow_mut().clear();
        self.set_state(SessionState::Closed);
        tracing::info!("Bellite session closed");

        let failed = self.inner.requests.fail_all(Error::ConnectionClosed);
        if failed > 0 {
            tracing::debug!(count = failed, "Rejected pending requests on close");
        }
        self.inner.ready.reject(Error::ConnectionClosed);

        self.emit("close", &[]);
        true
    }

    fn send(&self, request: &Request) -> Result<()> {
        let transport = self
            .inner
            .transport
            .borrow()
            .clone()
            .ok_or(Error::NotConnected)?;
        if !transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let frame = self.inner.codec.encode(request)?;
        if self.inner.config.log_traffic {
            let body = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(&frame);
            tracing::info!(target: TRAFFIC_TARGET, "send ==> {}", String::from_utf8_lossy(body));
        }
        transport.send(frame)
    }

    /// Feed bytes read from the transport
    ///
    /// Partial frames are kept until their delimiter arrives; each complete
    /// frame is dispatched before this returns.
    pub fn receive_bytes(&self, bytes: &[u8]) {
        let frames = self.inner.frames.borrow_mut().push(bytes);
        for frame in frames {
            if self.state() == SessionState::Closed && self.inner.transport.borrow().is_none() {
                // A listener closed the session; the rest of the batch is stale
                break;
            }
            if self.inner.config.log_traffic {
                tracing::info!(target: TRAFFIC_TARGET, "recv <== {}", String::from_utf8_lossy(&frame));
            }
            self.dispatch(&frame);
        }
    }

    fn route_call(&self, call: Call) {
        match call.event_type() {
            Some(evt_type) => {
                let evt_type = evt_type.to_string();
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_event(&evt_type);
                }
                let params = call.params.unwrap_or(Value::Null);
                let fired = self.emit(&evt_type, &[params]);
                tracing::debug!(evt_type = %evt_type, listeners = fired, "Host event");
            }
            None => {
                tracing::debug!(method = %call.method, "Ignoring host call");
                self.record_dropped("unhandled_call");
            }
        }
    }

    fn route_reply(&self, reply: Reply) {
        let Some(pending) = self.inner.requests.take(reply.id) else {
            tracing::debug!(id = reply.id, "Dropping reply with no pending request");
            self.record_dropped("unknown_id");
            return;
        };

        let outcome = reply.into_result();
        if let Some(metrics) = &self.inner.metrics {
            let status = if outcome.is_ok() { "ok" } else { "error" };
            metrics.record_reply(
                &pending.method,
                status,
                pending.started.elapsed().as_secs_f64(),
            );
        }
        pending.deferred.settle(outcome);
    }

    fn record_error(&self, kind: &str) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_error(kind);
        }
    }

    fn record_dropped(&self, reason: &str) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_dropped_frame(reason);
        }
    }

    /// One reactor tick
    ///
    /// Waits up to `timeout` for inbound bytes and dispatches them. Returns
    /// whether the client is still connected afterwards.
    pub async fn run_once(&self, timeout: Duration) -> bool {
        if !self.is_connected() {
            // The writer gave up; the session cannot continue
            self.close();
            return false;
        }

        // Not held across the await: dispatch may close the session
        let receiver = self.inner.receiver.borrow_mut().take();
        let Some(mut receiver) = receiver else {
            tokio::time::sleep(timeout).await;
            return self.is_connected();
        };

        match receiver.recv(timeout).await {
            Inbound::Data(bytes) => {
                self.restore_receiver(receiver);
                self.receive_bytes(&bytes);
            }
            Inbound::Idle => self.restore_receiver(receiver),
            Inbound::Closed => {
                tracing::info!("Bellite host closed the connection");
                self.close();
            }
            Inbound::Failed(error) => {
                tracing::warn!(error = %error, "Read from Bellite host failed");
                self.record_error("read");
                self.close();
            }
        }
        self.is_connected()
    }

    fn restore_receiver(&self, receiver: TcpReceiver) {
        // A listener may have closed the session while we were reading
        if self.inner.transport.borrow().is_some() {
            *self.inner.receiver.borrow_mut() = Some(receiver);
        }
    }

    /// Drive the reactor until the session closes
    pub async fn run(&self, poll: Duration) {
        while self.run_once(poll).await {}
    }

    /// Drive the reactor until `promise` settles
    ///
    /// Fails with [`Error::Timeout`] when `limit` passes first, and with
    /// [`Error::NotConnected`] when the session ends with the promise still
    /// pending.
    pub async fn run_until_settled<T>(&self, promise: &Promise<T>, limit: Duration) -> Result<T>
    where
        T: Clone + 'static,
    {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(outcome) = promise.outcome() {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }

            let wait = self.inner.config.poll_timeout.min(deadline - now);
            if !self.run_once(wait).await {
                return promise.outcome().unwrap_or(Err(Error::NotConnected));
            }
        }
    }
}

impl RpcSession for Bellite {
    fn invoke(&self, method: &str, params: Option<Value>) -> Promise<Value> {
        let id = self.inner.requests.next_id();
        let deferred = Deferred::with_reporter(self.inner.config.reporter.clone());
        self.inner.requests.register(id, method, deferred.clone());

        match self.send(&Request::call(id, method, params)) {
            Ok(()) => {
                tracing::debug!(id, method, "Call sent");
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_request(method);
                }
            }
            Err(error) => {
                tracing::debug!(id, method, error = %error, "Call not sent");
                self.record_error("send");
                self.inner.requests.take(id);
                deferred.reject(error);
            }
        }
        deferred.promise()
    }

    fn notify(&self, method: &str, params: Option<Value>) -> bool {
        match self.send(&Request::notification(method, params)) {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(method, error = %error, "Notification not sent");
                self.record_error("send");
                false
            }
        }
    }

    fn dispatch(&self, frame: &[u8]) {
        match self.inner.codec.decode(frame) {
            Ok(Message::Call(call)) => self.route_call(call),
            Ok(Message::Reply(reply)) => self.route_reply(reply),
            Err(error) => {
                tracing::debug!(error = %error, len = frame.len(), "Dropping undecodable frame");
                self.record_dropped("decode");
            }
        }
    }
}

impl fmt::Debug for Bellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bellite")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
