use crate::{
    envelopes::{self, Envelope, EnvelopeError},
    Event, Filter, ID,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// bound on a single outbound send attempt, including the wait for an
/// open connection
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// pause before retrying a failed outbound item
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// pause before redialing after a failed connection attempt; a connection
/// that opened and then dropped is redialed immediately
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("relay connection error")]
    Websocket,

    #[error("connection attempt cancelled")]
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("relay client has been shut down")]
    Closed,
}

/// lifecycle of the single logical connection to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// everything a relay can tell us, in arrival order
#[derive(Debug, Clone)]
pub enum Occurrence {
    /// a verified event for one of our subscriptions; events whose id or
    /// signature do not check out never show up here
    Event {
        subscription_id: String,
        event: Event,
    },
    /// human-readable notice from the relay
    Notice(String),
    /// the relay finished replaying stored events for a subscription
    Eose(String),
    /// acknowledgment for a previously published event
    Ok {
        event_id: ID,
        accepted: bool,
        message: String,
    },
}

/// a client connection to one relay
///
/// cheap to clone; all clones share the same queues and connection. create
/// with [`Relay::new`] (inside a tokio runtime), then spawn [`Relay::run`]
/// to actually reach the network.
///
/// `publish`, `subscribe` and `close_subscription` only enqueue: the
/// outbound pump delivers queued commands in order whenever a connection
/// is open, holding on to them across reconnects. subscriptions are not
/// replayed after a reconnect; callers subscribe again when they see the
/// connection cycle.
#[derive(Clone)]
pub struct Relay {
    pub url: Url,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: Arc<Mutex<Option<WsSink>>>,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    epoch: Arc<AtomicU64>,
    dial_lock: Arc<Mutex<()>>,
}

impl Relay {
    /// create the client and its occurrence stream and start both pump
    /// workers. nothing touches the network until `run` is called.
    pub fn new(url: Url) -> (Self, mpsc::UnboundedReceiver<Occurrence>) {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let state = Arc::new(state);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (occurrences_tx, occurrences_rx) = mpsc::unbounded_channel();
        let writer: Arc<Mutex<Option<WsSink>>> = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let relay = Self {
            url: url.clone(),
            state: state.clone(),
            writer: writer.clone(),
            outgoing: outgoing_tx,
            incoming: incoming_tx,
            cancel: cancel.clone(),
            epoch: Arc::new(AtomicU64::new(0)),
            dial_lock: Arc::new(Mutex::new(())),
        };

        tokio::spawn(run_outbound(
            outgoing_rx,
            writer,
            state,
            cancel.clone(),
            url.clone(),
        ));
        tokio::spawn(run_inbound(incoming_rx, occurrences_tx, cancel, url));

        (relay, occurrences_rx)
    }

    /// current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// open the transport connection, blocking until the handshake
    /// completes or cancellation fires. idempotent: returns immediately
    /// when the connection is already open.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _guard = self.dial_lock.lock().await;

        if self.cancel.is_cancelled() {
            return Err(ConnectError::Cancelled);
        }
        if *self.state.borrow() == ConnectionState::Open {
            return Ok(());
        }

        self.state.send_replace(ConnectionState::Connecting);

        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|_| ConnectError::Websocket)?;

        let ws = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ConnectError::Cancelled),
            res = connect_async_tls_with_config(request, None, false, None) => match res {
                Ok((ws, _)) => ws,
                Err(err) => {
                    log::info!("[{}] connection failed: {}", self.url, err);
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(ConnectError::Websocket);
                }
            },
        };

        let (sink, stream) = ws.split();

        // the previous transport handle, if any, is abandoned entirely
        *self.writer.lock().await = Some(sink);
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::spawn(run_reader(
            stream,
            self.incoming.clone(),
            self.writer.clone(),
            self.state.clone(),
            self.epoch.clone(),
            my_epoch,
            self.cancel.clone(),
            self.url.clone(),
        ));

        self.state.send_replace(ConnectionState::Open);
        log::debug!("[{}] connected", self.url);

        Ok(())
    }

    /// connect and keep the connection alive, reconnecting on any
    /// unexpected close, until `disconnect` is called. the transport is
    /// released on every exit path.
    pub async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect().await {
                Ok(()) => {
                    let mut state = self.state.subscribe();
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
                            log::info!("[{}] connection lost, reconnecting", self.url);
                        }
                    }
                }
                Err(ConnectError::Cancelled) => break,
                Err(_) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Closing);
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        log::debug!("[{}] run loop finished", self.url);
    }

    /// request cancellation of the run loop; does not block
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// enqueue an EVENT command for this event
    pub fn publish(&self, event: &Event) -> Result<(), QueueError> {
        self.enqueue(serde_json::json!(["EVENT", event]).to_string())
    }

    /// enqueue a REQ command opening a subscription with a caller-chosen id
    pub fn subscribe(&self, id: &str, filters: &[Filter]) -> Result<(), QueueError> {
        let mut parts: Vec<serde_json::Value> = Vec::with_capacity(2 + filters.len());
        parts.push("REQ".into());
        parts.push(id.into());
        for filter in filters {
            parts.push(serde_json::to_value(filter).expect("filter serialization cannot fail"));
        }
        self.enqueue(serde_json::Value::Array(parts).to_string())
    }

    /// enqueue a CLOSE command ending a subscription
    pub fn close_subscription(&self, id: &str) -> Result<(), QueueError> {
        self.enqueue(serde_json::json!(["CLOSE", id]).to_string())
    }

    fn enqueue(&self, message: String) -> Result<(), QueueError> {
        self.outgoing.send(message).map_err(|_| QueueError::Closed)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl std::fmt::Display for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<relay url={}>", self.url)
    }
}

/// outbound pump: drains queued commands to the wire in enqueue order.
/// an item is removed only after a successful send; failed or timed-out
/// attempts keep it at the head of the queue to be retried once the
/// connection comes back.
async fn run_outbound(
    mut queue: mpsc::UnboundedReceiver<String>,
    writer: Arc<Mutex<Option<WsSink>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    url: Url,
) {
    let mut pending: Option<String> = None;
    let mut attempts = 0u32;

    loop {
        let msg = match pending.take() {
            Some(msg) => msg,
            None => {
                attempts = 0;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = queue.recv() => match next {
                        Some(msg) => msg,
                        None => return,
                    },
                }
            }
        };

        let attempt = tokio::time::timeout(SEND_TIMEOUT, async {
            let mut state = state.subscribe();
            if state
                .wait_for(|s| *s == ConnectionState::Open)
                .await
                .is_err()
            {
                return false;
            }

            let mut writer = writer.lock().await;
            match writer.as_mut() {
                Some(sink) => sink.send(Message::text(msg.clone())).await.is_ok(),
                None => false,
            }
        });

        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            result = attempt => result.unwrap_or(false),
        };

        if !sent {
            attempts += 1;
            log::warn!(
                "[{}] failed to deliver outbound message (attempt {}), will retry",
                url,
                attempts
            );
            pending = Some(msg);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }
    }
}

/// inbound pump: dispatches complete frames in arrival order. a frame that
/// cannot be handled is dropped; the queue and the connection continue.
async fn run_inbound(
    mut queue: mpsc::UnboundedReceiver<String>,
    occurrences: mpsc::UnboundedSender<Occurrence>,
    cancel: CancellationToken,
    url: Url,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            next = queue.recv() => match next {
                Some(frame) => frame,
                None => return,
            },
        };

        handle_message(&frame, &occurrences, &url);
    }
}

fn handle_message(message: &str, occurrences: &mpsc::UnboundedSender<Occurrence>, url: &Url) {
    match envelopes::parse_message(message) {
        Ok(Envelope::Event {
            subscription_id,
            event,
        }) => {
            if event.verify() {
                let _ = occurrences.send(Occurrence::Event {
                    subscription_id,
                    event,
                });
            } else {
                log::debug!("[{}] dropping event {} with bad id or signature", url, event.id);
            }
        }
        Ok(Envelope::Notice(text)) => {
            let _ = occurrences.send(Occurrence::Notice(text));
        }
        Ok(Envelope::Eose { subscription_id }) => {
            let _ = occurrences.send(Occurrence::Eose(subscription_id));
        }
        Ok(Envelope::Ok {
            event_id,
            accepted,
            message,
        }) => {
            let _ = occurrences.send(Occurrence::Ok {
                event_id,
                accepted,
                message,
            });
        }
        Err(EnvelopeError::UnknownLabel(label)) => {
            log::debug!("[{}] ignoring message with label {}", url, label);
        }
        Err(err) => {
            log::info!("[{}] wrong message: {}", url, err);
        }
    }
}

/// per-connection reader: forwards complete text frames into the inbound
/// queue until the transport dies. each reconnect gets a fresh reader; a
/// stale one must not clobber the state of its replacement.
#[allow(clippy::too_many_arguments)]
async fn run_reader(
    mut stream: SplitStream<WsStream>,
    incoming: mpsc::UnboundedSender<String>,
    writer: Arc<Mutex<Option<WsSink>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
    cancel: CancellationToken,
    url: Url,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if incoming.send(text.to_string()).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                if let Some(sink) = writer.lock().await.as_mut() {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                log::info!("[{}] relay closed the connection: {:?}", url, frame);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                log::info!("[{}] read error: {}", url, err);
                break;
            }
            None => break,
        }
    }

    if epoch.load(Ordering::SeqCst) == my_epoch && !cancel.is_cancelled() {
        state.send_replace(ConnectionState::Disconnected);
    }
}
