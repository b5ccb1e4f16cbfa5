//! Client side of the RPC bridge: [`dial`] and [`ClientConn`].
//!
//! One [`ClientConn`] multiplexes any number of concurrent calls over a single
//! WebSocket.  A reader task routes incoming frames to calls by call id and a
//! writer task drains the bounded queue of outgoing frames; calls talk to
//! both through channels.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, SplitSink, Stream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rdk_types::RdkError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::flow::{CALL_WINDOW, CONNECTION_QUEUE, Credit};
use crate::wire::{Frame, RpcMessage, decode, encode};

/// Default time allowed for a dial to complete.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the close handshake once a connection is shut down.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DialOptions {
    pub timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection-side view of one call.
struct CallSlot {
    /// Responses plus the trailer.
    frames: mpsc::Sender<Frame>,
    /// Credit for requests, granted by the server.
    credit: Credit,
    fault: Arc<Mutex<Option<RdkError>>>,
}

impl CallSlot {
    fn fail(&self, err: RdkError) {
        *self.fault.lock() = Some(err);
        self.credit.close();
    }
}

type CallTable = Arc<Mutex<HashMap<Uuid, CallSlot>>>;

struct ConnInner {
    addr: String,
    out: mpsc::Sender<Frame>,
    calls: CallTable,
    closed: CancellationToken,
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// A live connection to an RPC server.  Cheap to clone.
#[derive(Clone)]
pub struct ClientConn {
    inner: Arc<ConnInner>,
}

fn connect_error(addr: &str, err: tungstenite::Error) -> RdkError {
    match &err {
        tungstenite::Error::Io(io) if io.kind() == io::ErrorKind::ConnectionRefused => {
            RdkError::ConnectionRefused(addr.to_string())
        }
        _ => RdkError::Transport(format!("dial {addr}: {err}")),
    }
}

fn connection_closed() -> RdkError {
    RdkError::Transport("connection closed".to_string())
}

/// Connect to the server at `addr` (`host:port` or a `ws://` URL).
///
/// # Errors
///
/// * [`RdkError::Canceled`] when `ctx` is cancelled before the connection is
///   established, including when it was already cancelled on entry.
/// * [`RdkError::ConnectionRefused`] when nothing listens at `addr`.
/// * [`RdkError::Timeout`] when the dial takes longer than
///   [`DialOptions::timeout`].
/// * [`RdkError::Transport`] for any other failure.
pub async fn dial(ctx: &CancellationToken, addr: &str, opts: DialOptions) -> Result<ClientConn, RdkError> {
    let url = if addr.starts_with("ws://") || addr.starts_with("wss://") {
        addr.to_string()
    } else {
        format!("ws://{addr}")
    };

    let connected = tokio::select! {
        biased;
        _ = ctx.cancelled() => return Err(RdkError::Canceled),
        _ = tokio::time::sleep(opts.timeout) => {
            return Err(RdkError::Timeout(format!("dial {addr} after {:?}", opts.timeout)));
        }
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };
    let (ws_stream, _response) = connected.map_err(|e| connect_error(addr, e))?;
    debug!(addr, "connected");

    let (out_tx, out_rx) = mpsc::channel(CONNECTION_QUEUE);
    let calls: CallTable = Arc::new(Mutex::new(HashMap::new()));
    let closed = CancellationToken::new();
    tokio::spawn(drive_connection(
        ws_stream,
        addr.to_string(),
        out_rx,
        Arc::clone(&calls),
        closed.clone(),
    ));

    Ok(ClientConn {
        inner: Arc::new(ConnInner {
            addr: addr.to_string(),
            out: out_tx,
            calls,
            closed,
        }),
    })
}

async fn drive_connection(
    ws_stream: Socket,
    addr: String,
    out_rx: mpsc::Receiver<Frame>,
    calls: CallTable,
    closed: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws_stream.split();
    let writer = tokio::spawn(write_frames(ws_tx, out_rx, addr.clone(), closed.clone()));

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                    Ok(frame) => route(&calls, frame),
                    Err(e) => warn!(addr, error = %e, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    closed.cancel();
    let _ = writer.await;
    let pending: Vec<CallSlot> = calls.lock().drain().map(|(_, slot)| slot).collect();
    debug!(addr, pending = pending.len(), "connection closed");
    for slot in pending {
        slot.fail(connection_closed());
    }
}

async fn write_frames(
    mut ws_tx: SplitSink<Socket, Message>,
    mut out_rx: mpsc::Receiver<Frame>,
    addr: String,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = out_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(addr, error = %e, "dropping unencodable frame");
                continue;
            }
        };
        let sent = tokio::select! {
            _ = closed.cancelled() => break,
            sent = ws_tx.send(Message::Text(text.into())) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    closed.cancel();
    let _ = tokio::time::timeout(CLOSE_GRACE, ws_tx.send(Message::Close(None))).await;
}

/// Hand one frame from the server to its call.  Never waits on the call.
fn route(calls: &CallTable, frame: Frame) {
    let call = frame.call();
    let mut calls = calls.lock();
    let Some(slot) = calls.get(&call) else {
        return;
    };
    let finished = match frame {
        Frame::Credit { n, .. } => {
            slot.credit.grant(n);
            false
        }
        frame => {
            let last = matches!(frame, Frame::Trailer { .. });
            match slot.frames.try_send(frame) {
                Ok(()) => last,
                Err(TrySendError::Full(_)) => {
                    warn!(%call, window = CALL_WINDOW, "server overran its window");
                    slot.fail(RdkError::Transport(format!(
                        "call {call} received more than {CALL_WINDOW} unread responses"
                    )));
                    true
                }
                Err(TrySendError::Closed(_)) => true,
            }
        }
    };
    if finished && let Some(slot) = calls.remove(&call) {
        slot.credit.close();
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// Client half of one call.  Dropping it before the trailer arrives cancels
/// the call on the server.
struct Call {
    id: Uuid,
    out: mpsc::Sender<Frame>,
    frames: mpsc::Receiver<Frame>,
    credit: Credit,
    fault: Arc<Mutex<Option<RdkError>>>,
    done: bool,
}

impl Call {
    async fn send(&self, frame: Frame) -> Result<(), RdkError> {
        self.out.send(frame).await.map_err(|_| connection_closed())
    }

    /// Send one request once the server has room for it.
    async fn send_message(&self, name: Option<String>, body: Value) -> Result<(), RdkError> {
        self.credit.spend().await?;
        self.send(Frame::Message {
            call: self.id,
            message: RpcMessage { name, body },
        })
        .await
    }

    async fn close_send(&self) -> Result<(), RdkError> {
        self.send(Frame::CloseSend { call: self.id }).await
    }

    fn cancel(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.credit.close();
        if let Err(TrySendError::Full(frame)) = self.out.try_send(Frame::Cancel { call: self.id }) {
            let out = self.out.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = out.send(frame).await;
                });
            }
        }
    }

    /// Next response body, `None` once the call finished successfully.
    async fn next(&mut self, ctx: &CancellationToken) -> Result<Option<Value>, RdkError> {
        if self.done {
            return Ok(None);
        }
        let frame = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                self.cancel();
                return Err(RdkError::Canceled);
            }
            frame = self.frames.recv() => frame,
        };
        match frame {
            Some(Frame::Message { message, .. }) => {
                // The response left the window; the server may send another.
                let _ = self.send(Frame::Credit { call: self.id, n: 1 }).await;
                Ok(Some(message.body))
            }
            Some(Frame::Trailer { error, .. }) => {
                self.done = true;
                error.map_or(Ok(None), Err)
            }
            Some(other) => Err(RdkError::Transport(format!(
                "unexpected frame from server: {other:?}"
            ))),
            None => {
                let err = self.fault.lock().take().unwrap_or_else(connection_closed);
                self.cancel();
                Err(err)
            }
        }
    }

    /// The single response of a unary or client-streaming call.
    async fn single<Resp: DeserializeOwned>(&mut self, ctx: &CancellationToken) -> Result<Resp, RdkError> {
        let body = self
            .next(ctx)
            .await?
            .ok_or_else(|| RdkError::Transport("call ended without a response".to_string()))?;
        if self.next(ctx).await?.is_some() {
            return Err(RdkError::Transport("call returned more than one response".to_string()));
        }
        decode(body)
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn response_stream<Resp>(call: Call, ctx: &CancellationToken) -> BoxStream<'static, Result<Resp, RdkError>>
where
    Resp: DeserializeOwned + Send + 'static,
{
    let ctx = ctx.clone();
    stream::unfold(Some(call), move |state| {
        let ctx = ctx.clone();
        async move {
            let mut call = state?;
            match call.next(&ctx).await {
                Ok(Some(body)) => Some((decode::<Resp>(body), Some(call))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }
    })
    .boxed()
}

impl ClientConn {
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Close the connection.  Calls still in flight fail with
    /// [`RdkError::Transport`].
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    async fn open(&self, method: &str) -> Result<Call, RdkError> {
        if self.is_closed() {
            return Err(RdkError::Transport(format!("connection to {} closed", self.inner.addr)));
        }
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CALL_WINDOW + 1);
        let credit = Credit::new();
        let fault = Arc::new(Mutex::new(None));
        self.inner.calls.lock().insert(
            id,
            CallSlot {
                frames: tx,
                credit: credit.clone(),
                fault: Arc::clone(&fault),
            },
        );
        let call = Call {
            id,
            out: self.inner.out.clone(),
            frames: rx,
            credit,
            fault,
            done: false,
        };
        call.send(Frame::Open {
            call: id,
            method: method.to_string(),
        })
        .await?;
        Ok(call)
    }

    /// One request to resource `name`, one response.
    pub async fn unary<Req, Resp>(
        &self,
        ctx: &CancellationToken,
        method: &str,
        name: &str,
        req: &Req,
    ) -> Result<Resp, RdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = encode(req)?;
        let mut call = self.open(method).await?;
        call.send_message(Some(name.to_string()), body).await?;
        call.close_send().await?;
        call.single(ctx).await
    }

    /// A stream of requests to resource `name`, one response.
    ///
    /// Sending waits while the server has [`CALL_WINDOW`] requests of this
    /// call still unread.
    pub async fn client_stream<Req, Resp, S>(
        &self,
        ctx: &CancellationToken,
        method: &str,
        name: &str,
        requests: S,
    ) -> Result<Resp, RdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        S: Stream<Item = Req>,
    {
        let mut call = self.open(method).await?;
        let mut requests = std::pin::pin!(requests);
        let mut first = true;
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(RdkError::Canceled),
                next = requests.next() => next,
            };
            let Some(req) = next else { break };
            let name = first.then(|| name.to_string());
            first = false;
            let body = encode(&req)?;
            let sent = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(RdkError::Canceled),
                sent = call.send_message(name, body) => sent,
            };
            if sent.is_err() {
                // The server ended the call early; its trailer says why.
                return call.single(ctx).await;
            }
        }
        call.close_send().await?;
        call.single(ctx).await
    }

    /// One request to resource `name`, a stream of responses.
    ///
    /// Dropping the returned stream cancels the call.  The server never runs
    /// more than [`CALL_WINDOW`] responses ahead of the reader.
    pub async fn server_stream<Req, Resp>(
        &self,
        ctx: &CancellationToken,
        method: &str,
        name: &str,
        req: &Req,
    ) -> Result<BoxStream<'static, Result<Resp, RdkError>>, RdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        let body = encode(req)?;
        let call = self.open(method).await?;
        call.send_message(Some(name.to_string()), body).await?;
        call.close_send().await?;
        Ok(response_stream(call, ctx))
    }

    /// Concurrent request and response streams addressed to resource `name`.
    ///
    /// Requests are forwarded by a background task until `requests` ends or
    /// the returned stream is dropped.
    pub async fn bidi<Req, Resp, S>(
        &self,
        ctx: &CancellationToken,
        method: &str,
        name: &str,
        requests: S,
    ) -> Result<BoxStream<'static, Result<Resp, RdkError>>, RdkError>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
        S: Stream<Item = Req> + Send + 'static,
    {
        let call = self.open(method).await?;
        let out = call.out.clone();
        let credit = call.credit.clone();
        let id = call.id;
        let name = name.to_string();
        let stop = ctx.child_token();
        let guard = stop.clone().drop_guard();

        tokio::spawn(async move {
            let mut requests = std::pin::pin!(requests);
            let mut first = true;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return,
                    next = requests.next() => next,
                };
                let Some(req) = next else { break };
                let body = match encode(&req) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(call = %id, error = %e, "dropping unencodable request");
                        continue;
                    }
                };
                let message = RpcMessage {
                    name: first.then(|| name.clone()),
                    body,
                };
                first = false;
                let sent = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return,
                    sent = async {
                        credit.spend().await?;
                        out.send(Frame::Message { call: id, message })
                            .await
                            .map_err(|_| connection_closed())
                    } => sent,
                };
                if sent.is_err() {
                    return;
                }
            }
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = out.send(Frame::CloseSend { call: id }) => {}
            }
        });

        let responses = response_stream::<Resp>(call, ctx);
        Ok(stream::unfold((responses, guard), |(mut responses, guard)| async move {
            let item = responses.next().await?;
            Some((item, (responses, guard)))
        })
        .boxed())
    }
}
