//! [`RpcServer`] – WebSocket endpoint serving every registered API.
//!
//! Each accepted connection is served by two tasks:
//!
//! * a reader that decodes frames from the peer and routes them to per-call
//!   tasks by call id, never waiting on any one call;
//! * a writer that drains the bounded queue of frames produced by call tasks.
//!
//! Closing the connection cancels every call still running on it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::SinkExt;
use futures_util::stream::{self, SplitSink, StreamExt};
use parking_lot::Mutex;
use rdk_types::{Api, RdkError};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::flow::{CALL_WINDOW, CONNECTION_QUEUE, Credit};
use crate::service::{RequestStream, RpcService};
use crate::wire::{Frame, RpcMessage, parse_method_path};

/// Connection-side view of one running call.
struct ServerCall {
    /// Requests for the call task; `None` once the client half-closed.
    inbound: Option<mpsc::Sender<RpcMessage>>,
    /// Credit for responses, granted by the client.
    credit: Credit,
    token: CancellationToken,
    /// Why the connection ended the call, when it did.
    fault: Arc<Mutex<Option<RdkError>>>,
}

impl ServerCall {
    fn fail(&self, err: RdkError) {
        *self.fault.lock() = Some(err);
        self.credit.close();
        self.token.cancel();
    }
}

type Services = Arc<HashMap<Api, Arc<dyn RpcService>>>;
type CallTable = Arc<Mutex<HashMap<Uuid, ServerCall>>>;
type Outbound = mpsc::Sender<Frame>;

/// WebSocket RPC server.
///
/// # Example
///
/// ```rust,no_run
/// use rdk_rpc::RpcServer;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), rdk_types::RdkError> {
/// let server = RpcServer::new();
/// server
///     .serve("127.0.0.1:8080".parse().unwrap(), CancellationToken::new())
///     .await
/// # }
/// ```
#[derive(Default)]
pub struct RpcServer {
    services: HashMap<Api, Arc<dyn RpcService>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`RdkError::DuplicateRegistration`] when the API is already served.
    pub fn add_service(&mut self, service: Arc<dyn RpcService>) -> Result<(), RdkError> {
        let api = service.api().clone();
        if self.services.contains_key(&api) {
            return Err(RdkError::DuplicateRegistration {
                api: api.to_string(),
                model: "<service>".to_string(),
            });
        }
        debug!(%api, methods = ?service.methods(), "serving api");
        self.services.insert(api, service);
        Ok(())
    }

    pub fn apis(&self) -> Vec<Api> {
        let mut apis: Vec<Api> = self.services.keys().cloned().collect();
        apis.sort();
        apis
    }

    /// Bind `addr` and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// [`RdkError::Transport`] when the listener cannot be bound.
    pub async fn serve(self, addr: SocketAddr, shutdown: CancellationToken) -> Result<(), RdkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RdkError::Transport(format!("bind error on {addr}: {e}")))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` is cancelled.
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), RdkError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, apis = self.services.len(), "rpc server listening");
        }
        let services: Services = Arc::new(self.services);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("rpc server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let services = Arc::clone(&services);
                        let conn_token = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, services, conn_token).await {
                                warn!(peer = %peer, error = %e, "rpc client error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "rpc accept error");
                    }
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

#[instrument(name = "rpc.conn", skip_all, fields(peer = %peer))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    services: Services,
    conn_token: CancellationToken,
) -> Result<(), RdkError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| RdkError::Transport(format!("ws handshake from {peer}: {e}")))?;
    debug!(peer = %peer, "rpc client connected");

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, out_rx) = mpsc::channel::<Frame>(CONNECTION_QUEUE);
    let calls: CallTable = Arc::new(Mutex::new(HashMap::new()));
    let writer = tokio::spawn(write_frames(ws_tx, out_rx, Arc::clone(&calls), conn_token.clone()));

    loop {
        tokio::select! {
            biased;
            _ = conn_token.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                    Ok(frame) => on_frame(frame, &services, &calls, &out_tx, &conn_token),
                    Err(e) => warn!(peer = %peer, error = %e, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    // Tear down every call still running on this connection.
    conn_token.cancel();
    let _ = writer.await;
    debug!(peer = %peer, abandoned = calls.lock().len(), "rpc client disconnected");
    Ok(())
}

async fn write_frames(
    mut ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut out_rx: mpsc::Receiver<Frame>,
    calls: CallTable,
    conn_token: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = conn_token.cancelled() => break,
            frame = out_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Frame::Trailer { call, .. } = &frame {
            calls.lock().remove(call);
        }
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "dropping unencodable frame");
                continue;
            }
        };
        let sent = tokio::select! {
            _ = conn_token.cancelled() => break,
            sent = ws_tx.send(Message::Text(text.into())) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    conn_token.cancel();
}

/// Route one frame from the peer.  Never waits: a call that cannot keep up
/// is ended rather than allowed to hold up the connection.
fn on_frame(
    frame: Frame,
    services: &Services,
    calls: &CallTable,
    out: &Outbound,
    conn_token: &CancellationToken,
) {
    let mut calls = calls.lock();
    match frame {
        Frame::Open { call, method } => {
            let token = conn_token.child_token();
            let credit = Credit::new();
            let fault = Arc::new(Mutex::new(None));
            let task = CallTask {
                call,
                token: token.clone(),
                credit: credit.clone(),
                fault: Arc::clone(&fault),
                out: out.clone(),
            };
            if calls.contains_key(&call) {
                let err = RdkError::InvalidArgument(format!("call {call} already open"));
                tokio::spawn(task.reject(err));
                return;
            }
            let (service, method) = match lookup_method(services, &method) {
                Ok(found) => found,
                Err(e) => {
                    debug!(%call, method, error = %e, "rejecting call");
                    tokio::spawn(task.reject(e));
                    return;
                }
            };
            let (inbound_tx, inbound_rx) = mpsc::channel(CALL_WINDOW);
            calls.insert(
                call,
                ServerCall {
                    inbound: Some(inbound_tx),
                    credit,
                    token,
                    fault,
                },
            );
            tokio::spawn(task.run(service, method, inbound_rx));
        }
        Frame::Message { call, message } => {
            let Some(entry) = calls.get(&call) else {
                return;
            };
            let Some(inbound) = &entry.inbound else {
                debug!(%call, "dropping request sent after half-close");
                return;
            };
            match inbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%call, window = CALL_WINDOW, "client overran its window");
                    entry.fail(RdkError::InvalidArgument(format!(
                        "call {call} sent more than {CALL_WINDOW} unread requests"
                    )));
                    calls.remove(&call);
                }
                // The call already finished; late requests are dropped.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Frame::CloseSend { call } => {
            if let Some(entry) = calls.get_mut(&call) {
                entry.inbound = None;
            }
        }
        Frame::Cancel { call } => {
            if let Some(entry) = calls.get(&call) {
                debug!(%call, "client cancelled call");
                entry.token.cancel();
            }
        }
        Frame::Credit { call, n } => {
            if let Some(entry) = calls.get(&call) {
                entry.credit.grant(n);
            }
        }
        Frame::Trailer { call, .. } => {
            warn!(%call, "ignoring trailer sent by client");
        }
    }
}

/// Find the service for `path`, checking that it has the method.
fn lookup_method(services: &Services, path: &str) -> Result<(Arc<dyn RpcService>, String), RdkError> {
    let (api, method) = parse_method_path(path)?;
    let service = services
        .get(&api)
        .ok_or_else(|| RdkError::Unimplemented(path.to_string()))?;
    if service.method_kind(method).is_none() {
        return Err(RdkError::Unimplemented(path.to_string()));
    }
    Ok((Arc::clone(service), method.to_string()))
}

fn connection_closed() -> RdkError {
    RdkError::Transport("connection closed".to_string())
}

/// Server half of one call.
struct CallTask {
    call: Uuid,
    token: CancellationToken,
    credit: Credit,
    fault: Arc<Mutex<Option<RdkError>>>,
    out: Outbound,
}

impl CallTask {
    async fn reject(self, err: RdkError) {
        let _ = self
            .out
            .send(Frame::Trailer {
                call: self.call,
                error: Some(err),
            })
            .await;
    }

    #[instrument(name = "rpc.call", skip_all, fields(call = %self.call, method = %method))]
    async fn run(self, service: Arc<dyn RpcService>, method: String, inbound: mpsc::Receiver<RpcMessage>) {
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.fault.lock().take().unwrap_or(RdkError::Canceled)),
            result = self.drive(service.as_ref(), &method, inbound) => result,
        };
        if let Err(e) = &result {
            debug!(call = %self.call, method, error = %e, "call failed");
        }
        let _ = self
            .out
            .send(Frame::Trailer {
                call: self.call,
                error: result.err(),
            })
            .await;
    }

    async fn drive(
        &self,
        service: &dyn RpcService,
        method: &str,
        mut inbound: mpsc::Receiver<RpcMessage>,
    ) -> Result<(), RdkError> {
        let RpcMessage { name, body } = inbound.recv().await.ok_or_else(|| {
            RdkError::InvalidArgument("call closed before its first request".to_string())
        })?;
        self.out
            .send(Frame::Credit { call: self.call, n: 1 })
            .await
            .map_err(|_| connection_closed())?;
        let name = name.ok_or_else(|| {
            RdkError::InvalidArgument("first request must name a resource".to_string())
        })?;

        let requests = request_stream(self.call, body, name.clone(), inbound, self.out.clone());
        let mut responses = service.call(method, &name, self.token.clone(), requests)?;

        while let Some(item) = responses.next().await {
            let message = RpcMessage::body(item?);
            self.credit.spend().await?;
            self.out
                .send(Frame::Message {
                    call: self.call,
                    message,
                })
                .await
                .map_err(|_| connection_closed())?;
        }
        Ok(())
    }
}

/// Requests of one call: the first body, then every later message until the
/// client half-closes.  Each request taken hands one credit back to the
/// client.
///
/// A later message naming a different resource ends the stream with
/// [`RdkError::InvalidArgument`].
fn request_stream(
    call: Uuid,
    first: Value,
    name: String,
    inbound: mpsc::Receiver<RpcMessage>,
    out: Outbound,
) -> RequestStream {
    let rest = stream::unfold(Some((inbound, name, out)), move |state| async move {
        let (mut inbound, name, out) = state?;
        let message = inbound.recv().await?;
        let _ = out.send(Frame::Credit { call, n: 1 }).await;
        match message.name {
            Some(other) if other != name => Some((
                Err(RdkError::InvalidArgument(format!(
                    "stream addressed {name:?} but a later message named {other:?}"
                ))),
                None,
            )),
            _ => Some((Ok(message.body), Some((inbound, name, out)))),
        }
    });
    stream::once(async move { Ok(first) }).chain(rest).boxed()
}
