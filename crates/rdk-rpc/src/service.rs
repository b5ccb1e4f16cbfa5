//! Server-side method tables.
//!
//! An [`ApiServer`] binds the methods of one API to the live resources in that
//! API's [`SubtypeCollection`].  Every call names its target resource; the
//! server looks it up at call time so resources swapped in by a reconfigure
//! are picked up without restarting the server.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use rdk_resource::{Resource, SubtypeCollection};
use rdk_types::{Api, Command, RdkError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::wire::{decode, encode};

/// Requests flowing into a call, already stripped of their resource name.
pub type RequestStream = BoxStream<'static, Result<Value, RdkError>>;
/// Responses flowing out of a call.
pub type ResponseStream = BoxStream<'static, Result<Value, RdkError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ClientStream,
    ServerStream,
    Bidi,
}

/// Type-erased server for one API.
pub trait RpcService: Send + Sync {
    fn api(&self) -> &Api;

    fn method_kind(&self, method: &str) -> Option<MethodKind>;

    fn methods(&self) -> Vec<String>;

    /// Start one call against the resource `name`.
    ///
    /// # Errors
    ///
    /// [`RdkError::Unimplemented`] for unknown methods and
    /// [`RdkError::NotFound`] when no resource answers to `name`.
    fn call(
        &self,
        method: &str,
        name: &str,
        ctx: CancellationToken,
        requests: RequestStream,
    ) -> Result<ResponseStream, RdkError>;
}

type Handler<T> =
    Arc<dyn Fn(Arc<T>, CancellationToken, RequestStream) -> ResponseStream + Send + Sync>;

struct Method<T: ?Sized> {
    kind: MethodKind,
    handler: Handler<T>,
}

/// Method table of one API, dispatching to resources of capability `T`.
///
/// `DoCommand` is always present and forwards to [`Resource::do_command`].
pub struct ApiServer<T: ?Sized> {
    api: Api,
    collection: Arc<SubtypeCollection<T>>,
    methods: BTreeMap<String, Method<T>>,
}

async fn first_request<Req: DeserializeOwned>(requests: &mut RequestStream) -> Result<Req, RdkError> {
    match requests.next().await {
        Some(item) => decode(item?),
        None => Err(RdkError::InvalidArgument("call carried no request".to_string())),
    }
}

fn typed_requests<Req: DeserializeOwned + Send + 'static>(
    requests: RequestStream,
) -> BoxStream<'static, Result<Req, RdkError>> {
    requests.map(|item| item.and_then(decode::<Req>)).boxed()
}

fn erased_responses<Resp: Serialize + Send + 'static>(
    responses: BoxStream<'static, Result<Resp, RdkError>>,
) -> ResponseStream {
    responses.map(|item| item.and_then(|r| encode(&r))).boxed()
}

impl<T: ?Sized + Resource> ApiServer<T> {
    pub fn new(api: Api, collection: Arc<SubtypeCollection<T>>) -> Self {
        let server = Self {
            api,
            collection,
            methods: BTreeMap::new(),
        };
        server.unary("DoCommand", |res: Arc<T>, ctx, cmd: Command| async move {
            res.do_command(&ctx, cmd).await
        })
    }

    fn insert(mut self, method: &str, kind: MethodKind, handler: Handler<T>) -> Self {
        self.methods.insert(method.to_string(), Method { kind, handler });
        self
    }

    /// One request, one response.
    pub fn unary<Req, Resp, F, Fut>(self, method: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<T>, CancellationToken, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RdkError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler<T> = Arc::new(
            move |res: Arc<T>, ctx: CancellationToken, mut requests: RequestStream| {
                let f = Arc::clone(&f);
                stream::once(async move {
                    let req: Req = first_request(&mut requests).await?;
                    let resp = f(res, ctx, req).await?;
                    encode(&resp)
                })
                .boxed()
            },
        );
        self.insert(method, MethodKind::Unary, handler)
    }

    /// A stream of requests, one response.
    pub fn client_stream<Req, Resp, F, Fut>(self, method: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<T>, CancellationToken, BoxStream<'static, Result<Req, RdkError>>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<Resp, RdkError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler<T> = Arc::new(
            move |res: Arc<T>, ctx: CancellationToken, requests: RequestStream| {
                let f = Arc::clone(&f);
                stream::once(async move {
                    let resp = f(res, ctx, typed_requests::<Req>(requests)).await?;
                    encode(&resp)
                })
                .boxed()
            },
        );
        self.insert(method, MethodKind::ClientStream, handler)
    }

    /// One request, a stream of responses.
    pub fn server_stream<Req, Resp, F, Fut>(self, method: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<T>, CancellationToken, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BoxStream<'static, Result<Resp, RdkError>>, RdkError>>
            + Send
            + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler<T> = Arc::new(
            move |res: Arc<T>, ctx: CancellationToken, mut requests: RequestStream| {
                let f = Arc::clone(&f);
                stream::once(async move {
                    let req: Req = first_request(&mut requests).await?;
                    let responses = f(res, ctx, req).await?;
                    Ok::<_, RdkError>(erased_responses(responses))
                })
                .try_flatten()
                .boxed()
            },
        );
        self.insert(method, MethodKind::ServerStream, handler)
    }

    /// A stream of requests, a stream of responses.
    pub fn bidi<Req, Resp, F, Fut>(self, method: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<T>, CancellationToken, BoxStream<'static, Result<Req, RdkError>>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<BoxStream<'static, Result<Resp, RdkError>>, RdkError>>
            + Send
            + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler<T> = Arc::new(
            move |res: Arc<T>, ctx: CancellationToken, requests: RequestStream| {
                let f = Arc::clone(&f);
                stream::once(async move {
                    let responses = f(res, ctx, typed_requests::<Req>(requests)).await?;
                    Ok::<_, RdkError>(erased_responses(responses))
                })
                .try_flatten()
                .boxed()
            },
        );
        self.insert(method, MethodKind::Bidi, handler)
    }
}

impl<T: ?Sized + Resource> RpcService for ApiServer<T> {
    fn api(&self) -> &Api {
        &self.api
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        self.methods.get(method).map(|m| m.kind)
    }

    fn methods(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    fn call(
        &self,
        method: &str,
        name: &str,
        ctx: CancellationToken,
        requests: RequestStream,
    ) -> Result<ResponseStream, RdkError> {
        let method = self
            .methods
            .get(method)
            .ok_or_else(|| RdkError::Unimplemented(format!("{}/{method}", self.api)))?;
        let resource = self.collection.resource(name)?;
        Ok((method.handler)(resource, ctx, requests))
    }
}
