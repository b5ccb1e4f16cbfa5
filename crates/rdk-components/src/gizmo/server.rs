//! RPC method table of the gizmo API.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use rdk_resource::SubtypeCollection;
use rdk_rpc::ApiServer;
use rdk_types::RdkError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{Gizmo, api};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringArg {
    pub arg1: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoolArg {
    pub arg1: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoolRet {
    pub ret1: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringRet {
    pub ret1: String,
}

type Requests = BoxStream<'static, Result<StringArg, RdkError>>;
type Responses = BoxStream<'static, Result<BoolRet, RdkError>>;

pub fn new_server(coll: Arc<SubtypeCollection<dyn Gizmo>>) -> ApiServer<dyn Gizmo> {
    ApiServer::new(api(), coll)
        .unary("DoOne", do_one)
        .client_stream("DoOneClientStream", do_one_client_stream)
        .server_stream("DoOneServerStream", do_one_server_stream)
        .bidi("DoOneBiDiStream", do_one_bidi_stream)
        .unary("DoTwo", do_two)
}

async fn do_one(g: Arc<dyn Gizmo>, ctx: CancellationToken, req: StringArg) -> Result<BoolRet, RdkError> {
    let ret1 = g.do_one(&ctx, &req.arg1).await?;
    Ok(BoolRet { ret1 })
}

async fn collect_args(requests: Requests) -> Result<Vec<String>, RdkError> {
    requests.map_ok(|req| req.arg1).try_collect().await
}

async fn do_one_client_stream(g: Arc<dyn Gizmo>, ctx: CancellationToken, requests: Requests) -> Result<BoolRet, RdkError> {
    let args = collect_args(requests).await?;
    let ret1 = g.do_one_client_stream(&ctx, args).await?;
    Ok(BoolRet { ret1 })
}

fn bool_stream(rets: Vec<bool>) -> Responses {
    stream::iter(rets.into_iter().map(|ret1| Ok(BoolRet { ret1 }))).boxed()
}

async fn do_one_server_stream(g: Arc<dyn Gizmo>, ctx: CancellationToken, req: StringArg) -> Result<Responses, RdkError> {
    let rets = g.do_one_server_stream(&ctx, &req.arg1).await?;
    Ok(bool_stream(rets))
}

async fn do_one_bidi_stream(g: Arc<dyn Gizmo>, ctx: CancellationToken, requests: Requests) -> Result<Responses, RdkError> {
    let args = collect_args(requests).await?;
    let rets = g.do_one_bidi_stream(&ctx, args).await?;
    Ok(bool_stream(rets))
}

async fn do_two(g: Arc<dyn Gizmo>, ctx: CancellationToken, req: BoolArg) -> Result<StringRet, RdkError> {
    let ret1 = g.do_two(&ctx, req.arg1).await?;
    Ok(StringRet { ret1 })
}
