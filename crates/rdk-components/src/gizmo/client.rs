//! Client stub for a gizmo on another robot.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{TryStreamExt, stream};
use rdk_resource::{Resource, ResourceHandle};
use rdk_rpc::{ClientConn, method_path};
use rdk_types::{Command, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

use super::server::{BoolArg, BoolRet, StringArg, StringRet};
use super::{Gizmo, api};

pub struct GizmoClient {
    conn: ClientConn,
    name: ResourceName,
    remote_name: String,
}

impl GizmoClient {
    pub fn new(conn: ClientConn, name: ResourceName) -> Self {
        let remote_name = name.pop_remote().short_name();
        Self {
            conn,
            name,
            remote_name,
        }
    }

    fn method(method: &str) -> String {
        method_path(&api(), method)
    }
}

pub fn new_client(conn: ClientConn, name: ResourceName) -> ResourceHandle {
    ResourceHandle::new::<dyn Gizmo>(Arc::new(GizmoClient::new(conn, name)))
}

fn args(arg1: Vec<String>) -> impl futures_util::Stream<Item = StringArg> + Send + 'static {
    stream::iter(arg1.into_iter().map(|arg1| StringArg { arg1 }))
}

#[async_trait]
impl Resource for GizmoClient {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        self.conn
            .unary(ctx, &Self::method("DoCommand"), &self.remote_name, &cmd)
            .await
    }
}

#[async_trait]
impl Gizmo for GizmoClient {
    async fn do_one(&self, ctx: &CancellationToken, arg1: &str) -> Result<bool, RdkError> {
        let req = StringArg { arg1: arg1.to_string() };
        let resp: BoolRet = self
            .conn
            .unary(ctx, &Self::method("DoOne"), &self.remote_name, &req)
            .await?;
        Ok(resp.ret1)
    }

    async fn do_one_client_stream(&self, ctx: &CancellationToken, arg1: Vec<String>) -> Result<bool, RdkError> {
        let resp: BoolRet = self
            .conn
            .client_stream(ctx, &Self::method("DoOneClientStream"), &self.remote_name, args(arg1))
            .await?;
        Ok(resp.ret1)
    }

    async fn do_one_server_stream(&self, ctx: &CancellationToken, arg1: &str) -> Result<Vec<bool>, RdkError> {
        let req = StringArg { arg1: arg1.to_string() };
        let responses = self
            .conn
            .server_stream::<StringArg, BoolRet>(ctx, &Self::method("DoOneServerStream"), &self.remote_name, &req)
            .await?;
        responses.map_ok(|resp| resp.ret1).try_collect().await
    }

    async fn do_one_bidi_stream(&self, ctx: &CancellationToken, arg1: Vec<String>) -> Result<Vec<bool>, RdkError> {
        let responses = self
            .conn
            .bidi::<StringArg, BoolRet, _>(ctx, &Self::method("DoOneBiDiStream"), &self.remote_name, args(arg1))
            .await?;
        responses.map_ok(|resp| resp.ret1).try_collect().await
    }

    async fn do_two(&self, ctx: &CancellationToken, arg1: bool) -> Result<String, RdkError> {
        let resp: StringRet = self
            .conn
            .unary(ctx, &Self::method("DoTwo"), &self.remote_name, &BoolArg { arg1 })
            .await?;
        Ok(resp.ret1)
    }
}
