//! Client stub for a motor on another robot.

use std::sync::Arc;

use async_trait::async_trait;
use rdk_resource::{Resource, ResourceHandle};
use rdk_rpc::{ClientConn, method_path};
use rdk_types::{Command, Extra, RdkError, ResourceName};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::server::{
    GetPositionResponse, GoForRequest, GoToRequest, IsMovingResponse, IsPoweredResponse,
    ResetZeroPositionRequest, SetPowerRequest,
};
use super::{Motor, Properties, api};
use crate::ExtraRequest;

pub struct MotorClient {
    conn: ClientConn,
    name: ResourceName,
    remote_name: String,
}

impl MotorClient {
    pub fn new(conn: ClientConn, name: ResourceName) -> Self {
        let remote_name = name.pop_remote().short_name();
        Self {
            conn,
            name,
            remote_name,
        }
    }

    async fn call<Req, Resp>(&self, ctx: &CancellationToken, method: &str, req: &Req) -> Result<Resp, RdkError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.conn
            .unary(ctx, &method_path(&api(), method), &self.remote_name, req)
            .await
    }
}

pub fn new_client(conn: ClientConn, name: ResourceName) -> ResourceHandle {
    ResourceHandle::new::<dyn Motor>(Arc::new(MotorClient::new(conn, name)))
}

fn extra_only(extra: &Extra) -> ExtraRequest {
    ExtraRequest { extra: extra.clone() }
}

#[async_trait]
impl Resource for MotorClient {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        self.call(ctx, "DoCommand", &cmd).await
    }
}

#[async_trait]
impl Motor for MotorClient {
    async fn set_power(&self, ctx: &CancellationToken, power_pct: f64, extra: &Extra) -> Result<(), RdkError> {
        let req = SetPowerRequest {
            power_pct,
            extra: extra.clone(),
        };
        self.call(ctx, "SetPower", &req).await
    }

    async fn go_for(
        &self,
        ctx: &CancellationToken,
        rpm: f64,
        revolutions: f64,
        extra: &Extra,
    ) -> Result<(), RdkError> {
        let req = GoForRequest {
            rpm,
            revolutions,
            extra: extra.clone(),
        };
        self.call(ctx, "GoFor", &req).await
    }

    async fn go_to(
        &self,
        ctx: &CancellationToken,
        rpm: f64,
        position_revolutions: f64,
        extra: &Extra,
    ) -> Result<(), RdkError> {
        let req = GoToRequest {
            rpm,
            position_revolutions,
            extra: extra.clone(),
        };
        self.call(ctx, "GoTo", &req).await
    }

    async fn reset_zero_position(&self, ctx: &CancellationToken, offset: f64, extra: &Extra) -> Result<(), RdkError> {
        let req = ResetZeroPositionRequest {
            offset,
            extra: extra.clone(),
        };
        self.call(ctx, "ResetZeroPosition", &req).await
    }

    async fn position(&self, ctx: &CancellationToken, extra: &Extra) -> Result<f64, RdkError> {
        let resp: GetPositionResponse = self.call(ctx, "GetPosition", &extra_only(extra)).await?;
        Ok(resp.position)
    }

    async fn properties(&self, ctx: &CancellationToken, extra: &Extra) -> Result<Properties, RdkError> {
        self.call(ctx, "GetProperties", &extra_only(extra)).await
    }

    async fn stop(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(), RdkError> {
        self.call(ctx, "Stop", &extra_only(extra)).await
    }

    async fn is_powered(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(bool, f64), RdkError> {
        let resp: IsPoweredResponse = self.call(ctx, "IsPowered", &extra_only(extra)).await?;
        Ok((resp.is_on, resp.power_pct))
    }

    async fn is_moving(&self, ctx: &CancellationToken) -> Result<bool, RdkError> {
        let resp: IsMovingResponse = self.call(ctx, "IsMoving", &extra_only(&Extra::new())).await?;
        Ok(resp.is_moving)
    }
}
