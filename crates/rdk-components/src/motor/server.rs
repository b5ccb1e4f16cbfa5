//! RPC method table of the motor API.

use std::sync::Arc;

use rdk_resource::SubtypeCollection;
use rdk_rpc::ApiServer;
use rdk_types::{Extra, RdkError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{Motor, Properties, api};
use crate::ExtraRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPowerRequest {
    pub power_pct: f64,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoForRequest {
    pub rpm: f64,
    pub revolutions: f64,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoToRequest {
    pub rpm: f64,
    pub position_revolutions: f64,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetZeroPositionRequest {
    pub offset: f64,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPositionResponse {
    pub position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsPoweredResponse {
    pub is_on: bool,
    pub power_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsMovingResponse {
    pub is_moving: bool,
}

pub fn new_server(coll: Arc<SubtypeCollection<dyn Motor>>) -> ApiServer<dyn Motor> {
    ApiServer::new(api(), coll)
        .unary("SetPower", set_power)
        .unary("GoFor", go_for)
        .unary("GoTo", go_to)
        .unary("ResetZeroPosition", reset_zero_position)
        .unary("GetPosition", get_position)
        .unary("GetProperties", get_properties)
        .unary("Stop", stop)
        .unary("IsPowered", is_powered)
        .unary("IsMoving", is_moving)
}

async fn set_power(m: Arc<dyn Motor>, ctx: CancellationToken, req: SetPowerRequest) -> Result<(), RdkError> {
    m.set_power(&ctx, req.power_pct, &req.extra).await
}

async fn go_for(m: Arc<dyn Motor>, ctx: CancellationToken, req: GoForRequest) -> Result<(), RdkError> {
    m.go_for(&ctx, req.rpm, req.revolutions, &req.extra).await
}

async fn go_to(m: Arc<dyn Motor>, ctx: CancellationToken, req: GoToRequest) -> Result<(), RdkError> {
    m.go_to(&ctx, req.rpm, req.position_revolutions, &req.extra).await
}

async fn reset_zero_position(
    m: Arc<dyn Motor>,
    ctx: CancellationToken,
    req: ResetZeroPositionRequest,
) -> Result<(), RdkError> {
    m.reset_zero_position(&ctx, req.offset, &req.extra).await
}

async fn get_position(
    m: Arc<dyn Motor>,
    ctx: CancellationToken,
    req: ExtraRequest,
) -> Result<GetPositionResponse, RdkError> {
    let position = m.position(&ctx, &req.extra).await?;
    Ok(GetPositionResponse { position })
}

async fn get_properties(m: Arc<dyn Motor>, ctx: CancellationToken, req: ExtraRequest) -> Result<Properties, RdkError> {
    m.properties(&ctx, &req.extra).await
}

async fn stop(m: Arc<dyn Motor>, ctx: CancellationToken, req: ExtraRequest) -> Result<(), RdkError> {
    m.stop(&ctx, &req.extra).await
}

async fn is_powered(
    m: Arc<dyn Motor>,
    ctx: CancellationToken,
    req: ExtraRequest,
) -> Result<IsPoweredResponse, RdkError> {
    let (is_on, power_pct) = m.is_powered(&ctx, &req.extra).await?;
    Ok(IsPoweredResponse { is_on, power_pct })
}

async fn is_moving(m: Arc<dyn Motor>, ctx: CancellationToken, _req: ExtraRequest) -> Result<IsMovingResponse, RdkError> {
    let is_moving = m.is_moving(&ctx).await?;
    Ok(IsMovingResponse { is_moving })
}
