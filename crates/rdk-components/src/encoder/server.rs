//! RPC method table of the encoder API.

use std::sync::Arc;

use rdk_resource::SubtypeCollection;
use rdk_rpc::ApiServer;
use rdk_types::{Extra, RdkError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{Encoder, PositionType, Properties, api};
use crate::ExtraRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPositionRequest {
    #[serde(default)]
    pub position_type: PositionType,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPositionResponse {
    pub value: f64,
    pub position_type: PositionType,
}

pub fn new_server(coll: Arc<SubtypeCollection<dyn Encoder>>) -> ApiServer<dyn Encoder> {
    ApiServer::new(api(), coll)
        .unary("GetPosition", get_position)
        .unary("ResetPosition", reset_position)
        .unary("GetProperties", get_properties)
}

async fn get_position(
    enc: Arc<dyn Encoder>,
    ctx: CancellationToken,
    req: GetPositionRequest,
) -> Result<GetPositionResponse, RdkError> {
    let (value, position_type) = enc.get_position(&ctx, req.position_type, &req.extra).await?;
    Ok(GetPositionResponse { value, position_type })
}

async fn reset_position(enc: Arc<dyn Encoder>, ctx: CancellationToken, req: ExtraRequest) -> Result<(), RdkError> {
    enc.reset_position(&ctx, &req.extra).await
}

async fn get_properties(
    enc: Arc<dyn Encoder>,
    ctx: CancellationToken,
    req: ExtraRequest,
) -> Result<Properties, RdkError> {
    enc.get_properties(&ctx, &req.extra).await
}
