//! Encoder API (`rdk:component:encoder`).
//!
//! An encoder reports how far a shaft has turned, in ticks or degrees.

pub mod client;
pub mod fake;
pub mod server;

use std::sync::Arc;

use async_trait::async_trait;
use rdk_resource::{Dependencies, Model, Registry, Resource, Robot, resource_from_robot};
use rdk_rpc::ServiceRegistry;
use rdk_types::{Api, Extra, RdkError, ResourceName};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub const SUBTYPE: &str = "encoder";

pub fn api() -> Api {
    Api::component(SUBTYPE)
}

/// Typed resource name of the encoder called `name`.
pub fn named(name: &str) -> ResourceName {
    ResourceName::new(api(), name)
}

/// Unit a position is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    /// Let the encoder pick its native unit.
    #[default]
    Unspecified,
    Ticks,
    Degrees,
}

/// Optional features an encoder supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Properties {
    pub ticks_count_supported: bool,
    pub angle_degrees_supported: bool,
}

#[async_trait]
pub trait Encoder: Resource {
    /// Current position and the unit it is expressed in.
    async fn get_position(
        &self,
        ctx: &CancellationToken,
        position_type: PositionType,
        extra: &Extra,
    ) -> Result<(f64, PositionType), RdkError>;

    /// Make the current position the new zero.
    async fn reset_position(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(), RdkError>;

    async fn get_properties(&self, ctx: &CancellationToken, extra: &Extra) -> Result<Properties, RdkError>;
}

/// The encoder `name` among a constructor's dependencies.
pub fn from_dependencies(deps: &Dependencies, name: &str) -> Result<Arc<dyn Encoder>, RdkError> {
    deps.get_named::<dyn Encoder>(&api(), name)
}

/// The encoder `name` served by `robot`.
pub fn from_robot(robot: &dyn Robot, name: &str) -> Result<Arc<dyn Encoder>, RdkError> {
    resource_from_robot::<dyn Encoder>(robot, &named(name))
}

/// Register the API, its RPC server and client, and the `fake` model.
pub fn register(registry: &Registry, services: &ServiceRegistry) -> Result<(), RdkError> {
    registry.register_api::<dyn Encoder>(api())?;
    services.register_server::<dyn Encoder, _>(api(), server::new_server)?;
    services.register_client(api(), client::new_client)?;
    registry.register(api(), Model::builtin("fake"), fake::registration())
}
