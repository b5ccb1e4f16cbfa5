//! Motor API (`rdk:component:motor`).
//!
//! `go_for` and `go_to` are long-running: implementations arbitrate them with
//! an [`OperationManager`](rdk_operation::OperationManager) so the newest
//! command always preempts the one in flight.

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

pub const SUBTYPE: &str = "motor";

pub fn api() -> Api {
    Api::component(SUBTYPE)
}

pub fn named(name: &str) -> ResourceName {
    ResourceName::new(api(), name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Properties {
    pub position_reporting: bool,
}

/// Error returned when asked to move at zero RPM.
pub fn zero_rpm_error() -> RdkError {
    RdkError::InvalidArgument("cannot move motor at 0 RPM".to_string())
}

#[async_trait]
pub trait Motor: Resource {
    /// Set the power as a fraction in `[-1, 1]`.
    async fn set_power(&self, ctx: &CancellationToken, power_pct: f64, extra: &Extra) -> Result<(), RdkError>;

    /// Turn `revolutions` at `rpm`.  A negative value of either reverses the
    /// direction; both negative go forward.  Zero revolutions runs until
    /// stopped.
    async fn go_for(&self, ctx: &CancellationToken, rpm: f64, revolutions: f64, extra: &Extra)
    -> Result<(), RdkError>;

    /// Turn to `position_revolutions` from home at `rpm`.
    async fn go_to(
        &self,
        ctx: &CancellationToken,
        rpm: f64,
        position_revolutions: f64,
        extra: &Extra,
    ) -> Result<(), RdkError>;

    /// Make the current position `offset` revolutions from home.
    async fn reset_zero_position(&self, ctx: &CancellationToken, offset: f64, extra: &Extra) -> Result<(), RdkError>;

    /// Position in revolutions from home.
    async fn position(&self, ctx: &CancellationToken, extra: &Extra) -> Result<f64, RdkError>;

    async fn properties(&self, ctx: &CancellationToken, extra: &Extra) -> Result<Properties, RdkError>;

    async fn stop(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(), RdkError>;

    /// Whether the motor is on, and its power level.
    async fn is_powered(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(bool, f64), RdkError>;

    async fn is_moving(&self, ctx: &CancellationToken) -> Result<bool, RdkError>;
}

pub fn from_dependencies(deps: &Dependencies, name: &str) -> Result<Arc<dyn Motor>, RdkError> {
    deps.get_named::<dyn Motor>(&api(), name)
}

pub fn from_robot(robot: &dyn Robot, name: &str) -> Result<Arc<dyn Motor>, RdkError> {
    resource_from_robot::<dyn Motor>(robot, &named(name))
}

pub fn register(registry: &Registry, services: &ServiceRegistry) -> Result<(), RdkError> {
    registry.register_api::<dyn Motor>(api())?;
    services.register_server::<dyn Motor, _>(api(), server::new_server)?;
    services.register_client(api(), client::new_client)?;
    registry.register(api(), Model::builtin("fake"), fake::registration())
}
