//! Gizmo API (`acme:component:gizmo`).
//!
//! A third-party style API that uses every call shape the transport offers:
//! unary, client streaming, server streaming and bidirectional streaming.

pub mod client;
pub mod mygizmo;
pub mod server;

use std::sync::Arc;

use async_trait::async_trait;
use rdk_resource::{Dependencies, Model, Registry, Resource, Robot, resource_from_robot};
use rdk_rpc::ServiceRegistry;
use rdk_types::{Api, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

pub fn api() -> Api {
    Api::new("acme", "component", "gizmo")
}

pub fn named(name: &str) -> ResourceName {
    ResourceName::new(api(), name)
}

/// Model of the demo implementation.
pub fn my_gizmo_model() -> Model {
    Model::new("acme", "demo", "mygizmo")
}

#[async_trait]
pub trait Gizmo: Resource {
    async fn do_one(&self, ctx: &CancellationToken, arg1: &str) -> Result<bool, RdkError>;

    async fn do_one_client_stream(&self, ctx: &CancellationToken, arg1: Vec<String>) -> Result<bool, RdkError>;

    async fn do_one_server_stream(&self, ctx: &CancellationToken, arg1: &str) -> Result<Vec<bool>, RdkError>;

    async fn do_one_bidi_stream(&self, ctx: &CancellationToken, arg1: Vec<String>) -> Result<Vec<bool>, RdkError>;

    async fn do_two(&self, ctx: &CancellationToken, arg1: bool) -> Result<String, RdkError>;
}

pub fn from_dependencies(deps: &Dependencies, name: &str) -> Result<Arc<dyn Gizmo>, RdkError> {
    deps.get_named::<dyn Gizmo>(&api(), name)
}

pub fn from_robot(robot: &dyn Robot, name: &str) -> Result<Arc<dyn Gizmo>, RdkError> {
    resource_from_robot::<dyn Gizmo>(robot, &named(name))
}

pub fn register(registry: &Registry, services: &ServiceRegistry) -> Result<(), RdkError> {
    registry.register_api::<dyn Gizmo>(api())?;
    services.register_server::<dyn Gizmo, _>(api(), server::new_server)?;
    services.register_client(api(), client::new_client)?;
    registry.register(api(), my_gizmo_model(), mygizmo::registration())
}
