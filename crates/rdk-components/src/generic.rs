//! Generic API (`rdk:component:generic`): `DoCommand` and nothing else.

use std::sync::Arc;

use async_trait::async_trait;
use rdk_resource::{
    Dependencies, Model, Registration, Registry, Resource, ResourceConfig, ResourceHandle,
    SubtypeCollection,
};
use rdk_rpc::{ApiServer, ClientConn, ServiceRegistry, method_path};
use rdk_types::{Api, Command, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

pub const SUBTYPE: &str = "generic";

pub fn api() -> Api {
    Api::component(SUBTYPE)
}

pub fn named(name: &str) -> ResourceName {
    ResourceName::new(api(), name)
}

/// A component reachable only through [`Resource::do_command`].
pub trait Generic: Resource {}

pub fn new_server(coll: Arc<SubtypeCollection<dyn Generic>>) -> ApiServer<dyn Generic> {
    ApiServer::new(api(), coll)
}

pub struct GenericClient {
    conn: ClientConn,
    name: ResourceName,
    remote_name: String,
}

impl GenericClient {
    pub fn new(conn: ClientConn, name: ResourceName) -> Self {
        let remote_name = name.pop_remote().short_name();
        Self {
            conn,
            name,
            remote_name,
        }
    }
}

#[async_trait]
impl Resource for GenericClient {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        self.conn
            .unary(ctx, &method_path(&api(), "DoCommand"), &self.remote_name, &cmd)
            .await
    }
}

impl Generic for GenericClient {}

/// The `fake` generic: answers every command with the command itself.
pub struct EchoGeneric {
    name: ResourceName,
}

#[async_trait]
impl Resource for EchoGeneric {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    fn reconfigure(&self, _deps: &Dependencies, _config: &ResourceConfig) -> Result<(), RdkError> {
        Ok(())
    }

    async fn do_command(&self, _ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        Ok(cmd)
    }
}

impl Generic for EchoGeneric {}

pub fn register(registry: &Registry, services: &ServiceRegistry) -> Result<(), RdkError> {
    registry.register_api::<dyn Generic>(api())?;
    services.register_server::<dyn Generic, _>(api(), new_server)?;
    services.register_client(api(), |conn, name| {
        ResourceHandle::new::<dyn Generic>(Arc::new(GenericClient::new(conn, name)))
    })?;
    registry.register(
        api(),
        Model::builtin("fake"),
        Registration::new(|_deps: &Dependencies, conf: &ResourceConfig| {
            let echo = EchoGeneric {
                name: conf.resource_name(),
            };
            Ok(ResourceHandle::new::<dyn Generic>(Arc::new(echo)))
        }),
    )
}
