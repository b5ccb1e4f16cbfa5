//! [`ServiceRegistry`] – per-API server and client factories.
//!
//! Component crates register, for each API they define, how to build an
//! [`ApiServer`] over that API's collection and how to build a client stub
//! for a remote resource of that API.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rdk_resource::{AnyCollection, Resource, ResourceHandle, SubtypeCollection, downcast_collection};
use rdk_types::{Api, RdkError, ResourceName};
use tracing::debug;

use crate::client::ClientConn;
use crate::service::{ApiServer, RpcService};

type ServerFactory =
    Arc<dyn Fn(Arc<dyn AnyCollection>) -> Result<Arc<dyn RpcService>, RdkError> + Send + Sync>;
type ClientFactory = Arc<dyn Fn(ClientConn, ResourceName) -> ResourceHandle + Send + Sync>;

#[derive(Default)]
pub struct ServiceRegistry {
    servers: RwLock<BTreeMap<Api, ServerFactory>>,
    clients: RwLock<BTreeMap<Api, ClientFactory>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`RdkError::DuplicateRegistration`] when `api` already has a server.
    pub fn register_server<T, F>(&self, api: Api, build: F) -> Result<(), RdkError>
    where
        T: ?Sized + Resource,
        F: Fn(Arc<SubtypeCollection<T>>) -> ApiServer<T> + Send + Sync + 'static,
    {
        let mut servers = self.servers.write();
        if servers.contains_key(&api) {
            return Err(RdkError::DuplicateRegistration {
                api: api.to_string(),
                model: "<server>".to_string(),
            });
        }
        debug!(%api, "registered api server");
        servers.insert(
            api,
            Arc::new(
                move |collection: Arc<dyn AnyCollection>| -> Result<Arc<dyn RpcService>, RdkError> {
                    let typed = downcast_collection::<T>(collection)?;
                    let server: Arc<dyn RpcService> = Arc::new(build(typed));
                    Ok(server)
                },
            ),
        );
        Ok(())
    }

    /// # Errors
    ///
    /// [`RdkError::DuplicateRegistration`] when `api` already has a client.
    pub fn register_client<F>(&self, api: Api, build: F) -> Result<(), RdkError>
    where
        F: Fn(ClientConn, ResourceName) -> ResourceHandle + Send + Sync + 'static,
    {
        let mut clients = self.clients.write();
        if clients.contains_key(&api) {
            return Err(RdkError::DuplicateRegistration {
                api: api.to_string(),
                model: "<client>".to_string(),
            });
        }
        debug!(%api, "registered api client");
        clients.insert(api, Arc::new(build));
        Ok(())
    }

    /// Build the server for the API of `collection`.
    ///
    /// # Errors
    ///
    /// [`RdkError::UnknownApi`] when no server is registered for it and
    /// [`RdkError::TypeMismatch`] when the collection holds another capability.
    pub fn server(&self, collection: Arc<dyn AnyCollection>) -> Result<Arc<dyn RpcService>, RdkError> {
        let api = collection.api().clone();
        let factory = self
            .servers
            .read()
            .get(&api)
            .cloned()
            .ok_or_else(|| RdkError::UnknownApi(api.to_string()))?;
        factory(collection)
    }

    /// Build a client stub for the remote resource `name`.
    ///
    /// # Errors
    ///
    /// [`RdkError::UnknownApi`] when no client is registered for its API.
    pub fn client(&self, conn: ClientConn, name: ResourceName) -> Result<ResourceHandle, RdkError> {
        let factory = self
            .clients
            .read()
            .get(&name.api)
            .cloned()
            .ok_or_else(|| RdkError::UnknownApi(name.api.to_string()))?;
        Ok(factory(conn, name))
    }

    pub fn server_apis(&self) -> Vec<Api> {
        self.servers.read().keys().cloned().collect()
    }

    pub fn client_apis(&self) -> Vec<Api> {
        self.clients.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Lever: Resource {}

    trait Pulley: Resource {}

    fn api() -> Api {
        Api::component("lever")
    }

    #[test]
    fn server_is_built_over_matching_collection() {
        let reg = ServiceRegistry::new();
        reg.register_server::<dyn Lever, _>(api(), |coll| ApiServer::new(api(), coll))
            .unwrap();
        assert!(reg
            .register_server::<dyn Lever, _>(api(), |coll| ApiServer::new(api(), coll))
            .is_err());

        let coll: Arc<dyn AnyCollection> = Arc::new(SubtypeCollection::<dyn Lever>::new(api()));
        let server = reg.server(coll).unwrap();
        assert_eq!(server.api(), &api());
        assert!(server.methods().contains(&"DoCommand".to_string()));
    }

    #[test]
    fn wrong_capability_is_a_type_mismatch() {
        let reg = ServiceRegistry::new();
        reg.register_server::<dyn Lever, _>(api(), |coll| ApiServer::new(api(), coll))
            .unwrap();
        let coll: Arc<dyn AnyCollection> = Arc::new(SubtypeCollection::<dyn Pulley>::new(api()));
        assert!(matches!(
            reg.server(coll).err().unwrap(),
            RdkError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn unregistered_api_is_unknown() {
        let reg = ServiceRegistry::new();
        let coll: Arc<dyn AnyCollection> = Arc::new(SubtypeCollection::<dyn Lever>::new(api()));
        assert!(matches!(reg.server(coll).err().unwrap(), RdkError::UnknownApi(_)));
    }
}
