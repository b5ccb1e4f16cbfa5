//! [`LocalRobot`] – the live resource graph of one robot.
//!
//! Startup runs in four passes:
//!
//! 1. mount every remote robot's resources as client stubs;
//! 2. validate every resource config;
//! 3. order the configs dependencies-first, failing on any cycle;
//! 4. resolve, build and publish each resource in that order.
//!
//! Without `partial_start` the first failure closes whatever was built and
//! aborts.  With it, a failed resource is left out and logged, and anything
//! depending on it fails to resolve and is left out as well.  A cycle is
//! fatal either way, since no order exists to build it in.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use rdk_resource::{
    AnyCollection, DependencyGraph, Registry, Resolver, ResourceConfig, ResourceHandle, Robot,
    resolve_dependency_name, resource_from_robot,
};
use rdk_rpc::{ClientConn, DialOptions, RpcServer, ServiceRegistry, dial};
use rdk_types::{Api, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{RemoteConfig, RobotConfig};
use crate::service::{RobotService, fetch_resource_names};

#[derive(Default)]
struct State {
    handles: HashMap<ResourceName, ResourceHandle>,
    /// Validated config and declared dependencies of every local resource.
    configs: HashMap<ResourceName, (ResourceConfig, Vec<String>)>,
    /// Resolved dependencies of every local resource.
    deps_of: HashMap<ResourceName, Vec<ResourceName>>,
    remotes: Vec<ClientConn>,
    /// Resources and remotes left out by a partial start.
    failures: Vec<(String, RdkError)>,
}

impl State {
    fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in self.handles.keys() {
            graph.add_node(name.clone());
        }
        for (name, deps) in &self.deps_of {
            for dep in deps {
                graph.add_edge(name.clone(), dep.clone());
            }
        }
        graph
    }

    /// Dependencies-first order of everything live.
    fn build_order(&self) -> Vec<ResourceName> {
        self.graph().topological_order().unwrap_or_else(|_| {
            let mut names: Vec<ResourceName> = self.handles.keys().cloned().collect();
            names.sort();
            names
        })
    }
}

/// A robot assembled from a [`RobotConfig`].
pub struct LocalRobot {
    registry: Arc<Registry>,
    services: Arc<ServiceRegistry>,
    collections: Arc<BTreeMap<Api, Arc<dyn AnyCollection>>>,
    state: RwLock<State>,
}

impl LocalRobot {
    /// Build every resource of `config`.
    ///
    /// # Errors
    ///
    /// The first validation, resolution or construction error when
    /// `partial_start` is off, and [`RdkError::DependencyCycle`] regardless of
    /// it.  Resources built before the failure are closed.
    #[instrument(
        name = "robot.start",
        skip_all,
        fields(components = config.components.len(), remotes = config.remotes.len())
    )]
    pub async fn new(
        ctx: &CancellationToken,
        registry: Arc<Registry>,
        services: Arc<ServiceRegistry>,
        config: &RobotConfig,
    ) -> Result<Self, RdkError> {
        config.validate_shape()?;

        let mut collections: BTreeMap<Api, Arc<dyn AnyCollection>> = BTreeMap::new();
        for api in registry.apis() {
            let collection = registry.lookup_api(&api)?.new_collection();
            collections.insert(api, collection);
        }

        let robot = Self {
            registry,
            services,
            collections: Arc::new(collections),
            state: RwLock::new(State::default()),
        };
        if let Err(e) = robot.start(ctx, config).await {
            warn!(error = %e, "robot failed to start");
            robot.close().await;
            return Err(e);
        }
        info!(resources = robot.state.read().handles.len(), "robot started");
        Ok(robot)
    }

    async fn start(&self, ctx: &CancellationToken, config: &RobotConfig) -> Result<(), RdkError> {
        let partial = config.partial_start;

        for remote in &config.remotes {
            if let Err(e) = self.mount_remote(ctx, remote).await {
                self.left_out(partial, format!("remote {}", remote.name), e)?;
            }
        }

        let resolver = Resolver::new(&self.registry);
        let mut pending: BTreeMap<ResourceName, (ResourceConfig, Vec<String>)> = BTreeMap::new();
        for conf in config.resources() {
            let mut conf = conf.clone();
            match resolver.validate(&mut conf) {
                Ok(declared) => {
                    pending.insert(conf.resource_name(), (conf, declared));
                }
                Err(e) => self.left_out(partial, conf.resource_name().to_string(), e)?,
            }
        }

        let known: Vec<ResourceName> = pending
            .keys()
            .cloned()
            .chain(self.state.read().handles.keys().cloned())
            .collect();
        let mut graph = DependencyGraph::new();
        let mut unresolved: HashMap<ResourceName, RdkError> = HashMap::new();
        for (name, (_, declared)) in &pending {
            graph.add_node(name.clone());
            for dep in declared {
                match resolve_dependency_name(name, dep, known.iter()) {
                    Ok(target) if pending.contains_key(&target) => graph.add_edge(name.clone(), target),
                    Ok(_) => {}
                    Err(e) => {
                        unresolved.entry(name.clone()).or_insert(e);
                    }
                }
            }
        }
        let order = graph.topological_order()?;
        debug!(order = ?order.iter().map(ToString::to_string).collect::<Vec<_>>(), "build order");

        for name in order {
            let Some((conf, declared)) = pending.remove(&name) else {
                continue;
            };
            let result = match unresolved.remove(&name) {
                Some(e) => Err(e),
                None => self.build_one(&resolver, conf, declared).await,
            };
            if let Err(e) = result {
                self.left_out(partial, name.to_string(), e)?;
            }
        }
        Ok(())
    }

    /// Record a startup failure, or return it when partial start is off.
    fn left_out(&self, partial: bool, what: String, err: RdkError) -> Result<(), RdkError> {
        if !partial {
            return Err(err);
        }
        warn!(resource = %what, error = %err, "left out of partial start");
        self.state.write().failures.push((what, err));
        Ok(())
    }

    #[instrument(skip_all, fields(remote = %remote.name, address = %remote.address))]
    async fn mount_remote(&self, ctx: &CancellationToken, remote: &RemoteConfig) -> Result<(), RdkError> {
        let conn = dial(ctx, &remote.address, DialOptions::default()).await?;
        self.state.write().remotes.push(conn.clone());
        let names = fetch_resource_names(ctx, &conn).await?;

        let client_apis = self.services.client_apis();
        let mut mounted = 0usize;
        for name in names {
            if !client_apis.contains(&name.api) {
                debug!(remote = %remote.name, resource = %name, "no client for api, skipping");
                continue;
            }
            let handle = self.services.client(conn.clone(), name.prepend_remote(&remote.name))?;
            self.publish(&handle)?;
            self.state.write().handles.insert(handle.name().clone(), handle);
            mounted += 1;
        }
        info!(remote = %remote.name, address = %remote.address, resources = mounted, "mounted remote");
        Ok(())
    }

    #[instrument(skip_all, fields(resource = %conf.resource_name()))]
    async fn build_one(
        &self,
        resolver: &Resolver<'_>,
        conf: ResourceConfig,
        declared: Vec<String>,
    ) -> Result<(), RdkError> {
        let name = conf.resource_name();
        let (handle, resolved) = {
            let state = self.state.read();
            if state.handles.contains_key(&name) {
                return Err(RdkError::DuplicateResource(name.to_string()));
            }
            let deps = resolver.resolve(&name, &declared, &state.handles)?;
            let handle = resolver.build(&conf, &deps)?;
            (handle, deps.names().cloned().collect::<Vec<_>>())
        };
        if let Err(e) = self.publish(&handle) {
            close_logged(&handle).await;
            return Err(e);
        }

        let mut state = self.state.write();
        state.handles.insert(name.clone(), handle);
        state.configs.insert(name.clone(), (conf, declared));
        state.deps_of.insert(name, resolved);
        Ok(())
    }

    /// Make `handle` reachable through its API's collection.
    fn publish(&self, handle: &ResourceHandle) -> Result<(), RdkError> {
        let collection = self
            .collections
            .get(handle.api())
            .ok_or_else(|| RdkError::UnknownApi(handle.api().to_string()))?;
        collection.insert_handle(handle)
    }

    /// Swap `rebuilt` into its collection in one step.
    fn republish(&self, state: &State, rebuilt: &ResourceHandle) -> Result<(), RdkError> {
        let api = rebuilt.api();
        let collection = self
            .collections
            .get(api)
            .ok_or_else(|| RdkError::UnknownApi(api.to_string()))?;
        let handles: Vec<ResourceHandle> = state
            .handles
            .values()
            .filter(|h| h.api() == api && h.name() != rebuilt.name())
            .cloned()
            .chain(std::iter::once(rebuilt.clone()))
            .collect();
        collection.replace_all_handles(handles)
    }

    /// Apply a new config to one resource.
    ///
    /// The resource first gets a chance to reconfigure in place.  When it
    /// answers [`RdkError::MustRebuild`] a replacement is built, published and
    /// the old instance closed; resources depending on it are then handed the
    /// replacement the same way.  A name not yet in the robot is built fresh.
    ///
    /// # Errors
    ///
    /// Validation, resolution and construction errors of `conf` itself.  On
    /// error the resource keeps running on its previous config.
    pub async fn reconfigure_resource(&self, conf: ResourceConfig) -> Result<(), RdkError> {
        let resolver = Resolver::new(&self.registry);
        let mut conf = conf;
        let declared = resolver.validate(&mut conf)?;
        let name = conf.resource_name();

        if !self.state.read().configs.contains_key(&name) {
            if self.state.read().handles.contains_key(&name) {
                return Err(RdkError::DuplicateResource(name.to_string()));
            }
            self.build_one(&resolver, conf, declared).await?;
            info!(resource = %name, "added resource");
            return Ok(());
        }

        let mut retired = Vec::new();
        let result = self.apply_config(&resolver, conf, declared, &mut retired);
        if result.is_ok() && !retired.is_empty() {
            for dependent in self.dependents_in_order(&name) {
                let Some((dconf, ddeclared)) = self.config_of(&dependent) else {
                    continue;
                };
                if let Err(e) = self.apply_config(&resolver, dconf, ddeclared, &mut retired) {
                    warn!(resource = %dependent, dependency = %name, error = %e, "dependent kept its previous instance");
                }
            }
        }
        for handle in retired {
            close_logged(&handle).await;
        }
        result
    }

    fn config_of(&self, name: &ResourceName) -> Option<(ResourceConfig, Vec<String>)> {
        self.state.read().configs.get(name).cloned()
    }

    fn dependents_in_order(&self, name: &ResourceName) -> Vec<ResourceName> {
        let state = self.state.read();
        let dependents: BTreeSet<ResourceName> = state.graph().dependents_of(name);
        state
            .build_order()
            .into_iter()
            .filter(|n| dependents.contains(n))
            .collect()
    }

    /// Reconfigure or rebuild one live resource.  Replaced instances are
    /// pushed onto `retired` for the caller to close.
    fn apply_config(
        &self,
        resolver: &Resolver<'_>,
        conf: ResourceConfig,
        declared: Vec<String>,
        retired: &mut Vec<ResourceHandle>,
    ) -> Result<(), RdkError> {
        let name = conf.resource_name();
        let mut state = self.state.write();
        let (previous, handle) = match (state.configs.get(&name), state.handles.get(&name)) {
            (Some((previous, _)), Some(handle)) => (previous.clone(), handle.clone()),
            _ => return Err(RdkError::NotFound(name.to_string())),
        };

        let deps = resolver.resolve(&name, &declared, &state.handles)?;
        let dependents = state.graph().dependents_of(&name);
        if let Some(back) = deps.names().find(|d| **d == name || dependents.contains(*d)) {
            return Err(RdkError::DependencyCycle(vec![
                name.to_string(),
                back.to_string(),
                name.to_string(),
            ]));
        }
        let resolved: Vec<ResourceName> = deps.names().cloned().collect();

        match resolver.reconfigure(&handle, &previous, &deps, &conf) {
            Ok(()) => {}
            Err(RdkError::MustRebuild(_)) => {
                let rebuilt = resolver.build(&conf, &deps)?;
                if let Err(e) = self.republish(&state, &rebuilt) {
                    retired.push(rebuilt);
                    return Err(e);
                }
                state.handles.insert(name.clone(), rebuilt);
                retired.push(handle);
                info!(resource = %name, "rebuilt resource");
            }
            Err(e) => return Err(e),
        }
        state.configs.insert(name.clone(), (conf, declared));
        state.deps_of.insert(name, resolved);
        Ok(())
    }

    /// Close and drop one local resource.
    ///
    /// # Errors
    ///
    /// [`RdkError::NotFound`] for unknown names and
    /// [`RdkError::InvalidArgument`] while other resources still depend on it.
    pub async fn remove_resource(&self, name: &ResourceName) -> Result<(), RdkError> {
        let handle = {
            let mut state = self.state.write();
            if !state.handles.contains_key(name) {
                return Err(RdkError::NotFound(name.to_string()));
            }
            let dependents = state.graph().dependents_of(name);
            if !dependents.is_empty() {
                let names: Vec<String> = dependents.iter().map(ToString::to_string).collect();
                return Err(RdkError::InvalidArgument(format!(
                    "{name} is still needed by {}",
                    names.join(", ")
                )));
            }
            state.configs.remove(name);
            state.deps_of.remove(name);
            state.handles.remove(name)
        };
        if let Some(collection) = self.collections.get(&name.api) {
            collection.remove(name);
        }
        if let Some(handle) = handle {
            close_logged(&handle).await;
        }
        info!(resource = %name, "removed resource");
        Ok(())
    }

    /// Look a resource up as capability `T`.
    ///
    /// # Errors
    ///
    /// [`RdkError::NotFound`] when absent and [`RdkError::TypeMismatch`] when
    /// present without capability `T`.
    pub fn resource<T: ?Sized + 'static>(&self, name: &ResourceName) -> Result<Arc<T>, RdkError> {
        resource_from_robot::<T>(self, name)
    }

    pub fn collection(&self, api: &Api) -> Option<Arc<dyn AnyCollection>> {
        self.collections.get(api).cloned()
    }

    /// What a partial start left out, and why.
    pub fn start_failures(&self) -> Vec<(String, RdkError)> {
        self.state.read().failures.clone()
    }

    /// An RPC server exposing every API that has a registered server, plus
    /// the robot service.
    ///
    /// The server reads the live collections, so later reconfiguration is
    /// visible to it.
    pub fn rpc_server(&self) -> Result<RpcServer, RdkError> {
        let server_apis = self.services.server_apis();
        let mut server = RpcServer::new();
        for (api, collection) in self.collections.iter() {
            if !server_apis.contains(api) {
                debug!(%api, "no server registered for api");
                continue;
            }
            server.add_service(self.services.server(Arc::clone(collection))?)?;
        }
        server.add_service(Arc::new(RobotService::new(Arc::clone(&self.collections))))?;
        Ok(server)
    }

    /// Close every resource, dependents before their dependencies, and drop
    /// remote connections.  Close failures are logged, not returned.
    #[instrument(name = "robot.close", skip_all)]
    pub async fn close(&self) {
        let (handles, remotes) = {
            let mut state = self.state.write();
            let order = state.build_order();
            let handles: Vec<ResourceHandle> = order
                .iter()
                .rev()
                .filter_map(|name| state.handles.remove(name))
                .collect();
            state.configs.clear();
            state.deps_of.clear();
            (handles, std::mem::take(&mut state.remotes))
        };
        for collection in self.collections.values() {
            if let Err(e) = collection.replace_all_handles(Vec::new()) {
                warn!(api = %collection.api(), error = %e, "could not clear collection");
            }
        }
        for handle in &handles {
            close_logged(handle).await;
        }
        for conn in remotes {
            conn.close();
        }
        debug!(closed = handles.len(), "robot closed");
    }
}

impl Robot for LocalRobot {
    fn resource_names(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self.state.read().handles.keys().cloned().collect();
        names.sort();
        names
    }

    fn resource_by_name(&self, name: &ResourceName) -> Result<ResourceHandle, RdkError> {
        self.state
            .read()
            .handles
            .get(name)
            .cloned()
            .ok_or_else(|| RdkError::NotFound(name.to_string()))
    }
}

async fn close_logged(handle: &ResourceHandle) {
    match handle.resource().close().await {
        Ok(()) => debug!(resource = %handle.name(), "closed"),
        Err(e) => warn!(resource = %handle.name(), error = %e, "close failed"),
    }
}
