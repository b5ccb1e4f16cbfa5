//! The [`Resource`] contract and the type-erased [`ResourceHandle`].
//!
//! Every API defines a capability trait that extends [`Resource`]
//! (`trait Motor: Resource { … }`).  Models are stored and passed around as a
//! [`ResourceHandle`], which remembers the capability views the model was
//! registered with so callers can recover `Arc<dyn Motor>` later, or get a
//! [`RdkError::TypeMismatch`] when they ask for a capability it lacks.

use std::any::{Any, type_name};
use std::sync::Arc;

use async_trait::async_trait;
use rdk_types::{Api, Command, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

use crate::config::ResourceConfig;
use crate::dependencies::Dependencies;

/// The minimal capability set of every resource.
///
/// Lifecycle: constructed by a registered constructor, reconfigured in place
/// any number of times, closed once.
#[async_trait]
pub trait Resource: AsResource + Send + Sync + 'static {
    fn name(&self) -> ResourceName;

    /// Apply `config` in place.
    ///
    /// Implementations must be atomic: on `Ok` the resource runs entirely on
    /// the new config, on `Err` it keeps running on the last config that
    /// applied successfully.  The default asks the caller to rebuild.
    ///
    /// # Errors
    ///
    /// [`RdkError::MustRebuild`] when the change cannot be applied in place.
    fn reconfigure(&self, _deps: &Dependencies, _config: &ResourceConfig) -> Result<(), RdkError> {
        Err(RdkError::MustRebuild(self.name().to_string()))
    }

    /// Generic escape hatch for commands without a dedicated method.
    async fn do_command(&self, _ctx: &CancellationToken, _cmd: Command) -> Result<Command, RdkError> {
        Err(RdkError::Unimplemented("DoCommand".to_string()))
    }

    /// Release every handle the resource holds.
    async fn close(&self) -> Result<(), RdkError> {
        Ok(())
    }
}

/// Upcast from any capability trait object to `Arc<dyn Resource>`.
///
/// Implemented automatically for every sized [`Resource`].
pub trait AsResource {
    fn as_resource(self: Arc<Self>) -> Arc<dyn Resource>;
}

impl<T: Resource> AsResource for T {
    fn as_resource(self: Arc<Self>) -> Arc<dyn Resource> {
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceHandle
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct View {
    type_name: &'static str,
    // Holds an `Arc<T>` for the view's capability type `T`.
    value: Arc<dyn Any + Send + Sync>,
}

/// A live resource together with the capability views it satisfies.
///
/// Cloning a handle shares the underlying resource.
#[derive(Clone)]
pub struct ResourceHandle {
    name: ResourceName,
    resource: Arc<dyn Resource>,
    views: Vec<View>,
}

impl ResourceHandle {
    /// Wrap `typed`, recording `T` (usually `dyn SomeApi`) as its primary
    /// capability.
    pub fn new<T: ?Sized + Resource>(typed: Arc<T>) -> Self {
        let resource = Arc::clone(&typed).as_resource();
        let name = resource.name();
        Self {
            name,
            resource,
            views: vec![View {
                type_name: type_name::<T>(),
                value: Arc::new(typed),
            }],
        }
    }

    /// Expose an additional capability of the same resource.
    pub fn with_view<V: ?Sized + Send + Sync + 'static>(mut self, view: Arc<V>) -> Self {
        self.views.push(View {
            type_name: type_name::<V>(),
            value: Arc::new(view),
        });
        self
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn api(&self) -> &Api {
        &self.name.api
    }

    pub fn resource(&self) -> &Arc<dyn Resource> {
        &self.resource
    }

    /// Names of the capability types this handle can be viewed as.
    pub fn capabilities(&self) -> Vec<&'static str> {
        self.views.iter().map(|v| v.type_name).collect()
    }

    pub fn implements<T: ?Sized + 'static>(&self) -> bool {
        self.views.iter().any(|v| v.value.is::<Arc<T>>())
    }

    /// Recover the resource as capability `T`.
    ///
    /// # Errors
    ///
    /// [`RdkError::TypeMismatch`] when the resource was not registered with a
    /// `T` view.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Result<Arc<T>, RdkError> {
        self.views
            .iter()
            .find_map(|v| v.value.downcast_ref::<Arc<T>>().cloned())
            .ok_or_else(|| RdkError::TypeMismatch {
                name: self.name.to_string(),
                expected: type_name::<T>().to_string(),
            })
    }

    /// `true` when both handles wrap the very same instance.
    pub fn ptr_eq(&self, other: &ResourceHandle) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Lamp: Resource {
        fn lit(&self) -> bool;
    }

    trait Dimmer: Send + Sync {
        fn level(&self) -> u8;
    }

    trait Buzzer: Resource {}

    struct DeskLamp;

    impl Resource for DeskLamp {
        fn name(&self) -> ResourceName {
            ResourceName::new(Api::component("lamp"), "desk")
        }
    }

    impl Lamp for DeskLamp {
        fn lit(&self) -> bool {
            true
        }
    }

    impl Dimmer for DeskLamp {
        fn level(&self) -> u8 {
            7
        }
    }

    #[test]
    fn handle_downcasts_to_registered_capability() {
        let lamp = Arc::new(DeskLamp);
        let handle = ResourceHandle::new::<dyn Lamp>(lamp.clone());

        assert_eq!(handle.name().short_name(), "desk");
        assert!(handle.downcast::<dyn Lamp>().unwrap().lit());
        assert!(handle.implements::<dyn Lamp>());
    }

    #[test]
    fn handle_rejects_unregistered_capability() {
        let handle = ResourceHandle::new::<dyn Lamp>(Arc::new(DeskLamp));
        let err = handle.downcast::<dyn Buzzer>().err().unwrap();
        assert!(matches!(err, RdkError::TypeMismatch { .. }));
        assert!(err.to_string().contains("Buzzer"));
    }

    #[test]
    fn extra_views_are_reachable() {
        let lamp = Arc::new(DeskLamp);
        let handle =
            ResourceHandle::new::<dyn Lamp>(lamp.clone()).with_view::<dyn Dimmer>(lamp);
        assert_eq!(handle.downcast::<dyn Dimmer>().unwrap().level(), 7);
        assert_eq!(handle.capabilities().len(), 2);
    }

    #[test]
    fn clones_share_the_instance() {
        let handle = ResourceHandle::new::<dyn Lamp>(Arc::new(DeskLamp));
        let other = handle.clone();
        assert!(handle.ptr_eq(&other));
        assert!(!handle.ptr_eq(&ResourceHandle::new::<dyn Lamp>(Arc::new(DeskLamp))));
    }

    #[tokio::test]
    async fn default_contract_methods() {
        let lamp = DeskLamp;
        let ctx = CancellationToken::new();
        assert!(matches!(
            lamp.do_command(&ctx, Command::new()).await,
            Err(RdkError::Unimplemented(_))
        ));
        assert!(lamp.close().await.is_ok());
    }
}
