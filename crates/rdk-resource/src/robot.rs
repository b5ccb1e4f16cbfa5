//! The [`Robot`] seam: anything that hands out live resources by name.

use std::sync::Arc;

use rdk_types::{RdkError, ResourceName};

use crate::resource::ResourceHandle;

/// A set of live resources addressable by name.
///
/// Implemented by the local robot; per-API `from_robot` helpers are written
/// against this trait so they work with any implementation.
pub trait Robot: Send + Sync {
    /// Every resource currently served, local and remote.
    fn resource_names(&self) -> Vec<ResourceName>;

    /// # Errors
    ///
    /// [`RdkError::NotFound`] when nothing is registered under `name`.
    fn resource_by_name(&self, name: &ResourceName) -> Result<ResourceHandle, RdkError>;
}

/// Fetch `name` from `robot` as capability `T`.
///
/// # Errors
///
/// [`RdkError::NotFound`] when absent and [`RdkError::TypeMismatch`] when the
/// resource exists but does not implement `T`.
pub fn resource_from_robot<T: ?Sized + 'static>(
    robot: &dyn Robot,
    name: &ResourceName,
) -> Result<Arc<T>, RdkError> {
    robot.resource_by_name(name)?.downcast::<T>()
}
