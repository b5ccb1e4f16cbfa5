//! `rdk-components` – built-in component APIs and models.
//!
//! Each API module carries its capability trait, the RPC server that serves a
//! collection of it, the client stub that reaches it on another robot, and its
//! built-in models:
//!
//! | Module | API | Models |
//! |---|---|---|
//! | [`encoder`] | `rdk:component:encoder` | `fake` |
//! | [`motor`] | `rdk:component:motor` | `fake` |
//! | [`generic`] | `rdk:component:generic` | `fake` |
//! | [`gizmo`] | `acme:component:gizmo` | `acme:demo:mygizmo` |
//!
//! Call [`register_builtins`] once at startup before building a robot.

pub mod encoder;
pub mod generic;
pub mod gizmo;
pub mod motor;

#[cfg(test)]
mod inject;

use rdk_resource::Registry;
use rdk_rpc::ServiceRegistry;
use rdk_types::{Extra, RdkError};
use serde::{Deserialize, Serialize};

/// Request body of methods that take nothing but `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraRequest {
    #[serde(default)]
    pub extra: Extra,
}

/// Register every built-in API, its RPC server and client, and its models.
///
/// # Errors
///
/// [`RdkError::DuplicateRegistration`] when called twice against the same
/// registries.
pub fn register_builtins(registry: &Registry, services: &ServiceRegistry) -> Result<(), RdkError> {
    encoder::register(registry, services)?;
    motor::register(registry, services)?;
    generic::register(registry, services)?;
    gizmo::register(registry, services)?;
    Ok(())
}
