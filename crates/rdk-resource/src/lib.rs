//! `rdk-resource` – the resource model.
//!
//! Everything a robot needs to go from a declarative list of
//! [`ResourceConfig`]s to a set of live, typed resources:
//!
//! | Module | Contents |
//! |---|---|
//! | [`resource`] | [`Resource`] contract and the type-erased [`ResourceHandle`] |
//! | [`config`] | [`ResourceConfig`] and [`AttributeValidator`] |
//! | [`registry`] | [`Registry`] of `(api, model)` constructors and API collections |
//! | [`dependencies`] | [`Dependencies`] handed to constructors |
//! | [`resolver`] | [`Resolver`]: validate, resolve, build, reconfigure |
//! | [`graph`] | [`DependencyGraph`] construction ordering and cycle detection |
//! | [`collection`] | [`SubtypeCollection`] of live resources per API |
//! | [`robot`] | [`Robot`] seam for name-based lookups |

pub mod collection;
pub mod config;
pub mod dependencies;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod robot;

pub use collection::{AnyCollection, SubtypeCollection, downcast_collection};
pub use config::{AttributeValidator, ResourceConfig};
pub use dependencies::Dependencies;
pub use graph::DependencyGraph;
pub use registry::{ApiRegistration, Constructor, Registration, Registry};
pub use resolver::{Resolver, resolve_dependency_name};
pub use resource::{AsResource, Resource, ResourceHandle};
pub use robot::{Robot, resource_from_robot};

pub use async_trait::async_trait;
pub use rdk_types::{Api, Command, Extra, Model, RdkError, ResourceName};
pub use tokio_util::sync::CancellationToken;
