//! [`Resolver`] – turns configurations into live resources.
//!
//! The lifecycle of one resource is:
//!
//! 1. [`Resolver::validate`] – identity checks, model lookup, attribute
//!    conversion.  Produces the full dependency list.
//! 2. [`Resolver::resolve`] – map every dependency name onto an already-built
//!    resource.
//! 3. [`Resolver::build`] – call the registered constructor.
//! 4. [`Resolver::reconfigure`] – later config changes, applied in place or
//!    answered with [`RdkError::MustRebuild`].

use std::collections::HashMap;

use rdk_types::{RdkError, ResourceName};
use tracing::{debug, warn};

use crate::config::ResourceConfig;
use crate::dependencies::Dependencies;
use crate::registry::Registry;
use crate::resource::ResourceHandle;

/// Map one dependency string onto a known resource name.
///
/// `dependency` is either a full `api/name` string or a short name.  A short
/// name matches on short name first and then on bare local name, across every
/// API.
///
/// # Errors
///
/// [`RdkError::DependencyNotFound`] when nothing matches and
/// [`RdkError::AmbiguousDependency`] when more than one resource does.
pub fn resolve_dependency_name<'a, I>(
    owner: &ResourceName,
    dependency: &str,
    candidates: I,
) -> Result<ResourceName, RdkError>
where
    I: IntoIterator<Item = &'a ResourceName>,
    I::IntoIter: Clone,
{
    let candidates = candidates.into_iter();
    let not_found = || RdkError::DependencyNotFound {
        resource: owner.to_string(),
        dependency: dependency.to_string(),
    };

    if dependency.contains('/') {
        let full: ResourceName = dependency.parse().map_err(|_| not_found())?;
        return candidates
            .clone()
            .find(|c| **c == full)
            .cloned()
            .ok_or_else(not_found);
    }

    let mut matches: Vec<&ResourceName> = candidates
        .clone()
        .filter(|c| c.short_name() == dependency)
        .collect();
    if matches.is_empty() {
        matches = candidates.filter(|c| c.name == dependency).collect();
    }

    match matches.as_slice() {
        [] => Err(not_found()),
        [only] => Ok((*only).clone()),
        many => {
            let mut candidates: Vec<String> = many.iter().map(|c| c.to_string()).collect();
            candidates.sort();
            Err(RdkError::AmbiguousDependency {
                resource: owner.to_string(),
                dependency: dependency.to_string(),
                candidates,
            })
        }
    }
}

/// Drives validation, dependency resolution and construction against a
/// [`Registry`].
pub struct Resolver<'r> {
    registry: &'r Registry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Validate `conf` and return its full dependency list: the explicit
    /// `depends_on` entries followed by whatever the attributes name, without
    /// duplicates.
    ///
    /// On success the typed attributes are cached on `conf`.  On failure the
    /// config is left untouched and nothing is returned.
    pub fn validate(&self, conf: &mut ResourceConfig) -> Result<Vec<String>, RdkError> {
        conf.validate_identity()?;
        let registration = self.registry.lookup(&conf.api, &conf.model)?;
        let (converted, implicit) = registration.convert(conf)?;

        let mut deps: Vec<String> = Vec::with_capacity(conf.depends_on.len() + implicit.len());
        for dep in conf.depends_on.iter().chain(implicit.iter()) {
            if dep.is_empty() {
                return Err(RdkError::config(conf.path(), "dependency name must not be empty"));
            }
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        conf.set_converted(converted);
        Ok(deps)
    }

    /// Gather the declared dependencies of `owner` from `built`.
    pub fn resolve(
        &self,
        owner: &ResourceName,
        declared: &[String],
        built: &HashMap<ResourceName, ResourceHandle>,
    ) -> Result<Dependencies, RdkError> {
        let mut deps = Dependencies::new(owner.clone());
        for dependency in declared {
            let name = resolve_dependency_name(owner, dependency, built.keys())?;
            if let Some(handle) = built.get(&name) {
                deps.insert(handle.clone());
            }
        }
        Ok(deps)
    }

    /// Construct the resource described by `conf`.
    ///
    /// Constructor errors are returned unchanged.
    pub fn build(&self, conf: &ResourceConfig, deps: &Dependencies) -> Result<ResourceHandle, RdkError> {
        let registration = self.registry.lookup(&conf.api, &conf.model)?;
        let handle = registration.construct(deps, conf)?;
        let expected = conf.resource_name();
        if handle.name() != &expected {
            warn!(
                expected = %expected,
                actual = %handle.name(),
                "constructor returned a resource under a different name"
            );
        }
        debug!(resource = %expected, model = %conf.model, "built resource");
        Ok(handle)
    }

    /// Apply a new config to a live resource in place.
    ///
    /// A model change always requires a rebuild; otherwise the resource
    /// decides.
    pub fn reconfigure(
        &self,
        handle: &ResourceHandle,
        previous: &ResourceConfig,
        deps: &Dependencies,
        conf: &ResourceConfig,
    ) -> Result<(), RdkError> {
        if previous.model != conf.model || previous.api != conf.api {
            return Err(RdkError::MustRebuild(handle.name().to_string()));
        }
        handle.resource().reconfigure(deps, conf)?;
        debug!(resource = %handle.name(), "reconfigured in place");
        Ok(())
    }
}
