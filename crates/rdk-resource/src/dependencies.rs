use std::collections::HashMap;
use std::sync::Arc;

use rdk_types::{Api, RdkError, ResourceName};

use crate::resolver::resolve_dependency_name;
use crate::resource::ResourceHandle;

/// The already-constructed resources handed to a constructor.
///
/// Only resources the config declared (explicitly or through its attributes)
/// are present; asking for anything else is an error rather than a silent
/// reach into the rest of the robot.
#[derive(Clone)]
pub struct Dependencies {
    owner: ResourceName,
    resources: HashMap<ResourceName, ResourceHandle>,
}

impl Dependencies {
    pub fn new(owner: ResourceName) -> Self {
        Self {
            owner,
            resources: HashMap::new(),
        }
    }

    pub fn owner(&self) -> &ResourceName {
        &self.owner
    }

    pub fn insert(&mut self, handle: ResourceHandle) {
        self.resources.insert(handle.name().clone(), handle);
    }

    fn missing(&self, dependency: impl ToString) -> RdkError {
        RdkError::DependencyNotFound {
            resource: self.owner.to_string(),
            dependency: dependency.to_string(),
        }
    }

    pub fn handle(&self, name: &ResourceName) -> Result<&ResourceHandle, RdkError> {
        self.resources.get(name).ok_or_else(|| self.missing(name))
    }

    /// Typed access to a declared dependency.
    ///
    /// # Errors
    ///
    /// [`RdkError::DependencyNotFound`] when `name` was not declared and
    /// [`RdkError::TypeMismatch`] when it does not implement `T`.
    pub fn get<T: ?Sized + 'static>(&self, name: &ResourceName) -> Result<Arc<T>, RdkError> {
        self.handle(name)?.downcast::<T>()
    }

    /// Like [`Dependencies::get`] but addressed the way configs address
    /// dependencies: by API and short name.
    pub fn get_named<T: ?Sized + 'static>(&self, api: &Api, name: &str) -> Result<Arc<T>, RdkError> {
        self.get(&ResourceName::new(api.clone(), name))
    }

    /// Find a dependency of any API by the string a config named it with.
    ///
    /// # Errors
    ///
    /// [`RdkError::DependencyNotFound`] or [`RdkError::AmbiguousDependency`].
    pub fn lookup(&self, dependency: &str) -> Result<&ResourceHandle, RdkError> {
        let name = resolve_dependency_name(&self.owner, dependency, self.resources.keys())?;
        self.handle(&name)
    }

    pub fn contains(&self, name: &ResourceName) -> bool {
        self.resources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &ResourceName> {
        self.resources.keys()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("owner", &self.owner)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    trait Gauge: Resource {}

    struct Thermo(ResourceName);

    impl Resource for Thermo {
        fn name(&self) -> ResourceName {
            self.0.clone()
        }
    }

    impl Gauge for Thermo {}

    #[test]
    fn undeclared_dependency_is_an_error() {
        let owner = ResourceName::new(Api::component("motor"), "m1");
        let deps = Dependencies::new(owner);
        let err = deps
            .get_named::<dyn Gauge>(&Api::component("sensor"), "t1")
            .err()
            .unwrap();
        assert!(matches!(err, RdkError::DependencyNotFound { .. }));
        assert!(err.to_string().contains("rdk:component:motor/m1"));
    }

    #[test]
    fn declared_dependency_is_typed() {
        let name = ResourceName::new(Api::component("sensor"), "t1");
        let mut deps = Dependencies::new(ResourceName::new(Api::component("motor"), "m1"));
        deps.insert(ResourceHandle::new::<dyn Gauge>(Arc::new(Thermo(name.clone()))));

        assert!(deps.get::<dyn Gauge>(&name).is_ok());
        assert!(deps.contains(&name));
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn lookup_by_short_name_spans_apis() {
        let name = ResourceName::new(Api::component("sensor"), "t1");
        let mut deps = Dependencies::new(ResourceName::new(Api::component("motor"), "m1"));
        deps.insert(ResourceHandle::new::<dyn Gauge>(Arc::new(Thermo(name.clone()))));

        assert_eq!(deps.lookup("t1").unwrap().name(), &name);
        assert!(matches!(
            deps.lookup("t2").err().unwrap(),
            RdkError::DependencyNotFound { .. }
        ));
    }
}
