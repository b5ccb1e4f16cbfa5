//! [`Registry`] – process-wide table of resource constructors.
//!
//! Models are registered per `(api, model)` pair at startup; the resolver
//! later looks the pair up for every configured resource.  APIs themselves are
//! registered once with the capability type their collection holds.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use rdk_types::{Api, FAMILY_BUILTIN, Model, RdkError};
use serde_json::Value;
use tracing::debug;

use crate::collection::{AnyCollection, SubtypeCollection};
use crate::config::{AttributeValidator, Converted, ResourceConfig};
use crate::dependencies::Dependencies;
use crate::resource::{Resource, ResourceHandle};

/// Builds a resource from its resolved dependencies and its config.
pub type Constructor =
    Arc<dyn Fn(&Dependencies, &ResourceConfig) -> Result<ResourceHandle, RdkError> + Send + Sync>;

type Converter =
    Arc<dyn Fn(&ResourceConfig) -> Result<(Converted, Vec<String>), RdkError> + Send + Sync>;

/// How to build (and optionally validate) one model.
#[derive(Clone)]
pub struct Registration {
    constructor: Constructor,
    converter: Option<Converter>,
}

impl Registration {
    /// A model that takes no typed attributes.
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(&Dependencies, &ResourceConfig) -> Result<ResourceHandle, RdkError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            constructor: Arc::new(constructor),
            converter: None,
        }
    }

    /// A model whose attributes deserialize into `C`.
    ///
    /// The constructor reads them back with [`ResourceConfig::native`].
    pub fn with_attributes<C, F>(constructor: F) -> Self
    where
        C: AttributeValidator,
        F: Fn(&Dependencies, &ResourceConfig) -> Result<ResourceHandle, RdkError>
            + Send
            + Sync
            + 'static,
    {
        let converter: Converter = Arc::new(
            |conf: &ResourceConfig| -> Result<(Converted, Vec<String>), RdkError> {
                let path = conf.path();
                let attrs: C = serde_json::from_value(Value::Object(conf.attributes.clone()))
                    .map_err(|e| RdkError::config(&path, e.to_string()))?;
                let implicit = attrs.validate(&path)?;
                let converted: Arc<dyn Any + Send + Sync> = Arc::new(attrs);
                Ok((Converted(converted), implicit))
            },
        );
        Self {
            constructor: Arc::new(constructor),
            converter: Some(converter),
        }
    }

    pub fn construct(
        &self,
        deps: &Dependencies,
        conf: &ResourceConfig,
    ) -> Result<ResourceHandle, RdkError> {
        (self.constructor)(deps, conf)
    }

    pub fn has_attributes(&self) -> bool {
        self.converter.is_some()
    }

    /// Convert and validate the attributes of `conf`, returning the implicit
    /// dependencies they name.
    pub(crate) fn convert(
        &self,
        conf: &ResourceConfig,
    ) -> Result<(Option<Converted>, Vec<String>), RdkError> {
        match &self.converter {
            Some(convert) => {
                let (converted, implicit) = convert(conf)?;
                Ok((Some(converted), implicit))
            }
            None => Ok((None, Vec::new())),
        }
    }
}

/// Registration of an API: how to create an empty collection for it.
#[derive(Clone)]
pub struct ApiRegistration {
    api: Api,
    capability: &'static str,
    new_collection: Arc<dyn Fn() -> Arc<dyn AnyCollection> + Send + Sync>,
}

impl ApiRegistration {
    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Name of the capability trait the API's collection holds.
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    pub fn new_collection(&self) -> Arc<dyn AnyCollection> {
        (self.new_collection)()
    }
}

/// Central table of registered models and APIs.
///
/// Registration takes `&self`, so one registry can be shared behind an `Arc`
/// by every subsystem that contributes models.
#[derive(Default)]
pub struct Registry {
    models: RwLock<HashMap<Api, BTreeMap<Model, Registration>>>,
    apis: RwLock<BTreeMap<Api, ApiRegistration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` as an implementation of `api`.
    ///
    /// # Errors
    ///
    /// [`RdkError::DuplicateRegistration`] when the pair is already taken and
    /// [`RdkError::InvalidArgument`] when either identifier is malformed.
    pub fn register(
        &self,
        api: Api,
        model: Model,
        registration: Registration,
    ) -> Result<(), RdkError> {
        api.validate()?;
        model.validate()?;

        let mut models = self.models.write();
        let per_api = models.entry(api.clone()).or_default();
        if per_api.contains_key(&model) {
            return Err(RdkError::DuplicateRegistration {
                api: api.to_string(),
                model: model.to_string(),
            });
        }
        debug!(%api, %model, "registered model");
        per_api.insert(model, registration);
        Ok(())
    }

    /// # Errors
    ///
    /// [`RdkError::UnknownModel`] when nothing was registered for the pair.
    pub fn lookup(&self, api: &Api, model: &Model) -> Result<Registration, RdkError> {
        self.models
            .read()
            .get(api)
            .and_then(|per_api| per_api.get(model))
            .cloned()
            .ok_or_else(|| RdkError::UnknownModel {
                api: api.to_string(),
                model: model.to_string(),
            })
    }

    /// The default model of `api`: the `rdk:builtin:builtin` model when one is
    /// registered, otherwise the only registered model.
    ///
    /// # Errors
    ///
    /// [`RdkError::UnknownModel`] when no model qualifies.
    pub fn lookup_default(&self, api: &Api) -> Result<(Model, Registration), RdkError> {
        let models = self.models.read();
        let per_api = models.get(api);

        let builtin = Model::builtin(FAMILY_BUILTIN);
        if let Some(reg) = per_api.and_then(|m| m.get(&builtin)) {
            return Ok((builtin, reg.clone()));
        }
        match per_api {
            Some(m) if m.len() == 1 => m
                .iter()
                .next()
                .map(|(model, reg)| (model.clone(), reg.clone()))
                .ok_or_else(|| RdkError::UnknownApi(api.to_string())),
            _ => Err(RdkError::UnknownModel {
                api: api.to_string(),
                model: "<default>".to_string(),
            }),
        }
    }

    /// Models registered for `api`, in sorted order.
    pub fn models(&self, api: &Api) -> Vec<Model> {
        self.models
            .read()
            .get(api)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Register `api` with capability type `T`.
    ///
    /// # Errors
    ///
    /// [`RdkError::DuplicateRegistration`] when the API is already registered.
    pub fn register_api<T: ?Sized + Resource>(&self, api: Api) -> Result<(), RdkError> {
        api.validate()?;
        let mut apis = self.apis.write();
        if apis.contains_key(&api) {
            return Err(RdkError::DuplicateRegistration {
                api: api.to_string(),
                model: "<api>".to_string(),
            });
        }
        let for_collection = api.clone();
        let registration = ApiRegistration {
            api: api.clone(),
            capability: std::any::type_name::<T>(),
            new_collection: Arc::new(move || {
                Arc::new(SubtypeCollection::<T>::new(for_collection.clone())) as Arc<dyn AnyCollection>
            }),
        };
        debug!(%api, capability = registration.capability, "registered api");
        apis.insert(api, registration);
        Ok(())
    }

    /// # Errors
    ///
    /// [`RdkError::UnknownApi`] when `api` was never registered.
    pub fn lookup_api(&self, api: &Api) -> Result<ApiRegistration, RdkError> {
        self.apis
            .read()
            .get(api)
            .cloned()
            .ok_or_else(|| RdkError::UnknownApi(api.to_string()))
    }

    pub fn apis(&self) -> Vec<Api> {
        self.apis.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::downcast_collection;
    use rdk_types::ResourceName;
    use serde::Deserialize;
    use serde_json::json;

    trait Valve: Resource {
        fn open(&self) -> bool;
    }

    struct Fake {
        name: ResourceName,
        open: bool,
    }

    impl Resource for Fake {
        fn name(&self) -> ResourceName {
            self.name.clone()
        }
    }

    impl Valve for Fake {
        fn open(&self) -> bool {
            self.open
        }
    }

    #[derive(Deserialize)]
    struct ValveAttrs {
        open: bool,
        #[serde(default)]
        pump: Option<String>,
    }

    impl AttributeValidator for ValveAttrs {
        fn validate(&self, _path: &str) -> Result<Vec<String>, RdkError> {
            Ok(self.pump.iter().cloned().collect())
        }
    }

    fn api() -> Api {
        Api::component("valve")
    }

    fn plain() -> Registration {
        Registration::new(|_deps, conf| {
            Ok(ResourceHandle::new::<dyn Valve>(Arc::new(Fake {
                name: conf.resource_name(),
                open: false,
            })))
        })
    }

    #[test]
    fn register_and_lookup() {
        let reg = Registry::new();
        reg.register(api(), Model::builtin("fake"), plain()).unwrap();

        let found = reg.lookup(&api(), &Model::builtin("fake")).unwrap();
        let conf = ResourceConfig::new(api(), Model::builtin("fake"), "v1");
        let deps = Dependencies::new(conf.resource_name());
        let handle = found.construct(&deps, &conf).unwrap();
        assert!(!handle.downcast::<dyn Valve>().unwrap().open());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let reg = Registry::new();
        reg.register(api(), Model::builtin("fake"), plain()).unwrap();
        let err = reg
            .register(api(), Model::builtin("fake"), plain())
            .unwrap_err();
        assert!(matches!(err, RdkError::DuplicateRegistration { .. }));
    }

    #[test]
    fn unknown_model_is_reported() {
        let reg = Registry::new();
        let err = reg.lookup(&api(), &Model::builtin("nope")).err().unwrap();
        assert!(matches!(err, RdkError::UnknownModel { .. }));
    }

    #[test]
    fn default_model_prefers_builtin_then_sole_model() {
        let reg = Registry::new();
        assert!(reg.lookup_default(&api()).is_err());

        reg.register(api(), Model::builtin("fake"), plain()).unwrap();
        assert_eq!(reg.lookup_default(&api()).unwrap().0, Model::builtin("fake"));

        reg.register(api(), Model::new("acme", "demo", "v"), plain()).unwrap();
        assert!(reg.lookup_default(&api()).is_err());

        reg.register(api(), Model::builtin("builtin"), plain()).unwrap();
        assert_eq!(reg.lookup_default(&api()).unwrap().0, Model::builtin("builtin"));
        assert_eq!(reg.models(&api()).len(), 3);
    }

    #[test]
    fn attribute_conversion_reports_implicit_dependencies() {
        let reg = Registration::with_attributes::<ValveAttrs, _>(|_deps, conf| {
            let attrs = conf.native::<ValveAttrs>()?;
            Ok(ResourceHandle::new::<dyn Valve>(Arc::new(Fake {
                name: conf.resource_name(),
                open: attrs.open,
            })))
        });
        let conf = ResourceConfig::new(api(), Model::builtin("fake"), "v1")
            .with_attribute("open", true)
            .with_attribute("pump", "p1");

        let (converted, implicit) = reg.convert(&conf).unwrap();
        assert!(converted.is_some());
        assert_eq!(implicit, vec!["p1"]);
    }

    #[test]
    fn attribute_type_errors_carry_the_path() {
        let reg = Registration::with_attributes::<ValveAttrs, _>(|_, _| {
            Err(RdkError::Unimplemented("never built".into()))
        });
        let conf = ResourceConfig::new(api(), Model::builtin("fake"), "v1")
            .with_attributes(json!({ "open": "yes" }).as_object().cloned().unwrap());
        let err = reg.convert(&conf).unwrap_err();
        assert!(matches!(err, RdkError::ConfigValidation { ref path, .. } if path == "components.v1"));
    }

    #[test]
    fn api_registration_creates_typed_collections() {
        let reg = Registry::new();
        reg.register_api::<dyn Valve>(api()).unwrap();
        assert!(reg.register_api::<dyn Valve>(api()).is_err());

        let coll = reg.lookup_api(&api()).unwrap().new_collection();
        assert_eq!(coll.api(), &api());
        assert!(downcast_collection::<dyn Valve>(coll).is_ok());
        assert!(matches!(
            reg.lookup_api(&Api::component("pump")),
            Err(RdkError::UnknownApi(_))
        ));
    }
}
