use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use rdk_types::{Api, Extra, Model, RdkError, ResourceName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Typed view of a resource's `attributes` block.
///
/// Models that take configuration register one of these alongside their
/// constructor; the resolver deserializes the raw attributes into it and calls
/// [`AttributeValidator::validate`] before the resource is ever built.
pub trait AttributeValidator: DeserializeOwned + Send + Sync + 'static {
    /// Check field constraints and return the names of the resources this
    /// configuration implicitly depends on.
    ///
    /// `path` locates the resource in the robot configuration and belongs in
    /// every error message.
    fn validate(&self, path: &str) -> Result<Vec<String>, RdkError>;
}

#[derive(Clone)]
pub(crate) struct Converted(pub(crate) Arc<dyn Any + Send + Sync>);

impl fmt::Debug for Converted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<converted attributes>")
    }
}

/// Declarative description of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub api: Api,
    pub model: Model,
    #[serde(default)]
    pub attributes: Extra,
    /// Explicit dependencies, as short names (`"encoder1"`) or full resource
    /// names (`"rdk:component:encoder/encoder1"`).
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(skip)]
    converted: Option<Converted>,
}

impl ResourceConfig {
    pub fn new(api: Api, model: Model, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api,
            model,
            attributes: Extra::new(),
            depends_on: Vec::new(),
            converted: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Extra) -> Self {
        self.attributes = attributes;
        self.converted = None;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self.converted = None;
        self
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn resource_name(&self) -> ResourceName {
        ResourceName::new(self.api.clone(), &self.name)
    }

    /// Location of this resource inside a robot configuration, used as the
    /// prefix of validation errors.
    pub fn path(&self) -> String {
        let section = if self.api.is_service() { "services" } else { "components" };
        format!("{section}.{}", self.name)
    }

    /// Check the identity fields that every resource needs regardless of model.
    pub fn validate_identity(&self) -> Result<(), RdkError> {
        let path = self.path();
        if self.name.is_empty() {
            return Err(RdkError::config(path, "name must not be empty"));
        }
        if self.name.contains('/') {
            return Err(RdkError::config(path, "name must not contain '/'"));
        }
        self.api
            .validate()
            .and_then(|()| self.model.validate())
            .map_err(|e| RdkError::config(path, e.to_string()))
    }

    /// The typed attributes produced by validation.
    ///
    /// # Errors
    ///
    /// [`RdkError::ConfigValidation`] when the config has not been validated
    /// or the model registered a different attribute type.
    pub fn native<C: 'static>(&self) -> Result<&C, RdkError> {
        self.converted
            .as_ref()
            .and_then(|c| c.0.downcast_ref::<C>())
            .ok_or_else(|| {
                RdkError::config(
                    self.path(),
                    format!("attributes were not converted to {}", type_name::<C>()),
                )
            })
    }

    pub(crate) fn set_converted(&mut self, converted: Option<Converted>) {
        self.converted = converted;
    }
}

/// Two configs are equal when their declarative content is equal; the cached
/// typed attributes do not take part.
impl PartialEq for ResourceConfig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.api == other.api
            && self.model == other.model
            && self.attributes == other.attributes
            && self.depends_on == other.depends_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_parses_from_json() {
        let conf: ResourceConfig = serde_json::from_value(json!({
            "name": "m1",
            "api": "rdk:component:motor",
            "model": "fake",
            "attributes": { "max_rpm": 60 },
            "depends_on": ["e1"]
        }))
        .unwrap();

        assert_eq!(conf.resource_name(), ResourceName::new(Api::component("motor"), "m1"));
        assert_eq!(conf.model, Model::builtin("fake"));
        assert_eq!(conf.attributes["max_rpm"], json!(60));
        assert_eq!(conf.depends_on, vec!["e1"]);
    }

    #[test]
    fn path_reflects_resource_type() {
        let comp = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "m1");
        assert_eq!(comp.path(), "components.m1");
        let svc = ResourceConfig::new(Api::service("nav"), Model::builtin("fake"), "n1");
        assert_eq!(svc.path(), "services.n1");
    }

    #[test]
    fn identity_validation_rejects_bad_names() {
        let conf = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "");
        assert!(matches!(
            conf.validate_identity(),
            Err(RdkError::ConfigValidation { .. })
        ));

        let conf = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "a/b");
        assert!(conf.validate_identity().is_err());
    }

    #[test]
    fn native_requires_conversion() {
        let conf = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "m1");
        assert!(conf.native::<u32>().is_err());
    }

    #[test]
    fn equality_ignores_converted_cache() {
        let a = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "m1")
            .with_attribute("max_rpm", 60);
        let mut b = a.clone();
        b.set_converted(Some(Converted(Arc::new(5u32))));
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_attribute("max_rpm", 61));
    }
}
