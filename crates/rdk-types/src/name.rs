//! Resource identity: [`Api`], [`Model`] and [`ResourceName`].
//!
//! All three serialize as their colon-separated string form so they can be
//! written naturally in configuration files and on the wire:
//!
//! | Type | Example |
//! |---|---|
//! | [`Api`] | `rdk:component:motor` |
//! | [`Model`] | `rdk:builtin:fake` |
//! | [`ResourceName`] | `rdk:component:motor/remote1:left` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RdkError;

/// Namespace of every API and model that ships with the kit.
pub const NAMESPACE_RDK: &str = "rdk";
/// Resource type of physical components (motors, encoders, …).
pub const TYPE_COMPONENT: &str = "component";
/// Resource type of software services.
pub const TYPE_SERVICE: &str = "service";
/// Model family used when a configuration only gives a bare model name.
pub const FAMILY_BUILTIN: &str = "builtin";

fn check_segment(kind: &str, segment: &str) -> Result<(), RdkError> {
    if segment.is_empty() {
        return Err(RdkError::InvalidArgument(format!("{kind} must not be empty")));
    }
    if segment.contains([':', '/']) {
        return Err(RdkError::InvalidArgument(format!(
            "{kind} {segment:?} must not contain ':' or '/'"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Api
// ─────────────────────────────────────────────────────────────────────────────

/// A capability family that every implementation of that kind satisfies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Api {
    pub namespace: String,
    pub resource_type: String,
    pub subtype: String,
}

impl Api {
    pub fn new(
        namespace: impl Into<String>,
        resource_type: impl Into<String>,
        subtype: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            resource_type: resource_type.into(),
            subtype: subtype.into(),
        }
    }

    /// A component API in the `rdk` namespace, e.g. `Api::component("motor")`.
    pub fn component(subtype: impl Into<String>) -> Self {
        Self::new(NAMESPACE_RDK, TYPE_COMPONENT, subtype)
    }

    /// A service API in the `rdk` namespace.
    pub fn service(subtype: impl Into<String>) -> Self {
        Self::new(NAMESPACE_RDK, TYPE_SERVICE, subtype)
    }

    pub fn is_component(&self) -> bool {
        self.resource_type == TYPE_COMPONENT
    }

    pub fn is_service(&self) -> bool {
        self.resource_type == TYPE_SERVICE
    }

    /// Check that every segment is non-empty and free of separators.
    pub fn validate(&self) -> Result<(), RdkError> {
        check_segment("api namespace", &self.namespace)?;
        check_segment("api resource type", &self.resource_type)?;
        check_segment("api subtype", &self.subtype)
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.resource_type, self.subtype)
    }
}

impl FromStr for Api {
    type Err = RdkError;

    /// Accepts either the full `namespace:type:subtype` triple or a bare
    /// subtype, which defaults to an `rdk` component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let api = match parts.as_slice() {
            [subtype] => Api::component(*subtype),
            [namespace, resource_type, subtype] => Api::new(*namespace, *resource_type, *subtype),
            _ => {
                return Err(RdkError::InvalidArgument(format!(
                    "api {s:?} must be of the form namespace:type:subtype"
                )));
            }
        };
        api.validate()?;
        Ok(api)
    }
}

impl TryFrom<String> for Api {
    type Error = RdkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Api> for String {
    fn from(api: Api) -> Self {
        api.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies which implementation satisfies an [`Api`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Model {
    pub namespace: String,
    pub family: String,
    pub name: String,
}

impl Model {
    pub fn new(
        namespace: impl Into<String>,
        family: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            family: family.into(),
            name: name.into(),
        }
    }

    /// A model in the `rdk:builtin` family, e.g. `Model::builtin("fake")`.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new(NAMESPACE_RDK, FAMILY_BUILTIN, name)
    }

    pub fn validate(&self) -> Result<(), RdkError> {
        check_segment("model namespace", &self.namespace)?;
        check_segment("model family", &self.family)?;
        check_segment("model name", &self.name)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.family, self.name)
    }
}

impl FromStr for Model {
    type Err = RdkError;

    /// Accepts `namespace:family:name` or a bare name, which defaults to the
    /// `rdk:builtin` family.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let model = match parts.as_slice() {
            [name] => Model::builtin(*name),
            [namespace, family, name] => Model::new(*namespace, *family, *name),
            _ => {
                return Err(RdkError::InvalidArgument(format!(
                    "model {s:?} must be of the form namespace:family:name"
                )));
            }
        };
        model.validate()?;
        Ok(model)
    }
}

impl TryFrom<String> for Model {
    type Error = RdkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Model> for String {
    fn from(model: Model) -> Self {
        model.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceName
// ─────────────────────────────────────────────────────────────────────────────

/// The address of a single resource within a robot.
///
/// A name may carry a `remote` prefix (`"remote1:arm"`) marking it as
/// belonging to a federated robot.  The prefix is kept for display and
/// equality but [`ResourceName::name`] alone is what the owning robot knows
/// the resource by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName {
    pub api: Api,
    pub remote: Option<String>,
    pub name: String,
}

impl ResourceName {
    /// Build a name under `api`.  Everything before the last `:` in `name`
    /// becomes the remote prefix.
    pub fn new(api: Api, name: &str) -> Self {
        match name.rsplit_once(':') {
            Some((remote, local)) if !remote.is_empty() => Self {
                api,
                remote: Some(remote.to_string()),
                name: local.to_string(),
            },
            _ => Self {
                api,
                remote: None,
                name: name.trim_start_matches(':').to_string(),
            },
        }
    }

    /// The name as a caller would type it: `remote:local` or `local`.
    pub fn short_name(&self) -> String {
        match &self.remote {
            Some(remote) => format!("{remote}:{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Strip the outermost remote segment, yielding the name as the next robot
    /// in the chain knows it.
    pub fn pop_remote(&self) -> Self {
        let remote = self
            .remote
            .as_deref()
            .and_then(|r| r.split_once(':').map(|(_, rest)| rest.to_string()));
        Self {
            api: self.api.clone(),
            remote,
            name: self.name.clone(),
        }
    }

    /// Place this name behind an additional remote segment.
    pub fn prepend_remote(&self, remote: &str) -> Self {
        let remote = match &self.remote {
            Some(existing) => format!("{remote}:{existing}"),
            None => remote.to_string(),
        };
        Self {
            api: self.api.clone(),
            remote: Some(remote),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api, self.short_name())
    }
}

impl FromStr for ResourceName {
    type Err = RdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (api, short) = s.split_once('/').ok_or_else(|| {
            RdkError::InvalidArgument(format!("resource name {s:?} must be of the form api/name"))
        })?;
        let api: Api = api.parse()?;
        let name = ResourceName::new(api, short);
        if name.name.is_empty() {
            return Err(RdkError::InvalidArgument(format!(
                "resource name {s:?} has an empty local name"
            )));
        }
        Ok(name)
    }
}

impl TryFrom<String> for ResourceName {
    type Error = RdkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceName> for String {
    fn from(name: ResourceName) -> Self {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_display_and_parse() {
        let api = Api::component("motor");
        assert_eq!(api.to_string(), "rdk:component:motor");
        assert_eq!("rdk:component:motor".parse::<Api>().unwrap(), api);
        assert_eq!("motor".parse::<Api>().unwrap(), api);
        assert!("rdk:component".parse::<Api>().is_err());
        assert!("rdk::motor".parse::<Api>().is_err());
    }

    #[test]
    fn model_defaults_to_builtin_family() {
        let model: Model = "fake".parse().unwrap();
        assert_eq!(model, Model::builtin("fake"));
        assert_eq!(model.to_string(), "rdk:builtin:fake");

        let custom: Model = "acme:demo:mygizmo".parse().unwrap();
        assert_eq!(custom.family, "demo");
    }

    #[test]
    fn model_requires_a_name() {
        assert!("".parse::<Model>().is_err());
        assert!("acme:demo:".parse::<Model>().is_err());
    }

    #[test]
    fn resource_name_splits_remote_prefix() {
        let name = ResourceName::new(Api::component("arm"), "remote:arm1");
        assert_eq!(name.remote.as_deref(), Some("remote"));
        assert_eq!(name.name, "arm1");
        assert_eq!(name.short_name(), "remote:arm1");
        assert_eq!(name.to_string(), "rdk:component:arm/remote:arm1");

        let local = ResourceName::new(Api::component("arm"), "arm1");
        assert!(!local.is_remote());
        assert_ne!(local, name);
    }

    #[test]
    fn resource_name_nested_remotes() {
        let name = ResourceName::new(Api::component("arm"), "a:b:arm1");
        assert_eq!(name.remote.as_deref(), Some("a:b"));

        let popped = name.pop_remote();
        assert_eq!(popped.short_name(), "b:arm1");
        assert_eq!(popped.pop_remote().short_name(), "arm1");

        let pushed = popped.prepend_remote("a");
        assert_eq!(pushed, name);
    }

    #[test]
    fn resource_name_roundtrips_through_json() {
        let name = ResourceName::new(Api::component("motor"), "m1");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"rdk:component:motor/m1\"");
        let back: ResourceName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn resource_name_parse_rejects_missing_api() {
        assert!("m1".parse::<ResourceName>().is_err());
        assert!("rdk:component:motor/".parse::<ResourceName>().is_err());
    }
}
