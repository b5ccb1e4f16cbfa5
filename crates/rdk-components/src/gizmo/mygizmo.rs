//! The `acme:demo:mygizmo` model.
//!
//! Compares every argument it receives against the configured `arg1`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rdk_resource::{
    AttributeValidator, Dependencies, Registration, Resource, ResourceConfig, ResourceHandle,
};
use rdk_types::{Command, RdkError, ResourceName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::Gizmo;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MyGizmoAttrs {
    #[serde(default)]
    pub arg1: String,
}

impl AttributeValidator for MyGizmoAttrs {
    fn validate(&self, path: &str) -> Result<Vec<String>, RdkError> {
        if self.arg1.is_empty() {
            return Err(RdkError::config(path, "\"arg1\" is required"));
        }
        Ok(Vec::new())
    }
}

pub fn registration() -> Registration {
    Registration::with_attributes::<MyGizmoAttrs, _>(|_deps: &Dependencies, conf: &ResourceConfig| {
        let attrs = conf.native::<MyGizmoAttrs>()?;
        let gizmo = MyGizmo::new(conf.resource_name(), &attrs.arg1);
        Ok(ResourceHandle::new::<dyn Gizmo>(Arc::new(gizmo)))
    })
}

pub struct MyGizmo {
    name: ResourceName,
    arg1: Mutex<String>,
}

impl MyGizmo {
    pub fn new(name: ResourceName, arg1: &str) -> Self {
        Self {
            name,
            arg1: Mutex::new(arg1.to_string()),
        }
    }

    fn matches(&self, arg: &str) -> bool {
        *self.arg1.lock() == arg
    }
}

#[async_trait]
impl Resource for MyGizmo {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    fn reconfigure(&self, _deps: &Dependencies, config: &ResourceConfig) -> Result<(), RdkError> {
        let attrs = config.native::<MyGizmoAttrs>()?;
        *self.arg1.lock() = attrs.arg1.clone();
        Ok(())
    }

    async fn do_command(&self, _ctx: &CancellationToken, _cmd: Command) -> Result<Command, RdkError> {
        let mut reply = Command::new();
        reply.insert("arg1".to_string(), Value::String(self.arg1.lock().clone()));
        Ok(reply)
    }
}

#[async_trait]
impl Gizmo for MyGizmo {
    async fn do_one(&self, _ctx: &CancellationToken, arg1: &str) -> Result<bool, RdkError> {
        Ok(self.matches(arg1))
    }

    async fn do_one_client_stream(&self, _ctx: &CancellationToken, arg1: Vec<String>) -> Result<bool, RdkError> {
        if arg1.is_empty() {
            return Ok(false);
        }
        Ok(arg1.iter().all(|arg| self.matches(arg)))
    }

    async fn do_one_server_stream(&self, _ctx: &CancellationToken, arg1: &str) -> Result<Vec<bool>, RdkError> {
        Ok(vec![self.matches(arg1), false, true, false])
    }

    async fn do_one_bidi_stream(&self, _ctx: &CancellationToken, arg1: Vec<String>) -> Result<Vec<bool>, RdkError> {
        Ok(arg1.iter().map(|arg| self.matches(arg)).collect())
    }

    async fn do_two(&self, _ctx: &CancellationToken, arg1: bool) -> Result<String, RdkError> {
        Ok(format!("arg1={arg1}"))
    }
}
