//! `rdk-types` – shared vocabulary of the robot development kit.
//!
//! Every other crate in the workspace speaks in terms of these types:
//!
//! - [`Api`] – a capability family such as `rdk:component:motor`.
//! - [`Model`] – a concrete implementation of an API such as `rdk:builtin:fake`.
//! - [`ResourceName`] – the address of one live resource, optionally behind a
//!   remote prefix.
//! - [`RdkError`] – the single error type shared by the registry, the
//!   transport and every resource implementation.
//! - [`Extra`] / [`Command`] – free-form key/value maps passed through calls
//!   without being part of any typed schema.

pub mod error;
pub mod name;

pub use error::{RdkError, StatusCode};
pub use name::{
    Api, FAMILY_BUILTIN, Model, NAMESPACE_RDK, ResourceName, TYPE_COMPONENT, TYPE_SERVICE,
};

/// Optional, forward-compatible parameters attached to a typed call.
///
/// Implementations read the keys they understand and ignore the rest.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Payload of the generic `DoCommand` escape hatch, used both for the command
/// and for its result.
pub type Command = serde_json::Map<String, serde_json::Value>;
