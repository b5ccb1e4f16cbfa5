//! JSON frames exchanged over a WebSocket connection.
//!
//! Every frame is one WebSocket text message and belongs to exactly one call.
//! A call is a sequence of frames sharing a `call` id:
//!
//! ```text
//! client                                  server
//!   Open { method }            ─────▶
//!   Message { name, body }     ─────▶     (first message names the resource)
//!   Message { body } …         ─────▶     (client/bidi streaming)
//!   CloseSend                  ─────▶
//!                              ◀─────     Message { body } …
//!                              ◀─────     Trailer { error }
//! ```
//!
//! `Cancel` may be sent by the client at any time; the server answers with a
//! `Trailer` carrying [`RdkError::Canceled`].
//!
//! Both sides send `Credit { n }` as they consume messages of a call; see
//! [`crate::flow`] for the window rules.

use rdk_types::{Api, RdkError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One request or response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Target resource.  Required on the first request of a call; later
    /// requests omit it or repeat it unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl RpcMessage {
    pub fn named(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: Some(name.into()),
            body,
        }
    }

    pub fn body(body: Value) -> Self {
        Self { name: None, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Open { call: Uuid, method: String },
    Message { call: Uuid, message: RpcMessage },
    CloseSend { call: Uuid },
    Cancel { call: Uuid },
    Trailer { call: Uuid, error: Option<RdkError> },
    /// The sender consumed `n` more messages of the call.
    Credit { call: Uuid, n: u32 },
}

impl Frame {
    pub fn call(&self) -> Uuid {
        match self {
            Frame::Open { call, .. }
            | Frame::Message { call, .. }
            | Frame::CloseSend { call }
            | Frame::Cancel { call }
            | Frame::Trailer { call, .. }
            | Frame::Credit { call, .. } => *call,
        }
    }

    pub fn encode(&self) -> Result<String, RdkError> {
        serde_json::to_string(self).map_err(|e| RdkError::Transport(format!("encode frame: {e}")))
    }

    pub fn decode(text: &str) -> Result<Self, RdkError> {
        serde_json::from_str(text).map_err(|e| RdkError::Transport(format!("decode frame: {e}")))
    }
}

/// Fully-qualified method path: `<api>/<Method>`.
pub fn method_path(api: &Api, method: &str) -> String {
    format!("{api}/{method}")
}

/// Split a method path into its API and method name.
pub fn parse_method_path(path: &str) -> Result<(Api, &str), RdkError> {
    let (api, method) = path
        .rsplit_once('/')
        .ok_or_else(|| RdkError::Unimplemented(path.to_string()))?;
    let api: Api = api
        .parse()
        .map_err(|_| RdkError::Unimplemented(path.to_string()))?;
    if method.is_empty() {
        return Err(RdkError::Unimplemented(path.to_string()));
    }
    Ok((api, method))
}

/// Serialize a typed payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, RdkError> {
    serde_json::to_value(value).map_err(|e| RdkError::InvalidArgument(e.to_string()))
}

/// Deserialize a typed payload.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RdkError> {
    serde_json::from_value(value).map_err(|e| RdkError::InvalidArgument(e.to_string()))
}
