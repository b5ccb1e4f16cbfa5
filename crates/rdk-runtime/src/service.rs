//! The robot-level RPC service (`rdk:service:robot`).
//!
//! Lets another robot list what this one exposes so it can mount the
//! resources as remote clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use rdk_resource::AnyCollection;
use rdk_rpc::wire::encode;
use rdk_rpc::{ClientConn, MethodKind, RequestStream, ResponseStream, RpcService, method_path};
use rdk_types::{Api, Extra, RdkError, ResourceName};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub const RESOURCE_NAMES: &str = "ResourceNames";

pub fn api() -> Api {
    Api::service("robot")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceNamesResponse {
    pub resources: Vec<ResourceName>,
}

/// Serves the names held by a robot's collections at call time.
pub struct RobotService {
    api: Api,
    collections: Arc<BTreeMap<Api, Arc<dyn AnyCollection>>>,
}

impl RobotService {
    pub fn new(collections: Arc<BTreeMap<Api, Arc<dyn AnyCollection>>>) -> Self {
        Self {
            api: api(),
            collections,
        }
    }

    fn resource_names(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self
            .collections
            .values()
            .flat_map(|coll| coll.names())
            .collect();
        names.sort();
        names
    }
}

impl RpcService for RobotService {
    fn api(&self) -> &Api {
        &self.api
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        (method == RESOURCE_NAMES).then_some(MethodKind::Unary)
    }

    fn methods(&self) -> Vec<String> {
        vec![RESOURCE_NAMES.to_string()]
    }

    fn call(
        &self,
        method: &str,
        _name: &str,
        _ctx: CancellationToken,
        _requests: RequestStream,
    ) -> Result<ResponseStream, RdkError> {
        if method != RESOURCE_NAMES {
            return Err(RdkError::Unimplemented(method_path(&self.api, method)));
        }
        let resp = ResourceNamesResponse {
            resources: self.resource_names(),
        };
        Ok(stream::once(async move { encode(&resp) }).boxed())
    }
}

/// Ask the robot behind `conn` for its resource names.
pub async fn fetch_resource_names(ctx: &CancellationToken, conn: &ClientConn) -> Result<Vec<ResourceName>, RdkError> {
    let resp: ResourceNamesResponse = conn
        .unary(ctx, &method_path(&api(), RESOURCE_NAMES), "", &Extra::new())
        .await?;
    Ok(resp.resources)
}
