//! Client stub for an encoder on another robot.

use std::sync::Arc;

use async_trait::async_trait;
use rdk_resource::{Resource, ResourceHandle};
use rdk_rpc::{ClientConn, method_path};
use rdk_types::{Command, Extra, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

use super::server::{GetPositionRequest, GetPositionResponse};
use super::{Encoder, PositionType, Properties, api};
use crate::ExtraRequest;

pub struct EncoderClient {
    conn: ClientConn,
    name: ResourceName,
    /// The name the serving robot knows the encoder by.
    remote_name: String,
}

impl EncoderClient {
    pub fn new(conn: ClientConn, name: ResourceName) -> Self {
        let remote_name = name.pop_remote().short_name();
        Self {
            conn,
            name,
            remote_name,
        }
    }
}

pub fn new_client(conn: ClientConn, name: ResourceName) -> ResourceHandle {
    ResourceHandle::new::<dyn Encoder>(Arc::new(EncoderClient::new(conn, name)))
}

#[async_trait]
impl Resource for EncoderClient {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        self.conn
            .unary(ctx, &method_path(&api(), "DoCommand"), &self.remote_name, &cmd)
            .await
    }
}

#[async_trait]
impl Encoder for EncoderClient {
    async fn get_position(
        &self,
        ctx: &CancellationToken,
        position_type: PositionType,
        extra: &Extra,
    ) -> Result<(f64, PositionType), RdkError> {
        let req = GetPositionRequest {
            position_type,
            extra: extra.clone(),
        };
        let resp: GetPositionResponse = self
            .conn
            .unary(ctx, &method_path(&api(), "GetPosition"), &self.remote_name, &req)
            .await?;
        Ok((resp.value, resp.position_type))
    }

    async fn reset_position(&self, ctx: &CancellationToken, extra: &Extra) -> Result<(), RdkError> {
        let req = ExtraRequest { extra: extra.clone() };
        self.conn
            .unary(ctx, &method_path(&api(), "ResetPosition"), &self.remote_name, &req)
            .await
    }

    async fn get_properties(&self, ctx: &CancellationToken, extra: &Extra) -> Result<Properties, RdkError> {
        let req = ExtraRequest { extra: extra.clone() };
        self.conn
            .unary(ctx, &method_path(&api(), "GetProperties"), &self.remote_name, &req)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use parking_lot::Mutex;
    use rdk_resource::SubtypeCollection;
    use rdk_rpc::{DialOptions, RpcServer, dial};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::encoder::{named, server::new_server};
    use crate::inject::InjectEncoder;

    async fn serve(coll: Arc<SubtypeCollection<dyn Encoder>>) -> (SocketAddr, CancellationToken) {
        let mut server = RpcServer::new();
        server.add_service(Arc::new(new_server(coll))).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.serve_on(listener, shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn working_failing_and_missing_encoders() {
        let seen_extra = Arc::new(Mutex::new(Extra::new()));
        let seen = Arc::clone(&seen_extra);
        let working = InjectEncoder::new(named("enc1"))
            .on_get_position(move |_, extra| {
                *seen.lock() = extra.clone();
                Ok((42.0, PositionType::Unspecified))
            })
            .on_reset_position(|| Ok(()))
            .on_do_command(Ok);
        let failing = InjectEncoder::new(named("enc2"))
            .on_get_position(|_, _| Err(RdkError::fault("enc2", "position unavailable")))
            .on_reset_position(|| Err(RdkError::fault("enc2", "set to zero failed")));

        let coll = Arc::new(SubtypeCollection::<dyn Encoder>::new(api()));
        coll.insert(named("enc1"), Arc::new(working)).unwrap();
        coll.insert(named("enc2"), Arc::new(failing)).unwrap();
        let (addr, _shutdown) = serve(coll).await;

        let ctx = CancellationToken::new();
        let conn = dial(&ctx, &addr.to_string(), DialOptions::default()).await.unwrap();

        let enc1 = EncoderClient::new(conn.clone(), named("enc1"));
        let mut extra = Extra::new();
        extra.insert("foo".into(), json!("bar"));
        extra.insert("baz".into(), json!([1.0, 2.0, 3.0]));
        let (pos, kind) = enc1
            .get_position(&ctx, PositionType::Unspecified, &extra)
            .await
            .unwrap();
        assert_eq!(pos, 42.0);
        assert_eq!(kind, PositionType::Unspecified);
        assert_eq!(*seen_extra.lock(), extra);
        assert!(enc1.reset_position(&ctx, &Extra::new()).await.is_ok());

        let mut cmd = Command::new();
        cmd.insert("command".into(), json!("test"));
        cmd.insert("data".into(), json!(500));
        assert_eq!(enc1.do_command(&ctx, cmd.clone()).await.unwrap(), cmd);

        let enc2 = EncoderClient::new(conn.clone(), named("enc2"));
        let err = enc2
            .get_position(&ctx, PositionType::Unspecified, &Extra::new())
            .await
            .unwrap_err();
        assert_eq!(err, RdkError::fault("enc2", "position unavailable"));
        assert!(enc2.reset_position(&ctx, &Extra::new()).await.is_err());

        let enc3 = EncoderClient::new(conn, named("enc3"));
        let err = enc3
            .get_position(&ctx, PositionType::Unspecified, &Extra::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RdkError::NotFound(_)));
    }

    #[tokio::test]
    async fn remote_prefix_is_stripped_on_the_wire() {
        let working = InjectEncoder::new(named("enc1"))
            .on_get_position(|_, _| Ok((7.0, PositionType::Ticks)));
        let coll = Arc::new(SubtypeCollection::<dyn Encoder>::new(api()));
        coll.insert(named("enc1"), Arc::new(working)).unwrap();
        let (addr, _shutdown) = serve(coll).await;

        let ctx = CancellationToken::new();
        let conn = dial(&ctx, &addr.to_string(), DialOptions::default()).await.unwrap();
        let client = EncoderClient::new(conn, named("enc1").prepend_remote("base"));
        assert_eq!(client.name().short_name(), "base:enc1");
        let (pos, kind) = client
            .get_position(&ctx, PositionType::Ticks, &Extra::new())
            .await
            .unwrap();
        assert_eq!((pos, kind), (7.0, PositionType::Ticks));
        assert!(matches!(
            client.reconfigure(
                &rdk_resource::Dependencies::new(client.name()),
                &rdk_resource::ResourceConfig::new(api(), rdk_resource::Model::builtin("fake"), "enc1"),
            ),
            Err(RdkError::MustRebuild(_))
        ));
    }
}
