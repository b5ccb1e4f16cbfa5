//! The `fake` encoder model.
//!
//! Position is integrated from a commanded speed (ticks per minute) each time
//! it is read, so no background task is needed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use rdk_resource::{Dependencies, Registration, Resource, ResourceConfig, ResourceHandle};
use rdk_types::{Extra, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Encoder, PositionType, Properties};

/// Extra controls of a fake encoder, used by fake motors to simulate motion.
#[async_trait]
pub trait FakeEncoder: Encoder {
    /// Set the speed in ticks per minute.
    async fn set_speed(&self, ctx: &CancellationToken, speed: f64) -> Result<(), RdkError>;

    /// Jump to an absolute tick count.
    async fn set_position(&self, ctx: &CancellationToken, position: i64) -> Result<(), RdkError>;
}

struct Motion {
    position: f64,
    speed: f64,
    updated: Instant,
}

impl Motion {
    fn advance(&mut self) {
        let now = Instant::now();
        let minutes = now.duration_since(self.updated).as_secs_f64() / 60.0;
        self.position += self.speed * minutes;
        self.updated = now;
    }
}

pub struct FakeEncoderModel {
    name: ResourceName,
    motion: Mutex<Motion>,
}

impl FakeEncoderModel {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            motion: Mutex::new(Motion {
                position: 0.0,
                speed: 0.0,
                updated: Instant::now(),
            }),
        }
    }

    /// Handle exposing both the `Encoder` and the `FakeEncoder` capability.
    pub fn into_handle(self) -> ResourceHandle {
        let enc = Arc::new(self);
        ResourceHandle::new::<dyn Encoder>(Arc::clone(&enc) as Arc<dyn Encoder>)
            .with_view::<dyn FakeEncoder>(enc)
    }
}

pub fn registration() -> Registration {
    Registration::new(|_deps: &Dependencies, conf: &ResourceConfig| {
        Ok(FakeEncoderModel::new(conf.resource_name()).into_handle())
    })
}

impl Resource for FakeEncoderModel {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    fn reconfigure(&self, _deps: &Dependencies, _config: &ResourceConfig) -> Result<(), RdkError> {
        Ok(())
    }
}

#[async_trait]
impl Encoder for FakeEncoderModel {
    async fn get_position(
        &self,
        _ctx: &CancellationToken,
        position_type: PositionType,
        _extra: &Extra,
    ) -> Result<(f64, PositionType), RdkError> {
        if position_type == PositionType::Degrees {
            return Err(RdkError::InvalidArgument(
                "encoder does not support angular degrees".to_string(),
            ));
        }
        let mut motion = self.motion.lock();
        motion.advance();
        Ok((motion.position.trunc(), PositionType::Ticks))
    }

    async fn reset_position(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<(), RdkError> {
        let mut motion = self.motion.lock();
        motion.advance();
        motion.position = 0.0;
        Ok(())
    }

    async fn get_properties(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<Properties, RdkError> {
        Ok(Properties {
            ticks_count_supported: true,
            angle_degrees_supported: false,
        })
    }
}

#[async_trait]
impl FakeEncoder for FakeEncoderModel {
    async fn set_speed(&self, _ctx: &CancellationToken, speed: f64) -> Result<(), RdkError> {
        let mut motion = self.motion.lock();
        motion.advance();
        motion.speed = speed;
        debug!(encoder = %self.name, speed, "fake encoder speed set");
        Ok(())
    }

    async fn set_position(&self, _ctx: &CancellationToken, position: i64) -> Result<(), RdkError> {
        let mut motion = self.motion.lock();
        motion.advance();
        motion.position = position as f64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::named;
    use std::time::Duration;

    #[tokio::test]
    async fn position_follows_speed() {
        let handle = FakeEncoderModel::new(named("e1")).into_handle();
        let enc = handle.downcast::<dyn FakeEncoder>().unwrap();
        let ctx = CancellationToken::new();

        let (pos, kind) = enc.get_position(&ctx, PositionType::Unspecified, &Extra::new()).await.unwrap();
        assert_eq!((pos, kind), (0.0, PositionType::Ticks));

        // 600_000 ticks per minute is 10 ticks per millisecond.
        enc.set_speed(&ctx, 600_000.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        enc.set_speed(&ctx, 0.0).await.unwrap();
        let (pos, _) = enc.get_position(&ctx, PositionType::Ticks, &Extra::new()).await.unwrap();
        assert!(pos >= 500.0, "position {pos}");

        enc.set_position(&ctx, 12).await.unwrap();
        let (pos, _) = enc.get_position(&ctx, PositionType::Ticks, &Extra::new()).await.unwrap();
        assert_eq!(pos, 12.0);

        enc.reset_position(&ctx, &Extra::new()).await.unwrap();
        let (pos, _) = enc.get_position(&ctx, PositionType::Ticks, &Extra::new()).await.unwrap();
        assert_eq!(pos, 0.0);
    }

    #[tokio::test]
    async fn degrees_are_unsupported() {
        let enc = FakeEncoderModel::new(named("e1"));
        let err = enc
            .get_position(&CancellationToken::new(), PositionType::Degrees, &Extra::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RdkError::InvalidArgument(_)));
    }

    #[test]
    fn handle_exposes_both_capabilities() {
        let handle = FakeEncoderModel::new(named("e1")).into_handle();
        assert!(handle.implements::<dyn Encoder>());
        assert!(handle.implements::<dyn FakeEncoder>());
    }
}
