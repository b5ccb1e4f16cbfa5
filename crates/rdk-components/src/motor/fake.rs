//! The `fake` motor model.
//!
//! Pretends to turn by tracking a power level.  When wired to a `fake`
//! encoder it drives that encoder's speed, so position reporting and
//! `go_to` behave like a real encoded motor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rdk_operation::OperationManager;
use rdk_resource::{
    AttributeValidator, Dependencies, Registration, Resource, ResourceConfig, ResourceHandle,
};
use rdk_types::{Extra, RdkError, ResourceName};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Motor, Properties, zero_rpm_error};
use crate::encoder::PositionType;
use crate::encoder::fake::FakeEncoder;

pub const DEFAULT_MAX_RPM: f64 = 100.0;

/// Below this magnitude the motor counts as off.
const POWER_EPSILON: f64 = 0.005;

const GO_TO_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FakeMotorAttrs {
    /// Board the motor is wired to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    /// A `fake` encoder to drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
    /// Defaults to [`DEFAULT_MAX_RPM`] when zero.
    #[serde(default)]
    pub max_rpm: f64,
    #[serde(default)]
    pub ticks_per_rotation: i64,
    #[serde(default)]
    pub direction_flip: bool,
}

impl AttributeValidator for FakeMotorAttrs {
    fn validate(&self, path: &str) -> Result<Vec<String>, RdkError> {
        let mut deps = Vec::new();
        if self.max_rpm < 0.0 {
            return Err(RdkError::config(path, "max_rpm must not be negative"));
        }
        if let Some(board) = &self.board {
            deps.push(board.clone());
        }
        if let Some(encoder) = &self.encoder {
            if self.ticks_per_rotation <= 0 {
                return Err(RdkError::config(
                    path,
                    "need positive ticks_per_rotation for encoded motor",
                ));
            }
            deps.push(encoder.clone());
        }
        Ok(deps)
    }
}

pub fn registration() -> Registration {
    Registration::with_attributes::<FakeMotorAttrs, _>(|deps: &Dependencies, conf: &ResourceConfig| {
        let attrs = conf.native::<FakeMotorAttrs>()?;
        let motor = FakeMotor::new(conf.resource_name(), deps, attrs)?;
        Ok(ResourceHandle::new::<dyn Motor>(Arc::new(motor)))
    })
}

/// `(power_pct, wait, direction)` for turning `revolutions` at `rpm`.
///
/// A zero wait means "run until stopped".
fn go_for_math(max_rpm: f64, rpm: f64, revolutions: f64) -> (f64, Duration, f64) {
    let rpm = rpm.clamp(-max_rpm, max_rpm);
    if rpm == 0.0 {
        return (0.0, Duration::ZERO, revolutions.signum());
    }
    if revolutions == 0.0 {
        return (rpm / max_rpm, Duration::ZERO, 1.0);
    }
    let dir = (rpm * revolutions).signum();
    let power_pct = rpm.abs() / max_rpm * dir;
    let wait = Duration::from_secs_f64((revolutions / rpm).abs() * 60.0);
    (power_pct, wait, dir)
}

struct Wiring {
    max_rpm: f64,
    ticks_per_rotation: i64,
    direction_flip: bool,
    encoder: Option<Arc<dyn FakeEncoder>>,
    // Held so the board outlives the motor.
    _board: Option<ResourceHandle>,
}

impl Wiring {
    fn new(name: &ResourceName, deps: &Dependencies, attrs: &FakeMotorAttrs) -> Result<Self, RdkError> {
        let board = match &attrs.board {
            Some(board) => Some(deps.lookup(board)?.clone()),
            None => None,
        };
        let encoder = match &attrs.encoder {
            Some(encoder) => Some(deps.lookup(encoder)?.downcast::<dyn FakeEncoder>()?),
            None => None,
        };
        let max_rpm = if attrs.max_rpm == 0.0 {
            info!(motor = %name, default = DEFAULT_MAX_RPM, "max_rpm not set, using default");
            DEFAULT_MAX_RPM
        } else {
            attrs.max_rpm
        };
        Ok(Self {
            max_rpm,
            ticks_per_rotation: attrs.ticks_per_rotation,
            direction_flip: attrs.direction_flip,
            encoder,
            _board: board,
        })
    }
}

struct State {
    power_pct: f64,
    wiring: Wiring,
}

pub struct FakeMotor {
    name: ResourceName,
    state: Mutex<State>,
    op_mgr: OperationManager,
}

impl FakeMotor {
    pub fn new(name: ResourceName, deps: &Dependencies, attrs: &FakeMotorAttrs) -> Result<Self, RdkError> {
        let wiring = Wiring::new(&name, deps, attrs)?;
        Ok(Self {
            op_mgr: OperationManager::new(name.clone()),
            name,
            state: Mutex::new(State {
                power_pct: 0.0,
                wiring,
            }),
        })
    }

    fn encoder(&self) -> Result<(Arc<dyn FakeEncoder>, i64), RdkError> {
        let state = self.state.lock();
        match &state.wiring.encoder {
            Some(enc) => Ok((Arc::clone(enc), state.wiring.ticks_per_rotation)),
            None => Err(RdkError::fault(self.name.short_name(), "encoder is not defined")),
        }
    }

    fn max_rpm(&self) -> f64 {
        self.state.lock().wiring.max_rpm
    }

    /// Record `power_pct` and return the encoder speed it implies.
    fn apply_power(&self, power_pct: f64) -> Option<(Arc<dyn FakeEncoder>, f64)> {
        let mut state = self.state.lock();
        state.power_pct = power_pct;
        let wiring = &state.wiring;
        let flip = if wiring.direction_flip { -1.0 } else { 1.0 };
        wiring.encoder.as_ref().map(|enc| {
            let speed = wiring.max_rpm * power_pct * wiring.ticks_per_rotation as f64 * flip;
            (Arc::clone(enc), speed)
        })
    }
}

impl Resource for FakeMotor {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    fn reconfigure(&self, deps: &Dependencies, config: &ResourceConfig) -> Result<(), RdkError> {
        let attrs = config.native::<FakeMotorAttrs>()?;
        let wiring = Wiring::new(&self.name, deps, attrs)?;
        self.state.lock().wiring = wiring;
        Ok(())
    }
}

#[async_trait]
impl Motor for FakeMotor {
    async fn set_power(&self, ctx: &CancellationToken, power_pct: f64, _extra: &Extra) -> Result<(), RdkError> {
        self.op_mgr.cancel_running();
        debug!(motor = %self.name, power_pct, "set power");
        if let Some((enc, speed)) = self.apply_power(power_pct) {
            enc.set_speed(ctx, speed).await?;
        }
        Ok(())
    }

    async fn go_for(
        &self,
        ctx: &CancellationToken,
        rpm: f64,
        revolutions: f64,
        extra: &Extra,
    ) -> Result<(), RdkError> {
        if rpm == 0.0 {
            return Err(zero_rpm_error());
        }
        let (power_pct, wait, dir) = go_for_math(self.max_rpm(), rpm, revolutions);

        let target = match self.encoder() {
            Ok((enc, ticks_per_rotation)) => {
                let current = self.position(ctx, extra).await?;
                Some((enc, ticks_per_rotation, current + dir * revolutions.abs()))
            }
            Err(_) => None,
        };

        self.set_power(ctx, power_pct, extra).await?;
        if revolutions == 0.0 {
            return Ok(());
        }

        if self.op_mgr.new_timed_wait_op(ctx, wait).await {
            self.stop(ctx, extra).await?;
            if let Some((enc, ticks_per_rotation, final_pos)) = target {
                enc.set_position(ctx, (final_pos * ticks_per_rotation as f64) as i64)
                    .await?;
            }
        }
        Ok(())
    }

    async fn go_to(
        &self,
        ctx: &CancellationToken,
        rpm: f64,
        position_revolutions: f64,
        extra: &Extra,
    ) -> Result<(), RdkError> {
        let (enc, ticks_per_rotation) = self.encoder()?;
        if rpm == 0.0 {
            return Err(zero_rpm_error());
        }
        let current = self.position(ctx, extra).await?;
        let revolutions = position_revolutions - current;
        if revolutions == 0.0 {
            return Ok(());
        }
        let (power_pct, _, _) = go_for_math(self.max_rpm(), rpm.abs(), revolutions);
        self.set_power(ctx, power_pct, extra).await?;

        let target_ticks = position_revolutions * ticks_per_rotation as f64;
        let forward = revolutions > 0.0;
        let poll_ctx = ctx.clone();
        let poll_enc = Arc::clone(&enc);
        let reached = self
            .op_mgr
            .wait_for_success(ctx, GO_TO_POLL, move || {
                let enc = Arc::clone(&poll_enc);
                let ctx = poll_ctx.clone();
                async move {
                    let (ticks, _) = enc.get_position(&ctx, PositionType::Ticks, &Extra::new()).await?;
                    Ok::<_, RdkError>(if forward { ticks >= target_ticks } else { ticks <= target_ticks })
                }
            })
            .await;

        match reached {
            Ok(()) => {
                self.stop(ctx, extra).await?;
                enc.set_position(ctx, target_ticks as i64).await
            }
            // Superseded by a newer command.
            Err(RdkError::Canceled) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn reset_zero_position(&self, ctx: &CancellationToken, offset: f64, extra: &Extra) -> Result<(), RdkError> {
        let (enc, ticks_per_rotation) = self.encoder()?;
        if ticks_per_rotation == 0 {
            return Err(RdkError::fault(self.name.short_name(), "need nonzero ticks_per_rotation"));
        }
        enc.reset_position(ctx, extra).await?;
        if offset != 0.0 {
            enc.set_position(ctx, (-offset * ticks_per_rotation as f64) as i64)
                .await?;
        }
        Ok(())
    }

    async fn position(&self, ctx: &CancellationToken, extra: &Extra) -> Result<f64, RdkError> {
        let (enc, ticks_per_rotation) = self.encoder()?;
        if ticks_per_rotation == 0 {
            return Err(RdkError::fault(self.name.short_name(), "need nonzero ticks_per_rotation"));
        }
        let (ticks, _) = enc.get_position(ctx, PositionType::Unspecified, extra).await?;
        Ok(ticks / ticks_per_rotation as f64)
    }

    async fn properties(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<Properties, RdkError> {
        Ok(Properties {
            position_reporting: self.state.lock().wiring.encoder.is_some(),
        })
    }

    async fn stop(&self, ctx: &CancellationToken, _extra: &Extra) -> Result<(), RdkError> {
        self.op_mgr.cancel_running();
        debug!(motor = %self.name, "stop");
        if let Some((enc, speed)) = self.apply_power(0.0) {
            enc.set_speed(ctx, speed).await?;
        }
        Ok(())
    }

    async fn is_powered(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<(bool, f64), RdkError> {
        let power_pct = self.state.lock().power_pct;
        Ok((power_pct.abs() >= POWER_EPSILON, power_pct))
    }

    async fn is_moving(&self, _ctx: &CancellationToken) -> Result<bool, RdkError> {
        Ok(self.state.lock().power_pct.abs() >= POWER_EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdk_resource::Model;

    use crate::encoder::fake::FakeEncoderModel;
    use crate::encoder::{Encoder, named as encoder_named};
    use crate::motor::{api, named};

    fn encoded(tpr: i64) -> (FakeMotor, Arc<dyn FakeEncoder>) {
        let enc_handle = FakeEncoderModel::new(encoder_named("e1")).into_handle();
        let enc = enc_handle.downcast::<dyn FakeEncoder>().unwrap();
        let mut deps = Dependencies::new(named("m1"));
        deps.insert(enc_handle);
        let attrs = FakeMotorAttrs {
            encoder: Some("e1".to_string()),
            ticks_per_rotation: tpr,
            ..FakeMotorAttrs::default()
        };
        (FakeMotor::new(named("m1"), &deps, &attrs).unwrap(), enc)
    }

    #[test]
    fn go_for_math_cases() {
        let (p, w, d) = go_for_math(100.0, 50.0, 1.0);
        assert_eq!((p, w, d), (0.5, Duration::from_millis(1200), 1.0));

        let (p, _, d) = go_for_math(100.0, -50.0, 1.0);
        assert_eq!((p, d), (-0.5, -1.0));

        let (p, _, d) = go_for_math(100.0, -50.0, -1.0);
        assert_eq!((p, d), (0.5, 1.0));

        // Over max rpm is clamped.
        let (p, w, _) = go_for_math(100.0, 1000.0, 1.0);
        assert_eq!((p, w), (1.0, Duration::from_millis(600)));

        // Zero revolutions runs until stopped.
        let (p, w, _) = go_for_math(100.0, 25.0, 0.0);
        assert_eq!((p, w), (0.25, Duration::ZERO));
    }

    #[test]
    fn validation_requires_ticks_for_an_encoder() {
        let attrs = FakeMotorAttrs {
            encoder: Some("e1".to_string()),
            ..FakeMotorAttrs::default()
        };
        let err = attrs.validate("components.m1").unwrap_err();
        assert!(matches!(err, RdkError::ConfigValidation { .. }));

        let attrs = FakeMotorAttrs {
            board: Some("b1".to_string()),
            encoder: Some("e1".to_string()),
            ticks_per_rotation: 10,
            ..FakeMotorAttrs::default()
        };
        assert_eq!(attrs.validate("components.m1").unwrap(), vec!["b1", "e1"]);
    }

    #[tokio::test]
    async fn defaults_and_power() {
        let m = FakeMotor::new(named("m1"), &Dependencies::new(named("m1")), &FakeMotorAttrs::default()).unwrap();
        let ctx = CancellationToken::new();
        assert_eq!(m.max_rpm(), DEFAULT_MAX_RPM);
        assert_eq!(m.is_powered(&ctx, &Extra::new()).await.unwrap(), (false, 0.0));

        m.set_power(&ctx, -0.3, &Extra::new()).await.unwrap();
        assert_eq!(m.is_powered(&ctx, &Extra::new()).await.unwrap(), (true, -0.3));
        assert!(m.position(&ctx, &Extra::new()).await.is_err());
        assert!(!m.properties(&ctx, &Extra::new()).await.unwrap().position_reporting);
    }

    #[tokio::test]
    async fn go_for_with_encoder_lands_on_target() {
        let (m, enc) = encoded(100);
        let ctx = CancellationToken::new();
        assert!(m.properties(&ctx, &Extra::new()).await.unwrap().position_reporting);

        // 0.05 revolutions at 100 rpm takes 30ms.
        m.go_for(&ctx, 100.0, 0.05, &Extra::new()).await.unwrap();
        assert!(!m.is_moving(&ctx).await.unwrap());
        let (ticks, _) = enc.get_position(&ctx, PositionType::Ticks, &Extra::new()).await.unwrap();
        assert_eq!(ticks, 5.0);
        assert_eq!(m.position(&ctx, &Extra::new()).await.unwrap(), 0.05);
    }

    #[tokio::test]
    async fn set_power_preempts_go_for() {
        let (m, _enc) = encoded(100);
        let m = Arc::new(m);
        let ctx = CancellationToken::new();

        let mover = Arc::clone(&m);
        let moving_ctx = ctx.clone();
        let long_move = tokio::spawn(async move {
            // Ten seconds of turning unless something interrupts.
            mover.go_for(&moving_ctx, 60.0, 10.0, &Extra::new()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(m.is_moving(&ctx).await.unwrap());

        m.set_power(&ctx, 0.2, &Extra::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), long_move)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // The preempted move did not stop the motor on its way out.
        assert_eq!(m.is_powered(&ctx, &Extra::new()).await.unwrap(), (true, 0.2));
    }

    #[tokio::test]
    async fn go_to_reaches_position() {
        let (m, _enc) = encoded(100);
        let ctx = CancellationToken::new();
        tokio::time::timeout(Duration::from_secs(5), m.go_to(&ctx, 100.0, 0.05, &Extra::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.position(&ctx, &Extra::new()).await.unwrap(), 0.05);
        assert!(!m.is_moving(&ctx).await.unwrap());

        m.reset_zero_position(&ctx, 0.0, &Extra::new()).await.unwrap();
        assert_eq!(m.position(&ctx, &Extra::new()).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn failed_reconfigure_keeps_previous_wiring() {
        let (m, _enc) = encoded(100);
        let ctx = CancellationToken::new();

        // The new config names an encoder that was never supplied.
        let mut conf = ResourceConfig::new(api(), Model::builtin("fake"), "m1")
            .with_attribute("encoder", "e2")
            .with_attribute("ticks_per_rotation", 10);
        let registry = rdk_resource::Registry::new();
        registry
            .register(api(), Model::builtin("fake"), registration())
            .unwrap();
        rdk_resource::Resolver::new(&registry).validate(&mut conf).unwrap();

        let err = m.reconfigure(&Dependencies::new(named("m1")), &conf).unwrap_err();
        assert!(matches!(err, RdkError::DependencyNotFound { .. }));
        assert!(m.properties(&ctx, &Extra::new()).await.unwrap().position_reporting);
        assert_eq!(m.position(&ctx, &Extra::new()).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn encoder_must_be_a_fake_encoder() {
        let inject = crate::inject::InjectEncoder::new(encoder_named("e1"));
        let mut deps = Dependencies::new(named("m1"));
        deps.insert(ResourceHandle::new::<dyn Encoder>(Arc::new(inject)));
        let attrs = FakeMotorAttrs {
            encoder: Some("e1".to_string()),
            ticks_per_rotation: 10,
            ..FakeMotorAttrs::default()
        };
        let err = FakeMotor::new(named("m1"), &deps, &attrs).err().unwrap();
        assert!(matches!(err, RdkError::TypeMismatch { .. }));
    }
}
