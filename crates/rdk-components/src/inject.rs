//! Test doubles whose behavior is supplied per test as closures.
//!
//! A method without a closure answers [`RdkError::Unimplemented`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rdk_resource::Resource;
use rdk_types::{Command, Extra, RdkError, ResourceName};
use tokio_util::sync::CancellationToken;

use crate::encoder::{self, Encoder, PositionType};
use crate::generic::Generic;
use crate::motor::{self, Motor};

type DoFn = Box<dyn Fn(Command) -> Result<Command, RdkError> + Send + Sync>;

fn unimplemented<T>(method: &str) -> Result<T, RdkError> {
    Err(RdkError::Unimplemented(method.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

type GetPositionFn =
    Box<dyn Fn(PositionType, &Extra) -> Result<(f64, PositionType), RdkError> + Send + Sync>;
type ResetFn = Box<dyn Fn() -> Result<(), RdkError> + Send + Sync>;

pub struct InjectEncoder {
    name: ResourceName,
    get_position: Option<GetPositionFn>,
    reset_position: Option<ResetFn>,
    do_command: Option<DoFn>,
}

impl InjectEncoder {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            get_position: None,
            reset_position: None,
            do_command: None,
        }
    }

    pub fn on_get_position<F>(mut self, f: F) -> Self
    where
        F: Fn(PositionType, &Extra) -> Result<(f64, PositionType), RdkError> + Send + Sync + 'static,
    {
        self.get_position = Some(Box::new(f));
        self
    }

    pub fn on_reset_position<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<(), RdkError> + Send + Sync + 'static,
    {
        self.reset_position = Some(Box::new(f));
        self
    }

    pub fn on_do_command<F>(mut self, f: F) -> Self
    where
        F: Fn(Command) -> Result<Command, RdkError> + Send + Sync + 'static,
    {
        self.do_command = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl Resource for InjectEncoder {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, _ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        match &self.do_command {
            Some(f) => f(cmd),
            None => unimplemented("DoCommand"),
        }
    }
}

#[async_trait]
impl Encoder for InjectEncoder {
    async fn get_position(
        &self,
        _ctx: &CancellationToken,
        position_type: PositionType,
        extra: &Extra,
    ) -> Result<(f64, PositionType), RdkError> {
        match &self.get_position {
            Some(f) => f(position_type, extra),
            None => unimplemented("GetPosition"),
        }
    }

    async fn reset_position(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<(), RdkError> {
        match &self.reset_position {
            Some(f) => f(),
            None => unimplemented("ResetPosition"),
        }
    }

    async fn get_properties(
        &self,
        _ctx: &CancellationToken,
        _extra: &Extra,
    ) -> Result<encoder::Properties, RdkError> {
        Ok(encoder::Properties {
            ticks_count_supported: true,
            angle_degrees_supported: false,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Motor
// ─────────────────────────────────────────────────────────────────────────────

type SetPowerFn = Box<dyn Fn(f64, &Extra) -> Result<(), RdkError> + Send + Sync>;

/// Records every call it receives as `"Method"` strings.
pub struct InjectMotor {
    name: ResourceName,
    set_power: Option<SetPowerFn>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl InjectMotor {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            set_power: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on_set_power<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &Extra) -> Result<(), RdkError> + Send + Sync + 'static,
    {
        self.set_power = Some(Box::new(f));
        self
    }

    fn record(&self, method: &str) {
        self.calls.lock().push(method.to_string());
    }
}

impl Resource for InjectMotor {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }
}

#[async_trait]
impl Motor for InjectMotor {
    async fn set_power(&self, _ctx: &CancellationToken, power_pct: f64, extra: &Extra) -> Result<(), RdkError> {
        self.record("SetPower");
        match &self.set_power {
            Some(f) => f(power_pct, extra),
            None => unimplemented("SetPower"),
        }
    }

    async fn go_for(&self, _ctx: &CancellationToken, _rpm: f64, _revs: f64, _extra: &Extra) -> Result<(), RdkError> {
        self.record("GoFor");
        unimplemented("GoFor")
    }

    async fn go_to(&self, _ctx: &CancellationToken, _rpm: f64, _pos: f64, _extra: &Extra) -> Result<(), RdkError> {
        self.record("GoTo");
        unimplemented("GoTo")
    }

    async fn reset_zero_position(
        &self,
        _ctx: &CancellationToken,
        _offset: f64,
        _extra: &Extra,
    ) -> Result<(), RdkError> {
        self.record("ResetZeroPosition");
        unimplemented("ResetZeroPosition")
    }

    async fn position(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<f64, RdkError> {
        self.record("GetPosition");
        unimplemented("GetPosition")
    }

    async fn properties(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<motor::Properties, RdkError> {
        self.record("GetProperties");
        Ok(motor::Properties::default())
    }

    async fn stop(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<(), RdkError> {
        self.record("Stop");
        Ok(())
    }

    async fn is_powered(&self, _ctx: &CancellationToken, _extra: &Extra) -> Result<(bool, f64), RdkError> {
        self.record("IsPowered");
        Ok((false, 0.0))
    }

    async fn is_moving(&self, _ctx: &CancellationToken) -> Result<bool, RdkError> {
        self.record("IsMoving");
        Ok(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic
// ─────────────────────────────────────────────────────────────────────────────

pub struct InjectGeneric {
    name: ResourceName,
    do_command: Option<DoFn>,
}

impl InjectGeneric {
    pub fn new(name: ResourceName) -> Self {
        Self { name, do_command: None }
    }

    pub fn on_do_command<F>(mut self, f: F) -> Self
    where
        F: Fn(Command) -> Result<Command, RdkError> + Send + Sync + 'static,
    {
        self.do_command = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl Resource for InjectGeneric {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn do_command(&self, _ctx: &CancellationToken, cmd: Command) -> Result<Command, RdkError> {
        match &self.do_command {
            Some(f) => f(cmd),
            None => unimplemented("DoCommand"),
        }
    }
}

impl Generic for InjectGeneric {}
