//! `rdk-runtime` – assembles a robot from its configuration.
//!
//! # Modules
//!
//! - [`config`] – [`RobotConfig`]: components, services, remotes and the
//!   `partial_start` switch.
//! - [`robot`] – [`LocalRobot`]: dependency-ordered construction, per-resource
//!   reconfiguration, remote mounting and orderly shutdown.  It implements
//!   [`Robot`][rdk_resource::Robot], so every API's `from_robot` helper works
//!   against it.
//! - [`service`] – the `rdk:service:robot` RPC service other robots use to
//!   discover this one's resources.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export, labelled by a
//!   [`TelemetryConfig`][telemetry::TelemetryConfig].

pub mod config;
pub mod robot;
pub mod service;
pub mod telemetry;

pub use config::{NetworkConfig, RemoteConfig, RobotConfig};
pub use robot::LocalRobot;
