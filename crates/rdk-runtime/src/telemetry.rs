//! Logging and trace export for robot processes.
//!
//! Call [`init_tracing`] once at process startup.  Robot startup, resource
//! construction, shutdown, and every RPC connection and call open their own
//! spans (`robot.start`, `build_one`, `robot.close`, `rpc.conn`,
//! `rpc.call`); exported spans carry the robot and listen address from
//! [`TelemetryConfig`] as resource attributes.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `RDK_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! use rdk_runtime::telemetry::{TelemetryConfig, init_tracing};
//!
//! let _guard = init_tracing(
//!     &TelemetryConfig::new("rdk")
//!         .with_robot("rover")
//!         .with_rpc_listen("0.0.0.0:8080"),
//! );
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Resource attribute naming the robot a process runs.
pub const ROBOT_KEY: &str = "rdk.robot";
/// Resource attribute holding the RPC listen address.
pub const RPC_LISTEN_KEY: &str = "rdk.rpc.listen";

/// Identity attached to everything a process exports.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub robot: Option<String>,
    pub rpc_listen: Option<String>,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            robot: None,
            rpc_listen: None,
        }
    }

    pub fn with_robot(mut self, robot: impl Into<String>) -> Self {
        self.robot = Some(robot.into());
        self
    }

    pub fn with_rpc_listen(mut self, addr: impl Into<String>) -> Self {
        self.rpc_listen = Some(addr.into());
        self
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))];
        if let Some(robot) = &self.robot {
            attributes.push(KeyValue::new(ROBOT_KEY, robot.clone()));
        }
        if let Some(addr) = &self.rpc_listen {
            attributes.push(KeyValue::new(RPC_LISTEN_KEY, addr.clone()));
        }
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(attributes)
            .build()
    }
}

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// Spans go to an OTLP/HTTP collector when `OTEL_EXPORTER_OTLP_ENDPOINT` is
/// set; logs always go to stderr.
///
/// Hold the returned [`TracerProviderGuard`] until the process exits.
pub fn init_tracing(config: &TelemetryConfig) -> TracerProviderGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("RDK_LOG_FORMAT").as_deref() == Ok("json");

    let provider = build_provider(config);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone())));

    let (json_layer, compact_layer) = if use_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().compact().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the OTel [`SdkTracerProvider`] down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[rdk] trace provider shutdown error: {e}");
            }
        }
    }
}

/// `None` when no endpoint is configured or the exporter cannot be built.
fn build_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[rdk] OTLP exporter init failed: {e}"))
        .ok()?;

    Some(
        SdkTracerProvider::builder()
            .with_resource(config.resource())
            // No runtime exists yet when the CLI initialises tracing.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Key, Value};

    #[test]
    fn no_provider_without_endpoint() {
        // SAFETY: no other test in this crate touches this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider(&TelemetryConfig::new("rdk-test")).is_none());
    }

    #[test]
    fn resource_names_the_robot_and_its_server() {
        let resource = TelemetryConfig::new("rdk")
            .with_robot("rover")
            .with_rpc_listen("127.0.0.1:8080")
            .resource();
        assert_eq!(
            resource.get(&Key::new("service.name")),
            Some(Value::from("rdk"))
        );
        assert_eq!(resource.get(&Key::new(ROBOT_KEY)), Some(Value::from("rover")));
        assert_eq!(
            resource.get(&Key::new(RPC_LISTEN_KEY)),
            Some(Value::from("127.0.0.1:8080"))
        );
    }

    #[test]
    fn unnamed_robot_adds_no_attribute() {
        let resource = TelemetryConfig::new("rdk").resource();
        assert!(resource.get(&Key::new(ROBOT_KEY)).is_none());
    }

    #[test]
    fn empty_guard_drops_cleanly() {
        drop(TracerProviderGuard(None));
    }
}
