//! `rdk` – runs a robot from a TOML config.
//!
//! ```text
//! rdk serve --config robot.toml [--listen 0.0.0.0:8080]
//! rdk validate --config robot.toml
//! ```
//!
//! `serve` builds every configured resource, exposes them over RPC and runs
//! until Ctrl-C, then closes the resources dependents-first.

mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rdk_resource::{Registry, Resolver};
use rdk_rpc::ServiceRegistry;
use rdk_runtime::telemetry::{TelemetryConfig, init_tracing};
use rdk_runtime::{LocalRobot, RobotConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rdk", version, about = "Run a robot from its config", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the robot and serve its resources until Ctrl-C.
    Serve {
        /// Path to the robot's TOML config.
        #[arg(long, short)]
        config: PathBuf,
        /// Address to listen on, overriding the config and `RDK_LISTEN`.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Check a config without building anything.
    Validate {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { config, listen } => serve_config(&config, listen).and_then(|cfg| {
            let telemetry = TelemetryConfig::new("rdk")
                .with_robot(robot_name(&config))
                .with_rpc_listen(cfg.network.listen.clone());
            // Before the runtime exists; the span exporter is synchronous.
            let _guard = init_tracing(&telemetry);
            tokio::runtime::Runtime::new()
                .map_err(|e| format!("Failed to start runtime: {e}"))
                .and_then(|rt| rt.block_on(serve(cfg)))
        }),
        Command::Validate { config } => {
            let _guard = init_tracing(&TelemetryConfig::new("rdk").with_robot(robot_name(&config)));
            validate(&config)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn builtins() -> Result<(Arc<Registry>, Arc<ServiceRegistry>), String> {
    let registry = Arc::new(Registry::new());
    let services = Arc::new(ServiceRegistry::new());
    rdk_components::register_builtins(&registry, &services).map_err(|e| e.to_string())?;
    Ok((registry, services))
}

fn validate(path: &Path) -> Result<(), String> {
    let cfg = config::load_from(path)?;
    let (registry, _services) = builtins()?;
    let failed = check(&cfg, &registry);
    if failed > 0 {
        return Err(format!("{failed} resource(s) failed validation"));
    }
    println!("  {} {}", "✓".green().bold(), "config is valid".bold());
    Ok(())
}

/// Print one line per resource; returns how many failed.
fn check(cfg: &RobotConfig, registry: &Registry) -> usize {
    if let Err(e) = cfg.validate_shape() {
        println!("  {} {}", "✗".red().bold(), e);
        return 1;
    }
    let resolver = Resolver::new(registry);
    let mut failed = 0;
    for conf in cfg.resources() {
        let mut conf = conf.clone();
        let name = conf.resource_name();
        match resolver.validate(&mut conf) {
            Ok(deps) if deps.is_empty() => {
                println!("  {} {} ({})", "✓".green(), name, conf.model.to_string().dimmed());
            }
            Ok(deps) => {
                println!(
                    "  {} {} ({}) depends on {}",
                    "✓".green(),
                    name,
                    conf.model.to_string().dimmed(),
                    deps.join(", ")
                );
            }
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), name, e);
                failed += 1;
            }
        }
    }
    for remote in &cfg.remotes {
        println!("  {} remote {} at {}", "•".cyan(), remote.name.bold(), remote.address);
    }
    failed
}

/// The robot is named after its config file.
fn robot_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "robot".to_string())
}

fn serve_config(path: &Path, listen: Option<String>) -> Result<RobotConfig, String> {
    let mut cfg = config::load_from(path)?;
    if let Some(listen) = listen {
        cfg.network.listen = listen;
    }
    Ok(cfg)
}

async fn serve(cfg: RobotConfig) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .network
        .listen
        .parse()
        .map_err(|e| format!("Invalid listen address {:?}: {e}", cfg.network.listen))?;

    let (registry, services) = builtins()?;
    let ctx = CancellationToken::new();
    let robot = LocalRobot::new(&ctx, registry, services, &cfg)
        .await
        .map_err(|e| format!("Robot failed to start: {e}"))?;

    for (what, err) in robot.start_failures() {
        println!("  {} {} left out: {}", "⚠".yellow().bold(), what, err);
    }
    println!(
        "  {} {} resource(s) live, serving on {}",
        "✓".green().bold(),
        rdk_resource::Robot::resource_names(&robot).len(),
        addr.to_string().bold()
    );

    let server = robot.rpc_server().map_err(|e| e.to_string())?;
    let shutdown = ctx.child_token();
    let mut server_task = tokio::spawn(server.serve(addr, shutdown.clone()));

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "could not listen for Ctrl-C");
            }
            println!();
            println!("{}", "  Ctrl-C received, shutting down …".yellow().bold());
            None
        }
        // Only returns on its own when the listener cannot be bound.
        finished = &mut server_task => Some(finished),
    };
    shutdown.cancel();
    let finished = match finished {
        Some(finished) => finished,
        None => server_task.await,
    };

    let served = match finished {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("Server task failed: {e}")),
    };
    robot.close().await;
    info!("robot closed");
    served
}
