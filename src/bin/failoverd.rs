//! Entry point for the failover core. Parses configuration, resolves this
//! host's identifier, dispatches on [`Role`], and wires the event loop to
//! the process's shutdown signal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use pbs_failover::config::Config;
use pbs_failover::context::FailoverContext;
use pbs_failover::error::{exit_code, Error};
use pbs_failover::fencing::ProcessFencingHook;
use pbs_failover::license::{HostId, LicenseFile};
use pbs_failover::liveness::{ActiveMarker, LivenessFile};
use pbs_failover::primary::{self, PrimaryController, RunOutcome};
use pbs_failover::secondary::{LoopExit, SecondaryMachine};
use pbs_failover::shutdown::Shutdown;
use pbs_failover::Role;

#[derive(Parser)]
#[command(name = "pbs-failoverd", version, about = "Batch-scheduler failover coordination core")]
struct Cli {
    /// This process's role in the primary/secondary pair.
    #[arg(long, value_enum)]
    role: RoleArg,

    /// Path to the TOML configuration file.
    #[arg(long, env = "PBS_FAILOVER_CONF")]
    config: PathBuf,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RoleArg {
    Primary,
    Secondary,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            debug_assert!(e.is_terminal(), "only Protocol/Fatal errors should reach main");
            error!(error = %e, "fatal error");
            ExitCode::from(exit_code::REGISTRATION_REJECTED as u8)
        }
    }
}

async fn run() -> Result<i32, Error> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config).await?);
    let priv_dir = config.priv_dir();
    tokio::fs::create_dir_all(&priv_dir)
        .await
        .map_err(|e| Error::fatal(format!("cannot create {}: {e}", priv_dir.display())))?;

    let local_hostname = hostname::get()
        .map_err(|e| Error::fatal(format!("cannot resolve local hostname: {e}")))?
        .to_string_lossy()
        .into_owned();
    let local_host_id = HostId::from_hostname(&local_hostname);

    let liveness = LivenessFile::new(&priv_dir);
    let marker = ActiveMarker::new(&priv_dir);
    let license = LicenseFile::new(&priv_dir);

    let role = match cli.role {
        RoleArg::Primary => Role::Primary,
        RoleArg::Secondary => Role::Secondary,
    };

    match role {
        Role::Primary => run_primary(config, local_host_id, liveness, marker).await,
        Role::Secondary => {
            run_secondary(config, local_host_id, local_hostname, liveness, marker, license).await
        }
    }
}

async fn run_primary(
    config: Arc<Config>,
    local_host_id: HostId,
    liveness: LivenessFile,
    marker: ActiveMarker,
) -> Result<i32, Error> {
    // If the marker was left by a secondary that took over while we were
    // down, reclaim the floor before resuming normal startup.
    if marker.exists().await? {
        info!("secondary_active marker present at startup, reclaiming the active role");
        if let Err(e) = primary::takeover_from_secondary(&config).await {
            error!(error = %e, "secondary refused to go idle during primary reclaim");
            return Ok(exit_code::SECONDARY_REFUSED_IDLE);
        }
    }

    let listener = TcpListener::bind(config.primary_addr()).await?;
    let ctx = FailoverContext::new(Role::Primary, config.clone(), local_host_id);
    let controller = PrimaryController::new(
        ctx,
        liveness,
        marker,
        listener,
        config.shutdown_policy,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    match controller.run(Shutdown::new(shutdown_rx)).await? {
        RunOutcome::Shutdown => Ok(exit_code::CLEAN),
        RunOutcome::Displaced => {
            info!("requesting process restart to run takeover-from-secondary");
            Ok(exit_code::REGISTRATION_REJECTED)
        }
    }
}

async fn run_secondary(
    config: Arc<Config>,
    local_host_id: HostId,
    local_hostname: String,
    liveness: LivenessFile,
    marker: ActiveMarker,
    license: LicenseFile,
) -> Result<i32, Error> {
    let ctx = FailoverContext::new(Role::Secondary, config.clone(), local_host_id);
    let fencing = Arc::new(ProcessFencingHook::new(config.priv_dir(), &config.pbs_home_path));

    let priv_dir = config.priv_dir();
    let machine = SecondaryMachine::new(ctx, liveness, marker, license, fencing, local_hostname);

    match machine.run().await? {
        LoopExit::Exit(code) => Ok(code),
        LoopExit::BecomeActive => {
            info!("assuming active role; running as primary controller for future secondaries");
            let ctx = FailoverContext::new(Role::Secondary, config.clone(), local_host_id);
            let listener = TcpListener::bind(config.primary_addr()).await?;
            let controller = PrimaryController::new(
                ctx,
                LivenessFile::new(&priv_dir),
                ActiveMarker::new(&priv_dir),
                listener,
                config.shutdown_policy,
            );

            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            tokio::spawn(async move {
                let _ = signal::ctrl_c().await;
                let _ = shutdown_tx.send(());
            });

            match controller.run(Shutdown::new(shutdown_rx)).await? {
                RunOutcome::Shutdown => Ok(exit_code::CLEAN),
                RunOutcome::Displaced => Ok(exit_code::REGISTRATION_REJECTED),
            }
        }
    }
}
