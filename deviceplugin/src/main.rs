// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The AF_XDP device plugin daemon.
//!
//! Loads and validates the configuration, discovers the host devices, builds
//! the pools and serves each of them with a [`PoolManager`] until the process
//! is told to stop.

#![deny(clippy::all, clippy::pedantic)]

use afxdp_deviceplugin::{Collaborators, PoolError, PoolManager, SeqpacketServerFactory};
use clap::Parser;
use config::constants::{LOG_DIR, SOCKET_DIR};
use config::{ConfigError, ConfigFile, build_pools, load_config_from_file};
use interface_manager::bpf::{DEFAULT_PIN_DIR, PinnedXskMapLoader, SocketBusyPoll};
use interface_manager::directory::DeviceDirectory;
use interface_manager::handler::NetError;
use interface_manager::kernel::KernelNetHandler;
use k8s_intf::{FilePodResources, FileRegistrar};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "afxdp-deviceplugin")]
#[command(about = "Serve AF_XDP capable network devices to Kubernetes pods", long_about = None)]
struct Args {
    #[arg(
        long,
        value_name = "FILE",
        default_value = "/etc/afxdp/config.json",
        help = "Configuration file (.json, .yaml or .yml)"
    )]
    config: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        default_value = "/run/afxdp/pod-resources.json",
        help = "Pod resources snapshot kept current by the kubelet front end"
    )]
    pod_resources: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        default_value = "/run/afxdp/registrations",
        help = "Directory registration requests are written to for the kubelet front end"
    )]
    registration_dir: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        default_value = SOCKET_DIR,
        help = "Host directory of the control-plane sockets"
    )]
    socket_dir: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_PIN_DIR,
        help = "bpffs directory holding the pinned xsk maps, one sub directory per interface"
    )]
    pin_dir: PathBuf,

    #[arg(
        long,
        value_name = "NAME",
        help = "Node name used to apply node selectors; the host name if absent"
    )]
    hostname: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("failed to set up logging: {0}")]
    Logging(#[from] tracectl::TraceCtlError),
    #[error("failed to get the host name: {0}")]
    Hostname(String),
    #[error("device discovery failed: {0}")]
    Discovery(#[from] NetError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),
}

fn local_hostname() -> Result<String, DaemonError> {
    let name = nix::unistd::gethostname().map_err(|e| DaemonError::Hostname(e.desc().to_owned()))?;
    name.into_string()
        .map_err(|name| DaemonError::Hostname(format!("{name:?} is not valid text")))
}

fn init_logging(config: &ConfigFile) -> Result<(), DaemonError> {
    let level = tracectl::parse_level(config.log_level.as_directive())?;
    let log_file = config.log_file.as_ref().map(|name| Path::new(LOG_DIR).join(name));
    tracectl::init_logging(level, log_file.as_deref())?;
    Ok(())
}

/// Build the pools of `config` from the devices `with.net` sees and register
/// every pool with the kubelet.
async fn start(
    config: &ConfigFile,
    hostname: &str,
    with: &Collaborators,
) -> Result<Vec<PoolManager>, DaemonError> {
    let mut directory = DeviceDirectory::discover(with.net.clone()).await?;
    let pools = build_pools(config, &mut directory, hostname).await;
    let mut managers = Vec::with_capacity(pools.len());
    for pool in pools {
        let mut manager = PoolManager::new(pool, with.clone());
        manager.init().await?;
        managers.push(manager);
    }
    Ok(managers)
}

async fn stop(managers: &mut [PoolManager]) {
    for manager in managers {
        let outcomes = manager.terminate().await;
        info!(
            "Pool {}: {} control-plane servers stopped",
            manager.name(),
            outcomes.len()
        );
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<(), DaemonError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map_err(DaemonError::Signal)?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let config = load_config_from_file(&args.config)?;
    init_logging(&config)?;
    let hostname = match args.hostname {
        Some(name) => name,
        None => local_hostname()?,
    };
    info!(" ━━━━━━ AF_XDP device plugin on '{hostname}' started ━━━━━━");

    let with = Collaborators {
        net: Arc::new(KernelNetHandler::default()),
        loader: Arc::new(PinnedXskMapLoader::new(&args.pin_dir)),
        busy_poll: Arc::new(SocketBusyPoll),
        pod_resources: Arc::new(FilePodResources::new(&args.pod_resources)),
        registrar: Arc::new(FileRegistrar::new(&args.registration_dir)),
        servers: Arc::new(SeqpacketServerFactory::new(&args.socket_dir)),
    };
    let mut managers = start(&config, &hostname, &with).await?;
    info!("Serving {} pools", managers.len());

    let signalled = shutdown_signal().await;
    info!("Shutting down device plugin");
    stop(&mut managers).await;
    signalled
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Device plugin failed: {e}");
        eprintln!("Device plugin failed: {e}");
        std::process::exit(1);
    }
}
