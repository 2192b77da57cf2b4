// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/main.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the binary entry point for the CN stratum pool daemon. It
// parses arguments, loads settings, and wires the components together with
// explicit constructors: daemon client, job manager, template poller, hash
// pool, validator, stratum server, broadcaster, and the stats logger.

use clap::Parser;
use cn_pool::core::coin::CoinProfile;
use cn_pool::core::pow::PowRegistry;
use cn_pool::core::types::{Args, PoolSettings, PortConfig};
use cn_pool::daemon::client::{DaemonClient, DaemonRpc};
use cn_pool::daemon::poller::TemplatePoller;
use cn_pool::jobs::JobManager;
use cn_pool::server::banning::MemoryBanService;
use cn_pool::server::broadcast::run_broadcaster;
use cn_pool::server::{SessionRegistry, StratumServer};
use cn_pool::stats::{run_stats_logger, PoolStats};
use cn_pool::utils::clock::{Clock, SystemClock};
use cn_pool::validator::workers::HashWorkerPool;
use cn_pool::validator::ShareValidator;
use cn_pool::{MessageBus, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(err) = args.validate() {
        eprintln!("❌ Error: {}", err);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("❌ Error: {}", err);
            std::process::exit(1);
        }
    };
    let Some(profile) = CoinProfile::by_name(&settings.coin) else {
        eprintln!("❌ Error: unknown coin profile '{}'", settings.coin);
        std::process::exit(1);
    };

    info!("🚀 Starting CN stratum pool");
    info!("🪙 Coin profile: {} ({:?})", profile.name, profile.family);
    info!("📡 Daemon: {}", settings.daemon_url);
    info!(
        "🔌 Ports: {}",
        settings
            .ports
            .iter()
            .map(|p| p.port.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let cancel = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = MessageBus::new(settings.bus_capacity);

    let daemon = Arc::new(DaemonClient::new(
        &settings.daemon_url,
        Duration::from_secs(settings.daemon_timeout_secs),
        bus.clone(),
    )?);
    // connectivity probe; the poller keeps retrying either way
    match daemon.get_info().await {
        Ok(info) => info!("⛓️ Daemon at height {} (difficulty {})", info.height, info.difficulty),
        Err(e) => tracing::warn!("⚠️ Daemon not reachable yet: {}", e),
    }

    let job_manager = Arc::new(JobManager::new(profile.clone()));

    let hash_pool = HashWorkerPool::spawn(Arc::new(PowRegistry::with_builtins()), settings.hash_threads);
    let validator = Arc::new(ShareValidator::new(
        hash_pool,
        daemon.clone(),
        bus.clone(),
        clock.clone(),
        profile,
        &settings,
    ));

    let registry = SessionRegistry::new();
    let bans = Arc::new(MemoryBanService::new(settings.ban.clone(), clock.clone()));
    let stats = Arc::new(PoolStats::new());

    // template acquisition
    let poller = TemplatePoller::new(daemon.clone(), job_manager.clone(), &settings, cancel.clone());
    tokio::spawn(poller.run());

    // fan-out and liveness
    tokio::spawn(run_broadcaster(
        job_manager.clone(),
        registry.clone(),
        clock.clone(),
        Duration::from_secs(settings.connection_timeout_secs),
        cancel.clone(),
    ));

    // downstream consumer: summary logging
    tokio::spawn(run_stats_logger(
        stats,
        bus.clone(),
        registry.clone(),
        clock.clone(),
        cancel.clone(),
    ));

    // ctrl-c flips the root cancellation token
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("🛑 Shutdown requested");
                cancel.cancel();
            }
        });
    }

    let server =
        StratumServer::new(settings, job_manager, validator, registry, bans, bus, clock, cancel);
    server.run().await?;
    info!("👋 Pool stopped");
    Ok(())
}

/// Settings file plus CLI overrides
fn load_settings(args: &Args) -> Result<PoolSettings> {
    let mut settings: PoolSettings = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PoolSettings::default(),
    };
    if let Some(wallet) = &args.wallet {
        settings.pool_wallet = wallet.clone();
    }
    if let Some(daemon) = &args.daemon {
        settings.daemon_url = daemon.clone();
    }
    if let Some(coin) = &args.coin {
        settings.coin = coin.clone();
    }
    if args.threads != 0 {
        settings.hash_threads = args.threads;
    }
    if let Some(port) = args.port {
        if !settings.ports.iter().any(|p| p.port == port) {
            settings.ports.push(PortConfig { port, ..PortConfig::default() });
        }
    }
    if settings.pool_wallet.is_empty() {
        return Err("pool wallet is not configured (set pool_wallet or pass --wallet)".into());
    }
    if settings.ports.is_empty() {
        return Err("no stratum ports configured".into());
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_args() -> Args {
        Args::parse_from(["cnpoold", "--wallet", "w", "--daemon", "http://127.0.0.1:18081"])
    }

    #[test]
    fn test_defaults_with_cli_overrides() {
        let mut args = base_args();
        args.port = Some(4444);
        args.threads = 8;
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.pool_wallet, "w");
        assert_eq!(settings.daemon_url, "http://127.0.0.1:18081");
        assert_eq!(settings.hash_threads, 8);
        assert!(settings.ports.iter().any(|p| p.port == 4444));
    }

    #[test]
    fn test_settings_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "coin": "fast-hash",
                "pool_wallet": "configured-wallet",
                "poll_interval_ms": 250,
                "ports": [{{ "port": 5555, "vardiff": {{ "start_diff": 42 }} }}]
            }}"#
        )
        .unwrap();
        let args = Args::parse_from(["cnpoold", "--config", file.path().to_str().unwrap()]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.coin, "fast-hash");
        assert_eq!(settings.pool_wallet, "configured-wallet");
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.ports.len(), 1);
        assert_eq!(settings.ports[0].port, 5555);
        assert_eq!(settings.ports[0].vardiff.start_diff, 42);
        // unspecified fields keep their defaults
        assert_eq!(settings.ports[0].vardiff.target_time_secs, 10);
    }

    #[test]
    fn test_missing_wallet_is_an_error() {
        let args = Args::parse_from(["cnpoold", "--daemon", "http://127.0.0.1:18081"]);
        assert!(load_settings(&args).is_err());
    }
}

// Changelog:
// - v1.1.0 (2025-07-28): Push channel and stats logger wiring.
// - v1.0.0 (2025-07-12): Initial daemon binary.
//   - Purpose: Explicit constructor wiring of the pool components under a
//     single root cancellation token.
