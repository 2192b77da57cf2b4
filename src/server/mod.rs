// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/server/mod.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the stratum server shell for the CN stratum pool,
// located in the server subdirectory. It owns the session registry and the
// per-port TCP listeners, screens banned addresses at accept time, and
// spawns one session task per connection.
//
// Tree Location:
// - src/server/mod.rs (listeners and session registry)
// - Submodules: banning, broadcast, protocol, session

pub mod banning;
pub mod broadcast;
pub mod protocol;
pub mod session;

use crate::bus::MessageBus;
use crate::core::types::{PoolSettings, PortConfig};
use crate::jobs::JobManager;
use crate::server::banning::BanService;
use crate::server::session::{run_session, SessionContext, SessionShared};
use crate::utils::clock::Clock;
use crate::validator::ShareValidator;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Concurrent session table; iteration always goes through a snapshot
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<SessionShared>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<SessionShared>) {
        self.inner.write().insert(session.connection_id.clone(), session);
    }

    pub fn remove(&self, connection_id: &str) {
        self.inner.write().remove(connection_id);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot under the read lock; the broadcaster iterates the copy
    pub fn snapshot(&self) -> Vec<Arc<SessionShared>> {
        self.inner.read().values().cloned().collect()
    }
}

/// Stratum server: one listener per configured port over a shared registry
pub struct StratumServer {
    settings: PoolSettings,
    job_manager: Arc<JobManager>,
    validator: Arc<ShareValidator>,
    registry: SessionRegistry,
    bans: Arc<dyn BanService>,
    bus: MessageBus,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl StratumServer {
    pub fn new(
        settings: PoolSettings,
        job_manager: Arc<JobManager>,
        validator: Arc<ShareValidator>,
        registry: SessionRegistry,
        bans: Arc<dyn BanService>,
        bus: MessageBus,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self { settings, job_manager, validator, registry, bans, bus, clock, cancel }
    }

    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Bind every configured port and serve until cancelled
    pub async fn run(&self) -> crate::Result<()> {
        let mut listeners = Vec::new();
        for port_config in &self.settings.ports {
            let listener = TcpListener::bind(("0.0.0.0", port_config.port)).await?;
            info!(
                "🚀 Stratum listening on port {} (start diff {})",
                port_config.port, port_config.vardiff.start_diff
            );
            listeners.push(tokio::spawn(run_listener(
                listener,
                Arc::new(self.session_context(port_config.clone())),
            )));
        }
        for task in listeners {
            let _ = task.await;
        }
        Ok(())
    }

    fn session_context(&self, port_config: PortConfig) -> SessionContext {
        SessionContext {
            port_config,
            job_manager: self.job_manager.clone(),
            validator: self.validator.clone(),
            registry: self.registry.clone(),
            bans: self.bans.clone(),
            bus: self.bus.clone(),
            clock: self.clock.clone(),
            connection_timeout: Duration::from_secs(self.settings.connection_timeout_secs),
            max_share_age: Duration::from_secs(self.settings.max_share_age_secs),
            ban_config: self.settings.ban.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

async fn run_listener(listener: TcpListener, ctx: Arc<SessionContext>) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                info!("🛑 Listener stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if ctx.bans.is_banned(peer.ip()) {
                        warn!("🚫 Refused banned peer {}", peer.ip());
                        drop(stream);
                        continue;
                    }
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        run_session(stream, peer, ctx).await;
                    });
                }
                Err(e) => error!("⚠️ Accept error: {}", e),
            }
        }
    }
}


// Changelog:
// - v1.0.1 (2025-08-01): Thread the message bus into session contexts for
//   pre-validator rejection telemetry.
// - v1.0.0 (2025-07-12): Initial server shell.
//   - Purpose: Per-port listeners with accept-time ban screening over a
//     shared snapshot-iterable session registry.
