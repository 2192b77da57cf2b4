// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/server/broadcast.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements template fan-out for the CN stratum pool, located in
// the server subdirectory. On every template event it snapshots the session
// table, evicts sessions idle past the connection timeout, and commands each
// authorized session to push one fresh job. Per-session failures are logged
// and never abort the sweep; ordering within a session is preserved by the
// session's own mailbox.
//
// Tree Location:
// - src/server/broadcast.rs (job broadcast and liveness sweep)
// - Depends on: jobs, server::session, utils, tokio

use crate::jobs::JobManager;
use crate::server::session::SessionCommand;
use crate::server::SessionRegistry;
use crate::utils::clock::Clock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fan new templates out to every live session until cancelled
pub async fn run_broadcaster(
    job_manager: Arc<JobManager>,
    registry: SessionRegistry,
    clock: Arc<dyn Clock>,
    connection_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut templates = job_manager.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("🛑 Broadcaster stopping");
                return;
            }
            changed = templates.changed() => {
                if changed.is_err() {
                    // job manager dropped; nothing left to broadcast
                    return;
                }
            }
        }
        let Some(template) = templates.borrow_and_update().clone() else {
            continue;
        };

        let now_ms = clock.now_ms();
        let timeout_ms = connection_timeout.as_millis() as u64;
        let mut notified = 0usize;
        let mut evicted = 0usize;
        for session in registry.snapshot() {
            let idle_ms = now_ms.saturating_sub(session.last_activity_ms.load(Ordering::Relaxed));
            if idle_ms > timeout_ms {
                evicted += 1;
                debug!("🧹 Evicting idle session {} ({}ms)", session.connection_id, idle_ms);
                session.send_command(SessionCommand::Close("idle past connection timeout"));
                continue;
            }
            if !session.authorized.load(Ordering::Relaxed) {
                continue;
            }
            // a dead mailbox means the session task already exited; its
            // registry entry goes away with it
            if !session.send_command(SessionCommand::SendJob) {
                debug!("📪 Session {} mailbox closed during broadcast", session.connection_id);
            } else {
                notified += 1;
            }
        }
        info!(
            "📢 Broadcast height {} → {} sessions ({} evicted)",
            template.height, notified, evicted
        );
    }
}

// Changelog:
// - v1.0.0 (2025-07-12): Initial broadcast sweep.
//   - Purpose: One SendJob command per authorized session per template
//     event, with idle eviction folded into the same snapshot walk.
