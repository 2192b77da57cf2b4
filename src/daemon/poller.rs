// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/daemon/poller.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the block template poller for the CN stratum pool,
// located in the daemon subdirectory. It tracks the upstream chain tip by
// polling get_block_template and, when configured, by listening on a push
// template channel. A fresh template is published to the job manager when
// the work identity changes or the refresh interval forces a re-broadcast.
//
// Tree Location:
// - src/daemon/poller.rs (template acquisition loop)
// - Depends on: daemon::client, jobs, tokio, tokio-tungstenite

use crate::core::blob::major_version;
use crate::core::types::{BlockTemplate, PoolSettings};
use crate::daemon::client::{DaemonError, DaemonRpc, TemplateReply};
use crate::jobs::JobManager;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work identity used by the emit rule
type WorkKey = (u64, [u8; 32], u8);

/// Polls the daemon and publishes templates into the job manager
pub struct TemplatePoller {
    daemon: Arc<dyn DaemonRpc>,
    job_manager: Arc<JobManager>,
    wallet: String,
    reserve_size: u32,
    poll_interval: Duration,
    refresh_interval: Duration,
    stream_url: Option<String>,
    cancel: CancellationToken,
}

impl TemplatePoller {
    pub fn new(
        daemon: Arc<dyn DaemonRpc>,
        job_manager: Arc<JobManager>,
        settings: &PoolSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            daemon,
            job_manager,
            wallet: settings.pool_wallet.clone(),
            reserve_size: settings.reserve_size,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(100)),
            refresh_interval: Duration::from_secs(settings.template_refresh_secs.max(1)),
            stream_url: settings.template_stream_url.clone(),
            cancel,
        }
    }

    /// Run until cancelled. The push channel, when configured, only nudges
    /// the poll loop: a frame signals rotation and the authoritative
    /// template still comes from get_block_template.
    pub async fn run(self) {
        let (nudge_tx, mut nudge_rx) = mpsc::channel::<()>(1);
        if let Some(url) = self.stream_url.clone() {
            let cancel = self.cancel.clone();
            tokio::spawn(run_push_listener(url, nudge_tx, cancel));
        }

        let mut last_key: Option<WorkKey> = None;
        let mut last_emit = Instant::now()
            .checked_sub(self.refresh_interval)
            .unwrap_or_else(Instant::now);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("🛑 Template poller stopping");
                    return;
                }
                _ = ticker.tick() => {}
                Some(()) = nudge_rx.recv() => {
                    debug!("📨 Push channel nudge, polling template now");
                }
            }

            match self.daemon.get_block_template(&self.wallet, self.reserve_size).await {
                Ok(reply) => match build_template(&reply) {
                    Ok(template) => {
                        let key = template.work_id();
                        if should_emit(last_key.as_ref(), &key, last_emit.elapsed(), self.refresh_interval) {
                            info!(
                                "📋 New block template: height={} diff={} v{}",
                                template.height, template.difficulty, template.major_version
                            );
                            last_key = Some(key);
                            last_emit = Instant::now();
                            self.job_manager.publish(Arc::new(template));
                        }
                    }
                    Err(e) => warn!("⚠️ Daemon sent an unusable template: {}", e),
                },
                // the last published template stays current; sessions keep
                // mining it until the daemon comes back
                Err(e) => warn!("⚠️ get_block_template failed: {}", e),
            }
        }
    }
}

/// Emit iff the work identity changed or the refresh interval elapsed
fn should_emit(
    last: Option<&WorkKey>,
    new: &WorkKey,
    since_emit: Duration,
    refresh_interval: Duration,
) -> bool {
    match last {
        None => true,
        Some(prev) => prev != new || since_emit >= refresh_interval,
    }
}

/// Decode a daemon reply into an immutable BlockTemplate
fn build_template(reply: &TemplateReply) -> Result<BlockTemplate, DaemonError> {
    let blob = hex::decode(&reply.blocktemplate_blob)
        .map_err(|e| DaemonError::Malformed(format!("template blob: {}", e)))?;
    if blob.is_empty() {
        return Err(DaemonError::MissingField("blocktemplate_blob"));
    }
    let version = major_version(&blob).map_err(|e| DaemonError::Malformed(e.to_string()))?;
    let prev = hex::decode(&reply.prev_hash)
        .map_err(|e| DaemonError::Malformed(format!("prev_hash: {}", e)))?;
    let prev_hash: [u8; 32] = prev
        .try_into()
        .map_err(|_| DaemonError::Malformed("prev_hash is not 32 bytes".to_string()))?;
    if (reply.reserved_offset as usize) + 4 > blob.len() {
        return Err(DaemonError::Malformed(format!(
            "reserved_offset {} beyond blob of {} bytes",
            reply.reserved_offset,
            blob.len()
        )));
    }
    Ok(BlockTemplate {
        height: reply.height,
        prev_hash,
        blob,
        reserved_offset: reply.reserved_offset,
        difficulty: reply.difficulty.max(1),
        seed_hash: reply.seed_hash.clone(),
        major_version: version,
        reward: reply.expected_reward,
    })
}

/// Keep a WebSocket subscription alive and turn every frame into a nudge
async fn run_push_listener(url: String, nudge_tx: mpsc::Sender<()>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match connect_async(url.as_str()).await {
            Ok((mut stream, _)) => {
                info!("🔌 Push template channel connected: {}", url);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        frame = stream.next() => match frame {
                            Some(Ok(_)) => {
                                // coalesce: a pending nudge already forces a poll
                                let _ = nudge_tx.try_send(());
                            }
                            Some(Err(e)) => {
                                warn!("⚠️ Push channel error: {}", e);
                                break;
                            }
                            None => {
                                warn!("⚠️ Push channel closed");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => warn!("⚠️ Push channel connect failed: {}", e),
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
        }
    }
}


// Changelog:
// - v1.1.0 (2025-07-28): Added the push template channel.
//   - A WebSocket frame nudges an immediate poll instead of being decoded:
//     the bare blob frame lacks reserved_offset and difficulty, so
//     get_block_template stays the single source of truth.
// - v1.0.0 (2025-07-12): Initial poll loop with the work-identity emit rule.
