// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/stats/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements pool statistics for the CN stratum pool, located in
// the stats subdirectory. The stats task is an ordinary bus subscriber:
// accepted shares feed a sliding window that estimates pool hashrate, and a
// periodic summary line goes to the log.
//
// Tree Location:
// - src/stats/mod.rs (counters, hashrate window, summary logger)
// - Depends on: bus, server, utils, tokio

use crate::bus::{MessageBus, PoolEvent};
use crate::server::SessionRegistry;
use crate::utils::clock::Clock;
use crate::utils::format::{format_hashrate, format_number, format_uptime};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Accepted-share difficulties are summed over this window for the
/// pool hashrate estimate
const HASHRATE_WINDOW_SECS: u64 = 600;

#[derive(Default)]
pub struct PoolStats {
    pub shares_accepted: AtomicU64,
    pub shares_rejected: AtomicU64,
    pub blocks_found: AtomicU64,
    accepted_window: Mutex<VecDeque<(u64, u64)>>,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self, difficulty: u64, now_ms: u64) {
        self.shares_accepted.fetch_add(1, Ordering::Relaxed);
        let mut window = self.accepted_window.lock();
        window.push_back((now_ms, difficulty));
        let cutoff = now_ms.saturating_sub(HASHRATE_WINDOW_SECS * 1_000);
        while window.front().is_some_and(|&(t, _)| t < cutoff) {
            window.pop_front();
        }
    }

    pub fn record_rejected(&self) {
        self.shares_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self) {
        self.blocks_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Work done per second across the window, in difficulty units
    pub fn pool_hashrate(&self, now_ms: u64) -> f64 {
        let window = self.accepted_window.lock();
        let cutoff = now_ms.saturating_sub(HASHRATE_WINDOW_SECS * 1_000);
        let work: u64 = window
            .iter()
            .filter(|&&(t, _)| t >= cutoff)
            .map(|&(_, d)| d)
            .sum();
        work as f64 / HASHRATE_WINDOW_SECS as f64
    }
}

/// Consume bus events and log a summary line every minute
pub async fn run_stats_logger(
    stats: Arc<PoolStats>,
    bus: MessageBus,
    registry: SessionRegistry,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut events = bus.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("🛑 Stats logger stopping");
                return;
            }
            event = events.recv() => match event {
                Ok(PoolEvent::NewShare { share }) => {
                    stats.record_accepted(share.difficulty, clock.now_ms());
                }
                Ok(PoolEvent::NewBlock { block_hash, height }) => {
                    stats.record_block();
                    info!("🎉 Block {} found at height {}", block_hash, height);
                }
                Ok(PoolEvent::Telemetry { category, success, .. }) => {
                    if category == "share_validation" && !success {
                        stats.record_rejected();
                    }
                }
                // a burst outran the channel; counters just miss a few events
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            },
            _ = ticker.tick() => {
                info!(
                    "⛏️ Pool: {} sessions, {}, {} accepted / {} rejected, {} blocks, up {}",
                    registry.len(),
                    format_hashrate(stats.pool_hashrate(clock.now_ms())),
                    format_number(stats.shares_accepted.load(Ordering::Relaxed)),
                    format_number(stats.shares_rejected.load(Ordering::Relaxed)),
                    stats.blocks_found.load(Ordering::Relaxed),
                    format_uptime(started.elapsed()),
                );
            }
        }
    }
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial stats task.
//   - Purpose: A bus subscriber keeping pool counters and a windowed
//     hashrate estimate, logged once a minute.
