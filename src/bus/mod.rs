// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/bus/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the outbound message bus for the CN stratum pool,
// located in the bus subdirectory. Share verdicts, found blocks, and
// telemetry flow to downstream consumers (recorders, payout, statistics)
// through a broadcast channel. Publishing never blocks the pool: a slow
// subscriber skips old events, a missing subscriber drops them.
//
// Tree Location:
// - src/bus/mod.rs (pool event bus)
// - Depends on: tokio, core

use crate::core::types::Share;
use tokio::sync::broadcast;
use tracing::trace;

/// Events published by the pool core
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A share passed validation
    NewShare { share: Share },

    /// A block candidate was accepted by the daemon
    NewBlock { block_hash: String, height: u64 },

    /// Timing sample for an internal operation
    Telemetry {
        category: &'static str,
        duration_ms: u64,
        success: bool,
    },
}

/// Cloneable handle to the pool event channel
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<PoolEvent>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; fails fast (and silently) when nobody listens
    pub fn publish(&self, event: PoolEvent) {
        if self.tx.send(event).is_err() {
            trace!("📭 Bus event dropped, no subscribers");
        }
    }

    /// Subscribe from this point forward
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial event bus.
//   - Purpose: Fan-out of NewShare/NewBlock/Telemetry to downstream
//     consumers over a bounded broadcast channel that never applies
//     back-pressure to the validation path.
