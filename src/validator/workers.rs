// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/validator/workers.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the bounded CPU hash pool for the CN stratum pool,
// located in the validator subdirectory. PoW verification is CPU-bound, so
// session tasks hand the blob to a dedicated thread pool and suspend on a
// oneshot reply. The bounded queue is the back-pressure valve: when every
// worker is busy, submitters wait instead of piling work up.
//
// Tree Location:
// - src/validator/workers.rs (hash worker pool)
// - Depends on: async-channel, tokio, core::pow, num_cpus

use crate::core::pow::{PowContext, PowError, PowRegistry, PowVariant};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

struct HashTask {
    variant: PowVariant,
    blob: Vec<u8>,
    ctx: PowContext,
    reply: oneshot::Sender<Result<[u8; 32], PowError>>,
}

/// Bounded pool of hashing threads shared by all sessions
#[derive(Clone)]
pub struct HashWorkerPool {
    tx: async_channel::Sender<HashTask>,
}

impl HashWorkerPool {
    /// Spawn `threads` workers (0 = physical cores)
    pub fn spawn(registry: Arc<PowRegistry>, threads: usize) -> Self {
        let threads = if threads == 0 { num_cpus::get_physical() } else { threads };
        let (tx, rx) = async_channel::bounded::<HashTask>(threads * 2);
        info!("🧮 Hash worker pool: {} threads", threads);

        for worker_id in 0..threads {
            let rx = rx.clone();
            let registry = Arc::clone(&registry);
            std::thread::Builder::new()
                .name(format!("hash-worker-{}", worker_id))
                .spawn(move || {
                    while let Ok(task) = futures::executor::block_on(rx.recv()) {
                        let HashTask { variant, blob, ctx, reply } = task;
                        // a panicking engine must not take the worker down;
                        // the submitter gets a generic error instead
                        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                            registry.hash(variant, &blob, &ctx)
                        }))
                        .unwrap_or_else(|_| {
                            error!("💥 Hash engine panicked on {:?}, worker recovered", variant);
                            Err(PowError::HashFailed("hash engine panicked".to_string()))
                        });
                        let _ = reply.send(outcome);
                    }
                })
                .expect("spawn hash worker thread");
        }
        Self { tx }
    }

    /// Compute a PoW hash on the pool; suspension point for the caller
    pub async fn hash(
        &self,
        variant: PowVariant,
        blob: Vec<u8>,
        ctx: PowContext,
    ) -> Result<[u8; 32], PowError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(HashTask { variant, blob, ctx, reply: reply_tx })
            .await
            .map_err(|_| PowError::HashFailed("hash pool is shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| PowError::HashFailed("hash worker dropped the task".to_string()))?
    }
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial hash pool.
//   - Purpose: Offloads CPU-bound PoW verification from session tasks onto
//     a bounded thread pool with panic isolation per task.
