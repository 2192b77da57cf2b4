// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/validator/mod.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements share validation for the CN stratum pool, located in
// the validator subdirectory. A submission is checked for duplicate nonces,
// resolved against its template, reconstituted into the full block blob,
// hashed on the worker pool, and measured against the miner and network
// targets. Block candidates go upstream with bounded retry; every accepted
// share is published on the message bus.
//
// Tree Location:
// - src/validator/mod.rs (share validation pipeline)
// - Submodules: workers
// - Depends on: core, daemon, jobs, bus, utils

pub mod workers;

use crate::bus::{MessageBus, PoolEvent};
use crate::core::blob::{splice_worker_nonce, BlobError, WORKER_NONCE_LEN};
use crate::core::coin::{CoinProfile, WorkerIdentity};
use crate::core::difficulty::hash_difficulty;
use crate::core::pow::{keccak256, variant_for, PowContext, PowError};
use crate::core::types::{PoolSettings, Share, WorkerJob};
use crate::daemon::client::{submit_block_with_retry, DaemonRpc};
use crate::jobs::JobManager;
use crate::utils::clock::Clock;
use crate::validator::workers::HashWorkerPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rejection reasons, each mapped to a wire error code
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Job not found")]
    JobNotFound,
    #[error("Job not found (stale)")]
    Stale,
    #[error("Duplicate share")]
    Duplicate,
    #[error("Malformed nonce")]
    MalformedNonce,
    #[error("Low difficulty share ({share_difficulty} < {required})")]
    LowDifficulty { share_difficulty: u64, required: u64 },
    #[error("Bad hash")]
    BadHash,
    #[error("Internal error: {0}")]
    Pow(#[from] PowError),
    #[error("Internal error: {0}")]
    Blob(#[from] BlobError),
}

impl ShareError {
    /// Reserved stratum error codes (20..24 plus the generic -1)
    pub fn code(&self) -> i32 {
        match self {
            ShareError::JobNotFound | ShareError::Stale => 21,
            ShareError::Duplicate => 22,
            ShareError::LowDifficulty { .. } => 23,
            ShareError::BadHash => 24,
            ShareError::Unauthenticated
            | ShareError::MalformedNonce
            | ShareError::Pow(_)
            | ShareError::Blob(_) => -1,
        }
    }
}

/// Validates submissions and emits Share verdicts
pub struct ShareValidator {
    pool: HashWorkerPool,
    daemon: Arc<dyn DaemonRpc>,
    bus: MessageBus,
    clock: Arc<dyn Clock>,
    profile: CoinProfile,
    submit_attempts: u32,
    submit_backoff: Duration,
}

impl ShareValidator {
    pub fn new(
        pool: HashWorkerPool,
        daemon: Arc<dyn DaemonRpc>,
        bus: MessageBus,
        clock: Arc<dyn Clock>,
        profile: CoinProfile,
        settings: &PoolSettings,
    ) -> Self {
        Self {
            pool,
            daemon,
            bus,
            clock,
            profile,
            submit_attempts: settings.submit_retry_attempts.max(1),
            submit_backoff: Duration::from_millis(settings.submit_retry_backoff_ms),
        }
    }

    /// Validate one submission against its job
    ///
    /// All checks must pass, in order: nonce shape, per-job duplicate set,
    /// template liveness, PoW hash, optional result cross-check, miner
    /// target, network target. The returned Share has already been
    /// published on the bus.
    pub async fn process_submission(
        &self,
        miner: &WorkerIdentity,
        job_manager: &JobManager,
        job: &Arc<WorkerJob>,
        nonce_hex: &str,
        result_hex: Option<&str>,
    ) -> Result<Share, ShareError> {
        let started = Instant::now();
        let outcome = self
            .validate(miner, job_manager, job, nonce_hex, result_hex)
            .await;
        self.bus.publish(PoolEvent::Telemetry {
            category: "share_validation",
            duration_ms: started.elapsed().as_millis() as u64,
            success: outcome.is_ok(),
        });
        outcome
    }

    async fn validate(
        &self,
        miner: &WorkerIdentity,
        job_manager: &JobManager,
        job: &Arc<WorkerJob>,
        nonce_hex: &str,
        result_hex: Option<&str>,
    ) -> Result<Share, ShareError> {
        let nonce = normalize_nonce(nonce_hex)?;
        if !job.record_submission(&nonce.hex) {
            return Err(ShareError::Duplicate);
        }
        let template = job_manager.template_for(job).ok_or(ShareError::Stale)?;

        // reconstitute the exact blob the miner hashed
        let mut blob = template.blob.clone();
        crate::core::blob::splice_instance_nonce(
            &mut blob,
            template.reserved_offset as usize,
            job.instance_nonce,
        )?;
        splice_worker_nonce(&mut blob, self.profile.nonce_offset, &nonce.bytes)?;

        let variant = variant_for(self.profile.family, template.major_version);
        let ctx = PowContext { seed_hash: template.seed_hash.clone(), height: template.height };
        let hash = self.pool.hash(variant, blob.clone(), ctx).await?;

        if let Some(result) = result_hex {
            if result.to_lowercase() != hex::encode(hash) {
                return Err(ShareError::BadHash);
            }
        }

        let share_difficulty = hash_difficulty(&hash);
        if share_difficulty < job.difficulty {
            return Err(ShareError::LowDifficulty {
                share_difficulty,
                required: job.difficulty,
            });
        }

        let mut is_block_candidate = share_difficulty >= template.difficulty;
        let mut block_hash = None;
        if is_block_candidate {
            let id_hash = hex::encode(keccak256(&blob));
            info!(
                "🎉 Block candidate at height {} by {} (share diff {})",
                template.height, miner.address, share_difficulty
            );
            match submit_block_with_retry(
                self.daemon.as_ref(),
                &hex::encode(&blob),
                self.submit_attempts,
                self.submit_backoff,
            )
            .await
            {
                Ok(true) => {
                    info!("⛓️ Block {} accepted at height {}", id_hash, template.height);
                    block_hash = Some(id_hash.clone());
                    self.bus.publish(PoolEvent::NewBlock {
                        block_hash: id_hash,
                        height: template.height,
                    });
                }
                Ok(false) => {
                    // daemon unreachable: the block is lost but the share
                    // stays a (numerically true) candidate in the record
                    block_hash = Some(id_hash);
                }
                Err(e) => {
                    warn!("⚠️ Daemon rejected block at height {}: {}", template.height, e);
                    is_block_candidate = false;
                }
            }
        }

        let share = Share {
            miner: miner.address.clone(),
            worker: miner.worker.clone(),
            difficulty: job.difficulty,
            network_difficulty: template.difficulty,
            is_block_candidate,
            block_hash,
            block_height: template.height,
            block_reward: template.reward,
            created_ms: self.clock.now_ms(),
        };
        debug!(
            "💎 Share accepted: miner={} job={} diff={}/{}",
            miner.address, job.id, share_difficulty, job.difficulty
        );
        self.bus.publish(PoolEvent::NewShare { share: share.clone() });
        Ok(share)
    }
}

struct NormalizedNonce {
    hex: String,
    bytes: [u8; WORKER_NONCE_LEN],
}

/// Lowercase the nonce and require exactly 4 hex-encoded bytes
fn normalize_nonce(nonce_hex: &str) -> Result<NormalizedNonce, ShareError> {
    let hex_lc = nonce_hex.to_lowercase();
    let decoded = hex::decode(&hex_lc).map_err(|_| ShareError::MalformedNonce)?;
    let bytes: [u8; WORKER_NONCE_LEN] =
        decoded.try_into().map_err(|_| ShareError::MalformedNonce)?;
    Ok(NormalizedNonce { hex: hex_lc, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pow::PowRegistry;
    use crate::core::types::BlockTemplate;
    use crate::daemon::client::{
        BlockHeaderInfo, DaemonError, DaemonInfo, DaemonRpc, TemplateReply,
    };
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Scripted upstream daemon
    struct StubDaemon {
        submit_calls: Mutex<Vec<String>>,
        reject_blocks: bool,
        unreachable: bool,
    }

    impl StubDaemon {
        fn accepting() -> Self {
            Self { submit_calls: Mutex::new(Vec::new()), reject_blocks: false, unreachable: false }
        }
        fn rejecting() -> Self {
            Self { submit_calls: Mutex::new(Vec::new()), reject_blocks: true, unreachable: false }
        }
    }

    #[async_trait]
    impl DaemonRpc for StubDaemon {
        async fn get_block_template(
            &self,
            _wallet_address: &str,
            _reserve_size: u32,
        ) -> Result<TemplateReply, DaemonError> {
            Err(DaemonError::Transport("stub".to_string()))
        }

        async fn submit_block(&self, blob_hex: &str) -> Result<(), DaemonError> {
            self.submit_calls.lock().push(blob_hex.to_string());
            if self.unreachable {
                Err(DaemonError::Transport("down".to_string()))
            } else if self.reject_blocks {
                Err(DaemonError::Rpc { code: -7, message: "Block not accepted".to_string() })
            } else {
                Ok(())
            }
        }

        async fn get_info(&self) -> Result<DaemonInfo, DaemonError> {
            Err(DaemonError::Transport("stub".to_string()))
        }

        async fn get_block_header_by_hash(
            &self,
            _hash: &str,
        ) -> Result<BlockHeaderInfo, DaemonError> {
            Err(DaemonError::Transport("stub".to_string()))
        }
    }

    fn test_template(difficulty: u64) -> Arc<BlockTemplate> {
        let mut blob = vec![0u8; 76];
        blob[0] = 1;
        Arc::new(BlockTemplate {
            height: 100,
            prev_hash: [0x11; 32],
            blob,
            reserved_offset: 55,
            difficulty,
            seed_hash: String::new(),
            major_version: 1,
            reward: 1_000,
        })
    }

    struct Harness {
        validator: ShareValidator,
        job_manager: JobManager,
        daemon: Arc<StubDaemon>,
        miner: WorkerIdentity,
    }

    fn harness(daemon: StubDaemon, network_difficulty: u64) -> Harness {
        let profile = CoinProfile::by_name("fast-hash").unwrap();
        let daemon = Arc::new(daemon);
        let bus = MessageBus::new(64);
        let pool = HashWorkerPool::spawn(Arc::new(PowRegistry::with_builtins()), 1);
        let mut settings = PoolSettings::default();
        settings.submit_retry_backoff_ms = 1;
        let validator = ShareValidator::new(
            pool,
            daemon.clone(),
            bus,
            Arc::new(ManualClock::new(1_000)),
            profile.clone(),
            &settings,
        );
        let job_manager = JobManager::new(profile);
        job_manager.publish(test_template(network_difficulty));
        let miner = WorkerIdentity {
            address: "9xTestAddr11".to_string(),
            worker: "0".to_string(),
            payment_id: None,
        };
        Harness { validator, job_manager, daemon, miner }
    }

    /// Compute the result hex a well-behaved miner would send
    fn expected_result(h: &Harness, job: &Arc<WorkerJob>, nonce: &[u8; 4]) -> String {
        let template = h.job_manager.template_for(job).unwrap();
        let mut blob = template.blob.clone();
        crate::core::blob::splice_instance_nonce(
            &mut blob,
            template.reserved_offset as usize,
            job.instance_nonce,
        )
        .unwrap();
        splice_worker_nonce(&mut blob, 39, nonce).unwrap();
        hex::encode(keccak256(&blob))
    }

    #[tokio::test]
    async fn test_valid_share_no_candidate() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        let result = expected_result(&h, &minted.job, &[0xab, 0xcd, 0xef, 0x01]);
        let share = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "ABCDEF01", Some(&result))
            .await
            .unwrap();
        assert!(!share.is_block_candidate);
        assert_eq!(share.difficulty, 1);
        assert!(h.daemon.submit_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_block_candidate_submits_once() {
        let h = harness(StubDaemon::accepting(), 1);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        let result = expected_result(&h, &minted.job, &[1, 2, 3, 4]);
        let share = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "01020304", Some(&result))
            .await
            .unwrap();
        assert!(share.is_block_candidate);
        assert!(share.block_hash.is_some());
        assert_eq!(h.daemon.submit_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_daemon_rejection_downgrades_candidate() {
        let h = harness(StubDaemon::rejecting(), 1);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        let result = expected_result(&h, &minted.job, &[1, 2, 3, 4]);
        let share = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "01020304", Some(&result))
            .await
            .unwrap();
        // still a valid share for the miner, no longer a candidate
        assert!(!share.is_block_candidate);
        assert!(share.block_hash.is_none());
    }

    #[tokio::test]
    async fn test_bad_result_hash_rejected() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        let err = h
            .validator
            .process_submission(
                &h.miner,
                &h.job_manager,
                &minted.job,
                "01020304",
                Some(&"00".repeat(32)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::BadHash));
        assert_eq!(err.code(), 24);
    }

    #[tokio::test]
    async fn test_low_difficulty_rejected() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(u64::MAX, 0).unwrap();
        let result = expected_result(&h, &minted.job, &[9, 9, 9, 9]);
        let err = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "09090909", Some(&result))
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::LowDifficulty { .. }));
        assert_eq!(err.code(), 23);
    }

    #[tokio::test]
    async fn test_duplicate_nonce_rejected_case_insensitively() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        let result = expected_result(&h, &minted.job, &[0xab, 0xcd, 0xef, 0x01]);
        h.validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "abcdef01", Some(&result))
            .await
            .unwrap();
        let err = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "ABCDEF01", Some(&result))
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Duplicate));
        assert_eq!(err.code(), 22);
    }

    #[tokio::test]
    async fn test_stale_job_rejected() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        // push the minting template out of the retention window
        for _ in 0..5 {
            h.job_manager.publish(test_template(u64::MAX));
        }
        let err = h
            .validator
            .process_submission(&h.miner, &h.job_manager, &minted.job, "01020304", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Stale));
        assert_eq!(err.code(), 21);
    }

    #[tokio::test]
    async fn test_malformed_nonce_rejected() {
        let h = harness(StubDaemon::accepting(), u64::MAX);
        let minted = h.job_manager.mint_job(1, 0).unwrap();
        for bad in ["zz", "01", "0102030405"] {
            let err = h
                .validator
                .process_submission(&h.miner, &h.job_manager, &minted.job, bad, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ShareError::MalformedNonce));
        }
    }
}

// Changelog:
// - v1.1.0 (2025-07-28): Candidate submission via submit_block_with_retry.
//   - Rejections downgrade the candidate flag; transport loss keeps it and
//     drops the block with a warning, per the tie-break rule.
// - v1.0.0 (2025-07-12): Initial validation pipeline.
//   - Purpose: Reconstructs the exact miner blob, dispatches the PoW hash
//     to the worker pool, and measures the result against both targets.
