// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/jobs/mod.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the job manager for the CN stratum pool, located in
// the jobs subdirectory. It owns the template multicast channel (a watch:
// new subscribers see the current template immediately, slow ones only ever
// see the newest), the global job-id and instance-nonce counters, and the
// minting of per-session worker jobs.
//
// Tree Location:
// - src/jobs/mod.rs (job manager)
// - Depends on: core, tokio, parking_lot, serde_json

use crate::core::blob::{splice_instance_nonce, BlobError};
use crate::core::coin::CoinProfile;
use crate::core::difficulty::difficulty_to_target_hex;
use crate::core::types::{BlockTemplate, WorkerJob};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Templates kept alive behind the current one; shares racing a fresh
/// broadcast still validate, anything older is stale
const TEMPLATE_RETENTION: usize = 4;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no block template available yet")]
    NoTemplate,
    #[error("current template has an empty blob")]
    EmptyBlob,
    #[error("encoded target is empty")]
    EmptyTarget,
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// A freshly minted job plus its wire form
pub struct MintedJob {
    pub job: Arc<WorkerJob>,
    pub params: Value,
}

/// Mints worker jobs from the current template and multicasts templates
pub struct JobManager {
    profile: CoinProfile,
    watch_tx: watch::Sender<Option<Arc<BlockTemplate>>>,
    retained: Mutex<VecDeque<Arc<BlockTemplate>>>,
    job_counter: AtomicU64,
    instance_nonce: AtomicU32,
}

impl JobManager {
    pub fn new(profile: CoinProfile) -> Self {
        let (watch_tx, _) = watch::channel(None);
        Self {
            profile,
            watch_tx,
            retained: Mutex::new(VecDeque::with_capacity(TEMPLATE_RETENTION)),
            job_counter: AtomicU64::new(0),
            instance_nonce: AtomicU32::new(0),
        }
    }

    pub fn profile(&self) -> &CoinProfile {
        &self.profile
    }

    /// Publish a new template: retain it, then wake every subscriber
    pub fn publish(&self, template: Arc<BlockTemplate>) {
        {
            let mut retained = self.retained.lock();
            retained.push_back(template.clone());
            while retained.len() > TEMPLATE_RETENTION {
                retained.pop_front();
            }
        }
        debug!("📨 Template published: height={}", template.height);
        self.watch_tx.send_replace(Some(template));
    }

    /// Subscribe to the template stream; the current value is visible
    /// immediately and intermediate values may be skipped under lag
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<BlockTemplate>>> {
        self.watch_tx.subscribe()
    }

    /// Current template, if any was published
    pub fn current(&self) -> Option<Arc<BlockTemplate>> {
        self.watch_tx.borrow().clone()
    }

    /// Mint a worker job at the given miner difficulty
    ///
    /// `extra_nonce` is the session-scoped counter value; the instance nonce
    /// is allocated here from the pool-wide counter, so no two live jobs
    /// share an (instance, extra) pair.
    pub fn mint_job(&self, difficulty: u64, extra_nonce: u32) -> Result<MintedJob, JobError> {
        let template = self.current().ok_or(JobError::NoTemplate)?;
        if template.blob.is_empty() {
            return Err(JobError::EmptyBlob);
        }
        let target_hex = difficulty_to_target_hex(difficulty, self.profile.target_encoding);
        if target_hex.is_empty() {
            return Err(JobError::EmptyTarget);
        }

        let instance_nonce = self.instance_nonce.fetch_add(1, Ordering::Relaxed);
        let job_id = self.job_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut blob = template.blob.clone();
        splice_instance_nonce(&mut blob, template.reserved_offset as usize, instance_nonce)?;

        let job = Arc::new(WorkerJob::new(
            job_id.to_string(),
            Arc::downgrade(&template),
            instance_nonce,
            extra_nonce,
            difficulty,
            template.height,
            template.seed_hash.clone(),
        ));
        let params = json!({
            "job_id": job.id.clone(),
            "blob": hex::encode(&blob),
            "target": target_hex,
            "height": template.height,
            "seed_hash": template.seed_hash.clone(),
        });
        Ok(MintedJob { job, params })
    }

    /// Resolve a job's template; None once retention dropped it
    pub fn template_for(&self, job: &WorkerJob) -> Option<Arc<BlockTemplate>> {
        job.template.upgrade()
    }
}


// Changelog:
// - v1.0.1 (2025-07-19): Mint refuses empty blobs and empty targets
//   independently before allocating nonces.
// - v1.0.0 (2025-07-12): Initial job manager.
//   - Purpose: Watch-channel template multicast with bounded retention,
//     global job-id/instance-nonce counters, and wire-form minting.
