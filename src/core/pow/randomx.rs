// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/pow/randomx.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the RandomX engine for the CN stratum pool, located in
// the pow subdirectory of core. Verification runs in light mode: a cache per
// seed epoch, a VM rebuilt when the seed rotates. Compiled only with the
// "randomx" feature, which links the native RandomX library.
//
// Tree Location:
// - src/core/pow/randomx.rs (RandomX light-mode verification)
// - Depends on: randomx-rs, parking_lot

use super::{PowContext, PowEngine, PowError, PowVariant};
use parking_lot::Mutex;
use randomx_rs::{RandomXCache, RandomXFlag, RandomXVM};
use tracing::info;

struct SeededVm {
    seed_hash: String,
    vm: RandomXVM,
}

/// Light-mode RandomX verifier
///
/// The VM is serialized behind a mutex; the hash worker pool provides the
/// parallelism by owning one registry per worker when configured to.
pub struct RandomXEngine {
    flags: RandomXFlag,
    vm: Mutex<Option<SeededVm>>,
}

impl RandomXEngine {
    pub fn new() -> Self {
        Self {
            flags: RandomXFlag::get_recommended_flags(),
            vm: Mutex::new(None),
        }
    }

    fn rebuild(&self, seed_hash: &str) -> Result<SeededVm, PowError> {
        let seed =
            hex::decode(seed_hash).map_err(|e| PowError::BadSeed(format!("{}: {}", seed_hash, e)))?;
        if seed.len() != 32 {
            return Err(PowError::BadSeed(format!("seed is {} bytes, want 32", seed.len())));
        }
        info!("🌱 RandomX seed rotation, rebuilding cache for {}", seed_hash);
        let cache = RandomXCache::new(self.flags, &seed)
            .map_err(|e| PowError::HashFailed(format!("cache init: {}", e)))?;
        let vm = RandomXVM::new(self.flags, Some(cache), None)
            .map_err(|e| PowError::HashFailed(format!("vm init: {}", e)))?;
        Ok(SeededVm { seed_hash: seed_hash.to_string(), vm })
    }
}

impl PowEngine for RandomXEngine {
    fn hash(&self, _variant: PowVariant, blob: &[u8], ctx: &PowContext) -> Result<[u8; 32], PowError> {
        if ctx.seed_hash.is_empty() {
            return Err(PowError::BadSeed("template carries no seed hash".to_string()));
        }
        let mut slot = self.vm.lock();
        let needs_rebuild = slot
            .as_ref()
            .map(|s| s.seed_hash != ctx.seed_hash)
            .unwrap_or(true);
        if needs_rebuild {
            *slot = Some(self.rebuild(&ctx.seed_hash)?);
        }
        let seeded = slot.as_mut().expect("vm present after rebuild");
        let digest = seeded
            .vm
            .calculate_hash(blob)
            .map_err(|e| PowError::HashFailed(e.to_string()))?;
        if digest.len() != 32 {
            return Err(PowError::HashFailed(format!("digest is {} bytes", digest.len())));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(out)
    }
}

impl Default for RandomXEngine {
    fn default() -> Self {
        Self::new()
    }
}


// Changelog:
// - v1.0.0 (2025-07-28): Initial light-mode RandomX verification.
//   - Purpose: Verifies RandomX shares without the 2GB dataset; the cache is
//     rebuilt only when the template's seed hash rotates.
