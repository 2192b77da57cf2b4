// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/pow/mod.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements PoW variant dispatch for the CN stratum pool, located
// in the pow subdirectory of core. The variant is selected from a table keyed
// on (coin family, template major version); hashing itself goes through a
// registry of engines so deployments can link in native hashers without the
// core depending on a C toolchain.
//
// Tree Location:
// - src/core/pow/mod.rs (variant table, engine registry, keccak fast hash)
// - Depends on: sha3, thiserror

use crate::core::coin::CoinFamily;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "randomx")]
pub mod randomx;

/// Concrete hash variant, resolved from (family, major_version)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowVariant {
    /// Plain Keccak-256 (CryptoNote fast hash); test deployments
    FastHash,
    Cn0,
    Cn1,
    Cn2,
    CnR,
    CnLite0,
    CnLite1,
    CnHeavy,
    RandomX,
}

/// Select the hash variant for a template
///
/// The CryptoNight column follows the Monero fork schedule: v7 introduced
/// variant 1, v8 variant 2, v10 CN/R, and v12 switched the chain to RandomX.
pub fn variant_for(family: CoinFamily, major_version: u8) -> PowVariant {
    match family {
        CoinFamily::FastHash => PowVariant::FastHash,
        CoinFamily::RandomX => PowVariant::RandomX,
        CoinFamily::Cryptonight => match major_version {
            0..=6 => PowVariant::Cn0,
            7 => PowVariant::Cn1,
            8 | 9 => PowVariant::Cn2,
            10 | 11 => PowVariant::CnR,
            _ => PowVariant::RandomX,
        },
        CoinFamily::CryptonightLite => match major_version {
            0..=6 => PowVariant::CnLite0,
            _ => PowVariant::CnLite1,
        },
        CoinFamily::CryptonightHeavy => PowVariant::CnHeavy,
    }
}

/// Inputs beyond the blob that some variants need
#[derive(Debug, Clone)]
pub struct PowContext {
    /// Seed hash hex for RandomX-family variants (may be empty)
    pub seed_hash: String,

    /// Template height; CN/R derives its random program from it
    pub height: u64,
}

#[derive(Debug, Error)]
pub enum PowError {
    #[error("no engine registered for PoW variant {0:?}")]
    UnsupportedVariant(PowVariant),
    #[error("bad seed hash: {0}")]
    BadSeed(String),
    #[error("hash computation failed: {0}")]
    HashFailed(String),
}

/// A pure hashing backend for one or more variants
pub trait PowEngine: Send + Sync {
    fn hash(&self, variant: PowVariant, blob: &[u8], ctx: &PowContext) -> Result<[u8; 32], PowError>;
}

/// Maps variants to engines; cloned handles share the same table
pub struct PowRegistry {
    engines: HashMap<PowVariant, Arc<dyn PowEngine>>,
}

impl PowRegistry {
    /// Empty registry, for embedders that wire everything themselves
    pub fn new() -> Self {
        Self { engines: HashMap::new() }
    }

    /// Registry with the built-in engines: keccak fast hash always, RandomX
    /// when the `randomx` feature is enabled
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PowVariant::FastHash, Arc::new(FastHashEngine));
        #[cfg(feature = "randomx")]
        registry.register(PowVariant::RandomX, Arc::new(randomx::RandomXEngine::new()));
        registry
    }

    /// Register (or replace) the engine for a variant
    pub fn register(&mut self, variant: PowVariant, engine: Arc<dyn PowEngine>) {
        self.engines.insert(variant, engine);
    }

    /// True when a variant can actually be hashed
    pub fn supports(&self, variant: PowVariant) -> bool {
        self.engines.contains_key(&variant)
    }

    /// Compute a PoW hash; CPU-bound, callers offload to the worker pool
    pub fn hash(
        &self,
        variant: PowVariant,
        blob: &[u8],
        ctx: &PowContext,
    ) -> Result<[u8; 32], PowError> {
        let engine = self
            .engines
            .get(&variant)
            .ok_or(PowError::UnsupportedVariant(variant))?;
        engine.hash(variant, blob, ctx)
    }
}

impl Default for PowRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// CryptoNote fast hash: Keccak-256 over the blob
pub struct FastHashEngine;

impl PowEngine for FastHashEngine {
    fn hash(&self, _variant: PowVariant, blob: &[u8], _ctx: &PowContext) -> Result<[u8; 32], PowError> {
        Ok(keccak256(blob))
    }
}

/// Keccak-256 with the original (pre-NIST) padding, as CryptoNote uses it
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_answers() {
        // Known-answer vectors for legacy Keccak-256
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(keccak256(b"abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_variant_table_cryptonight_schedule() {
        use CoinFamily::*;
        assert_eq!(variant_for(Cryptonight, 1), PowVariant::Cn0);
        assert_eq!(variant_for(Cryptonight, 6), PowVariant::Cn0);
        assert_eq!(variant_for(Cryptonight, 7), PowVariant::Cn1);
        assert_eq!(variant_for(Cryptonight, 8), PowVariant::Cn2);
        assert_eq!(variant_for(Cryptonight, 9), PowVariant::Cn2);
        assert_eq!(variant_for(Cryptonight, 10), PowVariant::CnR);
        assert_eq!(variant_for(Cryptonight, 11), PowVariant::CnR);
        assert_eq!(variant_for(Cryptonight, 12), PowVariant::RandomX);
        assert_eq!(variant_for(Cryptonight, 14), PowVariant::RandomX);
    }

    #[test]
    fn test_variant_table_other_families() {
        use CoinFamily::*;
        assert_eq!(variant_for(CryptonightLite, 0), PowVariant::CnLite0);
        assert_eq!(variant_for(CryptonightLite, 7), PowVariant::CnLite1);
        assert_eq!(variant_for(CryptonightHeavy, 3), PowVariant::CnHeavy);
        assert_eq!(variant_for(RandomX, 1), PowVariant::RandomX);
        assert_eq!(variant_for(FastHash, 0), PowVariant::FastHash);
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = PowRegistry::with_builtins();
        let ctx = PowContext { seed_hash: String::new(), height: 0 };
        assert!(registry.supports(PowVariant::FastHash));
        let hash = registry.hash(PowVariant::FastHash, b"abc", &ctx).unwrap();
        assert_eq!(
            hex::encode(hash),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_registry_unsupported_variant() {
        let registry = PowRegistry::new();
        let ctx = PowContext { seed_hash: String::new(), height: 0 };
        let err = registry.hash(PowVariant::Cn2, b"abc", &ctx).unwrap_err();
        assert!(matches!(err, PowError::UnsupportedVariant(PowVariant::Cn2)));
    }
}

// Changelog:
// - v1.1.0 (2025-07-28): Added the feature-gated RandomX engine.
// - v1.0.0 (2025-07-12): Initial variant dispatch.
//   - Purpose: Keys the hash variant on (coin family, major version) per the
//     Monero fork schedule and routes hashing through a registry so native
//     scratchpad hashers can be linked in by the deployment.
//   - Note: The keccak fast hash doubles as the PoW of the fast-hash test
//     family, keeping the whole validation pipeline exercisable in CI.
