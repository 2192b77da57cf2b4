// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for the core functionality of the CN
// stratum pool, located in the core subdirectory. It declares submodules and
// re-exports key types for use throughout the project.
//
// Tree Location:
// - src/core/mod.rs (core module entry point)
// - Submodules: blob, coin, difficulty, pow, types

pub mod blob;
pub mod coin;
pub mod difficulty;
pub mod pow;
pub mod types;

// Re-export the most commonly used items
pub use coin::{CoinFamily, CoinProfile, WorkerIdentity};
pub use difficulty::{difficulty_to_target_hex, hash_difficulty, TargetEncoding};
pub use pow::{variant_for, PowContext, PowRegistry, PowVariant};
pub use types::{Args, BlockTemplate, PoolSettings, PortConfig, Share, VardiffConfig, WorkerJob};

// Changelog:
// - v1.0.0 (2025-07-12): Initial core module.
//   - Purpose: Organizes the pool's domain logic into submodules for blob
//     surgery, coin profiles, difficulty math, PoW dispatch, and data types,
//     with re-exports of the items the rest of the crate touches constantly.
