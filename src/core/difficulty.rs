// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/difficulty.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file contains functions for target and difficulty arithmetic in the
// CN stratum pool, located in the core subdirectory. It encodes per-miner
// targets as the hex strings the CryptoNote stratum dialect expects and
// converts PoW hashes back into share difficulties with full 256-bit
// precision.

use tracing::warn;
use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}

/// Target encoding used on the wire for a given coin profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEncoding {
    /// Legacy 4-byte compact form (big-endian u32 hex)
    Compact4,
    /// Modern 8-byte form (big-endian u64 hex)
    Wide8,
}

/// 2^256 as a 512-bit integer, the numerator of every target computation
fn two_pow_256() -> U512 {
    U512::one() << 256
}

/// True when the 512-bit value fits in 256 bits
fn fits_u256(v: U512) -> bool {
    (v >> 256).is_zero()
}

/// Convert a difficulty into the 256-bit boundary target
/// target = floor(2^256 / difficulty), saturating at 2^256 - 1 for difficulty 1
pub fn difficulty_to_boundary(difficulty: u64) -> U256 {
    if difficulty == 0 {
        warn!("Invalid difficulty: zero, clamping to 1");
        return U256::max_value();
    }
    let wide = two_pow_256() / U512::from(difficulty);
    if !fits_u256(wide) {
        U256::max_value()
    } else {
        let bytes: [u8; 64] = wide.to_big_endian();
        U256::from_big_endian(&bytes[32..])
    }
}

/// Encode a miner difficulty as the hex target string sent in a job
///
/// The compact form keeps the top 32 bits of the boundary, the wide form
/// the top 64 bits. Both are big-endian hex, 8 and 16 characters.
pub fn difficulty_to_target_hex(difficulty: u64, encoding: TargetEncoding) -> String {
    let boundary = difficulty_to_boundary(difficulty);
    match encoding {
        TargetEncoding::Compact4 => format!("{:08x}", (boundary >> 224).low_u32()),
        TargetEncoding::Wide8 => format!("{:016x}", (boundary >> 192).low_u64()),
    }
}

/// Parse a wire target hex string back into a difficulty
/// Used by tests and by operators cross-checking job payloads
pub fn parse_target_hex(target_hex: &str, encoding: TargetEncoding) -> u64 {
    let bits = match (hex::decode(target_hex), encoding) {
        (Ok(bytes), TargetEncoding::Compact4) if bytes.len() == 4 => {
            u64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        (Ok(bytes), TargetEncoding::Wide8) if bytes.len() == 8 => u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]),
        _ => {
            warn!("Invalid target hex: {}", target_hex);
            return 1;
        }
    };
    if bits == 0 {
        warn!("Invalid target hex: zero value");
        return 1;
    }
    match encoding {
        TargetEncoding::Compact4 => 0xFFFF_FFFFu64 / bits,
        TargetEncoding::Wide8 => {
            let q = two_pow_256() / (U512::from(bits) << 192);
            if q > U512::from(u64::MAX) { u64::MAX } else { q.low_u64() }
        }
    }
}

/// Difficulty satisfied by a PoW hash, interpreted as a 256-bit
/// little-endian integer: floor(2^256 / H), saturating at u64::MAX
pub fn hash_difficulty(hash: &[u8; 32]) -> u64 {
    let h = U256::from_little_endian(hash);
    if h.is_zero() {
        warn!("Invalid PoW hash: zero value");
        return u64::MAX;
    }
    let mut wide = [0u8; 64];
    wide[32..].copy_from_slice(&h.to_big_endian());
    let q = two_pow_256() / U512::from_big_endian(&wide);
    if q > U512::from(u64::MAX) {
        u64::MAX
    } else {
        q.low_u64()
    }
}

/// Check whether a hash meets a difficulty: floor(2^256 / H) >= difficulty
pub fn hash_meets_difficulty(hash: &[u8; 32], difficulty: u64) -> bool {
    hash_difficulty(hash) >= difficulty
}


// Changelog:
// - v1.0.1 (2025-07-19): Switched target math to exact 512-bit division.
//   - floor(2^256 / x) is computed in U512 instead of the (2^256 - 1)
//     approximation, so candidate checks agree with hash_difficulty at
//     power-of-two difficulties.
// - v1.0.0 (2025-07-12): Initial target math.
//   - Purpose: Encodes per-miner targets for jobs and computes share
//     difficulties from PoW hashes with 256-bit precision.
//   - Features: Compact 4-byte and wide 8-byte target encodings with
//     parsers, boundary conversion, and difficulty checks.
