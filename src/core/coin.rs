// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/coin.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file defines coin profiles for the CN stratum pool, located in the
// core subdirectory. A profile carries everything the core needs to know
// about a coin: PoW family, header nonce offset, address shape, payment-id
// lengths, and the wire target encoding. It also parses the stratum login
// string and the pass-field control directives.
//
// Tree Location:
// - src/core/coin.rs (coin profiles, address rules, login grammar)
// - Depends on: thiserror

use crate::core::difficulty::TargetEncoding;
use std::collections::HashMap;
use thiserror::Error;

const BASE58_CHARSET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// PoW family a coin belongs to; together with the template's major version
/// this selects the hash variant (see core::pow::variant_for)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinFamily {
    Cryptonight,
    CryptonightLite,
    CryptonightHeavy,
    RandomX,
    /// Plain Keccak-256, used by test deployments and the test suite
    FastHash,
}

/// Static description of a coin, resolved once at startup
#[derive(Debug, Clone)]
pub struct CoinProfile {
    pub name: &'static str,
    pub family: CoinFamily,

    /// Byte offset of the miner nonce in the header blob
    pub nonce_offset: usize,

    /// Accepted payment-id hex lengths (short and long form)
    pub payment_id_lengths: &'static [usize],

    /// Minimum address length in characters
    pub address_min_len: usize,

    /// Accepted address prefixes; empty means any base58 string passes
    pub address_prefixes: &'static [&'static str],

    /// Target encoding sent in jobs on this coin
    pub target_encoding: TargetEncoding,
}

impl CoinProfile {
    /// Registry of known profiles, keyed by settings name
    pub fn registry() -> HashMap<&'static str, CoinProfile> {
        let mut map = HashMap::new();
        map.insert(
            "cryptonight",
            CoinProfile {
                name: "cryptonight",
                family: CoinFamily::Cryptonight,
                nonce_offset: 39,
                payment_id_lengths: &[16, 64],
                address_min_len: 90,
                address_prefixes: &["4", "8"],
                target_encoding: TargetEncoding::Compact4,
            },
        );
        map.insert(
            "cryptonight-lite",
            CoinProfile {
                name: "cryptonight-lite",
                family: CoinFamily::CryptonightLite,
                nonce_offset: 39,
                payment_id_lengths: &[16, 64],
                address_min_len: 90,
                address_prefixes: &[],
                target_encoding: TargetEncoding::Compact4,
            },
        );
        map.insert(
            "cryptonight-heavy",
            CoinProfile {
                name: "cryptonight-heavy",
                family: CoinFamily::CryptonightHeavy,
                nonce_offset: 39,
                payment_id_lengths: &[16, 64],
                address_min_len: 90,
                address_prefixes: &[],
                target_encoding: TargetEncoding::Compact4,
            },
        );
        map.insert(
            "randomx",
            CoinProfile {
                name: "randomx",
                family: CoinFamily::RandomX,
                nonce_offset: 39,
                payment_id_lengths: &[16, 64],
                address_min_len: 90,
                address_prefixes: &["4", "8"],
                target_encoding: TargetEncoding::Wide8,
            },
        );
        map.insert(
            "fast-hash",
            CoinProfile {
                name: "fast-hash",
                family: CoinFamily::FastHash,
                nonce_offset: 39,
                payment_id_lengths: &[16, 64],
                address_min_len: 8,
                address_prefixes: &[],
                target_encoding: TargetEncoding::Wide8,
            },
        );
        map
    }

    /// Look up a profile by its settings name
    pub fn by_name(name: &str) -> Option<CoinProfile> {
        Self::registry().remove(name)
    }

    /// Validate a wallet address against this profile's shape rules
    pub fn validate_address(&self, address: &str) -> Result<(), AddressError> {
        if address.len() < self.address_min_len {
            return Err(AddressError::TooShort {
                len: address.len(),
                min: self.address_min_len,
            });
        }
        if !address.chars().all(|c| BASE58_CHARSET.contains(c)) {
            return Err(AddressError::BadCharacters);
        }
        if !self.address_prefixes.is_empty()
            && !self.address_prefixes.iter().any(|p| address.starts_with(p))
        {
            return Err(AddressError::BadPrefix);
        }
        Ok(())
    }

    /// Validate a payment id against this profile's accepted lengths
    pub fn validate_payment_id(&self, payment_id: &str) -> Result<(), AddressError> {
        if !self.payment_id_lengths.contains(&payment_id.len())
            || !payment_id.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(AddressError::BadPaymentId);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address too short ({len} chars, minimum {min})")]
    TooShort { len: usize, min: usize },
    #[error("address contains non-base58 characters")]
    BadCharacters,
    #[error("address prefix not accepted on this coin")]
    BadPrefix,
    #[error("invalid payment id")]
    BadPaymentId,
}

/// Parsed identity from a stratum login string
/// Grammar: `<address>[.<worker>]` where the address part may carry
/// `#<payment_id>`; the worker defaults to "0"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub address: String,
    pub worker: String,
    pub payment_id: Option<String>,
}

impl WorkerIdentity {
    pub fn parse(login: &str, profile: &CoinProfile) -> Result<Self, AddressError> {
        let (address_part, worker) = match login.split_once('.') {
            Some((a, w)) if !w.is_empty() => (a, w.to_string()),
            Some((a, _)) => (a, "0".to_string()),
            None => (login, "0".to_string()),
        };
        let (address, payment_id) = match address_part.split_once('#') {
            Some((a, pid)) => {
                profile.validate_payment_id(pid)?;
                (a.to_string(), Some(pid.to_string()))
            }
            None => (address_part.to_string(), None),
        };
        profile.validate_address(&address)?;
        Ok(Self { address, worker, payment_id })
    }
}

/// Parse `key=value;key=value` control directives from the pass field
/// Unknown keys are kept so callers can log them
pub fn parse_pass_directives(pass: &str) -> HashMap<String, String> {
    pass.split(';')
        .filter_map(|kv| {
            let (k, v) = kv.split_once('=')?;
            let k = k.trim();
            let v = v.trim();
            if k.is_empty() || v.is_empty() {
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> CoinProfile {
        CoinProfile::by_name("fast-hash").unwrap()
    }

    #[test]
    fn test_login_plain_address() {
        let id = WorkerIdentity::parse("9xTestAddr11", &test_profile()).unwrap();
        assert_eq!(id.address, "9xTestAddr11");
        assert_eq!(id.worker, "0");
        assert_eq!(id.payment_id, None);
    }

    #[test]
    fn test_login_with_worker() {
        let id = WorkerIdentity::parse("9xTestAddr11.rig-01", &test_profile()).unwrap();
        assert_eq!(id.worker, "rig-01");
    }

    #[test]
    fn test_login_with_payment_id() {
        let pid = "a".repeat(16);
        let id =
            WorkerIdentity::parse(&format!("9xTestAddr11#{}.rig-01", pid), &test_profile()).unwrap();
        assert_eq!(id.address, "9xTestAddr11");
        assert_eq!(id.worker, "rig-01");
        assert_eq!(id.payment_id.as_deref(), Some(pid.as_str()));
    }

    #[test]
    fn test_login_bad_payment_id_length() {
        let err = WorkerIdentity::parse("9xTestAddr11#abc", &test_profile()).unwrap_err();
        assert_eq!(err, AddressError::BadPaymentId);
    }

    #[test]
    fn test_login_bad_payment_id_hex() {
        let err =
            WorkerIdentity::parse("9xTestAddr11#zzzzzzzzzzzzzzzz", &test_profile()).unwrap_err();
        assert_eq!(err, AddressError::BadPaymentId);
    }

    #[test]
    fn test_address_rules() {
        let profile = CoinProfile::by_name("cryptonight").unwrap();
        let ok = format!("4{}", "1".repeat(94));
        assert!(profile.validate_address(&ok).is_ok());
        assert_eq!(
            profile.validate_address("4short"),
            Err(AddressError::TooShort { len: 6, min: 90 })
        );
        let bad_prefix = format!("7{}", "1".repeat(94));
        assert_eq!(profile.validate_address(&bad_prefix), Err(AddressError::BadPrefix));
        let bad_chars = format!("4{}O", "1".repeat(94));
        assert_eq!(profile.validate_address(&bad_chars), Err(AddressError::BadCharacters));
    }

    #[test]
    fn test_pass_directives() {
        let vars = parse_pass_directives("d=50000;foo=bar");
        assert_eq!(vars.get("d").map(String::as_str), Some("50000"));
        assert_eq!(vars.get("foo").map(String::as_str), Some("bar"));
        assert!(parse_pass_directives("x").is_empty());
        assert!(parse_pass_directives("").is_empty());
    }
}

// Changelog:
// - v1.0.1 (2025-07-19): Empty worker after the dot now falls back to "0".
// - v1.0.0 (2025-07-12): Initial coin profiles.
//   - Purpose: Centralizes per-coin rules (PoW family, nonce offset, address
//     shape, payment-id lengths, target encoding) and the stratum login
//     grammar shared by the session and the tests.
