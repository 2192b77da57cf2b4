// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/types.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file defines core data structures for the CN stratum pool, located in
// the core subdirectory. It includes types for command-line arguments, pool
// settings, block templates, worker jobs, and emitted shares.
//
// Tree Location:
// - src/core/types.rs (core data structures)
// - Depends on: clap, serde, parking_lot

use clap::Parser;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Weak;

/// Command-line arguments for the CN stratum pool daemon
#[derive(Parser, Debug)]
#[command(
    name = "cnpoold",
    author = "CN Pool Team",
    version = "1.1.0",
    about = "High-performance CryptoNote stratum pool core",
    long_about = "cnpoold accepts stratum miner connections, derives mining jobs from an\n\
                  upstream CryptoNote daemon, validates submitted shares, and publishes\n\
                  share events for downstream consumers.\n\n\
                  Examples:\n\
                    Quick start:  cnpoold --wallet YOUR_POOL_WALLET --daemon http://127.0.0.1:18081 --port 3333\n\
                    With config:  cnpoold --config pool.json\n\n\
                  For detailed help, use: cnpoold --help"
)]
pub struct Args {
    /// Path to the JSON settings file (port table, vardiff, ban policy)
    /// CLI flags below override the corresponding file values
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "JSON settings file (optional; defaults apply without one)"
    )]
    pub config: Option<String>,

    /// Pool wallet address that receives block rewards from mined templates
    #[arg(
        short = 'u',
        long = "wallet",
        value_name = "ADDRESS",
        help = "Pool wallet address for block templates"
    )]
    pub wallet: Option<String>,

    /// Upstream daemon JSON-RPC endpoint
    /// Examples: http://127.0.0.1:18081, http://daemon.internal:28081
    #[arg(
        short = 'd',
        long = "daemon",
        value_name = "URL",
        help = "Daemon JSON-RPC base URL"
    )]
    pub daemon: Option<String>,

    /// Stratum port to listen on (added to the configured port table)
    #[arg(
        short = 'o',
        long = "port",
        value_name = "PORT",
        help = "Stratum TCP port (in addition to the config port table)"
    )]
    pub port: Option<u16>,

    /// Coin profile selecting PoW family and address rules
    /// Known profiles: cryptonight, cryptonight-lite, cryptonight-heavy, randomx, fast-hash
    #[arg(
        long,
        value_name = "PROFILE",
        help = "Coin profile (e.g. randomx, cryptonight, fast-hash); overrides the config file"
    )]
    pub coin: Option<String>,

    /// Number of CPU hash-verification threads
    /// 0 = auto-detect physical cores (recommended)
    #[arg(
        short,
        long,
        default_value = "0",
        value_name = "COUNT",
        help = "Hash worker threads (0 = auto-detect)"
    )]
    pub threads: usize,
}

impl Args {
    /// Validate arguments and return helpful errors
    pub fn validate(&self) -> Result<(), String> {
        if self.config.is_none() {
            if self.wallet.is_none() {
                return Err("Pool wallet is required without a config file. Use --wallet ADDRESS".to_string());
            }
            if self.daemon.is_none() {
                return Err("Daemon URL is required without a config file. Use --daemon URL".to_string());
            }
        }
        if let Some(ref daemon) = self.daemon {
            if !daemon.starts_with("http://") && !daemon.starts_with("https://") {
                return Err("Daemon URL must start with http:// or https://".to_string());
            }
        }
        if self.threads > 1024 {
            return Err("Thread count cannot exceed 1024".to_string());
        }
        Ok(())
    }
}

/// Pool-wide settings, loadable from a JSON file
/// Every field has a default so a minimal file (or none) is enough to start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Coin profile name (see core::coin::CoinProfile::registry)
    pub coin: String,

    /// Pool wallet address inserted into block templates
    pub pool_wallet: String,

    /// Daemon JSON-RPC base URL
    pub daemon_url: String,

    /// Optional push template channel (WebSocket URL); polling continues as fallback
    pub template_stream_url: Option<String>,

    /// Template poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Re-broadcast the current template after this many seconds even if unchanged
    pub template_refresh_secs: u64,

    /// Reserved bytes requested from get_block_template for the instance nonce
    pub reserve_size: u32,

    /// Per-call daemon RPC timeout in seconds
    pub daemon_timeout_secs: u64,

    /// Block submission retry attempts before the block is dropped
    pub submit_retry_attempts: u32,

    /// Backoff between block submission retries in milliseconds
    pub submit_retry_backoff_ms: u64,

    /// Idle connection timeout in seconds (reads and broadcast liveness)
    pub connection_timeout_secs: u64,

    /// Submits older than this (server-observed) are dropped without response
    pub max_share_age_secs: u64,

    /// Hash worker threads (0 = auto-detect physical cores)
    pub hash_threads: usize,

    /// Message bus channel capacity
    pub bus_capacity: usize,

    /// Ban policy for misbehaving miners
    pub ban: BanConfig,

    /// Stratum port table
    pub ports: Vec<PortConfig>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            coin: "randomx".to_string(),
            pool_wallet: String::new(),
            daemon_url: "http://127.0.0.1:18081".to_string(),
            template_stream_url: None,
            poll_interval_ms: 1_000,
            template_refresh_secs: 60,
            reserve_size: 8,
            daemon_timeout_secs: 10,
            submit_retry_attempts: 3,
            submit_retry_backoff_ms: 500,
            connection_timeout_secs: 600,
            max_share_age_secs: 6,
            hash_threads: 0,
            bus_capacity: 1_024,
            ban: BanConfig::default(),
            ports: vec![PortConfig::default()],
        }
    }
}

/// Per-port stratum endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// TCP port to listen on
    pub port: u16,

    /// Vardiff policy for sessions on this port
    pub vardiff: VardiffConfig,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port: 3333,
            vardiff: VardiffConfig::default(),
        }
    }
}

/// Variable-difficulty retarget policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VardiffConfig {
    /// Difficulty assigned to a fresh session
    pub start_diff: u64,

    /// Lower clamp (also the floor for d= static difficulty)
    pub min_diff: u64,

    /// Upper clamp
    pub max_diff: u64,

    /// Desired seconds between shares
    pub target_time_secs: u64,

    /// Minimum seconds between retargets
    pub retarget_interval_secs: u64,

    /// Tolerated deviation from the target rate before retargeting (percent)
    pub variance_percent: u64,

    /// Share timestamps retained in the sliding window
    pub window: usize,
}

impl Default for VardiffConfig {
    fn default() -> Self {
        Self {
            start_diff: 5_000,
            min_diff: 100,
            max_diff: 100_000_000_000,
            target_time_secs: 10,
            retarget_interval_secs: 30,
            variance_percent: 30,
            window: 50,
        }
    }
}

/// Ban policy applied when a session keeps submitting invalid shares
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanConfig {
    /// Master switch
    pub enabled: bool,

    /// Invalid shares within the window that trigger a ban
    pub invalid_threshold: usize,

    /// Rolling window in seconds
    pub window_secs: u64,

    /// Ban duration in seconds
    pub duration_secs: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            invalid_threshold: 25,
            window_secs: 600,
            duration_secs: 600,
        }
    }
}

/// Snapshot of upstream work, immutable once created
/// Superseded when the daemon reports a different prev_hash, height, or
/// major version, or when the refresh interval forces a re-broadcast
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Height this template mines
    pub height: u64,

    /// Hash of the chain tip the template extends (32 bytes)
    pub prev_hash: [u8; 32],

    /// Binary header with a reserved slot for the instance nonce
    pub blob: Vec<u8>,

    /// Byte offset of the reserved instance-nonce slot within the blob
    pub reserved_offset: u32,

    /// Network difficulty; target = floor(2^256 / difficulty)
    pub difficulty: u64,

    /// Seed hash for RandomX-family variants (empty hex otherwise)
    pub seed_hash: String,

    /// Hard-fork version, selects the PoW variant
    pub major_version: u8,

    /// Expected block reward in atomic units
    pub reward: u64,
}

impl BlockTemplate {
    /// Identity used by the poller's emit rule
    pub fn work_id(&self) -> (u64, [u8; 32], u8) {
        (self.height, self.prev_hash, self.major_version)
    }
}

/// Per-session, per-template work unit
///
/// Only `submissions` mutates after creation; everything else is frozen at
/// mint time. The template is held weakly — once the job manager's retention
/// window drops the template, shares for this job are stale.
#[derive(Debug)]
pub struct WorkerJob {
    /// Monotonically increasing decimal string, global across the pool
    pub id: String,

    /// Back-reference to the template this job was minted from
    pub template: Weak<BlockTemplate>,

    /// Pool-scoped nonce spliced into the template's reserved slot
    pub instance_nonce: u32,

    /// Session-scoped nonce, bumped per mint
    pub extra_nonce: u32,

    /// Miner difficulty at mint time
    pub difficulty: u64,

    /// Height copied from the template (survives template expiry for logs)
    pub height: u64,

    /// Seed hash copied from the template
    pub seed_hash: String,

    /// Normalized nonces already submitted on this job
    submissions: Mutex<HashSet<String>>,
}

impl WorkerJob {
    pub fn new(
        id: String,
        template: Weak<BlockTemplate>,
        instance_nonce: u32,
        extra_nonce: u32,
        difficulty: u64,
        height: u64,
        seed_hash: String,
    ) -> Self {
        Self {
            id,
            template,
            instance_nonce,
            extra_nonce,
            difficulty,
            height,
            seed_hash,
            submissions: Mutex::new(HashSet::new()),
        }
    }

    /// Record a normalized (lowercase hex) nonce; returns false on duplicate
    pub fn record_submission(&self, nonce_hex: &str) -> bool {
        self.submissions.lock().insert(nonce_hex.to_string())
    }

    /// Number of nonces seen on this job
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

/// Verdict produced by the share validator and published on the message bus
#[derive(Debug, Clone)]
pub struct Share {
    /// Miner wallet address
    pub miner: String,

    /// Worker name ("0" when the login carried none)
    pub worker: String,

    /// Miner difficulty the share satisfies
    pub difficulty: u64,

    /// Network difficulty of the template the share was validated against
    pub network_difficulty: u64,

    /// True when the PoW hash also meets the network target
    pub is_block_candidate: bool,

    /// Block hash when the share was submitted upstream as a block
    pub block_hash: Option<String>,

    /// Height of the template
    pub block_height: u64,

    /// Expected reward of the template in atomic units
    pub block_reward: u64,

    /// Wall-clock creation time in Unix milliseconds
    pub created_ms: u64,
}

// Changelog:
// - v1.1.0 (2025-07-28): Added the push template channel setting.
//   - template_stream_url joins PoolSettings; poll_interval_ms stays as the
//     fallback cadence when the stream is silent.
// - v1.0.1 (2025-07-19): Moved the submission set behind WorkerJob methods.
//   - record_submission wraps the job-local mutex so callers cannot hold the
//     lock across an await point.
// - v1.0.0 (2025-07-12): Initial data model.
//   - Purpose: Defines the pool's core data structures: CLI arguments, pool
//     settings with a per-port vardiff table, block templates, worker jobs,
//     and the Share verdict published to downstream consumers.
//   - Note: This file is central to the pool's data model, ensuring
//     consistent type usage between the job manager, sessions, and the
//     validator.
