// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/server/banning.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements IP banning for the CN stratum pool, located in the
// server subdirectory. Sessions crossing the invalid-share threshold get
// their address banned for a configured duration; the listener screens
// incoming connections against the same service.
//
// Tree Location:
// - src/server/banning.rs (ban service)
// - Depends on: core, utils, parking_lot

use crate::core::types::BanConfig;
use crate::utils::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

/// Injected ban collaborator
pub trait BanService: Send + Sync {
    fn ban(&self, ip: IpAddr);
    fn is_banned(&self, ip: IpAddr) -> bool;
}

/// In-memory ban table with expiry
pub struct MemoryBanService {
    config: BanConfig,
    clock: Arc<dyn Clock>,
    banned_until: Mutex<HashMap<IpAddr, u64>>,
}

impl MemoryBanService {
    pub fn new(config: BanConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            banned_until: Mutex::new(HashMap::new()),
        }
    }
}

impl BanService for MemoryBanService {
    fn ban(&self, ip: IpAddr) {
        if !self.config.enabled {
            return;
        }
        let until = self.clock.now_ms() + self.config.duration_secs * 1_000;
        self.banned_until.lock().insert(ip, until);
        info!("🚫 Banned {} for {}s", ip, self.config.duration_secs);
    }

    fn is_banned(&self, ip: IpAddr) -> bool {
        if !self.config.enabled {
            return false;
        }
        let now = self.clock.now_ms();
        let mut table = self.banned_until.lock();
        match table.get(&ip) {
            Some(&until) if until > now => true,
            Some(_) => {
                table.remove(&ip);
                false
            }
            None => false,
        }
    }
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial in-memory ban table.
