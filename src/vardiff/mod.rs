// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/vardiff/mod.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements per-session variable difficulty for the CN stratum
// pool, located in the vardiff subdirectory. Each session keeps a sliding
// window of accepted-share timestamps; when the observed share rate drifts
// outside the configured variance band, a new difficulty proportional to the
// rate ratio is proposed. The session applies it at the next job mint.
//
// Tree Location:
// - src/vardiff/mod.rs (vardiff state and retarget rule)
// - Depends on: core

use crate::core::types::VardiffConfig;
use std::collections::VecDeque;

/// Sliding window of accepted-share timestamps for one session
#[derive(Debug, Default)]
pub struct VardiffState {
    window: VecDeque<u64>,
}

impl VardiffState {
    pub fn new() -> Self {
        Self { window: VecDeque::new() }
    }

    /// Record an accepted share at `now_ms`, bounding the window
    pub fn record_share(&mut self, now_ms: u64, cfg: &VardiffConfig) {
        self.window.push_back(now_ms);
        while self.window.len() > cfg.window.max(2) {
            self.window.pop_front();
        }
    }

    /// Shares currently in the window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Propose a new difficulty, or None when the rate is inside the band
    /// or the window is too young. A proposal clears the window so the next
    /// measurement starts fresh at the new difficulty.
    pub fn retarget(&mut self, current_diff: u64, cfg: &VardiffConfig, now_ms: u64) -> Option<u64> {
        if self.window.len() < 2 {
            return None;
        }
        let oldest = *self.window.front()?;
        let span_ms = now_ms.saturating_sub(oldest);
        if span_ms < cfg.retarget_interval_secs * 1_000 || span_ms == 0 {
            return None;
        }

        // intervals per span, not shares per span: counting the anchor share
        // would bias small windows high and the difficulty never settles
        let actual_rate = (self.window.len() - 1) as f64 / (span_ms as f64 / 1_000.0);
        let target_rate = 1.0 / cfg.target_time_secs.max(1) as f64;
        let ratio = actual_rate / target_rate;
        if (ratio - 1.0).abs() <= cfg.variance_percent as f64 / 100.0 {
            return None;
        }

        let proposed = (current_diff as f64 * ratio) as u64;
        let clamped = proposed.clamp(cfg.min_diff, cfg.max_diff);
        if clamped == current_diff {
            return None;
        }
        self.window.clear();
        Some(clamped)
    }
}


// Changelog:
// - v1.0.1 (2025-07-19): Clear the window on every proposal.
//   - Keeps one burst from triggering a cascade of retargets before shares
//     at the new difficulty arrive.
// - v1.0.0 (2025-07-12): Initial retarget rule.
//   - Purpose: Sliding-window rate measurement with proportional
//     adjustment, clamped to the port's difficulty bounds.
