// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/utils/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for utility functions of the CN
// stratum pool, located in the utils subdirectory.
//
// Tree Location:
// - src/utils/mod.rs (utilities module entry point)
// - Submodules: clock, format

pub mod clock;
pub mod format;

pub use clock::{Clock, ManualClock, SystemClock};
pub use format::{format_hashrate, format_number, format_uptime};

// Changelog:
// - v1.0.0 (2025-07-12): Initial utilities module.
