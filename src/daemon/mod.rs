// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/daemon/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for upstream daemon communication in
// the CN stratum pool, located in the daemon subdirectory.
//
// Tree Location:
// - src/daemon/mod.rs (daemon module entry point)
// - Submodules: client, poller

pub mod client;
pub mod poller;

pub use client::{BlockHeaderInfo, DaemonClient, DaemonError, DaemonInfo, DaemonRpc, TemplateReply};
pub use poller::TemplatePoller;

// Changelog:
// - v1.0.0 (2025-07-12): Initial daemon module.
