// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/lib.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file serves as the main library entry point for the CN stratum pool,
// located at the root of the source tree. It exports all public modules
// and types that other crates or binaries can use.
//
// Tree Location:
// - src/lib.rs (root library file)
// - Exports modules: core, daemon, jobs, validator, server, vardiff, bus, stats, utils

pub mod bus;
pub mod core;
pub mod daemon;
pub mod jobs;
pub mod server;
pub mod stats;
pub mod utils;
pub mod validator;
pub mod vardiff;

// Re-export commonly used types at the crate root for convenience
pub use crate::bus::{MessageBus, PoolEvent};
pub use crate::core::types::{BlockTemplate, PoolSettings, PortConfig, Share, WorkerJob};
pub use crate::daemon::{DaemonClient, DaemonRpc, TemplatePoller};
pub use crate::jobs::JobManager;
pub use crate::server::StratumServer;
pub use crate::validator::ShareValidator;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Changelog:
// - v1.1.0 (2025-07-28): Split daemon polling out of the jobs module.
//   - Re-exported TemplatePoller and the DaemonRpc trait so embedders can
//     inject their own daemon transport.
// - v1.0.0 (2025-07-12): Initial modular layout.
//   - Purpose: Establishes the library root, organizing the pool into core,
//     daemon, jobs, validator, server, vardiff, bus, stats, and utils modules.
//   - Features: Exports key types (e.g., JobManager, StratumServer) for easy
//     access and defines a common Result type for binary-level plumbing.
//   - Note: This file acts as the public interface, simplifying integration
//     with main.rs and embedding the pool core in a larger daemon.
