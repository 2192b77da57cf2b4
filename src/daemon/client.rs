// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/daemon/client.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the JSON-RPC client for the upstream CryptoNote
// daemon, located in the daemon subdirectory. The pool calls
// get_block_template, submit_block, get_info, and get_block_header_by_hash
// over HTTP with a per-call timeout. The transport is a trait so tests and
// embedders can inject their own daemon.
//
// Tree Location:
// - src/daemon/client.rs (daemon JSON-RPC client)
// - Depends on: reqwest, serde_json, async-trait

use crate::bus::{MessageBus, PoolEvent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon transport error: {0}")]
    Transport(String),
    #[error("daemon rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("daemon reply missing field: {0}")]
    MissingField(&'static str),
    #[error("daemon reply malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for DaemonError {
    fn from(e: reqwest::Error) -> Self {
        DaemonError::Transport(e.to_string())
    }
}

/// get_block_template reply, field names as the daemon sends them
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateReply {
    pub blocktemplate_blob: String,
    pub difficulty: u64,
    pub height: u64,
    pub prev_hash: String,
    pub reserved_offset: u32,
    #[serde(default)]
    pub seed_hash: String,
    #[serde(default)]
    pub expected_reward: u64,
}

/// Subset of get_info the pool cares about
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonInfo {
    pub height: u64,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub top_block_hash: String,
}

/// Subset of get_block_header_by_hash
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderInfo {
    pub height: u64,
    pub hash: String,
    #[serde(default)]
    pub reward: u64,
    #[serde(default)]
    pub orphan_status: bool,
}

/// Upstream daemon contract, injected into the poller and validator
#[async_trait]
pub trait DaemonRpc: Send + Sync {
    async fn get_block_template(
        &self,
        wallet_address: &str,
        reserve_size: u32,
    ) -> Result<TemplateReply, DaemonError>;

    async fn submit_block(&self, blob_hex: &str) -> Result<(), DaemonError>;

    async fn get_info(&self) -> Result<DaemonInfo, DaemonError>;

    async fn get_block_header_by_hash(&self, hash: &str) -> Result<BlockHeaderInfo, DaemonError>;
}

/// HTTP JSON-RPC implementation of DaemonRpc
pub struct DaemonClient {
    http: reqwest::Client,
    endpoint: String,
    bus: MessageBus,
}

impl DaemonClient {
    pub fn new(base_url: &str, timeout: Duration, bus: MessageBus) -> Result<Self, DaemonError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DaemonError::from)?;
        Ok(Self {
            http,
            endpoint: format!("{}/json_rpc", base_url.trim_end_matches('/')),
            bus,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, DaemonError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params,
        });
        debug!("📡 Daemon call: {}", method);
        let started = Instant::now();
        let outcome = self.call_inner(&request).await;
        self.bus.publish(PoolEvent::Telemetry {
            category: "daemon_rpc",
            duration_ms: started.elapsed().as_millis() as u64,
            success: outcome.is_ok(),
        });
        outcome
    }

    async fn call_inner(&self, request: &Value) -> Result<Value, DaemonError> {
        let reply: Value = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = reply.get("error") {
            return Err(DaemonError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        reply
            .get("result")
            .cloned()
            .ok_or(DaemonError::MissingField("result"))
    }
}

#[async_trait]
impl DaemonRpc for DaemonClient {
    async fn get_block_template(
        &self,
        wallet_address: &str,
        reserve_size: u32,
    ) -> Result<TemplateReply, DaemonError> {
        let result = self
            .call(
                "get_block_template",
                json!({ "wallet_address": wallet_address, "reserve_size": reserve_size }),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| DaemonError::Malformed(e.to_string()))
    }

    async fn submit_block(&self, blob_hex: &str) -> Result<(), DaemonError> {
        // submit_block takes a positional array of blobs
        self.call("submit_block", json!([blob_hex])).await.map(|_| ())
    }

    async fn get_info(&self) -> Result<DaemonInfo, DaemonError> {
        let result = self.call("get_info", json!({})).await?;
        serde_json::from_value(result).map_err(|e| DaemonError::Malformed(e.to_string()))
    }

    async fn get_block_header_by_hash(&self, hash: &str) -> Result<BlockHeaderInfo, DaemonError> {
        let result = self
            .call("get_block_header_by_hash", json!({ "hash": hash }))
            .await?;
        let header = result
            .get("block_header")
            .cloned()
            .ok_or(DaemonError::MissingField("block_header"))?;
        serde_json::from_value(header).map_err(|e| DaemonError::Malformed(e.to_string()))
    }
}

/// Submit a block with bounded retry; returns Ok(false) when every attempt
/// failed on transport and the block was dropped (the share is kept either
/// way), Err on an explicit daemon rejection
pub async fn submit_block_with_retry(
    daemon: &dyn DaemonRpc,
    blob_hex: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<bool, DaemonError> {
    let mut last_error = String::new();
    for attempt in 1..=attempts.max(1) {
        match daemon.submit_block(blob_hex).await {
            Ok(()) => return Ok(true),
            Err(DaemonError::Rpc { code, message }) => {
                // an explicit rejection will not change on retry
                return Err(DaemonError::Rpc { code, message });
            }
            Err(e) => {
                warn!("⚠️ submit_block attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    warn!("🧱 Block submission dropped after {} attempts: {}", attempts, last_error);
    Ok(false)
}


// Changelog:
// - v1.0.1 (2025-07-28): Extracted submit_block_with_retry.
//   - Transport failures retry with backoff; explicit daemon rejections
//     short-circuit because retrying them cannot succeed.
// - v1.0.0 (2025-07-12): Initial daemon client.
//   - Purpose: Typed JSON-RPC calls the pool core needs, behind the
//     DaemonRpc trait so the test suite can stub the upstream.
