// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/server/protocol.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the stratum wire protocol for the CN stratum pool,
// located in the server subdirectory. Frames are newline-delimited JSON-RPC
// 2.0. It defines the request envelope, typed parameter structs for the four
// supported methods, and the response builders.
//
// Tree Location:
// - src/server/protocol.rs (stratum wire protocol)
// - Depends on: serde, serde_json

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Longest accepted request line; a submit is well under 1 KiB
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

// Reserved error codes of this core
pub const ERR_GENERIC: i32 = -1;
pub const ERR_UNSUPPORTED_METHOD: i32 = 20;
pub const ERR_JOB_NOT_FOUND: i32 = 21;
pub const ERR_DUPLICATE_SHARE: i32 = 22;
pub const ERR_LOW_DIFFICULTY: i32 = 23;
pub const ERR_BAD_HASH: i32 = 24;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("missing request id")]
    MissingId,
    #[error("bad params: {0}")]
    BadParams(String),
}

/// Incoming JSON-RPC request envelope
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Requests must carry an id; notifications are not part of this dialect
    pub fn require_id(&self) -> Result<&Value, ProtocolError> {
        if self.id.is_null() {
            Err(ProtocolError::MissingId)
        } else {
            Ok(&self.id)
        }
    }

    pub fn params_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| ProtocolError::BadParams(e.to_string()))
    }
}

/// `login` params: `{login, pass, agent}`
#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub login: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub agent: String,
}

/// `getjob` / `keepalived` params: `{id}`
#[derive(Debug, Deserialize)]
pub struct SessionIdParams {
    #[serde(default)]
    pub id: String,
}

/// `submit` params: `{id, job_id, nonce, result}`
#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    #[serde(default)]
    pub id: String,
    pub job_id: String,
    pub nonce: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// Successful response envelope
pub fn result_response(id: &Value, result: Value) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "error": Value::Null,
        "result": result,
    })
}

/// Error response envelope
pub fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "result": Value::Null,
    })
}

/// Unsolicited `job` notification
pub fn job_notification(job_params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "job",
        "params": job_params,
    })
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial wire protocol.
//   - Purpose: Request envelope with typed params for login, getjob,
//     submit, and keepalived, plus the response and notification builders
//     and the reserved error code table.
