// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/support/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file provides the shared integration-test harness: a pool core on a
// real TCP listener with a stubbed daemon, a manual clock, and a line-based
// test miner client.
//
// Tree Location:
// - tests/support/mod.rs (integration test harness)
// - Depends on: cn-pool, tokio, serde_json, hex

#![allow(dead_code)]

use async_trait::async_trait;
use cn_pool::core::blob::splice_worker_nonce;
use cn_pool::core::coin::CoinProfile;
use cn_pool::core::pow::{keccak256, PowRegistry};
use cn_pool::core::types::{BlockTemplate, PoolSettings, PortConfig, VardiffConfig};
use cn_pool::daemon::client::{
    BlockHeaderInfo, DaemonError, DaemonInfo, DaemonRpc, TemplateReply,
};
use cn_pool::jobs::JobManager;
use cn_pool::server::banning::MemoryBanService;
use cn_pool::server::broadcast::run_broadcaster;
use cn_pool::server::session::{run_session, SessionContext};
use cn_pool::server::SessionRegistry;
use cn_pool::stats;
use cn_pool::utils::clock::ManualClock;
use cn_pool::validator::workers::HashWorkerPool;
use cn_pool::validator::ShareValidator;
use cn_pool::MessageBus;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Scripted upstream daemon recording block submissions
pub struct StubDaemon {
    pub submits: Mutex<Vec<String>>,
    pub reject_blocks: bool,
}

impl StubDaemon {
    pub fn accepting() -> Self {
        Self { submits: Mutex::new(Vec::new()), reject_blocks: false }
    }
}

#[async_trait]
impl DaemonRpc for StubDaemon {
    async fn get_block_template(
        &self,
        _wallet_address: &str,
        _reserve_size: u32,
    ) -> Result<TemplateReply, DaemonError> {
        Err(DaemonError::Transport("stub daemon has no templates".to_string()))
    }

    async fn submit_block(&self, blob_hex: &str) -> Result<(), DaemonError> {
        self.submits.lock().push(blob_hex.to_string());
        if self.reject_blocks {
            Err(DaemonError::Rpc { code: -7, message: "Block not accepted".to_string() })
        } else {
            Ok(())
        }
    }

    async fn get_info(&self) -> Result<DaemonInfo, DaemonError> {
        Err(DaemonError::Transport("stub".to_string()))
    }

    async fn get_block_header_by_hash(&self, _hash: &str) -> Result<BlockHeaderInfo, DaemonError> {
        Err(DaemonError::Transport("stub".to_string()))
    }
}

/// A pool core listening on an ephemeral port
pub struct TestPool {
    pub addr: SocketAddr,
    pub job_manager: Arc<JobManager>,
    pub daemon: Arc<StubDaemon>,
    pub bus: MessageBus,
    pub clock: Arc<ManualClock>,
    cancel: CancellationToken,
}

impl TestPool {
    pub async fn start(network_difficulty: u64) -> Self {
        let profile = CoinProfile::by_name("fast-hash").unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let bus = MessageBus::new(256);
        let daemon = Arc::new(StubDaemon::accepting());
        let cancel = CancellationToken::new();

        let mut settings = PoolSettings::default();
        settings.coin = "fast-hash".to_string();
        settings.pool_wallet = "test-pool-wallet".to_string();
        settings.submit_retry_backoff_ms = 1;

        let job_manager = Arc::new(JobManager::new(profile.clone()));
        job_manager.publish(test_template(100, network_difficulty));

        let hash_pool = HashWorkerPool::spawn(Arc::new(PowRegistry::with_builtins()), 2);
        let validator = Arc::new(ShareValidator::new(
            hash_pool,
            daemon.clone(),
            bus.clone(),
            clock.clone(),
            profile,
            &settings,
        ));

        let registry = SessionRegistry::new();
        let port_config = PortConfig {
            port: 0,
            vardiff: VardiffConfig {
                start_diff: 1,
                min_diff: 1,
                max_diff: 1_000_000_000_000,
                target_time_secs: 10,
                retarget_interval_secs: 30,
                variance_percent: 30,
                window: 50,
            },
        };
        let ctx = Arc::new(SessionContext {
            port_config,
            job_manager: job_manager.clone(),
            validator,
            registry: registry.clone(),
            bans: Arc::new(MemoryBanService::new(settings.ban.clone(), clock.clone())),
            bus: bus.clone(),
            clock: clock.clone(),
            connection_timeout: Duration::from_secs(settings.connection_timeout_secs),
            max_share_age: Duration::from_secs(settings.max_share_age_secs),
            ban_config: settings.ban.clone(),
            cancel: cancel.clone(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        accepted = listener.accept() => {
                            let Ok((stream, peer)) = accepted else { return };
                            let ctx = ctx.clone();
                            tokio::spawn(run_session(stream, peer, ctx));
                        }
                    }
                }
            });
        }
        tokio::spawn(run_broadcaster(
            job_manager.clone(),
            registry.clone(),
            clock.clone(),
            Duration::from_secs(settings.connection_timeout_secs),
            cancel.clone(),
        ));
        tokio::spawn(stats::run_stats_logger(
            Arc::new(stats::PoolStats::new()),
            bus.clone(),
            registry,
            clock.clone(),
            cancel.clone(),
        ));

        // let the accept loop and broadcaster tasks come up
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self { addr, job_manager, daemon, bus, clock, cancel }
    }

    /// Publish a fresh template; the broadcaster fans it out
    pub fn publish_template(&self, height: u64, network_difficulty: u64) {
        self.job_manager.publish(test_template(height, network_difficulty));
    }

    pub async fn connect(&self) -> TestMiner {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        TestMiner {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

pub fn test_template(height: u64, difficulty: u64) -> Arc<BlockTemplate> {
    let mut blob = vec![0u8; 76];
    blob[0] = 1;
    blob[1] = height as u8;
    Arc::new(BlockTemplate {
        height,
        prev_hash: [height as u8; 32],
        blob,
        reserved_offset: 55,
        difficulty,
        seed_hash: String::new(),
        major_version: 1,
        reward: 780_000_000,
    })
}

pub struct LoginResult {
    pub session_id: String,
    pub job: Value,
}

/// Line-based stratum client for tests
pub struct TestMiner {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestMiner {
    pub async fn send(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    pub async fn send_raw(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next frame of any kind
    pub async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Next response, skipping unsolicited notifications
    pub async fn recv_response(&mut self) -> Value {
        loop {
            let frame = self.recv().await;
            if frame.get("method").is_none() {
                return frame;
            }
        }
    }

    /// Next unsolicited notification, skipping nothing
    pub async fn recv_notification(&mut self) -> Value {
        loop {
            let frame = self.recv().await;
            if frame.get("method").is_some() {
                return frame;
            }
        }
    }

    pub async fn request(&mut self, value: Value) -> Value {
        self.send(value).await;
        self.recv_response().await
    }

    pub async fn request_raw(&mut self, raw: &str) -> Value {
        self.send_raw(raw).await;
        self.recv_response().await
    }

    /// Login and unpack the session id and initial job
    pub async fn login(&mut self, address: &str) -> LoginResult {
        let response = self
            .request(json!({
                "id": 1, "jsonrpc": "2.0", "method": "login",
                "params": {"login": address, "pass": "x", "agent": "cn-test/1.0"}
            }))
            .await;
        assert!(response["error"].is_null(), "login failed: {}", response);
        LoginResult {
            session_id: response["result"]["id"].as_str().unwrap().to_string(),
            job: response["result"]["job"].clone(),
        }
    }
}

/// Build the (nonce, result) pair a correct miner would submit for a job
pub fn valid_submit(job: &Value, nonce: [u8; 4]) -> (String, String) {
    let mut blob = hex::decode(job["blob"].as_str().unwrap()).unwrap();
    splice_worker_nonce(&mut blob, 39, &nonce).unwrap();
    (hex::encode(nonce), hex::encode(keccak256(&blob)))
}

// Changelog:
// - v1.0.0 (2025-07-12): Initial harness.
//   - Purpose: Boots the full session/validator/broadcast stack on an
//     ephemeral port so protocol tests drive real sockets end to end.
