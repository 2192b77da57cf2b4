// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/server/session.rs
// Version: 1.1.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the per-connection stratum session for the CN
// stratum pool, located in the server subdirectory. Each TCP connection is
// one task owning its framed socket and session state; the broadcaster and
// vardiff talk to it through a command mailbox, so all writes stay serialized
// in one place. The session serves login, getjob, submit, and keepalived,
// escalates invalid work to the ban service, and applies pending difficulty
// at job-mint boundaries.
//
// Tree Location:
// - src/server/session.rs (session actor and request handlers)
// - Depends on: server::protocol, jobs, validator, vardiff, utils, tokio-util

use crate::bus::{MessageBus, PoolEvent};
use crate::core::coin::WorkerIdentity;
use crate::core::types::{BanConfig, PortConfig, WorkerJob};
use crate::jobs::{JobError, JobManager, MintedJob};
use crate::server::protocol::{
    error_response, job_notification, result_response, LoginParams, RpcRequest, SessionIdParams,
    SubmitParams, ERR_GENERIC, ERR_JOB_NOT_FOUND, ERR_UNSUPPORTED_METHOD, MAX_LINE_LENGTH,
};
use crate::server::SessionRegistry;
use crate::server::banning::BanService;
use crate::utils::clock::Clock;
use crate::validator::ShareValidator;
use crate::vardiff::VardiffState;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Jobs a session keeps resolvable; older submissions are stale
pub const RECENT_JOB_CAPACITY: usize = 4;

/// Commands delivered through the session mailbox
#[derive(Debug)]
pub enum SessionCommand {
    /// Mint a fresh job and push an unsolicited notification
    SendJob,
    /// Close the connection with a reason for the log
    Close(&'static str),
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub valid_shares: AtomicU64,
    pub invalid_shares: AtomicU64,
}

/// State shared between the session task, the broadcaster, and vardiff
pub struct SessionShared {
    pub connection_id: String,
    pub peer: SocketAddr,
    pub authorized: AtomicBool,
    pub last_activity_ms: AtomicU64,
    pub difficulty: AtomicU64,
    pub static_difficulty: AtomicBool,
    pub stats: SessionStats,
    pub user_agent: Mutex<String>,
    pending_difficulty: Mutex<Option<u64>>,
    extra_nonce: AtomicU32,
    miner: Mutex<Option<WorkerIdentity>>,
    recent_jobs: Mutex<VecDeque<Arc<WorkerJob>>>,
    vardiff: Mutex<VardiffState>,
    invalid_events: Mutex<VecDeque<u64>>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionShared {
    fn new(peer: SocketAddr, now_ms: u64, commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            connection_id: format!("{:016x}", rand::random::<u64>()),
            peer,
            authorized: AtomicBool::new(false),
            last_activity_ms: AtomicU64::new(now_ms),
            difficulty: AtomicU64::new(0),
            static_difficulty: AtomicBool::new(false),
            stats: SessionStats::default(),
            pending_difficulty: Mutex::new(None),
            extra_nonce: AtomicU32::new(0),
            user_agent: Mutex::new(String::new()),
            miner: Mutex::new(None),
            recent_jobs: Mutex::new(VecDeque::with_capacity(RECENT_JOB_CAPACITY)),
            vardiff: Mutex::new(VardiffState::new()),
            invalid_events: Mutex::new(VecDeque::new()),
            commands,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(
        peer: SocketAddr,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self::new(peer, 0, commands)
    }

    /// Enqueue a command; false once the session task is gone
    pub fn send_command(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn touch(&self, now_ms: u64) {
        self.last_activity_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn miner_identity(&self) -> Option<WorkerIdentity> {
        self.miner.lock().clone()
    }

    /// Apply any pending difficulty; mint boundaries are the only place the
    /// session difficulty steps
    fn next_difficulty(&self) -> u64 {
        if let Some(pending) = self.pending_difficulty.lock().take() {
            self.difficulty.store(pending, Ordering::Relaxed);
        }
        self.difficulty.load(Ordering::Relaxed)
    }

    fn set_pending_difficulty(&self, difficulty: u64) {
        *self.pending_difficulty.lock() = Some(difficulty);
    }

    fn push_job(&self, job: Arc<WorkerJob>) {
        let mut jobs = self.recent_jobs.lock();
        jobs.push_back(job);
        while jobs.len() > RECENT_JOB_CAPACITY {
            jobs.pop_front();
        }
    }

    fn find_job(&self, job_id: &str) -> Option<Arc<WorkerJob>> {
        self.recent_jobs.lock().iter().find(|j| j.id == job_id).cloned()
    }

    /// Track an invalid share; true when the ban threshold is crossed
    fn record_invalid(&self, now_ms: u64, config: &BanConfig) -> bool {
        if !config.enabled {
            return false;
        }
        let mut events = self.invalid_events.lock();
        events.push_back(now_ms);
        let cutoff = now_ms.saturating_sub(config.window_secs * 1_000);
        while events.front().is_some_and(|&t| t < cutoff) {
            events.pop_front();
        }
        events.len() >= config.invalid_threshold
    }
}

/// Constructor wiring shared by every session on one port
pub struct SessionContext {
    pub port_config: PortConfig,
    pub job_manager: Arc<JobManager>,
    pub validator: Arc<ShareValidator>,
    pub registry: SessionRegistry,
    pub bans: Arc<dyn BanService>,
    pub bus: MessageBus,
    pub clock: Arc<dyn Clock>,
    pub connection_timeout: Duration,
    pub max_share_age: Duration,
    pub ban_config: BanConfig,
    pub cancel: CancellationToken,
}

/// Drive one connection until EOF, timeout, close command, or shutdown
pub async fn run_session(stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) {
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(SessionShared::new(peer, ctx.clock.now_ms(), cmd_tx));
    ctx.registry.insert(shared.clone());
    debug!("🔗 Connection {} from {}", shared.connection_id, peer);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("🛑 Session {} stopping on shutdown", shared.connection_id);
                break;
            }
            Some(command) = cmd_rx.recv() => match command {
                SessionCommand::SendJob => {
                    if push_job_notification(&mut framed, &shared, &ctx).await.is_err() {
                        break;
                    }
                }
                SessionCommand::Close(reason) => {
                    info!("👋 Closing {}: {}", shared.connection_id, reason);
                    break;
                }
            },
            read = tokio::time::timeout(ctx.connection_timeout, framed.next()) => match read {
                Err(_) => {
                    info!("⏰ Session {} idle timeout", shared.connection_id);
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    debug!("🔗 Session {} read error: {}", shared.connection_id, e);
                    break;
                }
                Ok(Some(Ok(line))) => {
                    let arrival_ms = ctx.clock.now_ms();
                    if let Some(response) = handle_line(&line, arrival_ms, &shared, &ctx).await {
                        if framed.send(response.to_string()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    ctx.registry.remove(&shared.connection_id);
    if let Some(identity) = shared.miner_identity() {
        info!("⛏️ Miner {}@{} disconnected", identity.address, identity.worker);
    }
}

/// Mint at the session's current difficulty and remember the job
fn mint_for_session(shared: &SessionShared, ctx: &SessionContext) -> Result<MintedJob, JobError> {
    let difficulty = shared.next_difficulty();
    let extra_nonce = shared.extra_nonce.fetch_add(1, Ordering::Relaxed);
    let minted = ctx.job_manager.mint_job(difficulty, extra_nonce)?;
    shared.push_job(minted.job.clone());
    Ok(minted)
}

async fn push_job_notification(
    framed: &mut Framed<TcpStream, LinesCodec>,
    shared: &SessionShared,
    ctx: &SessionContext,
) -> Result<(), ()> {
    if !shared.authorized.load(Ordering::Relaxed) {
        return Ok(());
    }
    match mint_for_session(shared, ctx) {
        Ok(minted) => {
            debug!("📋 Job {} → session {}", minted.job.id, shared.connection_id);
            framed
                .send(job_notification(minted.params).to_string())
                .await
                .map_err(|_| ())
        }
        Err(e) => {
            warn!("⚠️ Could not mint job for {}: {}", shared.connection_id, e);
            Ok(())
        }
    }
}

/// Parse and dispatch one request line; None means no response goes out
async fn handle_line(
    line: &str,
    arrival_ms: u64,
    shared: &Arc<SessionShared>,
    ctx: &Arc<SessionContext>,
) -> Option<Value> {
    shared.touch(arrival_ms);
    let request = match RpcRequest::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("📨 Malformed request from {}: {}", shared.connection_id, e);
            return Some(error_response(&Value::Null, ERR_GENERIC, "Malformed request"));
        }
    };
    let id = match request.require_id() {
        Ok(id) => id.clone(),
        Err(_) => return Some(error_response(&Value::Null, ERR_GENERIC, "Missing request id")),
    };

    match request.method.as_str() {
        "login" => Some(handle_login(&request, &id, shared, ctx)),
        "getjob" => Some(handle_getjob(&request, &id, shared, ctx)),
        "submit" => handle_submit(&request, &id, arrival_ms, shared, ctx).await,
        "keepalived" => Some(handle_keepalived(&request, &id, shared)),
        method => Some(error_response(
            &id,
            ERR_UNSUPPORTED_METHOD,
            &format!("Unsupported request {}", method),
        )),
    }
}

fn handle_login(
    request: &RpcRequest,
    id: &Value,
    shared: &Arc<SessionShared>,
    ctx: &Arc<SessionContext>,
) -> Value {
    let params: LoginParams = match request.params_as() {
        Ok(params) => params,
        Err(e) => return login_failure(id, shared, ctx, &e.to_string()),
    };
    let profile = ctx.job_manager.profile();
    let identity = match WorkerIdentity::parse(&params.login, profile) {
        Ok(identity) => identity,
        Err(e) => return login_failure(id, shared, ctx, &e.to_string()),
    };

    // a re-login keeps the session id and difficulty; nothing regresses
    let first_login = !shared.authorized.load(Ordering::Relaxed);
    if first_login {
        let vardiff = &ctx.port_config.vardiff;
        let directives = crate::core::coin::parse_pass_directives(&params.pass);
        let mut difficulty = vardiff.start_diff;
        if let Some(fixed) = directives.get("d").and_then(|v| v.parse::<u64>().ok()) {
            if fixed >= vardiff.min_diff {
                difficulty = fixed.min(vardiff.max_diff);
                shared.static_difficulty.store(true, Ordering::Relaxed);
            } else {
                info!(
                    "🔧 Ignoring static difficulty {} below floor {} for {}",
                    fixed, vardiff.min_diff, identity.address
                );
            }
        }
        shared.difficulty.store(difficulty, Ordering::Relaxed);
    }

    *shared.miner.lock() = Some(identity.clone());
    *shared.user_agent.lock() = params.agent.clone();

    let minted = match mint_for_session(shared, ctx) {
        Ok(minted) => minted,
        Err(e) => return login_failure(id, shared, ctx, &e.to_string()),
    };
    shared.authorized.store(true, Ordering::Relaxed);
    info!(
        "⛏️ Miner logged in: {}@{} agent={} diff={}",
        identity.address,
        identity.worker,
        params.agent,
        minted.job.difficulty
    );
    result_response(
        id,
        json!({
            "id": shared.connection_id.clone(),
            "job": minted.params,
            "status": "OK",
        }),
    )
}

fn login_failure(
    id: &Value,
    shared: &Arc<SessionShared>,
    ctx: &Arc<SessionContext>,
    message: &str,
) -> Value {
    escalate_invalid(shared, ctx);
    error_response(id, ERR_GENERIC, message)
}

fn handle_getjob(
    request: &RpcRequest,
    id: &Value,
    shared: &Arc<SessionShared>,
    ctx: &Arc<SessionContext>,
) -> Value {
    let params: SessionIdParams = match request.params_as() {
        Ok(params) => params,
        Err(e) => return error_response(id, ERR_GENERIC, &e.to_string()),
    };
    if !session_matches(shared, &params.id) {
        return error_response(id, ERR_GENERIC, "Unauthenticated");
    }
    match mint_for_session(shared, ctx) {
        Ok(minted) => result_response(id, minted.params),
        Err(e) => error_response(id, ERR_GENERIC, &e.to_string()),
    }
}

async fn handle_submit(
    request: &RpcRequest,
    id: &Value,
    arrival_ms: u64,
    shared: &Arc<SessionShared>,
    ctx: &Arc<SessionContext>,
) -> Option<Value> {
    let params: SubmitParams = match request.params_as() {
        Ok(params) => params,
        Err(e) => return Some(error_response(id, ERR_GENERIC, &e.to_string())),
    };
    if !session_matches(shared, &params.id) {
        escalate_invalid(shared, ctx);
        return Some(error_response(id, ERR_GENERIC, "Unauthenticated"));
    }

    // overload guard: a submit that sat in the pipe too long is dropped
    // outright, no response and no counters
    if is_overload_stale(arrival_ms, ctx.clock.now_ms(), ctx.max_share_age) {
        warn!(
            "🗑️ Dropping stale submit from {} (age above {:?})",
            shared.connection_id, ctx.max_share_age
        );
        return None;
    }

    let Some(job) = shared.find_job(&params.job_id) else {
        shared.stats.invalid_shares.fetch_add(1, Ordering::Relaxed);
        // rejected before the validator ran, so emit its telemetry here to
        // keep the pool-wide rejection counter in step with the session's
        ctx.bus.publish(PoolEvent::Telemetry {
            category: "share_validation",
            duration_ms: 0,
            success: false,
        });
        escalate_invalid(shared, ctx);
        return Some(error_response(id, ERR_JOB_NOT_FOUND, "Job not found"));
    };
    let miner = shared.miner_identity()?;

    match ctx
        .validator
        .process_submission(&miner, &ctx.job_manager, &job, &params.nonce, params.result.as_deref())
        .await
    {
        Ok(share) => {
            shared.stats.valid_shares.fetch_add(1, Ordering::Relaxed);
            debug!(
                "✅ Share accepted from {}@{} (candidate={})",
                miner.address, miner.worker, share.is_block_candidate
            );
            maybe_retarget(shared, ctx);
            Some(result_response(id, json!({ "status": "OK" })))
        }
        Err(e) => {
            shared.stats.invalid_shares.fetch_add(1, Ordering::Relaxed);
            info!("❌ Share rejected from {}: {}", miner.address, e);
            escalate_invalid(shared, ctx);
            Some(error_response(id, e.code(), &e.to_string()))
        }
    }
}

fn handle_keepalived(request: &RpcRequest, id: &Value, shared: &Arc<SessionShared>) -> Value {
    let params: SessionIdParams = match request.params_as() {
        Ok(params) => params,
        Err(e) => return error_response(id, ERR_GENERIC, &e.to_string()),
    };
    if !session_matches(shared, &params.id) {
        return error_response(id, ERR_GENERIC, "Unauthenticated");
    }
    result_response(id, json!({ "status": "KEEPALIVED" }))
}

fn session_matches(shared: &SessionShared, claimed_id: &str) -> bool {
    shared.authorized.load(Ordering::Relaxed) && claimed_id == shared.connection_id
}

/// Feed vardiff after an accepted share; a proposal becomes pending
/// difficulty and the refreshed job goes out immediately
fn maybe_retarget(shared: &Arc<SessionShared>, ctx: &Arc<SessionContext>) {
    if shared.static_difficulty.load(Ordering::Relaxed) {
        return;
    }
    let now_ms = ctx.clock.now_ms();
    let current = shared.difficulty.load(Ordering::Relaxed);
    let proposal = {
        let mut vardiff = shared.vardiff.lock();
        vardiff.record_share(now_ms, &ctx.port_config.vardiff);
        vardiff.retarget(current, &ctx.port_config.vardiff, now_ms)
    };
    if let Some(new_difficulty) = proposal {
        info!(
            "🔧 VarDiff retarget for {}: {} → {}",
            shared.connection_id, current, new_difficulty
        );
        shared.set_pending_difficulty(new_difficulty);
        shared.send_command(SessionCommand::SendJob);
    }
}

fn escalate_invalid(shared: &Arc<SessionShared>, ctx: &Arc<SessionContext>) {
    if shared.record_invalid(ctx.clock.now_ms(), &ctx.ban_config) {
        warn!("🚫 Session {} crossed the invalid-share threshold", shared.connection_id);
        ctx.bans.ban(shared.peer.ip());
        shared.send_command(SessionCommand::Close("banned for invalid shares"));
    }
}

/// True when a submit's server-observed age exceeds the configured maximum
fn is_overload_stale(arrival_ms: u64, now_ms: u64, max_share_age: Duration) -> bool {
    now_ms.saturating_sub(arrival_ms) > max_share_age.as_millis() as u64
}


// Changelog:
// - v1.1.1 (2025-08-01): Unknown-job rejections now emit validation
//   telemetry so the pool-wide rejection counter matches session stats.
// - v1.1.0 (2025-07-28): Ban escalation and the overload stale guard.
// - v1.0.1 (2025-07-19): Re-login keeps the connection id and difficulty.
// - v1.0.0 (2025-07-12): Initial session actor.
//   - Purpose: One task per connection owning the framed socket; the
//     broadcaster and vardiff reach it through the command mailbox so
//     writes stay strictly ordered.
