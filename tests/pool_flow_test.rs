// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/pool_flow_test.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file contains integration tests for the pool-wide flows: template
// broadcast fan-out to every authorized session and the block-candidate
// path through the stubbed daemon and the message bus.
//
// Tree Location:
// - tests/pool_flow_test.rs (broadcast and candidate integration tests)
// - Depends on: cn-pool, tokio, serde_json

mod support;

use cn_pool::bus::PoolEvent;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use support::{valid_submit, TestPool};

#[tokio::test]
async fn test_new_template_broadcasts_to_all_sessions() {
    let pool = TestPool::start(u64::MAX).await;

    let mut miners = Vec::new();
    for i in 0..3 {
        let mut miner = pool.connect().await;
        miner.login(&format!("9xTestAddr1{}", i)).await;
        miners.push(miner);
    }

    pool.publish_template(101, u64::MAX);

    let mut job_ids = HashSet::new();
    for miner in &mut miners {
        let note = miner.recv_notification().await;
        assert_eq!(note["method"], json!("job"));
        assert_eq!(note["params"]["height"].as_u64(), Some(101));
        job_ids.insert(note["params"]["job_id"].as_str().unwrap().to_string());
    }
    // one notification each, every job id distinct
    assert_eq!(job_ids.len(), 3);
    pool.stop();
}

#[tokio::test]
async fn test_unauthorized_connection_gets_no_broadcast() {
    let pool = TestPool::start(u64::MAX).await;
    let mut logged_in = pool.connect().await;
    logged_in.login("9xTestAddr11").await;
    let mut lurker = pool.connect().await;

    pool.publish_template(102, u64::MAX);

    let note = logged_in.recv_notification().await;
    assert_eq!(note["params"]["height"].as_u64(), Some(102));
    // the never-logged-in connection stays silent
    let silence = tokio::time::timeout(Duration::from_millis(300), lurker.recv()).await;
    assert!(silence.is_err(), "lurker received a frame: {:?}", silence);
    pool.stop();
}

#[tokio::test]
async fn test_block_candidate_submits_block_and_publishes_events() {
    let pool = TestPool::start(1).await;
    let mut events = pool.bus.subscribe();
    let mut miner = pool.connect().await;
    let login = miner.login("9xTestAddr11").await;

    let (nonce, result) = valid_submit(&login.job, [0x01, 0x02, 0x03, 0x04]);
    let response = miner
        .request(json!({
            "id": 2, "jsonrpc": "2.0", "method": "submit",
            "params": {
                "id": login.session_id,
                "job_id": login.job["job_id"],
                "nonce": nonce,
                "result": result,
            }
        }))
        .await;
    assert_eq!(response["result"]["status"], json!("OK"));

    // exactly one block went upstream
    assert_eq!(pool.daemon.submits.lock().len(), 1);

    // the bus carries NewBlock and a candidate NewShare
    let mut saw_block = false;
    let mut candidate_share = None;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(PoolEvent::NewBlock { height, .. })) => {
                assert_eq!(height, 100);
                saw_block = true;
            }
            Ok(Ok(PoolEvent::NewShare { share })) => {
                candidate_share = Some(share);
                break;
            }
            Ok(Ok(PoolEvent::Telemetry { .. })) => continue,
            other => panic!("unexpected bus state: {:?}", other.is_err()),
        }
    }
    assert!(saw_block, "no NewBlock event seen");
    let share = candidate_share.expect("no NewShare event seen");
    assert!(share.is_block_candidate);
    assert!(share.block_hash.is_some());
    assert_eq!(share.block_height, 100);
    assert_eq!(share.network_difficulty, 1);
    assert_eq!(share.miner, "9xTestAddr11");
    pool.stop();
}

#[tokio::test]
async fn test_share_events_flow_for_ordinary_shares() {
    let pool = TestPool::start(u64::MAX).await;
    let mut events = pool.bus.subscribe();
    let mut miner = pool.connect().await;
    let login = miner.login("9xTestAddr11.rig-7").await;

    let (nonce, result) = valid_submit(&login.job, [0xaa, 0xbb, 0xcc, 0xdd]);
    miner
        .request(json!({
            "id": 2, "jsonrpc": "2.0", "method": "submit",
            "params": {
                "id": login.session_id,
                "job_id": login.job["job_id"],
                "nonce": nonce,
                "result": result,
            }
        }))
        .await;

    // no block at u64::MAX network difficulty, just the share
    assert!(pool.daemon.submits.lock().is_empty());
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(PoolEvent::NewShare { share })) => {
                assert!(!share.is_block_candidate);
                assert_eq!(share.worker, "rig-7");
                assert_eq!(share.difficulty, 1);
                break;
            }
            Ok(Ok(_)) => continue,
            other => panic!("unexpected bus state: {:?}", other.is_err()),
        }
    }
    pool.stop();
}

// Changelog:
// - v1.0.0 (2025-07-12): Initial pool-flow tests.
//   - Purpose: Verifies one job notification per authorized session per
//     template and the full candidate path: daemon submission plus
//     NewBlock/NewShare bus events.
