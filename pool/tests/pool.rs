// Copyright 2019 The Zilproxy Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Work pool tests against a throwaway store: dispatch ordering and
//! accounting, the best-solution rule and the PoW-window ledger.

#[macro_use]
extern crate lazy_static;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use zilproxy_core::pow::{difficulty_to_boundary, EthashVerifier};
use zilproxy_pool::{PoolStore, PowWindow, SubmitError, WorkPool};
use zilproxy_util::{init_test_logger, rand_bytes, to_hex_0x, u64_to_hex_0x};

lazy_static! {
	// one light cache shared by every test in this binary
	static ref VERIFIER: EthashVerifier = EthashVerifier::new();
}

const PUB_KEY: &str = "0x02a349a0bcf7c26b2d4c0cf0c01f951a0cd51cbb287ffc4ea343acd109a26b0301";
const SIGNATURE: &str = "0x11";
const WALLET: &str = "0x0123456789012345678901234567890123456789";

fn new_pool() -> (TempDir, WorkPool) {
	init_test_logger();
	let dir = tempfile::tempdir().unwrap();
	let env = Arc::new(zilproxy_store::new_env(
		dir.path().to_str().unwrap().to_string(),
	));
	let pool = WorkPool::new(Arc::new(PoolStore::new(env)));
	(dir, pool)
}

fn rand_header() -> ([u8; 32], String) {
	let bytes = rand_bytes(32);
	let mut header = [0u8; 32];
	header.copy_from_slice(&bytes);
	(header, to_hex_0x(&bytes))
}

/// Mine nonces from `from` until one meets the bound, returns
/// `(nonce, mix, result)`.
fn mine(header: &[u8; 32], boundary: &[u8], from: u64) -> (u64, [u8; 32], [u8; 32]) {
	let mut nonce = from;
	loop {
		let (mix, result) = VERIFIER.pow_hash(0, header, nonce);
		if zilproxy_core::pow::is_less_or_equal(&result, boundary) {
			return (nonce, mix, result);
		}
		nonce += 1;
	}
}

#[test]
fn create_and_fetch_work() {
	let (_dir, pool) = new_pool();
	let (_, header) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());

	let work = pool
		.new_work(&header, 42, &boundary, PUB_KEY, SIGNATURE, 120, 1.0)
		.unwrap();
	assert!(work.id > 0);
	assert_eq!(work.block_num, 42);
	assert!(!work.finished);
	// seed derived from the block number, epoch 0
	assert_eq!(work.seed, to_hex_0x(&[0u8; 32]));

	// fee filter in both directions
	assert_eq!(pool.get_new_works(1, 0.5, None).len(), 1);
	assert!(pool.get_new_works(1, 1.5, None).is_empty());

	let found = pool
		.find_work_by_header_boundary(&header, &boundary, true)
		.unwrap();
	assert_eq!(found.id, work.id);
	// header-only lookup
	assert!(pool.find_work_by_header_boundary(&header, "", true).is_some());
	// job-id round trip
	assert_eq!(pool.find_work_by_id(work.id, true).unwrap().id, work.id);
}

#[test]
fn dispatch_ordering() {
	let (_dir, pool) = new_pool();
	let easy = to_hex_0x(&difficulty_to_boundary(10).unwrap());
	let hard = to_hex_0x(&difficulty_to_boundary(30).unwrap());

	let (_, h1) = rand_header();
	let (_, h2) = rand_header();
	let (_, h3) = rand_header();
	pool.new_work(&h1, 1, &hard, PUB_KEY, SIGNATURE, 120, 2.0).unwrap();
	pool.new_work(&h2, 1, &easy, PUB_KEY, SIGNATURE, 120, 1.0).unwrap();
	pool.new_work(&h3, 1, &easy, PUB_KEY, SIGNATURE, 120, 2.0).unwrap();

	let works = pool.get_new_works(3, 0.0, None);
	assert_eq!(works.len(), 3);
	// easiest boundary first, then the higher fee
	assert_eq!(works[0].header, h3);
	assert_eq!(works[1].header, h2);
	assert_eq!(works[2].header, h1);
}

#[test]
fn fan_out_cap() {
	let (_dir, pool) = new_pool();
	let (_, header) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());
	let work = pool
		.new_work(&header, 7, &boundary, PUB_KEY, SIGNATURE, 120, 0.0)
		.unwrap();

	let max_dispatch = 3;
	// five pulling miners in rapid succession, cooldown of 30s on overflow
	let mut winners = 0;
	for _ in 0..5 {
		match pool.get_new_works(1, 0.0, Some(max_dispatch)).pop() {
			Some(w) => {
				assert!(pool
					.increase_dispatched(w.id, max_dispatch, 1, 30)
					.is_some());
				winners += 1;
			}
			None => (),
		}
	}
	assert_eq!(winners, 3);

	// the round was reset with a future start, the work is cooling down
	let after = pool.find_work_by_id(work.id, true).unwrap();
	assert_eq!(after.dispatched, 1);
	assert!(after.start_time > Utc::now());
	assert!(pool.get_new_works(1, 0.0, Some(max_dispatch)).is_empty());
}

#[test]
fn overflow_reset_near_expiry() {
	let (_dir, pool) = new_pool();
	let (_, header) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());
	let work = pool
		.new_work(&header, 8, &boundary, PUB_KEY, SIGNATURE, 60, 0.0)
		.unwrap();

	// cooldown longer than the lifetime: the reset re-anchors at now and
	// the work is immediately re-offered
	for _ in 0..2 {
		pool.increase_dispatched(work.id, 2, 1, 3600).unwrap();
	}
	let after = pool.find_work_by_id(work.id, true).unwrap();
	assert_eq!(after.dispatched, 1);
	assert!(after.start_time <= Utc::now());
	assert_eq!(pool.get_new_works(1, 0.0, Some(2)).len(), 1);
}

#[test]
fn expired_work_disappears() {
	let (_dir, pool) = new_pool();
	let (_, header) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());
	pool.new_work(&header, 9, &boundary, PUB_KEY, SIGNATURE, 1, 0.0)
		.unwrap();

	assert_eq!(pool.get_new_works(1, 0.0, None).len(), 1);
	std::thread::sleep(std::time::Duration::from_millis(1100));
	assert!(pool.get_new_works(1, 0.0, None).is_empty());
	assert!(pool
		.find_work_by_header_boundary(&header, &boundary, true)
		.is_none());
	// expired work stays in storage for statistics
	assert!(pool
		.find_work_by_header_boundary(&header, &boundary, false)
		.is_some());
}

#[test]
fn rate_cap_counting() {
	let (_dir, pool) = new_pool();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());
	for _ in 0..3 {
		let (_, header) = rand_header();
		pool.new_work(&header, 11, &boundary, PUB_KEY, SIGNATURE, 120, 0.0)
			.unwrap();
	}
	assert_eq!(pool.store().count_node_works(PUB_KEY, 11).unwrap(), 3);
	assert_eq!(pool.store().count_node_works(PUB_KEY, 12).unwrap(), 0);
}

#[test]
fn submit_and_best_solution() {
	let (_dir, pool) = new_pool();
	let (header, header_hex) = rand_header();
	// difficulty 1 keeps the in-test mining to a couple of hashes
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);

	let work = pool
		.new_work(&header_hex, 0, &boundary, PUB_KEY, SIGNATURE, 600, 0.25)
		.unwrap();

	let (nonce1, mix1, result1) = mine(&header, &boundary_bytes, 0);
	let res = pool
		.submit(
			&VERIFIER,
			Some(&work),
			nonce1,
			&u64_to_hex_0x(nonce1, 8),
			&mix1,
			WALLET,
			"rig1",
		)
		.unwrap();
	assert_eq!(res.hash_result, to_hex_0x(&result1));
	assert_eq!(res.miner_wallet, WALLET);

	// the work is now finished but still findable
	let finished = pool
		.find_work_by_header_boundary(&header_hex, &boundary, true)
		.unwrap();
	assert!(finished.finished);
	assert_eq!(finished.miner_wallet, WALLET);

	// hunt for one worse and one strictly better solution
	let mut nonce = nonce1 + 1;
	let (mut worse, mut better) = (None, None);
	while worse.is_none() || better.is_none() {
		let (n, mix, result) = mine(&header, &boundary_bytes, nonce);
		nonce = n + 1;
		if result > result1 && worse.is_none() {
			worse = Some((n, mix));
		}
		if result < result1 && better.is_none() {
			better = Some((n, mix));
		}
	}

	// a worse solution is turned away
	let (n, mix) = worse.unwrap();
	assert_eq!(
		pool.submit(
			&VERIFIER,
			Some(&finished),
			n,
			&u64_to_hex_0x(n, 8),
			&mix,
			WALLET,
			"rig2",
		)
		.unwrap_err(),
		SubmitError::WorseSolution
	);

	// a strictly better one wins while the previous is unverified
	let (n, mix) = better.unwrap();
	let res2 = pool
		.submit(
			&VERIFIER,
			Some(&finished),
			n,
			&u64_to_hex_0x(n, 8),
			&mix,
			WALLET,
			"rig2",
		)
		.unwrap();
	let current = pool.latest_result(&header_hex, &boundary, None).unwrap();
	assert_eq!(current.id, res2.id);
	assert_eq!(current.nonce, u64_to_hex_0x(n, 8));

	// once the node confirms, later solutions are late
	assert!(pool
		.verify_result(&header_hex, &boundary, PUB_KEY, true)
		.is_some());
	let (n3, mix3, _) = mine(&header, &boundary_bytes, nonce);
	assert_eq!(
		pool.submit(
			&VERIFIER,
			Some(&finished),
			n3,
			&u64_to_hex_0x(n3, 8),
			&mix3,
			WALLET,
			"rig2",
		)
		.unwrap_err(),
		SubmitError::AlreadyVerified
	);

	// counters: rig1 submitted one good solution, rig2 one good, two bad
	let rig1 = pool.store().get_worker(WALLET, "rig1").unwrap().unwrap();
	assert_eq!(rig1.work_finished, 1);
	assert_eq!(rig1.work_failed, 0);
	let rig2 = pool.store().get_worker(WALLET, "rig2").unwrap().unwrap();
	assert_eq!(rig2.work_finished, 1);
	assert_eq!(rig2.work_failed, 2);
	assert_eq!(rig2.work_verified, 1);
}

#[test]
fn submit_garbage_rejected() {
	let (_dir, pool) = new_pool();
	let (_, header_hex) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(1).unwrap());
	let work = pool
		.new_work(&header_hex, 0, &boundary, PUB_KEY, SIGNATURE, 600, 0.0)
		.unwrap();

	// missing work
	assert_eq!(
		pool.submit(&VERIFIER, None, 1, "0x01", &[0u8; 32], WALLET, "rig")
			.unwrap_err(),
		SubmitError::WorkNotFound
	);
	// bogus mix digest
	assert_eq!(
		pool.submit(
			&VERIFIER,
			Some(&work),
			1,
			"0x01",
			&[0u8; 32],
			WALLET,
			"rig",
		)
		.unwrap_err(),
		SubmitError::Verifier
	);
	let worker = pool.store().get_worker(WALLET, "rig").unwrap().unwrap();
	assert_eq!(worker.work_failed, 2);
}

#[test]
fn pow_window_ledger() {
	let (_dir, pool) = new_pool();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());

	let (_, h1) = rand_header();
	let w1 = pool
		.new_work(&h1, 100, &boundary, PUB_KEY, SIGNATURE, 60, 0.0)
		.unwrap();
	pool.update_pow_window(&w1);

	// same epoch again: ledger untouched
	let (_, h1b) = rand_header();
	let w1b = pool
		.new_work(&h1b, 100, &boundary, PUB_KEY, SIGNATURE, 60, 0.0)
		.unwrap();
	pool.update_pow_window(&w1b);
	let latest = pool.store().latest_window().unwrap().unwrap();
	assert_eq!(latest.block_num, 100);

	// next epoch closes out the previous record
	let (_, h2) = rand_header();
	let w2 = pool
		.new_work(&h2, 101, &boundary, PUB_KEY, SIGNATURE, 60, 0.0)
		.unwrap();
	pool.update_pow_window(&w2);

	let prev = pool.store().get_window(100).unwrap().unwrap();
	assert_eq!(prev.pow_start, w1.start_time);
	assert_eq!(prev.pow_end, w1b.expire_time);
	assert!((prev.pow_window - 60.0).abs() < 2.0);
	assert!(prev.epoch_window >= 0.0);
	let latest = pool.store().latest_window().unwrap().unwrap();
	assert_eq!(latest.block_num, 101);

	// an old epoch is ignored as corruption
	let (_, h0) = rand_header();
	let w0 = pool
		.new_work(&h0, 99, &boundary, PUB_KEY, SIGNATURE, 60, 0.0)
		.unwrap();
	pool.update_pow_window(&w0);
	assert_eq!(pool.store().latest_window().unwrap().unwrap().block_num, 101);
}

#[test]
fn seconds_to_next_pow_from_ledger() {
	let (_dir, pool) = new_pool();
	let now = Utc::now();

	// ledger empty: keep polling
	assert_eq!(pool.seconds_to_next_pow(), 0);

	// window ended 5s ago, next pow expected in ~100s
	pool.store()
		.save_window(&PowWindow {
			block_num: 200,
			create_time: now,
			pow_start: now - Duration::seconds(10),
			pow_end: now - Duration::seconds(5),
			pow_window: 5.0,
			epoch_window: 0.0,
			estimated_next_pow: Some(now + Duration::seconds(100)),
		})
		.unwrap();
	let secs = pool.seconds_to_next_pow();
	assert!(secs > 90 && secs <= 100, "secs = {}", secs);

	// still inside the current window: zero, miners keep polling
	pool.store()
		.save_window(&PowWindow {
			block_num: 201,
			create_time: now,
			pow_start: now - Duration::seconds(2),
			pow_end: now,
			pow_window: 10.0,
			epoch_window: 0.0,
			estimated_next_pow: Some(now + Duration::seconds(100)),
		})
		.unwrap();
	assert_eq!(pool.seconds_to_next_pow(), 0);

	// estimate in the past: records are missing, keep polling
	pool.store()
		.save_window(&PowWindow {
			block_num: 202,
			create_time: now,
			pow_start: now - Duration::seconds(60),
			pow_end: now - Duration::seconds(50),
			pow_window: 10.0,
			epoch_window: 0.0,
			estimated_next_pow: Some(now - Duration::seconds(1)),
		})
		.unwrap();
	assert_eq!(pool.seconds_to_next_pow(), 0);
}

#[test]
fn rewards_aggregation() {
	let (_dir, pool) = new_pool();
	let (header, header_hex) = rand_header();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);
	let work = pool
		.new_work(&header_hex, 300, &boundary, PUB_KEY, SIGNATURE, 600, 2.5)
		.unwrap();

	let (nonce, mix, _) = mine(&header, &boundary_bytes, 0);
	pool.submit(
		&VERIFIER,
		Some(&work),
		nonce,
		&u64_to_hex_0x(nonce, 8),
		&mix,
		WALLET,
		"rig1",
	)
	.unwrap();

	let summary = pool
		.store()
		.epoch_rewards(Some((300, 300)), Some(WALLET), None)
		.unwrap();
	assert_eq!(summary.count, 1);
	assert!((summary.rewards - 2.5).abs() < 1e-9);
	assert_eq!(summary.verified, 0);

	let by_miner = pool.store().rewards_by_miners(300).unwrap();
	assert_eq!(by_miner.len(), 1);
	assert_eq!(by_miner[0].miner_wallet, WALLET);
	assert_eq!(by_miner[0].finished, 1);
}
