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

//! End-to-end scenarios through the RPC handlers: a node requests work,
//! miners pull and solve it, the node confirms the result.

#[macro_use]
extern crate lazy_static;

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use zilproxy_api::{NodeApiConfig, RpcHandler};
use zilproxy_core::crypto::ProxyKey;
use zilproxy_core::pow::{difficulty_to_boundary, EthashVerifier};
use zilproxy_pool::{MiningConfig, NodeKey, PoolStore, SettingsCache, WorkPool};
use zilproxy_util::{from_hex, init_test_logger, rand_bytes, to_hex_0x, u64_to_hex_0x, OneTime};

lazy_static! {
	static ref VERIFIER: Arc<EthashVerifier> = Arc::new(EthashVerifier::new());
}

const WALLET: &str = "0x0123456789012345678901234567890123456789";

struct Harness {
	_dir: TempDir,
	handler: RpcHandler,
	node_key: ProxyKey,
}

fn harness(mining: MiningConfig) -> Harness {
	init_test_logger();
	let dir = tempfile::tempdir().unwrap();
	let env = Arc::new(zilproxy_store::new_env(
		dir.path().to_str().unwrap().to_string(),
	));
	let store = Arc::new(PoolStore::new(env));
	let pool = Arc::new(WorkPool::new(store.clone()));
	let settings = Arc::new(SettingsCache::new(store.clone(), mining.site_settings()));

	let node_key = ProxyKey::generate();
	store
		.save_node(&NodeKey {
			pub_key: node_key.public_hex(),
			pow_fee: 1.0,
			authorized: true,
			email: String::new(),
		})
		.unwrap();

	let handler = RpcHandler {
		pool,
		settings,
		verifier: VERIFIER.clone(),
		tracker: None,
		publisher: OneTime::new(),
		zil_config: NodeApiConfig { verify_sign: true },
		mining,
	};
	Harness {
		_dir: dir,
		handler,
		node_key,
	}
}

fn sign_concat(key: &ProxyKey, parts: &[&str]) -> String {
	let mut msg = Vec::new();
	for part in parts {
		msg.extend_from_slice(&from_hex(part).unwrap());
	}
	format!("0x{}", key.sign_hex(&msg).unwrap())
}

fn request_work(h: &Harness, header: &str, block_num: u64, boundary: &str, timeout: u64) -> Value {
	let pub_key = h.node_key.public_hex();
	let block_num_hex = u64_to_hex_0x(block_num, 8);
	let timeout_hex = u64_to_hex_0x(timeout, 4);
	let signature = sign_concat(
		&h.node_key,
		&[
			pub_key.as_str(),
			header,
			block_num_hex.as_str(),
			boundary,
			timeout_hex.as_str(),
		],
	);
	h.handler
		.handle(
			"zil_requestWork",
			&json!([pub_key, header, block_num_hex, boundary, timeout_hex, signature]),
		)
		.unwrap()
}

fn check_work_status(h: &Harness, header: &str, boundary: &str) -> Value {
	let pub_key = h.node_key.public_hex();
	let signature = sign_concat(&h.node_key, &[pub_key.as_str(), header, boundary]);
	h.handler
		.handle(
			"zil_checkWorkStatus",
			&json!([pub_key, header, boundary, signature]),
		)
		.unwrap()
}

fn verify_result(h: &Harness, header: &str, boundary: &str, verified: bool) -> Value {
	let pub_key = h.node_key.public_hex();
	let verified_hex = if verified { "0x01" } else { "0x00" };
	let signature = sign_concat(&h.node_key, &[pub_key.as_str(), verified_hex, header, boundary]);
	h.handler
		.handle(
			"zil_verifyResult",
			&json!([pub_key, verified_hex, header, boundary, signature]),
		)
		.unwrap()
}

fn submit_work(
	h: &Harness,
	nonce: u64,
	header: &str,
	mix: &[u8; 32],
	boundary: &str,
	worker: &str,
) -> Value {
	h.handler
		.handle(
			"eth_submitWork",
			&json!([
				u64_to_hex_0x(nonce, 8),
				header,
				to_hex_0x(mix),
				boundary,
				WALLET,
				worker
			]),
		)
		.unwrap()
}

fn rand_header() -> ([u8; 32], String) {
	let bytes = rand_bytes(32);
	let mut header = [0u8; 32];
	header.copy_from_slice(&bytes);
	(header, to_hex_0x(&bytes))
}

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
fn single_miner_happy_path() {
	let h = harness(MiningConfig::default());
	let (header, header_hex) = rand_header();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);

	assert_eq!(request_work(&h, &header_hex, 0, &boundary, 600), json!(true));

	// the miner pulls the work
	let got = h.handler.handle("eth_getWork", &Value::Null).unwrap();
	assert_eq!(got[0], json!(header_hex));
	assert_eq!(got[2], json!(boundary));
	assert_eq!(got[3], json!(true));

	// not found yet
	assert_eq!(check_work_status(&h, &header_hex, &boundary)[0], json!(false));

	// solve and submit
	let (nonce, mix, _) = mine(&header, &boundary_bytes, 0);
	assert_eq!(
		submit_work(&h, nonce, &header_hex, &mix, &boundary, "rig1"),
		json!(true)
	);

	// the node picks the result up and confirms it
	let status = check_work_status(&h, &header_hex, &boundary);
	assert_eq!(status[0], json!(true));
	assert_eq!(status[1], json!(u64_to_hex_0x(nonce, 8)));
	assert_eq!(status[2], json!(header_hex));
	assert_eq!(status[3], json!(to_hex_0x(&mix)));

	assert_eq!(verify_result(&h, &header_hex, &boundary, true), json!(true));

	let worker = h
		.handler
		.pool
		.store()
		.get_worker(WALLET, "rig1")
		.unwrap()
		.unwrap();
	assert_eq!(worker.work_submitted, 1);
	assert_eq!(worker.work_finished, 1);
	assert_eq!(worker.work_verified, 1);
	assert_eq!(worker.work_failed, 0);
}

#[test]
fn fan_out_cap_over_http() {
	let mut mining = MiningConfig::default();
	mining.max_dispatch = 3;
	mining.inc_expire = 30;
	let h = harness(mining);

	let (_, header_hex) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());
	assert_eq!(request_work(&h, &header_hex, 0, &boundary, 600), json!(true));

	let mut winners = 0;
	let mut losers = 0;
	for _ in 0..5 {
		let got = h.handler.handle("eth_getWork", &Value::Null).unwrap();
		if got[3] == json!(true) {
			winners += 1;
		} else {
			losers += 1;
			assert_eq!(got[0], json!(""));
			// no usable window history yet, the hint stays at zero
			assert!(got[4].as_u64().unwrap() == 0);
		}
	}
	assert_eq!(winners, 3);
	assert_eq!(losers, 2);
}

#[test]
fn better_solution_wins() {
	let h = harness(MiningConfig::default());
	let (header, header_hex) = rand_header();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);
	assert_eq!(request_work(&h, &header_hex, 0, &boundary, 600), json!(true));

	let (nonce_a, mix_a, result_a) = mine(&header, &boundary_bytes, 0);
	assert_eq!(
		submit_work(&h, nonce_a, &header_hex, &mix_a, &boundary, "riga"),
		json!(true)
	);

	// find one better and one worse than A
	let mut nonce = nonce_a + 1;
	let (mut worse, mut better) = (None, None);
	while worse.is_none() || better.is_none() {
		let (n, mix, result) = mine(&header, &boundary_bytes, nonce);
		nonce = n + 1;
		if result > result_a && worse.is_none() {
			worse = Some((n, mix));
		}
		if result < result_a && better.is_none() {
			better = Some((n, mix));
		}
	}

	let (n_worse, mix_worse) = worse.unwrap();
	assert_eq!(
		submit_work(&h, n_worse, &header_hex, &mix_worse, &boundary, "rigb"),
		json!(false)
	);

	let (n_better, mix_better) = better.unwrap();
	assert_eq!(
		submit_work(&h, n_better, &header_hex, &mix_better, &boundary, "rigb"),
		json!(true)
	);

	// the node sees the better submission
	let status = check_work_status(&h, &header_hex, &boundary);
	assert_eq!(status[1], json!(u64_to_hex_0x(n_better, 8)));
	assert_eq!(status[3], json!(to_hex_0x(&mix_better)));
}

#[test]
fn expired_work_is_rejected() {
	let h = harness(MiningConfig::default());
	let (header, header_hex) = rand_header();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);
	assert_eq!(request_work(&h, &header_hex, 0, &boundary, 1), json!(true));

	std::thread::sleep(std::time::Duration::from_millis(1100));

	let (nonce, mix, _) = mine(&header, &boundary_bytes, 0);
	assert_eq!(
		submit_work(&h, nonce, &header_hex, &mix, &boundary, "rig1"),
		json!(false)
	);
	let worker = h
		.handler
		.pool
		.store()
		.get_worker(WALLET, "rig1")
		.unwrap()
		.unwrap();
	assert_eq!(worker.work_failed, 1);

	assert_eq!(check_work_status(&h, &header_hex, &boundary)[0], json!(false));
}

#[test]
fn bad_signature_is_rejected() {
	let h = harness(MiningConfig::default());
	let (_, header_hex) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());

	let pub_key = h.node_key.public_hex();
	let block_num_hex = u64_to_hex_0x(0, 8);
	let timeout_hex = u64_to_hex_0x(600, 4);
	let good = sign_concat(
		&h.node_key,
		&[
			pub_key.as_str(),
			header_hex.as_str(),
			block_num_hex.as_str(),
			boundary.as_str(),
			timeout_hex.as_str(),
		],
	);
	// flip one bit in the signature
	let mut sig_bytes = from_hex(&good).unwrap();
	sig_bytes[10] ^= 0x01;
	let bad = to_hex_0x(&sig_bytes);

	let res = h
		.handler
		.handle(
			"zil_requestWork",
			&json!([pub_key, header_hex, block_num_hex, boundary, timeout_hex, bad]),
		)
		.unwrap();
	assert_eq!(res, json!(false));

	// nothing was persisted
	assert!(h.handler.pool.get_new_works(1, 0.0, None).is_empty());
}

#[test]
fn rate_cap_over_rpc() {
	let h = harness(MiningConfig::default());
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());

	for i in 0..3 {
		let (_, header_hex) = rand_header();
		let res = request_work(&h, &header_hex, 5, &boundary, 600);
		if i < 2 {
			assert_eq!(res, json!(true), "request {}", i);
		} else {
			assert_eq!(res, json!(false), "request {}", i);
		}
	}
}

#[test]
fn legacy_timeout_signature_fallback() {
	let h = harness(MiningConfig::default());
	let (_, header_hex) = rand_header();
	let boundary = to_hex_0x(&difficulty_to_boundary(20).unwrap());

	// firmware signs with a fixed 60s timeout but declares 600s
	let pub_key = h.node_key.public_hex();
	let block_num_hex = u64_to_hex_0x(0, 8);
	let declared_timeout = u64_to_hex_0x(600, 4);
	let signed_timeout = u64_to_hex_0x(60, 4);
	let signature = sign_concat(
		&h.node_key,
		&[
			pub_key.as_str(),
			header_hex.as_str(),
			block_num_hex.as_str(),
			boundary.as_str(),
			signed_timeout.as_str(),
		],
	);

	let res = h
		.handler
		.handle(
			"zil_requestWork",
			&json!([
				pub_key,
				header_hex,
				block_num_hex,
				boundary,
				declared_timeout,
				signature
			]),
		)
		.unwrap();
	assert_eq!(res, json!(true));
}

#[test]
fn malformed_lengths_are_protocol_errors() {
	let h = harness(MiningConfig::default());
	// truncated header
	let res = h.handler.handle(
		"zil_checkWorkStatus",
		&json!([h.node_key.public_hex(), "0xabcd", "0xabcd", "0x00"]),
	);
	assert!(res.is_err());

	// wrong nonce length on the eth side
	let res = h
		.handler
		.handle("eth_submitWork", &json!(["0x00", "0x00", "0x00"]));
	assert!(res.is_err());

	// unknown method
	assert!(h.handler.handle("eth_bogus", &Value::Null).is_err());
}

#[test]
fn hashrate_needs_known_miner() {
	let h = harness(MiningConfig::default());
	let rate = json!(["0x0000000000500000", WALLET, "rig1"]);

	// unknown miner first
	assert_eq!(h.handler.handle("eth_submitHashrate", &rate).unwrap(), json!(false));

	h.handler.pool.store().get_or_create_miner(WALLET).unwrap();
	assert_eq!(h.handler.handle("eth_submitHashrate", &rate).unwrap(), json!(true));
}

#[test]
fn stats_surface_pages_results() {
	let h = harness(MiningConfig::default());
	let (header, header_hex) = rand_header();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary = to_hex_0x(&boundary_bytes);
	assert_eq!(request_work(&h, &header_hex, 0, &boundary, 600), json!(true));

	// two accepted solutions: the first, then a strictly better one
	let (nonce_a, mix_a, result_a) = mine(&header, &boundary_bytes, 0);
	assert_eq!(
		submit_work(&h, nonce_a, &header_hex, &mix_a, &boundary, "rigs"),
		json!(true)
	);
	let mut nonce = nonce_a + 1;
	let (nonce_b, mix_b) = loop {
		let (n, mix, result) = mine(&header, &boundary_bytes, nonce);
		if result < result_a {
			break (n, mix);
		}
		nonce = n + 1;
	};
	assert_eq!(
		submit_work(&h, nonce_b, &header_hex, &mix_b, &boundary, "rigs"),
		json!(true)
	);

	// worker counters through the stats surface
	let worker = h
		.handler
		.handle("stats_worker", &json!([WALLET, "rigs"]))
		.unwrap();
	assert_eq!(worker["works"]["submitted"], json!(2));
	assert_eq!(worker["works"]["finished"], json!(2));
	assert_eq!(worker["works"]["failed"], json!(0));
	// unknown workers answer null
	assert!(h
		.handler
		.handle("stats_worker", &json!([WALLET, "ghost"]))
		.unwrap()
		.is_null());

	// one result per page, newest first
	let page0 = h.handler.handle("stats_results", &json!([0, 1])).unwrap();
	assert_eq!(page0["results"].as_array().unwrap().len(), 1);
	assert_eq!(page0["results"][0]["nonce"], json!(u64_to_hex_0x(nonce_b, 8)));
	assert_eq!(page0["results"][0]["header"], json!(header_hex));
	let page1 = h.handler.handle("stats_results", &json!([1, 1])).unwrap();
	assert_eq!(page1["results"][0]["nonce"], json!(u64_to_hex_0x(nonce_a, 8)));
	let page2 = h.handler.handle("stats_results", &json!([2, 1])).unwrap();
	assert!(page2["results"].as_array().unwrap().is_empty());

	// defaults and bad paging arguments
	let all = h.handler.handle("stats_results", &Value::Null).unwrap();
	assert_eq!(all["results"].as_array().unwrap().len(), 2);
	assert!(h.handler.handle("stats_results", &json!([0, 0])).is_err());
	assert!(h.handler.handle("stats_results", &json!("nope")).is_err());
}
