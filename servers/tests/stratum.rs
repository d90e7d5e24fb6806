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

//! Stratum sessions against a live listener: subscribe, receive pushed
//! work, submit a mined share, reconnect.

#[macro_use]
extern crate lazy_static;

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use zilproxy_core::pow::{difficulty_to_boundary, is_less_or_equal, EthashVerifier};
use zilproxy_pool::{PoolStore, SettingsCache, SiteSettings, WorkPool, WorkPublisher};
use zilproxy_servers::{StratumServer, StratumServerConfig};
use zilproxy_util::{init_test_logger, rand_bytes, to_hex_0x};

lazy_static! {
	static ref VERIFIER: Arc<EthashVerifier> = Arc::new(EthashVerifier::new());
}

const WALLET: &str = "0x0123456789012345678901234567890123456789";
const PUB_KEY: &str = "0x02a349a0bcf7c26b2d4c0cf0c01f951a0cd51cbb287ffc4ea343acd109a26b0301";

struct TestRig {
	_dir: TempDir,
	pool: Arc<WorkPool>,
	server: Arc<StratumServer>,
	addr: std::net::SocketAddr,
}

fn rig() -> TestRig {
	init_test_logger();
	let dir = tempfile::tempdir().unwrap();
	let env = Arc::new(zilproxy_store::new_env(
		dir.path().to_str().unwrap().to_string(),
	));
	let store = Arc::new(PoolStore::new(env));
	let pool = Arc::new(WorkPool::new(store.clone()));
	let settings = Arc::new(SettingsCache::new(store, SiteSettings::default()));

	let config = StratumServerConfig {
		host: "127.0.0.1".to_string(),
		port: 0,
	};
	let server = Arc::new(StratumServer::new(
		config,
		pool.clone(),
		settings,
		VERIFIER.clone(),
	));
	let addr = server.start().unwrap();
	TestRig {
		_dir: dir,
		pool,
		server,
		addr,
	}
}

struct Client {
	stream: TcpStream,
	reader: BufReader<TcpStream>,
}

impl Client {
	fn connect(addr: &std::net::SocketAddr) -> Client {
		let stream = TcpStream::connect(addr).unwrap();
		stream
			.set_read_timeout(Some(Duration::from_secs(10)))
			.unwrap();
		let reader = BufReader::new(stream.try_clone().unwrap());
		Client { stream, reader }
	}

	fn send(&mut self, msg: Value) {
		let mut text = msg.to_string();
		text.push('\n');
		self.stream.write_all(text.as_bytes()).unwrap();
		self.stream.flush().unwrap();
	}

	fn recv(&mut self) -> Value {
		let mut line = String::new();
		self.reader.read_line(&mut line).unwrap();
		serde_json::from_str(&line).unwrap()
	}

	fn subscribe(&mut self, nicehash: bool) -> String {
		let params = if nicehash {
			json!(["zilminer/1.0", "EthereumStratum/1.0.0"])
		} else {
			json!(["zilminer/1.0"])
		};
		self.send(json!({"id": 1, "method": "mining.subscribe", "params": params}));
		let reply = self.recv();
		assert_eq!(reply["id"], json!(1));
		assert!(reply["error"].is_null());
		reply["result"][1].as_str().unwrap().to_string()
	}

	fn authorize(&mut self, user: &str) {
		self.send(json!({"id": 2, "method": "mining.authorize", "params": [user, "x"]}));
		let reply = self.recv();
		assert_eq!(reply["result"], json!(true));
	}
}

fn mine_with_suffix(
	header: &[u8; 32],
	boundary: &[u8],
	extra_nonce: &str,
) -> (String, u64, [u8; 32]) {
	// the true nonce is the hex concatenation of the server prefix and
	// our suffix, mine over the suffix space
	let suffix_len = 16 - extra_nonce.len();
	let mut s: u64 = 0;
	loop {
		let suffix = format!("{:0width$x}", s, width = suffix_len);
		let nonce_hex = format!("{}{}", extra_nonce, suffix);
		let nonce = u64::from_str_radix(&nonce_hex, 16).unwrap();
		let (mix, result) = VERIFIER.pow_hash(0, header, nonce);
		if is_less_or_equal(&result, boundary) {
			return (suffix, nonce, mix);
		}
		s += 1;
	}
}

fn new_real_work(rig: &TestRig, boundary_hex: &str) -> ([u8; 32], zilproxy_pool::PowWork) {
	let header_bytes = rand_bytes(32);
	let mut header = [0u8; 32];
	header.copy_from_slice(&header_bytes);
	let work = rig
		.pool
		.new_work(
			&to_hex_0x(&header_bytes),
			0,
			boundary_hex,
			PUB_KEY,
			"0x11",
			600,
			0.0,
		)
		.unwrap();
	(header, work)
}

#[test]
fn nicehash_session_and_reconnect() {
	let rig = rig();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary_hex = to_hex_0x(&boundary_bytes);

	let mut client = Client::connect(&rig.addr);
	let extra_nonce = client.subscribe(true);
	assert!(!extra_nonce.is_empty());
	assert!(extra_nonce.len() <= 4);
	client.authorize(&format!("{}.rig1", WALLET));

	// give the poll loop a moment to process the handshake
	std::thread::sleep(Duration::from_millis(200));
	assert_eq!(rig.server.num_workers(), 1);

	// a node publishes work, the server pushes it
	let (header, work) = new_real_work(&rig, &boundary_hex);
	rig.server.notify_new_work();

	let set_diff = client.recv();
	assert_eq!(set_diff["method"], json!("mining.set_difficulty"));
	assert!(set_diff["params"][0].as_f64().unwrap() > 0.0);

	let notify = client.recv();
	assert_eq!(notify["method"], json!("mining.notify"));
	let params = notify["params"].as_array().unwrap();
	assert_eq!(params[0], json!(work.job_id()));
	// seed first, then header, then clean_jobs
	assert_eq!(params[1].as_str().unwrap().len(), 64);
	assert_eq!(params[2], json!(zilproxy_util::to_hex(&header)));
	assert_eq!(params[3], json!(true));

	// solve over the suffix space and submit
	let (suffix, nonce, mix) = mine_with_suffix(&header, &boundary_bytes, &extra_nonce);
	client.send(json!({
		"id": 3,
		"method": "mining.submit",
		"params": ["rig1", work.job_id(), suffix],
	}));
	let reply = client.recv();
	assert_eq!(reply["id"], json!(3));
	assert_eq!(reply["result"], json!(true));

	// the pipeline stored the recomputed mix digest
	let result = rig
		.pool
		.latest_result(&work.header, &work.boundary, None)
		.unwrap();
	assert_eq!(result.mix_digest, to_hex_0x(&mix));
	assert_eq!(result.miner_wallet, WALLET);
	assert_eq!(result.worker_name, "rig1");
	let nonce_val = u64::from_str_radix(
		zilproxy_util::strip_0x(&result.nonce),
		16,
	)
	.unwrap();
	assert_eq!(nonce_val, nonce);

	// drop and resubscribe: the connection disappears and a fresh
	// extra-nonce prefix is handed out
	drop(client);
	std::thread::sleep(Duration::from_millis(300));
	assert_eq!(rig.server.num_workers(), 0);

	let mut client2 = Client::connect(&rig.addr);
	let extra_nonce2 = client2.subscribe(true);
	assert!(!extra_nonce2.is_empty());
	std::thread::sleep(Duration::from_millis(200));
	assert_eq!(rig.server.num_workers(), 1);
}

#[test]
fn basic_session_submit() {
	let rig = rig();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary_hex = to_hex_0x(&boundary_bytes);

	let mut client = Client::connect(&rig.addr);
	let _extra_nonce = client.subscribe(false);
	client.authorize(&format!("{}.rigb", WALLET));
	std::thread::sleep(Duration::from_millis(200));

	let (header, work) = new_real_work(&rig, &boundary_hex);
	rig.server.notify_new_work();

	// basic flavor gets the boundary with the job, no set_difficulty
	let notify = client.recv();
	assert_eq!(notify["method"], json!("mining.notify"));
	let params = notify["params"].as_array().unwrap();
	assert_eq!(params[0], json!(work.job_id()));
	assert_eq!(params[1], json!(zilproxy_util::to_hex(&header)));
	assert_eq!(params[3], json!(work.boundary));

	// mine any nonce and submit the classic way
	let mut nonce: u64 = 0;
	let (nonce, mix) = loop {
		let (mix, result) = VERIFIER.pow_hash(0, &header, nonce);
		if is_less_or_equal(&result, &boundary_bytes) {
			break (nonce, mix);
		}
		nonce += 1;
	};
	client.send(json!({
		"id": 4,
		"method": "mining.submit",
		"params": [
			format!("{}.rigb", WALLET),
			work.job_id(),
			zilproxy_util::u64_to_hex_0x(nonce, 8),
			work.header,
			to_hex_0x(&mix),
		],
	}));
	let reply = client.recv();
	assert_eq!(reply["result"], json!(true));

	let result = rig
		.pool
		.latest_result(&work.header, &work.boundary, None)
		.unwrap();
	assert_eq!(result.worker_name, "rigb");

	// an unparseable submit earns an error reply
	client.send(json!({
		"id": 5,
		"method": "mining.submit",
		"params": [format!("{}.rigb", WALLET), work.job_id(), "0xzz", work.header, "0x00"],
	}));
	let reply = client.recv();
	assert_eq!(reply["id"], json!(5));
	assert_eq!(reply["result"], json!(false));

	rig.server.stop();
}

#[test]
fn dummy_jobs_do_not_reach_nodes() {
	let rig = rig();
	let boundary_bytes = difficulty_to_boundary(1).unwrap();
	let boundary_hex = to_hex_0x(&boundary_bytes);

	let mut client = Client::connect(&rig.addr);
	client.subscribe(true);
	client.authorize(&format!("{}.rigd", WALLET));
	std::thread::sleep(Duration::from_millis(200));

	// fabricate a dummy job the way the pump does
	let (_, work) = new_real_work(&rig, &boundary_hex);
	rig.server.notify_dummy(&work);

	let set_diff = client.recv();
	assert_eq!(set_diff["method"], json!("mining.set_difficulty"));
	let notify = client.recv();
	assert_eq!(notify["method"], json!("mining.notify"));

	// dummy jobs carry no dispatch accounting
	let after = rig.pool.find_work_by_id(work.id, true).unwrap();
	assert_eq!(after.dispatched, 0);
}
