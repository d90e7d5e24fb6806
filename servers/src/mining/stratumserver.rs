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

//! Mining Stratum Server
//!
//! Line-framed JSON over TCP. Two client flavors: plain `mining.*` and
//! the NiceHash `EthereumStratum/1.0.0` dialect, picked at subscribe
//! time. Work is pushed, solutions come back through the same verify →
//! best-solution → save pipeline the HTTP surface uses.

use bufstream::BufStream;
use rand::{thread_rng, Rng};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::stats::{StratumStats, WorkerStats};
use crate::common::types::StratumServerConfig;
use chrono::Utc;
use zilproxy_core::pow::{boundary_to_target, EthashVerifier};
use zilproxy_pool::{
	valid_worker_name, PowWork, SettingsCache, WorkPool, WorkPublisher, DEFAULT_WORKER_NAME,
};
use zilproxy_util::{from_hex, from_hex_u64, Mutex, RwLock};

// ----------------------------------------
// http://www.jsonrpc.org/specification
// RPC Methods

#[derive(Serialize, Deserialize, Debug)]
struct RpcRequest {
	id: Option<Value>,
	method: String,
	params: Option<Value>,
}

const NICEHASH_PROTO: &str = "EthereumStratum/1.0.0";
const SUBSCRIPTION_ID: &str = "ae6812eb4cd7735a302a8a9dd95cf71f";

/// Which stratum dialect the client speaks.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Flavor {
	Basic,
	NiceHash,
}

fn rand_extra_nonce() -> String {
	format!("{:x}", thread_rng().gen_range(1u32, 0xffff))
}

// ----------------------------------------
// Worker Object - a connected stratum client

struct Worker {
	id: usize,
	stream: BufStream<TcpStream>,
	error: bool,
	subscribed: bool,
	flavor: Flavor,
	miner_wallet: String,
	extra_nonce: Option<String>,
	// last pushed share target, NiceHash resends only on change
	target_difficulty: f64,
	// boundary of the last notified work, the basic submit fallback
	cur_boundary: String,
	mining_real_job: bool,
	mining_at_block: HashMap<u64, bool>,
}

impl Worker {
	fn new(id: usize, stream: BufStream<TcpStream>) -> Worker {
		Worker {
			id,
			stream,
			error: false,
			subscribed: false,
			flavor: Flavor::Basic,
			miner_wallet: String::new(),
			extra_nonce: None,
			target_difficulty: 0.0,
			cur_boundary: String::new(),
			mining_real_job: false,
			mining_at_block: HashMap::new(),
		}
	}

	// Get a message from the worker
	fn read_message(&mut self) -> Option<String> {
		let mut line = String::new();
		match self.stream.read_line(&mut line) {
			Ok(0) => {
				// remote side closed the connection
				self.error = true;
				None
			}
			Ok(_) => Some(line),
			Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
				// Not an error, just no messages ready
				None
			}
			Err(e) => {
				warn!("error in connection with stratum client {}: {}", self.id, e);
				self.error = true;
				None
			}
		}
	}

	// Send a message to the worker
	fn write_message(&mut self, message_in: String) {
		let mut message = message_in;
		if !message.ends_with('\n') {
			message += "\n";
		}
		if let Err(e) = self
			.stream
			.write(message.as_bytes())
			.and_then(|_| self.stream.flush())
		{
			warn!("error in connection with stratum client {}: {}", self.id, e);
			self.error = true;
		}
	}

	fn write_json(&mut self, value: Value) {
		match serde_json::to_string(&value) {
			Ok(text) => self.write_message(text),
			Err(e) => warn!("failed to serialize stratum reply: {}", e),
		}
	}

	fn send_result(&mut self, id: Value, result: Value) {
		self.write_json(json!({
			"id": id,
			"result": result,
			"error": Value::Null,
		}));
	}

	fn send_error(&mut self, id: Value, code: i32, message: &str) {
		self.write_json(json!({
			"id": id,
			"result": false,
			"error": { "code": code, "message": message },
		}));
	}

	// Push the share target when it changed since the last push.
	// Basic-flavor clients take the boundary with the job instead.
	fn notify_difficulty(&mut self, work: &PowWork) {
		self.cur_boundary = work.boundary.clone();
		if self.flavor == Flavor::Basic {
			return;
		}
		let boundary = match from_hex(&work.boundary) {
			Ok(bytes) => bytes,
			Err(_) => return,
		};
		let target = boundary_to_target(&boundary);
		if (self.target_difficulty - target).abs() < f64::EPSILON {
			debug!("the difficulty is the same, no need to send again");
			return;
		}
		self.write_json(json!({
			"id": Value::Null,
			"method": "mining.set_difficulty",
			"params": [target],
		}));
		self.target_difficulty = target;
	}

	/// Offer a work item to this miner. A miner already busy with a real
	/// job for the same block is left alone.
	fn notify_work(&mut self, work: &PowWork, real_job: bool) {
		if !self.subscribed {
			return;
		}
		if self.mining_real_job
			&& self
				.mining_at_block
				.get(&work.block_num)
				.cloned()
				.unwrap_or(false)
		{
			debug!(
				"miner {} still mining a real job for block {}, no need to send new work",
				self.id, work.block_num
			);
			return;
		}

		self.notify_difficulty(work);

		let header = strip_hex(&work.header);
		let seed = strip_hex(&work.seed);
		let params = match self.flavor {
			Flavor::Basic => json!([work.job_id(), header, seed, work.boundary]),
			// seed before header, as EthereumStratum/1.0.0 wants it
			Flavor::NiceHash => json!([work.job_id(), seed, header, true]),
		};
		self.write_json(json!({
			"id": Value::Null,
			"method": "mining.notify",
			"params": params,
		}));

		self.mining_real_job = real_job;
		self.mining_at_block.insert(work.block_num, true);
	}

	fn set_work_done(&mut self, work: &PowWork) {
		self.mining_at_block.insert(work.block_num, false);
	}
}

fn strip_hex(s: &str) -> &str {
	zilproxy_util::strip_0x(s)
}

// ----------------------------------------
// Worker Factory Thread Function

// Run in a thread. Adds new connections to the workers list
fn accept_workers(
	listener: TcpListener,
	workers: Arc<Mutex<Vec<Worker>>>,
	stratum_stats: Arc<RwLock<StratumStats>>,
	stop: Arc<AtomicBool>,
) {
	let mut worker_id: usize = 0;
	for stream in listener.incoming() {
		if stop.load(Ordering::Relaxed) {
			break;
		}
		match stream {
			Ok(stream) => {
				warn!(
					"new stratum connection: {:?}",
					stream.peer_addr().map(|a| a.to_string())
				);
				if let Err(e) = stream.set_nonblocking(true) {
					warn!("set_nonblocking failed: {}", e);
					continue;
				}
				workers
					.lock()
					.push(Worker::new(worker_id, BufStream::new(stream)));
				let mut stats = stratum_stats.write();
				let mut worker_stats = WorkerStats::default();
				worker_stats.id = worker_id.to_string();
				worker_stats.is_connected = true;
				stats.worker_stats.push(worker_stats);
				worker_id += 1;
			}
			Err(e) => {
				warn!("error accepting stratum connection: {:?}", e);
			}
		}
	}
	drop(listener);
}

// ----------------------------------------
// Zilproxy Stratum Server

/// The stratum push endpoint. One poll thread services every connected
/// miner, an accept thread feeds the connection list.
pub struct StratumServer {
	config: StratumServerConfig,
	pool: Arc<WorkPool>,
	settings: Arc<SettingsCache>,
	verifier: Arc<EthashVerifier>,
	workers: Arc<Mutex<Vec<Worker>>>,
	stats: Arc<RwLock<StratumStats>>,
	stop: Arc<AtomicBool>,
}

impl StratumServer {
	/// Creates a new Stratum Server.
	pub fn new(
		config: StratumServerConfig,
		pool: Arc<WorkPool>,
		settings: Arc<SettingsCache>,
		verifier: Arc<EthashVerifier>,
	) -> StratumServer {
		StratumServer {
			config,
			pool,
			settings,
			verifier,
			workers: Arc::new(Mutex::new(Vec::new())),
			stats: Arc::new(RwLock::new(StratumStats::default())),
			stop: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Number of currently connected miners.
	pub fn num_workers(&self) -> usize {
		self.workers.lock().len()
	}

	/// Stats snapshot.
	pub fn stats(&self) -> StratumStats {
		self.stats.read().clone()
	}

	/// Ask the server loops to wind down; connections drop on the next
	/// poll pass.
	pub fn stop(&self) {
		self.stop.store(true, Ordering::Relaxed);
	}

	/// Bind the listener, spawn the accept and poll threads and return
	/// the bound address.
	pub fn start(self: &Arc<StratumServer>) -> std::io::Result<SocketAddr> {
		let listen_addr = format!("{}:{}", self.config.host, self.config.port);
		let listener = TcpListener::bind(&listen_addr)?;
		let local_addr = listener.local_addr()?;

		let workers = self.workers.clone();
		let stats = self.stats.clone();
		let stop = self.stop.clone();
		let _listener_th =
			thread::spawn(move || accept_workers(listener, workers, stats, stop));

		let server = self.clone();
		let _poll_th = thread::Builder::new()
			.name("stratum_server".to_string())
			.spawn(move || server.run_loop())?;

		{
			let mut stats = self.stats.write();
			stats.is_running = true;
		}
		warn!("stratum server started on {}", local_addr);
		Ok(local_addr)
	}

	// Main loop: drop dead connections, service messages, sleep.
	fn run_loop(&self) {
		loop {
			if self.stop.load(Ordering::Relaxed) {
				// drop every connection, the store is left untouched
				self.workers.lock().clear();
				let mut stats = self.stats.write();
				stats.is_running = false;
				stats.num_workers = 0;
				break;
			}
			self.clean_workers();
			self.handle_rpc_requests();
			thread::sleep(Duration::from_millis(50));
		}
	}

	// Purge dead/sick workers - remove all workers marked in error state
	fn clean_workers(&self) -> usize {
		let mut workers_l = self.workers.lock();
		let mut stats = self.stats.write();
		workers_l.retain(|w| {
			if w.error {
				warn!("dropping stratum worker {}", w.id);
				if let Some(ws) = stats
					.worker_stats
					.iter_mut()
					.find(|ws| ws.id == w.id.to_string())
				{
					ws.is_connected = false;
				}
			}
			!w.error
		});
		stats.num_workers = workers_l.len();
		workers_l.len()
	}

	// Handle an RPC request message from the worker(s)
	fn handle_rpc_requests(&self) {
		let mut workers_l = self.workers.lock();
		for num in 0..workers_l.len() {
			if let Some(the_message) = workers_l[num].read_message() {
				let request: RpcRequest = match serde_json::from_str(&the_message) {
					Ok(request) => request,
					Err(e) => {
						warn!(
							"failed to parse stratum message: {} - {:?}",
							e,
							the_message.trim()
						);
						continue;
					}
				};

				{
					let mut stats = self.stats.write();
					let worker_id = workers_l[num].id.to_string();
					if let Some(ws) = stats.worker_stats.iter_mut().find(|ws| ws.id == worker_id)
					{
						ws.last_seen = Utc::now();
					}
				}

				let worker = &mut workers_l[num];
				match request.method.as_str() {
					"mining.subscribe" => self.handle_subscribe(&request, worker),
					"mining.authorize" => self.handle_authorize(&request, worker),
					"mining.extranonce.subscribe" => self.handle_extranonce(&request, worker),
					"mining.submit" => self.handle_submit(&request, worker),
					_ => {
						let id = request.id.clone().unwrap_or(Value::Null);
						worker.send_error(id, -32601, "Method not found");
					}
				}
			}
		}
	}

	// Handle SUBSCRIBE message
	fn handle_subscribe(&self, request: &RpcRequest, worker: &mut Worker) {
		worker.flavor = match &request.params {
			Some(Value::Array(params))
				if params.len() >= 2 && params[1] == json!(NICEHASH_PROTO) =>
			{
				Flavor::NiceHash
			}
			_ => Flavor::Basic,
		};
		worker.subscribed = true;
		let extra_nonce = rand_extra_nonce();
		worker.extra_nonce = Some(extra_nonce.clone());
		info!(
			"stratum worker {} subscribed, flavor {:?}",
			worker.id, worker.flavor
		);

		let id = request.id.clone().unwrap_or(json!(1));
		worker.send_result(
			id,
			json!([
				["mining.notify", SUBSCRIPTION_ID, NICEHASH_PROTO],
				extra_nonce
			]),
		);
	}

	// Handle AUTHORIZE message - accept unconditionally, remember the
	// wallet part of "wallet.worker"
	fn handle_authorize(&self, request: &RpcRequest, worker: &mut Worker) {
		let id = request.id.clone().unwrap_or(Value::Null);
		let user = request
			.params
			.as_ref()
			.and_then(|p| p.get(0))
			.and_then(|v| v.as_str())
			.unwrap_or("");
		worker.miner_wallet = user.split('.').next().unwrap_or("").to_lowercase();
		info!("stratum worker {} wallet {}", worker.id, worker.miner_wallet);
		worker.send_result(id, json!(true));
	}

	// Handle EXTRANONCE SUBSCRIBE - ack and push a fresh prefix
	fn handle_extranonce(&self, request: &RpcRequest, worker: &mut Worker) {
		let id = request.id.clone().unwrap_or(Value::Null);
		worker.send_result(id, json!(true));

		let extra_nonce = rand_extra_nonce();
		worker.extra_nonce = Some(extra_nonce.clone());
		worker.write_json(json!({
			"id": Value::Null,
			"method": "mining.set_extranonce",
			"params": [extra_nonce],
		}));
	}

	// Handle SUBMIT message, both flavors, then run the shared pipeline.
	fn handle_submit(&self, request: &RpcRequest, worker: &mut Worker) {
		let id = match &request.id {
			Some(id) if !id.is_null() => id.clone(),
			_ => {
				warn!("submitted result message without id");
				return;
			}
		};
		let params = match &request.params {
			Some(Value::Array(params)) => params,
			_ => {
				worker.send_error(id, -32600, "Invalid Request");
				return;
			}
		};

		let str_param = |i: usize| -> String {
			params
				.get(i)
				.and_then(|v| v.as_str())
				.unwrap_or("")
				.to_lowercase()
		};

		let miner_wallet = worker.miner_wallet.clone();
		let work: Option<PowWork>;
		let nonce: u64;
		let nonce_hex: String;
		let mix_bytes: Vec<u8>;
		let worker_name: String;
		match worker.flavor {
			Flavor::Basic => {
				// params = [user, job_id, nonce, header, mix_digest]
				if params.len() < 5 {
					worker.send_error(id, -32602, "Invalid params");
					return;
				}
				let user = str_param(0);
				nonce_hex = str_param(2);
				let header = str_param(3);
				let mix_digest = str_param(4);

				nonce = match from_hex_u64(&nonce_hex) {
					Ok(n) => n,
					Err(_) => {
						worker.send_error(id, -32602, "Invalid params");
						return;
					}
				};
				mix_bytes = match from_hex(&mix_digest) {
					Ok(bytes) => bytes,
					Err(_) => {
						worker.send_error(id, -32602, "Invalid params");
						return;
					}
				};
				worker_name = user
					.splitn(2, '.')
					.nth(1)
					.and_then(|n| valid_worker_name(n))
					.unwrap_or_else(|| DEFAULT_WORKER_NAME.to_string());

				let boundary = worker.cur_boundary.clone();
				work = self.pool.find_work_by_header_boundary(&header, &boundary, true);
			}
			Flavor::NiceHash => {
				// params = [worker, job_id, nonce_suffix]; the true nonce
				// is extra_nonce ++ suffix and the mix digest is ours to
				// recompute
				if params.len() < 3 {
					worker.send_error(id, -32602, "Invalid params");
					return;
				}
				worker_name = valid_worker_name(&str_param(0))
					.unwrap_or_else(|| DEFAULT_WORKER_NAME.to_string());
				let job_id = str_param(1);
				let suffix = str_param(2);
				nonce_hex = match &worker.extra_nonce {
					Some(prefix) => format!("0x{}{}", prefix, strip_hex(&suffix)),
					None => suffix.clone(),
				};
				nonce = match from_hex_u64(&nonce_hex) {
					Ok(n) => n,
					Err(_) => {
						worker.send_error(id, -32602, "Invalid params");
						return;
					}
				};

				work = job_id
					.parse::<u64>()
					.ok()
					.and_then(|job| self.pool.find_work_by_id(job, true));
				mix_bytes = match &work {
					Some(work) => match header_bytes(&work.header) {
						Some(header) => {
							let (mix, _) =
								self.verifier.pow_hash(work.block_num, &header, nonce);
							mix.to_vec()
						}
						None => vec![],
					},
					None => vec![],
				};
			}
		}

		if let Some(work) = &work {
			worker.set_work_done(work);
		}

		if let Err(e) = self
			.pool
			.store()
			.get_or_create_worker(&miner_wallet, &worker_name)
		{
			warn!("failed to upsert worker {}.{}: {}", miner_wallet, worker_name, e);
		}

		let res = self.pool.submit(
			&self.verifier,
			work.as_ref(),
			nonce,
			&nonce_hex,
			&mix_bytes,
			&miner_wallet,
			&worker_name,
		);

		let worker_id = worker.id.to_string();
		let mut stats = self.stats.write();
		match res {
			Ok(result) => {
				warn!("work submitted, {} {}", result.header, result.boundary);
				if let Some(ws) = stats.worker_stats.iter_mut().find(|ws| ws.id == worker_id) {
					ws.num_accepted += 1;
				}
				drop(stats);
				worker.send_result(id, json!(true));
			}
			Err(e) => {
				if let Some(ws) = stats.worker_stats.iter_mut().find(|ws| ws.id == worker_id) {
					ws.num_rejected += 1;
				}
				drop(stats);
				worker.send_error(id, -32502, &format!("{:?}", e));
			}
		}
	}

	/// Broadcast a dummy job to every connected miner, no dispatch
	/// accounting, results never reach a node.
	pub fn notify_dummy(&self, work: &PowWork) {
		let mut workers_l = self.workers.lock();
		for worker in workers_l.iter_mut() {
			worker.notify_work(work, false);
		}
	}
}

impl WorkPublisher for StratumServer {
	/// Fresh real work: offer each connected miner the best dispatchable
	/// work item, with the same accounting the pulling path uses.
	fn notify_new_work(&self) {
		let settings = self.settings.get();
		let mut workers_l = self.workers.lock();
		for worker in workers_l.iter_mut() {
			let work = self
				.pool
				.get_new_works(1, settings.min_fee, Some(settings.max_dispatch))
				.pop();
			if let Some(work) = work {
				if let Some(work) = self.pool.increase_dispatched(
					work.id,
					settings.max_dispatch,
					1,
					settings.inc_expire,
				) {
					worker.notify_work(&work, true);
				}
			}
		}
	}
}

fn header_bytes(header: &str) -> Option<[u8; 32]> {
	let bytes = from_hex(header).ok()?;
	if bytes.len() != 32 {
		return None;
	}
	let mut out = [0u8; 32];
	out.copy_from_slice(&bytes);
	Some(out)
}
