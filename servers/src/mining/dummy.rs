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

//! Synthetic work pump. Between real PoW windows stratum miners would
//! otherwise idle and disconnect; every few seconds they get a random
//! header at the live network boundary. Verification still runs on the
//! shares, the results just never reach a node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::mining::stratumserver::StratumServer;
use zilproxy_chain::ChainTracker;
use zilproxy_core::crypto::ProxyKey;
use zilproxy_core::pow::difficulty_to_boundary_divided;
use zilproxy_pool::WorkPool;
use zilproxy_util::{rand_bytes, to_hex_0x};

const DUMMY_WORK_INTERVAL: Duration = Duration::from_secs(15);
const DUMMY_WORK_TIMEOUT: u64 = 60;

/// Run the pump until the stop flag flips. Signs each dummy work with a
/// throwaway key generated at startup, the signature is never checked.
pub fn run_dummy_work_pump(
	server: Arc<StratumServer>,
	tracker: Arc<ChainTracker>,
	pool: Arc<WorkPool>,
	stop: Arc<AtomicBool>,
) {
	let key = ProxyKey::generate();
	let pub_key = key.public_hex();

	while !stop.load(Ordering::Relaxed) {
		thread::sleep(DUMMY_WORK_INTERVAL);
		debug!("run to create dummy work");

		if server.num_workers() == 0 {
			continue;
		}

		let config = tracker.config();
		let tx_block = tracker.cur_tx_block();
		let block_in_epoch = tx_block % config.block_per_pow;
		if block_in_epoch == 0 || block_in_epoch == config.block_per_pow - 1 {
			debug!("block number {}, don't send dummy work", tx_block);
			continue;
		}

		let difficulty = tracker.shard_difficulty();
		if difficulty == 0 {
			continue;
		}
		let boundary = match difficulty_to_boundary_divided(
			difficulty,
			config.n_divided,
			config.n_divided_start,
		) {
			Ok(boundary) => to_hex_0x(&boundary),
			Err(e) => {
				warn!("bad network difficulty {}: {}", difficulty, e);
				continue;
			}
		};

		let header_bytes = rand_bytes(32);
		let header = to_hex_0x(&header_bytes);
		let signature = match key.sign_hex(&header_bytes) {
			Ok(sig) => format!("0x{}", sig),
			Err(_) => continue,
		};

		let ds_block = tracker.cur_ds_block();
		let work = pool.new_work(
			&header,
			ds_block,
			&boundary,
			&pub_key,
			&signature,
			DUMMY_WORK_TIMEOUT,
			0.0,
		);
		if let Some(work) = work {
			server.notify_dummy(&work);
		}
	}
}
