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

//! Cached view of the live chain, refreshed by a background poll task.
//! Readers only ever touch the mutex-protected snapshot.

use chrono::{DateTime, Duration as OldDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ZilliqaClient;
use crate::ZilliqaConfig;
use zilproxy_util::Mutex;

#[derive(Debug, Clone, Default)]
struct ChainInfo {
	cur_tx_block: u64,
	cur_ds_block: u64,
	shard_difficulty: u32,
	ds_difficulty: u32,
	estimated_pow_time: Option<DateTime<Utc>>,
}

/// Tracks current TX/DS blocks and difficulties, and estimates when the
/// next PoW window opens.
pub struct ChainTracker {
	config: ZilliqaConfig,
	client: ZilliqaClient,
	info: Mutex<ChainInfo>,
}

impl ChainTracker {
	/// Tracker against the configured API endpoint. State starts empty
	/// and fills in on the first poll.
	pub fn new(config: ZilliqaConfig) -> ChainTracker {
		let client = ZilliqaClient::new(&config.api_endpoint);
		ChainTracker {
			config,
			client,
			info: Mutex::new(ChainInfo::default()),
		}
	}

	/// The chain integration config this tracker runs with.
	pub fn config(&self) -> &ZilliqaConfig {
		&self.config
	}

	/// Latest observed TX block.
	pub fn cur_tx_block(&self) -> u64 {
		self.info.lock().cur_tx_block
	}

	/// Latest observed DS block.
	pub fn cur_ds_block(&self) -> u64 {
		self.info.lock().cur_ds_block
	}

	/// Latest observed shard difficulty.
	pub fn shard_difficulty(&self) -> u32 {
		self.info.lock().shard_difficulty
	}

	/// Latest observed DS difficulty.
	pub fn ds_difficulty(&self) -> u32 {
		self.info.lock().ds_difficulty
	}

	fn calc_secs_to_pow(&self, tx_block: u64) -> f64 {
		let block_in_epoch = tx_block % self.config.block_per_pow;
		if block_in_epoch == 0 {
			return 0.0;
		}
		(self.config.block_per_pow - block_in_epoch) as f64 * self.config.avg_block_time
	}

	/// Whether the network is inside a PoW window right now: the first or
	/// the last TX block of an epoch.
	pub fn is_pow_window(&self) -> bool {
		let tx_block = self.cur_tx_block();
		if tx_block == 0 {
			return false;
		}
		let block_in_epoch = tx_block % self.config.block_per_pow;
		block_in_epoch == 0 || block_in_epoch == self.config.block_per_pow - 1
	}

	/// Seconds until the next PoW window by the block-position estimate,
	/// re-anchored whenever the estimate has drifted into the past.
	pub fn secs_to_next_pow(&self) -> u64 {
		let now = Utc::now();
		let mut info = self.info.lock();
		if info.cur_tx_block == 0 {
			return 0;
		}
		let estimated = match info.estimated_pow_time {
			Some(est) => est,
			None => return 0,
		};
		let estimated = if now > estimated {
			let secs = self.calc_secs_to_pow(info.cur_tx_block);
			let next = now + OldDuration::milliseconds((secs * 1000.0) as i64);
			info.estimated_pow_time = Some(next);
			next
		} else {
			estimated
		};
		(estimated - now).num_seconds().max(0) as u64
	}

	/// Poll the chain once and fold the answers into the snapshot. Every
	/// failure is logged and swallowed.
	pub async fn update_chain_info(&self) {
		match self.client.get_current_mini_epoch().await {
			Ok(block) => {
				let mut info = self.info.lock();
				if block > info.cur_tx_block {
					info.cur_tx_block = block;
					let secs = self.calc_secs_to_pow(block);
					info.estimated_pow_time =
						Some(Utc::now() + OldDuration::milliseconds((secs * 1000.0) as i64));
				}
			}
			Err(e) => warn!("failed to fetch current tx block: {}", e),
		}

		match self.client.get_current_ds_epoch().await {
			Ok(block) => {
				let mut info = self.info.lock();
				if block > info.cur_ds_block {
					info.cur_ds_block = block;
				}
			}
			Err(e) => warn!("failed to fetch current ds block: {}", e),
		}

		match self.client.get_prev_difficulty().await {
			Ok(difficulty) => {
				if difficulty > 0 {
					self.info.lock().shard_difficulty = difficulty;
				}
			}
			Err(e) => warn!("failed to fetch shard difficulty: {}", e),
		}

		match self.client.get_prev_ds_difficulty().await {
			Ok(difficulty) => {
				if difficulty > 0 {
					self.info.lock().ds_difficulty = difficulty;
				}
			}
			Err(e) => warn!("failed to fetch ds difficulty: {}", e),
		}
	}

	/// Test/tooling hook: seed the snapshot without touching the network.
	pub fn set_chain_info(
		&self,
		tx_block: u64,
		ds_block: u64,
		shard_difficulty: u32,
		ds_difficulty: u32,
	) {
		let mut info = self.info.lock();
		info.cur_tx_block = tx_block;
		info.cur_ds_block = ds_block;
		info.shard_difficulty = shard_difficulty;
		info.ds_difficulty = ds_difficulty;
		let secs = self.calc_secs_to_pow(tx_block);
		info.estimated_pow_time =
			Some(Utc::now() + OldDuration::milliseconds((secs * 1000.0) as i64));
	}
}

/// Poll forever at the configured interval. Spawn on the runtime, drop
/// the handle to stop it at shutdown.
pub async fn poll_loop(tracker: Arc<ChainTracker>) {
	let every = tracker.config().update_interval.max(1);
	let mut interval = tokio::time::interval(Duration::from_secs(every));
	loop {
		interval.tick().await;
		tracker.update_chain_info().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tracker() -> ChainTracker {
		let mut config = ZilliqaConfig::default();
		config.block_per_pow = 100;
		config.avg_block_time = 10.0;
		ChainTracker::new(config)
	}

	#[test]
	fn pow_window_positions() {
		let t = tracker();
		assert!(!t.is_pow_window());

		t.set_chain_info(100, 2, 32, 33);
		assert!(t.is_pow_window());
		t.set_chain_info(199, 2, 32, 33);
		assert!(t.is_pow_window());
		t.set_chain_info(150, 2, 32, 33);
		assert!(!t.is_pow_window());
	}

	#[test]
	fn secs_estimate() {
		let t = tracker();
		assert_eq!(t.secs_to_next_pow(), 0);

		// 50 blocks to go at 10s each
		t.set_chain_info(150, 2, 32, 33);
		let secs = t.secs_to_next_pow();
		assert!(secs > 490 && secs <= 500, "secs = {}", secs);

		// at the window itself the estimate collapses to zero
		t.set_chain_info(200, 2, 32, 33);
		assert_eq!(t.secs_to_next_pow(), 0);
	}

	#[test]
	fn difficulties_held() {
		let t = tracker();
		t.set_chain_info(10, 2, 32, 33);
		assert_eq!(t.shard_difficulty(), 32);
		assert_eq!(t.ds_difficulty(), 33);
		assert_eq!(t.cur_ds_block(), 2);
	}
}
