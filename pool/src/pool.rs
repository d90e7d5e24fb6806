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

//! The work-pool state machine: work creation, deterministic dispatch
//! ordering, the atomic dispatch counter with its overflow reset, result
//! saving under the best-solution rule and the PoW-window ledger.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::store::PoolStore;
use crate::types::{PowResult, PowWindow, PowWork, SubmitError};
use zilproxy_core::pow::{self, EthashVerifier};
use zilproxy_util::{from_hex, strip_0x, to_hex_0x};

/// Window records consulted when estimating the next PoW opening.
const WINDOW_HISTORY: usize = 10;

/// The work pool over its store handle. Cheap to clone via Arc, shared by
/// every server component.
pub struct WorkPool {
	store: Arc<PoolStore>,
}

fn lower_0x(hex_str: &str) -> String {
	format!("0x{}", strip_0x(&hex_str.to_lowercase()).to_string())
}

/// Trimmed mean over positive samples: sorted, extremes dropped once more
/// than 4 samples are available.
fn trimmed_mean(mut samples: Vec<f64>) -> f64 {
	samples.retain(|s| *s > 0.0);
	samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
	if samples.len() > 4 {
		samples = samples[1..samples.len() - 1].to_vec();
	}
	if samples.is_empty() {
		0.0
	} else {
		samples.iter().sum::<f64>() / samples.len() as f64
	}
}

fn seconds_f64(d: Duration) -> f64 {
	d.num_milliseconds() as f64 / 1000.0
}

impl WorkPool {
	/// Pool over the given store.
	pub fn new(store: Arc<PoolStore>) -> WorkPool {
		WorkPool { store }
	}

	/// Access to the underlying store, for stats and tooling.
	pub fn store(&self) -> &PoolStore {
		&self.store
	}

	/// Create and persist a new work item. The seed is derived from the
	/// block number through the Ethash seed chain, the expiry from the
	/// node-declared timeout.
	pub fn new_work(
		&self,
		header: &str,
		block_num: u64,
		boundary: &str,
		pub_key: &str,
		signature: &str,
		timeout_secs: u64,
		pow_fee: f64,
	) -> Option<PowWork> {
		let start_time = Utc::now();
		let expire_time = start_time + Duration::seconds(timeout_secs as i64);
		let seed = to_hex_0x(&pow::get_seedhash(block_num));

		let work = PowWork {
			id: 0,
			header: lower_0x(header),
			seed,
			boundary: lower_0x(boundary),
			pub_key: lower_0x(pub_key),
			signature: lower_0x(signature),
			block_num,
			start_time,
			expire_time,
			finished: false,
			miner_wallet: String::new(),
			pow_fee,
			dispatched: 0,
		};

		match self.store.create_work(work) {
			Ok(work) => Some(work),
			Err(e) => {
				warn!("failed to persist new work: {}", e);
				None
			}
		}
	}

	/// Dispatchable work, deterministically ordered: easiest boundary
	/// first, then highest fee, then oldest round start, then least
	/// dispatched. Works whose current round starts in the future (the
	/// overflow cooldown) are not offered yet.
	pub fn get_new_works(
		&self,
		count: usize,
		min_fee: f64,
		max_dispatch: Option<u32>,
	) -> Vec<PowWork> {
		let now = Utc::now();
		let ids = match self.store.pending_work_ids(&now) {
			Ok(ids) => ids,
			Err(e) => {
				warn!("failed to read pending works: {}", e);
				return vec![];
			}
		};

		let mut works: Vec<PowWork> = Vec::new();
		for id in ids {
			match self.store.get_work(id) {
				Ok(Some(work)) => works.push(work),
				Ok(None) => (),
				Err(e) => warn!("failed to load work {}: {}", id, e),
			}
		}

		works.retain(|w| {
			!w.finished
				&& !w.is_expired(now)
				&& w.start_time <= now
				&& w.pow_fee >= min_fee
				&& max_dispatch.map(|m| w.dispatched < m).unwrap_or(true)
		});
		works.sort_by(|a, b| {
			b.boundary
				.cmp(&a.boundary)
				.then_with(|| {
					b.pow_fee
						.partial_cmp(&a.pow_fee)
						.unwrap_or(Ordering::Equal)
				})
				.then_with(|| a.start_time.cmp(&b.start_time))
				.then_with(|| a.dispatched.cmp(&b.dispatched))
		});
		works.truncate(count);
		works
	}

	/// Look a work item up by header, and boundary when one is given.
	/// Default order is oldest round first.
	pub fn find_work_by_header_boundary(
		&self,
		header: &str,
		boundary: &str,
		check_expired: bool,
	) -> Option<PowWork> {
		let now = Utc::now();
		let mut works = match self.store.works_by_header(&lower_0x(header)) {
			Ok(works) => works,
			Err(e) => {
				warn!("failed to look up works by header: {}", e);
				return None;
			}
		};
		if !boundary.is_empty() {
			let boundary = lower_0x(boundary);
			works.retain(|w| w.boundary == boundary);
		}
		if check_expired {
			works.retain(|w| !w.is_expired(now));
		}
		works.sort_by(|a, b| a.start_time.cmp(&b.start_time));
		works.into_iter().next()
	}

	/// Look a work item up by its id (the stratum job id).
	pub fn find_work_by_id(&self, id: u64, check_expired: bool) -> Option<PowWork> {
		let work = match self.store.get_work(id) {
			Ok(work) => work?,
			Err(e) => {
				warn!("failed to look up work {}: {}", id, e);
				return None;
			}
		};
		if check_expired && work.is_expired(Utc::now()) {
			return None;
		}
		Some(work)
	}

	/// Atomically bump the dispatch counter of a work item. When the
	/// counter reaches `max_dispatch` the round is reset with a cooldown:
	/// the counter returns to 1 and the round start moves forward by
	/// `inc_seconds` (or to now when that would pass the expiry), so the
	/// same work can be re-offered later without exceeding the fan-out
	/// cap while it lives. Returns the updated work, or `None` on a store
	/// failure.
	pub fn increase_dispatched(
		&self,
		work_id: u64,
		max_dispatch: u32,
		count: u32,
		inc_seconds: u64,
	) -> Option<PowWork> {
		let res = self.store.modify_work(work_id, |work| {
			work.dispatched += count;
			if work.dispatched == 1 {
				warn!("work dispatched, {} - {}", work.header, work.boundary);
				return;
			}
			if work.dispatched >= max_dispatch {
				let candidate = work.start_time + Duration::seconds(inc_seconds as i64);
				if candidate >= work.expire_time {
					let now = Utc::now();
					if now < work.expire_time {
						error!(
							"reset start_time to retry, {} - {}",
							work.header, work.boundary
						);
						work.dispatched = 1;
						work.start_time = now;
					}
				} else {
					warn!(
						"reset dispatched to retry, {} - {}",
						work.header, work.boundary
					);
					work.dispatched = 1;
					work.start_time = candidate;
				}
			}
		});
		match res {
			Ok(work) => work,
			Err(e) => {
				warn!("failed to increase dispatched for work {}: {}", work_id, e);
				None
			}
		}
	}

	/// Save a solution for a work item and mark the work finished. On a
	/// store failure nothing is recorded and the work stays open.
	pub fn save_result(
		&self,
		work: &PowWork,
		nonce: &str,
		mix_digest: &str,
		hash_result: &str,
		miner_wallet: &str,
		worker_name: &str,
	) -> Option<PowResult> {
		let result = PowResult {
			id: 0,
			header: work.header.clone(),
			seed: work.seed.clone(),
			boundary: work.boundary.clone(),
			pub_key: work.pub_key.clone(),
			mix_digest: lower_0x(mix_digest),
			nonce: lower_0x(nonce),
			hash_result: lower_0x(hash_result),
			block_num: work.block_num,
			pow_fee: work.pow_fee,
			finished_time: Utc::now(),
			verified_time: None,
			verified: false,
			miner_wallet: miner_wallet.to_string(),
			worker_name: worker_name.to_string(),
		};
		match self.store.save_result(work, result) {
			Ok((_, result)) => Some(result),
			Err(e) => {
				warn!(
					"failed to save result for {} - {}: {}",
					work.header, work.boundary, e
				);
				None
			}
		}
	}

	/// The current result for a `(header, boundary)` pair, latest
	/// finished_time first, optionally narrowed to one node key.
	pub fn latest_result(
		&self,
		header: &str,
		boundary: &str,
		pub_key: Option<&str>,
	) -> Option<PowResult> {
		let mut results = match self
			.store
			.results_by_header_boundary(&lower_0x(header), &lower_0x(boundary))
		{
			Ok(results) => results,
			Err(e) => {
				warn!("failed to look up results: {}", e);
				return None;
			}
		};
		if let Some(pub_key) = pub_key {
			let pub_key = lower_0x(pub_key);
			results.retain(|r| r.pub_key == pub_key);
		}
		results.sort_by(|a, b| {
			b.finished_time
				.cmp(&a.finished_time)
				.then_with(|| b.id.cmp(&a.id))
		});
		results.into_iter().next()
	}

	/// The full verify → best-solution → save pipeline every submission
	/// runs through, shared by the HTTP and stratum paths. Worker counters
	/// are bumped as a side effect.
	pub fn submit(
		&self,
		verifier: &EthashVerifier,
		work: Option<&PowWork>,
		nonce: u64,
		nonce_hex: &str,
		mix_digest: &[u8],
		miner_wallet: &str,
		worker_name: &str,
	) -> Result<PowResult, SubmitError> {
		let fail = |err: SubmitError| {
			self.bump_worker(miner_wallet, worker_name, 0, 1, 0, 0);
			Err(err)
		};

		let work = match work {
			Some(work) => work,
			None => {
				warn!("work not found or expired for {}.{}", miner_wallet, worker_name);
				return fail(SubmitError::WorkNotFound);
			}
		};

		let header = match decode_fixed(&work.header, 32) {
			Some(h) => h,
			None => return fail(SubmitError::WorkNotFound),
		};
		let boundary = from_hex(&work.boundary).unwrap_or_default();

		let hash_result =
			match verifier.verify(work.block_num, &header, mix_digest, nonce, &boundary) {
				Some(hash) => hash,
				None => {
					warn!(
						"wrong result from miner {}.{} for {}",
						miner_wallet, worker_name, work.header
					);
					return fail(SubmitError::Verifier);
				}
			};

		// best-solution rule: a finished work only accepts a strictly
		// smaller hash while the previous result is unverified
		if work.finished {
			if let Some(prev) = self.latest_result(&work.header, &work.boundary, None) {
				if prev.verified {
					warn!(
						"submitted too late, work is verified, {} {}",
						work.header, work.boundary
					);
					return fail(SubmitError::AlreadyVerified);
				}
				let prev_hash = from_hex(&prev.hash_result).unwrap_or_default();
				if pow::is_less_or_equal(&prev_hash, &hash_result) {
					warn!(
						"submitted result > current result, ignored, {} {}",
						work.header, work.boundary
					);
					return fail(SubmitError::WorseSolution);
				}
			}
		}

		let result = match self.save_result(
			work,
			nonce_hex,
			&to_hex_0x(mix_digest),
			&to_hex_0x(&hash_result),
			miner_wallet,
			worker_name,
		) {
			Some(result) => result,
			None => return Err(SubmitError::StoreError),
		};

		self.bump_worker(miner_wallet, worker_name, 0, 0, 1, 0);
		Ok(result)
	}

	/// Stamp the node's verdict on the current result of a
	/// `(header, boundary, pub_key)` triple. Bumps the submitting
	/// worker's verified counter when the verdict is positive.
	pub fn verify_result(
		&self,
		header: &str,
		boundary: &str,
		pub_key: &str,
		verified: bool,
	) -> Option<PowResult> {
		let mut result = self.latest_result(header, boundary, Some(pub_key))?;
		result.verified = verified;
		result.verified_time = Some(Utc::now());
		if let Err(e) = self.store.update_result(&result) {
			warn!("failed to update pow result {}: {}", result.id, e);
			return None;
		}
		if verified {
			self.bump_worker(&result.miner_wallet, &result.worker_name, 0, 0, 0, 1);
		}
		Some(result)
	}

	/// Bump worker counters, swallowing store errors.
	pub fn bump_worker(
		&self,
		wallet: &str,
		worker_name: &str,
		submitted: u64,
		failed: u64,
		finished: u64,
		verified: u64,
	) {
		if let Err(e) = self.store.update_worker_stat(
			wallet,
			worker_name,
			submitted,
			failed,
			finished,
			verified,
		) {
			warn!("failed to update worker {}.{}: {}", wallet, worker_name, e);
		}
	}

	// ---- PoW window ledger

	/// PoW window of one epoch derived from its works: first round start
	/// to last expiry.
	pub fn calc_pow_window(&self, block_num: u64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
		let works = match self.store.works_by_block(block_num) {
			Ok(works) => works,
			Err(e) => {
				warn!("failed to load works of block {}: {}", block_num, e);
				return None;
			}
		};
		let first = works.iter().map(|w| w.start_time).min()?;
		let last = works.iter().map(|w| w.expire_time).max()?;
		Some((first, last))
	}

	fn avg_pow_time(&self) -> f64 {
		match self.store.last_windows(WINDOW_HISTORY) {
			Ok(windows) => trimmed_mean(windows.iter().map(|w| w.pow_window).collect()),
			Err(_) => 0.0,
		}
	}

	fn avg_epoch_time(&self) -> f64 {
		match self.store.last_windows(WINDOW_HISTORY) {
			Ok(windows) => trimmed_mean(windows.iter().map(|w| w.epoch_window).collect()),
			Err(_) => 0.0,
		}
	}

	/// Update the epoch ledger for a freshly created work item: close out
	/// the previous epoch's record when a new epoch starts and estimate
	/// when the next PoW window will open.
	pub fn update_pow_window(&self, work: &PowWork) {
		let latest = match self.store.latest_window() {
			Ok(latest) => latest,
			Err(e) => {
				warn!("failed to read pow window ledger: {}", e);
				return;
			}
		};
		let latest_num = latest.as_ref().map(|w| w.block_num);

		if let Some(latest_num) = latest_num {
			if work.block_num < latest_num {
				error!("old record found in pow window ledger, pls clean the database");
				return;
			}
			if work.block_num == latest_num {
				// pow is ongoing, nothing to do
				return;
			}
			if work.block_num == latest_num + 1 {
				// new epoch start, close out the previous record
				if let (Some(mut prev), Some((pow_start, pow_end))) =
					(latest.clone(), self.calc_pow_window(latest_num))
				{
					prev.pow_start = pow_start;
					prev.pow_end = pow_end;
					prev.pow_window = seconds_f64(pow_end - pow_start);
					prev.epoch_window = seconds_f64(work.start_time - pow_start);
					if let Err(e) = self.store.save_window(&prev) {
						warn!("failed to close out pow window {}: {}", latest_num, e);
					}
				}
			}
		}

		let epoch_secs = self.avg_epoch_time();
		let pow_window = latest
			.as_ref()
			.map(|w| w.pow_window)
			.unwrap_or_else(|| self.avg_pow_time());
		let record = PowWindow {
			block_num: work.block_num,
			create_time: Utc::now(),
			pow_start: work.start_time,
			pow_end: work.start_time,
			pow_window,
			epoch_window: 0.0,
			estimated_next_pow: Some(
				work.start_time + Duration::milliseconds((epoch_secs * 1000.0) as i64),
			),
		};
		if let Err(e) = self.store.save_window(&record) {
			warn!("failed to save pow window {}: {}", record.block_num, e);
		}
	}

	/// Seconds until the next estimated PoW window. Zero while inside the
	/// current window (miners should keep polling, not sleep) and zero
	/// when the ledger has no usable estimate.
	pub fn seconds_to_next_pow(&self) -> u64 {
		let latest = match self.store.latest_window() {
			Ok(Some(latest)) => latest,
			_ => return 0,
		};
		let next_pow = match latest.estimated_next_pow {
			Some(next_pow) => next_pow,
			None => return 0,
		};

		let now = Utc::now();
		if now > next_pow {
			warn!("we are missing some pow window records");
			return 0;
		}
		if now < latest.pow_start + Duration::milliseconds((latest.pow_window * 1000.0) as i64) {
			// we are inside the current pow window
			return 0;
		}
		(next_pow - now).num_seconds().max(0) as u64
	}
}

fn decode_fixed(hex_str: &str, len: usize) -> Option<[u8; 32]> {
	let bytes = from_hex(hex_str).ok()?;
	if bytes.len() != len {
		return None;
	}
	let mut out = [0u8; 32];
	out.copy_from_slice(&bytes);
	Some(out)
}
