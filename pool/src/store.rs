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

//! Implements storage primitives required by the work pool: prefixed
//! primary keys per collection, the secondary index entries behind the
//! hot queries, id allocation and the reward aggregations.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::types::{
	HashRate, Miner, NodeKey, PowResult, PowWindow, PowWork, SiteSettings, Worker,
};
use lmdb_zero as lmdb;
use zilproxy_core::ser::{self, Readable, Reader, Writeable, Writer};
use zilproxy_store::{self as store, Store};
use zilproxy_util::from_hex;

const DB_NAME: &str = "zilproxy";

const SEP: u8 = b':';

const WORK_PREFIX: u8 = b'w';
const RESULT_PREFIX: u8 = b'r';
const MINER_PREFIX: u8 = b'm';
const WORKER_PREFIX: u8 = b'k';
const NODE_PREFIX: u8 = b'n';
const WINDOW_PREFIX: u8 = b'e';
const WINDOW_HEAD_PREFIX: u8 = b'E';
const HASHRATE_PREFIX: u8 = b'h';
const COUNTER_PREFIX: u8 = b'c';
const SETTINGS_PREFIX: u8 = b's';

// secondary indices
const IDX_WORK_HEADER: u8 = b'x';
const IDX_WORK_PENDING: u8 = b'p';
const IDX_WORK_NODE: u8 = b'y';
const IDX_WORK_BLOCK: u8 = b'b';
const IDX_RESULT_HB: u8 = b'z';

// counter tags
const COUNTER_WORK: u8 = 0;
const COUNTER_RESULT: u8 = 1;
const COUNTER_HASHRATE: u8 = 2;

/// Value stored by secondary index entries, pointing back at a primary id.
struct IdEntry(u64);

impl Writeable for IdEntry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.0)
	}
}

impl Readable for IdEntry {
	fn read<R: Reader>(reader: &mut R) -> Result<IdEntry, ser::Error> {
		Ok(IdEntry(reader.read_u64()?))
	}
}

/// Aggregated rewards over a set of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardsSummary {
	/// Sum of pow fees
	pub rewards: f64,
	/// Number of results
	pub count: u64,
	/// Number of verified results
	pub verified: u64,
	/// Earliest finished_time in the set
	pub first_work_at: Option<DateTime<Utc>>,
	/// Latest finished_time in the set
	pub last_work_at: Option<DateTime<Utc>>,
}

/// Per-miner rewards of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinerRewards {
	/// Wallet the rewards belong to
	pub miner_wallet: String,
	/// Epoch the aggregation ran over
	pub block_num: u64,
	/// Sum of pow fees
	pub rewards: f64,
	/// Solutions accepted
	pub finished: u64,
	/// Solutions confirmed
	pub verified: u64,
}

fn to_key(prefix: u8, k: &[u8]) -> Vec<u8> {
	let mut key = Vec::with_capacity(2 + k.len());
	key.push(prefix);
	key.push(SEP);
	key.extend_from_slice(k);
	key
}

fn to_key_u64(prefix: u8, id: u64) -> Vec<u8> {
	let mut id_bytes = [0u8; 8];
	BigEndian::write_u64(&mut id_bytes, id);
	to_key(prefix, &id_bytes)
}

fn u64_bytes(val: u64) -> [u8; 8] {
	let mut bytes = [0u8; 8];
	BigEndian::write_u64(&mut bytes, val);
	bytes
}

fn millis_bytes(time: &DateTime<Utc>) -> [u8; 8] {
	u64_bytes(time.timestamp_millis().max(0) as u64)
}

/// Key material for a hex-typed field: decoded bytes when it parses,
/// raw string bytes otherwise so lookups still behave deterministically.
fn hex_key(hex_str: &str) -> Vec<u8> {
	from_hex(hex_str).unwrap_or_else(|_| hex_str.as_bytes().to_vec())
}

/// An implementation of the persistence the pool needs, backed by a
/// single LMDB database.
pub struct PoolStore {
	db: Store,
}

impl PoolStore {
	/// Opens (or creates) the pool database in the provided environment.
	pub fn new(env: Arc<lmdb::Environment>) -> PoolStore {
		PoolStore {
			db: Store::open(env, DB_NAME),
		}
	}

	fn next_id(&self, batch: &store::Batch<'_>, tag: u8) -> Result<u64, store::Error> {
		let key = to_key(COUNTER_PREFIX, &[tag]);
		let next = match batch.get_ser::<IdEntry>(&key)? {
			Some(cur) => cur.0 + 1,
			None => 1,
		};
		batch.put_ser(&key, &IdEntry(next))?;
		Ok(next)
	}

	// ---- works

	/// Persist a new work item, allocating its id and writing every
	/// secondary index entry in the same transaction.
	pub fn create_work(&self, work: PowWork) -> Result<PowWork, store::Error> {
		let mut work = work;
		let batch = self.db.batch()?;
		work.id = self.next_id(&batch, COUNTER_WORK)?;
		let id_bytes = u64_bytes(work.id);

		batch.put_ser(&to_key_u64(WORK_PREFIX, work.id), &work)?;

		let mut header_key = hex_key(&work.header);
		header_key.extend_from_slice(&id_bytes);
		batch.put_ser(&to_key(IDX_WORK_HEADER, &header_key), &IdEntry(work.id))?;

		let mut pending_key = millis_bytes(&work.expire_time).to_vec();
		pending_key.extend_from_slice(&id_bytes);
		batch.put_ser(&to_key(IDX_WORK_PENDING, &pending_key), &IdEntry(work.id))?;

		let mut node_key = hex_key(&work.pub_key);
		node_key.extend_from_slice(&u64_bytes(work.block_num));
		node_key.extend_from_slice(&id_bytes);
		batch.put_ser(&to_key(IDX_WORK_NODE, &node_key), &IdEntry(work.id))?;

		let mut block_key = u64_bytes(work.block_num).to_vec();
		block_key.extend_from_slice(&id_bytes);
		batch.put_ser(&to_key(IDX_WORK_BLOCK, &block_key), &IdEntry(work.id))?;

		batch.commit()?;
		Ok(work)
	}

	/// Work item by id.
	pub fn get_work(&self, id: u64) -> Result<Option<PowWork>, store::Error> {
		self.db.get_ser(&to_key_u64(WORK_PREFIX, id))
	}

	/// Overwrite a work item in place.
	pub fn update_work(&self, work: &PowWork) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key_u64(WORK_PREFIX, work.id), work)?;
		batch.commit()
	}

	/// Read-modify-write a work item inside a single write transaction.
	/// The closure sees the freshest stored state, concurrent dispatchers
	/// serialize on the store's write lock.
	pub fn modify_work<F>(&self, id: u64, f: F) -> Result<Option<PowWork>, store::Error>
	where
		F: FnOnce(&mut PowWork),
	{
		let key = to_key_u64(WORK_PREFIX, id);
		let batch = self.db.batch()?;
		let mut work = match batch.get_ser::<PowWork>(&key)? {
			Some(w) => w,
			None => return Ok(None),
		};
		f(&mut work);
		batch.put_ser(&key, &work)?;
		batch.commit()?;
		Ok(Some(work))
	}

	/// Ids of works whose expiry is at or past the given instant.
	pub fn pending_work_ids(&self, now: &DateTime<Utc>) -> Result<Vec<u64>, store::Error> {
		let from = to_key(IDX_WORK_PENDING, &millis_bytes(now));
		// range scan to the end of the pending index, not just the exact key
		let all: Vec<(Vec<u8>, IdEntry)> = self
			.db
			.iter(&to_key(IDX_WORK_PENDING, &[]))?
			.filter(|(k, _)| k[..] >= from[..])
			.collect();
		Ok(all.into_iter().map(|(_, e)| e.0).collect())
	}

	/// All works sharing a header, oldest id first.
	pub fn works_by_header(&self, header: &str) -> Result<Vec<PowWork>, store::Error> {
		let prefix = to_key(IDX_WORK_HEADER, &hex_key(header));
		let mut works = Vec::new();
		let ids: Vec<u64> = self
			.db
			.iter::<IdEntry>(&prefix)?
			.map(|(_, e)| e.0)
			.collect();
		for id in ids {
			if let Some(work) = self.get_work(id)? {
				works.push(work);
			}
		}
		Ok(works)
	}

	/// All works of one epoch.
	pub fn works_by_block(&self, block_num: u64) -> Result<Vec<PowWork>, store::Error> {
		let prefix = to_key(IDX_WORK_BLOCK, &u64_bytes(block_num));
		let mut works = Vec::new();
		let ids: Vec<u64> = self
			.db
			.iter::<IdEntry>(&prefix)?
			.map(|(_, e)| e.0)
			.collect();
		for id in ids {
			if let Some(work) = self.get_work(id)? {
				works.push(work);
			}
		}
		Ok(works)
	}

	/// How many works a node pushed for one epoch, the rate-cap input.
	pub fn count_node_works(&self, pub_key: &str, block_num: u64) -> Result<usize, store::Error> {
		let mut key = hex_key(pub_key);
		key.extend_from_slice(&u64_bytes(block_num));
		let prefix = to_key(IDX_WORK_NODE, &key);
		Ok(self.db.iter::<IdEntry>(&prefix)?.count())
	}

	/// Persist a result and mark its work finished, atomically. The
	/// pending-index entry of the work is dropped so the work stops being
	/// offered.
	pub fn save_result(
		&self,
		work: &PowWork,
		result: PowResult,
	) -> Result<(PowWork, PowResult), store::Error> {
		let mut result = result;
		let batch = self.db.batch()?;
		result.id = self.next_id(&batch, COUNTER_RESULT)?;

		batch.put_ser(&to_key_u64(RESULT_PREFIX, result.id), &result)?;

		let mut hb_key = hex_key(&result.header);
		hb_key.extend_from_slice(&hex_key(&result.boundary));
		hb_key.extend_from_slice(&u64_bytes(result.id));
		batch.put_ser(&to_key(IDX_RESULT_HB, &hb_key), &IdEntry(result.id))?;

		// re-read the work inside the transaction so a concurrent
		// dispatch bump is not clobbered by a stale copy
		let work_key = to_key_u64(WORK_PREFIX, work.id);
		let mut finished = batch
			.get_ser::<PowWork>(&work_key)?
			.unwrap_or_else(|| work.clone());
		finished.finished = true;
		finished.miner_wallet = result.miner_wallet.clone();
		batch.put_ser(&work_key, &finished)?;

		let mut pending_key = millis_bytes(&finished.expire_time).to_vec();
		pending_key.extend_from_slice(&u64_bytes(finished.id));
		batch.delete(&to_key(IDX_WORK_PENDING, &pending_key))?;

		batch.commit()?;
		Ok((finished, result))
	}

	/// Result by id.
	pub fn get_result(&self, id: u64) -> Result<Option<PowResult>, store::Error> {
		self.db.get_ser(&to_key_u64(RESULT_PREFIX, id))
	}

	/// Overwrite a result in place.
	pub fn update_result(&self, result: &PowResult) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key_u64(RESULT_PREFIX, result.id), result)?;
		batch.commit()
	}

	/// All results for a `(header, boundary)` pair.
	pub fn results_by_header_boundary(
		&self,
		header: &str,
		boundary: &str,
	) -> Result<Vec<PowResult>, store::Error> {
		let mut key = hex_key(header);
		key.extend_from_slice(&hex_key(boundary));
		let prefix = to_key(IDX_RESULT_HB, &key);
		let mut results = Vec::new();
		let ids: Vec<u64> = self
			.db
			.iter::<IdEntry>(&prefix)?
			.map(|(_, e)| e.0)
			.collect();
		for id in ids {
			if let Some(result) = self.get_result(id)? {
				results.push(result);
			}
		}
		Ok(results)
	}

	/// A page of results, newest id first.
	pub fn paginate_results(
		&self,
		page: usize,
		per_page: usize,
	) -> Result<Vec<PowResult>, store::Error> {
		let mut all: Vec<PowResult> = self
			.db
			.iter(&to_key(RESULT_PREFIX, &[]))?
			.map(|(_, r)| r)
			.collect();
		all.sort_by(|a: &PowResult, b: &PowResult| b.id.cmp(&a.id));
		Ok(all
			.into_iter()
			.skip(page * per_page)
			.take(per_page)
			.collect())
	}

	// ---- miners / workers / nodes

	/// Miner record for a wallet.
	pub fn get_miner(&self, wallet: &str) -> Result<Option<Miner>, store::Error> {
		self.db.get_ser(&to_key(MINER_PREFIX, wallet.as_bytes()))
	}

	/// Fetch-or-insert a miner record.
	pub fn get_or_create_miner(&self, wallet: &str) -> Result<Miner, store::Error> {
		if let Some(miner) = self.get_miner(wallet)? {
			return Ok(miner);
		}
		let miner = Miner::new(wallet);
		let batch = self.db.batch()?;
		batch.put_ser(&to_key(MINER_PREFIX, wallet.as_bytes()), &miner)?;
		batch.commit()?;
		Ok(miner)
	}

	fn worker_key(wallet: &str, worker_name: &str) -> Vec<u8> {
		let mut key = wallet.as_bytes().to_vec();
		key.push(SEP);
		key.extend_from_slice(worker_name.as_bytes());
		to_key(WORKER_PREFIX, &key)
	}

	/// Worker record for a `(wallet, name)` pair.
	pub fn get_worker(
		&self,
		wallet: &str,
		worker_name: &str,
	) -> Result<Option<Worker>, store::Error> {
		self.db.get_ser(&Self::worker_key(wallet, worker_name))
	}

	/// Fetch-or-insert a worker record.
	pub fn get_or_create_worker(
		&self,
		wallet: &str,
		worker_name: &str,
	) -> Result<Worker, store::Error> {
		if let Some(worker) = self.get_worker(wallet, worker_name)? {
			return Ok(worker);
		}
		let worker = Worker::new(wallet, worker_name);
		let batch = self.db.batch()?;
		batch.put_ser(&Self::worker_key(wallet, worker_name), &worker)?;
		batch.commit()?;
		Ok(worker)
	}

	/// Bump a worker's counters, read-modify-write in one transaction.
	pub fn update_worker_stat(
		&self,
		wallet: &str,
		worker_name: &str,
		inc_submitted: u64,
		inc_failed: u64,
		inc_finished: u64,
		inc_verified: u64,
	) -> Result<Worker, store::Error> {
		let key = Self::worker_key(wallet, worker_name);
		let batch = self.db.batch()?;
		let mut worker = match batch.get_ser::<Worker>(&key)? {
			Some(w) => w,
			None => Worker::new(wallet, worker_name),
		};
		worker.work_submitted += inc_submitted;
		worker.work_failed += inc_failed;
		worker.work_finished += inc_finished;
		worker.work_verified += inc_verified;
		batch.put_ser(&key, &worker)?;
		batch.commit()?;
		Ok(worker)
	}

	/// Node record by public key.
	pub fn get_node(&self, pub_key: &str) -> Result<Option<NodeKey>, store::Error> {
		self.db.get_ser(&to_key(NODE_PREFIX, pub_key.as_bytes()))
	}

	/// Insert or replace a node record.
	pub fn save_node(&self, node: &NodeKey) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key(NODE_PREFIX, node.pub_key.as_bytes()), node)?;
		batch.commit()
	}

	// ---- pow windows

	/// Window record of one epoch.
	pub fn get_window(&self, block_num: u64) -> Result<Option<PowWindow>, store::Error> {
		self.db.get_ser(&to_key_u64(WINDOW_PREFIX, block_num))
	}

	/// Insert or replace a window record, maintaining the head pointer.
	pub fn save_window(&self, window: &PowWindow) -> Result<(), store::Error> {
		let head_key = to_key(WINDOW_HEAD_PREFIX, &[]);
		let batch = self.db.batch()?;
		batch.put_ser(&to_key_u64(WINDOW_PREFIX, window.block_num), window)?;
		let head = batch.get_ser::<IdEntry>(&head_key)?.map(|e| e.0);
		if head.map(|h| window.block_num >= h).unwrap_or(true) {
			batch.put_ser(&head_key, &IdEntry(window.block_num))?;
		}
		batch.commit()
	}

	/// The most recent window record, if any.
	pub fn latest_window(&self) -> Result<Option<PowWindow>, store::Error> {
		let head = self
			.db
			.get_ser::<IdEntry>(&to_key(WINDOW_HEAD_PREFIX, &[]))?;
		match head {
			Some(IdEntry(block)) => self.get_window(block),
			None => Ok(None),
		}
	}

	/// The latest `n` window records, oldest first.
	pub fn last_windows(&self, n: usize) -> Result<Vec<PowWindow>, store::Error> {
		let mut all: Vec<PowWindow> = self
			.db
			.iter(&to_key(WINDOW_PREFIX, &[]))?
			.map(|(_, w)| w)
			.collect();
		all.sort_by_key(|w: &PowWindow| w.block_num);
		let skip = all.len().saturating_sub(n);
		Ok(all.into_iter().skip(skip).collect())
	}

	// ---- hashrate

	/// Persist a hashrate sample.
	pub fn log_hashrate(&self, sample: HashRate) -> Result<HashRate, store::Error> {
		let mut sample = sample;
		let batch = self.db.batch()?;
		sample.id = self.next_id(&batch, COUNTER_HASHRATE)?;
		batch.put_ser(&to_key_u64(HASHRATE_PREFIX, sample.id), &sample)?;
		batch.commit()?;
		Ok(sample)
	}

	// ---- site settings

	/// Stored dispatch policy, if an operator saved one.
	pub fn get_settings(&self) -> Result<Option<SiteSettings>, store::Error> {
		self.db.get_ser(&to_key(SETTINGS_PREFIX, &[]))
	}

	/// Persist the dispatch policy.
	pub fn save_settings(&self, settings: &SiteSettings) -> Result<(), store::Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key(SETTINGS_PREFIX, &[]), settings)?;
		batch.commit()
	}

	// ---- aggregations

	/// Rewards summary over results, optionally narrowed to an epoch
	/// range, a wallet and a worker.
	pub fn epoch_rewards(
		&self,
		block_range: Option<(u64, u64)>,
		miner_wallet: Option<&str>,
		worker_name: Option<&str>,
	) -> Result<RewardsSummary, store::Error> {
		let mut summary = RewardsSummary {
			rewards: 0.0,
			count: 0,
			verified: 0,
			first_work_at: None,
			last_work_at: None,
		};
		for (_, result) in self.db.iter::<PowResult>(&to_key(RESULT_PREFIX, &[]))? {
			if let Some((start, end)) = block_range {
				if result.block_num < start || result.block_num > end {
					continue;
				}
			}
			if let Some(wallet) = miner_wallet {
				if result.miner_wallet != wallet {
					continue;
				}
			}
			if let Some(worker) = worker_name {
				if result.worker_name != worker {
					continue;
				}
			}
			summary.rewards += result.pow_fee;
			summary.count += 1;
			if result.verified {
				summary.verified += 1;
			}
			let at = result.finished_time;
			summary.first_work_at = Some(match summary.first_work_at {
				Some(cur) => cur.min(at),
				None => at,
			});
			summary.last_work_at = Some(match summary.last_work_at {
				Some(cur) => cur.max(at),
				None => at,
			});
		}
		Ok(summary)
	}

	/// Per-miner rewards of one epoch.
	pub fn rewards_by_miners(&self, block_num: u64) -> Result<Vec<MinerRewards>, store::Error> {
		let mut by_wallet: Vec<MinerRewards> = Vec::new();
		for (_, result) in self.db.iter::<PowResult>(&to_key(RESULT_PREFIX, &[]))? {
			if result.block_num != block_num {
				continue;
			}
			let idx = match by_wallet
				.iter()
				.position(|m| m.miner_wallet == result.miner_wallet)
			{
				Some(idx) => idx,
				None => {
					by_wallet.push(MinerRewards {
						miner_wallet: result.miner_wallet.clone(),
						block_num,
						rewards: 0.0,
						finished: 0,
						verified: 0,
					});
					by_wallet.len() - 1
				}
			};
			let entry = &mut by_wallet[idx];
			entry.rewards += result.pow_fee;
			entry.finished += 1;
			if result.verified {
				entry.verified += 1;
			}
		}
		Ok(by_wallet)
	}
}
