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

//! Entities persisted by the pool and their binary encodings. Hex-typed
//! fields keep the canonical wire form: lowercase, "0x"-prefixed.

use chrono::{DateTime, TimeZone, Utc};

use zilproxy_core::ser::{self, Readable, Reader, Writeable, Writer};

/// Worker name used for anonymous submissions.
pub const DEFAULT_WORKER_NAME: &str = "default_worker";

/// Strip and canonicalize a worker name: empty becomes the default, only
/// `[A-Za-z0-9_.-]` is accepted.
pub fn valid_worker_name(worker_name: &str) -> Option<String> {
	let name = worker_name.trim();
	if name.is_empty() {
		return Some(DEFAULT_WORKER_NAME.to_string());
	}
	if name
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
	{
		Some(name.to_string())
	} else {
		None
	}
}

/// Why a submitted solution was turned away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitError {
	/// No matching active work for the submission
	WorkNotFound,
	/// Ethash recompute mismatched the claim or missed the boundary
	Verifier,
	/// The current result was already confirmed by the node
	AlreadyVerified,
	/// A strictly better solution is already recorded
	WorseSolution,
	/// The store refused the update
	StoreError,
}

/// Implemented by the stratum side so the node RPC surface can push fresh
/// work at connected miners without depending on the server crate.
pub trait WorkPublisher: Send + Sync {
	/// Fresh real work landed in the pool, offer it to connected push
	/// miners (dispatch accounting included).
	fn notify_new_work(&self);
}

/// Mining section of the config: the dispatch policy defaults and the
/// wallet anonymous submissions are credited to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MiningConfig {
	/// Minimum fee a work item needs to be dispatched
	#[serde(default)]
	pub min_fee: f64,
	/// Fan-out cap per work item and dispatch round
	#[serde(default = "default_max_dispatch")]
	pub max_dispatch: u32,
	/// Cooldown seconds applied when a round overflows
	#[serde(default)]
	pub inc_expire: u64,
	/// Wallet credited when a submission carries no miner address
	#[serde(default = "default_miner")]
	pub default_miner: String,
}

fn default_max_dispatch() -> u32 {
	10
}

fn default_miner() -> String {
	"0x0123456789012345678901234567890123456789".to_string()
}

impl Default for MiningConfig {
	fn default() -> MiningConfig {
		MiningConfig {
			min_fee: 0.0,
			max_dispatch: default_max_dispatch(),
			inc_expire: 0,
			default_miner: default_miner(),
		}
	}
}

impl MiningConfig {
	/// The dispatch policy this config seeds the store with.
	pub fn site_settings(&self) -> SiteSettings {
		SiteSettings {
			min_fee: self.min_fee,
			max_dispatch: self.max_dispatch,
			inc_expire: self.inc_expire,
		}
	}
}

fn write_time<W: Writer>(writer: &mut W, time: &DateTime<Utc>) -> Result<(), ser::Error> {
	writer.write_i64(time.timestamp_millis())
}

fn read_time<R: Reader>(reader: &mut R) -> Result<DateTime<Utc>, ser::Error> {
	Ok(Utc.timestamp_millis(reader.read_i64()?))
}

fn write_opt_time<W: Writer>(
	writer: &mut W,
	time: &Option<DateTime<Utc>>,
) -> Result<(), ser::Error> {
	match time {
		Some(t) => {
			writer.write_u8(1)?;
			write_time(writer, t)
		}
		None => writer.write_u8(0),
	}
}

fn read_opt_time<R: Reader>(reader: &mut R) -> Result<Option<DateTime<Utc>>, ser::Error> {
	match reader.read_u8()? {
		0 => Ok(None),
		_ => Ok(Some(read_time(reader)?)),
	}
}

fn write_bool<W: Writer>(writer: &mut W, b: bool) -> Result<(), ser::Error> {
	writer.write_u8(if b { 1 } else { 0 })
}

fn read_bool<R: Reader>(reader: &mut R) -> Result<bool, ser::Error> {
	Ok(reader.read_u8()? != 0)
}

/// A unit of PoW offered by a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PowWork {
	/// Store-assigned handle, also the stratum job id
	pub id: u64,
	/// 32-byte header hash, "0x" hex
	pub header: String,
	/// Epoch seed derived from block_num
	pub seed: String,
	/// 32-byte target, hash must be <= boundary
	pub boundary: String,
	/// Compressed public key of the originating node
	pub pub_key: String,
	/// Node signature over the request fields
	pub signature: String,
	/// DS epoch index
	pub block_num: u64,
	/// Creation time of this dispatch round
	pub start_time: DateTime<Utc>,
	/// Hard deadline for submissions
	pub expire_time: DateTime<Utc>,
	/// A result has been saved for this work
	pub finished: bool,
	/// Winner's wallet, empty until finished
	pub miner_wallet: String,
	/// Policy weight of this work
	pub pow_fee: f64,
	/// Dispatch counter of the current round
	pub dispatched: u32,
}

impl PowWork {
	/// Whether the work can still accept submissions at the given instant.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expire_time < now
	}

	/// Stratum job id string for this work.
	pub fn job_id(&self) -> String {
		self.id.to_string()
	}
}

impl Writeable for PowWork {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.id)?;
		writer.write_str(&self.header)?;
		writer.write_str(&self.seed)?;
		writer.write_str(&self.boundary)?;
		writer.write_str(&self.pub_key)?;
		writer.write_str(&self.signature)?;
		writer.write_u64(self.block_num)?;
		write_time(writer, &self.start_time)?;
		write_time(writer, &self.expire_time)?;
		write_bool(writer, self.finished)?;
		writer.write_str(&self.miner_wallet)?;
		writer.write_f64(self.pow_fee)?;
		writer.write_u32(self.dispatched)
	}
}

impl Readable for PowWork {
	fn read<R: Reader>(reader: &mut R) -> Result<PowWork, ser::Error> {
		Ok(PowWork {
			id: reader.read_u64()?,
			header: reader.read_str()?,
			seed: reader.read_str()?,
			boundary: reader.read_str()?,
			pub_key: reader.read_str()?,
			signature: reader.read_str()?,
			block_num: reader.read_u64()?,
			start_time: read_time(reader)?,
			expire_time: read_time(reader)?,
			finished: read_bool(reader)?,
			miner_wallet: reader.read_str()?,
			pow_fee: reader.read_f64()?,
			dispatched: reader.read_u32()?,
		})
	}
}

/// A verified solution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PowResult {
	/// Store-assigned handle
	pub id: u64,
	/// Header of the solved work
	pub header: String,
	/// Seed of the solved work
	pub seed: String,
	/// Boundary of the solved work
	pub boundary: String,
	/// Public key of the originating node
	pub pub_key: String,
	/// Claimed (or recomputed) mix digest
	pub mix_digest: String,
	/// Winning nonce
	pub nonce: String,
	/// Actual Ethash output, <= boundary
	pub hash_result: String,
	/// DS epoch index
	pub block_num: u64,
	/// Fee copied from the work
	pub pow_fee: f64,
	/// When the solution was accepted
	pub finished_time: DateTime<Utc>,
	/// When the node confirmed it
	pub verified_time: Option<DateTime<Utc>>,
	/// Node confirmation flag
	pub verified: bool,
	/// Submitting wallet
	pub miner_wallet: String,
	/// Submitting worker
	pub worker_name: String,
}

impl Writeable for PowResult {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.id)?;
		writer.write_str(&self.header)?;
		writer.write_str(&self.seed)?;
		writer.write_str(&self.boundary)?;
		writer.write_str(&self.pub_key)?;
		writer.write_str(&self.mix_digest)?;
		writer.write_str(&self.nonce)?;
		writer.write_str(&self.hash_result)?;
		writer.write_u64(self.block_num)?;
		writer.write_f64(self.pow_fee)?;
		write_time(writer, &self.finished_time)?;
		write_opt_time(writer, &self.verified_time)?;
		write_bool(writer, self.verified)?;
		writer.write_str(&self.miner_wallet)?;
		writer.write_str(&self.worker_name)
	}
}

impl Readable for PowResult {
	fn read<R: Reader>(reader: &mut R) -> Result<PowResult, ser::Error> {
		Ok(PowResult {
			id: reader.read_u64()?,
			header: reader.read_str()?,
			seed: reader.read_str()?,
			boundary: reader.read_str()?,
			pub_key: reader.read_str()?,
			mix_digest: reader.read_str()?,
			nonce: reader.read_str()?,
			hash_result: reader.read_str()?,
			block_num: reader.read_u64()?,
			pow_fee: reader.read_f64()?,
			finished_time: read_time(reader)?,
			verified_time: read_opt_time(reader)?,
			verified: read_bool(reader)?,
			miner_wallet: reader.read_str()?,
			worker_name: reader.read_str()?,
		})
	}
}

/// A wallet that submits solutions.
#[derive(Debug, Clone, PartialEq)]
pub struct Miner {
	/// 20-byte wallet address, hex
	pub wallet_address: String,
	/// Accumulated rewards
	pub rewards: f64,
	/// Rewards paid out so far
	pub paid: f64,
	/// Whether submissions are accepted
	pub authorized: bool,
	/// Contact email, may be empty
	pub email: String,
	/// Email confirmed
	pub email_verified: bool,
	/// First seen
	pub join_date: DateTime<Utc>,
}

impl Miner {
	/// Fresh miner record for a wallet.
	pub fn new(wallet_address: &str) -> Miner {
		Miner {
			wallet_address: wallet_address.to_string(),
			rewards: 0.0,
			paid: 0.0,
			authorized: true,
			email: String::new(),
			email_verified: false,
			join_date: Utc::now(),
		}
	}
}

impl Writeable for Miner {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_str(&self.wallet_address)?;
		writer.write_f64(self.rewards)?;
		writer.write_f64(self.paid)?;
		write_bool(writer, self.authorized)?;
		writer.write_str(&self.email)?;
		write_bool(writer, self.email_verified)?;
		write_time(writer, &self.join_date)
	}
}

impl Readable for Miner {
	fn read<R: Reader>(reader: &mut R) -> Result<Miner, ser::Error> {
		Ok(Miner {
			wallet_address: reader.read_str()?,
			rewards: reader.read_f64()?,
			paid: reader.read_f64()?,
			authorized: read_bool(reader)?,
			email: reader.read_str()?,
			email_verified: read_bool(reader)?,
			join_date: read_time(reader)?,
		})
	}
}

/// A named GPU of a miner, with its submission counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Worker {
	/// Owning wallet
	pub wallet_address: String,
	/// Worker name, unique per wallet
	pub worker_name: String,
	/// Submissions attempted
	pub work_submitted: u64,
	/// Submissions rejected
	pub work_failed: u64,
	/// Solutions accepted
	pub work_finished: u64,
	/// Solutions confirmed by a node
	pub work_verified: u64,
}

impl Worker {
	/// Fresh worker record.
	pub fn new(wallet_address: &str, worker_name: &str) -> Worker {
		Worker {
			wallet_address: wallet_address.to_string(),
			worker_name: worker_name.to_string(),
			work_submitted: 0,
			work_failed: 0,
			work_finished: 0,
			work_verified: 0,
		}
	}
}

impl Writeable for Worker {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_str(&self.wallet_address)?;
		writer.write_str(&self.worker_name)?;
		writer.write_u64(self.work_submitted)?;
		writer.write_u64(self.work_failed)?;
		writer.write_u64(self.work_finished)?;
		writer.write_u64(self.work_verified)
	}
}

impl Readable for Worker {
	fn read<R: Reader>(reader: &mut R) -> Result<Worker, ser::Error> {
		Ok(Worker {
			wallet_address: reader.read_str()?,
			worker_name: reader.read_str()?,
			work_submitted: reader.read_u64()?,
			work_failed: reader.read_u64()?,
			work_finished: reader.read_u64()?,
			work_verified: reader.read_u64()?,
		})
	}
}

/// An authorized PoW source.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeKey {
	/// Compressed public key, hex, unique
	pub pub_key: String,
	/// Fee attached to work from this node
	pub pow_fee: f64,
	/// Whether requestWork is accepted from this key
	pub authorized: bool,
	/// Owner contact, may be empty
	pub email: String,
}

impl Writeable for NodeKey {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_str(&self.pub_key)?;
		writer.write_f64(self.pow_fee)?;
		write_bool(writer, self.authorized)?;
		writer.write_str(&self.email)
	}
}

impl Readable for NodeKey {
	fn read<R: Reader>(reader: &mut R) -> Result<NodeKey, ser::Error> {
		Ok(NodeKey {
			pub_key: reader.read_str()?,
			pow_fee: reader.read_f64()?,
			authorized: read_bool(reader)?,
			email: reader.read_str()?,
		})
	}
}

/// One record per observed DS epoch, tracking when its PoW window ran and
/// when the next one is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct PowWindow {
	/// DS epoch index
	pub block_num: u64,
	/// Record creation time
	pub create_time: DateTime<Utc>,
	/// First work of the epoch
	pub pow_start: DateTime<Utc>,
	/// Last work expiry of the epoch
	pub pow_end: DateTime<Utc>,
	/// PoW window length in seconds
	pub pow_window: f64,
	/// Epoch length in seconds, PoW included
	pub epoch_window: f64,
	/// When the next PoW window is expected to open
	pub estimated_next_pow: Option<DateTime<Utc>>,
}

impl Writeable for PowWindow {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.block_num)?;
		write_time(writer, &self.create_time)?;
		write_time(writer, &self.pow_start)?;
		write_time(writer, &self.pow_end)?;
		writer.write_f64(self.pow_window)?;
		writer.write_f64(self.epoch_window)?;
		write_opt_time(writer, &self.estimated_next_pow)
	}
}

impl Readable for PowWindow {
	fn read<R: Reader>(reader: &mut R) -> Result<PowWindow, ser::Error> {
		Ok(PowWindow {
			block_num: reader.read_u64()?,
			create_time: read_time(reader)?,
			pow_start: read_time(reader)?,
			pow_end: read_time(reader)?,
			pow_window: reader.read_f64()?,
			epoch_window: reader.read_f64()?,
			estimated_next_pow: read_opt_time(reader)?,
		})
	}
}

/// A reported hashrate sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRate {
	/// Store-assigned handle
	pub id: u64,
	/// Reporting wallet
	pub wallet_address: String,
	/// Reporting worker
	pub worker_name: String,
	/// Hashes per second
	pub hashrate: u64,
	/// Sample time
	pub updated_time: DateTime<Utc>,
}

impl Writeable for HashRate {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.id)?;
		writer.write_str(&self.wallet_address)?;
		writer.write_str(&self.worker_name)?;
		writer.write_u64(self.hashrate)?;
		write_time(writer, &self.updated_time)
	}
}

impl Readable for HashRate {
	fn read<R: Reader>(reader: &mut R) -> Result<HashRate, ser::Error> {
		Ok(HashRate {
			id: reader.read_u64()?,
			wallet_address: reader.read_str()?,
			worker_name: reader.read_str()?,
			hashrate: reader.read_u64()?,
			updated_time: read_time(reader)?,
		})
	}
}

/// Site-adjustable dispatch policy, persisted so an operator can tune it
/// without a restart. Seeded from the mining section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
	/// Minimum fee a work item needs to be dispatched
	pub min_fee: f64,
	/// Fan-out cap per work item and dispatch round
	pub max_dispatch: u32,
	/// Cooldown seconds applied when a round overflows
	pub inc_expire: u64,
}

impl Default for SiteSettings {
	fn default() -> SiteSettings {
		SiteSettings {
			min_fee: 0.0,
			max_dispatch: 10,
			inc_expire: 0,
		}
	}
}

impl Writeable for SiteSettings {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_f64(self.min_fee)?;
		writer.write_u32(self.max_dispatch)?;
		writer.write_u64(self.inc_expire)
	}
}

impl Readable for SiteSettings {
	fn read<R: Reader>(reader: &mut R) -> Result<SiteSettings, ser::Error> {
		Ok(SiteSettings {
			min_fee: reader.read_f64()?,
			max_dispatch: reader.read_u32()?,
			inc_expire: reader.read_u64()?,
		})
	}
}
