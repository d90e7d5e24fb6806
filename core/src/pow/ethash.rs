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

//! Ethash light implementation: seed hash chain, per-epoch light cache
//! generation, on-the-fly dataset items and `hashimoto_light`. Cache and
//! dataset sizes are derived with a primality probe instead of lookup
//! tables, epochs the proxy will ever see are far below the probe cost
//! mattering.

use byteorder::{ByteOrder, LittleEndian};
use lru_cache::LruCache;
use std::sync::Arc;
use tiny_keccak::{Hasher, Keccak};

use super::Error;
use zilproxy_util::Mutex;

/// Blocks per Ethash epoch.
pub const EPOCH_LENGTH: u64 = 30000;
/// Max number of light caches kept in memory.
pub const CACHE_MAX_ITEMS: usize = 10;
/// Highest epoch `seed_to_block_num` will search.
pub const MAX_EPOCH: u64 = 2048;

const HASH_BYTES: usize = 64;
const MIX_BYTES: usize = 128;
const HASH_WORDS: usize = HASH_BYTES / 4;
const MIX_WORDS: usize = MIX_BYTES / 4;
const MIX_HASHES: usize = MIX_BYTES / HASH_BYTES;
const DATASET_BYTES_INIT: u64 = 1 << 30;
const DATASET_BYTES_GROWTH: u64 = 1 << 23;
const CACHE_BYTES_INIT: u64 = 1 << 24;
const CACHE_BYTES_GROWTH: u64 = 1 << 17;
const CACHE_ROUNDS: usize = 3;
const ACCESSES: usize = 64;
const DATASET_PARENTS: u32 = 256;
const FNV_PRIME: u32 = 0x0100_0193;

#[inline]
fn fnv(v1: u32, v2: u32) -> u32 {
	v1.wrapping_mul(FNV_PRIME) ^ v2
}

fn keccak256(chunks: &[&[u8]]) -> [u8; 32] {
	let mut hasher = Keccak::v256();
	for chunk in chunks {
		hasher.update(chunk);
	}
	let mut out = [0u8; 32];
	hasher.finalize(&mut out);
	out
}

fn keccak512(chunks: &[&[u8]]) -> [u8; HASH_BYTES] {
	let mut hasher = Keccak::v512();
	for chunk in chunks {
		hasher.update(chunk);
	}
	let mut out = [0u8; HASH_BYTES];
	hasher.finalize(&mut out);
	out
}

/// Seed hash for the epoch the given block belongs to.
pub fn get_seedhash(block_number: u64) -> [u8; 32] {
	let epochs = block_number / EPOCH_LENGTH;
	let mut seed = [0u8; 32];
	for _ in 0..epochs {
		seed = keccak256(&[&seed[..]]);
	}
	seed
}

/// Recover the first block number of the epoch a seed hash belongs to.
/// Searches the seed chain up to `MAX_EPOCH` epochs.
pub fn seed_to_block_num(seed: &[u8]) -> Result<u64, Error> {
	let mut cur = [0u8; 32];
	for epoch in 0..MAX_EPOCH {
		if cur[..] == seed[..] {
			return Ok(epoch * EPOCH_LENGTH);
		}
		cur = keccak256(&[&cur[..]]);
	}
	Err(Error::SeedOutOfRange(MAX_EPOCH))
}

fn get_cache_size(block_number: u64) -> usize {
	let mut sz = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * (block_number / EPOCH_LENGTH)
		- HASH_BYTES as u64;
	while !primal::is_prime(sz / HASH_BYTES as u64) {
		sz -= 2 * HASH_BYTES as u64;
	}
	sz as usize
}

fn get_full_size(block_number: u64) -> usize {
	let mut sz = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * (block_number / EPOCH_LENGTH)
		- MIX_BYTES as u64;
	while !primal::is_prime(sz / MIX_BYTES as u64) {
		sz -= 2 * MIX_BYTES as u64;
	}
	sz as usize
}

/// Sequentially produce the initial cache, then run the RandMemoHash
/// rounds over it.
fn make_cache(cache_size: usize, seed: &[u8; 32]) -> Vec<u8> {
	let n = cache_size / HASH_BYTES;
	let mut cache = vec![0u8; cache_size];

	let first = keccak512(&[&seed[..]]);
	cache[..HASH_BYTES].copy_from_slice(&first);
	for i in 1..n {
		let prev = keccak512(&[&cache[(i - 1) * HASH_BYTES..i * HASH_BYTES]]);
		cache[i * HASH_BYTES..(i + 1) * HASH_BYTES].copy_from_slice(&prev);
	}

	for _ in 0..CACHE_ROUNDS {
		for i in 0..n {
			let v = LittleEndian::read_u32(&cache[i * HASH_BYTES..]) as usize % n;
			let prev = (i + n - 1) % n;
			let mut tmp = [0u8; HASH_BYTES];
			for b in 0..HASH_BYTES {
				tmp[b] = cache[prev * HASH_BYTES + b] ^ cache[v * HASH_BYTES + b];
			}
			let hashed = keccak512(&[&tmp[..]]);
			cache[i * HASH_BYTES..(i + 1) * HASH_BYTES].copy_from_slice(&hashed);
		}
	}
	cache
}

/// Compute a single 64-byte dataset item from the light cache.
fn calc_dataset_item(cache: &[u8], i: u32) -> [u8; HASH_BYTES] {
	let n = cache.len() / HASH_BYTES;
	let src = (i as usize % n) * HASH_BYTES;

	let mut mix = [0u8; HASH_BYTES];
	mix.copy_from_slice(&cache[src..src + HASH_BYTES]);
	let w0 = LittleEndian::read_u32(&mix) ^ i;
	LittleEndian::write_u32(&mut mix[..4], w0);
	let mut mix = keccak512(&[&mix[..]]);

	let mut mix_words = [0u32; HASH_WORDS];
	LittleEndian::read_u32_into(&mix, &mut mix_words);

	for j in 0..DATASET_PARENTS {
		let parent_index =
			fnv(i ^ j, mix_words[j as usize % HASH_WORDS]) as usize % n * HASH_BYTES;
		for w in 0..HASH_WORDS {
			let parent_word = LittleEndian::read_u32(&cache[parent_index + w * 4..]);
			mix_words[w] = fnv(mix_words[w], parent_word);
		}
	}

	LittleEndian::write_u32_into(&mix_words, &mut mix);
	keccak512(&[&mix[..]])
}

/// The hashimoto loop over on-the-fly dataset items. Returns
/// `(mix_digest, result)`.
fn hashimoto_light(
	full_size: usize,
	cache: &[u8],
	header: &[u8; 32],
	nonce: u64,
) -> ([u8; 32], [u8; 32]) {
	let n = full_size / HASH_BYTES;
	let mut nonce_le = [0u8; 8];
	LittleEndian::write_u64(&mut nonce_le, nonce);
	let s = keccak512(&[&header[..], &nonce_le[..]]);
	let s_word0 = LittleEndian::read_u32(&s);

	let mut mix = [0u32; MIX_WORDS];
	for i in 0..MIX_WORDS {
		mix[i] = LittleEndian::read_u32(&s[(i % HASH_WORDS) * 4..]);
	}

	for i in 0..ACCESSES {
		let p = fnv(i as u32 ^ s_word0, mix[i % MIX_WORDS]) as usize % (n / MIX_HASHES)
			* MIX_HASHES;
		let mut new_data = [0u32; MIX_WORDS];
		for j in 0..MIX_HASHES {
			let item = calc_dataset_item(cache, (p + j) as u32);
			LittleEndian::read_u32_into(
				&item,
				&mut new_data[j * HASH_WORDS..(j + 1) * HASH_WORDS],
			);
		}
		for w in 0..MIX_WORDS {
			mix[w] = fnv(mix[w], new_data[w]);
		}
	}

	let mut cmix = [0u8; 32];
	for i in 0..(MIX_WORDS / 4) {
		let reduced = fnv(fnv(fnv(mix[4 * i], mix[4 * i + 1]), mix[4 * i + 2]), mix[4 * i + 3]);
		LittleEndian::write_u32(&mut cmix[4 * i..4 * i + 4], reduced);
	}

	let result = keccak256(&[&s[..], &cmix[..]]);
	(cmix, result)
}

/// A generated light cache together with the epoch bookkeeping needed to
/// run hashimoto against it.
struct LightCache {
	cache: Vec<u8>,
	full_size: usize,
}

/// Shared Ethash verifier holding a mutex-protected LRU of light caches,
/// at most `CACHE_MAX_ITEMS` epochs, eviction on insert.
pub struct EthashVerifier {
	caches: Mutex<LruCache<u64, Arc<LightCache>>>,
}

impl EthashVerifier {
	/// A fresh verifier with an empty cache set.
	pub fn new() -> EthashVerifier {
		EthashVerifier {
			caches: Mutex::new(LruCache::new(CACHE_MAX_ITEMS)),
		}
	}

	fn light_cache(&self, block_number: u64) -> Arc<LightCache> {
		let epoch = block_number / EPOCH_LENGTH;
		let mut caches = self.caches.lock();
		if let Some(cached) = caches.get_mut(&epoch) {
			return cached.clone();
		}

		// Generation takes a few seconds per epoch; holding the lock keeps
		// concurrent verifiers from duplicating the work.
		let seed = get_seedhash(block_number);
		debug!(
			"generating ethash light cache for epoch {} (block {})",
			epoch, block_number
		);
		let light = Arc::new(LightCache {
			cache: make_cache(get_cache_size(block_number), &seed),
			full_size: get_full_size(block_number),
		});
		caches.insert(epoch, light.clone());
		light
	}

	/// Raw hashimoto output `(mix_digest, result)` for the given block
	/// number, header and nonce. The NiceHash submit path uses this to
	/// recompute the mix digest the miner never sent.
	pub fn pow_hash(&self, block_number: u64, header: &[u8; 32], nonce: u64) -> ([u8; 32], [u8; 32]) {
		let light = self.light_cache(block_number);
		hashimoto_light(light.full_size, &light.cache, header, nonce)
	}

	/// Recompute the Ethash output for a submitted solution and check it
	/// against the claimed mix digest and the boundary. Returns the actual
	/// hash output on success, `None` on any mismatch.
	pub fn verify(
		&self,
		block_number: u64,
		header: &[u8; 32],
		mix_digest: &[u8],
		nonce: u64,
		boundary: &[u8],
	) -> Option<[u8; 32]> {
		let (calc_mix, calc_result) = self.pow_hash(block_number, header, nonce);

		if calc_mix[..] != mix_digest[..] {
			warn!("ethash mix digest mismatch");
			return None;
		}
		if !super::is_less_or_equal(&calc_result, boundary) {
			warn!("ethash result did not meet the boundary");
			return None;
		}
		Some(calc_result)
	}
}
