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

//! Ethash light verification and the difficulty/boundary mapping. The
//! proxy never builds the full dataset, it only keeps a bounded set of
//! per-epoch light caches and recomputes dataset items on the fly.

pub mod difficulty;
pub mod ethash;

pub use self::difficulty::{
	boundary_to_difficulty, boundary_to_difficulty_divided, boundary_to_hashpower,
	boundary_to_target, difficulty_to_boundary, difficulty_to_boundary_divided, is_less_or_equal,
};
pub use self::ethash::{get_seedhash, seed_to_block_num, EthashVerifier, EPOCH_LENGTH};

use failure::Fail;

/// Errors from the PoW primitives.
#[derive(Debug, Fail)]
pub enum Error {
	/// A seed hash that doesn't belong to any known epoch
	#[fail(display = "seed out of range, max {} epochs", _0)]
	SeedOutOfRange(u64),
	/// Difficulty outside the representable 0..=255 range
	#[fail(display = "difficulty out of range: {}", _0)]
	DifficultyOutOfRange(u32),
}
