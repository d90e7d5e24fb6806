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

//! Core primitives of the proxy: the binary serialization layer used by the
//! store, the Zilliqa-variant Schnorr signature scheme, Ethash light
//! verification and the difficulty/boundary mapping.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod crypto;
pub mod pow;
pub mod ser;

/// Fixed byte lengths of the wire fields the rest of the system assumes.
pub mod sizes {
	/// Compressed SEC1 public key
	pub const PUB_KEY_BYTES: usize = 33;
	/// PoW header hash
	pub const HEADER_BYTES: usize = 32;
	/// PoW boundary
	pub const BOUNDARY_BYTES: usize = 32;
	/// Ethash nonce
	pub const NONCE_BYTES: usize = 8;
	/// DS epoch index
	pub const BLOCK_NUM_BYTES: usize = 8;
	/// Work timeout
	pub const TIMEOUT_BYTES: usize = 4;
	/// Schnorr signature (r ++ s)
	pub const SIGNATURE_BYTES: usize = 64;
	/// Miner wallet address
	pub const ADDRESS_BYTES: usize = 20;
}
