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

//! Schnorr signatures (Zilliqa variant) over secp256k1 and the key
//! wrapper used by the node-facing RPC surface.

pub mod key;
pub mod schnorr;

pub use self::key::ProxyKey;

use failure::Fail;

/// Errors from signature and key handling.
#[derive(Debug, Fail)]
pub enum Error {
	/// Public key bytes could not be parsed or are not on the curve
	#[fail(display = "invalid public key")]
	InvalidPublicKey,
	/// Secret key bytes out of range
	#[fail(display = "invalid secret key")]
	InvalidSecretKey,
	/// Signature is not 64 bytes or its scalars are out of range
	#[fail(display = "invalid signature")]
	InvalidSignature,
	/// Ran out of nonce retries while signing
	#[fail(display = "signing failed after retries")]
	SigningFailed,
	/// Missing secret key for a signing operation
	#[fail(display = "no secret key")]
	NoSecretKey,
}
