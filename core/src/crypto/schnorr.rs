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

//! # Schnorr signatures, Zilliqa variant
//!
//! The scheme signs with `r = H(kG ‖ dG ‖ m) mod q`, `s = (k − r·d) mod q`
//! and verifies by recomputing `Q = sG + rW` and checking
//! `H(Q ‖ W ‖ m) mod q == r`. Point arithmetic comes from libsecp256k1
//! through its tweak API, the challenge hash is SHA-256 and the mod-q
//! reduction of the 256-bit digest is done with num-bigint.

use num_bigint::BigUint;
use rand::{thread_rng, Rng};
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use super::Error;

/// Byte size of each signature scalar.
pub const SCALAR_SIZE: usize = 32;
/// Byte size of an encoded signature, `r ‖ s`.
pub const SIGNATURE_SIZE: usize = 2 * SCALAR_SIZE;
/// Nonce sampling retries before giving up on a degenerate signature.
const SIGN_RETRIES: usize = 10;

/// secp256k1 group order, big-endian.
const CURVE_ORDER: [u8; 32] = [
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
	0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
	0x41, 0x41,
];

lazy_static! {
	/// Shared context, signing and verification capable.
	pub static ref SECP: Secp256k1<All> = Secp256k1::new();
	static ref ORDER: BigUint = BigUint::from_bytes_be(&CURVE_ORDER);
}

/// Reduce a 32-byte big-endian value mod the group order, back to 32
/// big-endian bytes.
fn reduce_mod_order(bytes: &[u8]) -> [u8; 32] {
	let reduced = BigUint::from_bytes_be(bytes) % &*ORDER;
	let raw = reduced.to_bytes_be();
	let mut out = [0u8; 32];
	out[32 - raw.len()..].copy_from_slice(&raw);
	out
}

/// `H(bQ ‖ bP ‖ message) mod q` as 32 big-endian bytes.
fn challenge(q_enc: &[u8], pub_enc: &[u8], message: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(q_enc);
	hasher.update(pub_enc);
	hasher.update(message);
	reduce_mod_order(&hasher.finalize())
}

/// Sign a message with the given secret key. Nonces are sampled uniformly
/// and resampled on the (cosmically unlikely) degenerate r = 0 or s = 0,
/// capped at 10 tries.
pub fn sign(message: &[u8], secret: &SecretKey) -> Result<[u8; SIGNATURE_SIZE], Error> {
	let public = PublicKey::from_secret_key(&SECP, secret);
	let pub_enc = public.serialize();

	for _ in 0..SIGN_RETRIES {
		let mut k_bytes = [0u8; 32];
		thread_rng().fill(&mut k_bytes[..]);
		let k = match SecretKey::from_slice(&k_bytes) {
			Ok(k) => k,
			// zero or >= q, resample
			Err(_) => continue,
		};

		if let Some(sig) = sign_with_k(message, secret, &pub_enc, &k) {
			return Ok(sig);
		}
	}
	Err(Error::SigningFailed)
}

fn sign_with_k(
	message: &[u8],
	secret: &SecretKey,
	pub_enc: &[u8],
	k: &SecretKey,
) -> Option<[u8; SIGNATURE_SIZE]> {
	let q_point = PublicKey::from_secret_key(&SECP, k);
	let r = challenge(&q_point.serialize(), pub_enc, message);
	if r == [0u8; 32] {
		return None;
	}
	let r_scalar = match Scalar::from_be_bytes(r) {
		Ok(s) => s,
		Err(_) => return None,
	};

	// s = k - r*d, via s = k + (-(r*d))
	let rd = match secret.clone().mul_tweak(&r_scalar) {
		Ok(rd) => rd,
		Err(_) => return None,
	};
	let neg_rd = Scalar::from_be_bytes(rd.negate().secret_bytes()).ok()?;
	let s = match k.clone().add_tweak(&neg_rd) {
		// s = 0 surfaces as a tweak error, resample
		Ok(s) => s,
		Err(_) => return None,
	};

	let mut sig = [0u8; SIGNATURE_SIZE];
	sig[..SCALAR_SIZE].copy_from_slice(&r);
	sig[SCALAR_SIZE..].copy_from_slice(&s.secret_bytes());
	Some(sig)
}

/// Verify a 64-byte `r ‖ s` signature over the message for the given
/// public key.
pub fn verify(message: &[u8], signature: &[u8], public: &PublicKey) -> bool {
	if signature.len() != SIGNATURE_SIZE {
		return false;
	}
	let mut r_bytes = [0u8; 32];
	r_bytes.copy_from_slice(&signature[..SCALAR_SIZE]);
	let mut s_bytes = [0u8; 32];
	s_bytes.copy_from_slice(&signature[SCALAR_SIZE..]);

	// s must be a valid non-zero scalar
	let s = match SecretKey::from_slice(&s_bytes) {
		Ok(s) => s,
		Err(_) => return false,
	};
	// r = 0 or r >= q can never satisfy the final challenge comparison
	if r_bytes == [0u8; 32] {
		return false;
	}
	let r_scalar = match Scalar::from_be_bytes(r_bytes) {
		Ok(r) => r,
		Err(_) => return false,
	};

	// Q = sG + rW
	let s_g = PublicKey::from_secret_key(&SECP, &s);
	let r_w = match public.clone().mul_tweak(&SECP, &r_scalar) {
		Ok(p) => p,
		Err(_) => return false,
	};
	let q_point = match s_g.combine(&r_w) {
		Ok(p) => p,
		Err(_) => return false,
	};

	let v = challenge(&q_point.serialize(), &public.serialize(), message);
	v == r_bytes
}
