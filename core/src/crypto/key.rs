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

//! Key wrapper around secp256k1 keypairs as Zilliqa encodes them: 33-byte
//! compressed public keys on the wire, wallet address derived from the
//! SHA-256 of the compressed encoding.

use rand::{thread_rng, Rng};
use secp256k1::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use super::schnorr::{self, SIGNATURE_SIZE};
use super::Error;
use crate::sizes;
use zilproxy_util::{from_hex, to_hex, to_hex_0x};

/// A secp256k1 keypair. The secret side is optional so the same type works
/// for verify-only node records.
#[derive(Clone, Debug)]
pub struct ProxyKey {
	public: PublicKey,
	secret: Option<SecretKey>,
}

impl ProxyKey {
	/// Key from a compressed or uncompressed public key encoding.
	pub fn from_public(bytes: &[u8]) -> Result<ProxyKey, Error> {
		let public = PublicKey::from_slice(bytes).map_err(|_| Error::InvalidPublicKey)?;
		Ok(ProxyKey {
			public,
			secret: None,
		})
	}

	/// Key from a hex public key string, with or without "0x".
	pub fn from_public_hex(hex_str: &str) -> Result<ProxyKey, Error> {
		let bytes = from_hex(hex_str).map_err(|_| Error::InvalidPublicKey)?;
		ProxyKey::from_public(&bytes)
	}

	/// Full keypair from 32 secret bytes.
	pub fn from_secret(bytes: &[u8]) -> Result<ProxyKey, Error> {
		let secret = SecretKey::from_slice(bytes).map_err(|_| Error::InvalidSecretKey)?;
		let public = PublicKey::from_secret_key(&schnorr::SECP, &secret);
		Ok(ProxyKey {
			public,
			secret: Some(secret),
		})
	}

	/// Full keypair from a hex secret key string.
	pub fn from_secret_hex(hex_str: &str) -> Result<ProxyKey, Error> {
		let bytes = from_hex(hex_str).map_err(|_| Error::InvalidSecretKey)?;
		ProxyKey::from_secret(&bytes)
	}

	/// Generate a fresh random keypair.
	pub fn generate() -> ProxyKey {
		loop {
			let mut bytes = [0u8; 32];
			thread_rng().fill(&mut bytes[..]);
			if let Ok(key) = ProxyKey::from_secret(&bytes) {
				return key;
			}
		}
	}

	/// The public key.
	pub fn public(&self) -> &PublicKey {
		&self.public
	}

	/// The secret key, if this is a full keypair.
	pub fn secret(&self) -> Result<&SecretKey, Error> {
		self.secret.as_ref().ok_or(Error::NoSecretKey)
	}

	/// 33-byte compressed public key encoding.
	pub fn public_bytes(&self) -> [u8; sizes::PUB_KEY_BYTES] {
		self.public.serialize()
	}

	/// "0x"-prefixed hex of the compressed public key.
	pub fn public_hex(&self) -> String {
		to_hex_0x(&self.public_bytes())
	}

	/// Wallet address: the last 20 bytes of the SHA-256 digest of the
	/// compressed public key, as plain hex.
	pub fn address(&self) -> String {
		let digest = Sha256::digest(&self.public_bytes());
		to_hex(&digest[digest.len() - sizes::ADDRESS_BYTES..])
	}

	/// Schnorr-sign a message.
	pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_SIZE], Error> {
		schnorr::sign(message, self.secret()?)
	}

	/// Schnorr-sign a message, returning the signature as plain hex.
	pub fn sign_hex(&self, message: &[u8]) -> Result<String, Error> {
		Ok(to_hex(&self.sign(message)?))
	}

	/// Verify a Schnorr signature over the message.
	pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
		schnorr::verify(message, signature, &self.public)
	}
}

/// SEC1-encode an affine point given as raw big-endian coordinates.
pub fn encode_point(x: &[u8; 32], y: &[u8; 32], compressed: bool) -> Vec<u8> {
	if compressed {
		let tag = if y[31] & 0x01 == 1 { 0x03 } else { 0x02 };
		let mut out = Vec::with_capacity(33);
		out.push(tag);
		out.extend_from_slice(x);
		out
	} else {
		let mut out = Vec::with_capacity(65);
		out.push(0x04);
		out.extend_from_slice(x);
		out.extend_from_slice(y);
		out
	}
}

/// Decode a SEC1 point (compressed or uncompressed) back to its affine
/// coordinates.
pub fn decode_point(bytes: &[u8]) -> Result<([u8; 32], [u8; 32]), Error> {
	let public = PublicKey::from_slice(bytes).map_err(|_| Error::InvalidPublicKey)?;
	let full = public.serialize_uncompressed();
	let mut x = [0u8; 32];
	let mut y = [0u8; 32];
	x.copy_from_slice(&full[1..33]);
	y.copy_from_slice(&full[33..65]);
	Ok((x, y))
}
