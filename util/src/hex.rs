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

//! Implements hex-encoding from bytes to string and decoding of strings
//! to bytes. Everything on the wire is lowercase hex with an optional
//! "0x" prefix, so we keep our own helpers rather than pulling in a
//! full-blown codec crate.

use std::fmt::Write;

/// Encode the provided bytes into a lowercase hex string
pub fn to_hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() * 2);
	for byte in bytes {
		write!(&mut s, "{:02x}", byte).expect("Unable to write");
	}
	s
}

/// Encode the provided bytes into a "0x"-prefixed lowercase hex string
pub fn to_hex_0x(bytes: &[u8]) -> String {
	format!("0x{}", to_hex(bytes))
}

/// Decode a hex string into bytes. Accepts upper or lower case and an
/// optional "0x" prefix; an odd-length string gets a leading zero nibble.
pub fn from_hex(hex_str: &str) -> Result<Vec<u8>, String> {
	let hex_trim = strip_0x(hex_str.trim());
	let padded;
	let hex_norm = if hex_trim.len() % 2 == 1 {
		padded = format!("0{}", hex_trim);
		&padded
	} else {
		hex_trim
	};
	(0..hex_norm.len() / 2)
		.map(|i| {
			u8::from_str_radix(&hex_norm[2 * i..2 * i + 2], 16)
				.map_err(|e| format!("invalid hex \"{}\": {}", hex_str, e))
		})
		.collect()
}

/// Strip an optional "0x"/"0X" prefix from a hex string.
pub fn strip_0x(hex_str: &str) -> &str {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		&hex_str[2..]
	} else {
		hex_str
	}
}

/// Decode a hex string into a u64, big-endian.
pub fn from_hex_u64(hex_str: &str) -> Result<u64, String> {
	let bytes = from_hex(hex_str)?;
	if bytes.len() > 8 {
		return Err(format!("hex \"{}\" too long for u64", hex_str));
	}
	let mut val: u64 = 0;
	for b in bytes {
		val = (val << 8) | b as u64;
	}
	Ok(val)
}

/// Encode an integer as fixed-width big-endian hex, without prefix.
pub fn u64_to_hex(val: u64, n_bytes: usize) -> String {
	let mut bytes = vec![0u8; n_bytes];
	for i in 0..n_bytes.min(8) {
		bytes[n_bytes - 1 - i] = ((val >> (8 * i)) & 0xff) as u8;
	}
	to_hex(&bytes)
}

/// Encode an integer as fixed-width big-endian hex, "0x"-prefixed.
pub fn u64_to_hex_0x(val: u64, n_bytes: usize) -> String {
	format!("0x{}", u64_to_hex(val, n_bytes))
}
