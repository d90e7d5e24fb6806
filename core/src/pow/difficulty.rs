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

//! Difficulty/boundary mapping. The plain mapping counts leading zero
//! bits. The divided mapping splits every zero bit past
//! `n_divided_start` into `n_divided` linear sub-levels, which is how the
//! network expresses difficulties between consecutive powers of two.

use num_bigint::BigUint;

use super::Error;

const ZERO_MASK: [u8; 8] = [0xff, 0x7f, 0x3f, 0x1f, 0x0f, 0x07, 0x03, 0x01];

/// 0xffff followed by 30 zero bytes, the classic hashpower base.
const HASH_POWER_BASE: [u8; 32] = [
	0xff, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0,
];

/// 0x00000000ffff0000…0, the share target base NiceHash clients expect.
const NICEHASH_TARGET_BASE: [u8; 32] = [
	0, 0, 0, 0, 0xff, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0,
];

/// Boundary with the given number of leading zero bits, remaining bits
/// all ones.
pub fn difficulty_to_boundary(difficulty: u32) -> Result<[u8; 32], Error> {
	if difficulty > 255 {
		return Err(Error::DifficultyOutOfRange(difficulty));
	}
	let n_bytes = (difficulty / 8) as usize;
	let n_bits = (difficulty % 8) as usize;

	let mut boundary = [0xffu8; 32];
	for b in boundary.iter_mut().take(n_bytes) {
		*b = 0;
	}
	boundary[n_bytes] = ZERO_MASK[n_bits];
	Ok(boundary)
}

/// Count of leading zero bits of a boundary.
pub fn boundary_to_difficulty(boundary: &[u8]) -> u32 {
	let mut difficulty = 0;
	for b in boundary {
		if *b == 0 {
			difficulty += 8;
		} else {
			difficulty += b.leading_zeros();
			break;
		}
	}
	difficulty
}

/// Boundary for a difficulty under the divided mapping: past
/// `n_divided_start` every additional zero bit is split into `n_divided`
/// linearly interpolated sub-levels.
pub fn difficulty_to_boundary_divided(
	difficulty: u32,
	n_divided: u32,
	n_divided_start: u32,
) -> Result<[u8; 32], Error> {
	if difficulty < n_divided_start || n_divided == 0 {
		return difficulty_to_boundary(difficulty);
	}

	let n_level = difficulty - n_divided_start;
	let n_divided_level = n_level / n_divided;
	let n_remain_level = n_level % n_divided;

	let base = difficulty_to_boundary(n_divided_start + n_divided_level)?;
	let boundary = BigUint::from_bytes_be(&base);
	let step = &boundary / 2u32 / n_divided;
	let boundary = boundary - step * n_remain_level;

	Ok(to_bytes_32(&boundary))
}

/// Difficulty of a boundary under the divided mapping, the inverse of
/// `difficulty_to_boundary_divided`.
pub fn boundary_to_difficulty_divided(
	boundary: &[u8],
	n_divided: u32,
	n_divided_start: u32,
) -> u32 {
	let zero_bits = boundary_to_difficulty(boundary);
	if zero_bits < n_divided_start || n_divided == 0 {
		return zero_bits;
	}

	let base = match difficulty_to_boundary(zero_bits) {
		Ok(b) => BigUint::from_bytes_be(&b),
		Err(_) => return zero_bits,
	};
	let value = BigUint::from_bytes_be(boundary);
	let step = &base / 2u32 / n_divided;
	if step == BigUint::from(0u32) {
		return n_divided_start + (zero_bits - n_divided_start) * n_divided;
	}

	let gap = &base - &value;
	// gap / step is bounded by 2 * n_divided, it always fits a u32
	let mut remain: u32 = 0;
	for b in (gap / step).to_bytes_be() {
		remain = remain.saturating_mul(256).saturating_add(b as u32);
	}
	let remain = remain.min(n_divided - 1);

	n_divided_start + (zero_bits - n_divided_start) * n_divided + remain
}

/// Rough hashpower equivalence of a boundary, `0xffff0000…0 / boundary`.
pub fn boundary_to_hashpower(boundary: &[u8]) -> f64 {
	bytes_to_f64(&HASH_POWER_BASE) / bytes_to_f64(boundary)
}

/// NiceHash-style share target of a boundary,
/// `0x00000000ffff0000…0 / boundary`.
pub fn boundary_to_target(boundary: &[u8]) -> f64 {
	bytes_to_f64(&NICEHASH_TARGET_BASE) / bytes_to_f64(boundary)
}

/// Big-endian integer comparison of two hashes, `hash_1 <= hash_2`.
/// Shorter inputs are treated as zero-padded on the left.
pub fn is_less_or_equal(hash_1: &[u8], hash_2: &[u8]) -> bool {
	let len = hash_1.len().max(hash_2.len());
	for i in 0..len {
		let b1 = padded_byte(hash_1, i, len);
		let b2 = padded_byte(hash_2, i, len);
		if b1 != b2 {
			return b1 < b2;
		}
	}
	true
}

fn padded_byte(bytes: &[u8], i: usize, len: usize) -> u8 {
	let pad = len - bytes.len();
	if i < pad {
		0
	} else {
		bytes[i - pad]
	}
}

fn bytes_to_f64(bytes: &[u8]) -> f64 {
	let mut val = 0f64;
	for b in bytes {
		val = val * 256.0 + *b as f64;
	}
	val
}

fn to_bytes_32(value: &BigUint) -> [u8; 32] {
	let raw = value.to_bytes_be();
	let mut out = [0u8; 32];
	out[32 - raw.len()..].copy_from_slice(&raw);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_roundtrip() {
		for d in 0..=255u32 {
			let boundary = difficulty_to_boundary(d).unwrap();
			assert_eq!(boundary_to_difficulty(&boundary), d, "difficulty {}", d);
		}
		assert!(difficulty_to_boundary(256).is_err());
	}

	#[test]
	fn known_boundaries() {
		let b = difficulty_to_boundary(20).unwrap();
		assert_eq!(&b[..4], &[0x00, 0x00, 0x0f, 0xff]);
		let b = difficulty_to_boundary(0).unwrap();
		assert_eq!(b, [0xff; 32]);
	}

	#[test]
	fn divided_roundtrip() {
		for d in &[0u32, 16, 31, 32, 33, 40, 47, 63, 64, 100] {
			let boundary = difficulty_to_boundary_divided(*d, 8, 32).unwrap();
			assert_eq!(
				boundary_to_difficulty_divided(&boundary, 8, 32),
				*d,
				"divided difficulty {}",
				d
			);
		}
	}

	#[test]
	fn divided_below_start_matches_plain() {
		for d in 0..32u32 {
			assert_eq!(
				difficulty_to_boundary_divided(d, 8, 32).unwrap(),
				difficulty_to_boundary(d).unwrap()
			);
		}
	}

	#[test]
	fn divided_is_monotonic() {
		let mut prev = difficulty_to_boundary_divided(32, 8, 32).unwrap();
		for d in 33..80u32 {
			let cur = difficulty_to_boundary_divided(d, 8, 32).unwrap();
			assert!(is_less_or_equal(&cur, &prev), "difficulty {}", d);
			prev = cur;
		}
	}

	#[test]
	fn compare_hashes() {
		assert!(is_less_or_equal(&[0, 1], &[0, 2]));
		assert!(is_less_or_equal(&[0, 2], &[0, 2]));
		assert!(!is_less_or_equal(&[1, 0], &[0, 2]));
		// shorter operand is left-padded
		assert!(is_less_or_equal(&[5], &[1, 0]));
	}

	#[test]
	fn hashpower_estimates() {
		// boundary with 16 zero bits is the base unit times 2^16
		let b = difficulty_to_boundary(16).unwrap();
		let hp = boundary_to_hashpower(&b);
		assert!((hp - 65536.0).abs() / 65536.0 < 0.001);

		let target = boundary_to_target(&b);
		assert!((target - 1.0).abs() < 0.001);
	}
}
