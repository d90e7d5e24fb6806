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

//! The signed node surface: `zil_requestWork`, `zil_checkWorkStatus` and
//! `zil_verifyResult`. All three authenticate the caller by a Schnorr
//! signature over the concatenated raw bytes of their fields.

use serde_json::{json, Value};

use crate::handler::RpcHandler;
use crate::json_rpc::{standard_error, RpcError, StandardError};
use zilproxy_core::crypto::ProxyKey;
use zilproxy_core::pow;
use zilproxy_util::{from_hex, from_hex_u64, u64_to_hex_0x};

// "0x"-prefixed hex lengths of the wire fields
const PUB_KEY_LEN: usize = 68;
const HEADER_LEN: usize = 66;
const BLOCK_NUM_LEN: usize = 18;
const BOUNDARY_LEN: usize = 66;
const TIMEOUT_LEN: usize = 10;
const SIGNATURE_LEN: usize = 130;
const VERIFIED_LEN: usize = 4;

/// Outstanding works allowed per `(pub_key, block_num)`.
const RATE_CAP: usize = 2;

fn invalid_params() -> RpcError {
	standard_error(StandardError::InvalidParams, None)
}

/// Verify the request signature over the concatenation of the raw bytes
/// of each hex field. Skipped entirely when `verify_sign` is off.
fn verify_signature(handler: &RpcHandler, pub_key: &str, signature: &str, parts: &[&str]) -> bool {
	if !handler.zil_config.verify_sign {
		return true;
	}

	let key = match ProxyKey::from_public_hex(pub_key) {
		Ok(key) => key,
		Err(_) => {
			warn!("unparseable public key: {}", pub_key);
			return false;
		}
	};
	let mut msg = Vec::new();
	for part in parts {
		match from_hex(part) {
			Ok(bytes) => msg.extend_from_slice(&bytes),
			Err(_) => return false,
		}
	}
	let sig = match from_hex(signature) {
		Ok(sig) => sig,
		Err(_) => return false,
	};
	key.verify(&msg, &sig)
}

/// Network sanity of a work request: inside a PoW window, a current
/// block number, a boundary matching the live difficulty (divided
/// mapping preferred, plain as fallback) and a sane timeout.
fn check_network_info(handler: &RpcHandler, block_num: u64, boundary: &str, timeout: u64) -> bool {
	let tracker = match &handler.tracker {
		Some(tracker) => tracker,
		None => return true,
	};
	let config = tracker.config();

	if !tracker.is_pow_window() {
		warn!("the network is not in pow window");
		return false;
	}

	let network_ds_block = tracker.cur_ds_block();
	if block_num < network_ds_block {
		warn!(
			"got wrong block number: {} < {}",
			block_num, network_ds_block
		);
		return false;
	}
	if block_num > network_ds_block + 1 {
		warn!(
			"got wrong block number: {} > {} + 1",
			block_num, network_ds_block
		);
		return false;
	}

	let mut network_difficulty = vec![tracker.shard_difficulty()];
	if config.allow_ds_pow {
		network_difficulty.push(tracker.ds_difficulty());
	}

	let boundary_bytes = match from_hex(boundary) {
		Ok(bytes) => bytes,
		Err(_) => return false,
	};
	let divided = pow::boundary_to_difficulty_divided(
		&boundary_bytes,
		config.n_divided,
		config.n_divided_start,
	);
	if !network_difficulty.contains(&divided) {
		let plain = pow::boundary_to_difficulty(&boundary_bytes);
		if !network_difficulty.contains(&plain) {
			warn!("got wrong difficulty {}", divided);
			return false;
		}
	}

	if timeout > config.pow_window_in_seconds {
		warn!("got wrong timeout {}", timeout);
		return false;
	}

	true
}

/// `zil_requestWork(pub_key, header, block_num, boundary, timeout,
/// signature) -> bool`
pub fn request_work(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 6, 0)?;
	let (pub_key, header, block_num_hex, boundary, timeout_hex, signature) = (
		args[0].as_str(),
		args[1].as_str(),
		args[2].as_str(),
		args[3].as_str(),
		args[4].as_str(),
		args[5].as_str(),
	);

	if pub_key.len() != PUB_KEY_LEN
		|| header.len() != HEADER_LEN
		|| block_num_hex.len() != BLOCK_NUM_LEN
		|| boundary.len() != BOUNDARY_LEN
		|| timeout_hex.len() != TIMEOUT_LEN
		|| signature.len() != SIGNATURE_LEN
	{
		return Err(invalid_params());
	}

	let block_num = from_hex_u64(block_num_hex).map_err(|_| invalid_params())?;
	let timeout = from_hex_u64(timeout_hex).map_err(|_| invalid_params())?;

	let chain_enabled = handler
		.tracker
		.as_ref()
		.map(|t| t.config().enabled)
		.unwrap_or(false);
	if chain_enabled && !check_network_info(handler, block_num, boundary, timeout) {
		warn!("invalid pow request from {}", pub_key);
		return Ok(json!(false));
	}

	if !verify_signature(
		handler,
		pub_key,
		signature,
		&[pub_key, header, block_num_hex, boundary, timeout_hex],
	) {
		// hotfix for Zilliqa v4.2.0: some node firmware signs with a
		// fixed 60 second timeout, try that before rejecting
		let legacy_timeout = u64_to_hex_0x(60, 4);
		if !verify_signature(
			handler,
			pub_key,
			signature,
			&[pub_key, header, block_num_hex, boundary, legacy_timeout.as_str()],
		) {
			warn!("failed to verify signature");
			return Ok(json!(false));
		}
	}

	let node = match handler.pool.store().get_node(pub_key) {
		Ok(Some(node)) if node.authorized => node,
		_ => {
			warn!("unauthorized public key: {}", pub_key);
			return Ok(json!(false));
		}
	};

	match handler.pool.store().count_node_works(pub_key, block_num) {
		Ok(count) if count >= RATE_CAP => {
			warn!("too many pow requests from {} {}", block_num, pub_key);
			return Ok(json!(false));
		}
		Ok(_) => (),
		Err(e) => {
			warn!("failed to count node works: {}", e);
			return Ok(json!(false));
		}
	}

	let work = match handler.pool.new_work(
		header,
		block_num,
		boundary,
		pub_key,
		signature,
		timeout,
		node.pow_fee,
	) {
		Some(work) => work,
		None => return Ok(json!(false)),
	};
	handler.pool.update_pow_window(&work);

	// push the fresh work at connected stratum miners
	if handler.publisher.is_initialized() {
		handler.publisher.borrow().notify_new_work();
	}

	warn!("pow work {} {} requested from {}", block_num, header, pub_key);
	Ok(json!(true))
}

/// `zil_checkWorkStatus(pub_key, header, boundary, signature)
/// -> [found, nonce, header, mix_digest]`
pub fn check_work_status(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 4, 0)?;
	let (pub_key, header, boundary, signature) = (
		args[0].as_str(),
		args[1].as_str(),
		args[2].as_str(),
		args[3].as_str(),
	);

	if pub_key.len() != PUB_KEY_LEN
		|| header.len() != HEADER_LEN
		|| boundary.len() != BOUNDARY_LEN
		|| signature.len() != SIGNATURE_LEN
	{
		return Err(invalid_params());
	}

	if !verify_signature(handler, pub_key, signature, &[pub_key, header, boundary]) {
		warn!("failed to verify signature");
		return Ok(json!(false));
	}

	match handler.pool.latest_result(header, boundary, Some(pub_key)) {
		Some(result) => {
			warn!("pow result found, header: {}, boundary: {}", header, boundary);
			Ok(json!([true, result.nonce, result.header, result.mix_digest]))
		}
		None => {
			info!(
				"result not found for pub_key: {}, header: {}, boundary: {}",
				pub_key, header, boundary
			);
			Ok(json!([false, "", "", ""]))
		}
	}
}

/// `zil_verifyResult(pub_key, verified, header, boundary, signature)
/// -> bool`
pub fn verify_result(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 5, 0)?;
	let (pub_key, verified_hex, header, boundary, signature) = (
		args[0].as_str(),
		args[1].as_str(),
		args[2].as_str(),
		args[3].as_str(),
		args[4].as_str(),
	);

	if pub_key.len() != PUB_KEY_LEN
		|| verified_hex.len() != VERIFIED_LEN
		|| header.len() != HEADER_LEN
		|| boundary.len() != BOUNDARY_LEN
		|| signature.len() != SIGNATURE_LEN
	{
		return Err(invalid_params());
	}

	if !verify_signature(
		handler,
		pub_key,
		signature,
		&[pub_key, verified_hex, header, boundary],
	) {
		warn!("failed to verify signature");
		return Ok(json!(false));
	}

	let verified = verified_hex == "0x01";
	match handler.pool.verify_result(header, boundary, pub_key, verified) {
		Some(_) => {
			warn!(
				"pow result verified by pub_key: {}, header: {}, boundary: {}",
				pub_key, header, boundary
			);
			Ok(json!(true))
		}
		None => {
			warn!(
				"result not found for pub_key: {}, header: {}, boundary: {}",
				pub_key, header, boundary
			);
			Ok(json!(false))
		}
	}
}
