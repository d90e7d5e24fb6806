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

//! The public pulling miner surface: `eth_getWork`, `eth_submitWork`
//! and `eth_submitHashrate`. Any address may submit, anonymous
//! submissions are credited to the configured default miner.

use chrono::Utc;
use serde_json::{json, Value};

use crate::handler::RpcHandler;
use crate::json_rpc::{standard_error, RpcError, StandardError};
use zilproxy_pool::{valid_worker_name, HashRate};
use zilproxy_util::{from_hex, from_hex_u64};

const NONCE_LEN: usize = 18;
const HEADER_LEN: usize = 66;
const MIX_LEN: usize = 66;
const BOUNDARY_LEN: usize = 66;
const WALLET_LEN: usize = 42;
const MAX_WORKER_LEN: usize = 64;

fn invalid_params() -> RpcError {
	standard_error(StandardError::InvalidParams, None)
}

fn no_work(handler: &RpcHandler) -> Value {
	let secs = handler.pool.seconds_to_next_pow();
	json!(["", "", "", false, secs])
}

/// `eth_getWork() -> [header, seed, boundary, have_work,
/// seconds_to_next_pow]`
pub fn get_work(handler: &RpcHandler) -> Result<Value, RpcError> {
	let settings = handler.settings.get();
	let work = handler
		.pool
		.get_new_works(1, settings.min_fee, Some(settings.max_dispatch))
		.pop();

	let work = match work {
		Some(work) => work,
		None => return Ok(no_work(handler)),
	};

	match handler.pool.increase_dispatched(
		work.id,
		settings.max_dispatch,
		1,
		settings.inc_expire,
	) {
		Some(work) => Ok(json!([work.header, work.seed, work.boundary, true, 0])),
		None => {
			warn!("increase_dispatched failed, work {}", work.id);
			Ok(no_work(handler))
		}
	}
}

/// `eth_submitWork(nonce, header, mix_digest[, boundary, miner_wallet,
/// worker_name]) -> bool`
pub fn submit_work(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 3, 3)?;
	let (nonce_hex, header, mix_digest) = (&args[0], &args[1], &args[2]);
	let (boundary, wallet_arg, worker_arg) = (&args[3], &args[4], &args[5]);

	if nonce_hex.len() != NONCE_LEN
		|| header.len() != HEADER_LEN
		|| mix_digest.len() != MIX_LEN
		|| !(boundary.is_empty() || boundary.len() == BOUNDARY_LEN)
		|| !(wallet_arg.is_empty() || wallet_arg.len() == WALLET_LEN)
		|| worker_arg.len() >= MAX_WORKER_LEN
	{
		return Err(invalid_params());
	}

	let miner_wallet = if wallet_arg.is_empty() {
		handler.mining.default_miner.clone()
	} else {
		wallet_arg.clone()
	};

	let nonce = from_hex_u64(nonce_hex).map_err(|_| invalid_params())?;
	let worker_name = valid_worker_name(worker_arg).ok_or_else(invalid_params)?;
	let mix_bytes = from_hex(mix_digest).map_err(|_| invalid_params())?;
	from_hex(&miner_wallet).map_err(|_| invalid_params())?;

	// get or create miner and worker, count the attempt
	let store = handler.pool.store();
	if store.get_or_create_miner(&miner_wallet).is_err()
		|| store.get_or_create_worker(&miner_wallet, &worker_name).is_err()
	{
		warn!("miner/worker not found, {}.{}", miner_wallet, worker_name);
		return Ok(json!(false));
	}
	handler.pool.bump_worker(&miner_wallet, &worker_name, 1, 0, 0, 0);

	let work = handler.pool.find_work_by_header_boundary(header, boundary, true);

	let accepted = handler
		.pool
		.submit(
			&handler.verifier,
			work.as_ref(),
			nonce,
			nonce_hex,
			&mix_bytes,
			&miner_wallet,
			&worker_name,
		)
		.is_ok();
	Ok(json!(accepted))
}

/// `eth_submitHashrate(hashrate, miner_wallet[, worker_name]) -> bool`
pub fn submit_hashrate(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 2, 1)?;
	let (hashrate_hex, wallet, worker_arg) = (&args[0], &args[1], &args[2]);

	if wallet.len() != WALLET_LEN || worker_arg.len() >= MAX_WORKER_LEN {
		return Err(invalid_params());
	}
	let hashrate = from_hex_u64(hashrate_hex).map_err(|_| invalid_params())?;
	let worker_name = valid_worker_name(worker_arg).ok_or_else(invalid_params)?;

	let store = handler.pool.store();
	match store.get_miner(wallet) {
		Ok(Some(_)) => (),
		_ => return Ok(json!(false)),
	}
	if store.get_or_create_worker(wallet, &worker_name).is_err() {
		return Ok(json!(false));
	}

	let sample = HashRate {
		id: 0,
		wallet_address: wallet.clone(),
		worker_name,
		hashrate,
		updated_time: Utc::now(),
	};
	match store.log_hashrate(sample) {
		Ok(_) => Ok(json!(true)),
		Err(e) => {
			warn!("failed to log hashrate for {}: {}", wallet, e);
			Ok(json!(false))
		}
	}
}
