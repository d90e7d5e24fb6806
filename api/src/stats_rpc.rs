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

//! Read-only statistics surface: per-worker counters and a paginated
//! listing of accepted results, for dashboards and operators.

use serde_json::{json, Value};

use crate::handler::RpcHandler;
use crate::json_rpc::{standard_error, RpcError, StandardError};

const DEFAULT_PER_PAGE: usize = 50;
const MAX_PER_PAGE: usize = 100;

/// `stats_worker(wallet_address, worker_name)` -> counters of one
/// worker, null when it was never seen.
pub fn worker(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let args = RpcHandler::string_params(params, 2, 0)?;
	let (wallet, worker_name) = (args[0].as_str(), args[1].as_str());

	match handler.pool.store().get_worker(wallet, worker_name) {
		Ok(Some(worker)) => Ok(json!({
			"miner": worker.wallet_address,
			"worker_name": worker.worker_name,
			"works": {
				"submitted": worker.work_submitted,
				"failed": worker.work_failed,
				"finished": worker.work_finished,
				"verified": worker.work_verified,
			},
		})),
		Ok(None) => Ok(Value::Null),
		Err(e) => {
			warn!("failed to load worker {}.{}: {}", wallet, worker_name, e);
			Ok(Value::Null)
		}
	}
}

/// `stats_results([page[, per_page]])` -> a page of accepted results,
/// newest first.
pub fn results(handler: &RpcHandler, params: &Value) -> Result<Value, RpcError> {
	let (page, per_page) = page_params(params)?;

	let results = match handler.pool.store().paginate_results(page, per_page) {
		Ok(results) => results,
		Err(e) => {
			warn!("failed to page results: {}", e);
			return Err(standard_error(StandardError::InternalError, None));
		}
	};

	let entries: Vec<Value> = results
		.iter()
		.map(|r| {
			json!({
				"header": r.header,
				"boundary": r.boundary,
				"nonce": r.nonce,
				"mix_digest": r.mix_digest,
				"block_num": r.block_num,
				"pow_fee": r.pow_fee,
				"miner_wallet": r.miner_wallet,
				"worker_name": r.worker_name,
				"verified": r.verified,
				"finished_time": r.finished_time.to_rfc3339(),
			})
		})
		.collect();

	Ok(json!({
		"page": page,
		"per_page": per_page,
		"results": entries,
	}))
}

/// Optional `[page, per_page]` positional numbers.
fn page_params(params: &Value) -> Result<(usize, usize), RpcError> {
	let invalid = || standard_error(StandardError::InvalidParams, None);

	let arr = match params {
		Value::Null => return Ok((0, DEFAULT_PER_PAGE)),
		Value::Array(arr) => arr,
		_ => return Err(invalid()),
	};
	if arr.len() > 2 {
		return Err(invalid());
	}
	let page = match arr.get(0) {
		Some(v) => v.as_u64().ok_or_else(invalid)? as usize,
		None => 0,
	};
	let per_page = match arr.get(1) {
		Some(v) => v.as_u64().ok_or_else(invalid)? as usize,
		None => DEFAULT_PER_PAGE,
	};
	if per_page == 0 || per_page > MAX_PER_PAGE {
		return Err(invalid());
	}
	Ok((page, per_page))
}
