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

//! The HTTP JSON-RPC endpoint: one POST path, dispatch on the method
//! name. Handler bodies run on the blocking pool, they hit the store and
//! may recompute Ethash.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::json_rpc::{self, standard_error, StandardError};
use crate::{eth_rpc, node_rpc, stats_rpc, NodeApiConfig};
use zilproxy_chain::ChainTracker;
use zilproxy_core::pow::EthashVerifier;
use zilproxy_pool::{MiningConfig, SettingsCache, WorkPool, WorkPublisher};
use zilproxy_util::OneTime;

/// Everything the RPC methods need, wired once at startup.
pub struct RpcHandler {
	/// The work pool
	pub pool: Arc<WorkPool>,
	/// Read-through dispatch policy
	pub settings: Arc<SettingsCache>,
	/// Shared Ethash verifier
	pub verifier: Arc<EthashVerifier>,
	/// Chain tracker, absent when chain integration is off
	pub tracker: Option<Arc<ChainTracker>>,
	/// Stratum push hook, set after the stratum server starts
	pub publisher: OneTime<Arc<dyn WorkPublisher>>,
	/// Node-surface options
	pub zil_config: NodeApiConfig,
	/// Miner-surface options
	pub mining: MiningConfig,
}

impl RpcHandler {
	/// Dispatch one RPC call. Invalid input surfaces as a JSON-RPC error,
	/// domain rejections surface as a `false` result.
	pub fn handle(&self, method: &str, params: &Value) -> Result<Value, json_rpc::RpcError> {
		match method {
			"zil_requestWork" => node_rpc::request_work(self, params),
			"zil_checkWorkStatus" => node_rpc::check_work_status(self, params),
			"zil_verifyResult" => node_rpc::verify_result(self, params),
			"eth_getWork" => eth_rpc::get_work(self),
			"eth_submitWork" => eth_rpc::submit_work(self, params),
			"eth_submitHashrate" => eth_rpc::submit_hashrate(self, params),
			"stats_worker" => stats_rpc::worker(self, params),
			"stats_results" => stats_rpc::results(self, params),
			_ => Err(standard_error(StandardError::MethodNotFound, None)),
		}
	}

	/// Positional string parameters: at least `required` of them, at most
	/// `required + optional`, each a string. Strings are lowercased, the
	/// optional tail is filled with empties.
	pub fn string_params(
		params: &Value,
		required: usize,
		optional: usize,
	) -> Result<Vec<String>, json_rpc::RpcError> {
		let arr = params
			.as_array()
			.ok_or_else(|| standard_error(StandardError::InvalidParams, None))?;
		if arr.len() < required || arr.len() > required + optional {
			return Err(standard_error(StandardError::InvalidParams, None));
		}
		let mut out = Vec::with_capacity(required + optional);
		for v in arr {
			let s = v
				.as_str()
				.ok_or_else(|| standard_error(StandardError::InvalidParams, None))?;
			out.push(s.to_lowercase());
		}
		while out.len() < required + optional {
			out.push(String::new());
		}
		Ok(out)
	}
}

async fn handle_request(
	req: Request<Body>,
	path: String,
	handler: Arc<RpcHandler>,
) -> Result<Response<Body>, Infallible> {
	if req.method() != Method::POST || req.uri().path() != path {
		let resp = Response::builder()
			.status(StatusCode::NOT_FOUND)
			.body(Body::from("not found"))
			.unwrap();
		return Ok(resp);
	}

	let bytes = match hyper::body::to_bytes(req.into_body()).await {
		Ok(bytes) => bytes,
		Err(e) => {
			warn!("failed to read request body: {}", e);
			let resp = Response::builder()
				.status(StatusCode::BAD_REQUEST)
				.body(Body::from("bad request"))
				.unwrap();
			return Ok(resp);
		}
	};

	let rpc_req: json_rpc::Request = match serde_json::from_slice(&bytes) {
		Ok(req) => req,
		Err(_) => {
			let resp = json_rpc::result_to_response(
				Err(standard_error(StandardError::ParseError, None)),
				Value::Null,
			);
			return Ok(json_response(&resp));
		}
	};

	let id = rpc_req.id.clone();
	let result = {
		let handler = handler.clone();
		tokio::task::spawn_blocking(move || handler.handle(&rpc_req.method, &rpc_req.params))
			.await
	};
	let result = match result {
		Ok(res) => res,
		Err(e) => {
			error!("rpc handler panicked: {}", e);
			Err(standard_error(StandardError::InternalError, None))
		}
	};

	Ok(json_response(&json_rpc::result_to_response(result, id)))
}

fn json_response(resp: &json_rpc::Response) -> Response<Body> {
	let body = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
	Response::builder()
		.status(StatusCode::OK)
		.header("content-type", "application/json")
		.body(Body::from(body))
		.unwrap()
}

/// Run the HTTP API server until the process exits or the runtime is
/// shut down.
pub async fn run_api_server(
	addr: SocketAddr,
	path: String,
	handler: Arc<RpcHandler>,
) -> Result<(), hyper::Error> {
	let make_svc = make_service_fn(move |_conn| {
		let handler = handler.clone();
		let path = path.clone();
		async move {
			Ok::<_, Infallible>(service_fn(move |req| {
				handle_request(req, path.clone(), handler.clone())
			}))
		}
	});

	let server = Server::bind(&addr).serve(make_svc);
	warn!("API server running at http://{}", addr);
	server.await
}
