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

//! Thin JSON-RPC client for the Zilliqa public API, just the four calls
//! the tracker needs.

use hyper::client::HttpConnector;
use hyper::{Body, Client, Request};
use serde_json::{json, Value};
use std::fmt;

/// Errors talking to the chain API.
#[derive(Debug)]
pub enum ClientError {
	/// Transport-level failure
	Http(String),
	/// Endpoint or request could not be built
	Request(String),
	/// Body was not the JSON we expected
	Parse(String),
	/// The API answered with an error object
	Api(String),
}

impl fmt::Display for ClientError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ClientError::Http(e) => write!(f, "chain http error: {}", e),
			ClientError::Request(e) => write!(f, "chain request error: {}", e),
			ClientError::Parse(e) => write!(f, "chain parse error: {}", e),
			ClientError::Api(e) => write!(f, "chain api error: {}", e),
		}
	}
}

type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>>;

/// JSON-RPC client bound to one API endpoint.
pub struct ZilliqaClient {
	endpoint: String,
	client: HttpsClient,
}

impl ZilliqaClient {
	/// Client against the given endpoint URL.
	pub fn new(endpoint: &str) -> ZilliqaClient {
		let https = hyper_rustls::HttpsConnectorBuilder::new()
			.with_native_roots()
			.https_or_http()
			.enable_http1()
			.build();
		ZilliqaClient {
			endpoint: endpoint.to_string(),
			client: Client::builder().build(https),
		}
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
		let body = json!({
			"id": "1",
			"jsonrpc": "2.0",
			"method": method,
			"params": params,
		});
		let req = Request::post(self.endpoint.as_str())
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.map_err(|e| ClientError::Request(e.to_string()))?;

		let resp = self
			.client
			.request(req)
			.await
			.map_err(|e| ClientError::Http(e.to_string()))?;
		let bytes = hyper::body::to_bytes(resp.into_body())
			.await
			.map_err(|e| ClientError::Http(e.to_string()))?;
		let parsed: Value =
			serde_json::from_slice(&bytes).map_err(|e| ClientError::Parse(e.to_string()))?;

		if let Some(err) = parsed.get("error") {
			if !err.is_null() {
				return Err(ClientError::Api(err.to_string()));
			}
		}
		match parsed.get("result") {
			Some(result) => Ok(result.clone()),
			None => Err(ClientError::Parse("missing result".to_string())),
		}
	}

	/// Current TX block number.
	pub async fn get_current_mini_epoch(&self) -> Result<u64, ClientError> {
		let result = self.call("GetCurrentMiniEpoch", json!([""])).await?;
		parse_number(&result)
	}

	/// Current DS block number.
	pub async fn get_current_ds_epoch(&self) -> Result<u64, ClientError> {
		let result = self.call("GetCurrentDSEpoch", json!([""])).await?;
		parse_number(&result)
	}

	/// Difficulty of the previous shard PoW round.
	pub async fn get_prev_difficulty(&self) -> Result<u32, ClientError> {
		let result = self.call("GetPrevDifficulty", json!([""])).await?;
		parse_number(&result).map(|n| n as u32)
	}

	/// Difficulty of the previous DS PoW round.
	pub async fn get_prev_ds_difficulty(&self) -> Result<u32, ClientError> {
		let result = self.call("GetPrevDSDifficulty", json!([""])).await?;
		parse_number(&result).map(|n| n as u32)
	}
}

/// The API mixes numeric and stringified numbers, accept both.
fn parse_number(value: &Value) -> Result<u64, ClientError> {
	match value {
		Value::Number(n) => n
			.as_u64()
			.ok_or_else(|| ClientError::Parse(format!("bad number {}", n))),
		Value::String(s) => s
			.parse::<u64>()
			.map_err(|e| ClientError::Parse(format!("bad number \"{}\": {}", s, e))),
		other => Err(ClientError::Parse(format!("unexpected value {}", other))),
	}
}
