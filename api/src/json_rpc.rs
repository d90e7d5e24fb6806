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
// Derived from https://github.com/apoelstra/rust-jsonrpc

//! JSON RPC types shared by the HTTP dispatcher and its handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSONRPC request object
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
	/// The name of the RPC call
	pub method: String,
	/// Parameters to the RPC call
	#[serde(default)]
	pub params: Value,
	/// Identifier for this Request, which should appear in the response
	#[serde(default)]
	pub id: Value,
	/// jsonrpc field, MUST be "2.0"
	pub jsonrpc: Option<String>,
}

/// A JSONRPC response object
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
	/// A result if there is one, or null
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// An error if there is one, or null
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
	/// Identifier for this Request, which should match that of the request
	pub id: Value,
	/// jsonrpc field, MUST be "2.0"
	pub jsonrpc: Option<String>,
}

/// Standard error responses, as described at
/// http://www.jsonrpc.org/specification#error_object
#[derive(Debug)]
pub enum StandardError {
	/// Invalid JSON was received by the server.
	/// An error occurred on the server while parsing the JSON text.
	ParseError,
	/// The JSON sent is not a valid Request object.
	InvalidRequest,
	/// The method does not exist / is not available.
	MethodNotFound,
	/// Invalid method parameter(s).
	InvalidParams,
	/// Internal JSON-RPC error.
	InternalError,
}

/// A JSONRPC error object
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
	/// The integer identifier of the error
	pub code: i32,
	/// A string describing the error
	pub message: String,
	/// Additional data specific to the error
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Create a standard error response
pub fn standard_error(code: StandardError, data: Option<Value>) -> RpcError {
	match code {
		StandardError::ParseError => RpcError {
			code: -32700,
			message: "Parse error".to_string(),
			data,
		},
		StandardError::InvalidRequest => RpcError {
			code: -32600,
			message: "Invalid Request".to_string(),
			data,
		},
		StandardError::MethodNotFound => RpcError {
			code: -32601,
			message: "Method not found".to_string(),
			data,
		},
		StandardError::InvalidParams => RpcError {
			code: -32602,
			message: "Invalid params".to_string(),
			data,
		},
		StandardError::InternalError => RpcError {
			code: -32603,
			message: "Internal error".to_string(),
			data,
		},
	}
}

/// Converts a Rust `Result` to a JSONRPC response object
pub fn result_to_response(result: Result<Value, RpcError>, id: Value) -> Response {
	match result {
		Ok(data) => Response {
			result: Some(data),
			error: None,
			id,
			jsonrpc: Some(String::from("2.0")),
		},
		Err(err) => Response {
			result: None,
			error: Some(err),
			id,
			jsonrpc: Some(String::from("2.0")),
		},
	}
}
