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

//! JSON-RPC over HTTP for both sides of the proxy: the Schnorr-signed
//! node surface (`zil_*`) and the public miner surface (`eth_*`).

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod eth_rpc;
pub mod handler;
pub mod json_rpc;
pub mod node_rpc;
pub mod stats_rpc;

pub use crate::handler::{run_api_server, RpcHandler};

/// HTTP listener section of the config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiServerConfig {
	/// Bind address
	#[serde(default = "default_host")]
	pub host: String,
	/// Bind port
	#[serde(default = "default_port")]
	pub port: u16,
	/// URL path the JSON-RPC endpoint answers on
	#[serde(default = "default_path")]
	pub path: String,
	/// Whether the HTTP API runs at all
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Node-surface options
	#[serde(default)]
	pub zil: NodeApiConfig,
}

/// Options of the signed node surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeApiConfig {
	/// Set to false to skip signature checks, test mode only
	#[serde(default = "default_verify_sign")]
	pub verify_sign: bool,
}

fn default_host() -> String {
	"0.0.0.0".to_string()
}

fn default_port() -> u16 {
	4202
}

fn default_path() -> String {
	"/api".to_string()
}

fn default_enabled() -> bool {
	true
}

fn default_verify_sign() -> bool {
	true
}

impl Default for ApiServerConfig {
	fn default() -> ApiServerConfig {
		ApiServerConfig {
			host: default_host(),
			port: default_port(),
			path: default_path(),
			enabled: default_enabled(),
			zil: NodeApiConfig::default(),
		}
	}
}

impl Default for NodeApiConfig {
	fn default() -> NodeApiConfig {
		NodeApiConfig {
			verify_sign: default_verify_sign(),
		}
	}
}
