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

//! Server types

use std::convert::From;
use std::io;

use zilproxy_api::ApiServerConfig;
use zilproxy_chain::ZilliqaConfig;
use zilproxy_pool::MiningConfig;
use zilproxy_store as store;

/// Error type wrapping underlying module errors.
#[derive(Debug)]
pub enum Error {
	/// Error originating from the db storage.
	Store(store::Error),
	/// Error originating from some IO operation.
	IO(io::Error),
	/// Error originating from the HTTP API server.
	Hyper(hyper::Error),
}

impl From<store::Error> for Error {
	fn from(e: store::Error) -> Error {
		Error::Store(e)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IO(e)
	}
}

impl From<hyper::Error> for Error {
	fn from(e: hyper::Error) -> Error {
		Error::Hyper(e)
	}
}

/// TCP listener section for the stratum endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StratumServerConfig {
	/// Bind address
	#[serde(default = "default_stratum_host")]
	pub host: String,
	/// Bind port
	#[serde(default = "default_stratum_port")]
	pub port: u16,
}

fn default_stratum_host() -> String {
	"0.0.0.0".to_string()
}

fn default_stratum_port() -> u16 {
	33456
}

impl Default for StratumServerConfig {
	fn default() -> StratumServerConfig {
		StratumServerConfig {
			host: default_stratum_host(),
			port: default_stratum_port(),
		}
	}
}

/// Store location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbConfig {
	/// Directory the LMDB environment lives in
	#[serde(default = "default_db_uri")]
	pub uri: String,
}

fn default_db_uri() -> String {
	"zilproxy_db".to_string()
}

impl Default for DbConfig {
	fn default() -> DbConfig {
		DbConfig {
			uri: default_db_uri(),
		}
	}
}

/// Pool administration section. The admin flows live outside the core,
/// only the addresses are carried here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PoolConfig {
	/// Admin addresses
	#[serde(default)]
	pub admins: Vec<String>,
}

/// Full server configuration, aggregating every component section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
	/// HTTP JSON-RPC listener
	#[serde(default)]
	pub api_server: ApiServerConfig,
	/// Stratum TCP listener
	#[serde(default)]
	pub stratum_server: StratumServerConfig,
	/// Store location
	#[serde(default)]
	pub database: DbConfig,
	/// Dispatch policy defaults
	#[serde(default)]
	pub mining: MiningConfig,
	/// Chain integration
	#[serde(default)]
	pub zilliqa: ZilliqaConfig,
	/// Pool administration
	#[serde(default)]
	pub pool: PoolConfig,
}
