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

//! Tracks the live Zilliqa network: current TX/DS blocks, shard and DS
//! difficulties, and the timing model that tells miners how long until
//! the next PoW window opens. Poll failures are logged and swallowed,
//! the tracker never takes the server down.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod client;
mod tracker;

pub use crate::client::{ClientError, ZilliqaClient};
pub use crate::tracker::{poll_loop, ChainTracker};

/// Chain integration section of the config. The uppercase aliases accept
/// the legacy key spelling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZilliqaConfig {
	/// Whether chain integration is on; when off, requestWork skips the
	/// network checks entirely
	#[serde(default)]
	pub enabled: bool,
	/// JSON-RPC endpoint of a Zilliqa API node
	#[serde(default = "default_api_endpoint")]
	pub api_endpoint: String,
	/// Seconds between chain polls, also the freshness of cached state
	#[serde(default = "default_update_interval")]
	pub update_interval: u64,
	/// TX blocks per PoW window
	#[serde(default = "default_block_per_pow", alias = "BLOCK_PER_POW")]
	pub block_per_pow: u64,
	/// Longest timeout a node may declare for a work item
	#[serde(
		default = "default_pow_window_in_seconds",
		alias = "POW_WINDOW_IN_SECONDS"
	)]
	pub pow_window_in_seconds: u64,
	/// Divisor of the divided boundary mapping
	#[serde(default = "default_n_divided", alias = "POW_BOUNDARY_N_DIVIDED")]
	pub n_divided: u32,
	/// First difficulty the divided mapping applies to
	#[serde(
		default = "default_n_divided_start",
		alias = "POW_BOUNDARY_N_DIVIDED_START"
	)]
	pub n_divided_start: u32,
	/// Whether node-declared boundaries may match the DS difficulty too
	#[serde(default)]
	pub allow_ds_pow: bool,
	/// Average TX block time in seconds, for the next-PoW estimate
	#[serde(default = "default_avg_block_time")]
	pub avg_block_time: f64,
}

fn default_api_endpoint() -> String {
	"https://api.zilliqa.com/".to_string()
}

fn default_update_interval() -> u64 {
	30
}

fn default_block_per_pow() -> u64 {
	100
}

fn default_pow_window_in_seconds() -> u64 {
	300
}

fn default_n_divided() -> u32 {
	8
}

fn default_n_divided_start() -> u32 {
	32
}

fn default_avg_block_time() -> f64 {
	40.0
}

impl Default for ZilliqaConfig {
	fn default() -> ZilliqaConfig {
		ZilliqaConfig {
			enabled: false,
			api_endpoint: default_api_endpoint(),
			update_interval: default_update_interval(),
			block_per_pow: default_block_per_pow(),
			pow_window_in_seconds: default_pow_window_in_seconds(),
			n_divided: default_n_divided(),
			n_divided_start: default_n_divided_start(),
			allow_ds_pow: false,
			avg_block_time: default_avg_block_time(),
		}
	}
}
