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

//! Configuration file management

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::types::{ConfigError, GlobalConfig};

/// The default file name a config is looked up under.
pub const CONFIG_FILE_NAME: &str = "zilproxy.toml";

/// Parse a config file into a GlobalConfig.
pub fn load_config(path: &PathBuf) -> Result<GlobalConfig, ConfigError> {
	let mut file = match File::open(path) {
		Ok(file) => file,
		Err(_) => {
			return Err(ConfigError::FileNotFoundError(
				path.to_string_lossy().to_string(),
			));
		}
	};
	let mut contents = String::new();
	file.read_to_string(&mut contents)?;

	let mut config: GlobalConfig = toml::from_str(&contents).map_err(|e| {
		ConfigError::ParseError(path.to_string_lossy().to_string(), format!("{}", e))
	})?;
	config.config_file_path = Some(path.clone());
	Ok(config)
}

/// Load the config from an explicit file, from `zilproxy.toml` in the
/// working directory, or fall back to defaults when neither exists.
pub fn initial_setup(config_file: Option<&str>) -> Result<GlobalConfig, ConfigError> {
	if let Some(file) = config_file {
		return load_config(&PathBuf::from(file));
	}

	let mut default_path = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
	default_path.push(CONFIG_FILE_NAME);
	if default_path.exists() {
		return load_config(&default_path);
	}

	Ok(GlobalConfig::default())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_config() {
		let toml_str = r#"
			[api_server]
			host = "127.0.0.1"
			port = 4202
			path = "/api"
			enabled = true

			[api_server.zil]
			verify_sign = false

			[stratum_server]
			host = "0.0.0.0"
			port = 33456

			[database]
			uri = "/tmp/zilproxy_db"

			[mining]
			min_fee = 0.5
			max_dispatch = 5
			inc_expire = 10

			[zilliqa]
			enabled = false
			api_endpoint = "https://api.zilliqa.com/"
			update_interval = 30
			BLOCK_PER_POW = 100
			POW_WINDOW_IN_SECONDS = 300
			POW_BOUNDARY_N_DIVIDED = 8
			POW_BOUNDARY_N_DIVIDED_START = 32

			[pool]
			admins = ["admin@example.org"]

			[logging]
			level = "info"
			file = "zilproxy.log"
			rotating_size = 8
			backup_count = 5
		"#;

		let decoded: GlobalConfig = toml::from_str(toml_str).unwrap();
		assert_eq!(decoded.server.api_server.port, 4202);
		assert!(!decoded.server.api_server.zil.verify_sign);
		assert_eq!(decoded.server.stratum_server.port, 33456);
		assert_eq!(decoded.server.database.uri, "/tmp/zilproxy_db");
		assert_eq!(decoded.server.mining.max_dispatch, 5);
		assert!((decoded.server.mining.min_fee - 0.5).abs() < 1e-9);
		assert_eq!(decoded.server.zilliqa.block_per_pow, 100);
		assert_eq!(decoded.server.zilliqa.n_divided_start, 32);
		assert_eq!(decoded.server.pool.admins.len(), 1);
		let logging = decoded.logging.unwrap();
		assert_eq!(logging.file, "zilproxy.log");
	}

	#[test]
	fn missing_sections_take_defaults() {
		let decoded: GlobalConfig = toml::from_str("").unwrap();
		assert!(decoded.server.api_server.enabled);
		assert!(decoded.server.api_server.zil.verify_sign);
		assert_eq!(decoded.server.mining.max_dispatch, 10);
		assert!(decoded.logging.is_none());
	}
}
