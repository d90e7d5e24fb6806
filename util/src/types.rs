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

//! Logging configuration types

/// Log level types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	/// Error
	Error,
	/// Warning
	Warning,
	/// Info
	Info,
	/// Debug
	Debug,
	/// Trace
	Trace,
}

/// Logging config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	/// logging level for both stdout and the log file
	#[serde(default = "default_level")]
	pub level: LogLevel,
	/// log file path, empty for no file logging
	#[serde(default)]
	pub file: String,
	/// size of the log in megabytes to rotate over
	#[serde(default = "default_rotating_size")]
	pub rotating_size: u64,
	/// number of rotated log files to keep around
	#[serde(default = "default_backup_count")]
	pub backup_count: u32,
}

fn default_level() -> LogLevel {
	LogLevel::Info
}

fn default_rotating_size() -> u64 {
	8
}

fn default_backup_count() -> u32 {
	5
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			level: default_level(),
			file: String::from(""),
			rotating_size: default_rotating_size(),
			backup_count: default_backup_count(),
		}
	}
}
