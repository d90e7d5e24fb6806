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

//! Server stats collection types, to be used by tests and the server
//! status line.

use chrono::{DateTime, Utc};

/// Stats on a connected stratum miner. Worker stat objects are added and
/// updated but never removed.
#[derive(Clone, Debug)]
pub struct WorkerStats {
	/// Connection id of the worker
	pub id: String,
	/// whether the miner is currently connected
	pub is_connected: bool,
	/// Timestamp of the last message from this worker
	pub last_seen: DateTime<Utc>,
	/// Shares accepted from this worker
	pub num_accepted: u64,
	/// Shares rejected from this worker
	pub num_rejected: u64,
}

impl Default for WorkerStats {
	fn default() -> WorkerStats {
		WorkerStats {
			id: String::from("-"),
			is_connected: false,
			last_seen: Utc::now(),
			num_accepted: 0,
			num_rejected: 0,
		}
	}
}

/// Stats on the stratum server and its workers.
#[derive(Clone, Debug, Default)]
pub struct StratumStats {
	/// whether the server is running
	pub is_running: bool,
	/// Number of miners currently connected
	pub num_workers: usize,
	/// of miner stats
	pub worker_stats: Vec<WorkerStats>,
}
