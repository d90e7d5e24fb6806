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

//! The whole proxy wired together. Init order matters: persistence,
//! then chain tracker, then verifier, then dispatcher, then servers.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use crate::common::types::{Error, ServerConfig};
use crate::mining::dummy::run_dummy_work_pump;
use crate::mining::stratumserver::StratumServer;
use zilproxy_api::{run_api_server, RpcHandler};
use zilproxy_chain::{poll_loop, ChainTracker};
use zilproxy_core::pow::EthashVerifier;
use zilproxy_pool::{PoolStore, SettingsCache, WorkPool, WorkPublisher};
use zilproxy_util::OneTime;

/// The proxy server, built from a config and run until the process is
/// told to stop.
pub struct Server;

impl Server {
	/// Build every component and serve. Blocks on the HTTP API server
	/// (or parks forever when it is disabled).
	pub fn start(config: ServerConfig) -> Result<(), Error> {
		let runtime = tokio::runtime::Runtime::new()?;

		// persistence
		let env = Arc::new(zilproxy_store::new_env(config.database.uri.clone()));
		let store = Arc::new(PoolStore::new(env));

		// chain tracker
		let tracker = if config.zilliqa.enabled {
			Some(Arc::new(ChainTracker::new(config.zilliqa.clone())))
		} else {
			None
		};

		// verifier
		let verifier = Arc::new(EthashVerifier::new());

		// dispatcher
		let pool = Arc::new(WorkPool::new(store.clone()));
		let settings = Arc::new(SettingsCache::new(
			store.clone(),
			config.mining.site_settings(),
		));

		// servers
		let stratum = Arc::new(StratumServer::new(
			config.stratum_server.clone(),
			pool.clone(),
			settings.clone(),
			verifier.clone(),
		));
		stratum.start()?;

		let handler = Arc::new(RpcHandler {
			pool: pool.clone(),
			settings,
			verifier,
			tracker: tracker.clone(),
			publisher: OneTime::new(),
			zil_config: config.api_server.zil.clone(),
			mining: config.mining.clone(),
		});
		handler
			.publisher
			.init(stratum.clone() as Arc<dyn WorkPublisher>);

		if let Some(tracker) = tracker.clone() {
			runtime.spawn(poll_loop(tracker.clone()));

			let pump_server = stratum.clone();
			let pump_pool = pool.clone();
			let pump_stop = Arc::new(AtomicBool::new(false));
			thread::Builder::new()
				.name("dummy_work_pump".to_string())
				.spawn(move || {
					run_dummy_work_pump(pump_server, tracker, pump_pool, pump_stop)
				})?;
		}

		if config.api_server.enabled {
			let addr: SocketAddr = format!("{}:{}", config.api_server.host, config.api_server.port)
				.parse()
				.map_err(|e| {
					Error::IO(std::io::Error::new(
						std::io::ErrorKind::InvalidInput,
						format!("bad api address: {}", e),
					))
				})?;
			runtime.block_on(run_api_server(
				addr,
				config.api_server.path.clone(),
				handler,
			))?;
		} else {
			// stratum only, keep the main thread parked
			loop {
				thread::park();
			}
		}

		Ok(())
	}
}
