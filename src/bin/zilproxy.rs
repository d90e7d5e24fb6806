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

//! Main entry point for the proxy executable: parse arguments, load the
//! config, fire up logging and hand over to the server.

#[macro_use]
extern crate log;

use clap::{App, Arg};
use std::process::exit;

use zilproxy_config::initial_setup;
use zilproxy_servers::Server;
use zilproxy_util::init_logger;

fn main() {
	let args = App::new("zilproxy")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Zilproxy Developers")
		.about("Mining proxy between Zilliqa nodes and an Ethash GPU fleet")
		.arg(
			Arg::with_name("config")
				.short("c")
				.long("config")
				.help("Path to the configuration file")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("port")
				.short("p")
				.long("port")
				.help("Override the API server port")
				.takes_value(true),
		)
		.get_matches();

	let mut config = match initial_setup(args.value_of("config")) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Failed to load configuration: {}", e);
			exit(1);
		}
	};
	if let Some(port) = args.value_of("port") {
		match port.parse::<u16>() {
			Ok(port) => config.server.api_server.port = port,
			Err(_) => {
				eprintln!("Invalid port: {}", port);
				exit(1);
			}
		}
	}

	init_logger(Some(config.logging.clone().unwrap_or_default()));
	if let Some(path) = &config.config_file_path {
		info!("using configuration file at {}", path.display());
	} else {
		info!("no configuration file found, using defaults");
	}

	ctrlc::set_handler(move || {
		warn!("shutdown signal received, stopping");
		exit(0);
	})
	.expect("Error setting Ctrl-C handler");

	if let Err(e) = Server::start(config.server) {
		error!("server failed: {:?}", e);
		exit(1);
	}
}
