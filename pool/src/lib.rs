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

//! The PoW work pool: a persistent, concurrently-accessed queue of
//! outstanding work items with dispatch accounting, expiry and
//! epoch-window tracking, plus the verification pipeline every submitted
//! solution runs through.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod pool;
pub mod settings;
pub mod store;
pub mod types;

pub use crate::pool::WorkPool;
pub use crate::settings::SettingsCache;
pub use crate::store::PoolStore;
pub use crate::types::{
	valid_worker_name, HashRate, Miner, MiningConfig, NodeKey, PowResult, PowWindow, PowWork,
	SiteSettings, SubmitError, Worker, WorkPublisher, DEFAULT_WORKER_NAME,
};
