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

//! Read-through cache over the store-backed dispatch policy. One
//! mutex-protected cell holding `(settings, expires_at)`; the dispatcher
//! reads through it on every poll so operator changes land within a
//! second, without a per-request store hit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::PoolStore;
use crate::types::SiteSettings;
use zilproxy_util::Mutex;

const SETTINGS_TTL: Duration = Duration::from_secs(1);

/// Cached accessor for the site-adjustable dispatch policy.
pub struct SettingsCache {
	store: Arc<PoolStore>,
	cell: Mutex<(SiteSettings, Instant)>,
}

impl SettingsCache {
	/// Build the cache, seeding the store with the config defaults when no
	/// operator-saved policy exists yet.
	pub fn new(store: Arc<PoolStore>, defaults: SiteSettings) -> SettingsCache {
		let current = match store.get_settings() {
			Ok(Some(saved)) => saved,
			Ok(None) => {
				if let Err(e) = store.save_settings(&defaults) {
					warn!("failed to seed site settings: {}", e);
				}
				defaults
			}
			Err(e) => {
				warn!("failed to read site settings: {}", e);
				defaults
			}
		};
		SettingsCache {
			store,
			cell: Mutex::new((current, Instant::now())),
		}
	}

	/// Current dispatch policy, at most one second stale.
	pub fn get(&self) -> SiteSettings {
		let mut cell = self.cell.lock();
		if cell.1.elapsed() >= SETTINGS_TTL {
			match self.store.get_settings() {
				Ok(Some(fresh)) => cell.0 = fresh,
				Ok(None) => (),
				Err(e) => warn!("failed to refresh site settings: {}", e),
			}
			cell.1 = Instant::now();
		}
		cell.0.clone()
	}

	/// Persist a new policy and refresh the cell immediately.
	pub fn update(&self, settings: SiteSettings) -> bool {
		match self.store.save_settings(&settings) {
			Ok(()) => {
				let mut cell = self.cell.lock();
				*cell = (settings, Instant::now());
				true
			}
			Err(e) => {
				warn!("failed to save site settings: {}", e);
				false
			}
		}
	}
}
