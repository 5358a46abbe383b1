// Copyright 2025 TideFS Authors.
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

use crate::utils::DurationUnit;
use crate::FsResult;
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client semantics-layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConf {
    // (parent, name) -> ino cache capacity.
    pub entry_cache_size: usize,
    #[serde(skip)]
    pub entry_cache_ttl: Duration,
    #[serde(alias = "entry_cache_ttl")]
    pub entry_cache_ttl_str: String,

    // ino -> attribute cache capacity.
    pub attr_cache_size: usize,
    #[serde(skip)]
    pub attr_cache_ttl: Duration,
    #[serde(alias = "attr_cache_ttl")]
    pub attr_cache_ttl_str: String,

    // Interval between background flush cycles of deferred inode mutations.
    #[serde(skip)]
    pub defer_sync_delay: Duration,
    #[serde(alias = "defer_sync_delay")]
    pub defer_sync_delay_str: String,

    // Defer parent-directory mtime/nlink write-back instead of syncing inline.
    pub defer_dir_mtime: bool,

    pub max_name_length: usize,

    // Listing cap used for the rmdir empty-directory check.
    pub list_entry_limit: usize,

    pub check_permission: bool,

    // Directory summary accounting lives outside this layer; the flag is
    // consumed here so callers can wire it through one config struct.
    pub enable_dir_summary: bool,
}

impl ClientConf {
    pub fn init(&mut self) -> FsResult<()> {
        self.entry_cache_ttl = DurationUnit::from_str(&self.entry_cache_ttl_str)?.as_duration();
        self.attr_cache_ttl = DurationUnit::from_str(&self.attr_cache_ttl_str)?.as_duration();
        self.defer_sync_delay = DurationUnit::from_str(&self.defer_sync_delay_str)?.as_duration();
        Ok(())
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> FsResult<Self> {
        info!("load client conf from {}", path.as_ref().display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> FsResult<Self> {
        let mut conf: ClientConf = toml::from_str(text)
            .map_err(|e| crate::FsError::InvalidArgument(format!("parse conf: {}", e)))?;
        conf.init()?;
        Ok(conf)
    }
}

impl Default for ClientConf {
    fn default() -> Self {
        Self {
            entry_cache_size: 65536,
            entry_cache_ttl: Default::default(),
            entry_cache_ttl_str: "1s".to_string(),

            attr_cache_size: 65536,
            attr_cache_ttl: Default::default(),
            attr_cache_ttl_str: "1s".to_string(),

            defer_sync_delay: Default::default(),
            defer_sync_delay_str: "3s".to_string(),

            defer_dir_mtime: false,
            max_name_length: 255,
            list_entry_limit: 100,
            check_permission: true,
            enable_dir_summary: false,
        }
    }
}
