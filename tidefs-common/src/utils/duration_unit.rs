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

use crate::{FsError, FsResult};
use std::time::Duration;

/// Human-readable duration strings used throughout the configuration,
/// e.g. "500ms", "3s", "10m", "6h".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationUnit {
    millis: u64,
}

impl DurationUnit {
    pub fn from_str(value: &str) -> FsResult<Self> {
        let value = value.trim();
        let split = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (num, unit) = value.split_at(split);

        let num: u64 = num
            .parse()
            .map_err(|_| FsError::InvalidArgument(format!("invalid duration: {}", value)))?;

        let millis = match unit.trim() {
            "ms" => num,
            "" | "s" => num * 1000,
            "m" => num * 60 * 1000,
            "h" => num * 60 * 60 * 1000,
            "d" => num * 24 * 60 * 60 * 1000,
            _ => return Err(FsError::InvalidArgument(format!("invalid duration: {}", value))),
        };

        Ok(Self { millis })
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}
