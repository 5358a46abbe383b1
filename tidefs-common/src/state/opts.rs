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

use crate::state::InodeAttr;

/// Attribute mutation request; only the set fields are applied.
#[derive(Debug, Clone, Default)]
pub struct SetAttrOpts {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub len: Option<u64>,
    pub atime: Option<u64>,
    pub mtime: Option<u64>,
}

impl SetAttrOpts {
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode: Some(mode & 0o7777),
            ..Default::default()
        }
    }

    pub fn with_owner(uid: u32, gid: u32) -> Self {
        Self {
            uid: Some(uid),
            gid: Some(gid),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.len.is_none()
            && self.atime.is_none()
            && self.mtime.is_none()
    }

    /// Apply this mutation to an attribute snapshot and bump ctime.
    pub fn apply(&self, attr: &mut InodeAttr) {
        if let Some(mode) = self.mode {
            attr.mode = mode & 0o7777;
        }
        if let Some(uid) = self.uid {
            attr.uid = uid;
        }
        if let Some(gid) = self.gid {
            attr.gid = gid;
        }
        if let Some(len) = self.len {
            attr.len = len;
        }
        if let Some(atime) = self.atime {
            attr.atime = atime;
        }
        if let Some(mtime) = self.mtime {
            attr.mtime = mtime;
        }
        attr.ctime = crate::utils::LocalTime::mills();
    }
}
