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

use crate::state::{FileType, Ino};
use crate::utils::LocalTime;

/// Attribute snapshot of one inode. This is a plain value: the mutable,
/// lock-guarded representation lives in the client's inode handle, and
/// permission checks and caches only ever see clones of this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InodeAttr {
    pub ino: Ino,
    pub file_type: FileType,
    /// Permission and special bits only (0o7777 space), no type bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub len: u64,
    pub nlink: u32,
    /// Unix millis.
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    /// Symlink target, set iff `file_type == Symlink`.
    pub link: Option<String>,
    /// An inode can be reachable from several directories via hard links.
    pub parents: Vec<Ino>,
}

impl InodeAttr {
    pub fn with_type(ino: Ino, file_type: FileType, mode: u32, uid: u32, gid: u32) -> Self {
        let now = LocalTime::mills();
        Self {
            ino,
            file_type,
            mode,
            uid,
            gid,
            len: 0,
            nlink: if file_type == FileType::Directory { 2 } else { 1 },
            atime: now,
            mtime: now,
            ctime: now,
            link: None,
            parents: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    /// Refresh modify/change time to now.
    pub fn touch_mc_time(&mut self) {
        let now = LocalTime::mills();
        self.mtime = now;
        self.ctime = now;
    }
}
