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

use tidefs_common::state::InodeAttr;
use tidefs_common::{FsError, FsResult};

pub const WANT_READ: u32 = 0o4;
pub const WANT_WRITE: u32 = 0o2;
pub const WANT_EXEC: u32 = 0o1;

/// Caller identity for permission checks.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
    pub umask: u32,
    pub check: bool,
}

impl AccessContext {
    pub fn new(uid: u32, gids: Vec<u32>, umask: u32) -> Self {
        // An empty group set still yields a primary gid for new inodes.
        let gid = gids.first().copied().unwrap_or(0);
        Self {
            uid,
            gid,
            gids,
            umask,
            check: true,
        }
    }

    /// Identity that bypasses all checks; ownership is still recorded.
    pub fn disabled(uid: u32, gids: Vec<u32>, umask: u32) -> Self {
        let mut ctx = Self::new(uid, gids, umask);
        ctx.check = false;
        ctx
    }

    pub fn in_group(&self, gid: u32) -> bool {
        self.gids.iter().any(|v| *v == gid)
    }
}

/// Classic mode-bit evaluator. Exactly one bit triplet applies per check:
/// owner if uid matches, else group if any supplementary gid matches, else
/// other. A group member is never granted through the other bits.
pub struct Permission {
    ctx: AccessContext,
}

impl Permission {
    pub fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    pub fn ctx(&self) -> &AccessContext {
        &self.ctx
    }

    pub fn uid(&self) -> u32 {
        self.ctx.uid
    }

    pub fn gid(&self) -> u32 {
        self.ctx.gid
    }

    /// Check `want` bits against `attr`. Root and a disabled checker pass
    /// unconditionally.
    pub fn check(&self, attr: &InodeAttr, want: u32) -> FsResult<()> {
        if !self.ctx.check || self.ctx.uid == 0 {
            return Ok(());
        }

        let mode = attr.mode;
        let perm = if self.ctx.uid == attr.uid {
            (mode >> 6) & 0o7
        } else if self.ctx.in_group(attr.gid) {
            (mode >> 3) & 0o7
        } else {
            mode & 0o7
        };

        if perm & want == want {
            Ok(())
        } else {
            Err(FsError::NoPermission(format!(
                "uid {} wants {:o} on ino {} mode {:o}",
                self.ctx.uid, want, attr.ino, mode
            )))
        }
    }

    /// Apply the process umask to a creation mode.
    pub fn filter_mode(&self, mode: u32) -> u32 {
        mode & !self.ctx.umask & 0o7777
    }
}
