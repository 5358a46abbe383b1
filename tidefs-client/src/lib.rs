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

//! Client semantics layer of a distributed POSIX filesystem: path
//! resolution over TTL caches, deferred metadata write-back, permission
//! enforcement, and file/directory handle tables. The wire-level metadata
//! and data planes stay behind the `MetaClient`/`DataClient` traits.

pub mod meta;
pub mod vfs;

/// Upper bound on chained symlink substitutions during one resolution;
/// terminates cyclic link chains.
pub const MAX_SYMLINK_DEPTH: usize = 40;

pub use crate::vfs::TideFileSystem;
