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

use tidefs_common::state::{DirEntry, Ino, InodeAttr};
use tidefs_common::FsResult;

/// Metadata service boundary. `FsError::NotFound` is a normal negative
/// outcome for lookups, not a transport fault; implementations must not
/// collapse it into a generic error.
#[trait_variant::make(Send)]
pub trait MetaClient: Send + Sync + 'static {
    /// Create a (parent, name) entry from an attribute template; the service
    /// assigns the inode id and returns the full attributes.
    async fn create_entry(&self, parent: Ino, name: &str, attr: &InodeAttr) -> FsResult<InodeAttr>;

    async fn delete_entry(&self, parent: Ino, name: &str) -> FsResult<()>;

    async fn lookup_entry(&self, parent: Ino, name: &str) -> FsResult<InodeAttr>;

    async fn get_attr(&self, ino: Ino) -> FsResult<InodeAttr>;

    /// Push a full attribute snapshot of `ino` to the metadata service.
    async fn sync_attr(&self, ino: Ino, attr: &InodeAttr) -> FsResult<()>;

    /// Opaque rename operator; the multi-partition transaction protocol is
    /// the implementation's business.
    async fn rename(&self, parent: Ino, name: &str, new_parent: Ino, new_name: &str)
        -> FsResult<()>;

    async fn read_link(&self, ino: Ino) -> FsResult<String>;

    /// List a directory; `limit == 0` means unlimited.
    async fn list_entries(&self, ino: Ino, limit: usize) -> FsResult<Vec<DirEntry>>;
}

/// Data service boundary; block/chunk layout is behind this trait.
#[trait_variant::make(Send)]
pub trait DataClient: Send + Sync + 'static {
    async fn read(&self, ino: Ino, offset: u64, buf: &mut [u8]) -> FsResult<usize>;

    async fn write(&self, ino: Ino, offset: u64, data: &[u8]) -> FsResult<usize>;

    async fn flush(&self, ino: Ino) -> FsResult<()>;
}
