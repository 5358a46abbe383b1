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

mod inode_attr;
pub use self::inode_attr::InodeAttr;

mod opts;
pub use self::opts::SetAttrOpts;

use serde::{Deserialize, Serialize};

/// Inode identifier assigned by the metadata service.
pub type Ino = u64;

/// The root directory has a fixed, well-known id.
pub const ROOT_INO: Ino = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FileType {
    #[default]
    File,
    Directory,
    Symlink,
}

/// One directory listing record: (parent, name) -> inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: Ino,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, ino: Ino, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            ino,
            file_type,
        }
    }
}

/// Path resolution result; transient, never cached as a unit.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub ino: Ino,
    pub attr: InodeAttr,
}

impl Entry {
    pub fn new(ino: Ino, attr: InodeAttr) -> Self {
        Self { ino, attr }
    }
}
