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

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tidefs_common::state::{DirEntry, Ino};
use tidefs_common::{FsError, FsResult};

/// Open-file state: inode binding plus the descriptor offset. Concurrent
/// seeks race by design, last write wins, same as sharing a descriptor
/// between threads on a local kernel.
#[derive(Debug)]
pub struct FileHandler {
    pub fh: u64,
    pub ino: Ino,
    offset: AtomicU64,
}

impl FileHandler {
    pub fn new(fh: u64, ino: Ino) -> Self {
        Self {
            fh,
            ino,
            offset: AtomicU64::new(0),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::Release);
    }

    pub fn advance(&self, n: u64) -> u64 {
        self.offset.fetch_add(n, Ordering::AcqRel) + n
    }
}

/// Table of open file descriptors. Ids are process-unique and never reused
/// within a session.
pub struct FileHandlers {
    handlers: DashMap<u64, Arc<FileHandler>>,
    fh_creator: AtomicU64,
}

impl FileHandlers {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            fh_creator: AtomicU64::new(1),
        }
    }

    pub fn next_handler(&self, ino: Ino) -> Arc<FileHandler> {
        let fh = self.fh_creator.fetch_add(1, Ordering::SeqCst);
        let handler = Arc::new(FileHandler::new(fh, ino));
        self.handlers.insert(fh, handler.clone());
        handler
    }

    pub fn get_handler(&self, fh: u64) -> FsResult<Arc<FileHandler>> {
        match self.handlers.get(&fh) {
            Some(v) => Ok(v.clone()),
            None => Err(FsError::BadDescriptor(fh)),
        }
    }

    pub fn free_handler(&self, fh: u64) -> Option<Arc<FileHandler>> {
        self.handlers.remove(&fh).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for FileHandlers {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory read cursor over a listing snapshot taken at open time.
/// Entries created or removed after the open are not reflected.
#[derive(Debug)]
pub struct DirStream {
    pub fh: u64,
    pub ino: Ino,
    entries: Vec<DirEntry>,
    cursor: AtomicU64,
}

impl DirStream {
    pub fn new(fh: u64, ino: Ino, entries: Vec<DirEntry>) -> Self {
        Self {
            fh,
            ino,
            entries,
            cursor: AtomicU64::new(0),
        }
    }

    /// Next entry of the snapshot, `EndOfStream` past the last one.
    pub fn next_entry(&self) -> FsResult<DirEntry> {
        let pos = self.cursor.fetch_add(1, Ordering::SeqCst) as usize;
        match self.entries.get(pos) {
            Some(v) => Ok(v.clone()),
            None => Err(FsError::EndOfStream),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Table of open directory streams. Directory descriptors have their own
/// id space; a dir fh and a file fh may carry the same number.
pub struct DirHandles {
    handles: DashMap<u64, Arc<DirStream>>,
    fh_creator: AtomicU64,
}

impl DirHandles {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            fh_creator: AtomicU64::new(1),
        }
    }

    pub fn next_handle(&self, ino: Ino, entries: Vec<DirEntry>) -> Arc<DirStream> {
        let fh = self.fh_creator.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::new(DirStream::new(fh, ino, entries));
        self.handles.insert(fh, stream.clone());
        stream
    }

    pub fn get_handle(&self, fh: u64) -> FsResult<Arc<DirStream>> {
        match self.handles.get(&fh) {
            Some(v) => Ok(v.clone()),
            None => Err(FsError::BadDescriptor(fh)),
        }
    }

    pub fn free_handle(&self, fh: u64) -> Option<Arc<DirStream>> {
        self.handles.remove(&fh).map(|(_, v)| v)
    }
}

impl Default for DirHandles {
    fn default() -> Self {
        Self::new()
    }
}
