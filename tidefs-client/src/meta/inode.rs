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

use crate::meta::MetaClient;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidefs_common::state::{Ino, InodeAttr};
use tidefs_common::FsResult;
use tokio::sync::{Mutex, MutexGuard};

/// Client-side mutable representation of one remote inode.
///
/// The attribute lock is the per-inode exclusive lock: foreground mutation
/// and background flush of the same inode serialize on it, and the flush
/// task holds it across the remote synchronization call so it can never
/// push torn state. Unrelated inodes proceed independently.
pub struct InodeHandle {
    ino: Ino,
    dirty: AtomicBool,
    attr: Mutex<InodeAttr>,
}

impl InodeHandle {
    pub fn new(attr: InodeAttr) -> Self {
        Self {
            ino: attr.ino,
            dirty: AtomicBool::new(false),
            attr: Mutex::new(attr),
        }
    }

    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Acquire the exclusive attribute lock.
    pub async fn attr(&self) -> MutexGuard<'_, InodeAttr> {
        self.attr.lock().await
    }

    pub async fn snapshot(&self) -> InodeAttr {
        self.attr.lock().await.clone()
    }
}

/// Arena of shared inode handles, one per inode id. The manager owns the
/// handles; the defer-sync registry and pending queue hold `Arc` clones and
/// never assume exclusive ownership.
pub struct InodeManager<C> {
    meta: Arc<C>,
    handles: DashMap<Ino, Arc<InodeHandle>>,
}

impl<C: MetaClient> InodeManager<C> {
    pub fn new(meta: Arc<C>) -> Self {
        Self {
            meta,
            handles: DashMap::new(),
        }
    }

    /// Handle for `ino`, fetching attributes from the metadata service on a
    /// first access.
    pub async fn get_handle(&self, ino: Ino) -> FsResult<Arc<InodeHandle>> {
        if let Some(handle) = self.handles.get(&ino) {
            return Ok(handle.clone());
        }

        let attr = self.meta.get_attr(ino).await?;
        let handle = self
            .handles
            .entry(ino)
            .or_insert_with(|| Arc::new(InodeHandle::new(attr)))
            .clone();
        Ok(handle)
    }

    /// Handle from already-known attributes; an existing handle wins so that
    /// all holders keep sharing one lock.
    pub fn bind(&self, attr: InodeAttr) -> Arc<InodeHandle> {
        self.handles
            .entry(attr.ino)
            .or_insert_with(|| Arc::new(InodeHandle::new(attr)))
            .clone()
    }

    pub fn peek(&self, ino: Ino) -> Option<Arc<InodeHandle>> {
        self.handles.get(&ino).map(|h| h.clone())
    }

    pub fn evict(&self, ino: Ino) -> Option<Arc<InodeHandle>> {
        self.handles.remove(&ino).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
