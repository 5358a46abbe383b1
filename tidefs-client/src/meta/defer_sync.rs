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

use crate::meta::{InodeHandle, MetaClient};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tidefs_common::state::Ino;
use tidefs_common::utils::FastHashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Index of inodes with unflushed local mutations.
///
/// Insertion of an already-present id replaces the stored reference
/// unconditionally; no staleness comparison is made between the old and new
/// handles, so the latest push always wins.
pub struct DeferInodes {
    inodes: RwLock<FastHashMap<Ino, Arc<InodeHandle>>>,
}

impl DeferInodes {
    pub fn new() -> Self {
        Self {
            inodes: RwLock::new(FastHashMap::default()),
        }
    }

    pub fn add(&self, handle: Arc<InodeHandle>) {
        let mut map = self.inodes.write().unwrap();
        map.insert(handle.ino(), handle);
    }

    pub fn get(&self, ino: Ino) -> Option<Arc<InodeHandle>> {
        let map = self.inodes.read().unwrap();
        map.get(&ino).cloned()
    }

    /// Remove `ino`; absent ids are a normal negative result.
    pub fn remove(&self, ino: Ino) -> bool {
        let mut map = self.inodes.write().unwrap();
        map.remove(&ino).is_some()
    }

    /// Remove `ino` only while it still maps to this exact handle; a
    /// replacement by a newer push is left alone.
    pub fn remove_same(&self, ino: Ino, handle: &Arc<InodeHandle>) -> bool {
        let mut map = self.inodes.write().unwrap();
        match map.get(&ino) {
            Some(v) if Arc::ptr_eq(v, handle) => {
                map.remove(&ino);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inodes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeferInodes {
    fn default() -> Self {
        Self::new()
    }
}

struct SyncTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background coalescing writer for deferred inode mutations.
///
/// Foreground operations mutate an inode handle under its attribute lock,
/// mark it dirty and `push` it; the background task periodically swaps the
/// pending queue and flushes each handle to the metadata service. Pushing
/// while still holding the handle's attribute lock keeps the registry
/// invariant exact: an id is registered iff an unflushed mutation is
/// outstanding.
///
/// Lock order: per-inode attribute lock, then registry/queue locks. The
/// registry and queue locks are never held across a remote call.
pub struct DeferSync<C> {
    delay: Duration,
    meta: Arc<C>,
    inodes: Arc<DeferInodes>,
    pending: Arc<Mutex<Vec<Arc<InodeHandle>>>>,
    task: Mutex<Option<SyncTask>>,
}

impl<C: MetaClient> DeferSync<C> {
    pub fn new(meta: Arc<C>, delay: Duration) -> Self {
        Self {
            delay,
            meta,
            inodes: Arc::new(DeferInodes::new()),
            pending: Arc::new(Mutex::new(Vec::new())),
            task: Mutex::new(None),
        }
    }

    /// Register a dirty handle and queue it for the next flush cycle.
    /// Repeated pushes of one inode between cycles collapse to a single
    /// remote synchronization of its latest state.
    pub fn push(&self, handle: &Arc<InodeHandle>) {
        self.inodes.add(handle.clone());
        self.pending.lock().unwrap().push(handle.clone());
    }

    /// Observe an in-flight deferred mutation before it reaches the metadata
    /// service; attribute readers consult this first so they are never staler
    /// than the last local write.
    pub fn is_deferred(&self, ino: Ino) -> Option<Arc<InodeHandle>> {
        self.inodes.get(ino)
    }

    pub fn registry(&self) -> &DeferInodes {
        &self.inodes
    }

    /// Launch the background flush task; calling again while running is a
    /// no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::sync_task(
            self.meta.clone(),
            self.inodes.clone(),
            self.pending.clone(),
            self.delay,
            token.clone(),
        ));

        *task = Some(SyncTask { token, handle });
        info!("defer sync task started, delay {:?}", self.delay);
    }

    /// Signal the task, wait for the final drain and for the task to exit.
    /// Safe to call without a prior `start` and safe to call twice.
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap().take();
        let task = match task {
            Some(v) => v,
            None => return,
        };

        info!("stop defer sync task...");
        task.token.cancel();
        if let Err(e) = task.handle.await {
            warn!("defer sync task join failed: {}", e);
        }
        info!("defer sync task stopped");
    }

    async fn sync_task(
        meta: Arc<C>,
        inodes: Arc<DeferInodes>,
        pending: Arc<Mutex<Vec<Arc<InodeHandle>>>>,
        delay: Duration,
        token: CancellationToken,
    ) {
        loop {
            let cancelled = tokio::select! {
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };

            Self::flush_pending(&meta, &inodes, &pending).await;

            if cancelled {
                // Final drain: pushes that raced with cancellation are still
                // delivered before the task exits.
                Self::flush_pending(&meta, &inodes, &pending).await;
                return;
            }
        }
    }

    async fn flush_pending(
        meta: &C,
        inodes: &DeferInodes,
        pending: &Mutex<Vec<Arc<InodeHandle>>>,
    ) {
        // Swap so pushes arriving during the flush land in a fresh queue.
        let syncing = {
            let mut queue = pending.lock().unwrap();
            std::mem::take(&mut *queue)
        };

        let mut retry = Vec::new();
        for handle in syncing {
            let ino = handle.ino();
            let attr = handle.attr().await;
            if !handle.is_dirty() {
                // A queue entry whose state an earlier iteration already
                // flushed. Deregister it while the attribute lock still
                // blocks a concurrent re-dirtying push; a handle replaced
                // by a newer push stays registered.
                inodes.remove_same(ino, &handle);
                continue;
            }

            match meta.sync_attr(ino, &attr).await {
                Ok(()) => {
                    handle.clear_dirty();
                    inodes.remove(ino);
                    debug!("ino {} synced", ino);
                }
                Err(e) => {
                    warn!("defer sync ino {} failed, will retry: {}", ino, e);
                    drop(attr);
                    retry.push(handle);
                }
            }
        }

        if !retry.is_empty() {
            pending.lock().unwrap().extend(retry);
        }
    }
}
