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

//! In-memory metadata and data services backing the unit tests.

use crate::meta::{DataClient, MetaClient};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tidefs_common::state::{DirEntry, FileType, Ino, InodeAttr, ROOT_INO};
use tidefs_common::utils::FastHashMap;
use tidefs_common::{err_box, FsError, FsResult};

struct Node {
    attr: InodeAttr,
    children: FastHashMap<String, Ino>,
}

struct Namespace {
    nodes: FastHashMap<Ino, Node>,
    fail_sync: bool,
    fail_sync_inos: HashSet<Ino>,
}

/// A metadata service held entirely in process memory. Not a fixture for
/// performance; it exists so the client layers can be tested without a
/// cluster.
pub struct MemoryMetaClient {
    state: Mutex<Namespace>,
    next_ino: AtomicU64,
    sync_calls: AtomicUsize,
}

impl MemoryMetaClient {
    pub fn new() -> Self {
        let mut nodes = FastHashMap::default();
        let root = InodeAttr::with_type(ROOT_INO, FileType::Directory, 0o755, 0, 0);
        nodes.insert(
            ROOT_INO,
            Node {
                attr: root,
                children: FastHashMap::default(),
            },
        );

        Self {
            state: Mutex::new(Namespace {
                nodes,
                fail_sync: false,
                fail_sync_inos: HashSet::new(),
            }),
            next_ino: AtomicU64::new(ROOT_INO + 1),
            sync_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_node(
        &self,
        parent: Ino,
        name: &str,
        file_type: FileType,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Ino {
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        let mut attr = InodeAttr::with_type(ino, file_type, mode, uid, gid);
        attr.parents.push(parent);

        let mut state = self.state.lock().unwrap();
        state.nodes.insert(
            ino,
            Node {
                attr,
                children: FastHashMap::default(),
            },
        );
        let dir = state.nodes.get_mut(&parent).unwrap();
        dir.children.insert(name.to_string(), ino);
        ino
    }

    pub fn set_link(&self, ino: Ino, target: &str) {
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(&ino).unwrap();
        node.attr.link = Some(target.to_string());
    }

    /// Make every `sync_attr` fail until toggled back off.
    pub fn fail_sync(&self, fail: bool) {
        self.state.lock().unwrap().fail_sync = fail;
    }

    /// Make `sync_attr` fail for one inode only.
    pub fn fail_sync_ino(&self, ino: Ino) {
        self.state.lock().unwrap().fail_sync_inos.insert(ino);
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    /// Non-async attribute read for assertions.
    pub fn get_attr_sync(&self, ino: Ino) -> Option<InodeAttr> {
        let state = self.state.lock().unwrap();
        state.nodes.get(&ino).map(|v| v.attr.clone())
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }
}

impl Default for MemoryMetaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaClient for MemoryMetaClient {
    async fn create_entry(&self, parent: Ino, name: &str, attr: &InodeAttr) -> FsResult<InodeAttr> {
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        let dir = match state.nodes.get_mut(&parent) {
            Some(v) => v,
            None => return err_box!("parent {} not found", parent),
        };
        if dir.children.contains_key(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        dir.children.insert(name.to_string(), ino);

        let mut attr = attr.clone();
        attr.ino = ino;
        attr.parents = vec![parent];
        state.nodes.insert(
            ino,
            Node {
                attr: attr.clone(),
                children: FastHashMap::default(),
            },
        );
        Ok(attr)
    }

    async fn delete_entry(&self, parent: Ino, name: &str) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        let dir = match state.nodes.get_mut(&parent) {
            Some(v) => v,
            None => return err_box!("parent {} not found", parent),
        };
        let ino = match dir.children.remove(name) {
            Some(v) => v,
            None => return Err(FsError::not_found(name)),
        };
        let node = state.nodes.get_mut(&ino).unwrap();
        node.attr.nlink = node.attr.nlink.saturating_sub(1);
        node.attr.parents.retain(|v| *v != parent);
        if node.attr.nlink == 0 {
            state.nodes.remove(&ino);
        }
        Ok(())
    }

    async fn lookup_entry(&self, parent: Ino, name: &str) -> FsResult<InodeAttr> {
        let state = self.state.lock().unwrap();
        let dir = match state.nodes.get(&parent) {
            Some(v) => v,
            None => return Err(FsError::not_found(parent.to_string())),
        };
        let ino = match dir.children.get(name) {
            Some(v) => *v,
            None => return Err(FsError::not_found(name)),
        };
        Ok(state.nodes.get(&ino).unwrap().attr.clone())
    }

    async fn get_attr(&self, ino: Ino) -> FsResult<InodeAttr> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(&ino) {
            Some(v) => Ok(v.attr.clone()),
            None => Err(FsError::not_found(ino.to_string())),
        }
    }

    async fn sync_attr(&self, ino: Ino, attr: &InodeAttr) -> FsResult<()> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_sync || state.fail_sync_inos.contains(&ino) {
            return err_box!("injected sync failure for ino {}", ino);
        }
        match state.nodes.get_mut(&ino) {
            Some(v) => {
                v.attr = attr.clone();
                Ok(())
            }
            None => Err(FsError::not_found(ino.to_string())),
        }
    }

    async fn rename(
        &self,
        parent: Ino,
        name: &str,
        new_parent: Ino,
        new_name: &str,
    ) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        let ino = {
            let dir = match state.nodes.get_mut(&parent) {
                Some(v) => v,
                None => return Err(FsError::not_found(parent.to_string())),
            };
            match dir.children.remove(name) {
                Some(v) => v,
                None => return Err(FsError::not_found(name)),
            }
        };

        if let Some(dest) = state.nodes.get_mut(&new_parent) {
            // Rename over an existing name replaces it.
            dest.children.insert(new_name.to_string(), ino);
        } else {
            return Err(FsError::not_found(new_parent.to_string()));
        }

        let node = state.nodes.get_mut(&ino).unwrap();
        node.attr.parents.retain(|v| *v != parent);
        node.attr.parents.push(new_parent);
        Ok(())
    }

    async fn read_link(&self, ino: Ino) -> FsResult<String> {
        let state = self.state.lock().unwrap();
        let node = match state.nodes.get(&ino) {
            Some(v) => v,
            None => return Err(FsError::not_found(ino.to_string())),
        };
        match &node.attr.link {
            Some(v) => Ok(v.clone()),
            None => Err(FsError::InvalidArgument(format!("ino {} is not a symlink", ino))),
        }
    }

    async fn list_entries(&self, ino: Ino, limit: usize) -> FsResult<Vec<DirEntry>> {
        let state = self.state.lock().unwrap();
        let dir = match state.nodes.get(&ino) {
            Some(v) => v,
            None => return Err(FsError::not_found(ino.to_string())),
        };
        if !dir.attr.is_dir() {
            return Err(FsError::NotADirectory(ino.to_string()));
        }

        let mut entries = Vec::new();
        for (name, child) in &dir.children {
            if limit > 0 && entries.len() >= limit {
                break;
            }
            let file_type = state.nodes.get(child).unwrap().attr.file_type;
            entries.push(DirEntry::new(name, *child, file_type));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Byte store keyed by inode id, good enough to exercise descriptor
/// plumbing and offset arithmetic.
pub struct MemoryDataClient {
    blocks: Mutex<FastHashMap<Ino, Vec<u8>>>,
    flush_calls: AtomicUsize,
}

impl MemoryDataClient {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(FastHashMap::default()),
            flush_calls: AtomicUsize::new(0),
        }
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryDataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DataClient for MemoryDataClient {
    async fn read(&self, ino: Ino, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let blocks = self.blocks.lock().unwrap();
        let data = match blocks.get(&ino) {
            Some(v) => v,
            None => return Ok(0),
        };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let len = buf.len().min(data.len() - offset);
        buf[..len].copy_from_slice(&data[offset..offset + len]);
        Ok(len)
    }

    async fn write(&self, ino: Ino, offset: u64, buf: &[u8]) -> FsResult<usize> {
        let mut blocks = self.blocks.lock().unwrap();
        let data = blocks.entry(ino).or_default();
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&self, _ino: Ino) -> FsResult<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
