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

use linked_hash_map::LinkedHashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tidefs_common::state::{Ino, InodeAttr};

struct CacheValue<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded cache with per-entry TTL and LRU eviction.
///
/// Expiry is lazy: an expired entry is dropped when a read touches it, and
/// capacity pressure evicts from the cold end of the access order. A miss
/// is never cached, so absence of a key says nothing about the namespace.
pub struct TtlCache<K, V> {
    map: Mutex<LinkedHashMap<K, CacheValue<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            map: Mutex::new(LinkedHashMap::new()),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = self.map.lock().unwrap();
        match map.get_refresh(key) {
            Some(v) if v.expires_at > Instant::now() => Some(v.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut map = self.map.lock().unwrap();
        map.insert(
            key,
            CacheValue {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        while map.len() > self.capacity {
            map.pop_front();
        }
    }

    /// Drop `key` if present; removing an absent key is a no-op.
    pub fn remove(&self, key: &K) {
        let mut map = self.map.lock().unwrap();
        map.remove(key);
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.map.lock().unwrap().clear();
    }
}

/// (parent, name) -> inode id. Only positive lookups are stored.
pub struct EntryCache {
    cache: TtlCache<(Ino, String), Ino>,
}

impl EntryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(capacity, ttl),
        }
    }

    pub fn get(&self, parent: Ino, name: &str) -> Option<Ino> {
        self.cache.get(&(parent, name.to_string()))
    }

    pub fn put(&self, parent: Ino, name: &str, ino: Ino) {
        self.cache.put((parent, name.to_string()), ino)
    }

    pub fn remove(&self, parent: Ino, name: &str) {
        self.cache.remove(&(parent, name.to_string()))
    }
}

/// inode id -> attributes. Readers must consult the defer-sync registry
/// before this cache; a deferred local mutation is always newer.
pub struct AttrCache {
    cache: TtlCache<Ino, InodeAttr>,
}

impl AttrCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(capacity, ttl),
        }
    }

    pub fn get(&self, ino: Ino) -> Option<InodeAttr> {
        self.cache.get(&ino)
    }

    pub fn put(&self, attr: InodeAttr) {
        self.cache.put(attr.ino, attr)
    }

    pub fn remove(&self, ino: Ino) {
        self.cache.remove(&ino)
    }
}
