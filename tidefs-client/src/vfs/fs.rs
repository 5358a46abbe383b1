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

use crate::meta::{DataClient, DeferSync, InodeManager, MetaClient};
use crate::vfs::cache::{AttrCache, EntryCache};
use crate::vfs::handle::{DirHandles, DirStream, FileHandler, FileHandlers};
use crate::vfs::permission::{AccessContext, Permission, WANT_EXEC, WANT_READ, WANT_WRITE};
use crate::MAX_SYMLINK_DEPTH;
use log::error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tidefs_common::conf::ClientConf;
use tidefs_common::fs::filepath;
use tidefs_common::state::{DirEntry, Entry, FileType, Ino, InodeAttr, SetAttrOpts, ROOT_INO};
use tidefs_common::{FsError, FsResult};

/// Path-keyed client surface over a remote metadata and data service.
///
/// Resolution consults the entry and attribute caches before going remote;
/// every mutation purges the records it invalidates after the remote call
/// succeeds. Attribute reads consult the defer-sync registry first, so a
/// caller never observes state staler than its own last local write.
pub struct TideFileSystem<C, D> {
    conf: ClientConf,
    meta: Arc<C>,
    data: Arc<D>,
    inodes: Arc<InodeManager<C>>,
    defer_sync: Arc<DeferSync<C>>,
    entry_cache: EntryCache,
    attr_cache: AttrCache,
    permission: Permission,
    handlers: FileHandlers,
    dir_handles: DirHandles,
}

impl<C: MetaClient, D: DataClient> TideFileSystem<C, D> {
    pub fn new(conf: ClientConf, ctx: AccessContext, meta: Arc<C>, data: Arc<D>) -> Self {
        let mut ctx = ctx;
        if !conf.check_permission {
            ctx.check = false;
        }

        Self {
            entry_cache: EntryCache::new(conf.entry_cache_size, conf.entry_cache_ttl),
            attr_cache: AttrCache::new(conf.attr_cache_size, conf.attr_cache_ttl),
            inodes: Arc::new(InodeManager::new(meta.clone())),
            defer_sync: Arc::new(DeferSync::new(meta.clone(), conf.defer_sync_delay)),
            permission: Permission::new(ctx),
            handlers: FileHandlers::new(),
            dir_handles: DirHandles::new(),
            meta,
            data,
            conf,
        }
    }

    /// Launch the background defer-sync task; idempotent.
    pub fn start(&self) {
        self.defer_sync.start();
    }

    /// Drain deferred mutations and stop the background task; idempotent.
    pub async fn stop(&self) {
        self.defer_sync.stop().await;
    }

    pub fn conf(&self) -> &ClientConf {
        &self.conf
    }

    // ------------------------------------------------------------------
    // Path resolution
    // ------------------------------------------------------------------

    /// Resolve an absolute path to an inode and attribute snapshot.
    /// `follow` controls whether a symlink in the final position is
    /// followed; intermediate symlinks always are.
    pub async fn lookup(&self, path: &str, follow: bool) -> FsResult<Entry> {
        self.lookup_inner(path, follow, 0).await
    }

    fn lookup_inner<'a>(
        &'a self,
        path: &'a str,
        follow: bool,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = FsResult<Entry>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_SYMLINK_DEPTH {
                return Err(FsError::LoopExists(path.to_string()));
            }

            let names = filepath::split(path);
            let mut cur = Entry::new(ROOT_INO, self.do_get_attr(ROOT_INO).await?);

            for (i, name) in names.iter().enumerate() {
                if !cur.attr.is_dir() {
                    return Err(FsError::NotADirectory(path.to_string()));
                }
                // Traversal permission on the directory we are about to
                // descend from; root itself is exempt.
                if i > 0 {
                    self.permission.check(&cur.attr, WANT_EXEC)?;
                }

                let entry = self.do_lookup(cur.ino, name).await?;
                let last = i == names.len() - 1;
                if entry.attr.is_symlink() && (!last || follow) {
                    let target = self.do_read_link(&entry).await?;
                    let base = if target.starts_with('/') {
                        target
                    } else if i == 0 {
                        filepath::join("/", &target)
                    } else {
                        filepath::join(&format!("/{}", names[..i].join("/")), &target)
                    };
                    let rest = names[i + 1..].join("/");
                    let full = if rest.is_empty() {
                        base
                    } else {
                        filepath::join(&base, &rest)
                    };
                    return self.lookup_inner(&full, follow, depth + 1).await;
                }

                cur = entry;
            }

            Ok(cur)
        })
    }

    /// (parent, name) -> Entry, through the entry cache. A remote hit
    /// populates both caches; a stale cached ino falls through to remote.
    async fn do_lookup(&self, parent: Ino, name: &str) -> FsResult<Entry> {
        self.check_name(name)?;

        if let Some(ino) = self.entry_cache.get(parent, name) {
            match self.do_get_attr(ino).await {
                Ok(attr) => return Ok(Entry::new(ino, attr)),
                Err(e) if e.is_not_found() => self.entry_cache.remove(parent, name),
                Err(e) => return Err(e),
            }
        }

        let attr = self.meta.lookup_entry(parent, name).await?;
        self.entry_cache.put(parent, name, attr.ino);
        self.attr_cache.put(attr.clone());
        Ok(Entry::new(attr.ino, attr))
    }

    /// Attribute read order: defer-sync registry, attribute cache, remote.
    async fn do_get_attr(&self, ino: Ino) -> FsResult<InodeAttr> {
        if let Some(handle) = self.defer_sync.is_deferred(ino) {
            return Ok(handle.snapshot().await);
        }
        if let Some(attr) = self.attr_cache.get(ino) {
            return Ok(attr);
        }

        let attr = self.meta.get_attr(ino).await?;
        self.attr_cache.put(attr.clone());
        Ok(attr)
    }

    async fn do_read_link(&self, entry: &Entry) -> FsResult<String> {
        match &entry.attr.link {
            Some(v) => Ok(v.clone()),
            None => self.meta.read_link(entry.ino).await,
        }
    }

    fn check_name(&self, name: &str) -> FsResult<()> {
        if name.len() > self.conf.max_name_length {
            Err(FsError::NameTooLong(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Refresh parent mtime/ctime after a child mutation; directory
    /// children also shift the parent's nlink. Deferred or synced inline
    /// per `defer_dir_mtime`. The push happens under the parent's
    /// attribute lock so the registry never holds a clean handle.
    async fn update_parent_mc_time(&self, parent: Ino, nlink_delta: i32) -> FsResult<()> {
        let handle = self.inodes.get_handle(parent).await?;
        {
            let mut attr = handle.attr().await;
            attr.touch_mc_time();
            if nlink_delta != 0 {
                attr.nlink = attr.nlink.saturating_add_signed(nlink_delta);
            }
            handle.mark_dirty();

            if self.conf.defer_dir_mtime {
                self.defer_sync.push(&handle);
            } else {
                self.meta.sync_attr(parent, &attr).await?;
                handle.clear_dirty();
            }
        }
        self.attr_cache.remove(parent);
        Ok(())
    }

    /// Forget all client-side state of a removed inode. Clearing the dirty
    /// flag makes any stale pending-queue entry a no-op at the next flush.
    fn forget(&self, ino: Ino) {
        self.attr_cache.remove(ino);
        if let Some(handle) = self.inodes.evict(ino) {
            handle.clear_dirty();
        }
        self.defer_sync.registry().remove(ino);
    }

    // ------------------------------------------------------------------
    // Namespace operations
    // ------------------------------------------------------------------

    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<InodeAttr> {
        if self.lookup(path, true).await.is_ok() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let parent = self.lookup(&filepath::parent_dir(path), true).await?;
        if !parent.attr.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.permission.check(&parent.attr, WANT_WRITE)?;

        let name = filepath::filename(path);
        self.check_name(&name)?;

        let template = InodeAttr::with_type(
            0,
            FileType::Directory,
            self.permission.filter_mode(mode),
            self.permission.uid(),
            self.permission.gid(),
        );
        let attr = self.meta.create_entry(parent.ino, &name, &template).await?;

        self.entry_cache.remove(parent.ino, &name);
        self.attr_cache.put(attr.clone());
        self.update_parent_mc_time(parent.ino, 1).await?;
        Ok(attr)
    }

    /// Create `path` and any missing ancestors. An already-existing
    /// intermediate is fine; an already-existing final component is
    /// reported as `AlreadyExists`, same as `mkdir`.
    pub fn mkdirs<'a>(
        &'a self,
        path: &'a str,
        mode: u32,
    ) -> Pin<Box<dyn Future<Output = FsResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if path == "/" {
                return Ok(());
            }

            let parent = filepath::parent_dir(path);
            match self.mkdirs(&parent, mode).await {
                Ok(()) => (),
                Err(FsError::AlreadyExists(_)) => (),
                Err(e) => return Err(e),
            }
            self.mkdir(path, mode).await.map(|_| ())
        })
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let parent = self.lookup(&filepath::parent_dir(path), true).await?;
        let entry = self.lookup(path, true).await?;
        if !entry.attr.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.permission.check(&parent.attr, WANT_WRITE)?;

        // Empty check before any remote delete is attempted.
        let children = self
            .meta
            .list_entries(entry.ino, self.conf.list_entry_limit)
            .await?;
        if !children.is_empty() {
            return Err(FsError::NotEmpty(path.to_string()));
        }

        let name = filepath::filename(path);
        self.meta.delete_entry(parent.ino, &name).await?;

        self.entry_cache.remove(parent.ino, &name);
        self.forget(entry.ino);
        self.update_parent_mc_time(parent.ino, -1).await?;
        Ok(())
    }

    /// Create a regular file. No existence pre-check: the metadata service
    /// reports `AlreadyExists` on a name collision.
    pub async fn create(&self, path: &str, mode: u32) -> FsResult<InodeAttr> {
        let parent = self.lookup(&filepath::parent_dir(path), true).await?;
        self.permission.check(&parent.attr, WANT_WRITE)?;

        let name = filepath::filename(path);
        self.check_name(&name)?;

        let template = InodeAttr::with_type(
            0,
            FileType::File,
            self.permission.filter_mode(mode),
            self.permission.uid(),
            self.permission.gid(),
        );
        let attr = self.meta.create_entry(parent.ino, &name, &template).await?;

        self.entry_cache.remove(parent.ino, &name);
        self.attr_cache.put(attr.clone());
        self.update_parent_mc_time(parent.ino, 0).await?;
        Ok(attr)
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let parent = self.lookup(&filepath::parent_dir(path), true).await?;
        self.permission.check(&parent.attr, WANT_WRITE)?;

        let entry = self.lookup(path, false).await?;
        if entry.attr.is_dir() {
            return Err(FsError::InvalidArgument(format!(
                "{} is a directory",
                path
            )));
        }

        let name = filepath::filename(path);
        self.meta.delete_entry(parent.ino, &name).await?;
        self.entry_cache.remove(parent.ino, &name);

        // Mirror the remote nlink decrement on a live local handle. The
        // push happens under the attribute lock, so a concurrent flush
        // cannot observe the mutation before it is registered.
        if let Some(handle) = self.inodes.peek(entry.ino) {
            let gone = {
                let mut attr = handle.attr().await;
                attr.nlink = attr.nlink.saturating_sub(1);
                attr.parents.retain(|v| *v != parent.ino);
                attr.ctime = tidefs_common::utils::LocalTime::mills();
                if attr.nlink > 0 {
                    handle.mark_dirty();
                    self.defer_sync.push(&handle);
                }
                attr.nlink == 0
            };
            if gone {
                self.forget(entry.ino);
            } else {
                self.attr_cache.remove(entry.ino);
            }
        } else {
            self.attr_cache.remove(entry.ino);
        }

        self.update_parent_mc_time(parent.ino, 0).await?;
        Ok(())
    }

    /// Rename through the metadata service's rename operator. Only
    /// flag-less renames are supported.
    pub async fn rename(&self, old_path: &str, new_path: &str, flags: u32) -> FsResult<()> {
        if flags != 0 {
            return Err(FsError::InvalidArgument(format!(
                "rename flags {:#x} not supported",
                flags
            )));
        }

        let old_parent = self.lookup(&filepath::parent_dir(old_path), true).await?;
        let new_parent = self.lookup(&filepath::parent_dir(new_path), true).await?;
        self.permission.check(&old_parent.attr, WANT_WRITE)?;
        self.permission.check(&new_parent.attr, WANT_WRITE)?;

        let old_name = filepath::filename(old_path);
        let new_name = filepath::filename(new_path);
        self.check_name(&old_name)?;
        self.check_name(&new_name)?;

        let entry = self.do_lookup(old_parent.ino, &old_name).await?;
        self.meta
            .rename(old_parent.ino, &old_name, new_parent.ino, &new_name)
            .await?;

        self.entry_cache.remove(old_parent.ino, &old_name);
        self.entry_cache.remove(new_parent.ino, &new_name);
        self.attr_cache.remove(entry.ino);

        if old_parent.ino != new_parent.ino {
            if let Some(handle) = self.inodes.peek(entry.ino) {
                let mut attr = handle.attr().await;
                attr.parents.retain(|v| *v != old_parent.ino);
                attr.parents.push(new_parent.ino);
            }
            let nlink = if entry.attr.is_dir() { 1 } else { 0 };
            self.update_parent_mc_time(old_parent.ino, -nlink).await?;
            self.update_parent_mc_time(new_parent.ino, nlink).await?;
        } else {
            self.update_parent_mc_time(old_parent.ino, 0).await?;
        }
        Ok(())
    }

    pub async fn symlink(&self, target: &str, link_path: &str) -> FsResult<InodeAttr> {
        let parent = self.lookup(&filepath::parent_dir(link_path), true).await?;
        self.permission.check(&parent.attr, WANT_WRITE)?;

        let name = filepath::filename(link_path);
        self.check_name(&name)?;

        let mut template = InodeAttr::with_type(
            0,
            FileType::Symlink,
            0o777,
            self.permission.uid(),
            self.permission.gid(),
        );
        template.link = Some(target.to_string());
        template.len = target.len() as u64;
        let attr = self.meta.create_entry(parent.ino, &name, &template).await?;

        self.entry_cache.remove(parent.ino, &name);
        self.attr_cache.put(attr.clone());
        self.update_parent_mc_time(parent.ino, 0).await?;
        Ok(attr)
    }

    pub async fn read_link(&self, path: &str) -> FsResult<String> {
        let entry = self.lookup(path, false).await?;
        if !entry.attr.is_symlink() {
            return Err(FsError::InvalidArgument(format!(
                "{} is not a symlink",
                path
            )));
        }
        self.do_read_link(&entry).await
    }

    // ------------------------------------------------------------------
    // File I/O
    // ------------------------------------------------------------------

    pub async fn open(&self, path: &str, flags: i32) -> FsResult<Arc<FileHandler>> {
        let entry = self.lookup(path, true).await?;
        if entry.attr.is_dir() {
            return Err(FsError::InvalidArgument(format!(
                "{} is a directory",
                path
            )));
        }

        let want = match flags & libc::O_ACCMODE {
            libc::O_RDONLY => WANT_READ,
            libc::O_WRONLY => WANT_WRITE,
            _ => WANT_READ | WANT_WRITE,
        };
        self.permission.check(&entry.attr, want)?;

        let mut len = entry.attr.len;
        if flags & libc::O_TRUNC != 0 && want & WANT_WRITE != 0 && len != 0 {
            self.truncate(entry.ino).await?;
            len = 0;
        }

        let handler = self.handlers.next_handler(entry.ino);
        if flags & libc::O_APPEND != 0 {
            handler.set_offset(len);
        }
        Ok(handler)
    }

    async fn truncate(&self, ino: Ino) -> FsResult<()> {
        let handle = self.inodes.get_handle(ino).await?;
        {
            let mut attr = handle.attr().await;
            attr.len = 0;
            attr.touch_mc_time();
            self.meta.sync_attr(ino, &attr).await?;
            handle.clear_dirty();
        }
        self.defer_sync.registry().remove(ino);
        self.attr_cache.remove(ino);
        Ok(())
    }

    pub async fn lseek(&self, fh: u64, offset: i64, whence: i32) -> FsResult<u64> {
        let handler = self.handlers.get_handler(fh)?;

        let next = match whence {
            libc::SEEK_SET => offset,
            libc::SEEK_CUR => handler.offset() as i64 + offset,
            libc::SEEK_END => {
                let attr = self.do_get_attr(handler.ino).await?;
                attr.len as i64 + offset
            }
            _ => {
                return Err(FsError::InvalidArgument(format!(
                    "unknown whence {}",
                    whence
                )))
            }
        };

        if next < 0 {
            return Err(FsError::InvalidArgument(format!(
                "seek to negative offset {}",
                next
            )));
        }
        handler.set_offset(next as u64);
        Ok(next as u64)
    }

    pub async fn read(&self, fh: u64, buf: &mut [u8]) -> FsResult<usize> {
        let handler = self.handlers.get_handler(fh)?;
        let attr = self.do_get_attr(handler.ino).await?;
        self.permission.check(&attr, WANT_READ)?;

        let n = self.data.read(handler.ino, handler.offset(), buf).await?;
        handler.advance(n as u64);
        Ok(n)
    }

    pub async fn write(&self, fh: u64, buf: &[u8]) -> FsResult<usize> {
        let handler = self.handlers.get_handler(fh)?;
        let attr = self.do_get_attr(handler.ino).await?;
        self.permission.check(&attr, WANT_WRITE)?;

        let n = self.data.write(handler.ino, handler.offset(), buf).await?;
        let end = handler.advance(n as u64);

        // Length and mtime are local bookkeeping; write them back deferred.
        let handle = self.inodes.get_handle(handler.ino).await?;
        {
            let mut attr = handle.attr().await;
            if end > attr.len {
                attr.len = end;
            }
            attr.touch_mc_time();
            handle.mark_dirty();
            self.defer_sync.push(&handle);
        }
        self.attr_cache.remove(handler.ino);
        Ok(n)
    }

    pub async fn fsync(&self, fh: u64) -> FsResult<()> {
        let handler = self.handlers.get_handler(fh)?;
        let attr = self.do_get_attr(handler.ino).await?;
        self.permission.check(&attr, WANT_WRITE)?;
        self.data.flush(handler.ino).await
    }

    pub async fn close(&self, fh: u64) -> FsResult<()> {
        let handler = self.handlers.get_handler(fh)?;
        self.data.flush(handler.ino).await?;
        self.handlers.free_handler(fh);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub async fn stat(&self, path: &str) -> FsResult<InodeAttr> {
        let entry = self.lookup(path, true).await?;
        self.permission.check(&entry.attr, WANT_READ)?;
        Ok(entry.attr)
    }

    /// `stat` without following a final symlink.
    pub async fn lstat(&self, path: &str) -> FsResult<InodeAttr> {
        let entry = self.lookup(path, false).await?;
        self.permission.check(&entry.attr, WANT_READ)?;
        Ok(entry.attr)
    }

    pub async fn fstat(&self, fh: u64) -> FsResult<InodeAttr> {
        let handler = self.handlers.get_handler(fh)?;
        let attr = self.do_get_attr(handler.ino).await?;
        self.permission.check(&attr, WANT_READ)?;
        Ok(attr)
    }

    /// Apply an attribute mutation and synchronize it immediately; attr
    /// changes are never deferred because the caller expects them visible
    /// to other clients on return.
    pub async fn setattr(&self, path: &str, opts: &SetAttrOpts) -> FsResult<InodeAttr> {
        let entry = self.lookup(path, true).await?;
        let ctx = self.permission.ctx();

        if ctx.check && ctx.uid != 0 {
            // chmod is owner-only, chown is root-only, truncate needs write.
            if opts.mode.is_some() && ctx.uid != entry.attr.uid {
                return Err(FsError::NoPermission(format!(
                    "uid {} cannot chmod ino {}",
                    ctx.uid, entry.ino
                )));
            }
            if opts.uid.is_some() || opts.gid.is_some() {
                return Err(FsError::NoPermission(format!(
                    "uid {} cannot chown ino {}",
                    ctx.uid, entry.ino
                )));
            }
            if opts.len.is_some() {
                self.permission.check(&entry.attr, WANT_WRITE)?;
            }
        }

        let handle = self.inodes.get_handle(entry.ino).await?;
        let updated = {
            let mut attr = handle.attr().await;
            opts.apply(&mut attr);
            self.meta.sync_attr(entry.ino, &attr).await?;
            handle.clear_dirty();
            attr.clone()
        };
        self.defer_sync.registry().remove(entry.ino);
        self.attr_cache.remove(entry.ino);
        Ok(updated)
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<InodeAttr> {
        self.setattr(path, &SetAttrOpts::with_mode(mode)).await
    }

    pub async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<InodeAttr> {
        self.setattr(path, &SetAttrOpts::with_owner(uid, gid)).await
    }

    // ------------------------------------------------------------------
    // Directory streams
    // ------------------------------------------------------------------

    /// Open a directory stream over a listing snapshot fetched once;
    /// later namespace changes do not appear in this stream.
    pub async fn opendir(&self, path: &str) -> FsResult<Arc<DirStream>> {
        let entry = self.lookup(path, true).await?;
        if !entry.attr.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.permission.check(&entry.attr, WANT_READ)?;

        let entries = self.meta.list_entries(entry.ino, 0).await?;
        Ok(self.dir_handles.next_handle(entry.ino, entries))
    }

    pub fn readdir(&self, fh: u64) -> FsResult<DirEntry> {
        self.dir_handles.get_handle(fh)?.next_entry()
    }

    pub fn closedir(&self, fh: u64) -> FsResult<()> {
        match self.dir_handles.free_handle(fh) {
            Some(_) => Ok(()),
            None => {
                error!("closedir on unknown fh {}", fh);
                Err(FsError::BadDescriptor(fh))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::testing::{MemoryDataClient, MemoryMetaClient};

    type TestFs = TideFileSystem<MemoryMetaClient, MemoryDataClient>;

    fn new_fs(meta: &Arc<MemoryMetaClient>, uid: u32) -> TestFs {
        let mut conf = ClientConf::default();
        conf.init().unwrap();
        let ctx = AccessContext::new(uid, vec![uid], 0o022);
        TideFileSystem::new(conf, ctx, meta.clone(), Arc::new(MemoryDataClient::new()))
    }

    fn root_fs() -> (Arc<MemoryMetaClient>, TestFs) {
        let meta = Arc::new(MemoryMetaClient::new());
        let fs = new_fs(&meta, 0);
        (meta, fs)
    }

    #[tokio::test]
    async fn lookup_root() {
        let (_, fs) = root_fs();
        let entry = fs.lookup("/", true).await.unwrap();
        assert_eq!(entry.ino, ROOT_INO);
        assert!(entry.attr.is_dir());
    }

    #[tokio::test]
    async fn symlink_follow_and_nofollow() {
        // /a (dir, 2), /a/b (symlink -> "c", 3), /a/c (file, 4)
        let meta = Arc::new(MemoryMetaClient::new());
        let a = meta.add_node(ROOT_INO, "a", FileType::Directory, 0o755, 0, 0);
        let b = meta.add_node(a, "b", FileType::Symlink, 0o777, 0, 0);
        meta.set_link(b, "c");
        let c = meta.add_node(a, "c", FileType::File, 0o644, 0, 0);

        let fs = new_fs(&meta, 0);
        let followed = fs.lookup("/a/b", true).await.unwrap();
        assert_eq!(followed.ino, c);
        assert_eq!(followed.attr.file_type, FileType::File);

        let raw = fs.lookup("/a/b", false).await.unwrap();
        assert_eq!(raw.ino, b);
        assert!(raw.attr.is_symlink());
    }

    #[tokio::test]
    async fn symlink_intermediate_always_followed() {
        // /d -> "a" (dir symlink), lookup /d/c resolves through it.
        let meta = Arc::new(MemoryMetaClient::new());
        let a = meta.add_node(ROOT_INO, "a", FileType::Directory, 0o755, 0, 0);
        let c = meta.add_node(a, "c", FileType::File, 0o644, 0, 0);
        let d = meta.add_node(ROOT_INO, "d", FileType::Symlink, 0o777, 0, 0);
        meta.set_link(d, "a");

        let fs = new_fs(&meta, 0);
        let entry = fs.lookup("/d/c", false).await.unwrap();
        assert_eq!(entry.ino, c);
    }

    #[tokio::test]
    async fn symlink_cycle_is_bounded() {
        let meta = Arc::new(MemoryMetaClient::new());
        let l1 = meta.add_node(ROOT_INO, "l1", FileType::Symlink, 0o777, 0, 0);
        let l2 = meta.add_node(ROOT_INO, "l2", FileType::Symlink, 0o777, 0, 0);
        meta.set_link(l1, "/l2");
        meta.set_link(l2, "/l1");

        let fs = new_fs(&meta, 0);
        let err = fs.lookup("/l1", true).await.unwrap_err();
        assert!(matches!(err, FsError::LoopExists(_)));
    }

    #[tokio::test]
    async fn name_too_long_rejected_before_remote() {
        let (meta, fs) = root_fs();
        let before = meta.node_count();

        let name = format!("/{}", "x".repeat(300));
        let err = fs.create(&name, 0o644).await.unwrap_err();
        assert!(matches!(err, FsError::NameTooLong(_)));
        assert_eq!(meta.node_count(), before);
    }

    #[tokio::test]
    async fn mkdir_and_mkdirs() {
        let (_, fs) = root_fs();
        let attr = fs.mkdir("/a", 0o755).await.unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.nlink, 2);

        let err = fs.mkdir("/a", 0o755).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));

        fs.mkdirs("/a/b/c", 0o755).await.unwrap();
        assert!(fs.lookup("/a/b/c", true).await.unwrap().attr.is_dir());
    }

    #[tokio::test]
    async fn rmdir_non_empty_is_rejected_without_delete() {
        let (_, fs) = root_fs();
        fs.mkdir("/d", 0o755).await.unwrap();
        fs.create("/d/f", 0o644).await.unwrap();

        let err = fs.rmdir("/d").await.unwrap_err();
        assert!(matches!(err, FsError::NotEmpty(_)));

        // Neither the directory nor the child went anywhere.
        assert!(fs.lookup("/d", true).await.is_ok());
        assert!(fs.lookup("/d/f", true).await.is_ok());
    }

    #[tokio::test]
    async fn rmdir_empty() {
        let (_, fs) = root_fs();
        fs.mkdir("/d", 0o755).await.unwrap();
        fs.rmdir("/d").await.unwrap();

        let err = fs.lookup("/d", true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_write_read_roundtrip() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();

        let fh = fs.open("/f", libc::O_RDWR).await.unwrap();
        assert_eq!(fs.write(fh.fh, b"hello world").await.unwrap(), 11);
        fs.fsync(fh.fh).await.unwrap();
        assert_eq!(fs.fstat(fh.fh).await.unwrap().len, 11);

        fs.lseek(fh.fh, 0, libc::SEEK_SET).await.unwrap();
        let mut buf = [0u8; 16];
        let n = fs.read(fh.fh, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello world");
        fs.close(fh.fh).await.unwrap();
        assert!(matches!(
            fs.read(fh.fh, &mut buf).await.unwrap_err(),
            FsError::BadDescriptor(_)
        ));
    }

    #[tokio::test]
    async fn write_is_visible_before_flush() {
        let (meta, fs) = root_fs();
        let attr = fs.create("/f", 0o644).await.unwrap();

        let fh = fs.open("/f", libc::O_WRONLY).await.unwrap();
        fs.write(fh.fh, b"0123456789").await.unwrap();

        // The remote has not seen the new length, a stat has.
        assert_eq!(meta.get_attr_sync(attr.ino).unwrap().len, 0);
        assert_eq!(fs.stat("/f").await.unwrap().len, 10);

        // Stop drains the deferred mutation to the remote.
        fs.start();
        fs.stop().await;
        assert_eq!(meta.get_attr_sync(attr.ino).unwrap().len, 10);
    }

    #[tokio::test]
    async fn unlink_removes_and_purges() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        fs.stat("/f").await.unwrap();

        fs.unlink("/f").await.unwrap();
        let err = fs.lookup("/f", true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unlink_directory_is_invalid() {
        let (_, fs) = root_fs();
        fs.mkdir("/d", 0o755).await.unwrap();
        let err = fs.unlink("/d").await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn rename_moves_entry() {
        let (_, fs) = root_fs();
        fs.mkdir("/a", 0o755).await.unwrap();
        fs.mkdir("/b", 0o755).await.unwrap();
        let attr = fs.create("/a/f", 0o644).await.unwrap();

        fs.rename("/a/f", "/b/g", 0).await.unwrap();
        assert!(fs.lookup("/a/f", true).await.unwrap_err().is_not_found());
        assert_eq!(fs.lookup("/b/g", true).await.unwrap().ino, attr.ino);
    }

    #[tokio::test]
    async fn rename_flags_unsupported() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        let err = fs.rename("/f", "/g", 1).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn traversal_requires_exec() {
        let meta = Arc::new(MemoryMetaClient::new());
        let p = meta.add_node(ROOT_INO, "p", FileType::Directory, 0o700, 0, 0);
        meta.add_node(p, "child", FileType::File, 0o644, 0, 0);

        let fs = new_fs(&meta, 1000);
        let err = fs.lookup("/p/child", true).await.unwrap_err();
        assert!(matches!(err, FsError::NoPermission(_)));

        // The directory itself still resolves; only descent is blocked.
        assert!(fs.lookup("/p", true).await.is_ok());
    }

    #[tokio::test]
    async fn open_checks_access_mode() {
        let meta = Arc::new(MemoryMetaClient::new());
        meta.add_node(ROOT_INO, "f", FileType::File, 0o644, 1000, 1000);

        let owner = new_fs(&meta, 1000);
        assert!(owner.open("/f", libc::O_WRONLY).await.is_ok());

        let other = new_fs(&meta, 2000);
        assert!(other.open("/f", libc::O_RDONLY).await.is_ok());
        let err = other.open("/f", libc::O_WRONLY).await.unwrap_err();
        assert!(matches!(err, FsError::NoPermission(_)));
    }

    #[tokio::test]
    async fn open_append_starts_at_len() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        let fh = fs.open("/f", libc::O_WRONLY).await.unwrap();
        fs.write(fh.fh, b"abcd").await.unwrap();
        fs.close(fh.fh).await.unwrap();

        let fh = fs.open("/f", libc::O_WRONLY | libc::O_APPEND).await.unwrap();
        assert_eq!(fh.offset(), 4);
    }

    #[tokio::test]
    async fn open_trunc_resets_len() {
        let (meta, fs) = root_fs();
        let attr = fs.create("/f", 0o644).await.unwrap();
        let fh = fs.open("/f", libc::O_WRONLY).await.unwrap();
        fs.write(fh.fh, b"abcd").await.unwrap();
        fs.close(fh.fh).await.unwrap();

        fs.open("/f", libc::O_WRONLY | libc::O_TRUNC).await.unwrap();
        assert_eq!(fs.stat("/f").await.unwrap().len, 0);
        assert_eq!(meta.get_attr_sync(attr.ino).unwrap().len, 0);
    }

    #[tokio::test]
    async fn lseek_whence() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        let fh = fs.open("/f", libc::O_RDWR).await.unwrap();
        fs.write(fh.fh, b"0123456789").await.unwrap();

        assert_eq!(fs.lseek(fh.fh, 2, libc::SEEK_SET).await.unwrap(), 2);
        assert_eq!(fs.lseek(fh.fh, 3, libc::SEEK_CUR).await.unwrap(), 5);
        assert_eq!(fs.lseek(fh.fh, -4, libc::SEEK_END).await.unwrap(), 6);

        let err = fs.lseek(fh.fh, -100, libc::SEEK_CUR).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
        assert!(matches!(
            fs.lseek(999, 0, libc::SEEK_SET).await.unwrap_err(),
            FsError::BadDescriptor(_)
        ));
    }

    #[tokio::test]
    async fn chmod_and_chown() {
        let meta = Arc::new(MemoryMetaClient::new());
        meta.add_node(ROOT_INO, "f", FileType::File, 0o644, 1000, 1000);

        let owner = new_fs(&meta, 1000);
        let attr = owner.chmod("/f", 0o600).await.unwrap();
        assert_eq!(attr.mode, 0o600);

        let other = new_fs(&meta, 2000);
        assert!(matches!(
            other.chmod("/f", 0o666).await.unwrap_err(),
            FsError::NoPermission(_)
        ));
        assert!(matches!(
            owner.chown("/f", 2000, 2000).await.unwrap_err(),
            FsError::NoPermission(_)
        ));

        let root = new_fs(&meta, 0);
        let attr = root.chown("/f", 2000, 2000).await.unwrap();
        assert_eq!((attr.uid, attr.gid), (2000, 2000));
    }

    #[tokio::test]
    async fn symlink_create_and_read() {
        let (_, fs) = root_fs();
        fs.create("/target", 0o644).await.unwrap();
        let attr = fs.symlink("/target", "/link").await.unwrap();
        assert!(attr.is_symlink());

        assert_eq!(fs.read_link("/link").await.unwrap(), "/target");
        assert!(matches!(
            fs.read_link("/target").await.unwrap_err(),
            FsError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn dir_stream_snapshot() {
        let (_, fs) = root_fs();
        fs.mkdir("/d", 0o755).await.unwrap();
        fs.create("/d/a", 0o644).await.unwrap();
        fs.create("/d/b", 0o644).await.unwrap();

        let stream = fs.opendir("/d").await.unwrap();
        // Created after open, invisible to this stream.
        fs.create("/d/c", 0o644).await.unwrap();

        let mut names = Vec::new();
        loop {
            match fs.readdir(stream.fh) {
                Ok(entry) => names.push(entry.name),
                Err(FsError::EndOfStream) => break,
                Err(e) => panic!("{}", e),
            }
        }
        assert_eq!(names, vec!["a", "b"]);

        fs.closedir(stream.fh).unwrap();
        assert!(matches!(
            fs.closedir(stream.fh).unwrap_err(),
            FsError::BadDescriptor(_)
        ));
    }

    #[tokio::test]
    async fn opendir_on_file() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        assert!(matches!(
            fs.opendir("/f").await.unwrap_err(),
            FsError::NotADirectory(_)
        ));
    }

    #[tokio::test]
    async fn entry_cache_purged_after_delete() {
        let (_, fs) = root_fs();
        fs.create("/f", 0o644).await.unwrap();
        // Populate the entry cache, then delete through the same client.
        fs.lookup("/f", true).await.unwrap();
        fs.unlink("/f").await.unwrap();
        assert!(fs.lookup("/f", true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn parent_times_move_on_child_mutation() {
        let (meta, fs) = root_fs();
        let d = fs.mkdir("/d", 0o755).await.unwrap();
        let before = meta.get_attr_sync(d.ino).unwrap();
        assert_eq!(before.nlink, 2);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fs.mkdir("/d/sub", 0o755).await.unwrap();

        let after = meta.get_attr_sync(d.ino).unwrap();
        assert_eq!(after.nlink, 3);
        assert!(after.mtime >= before.mtime);
    }

    #[tokio::test]
    async fn permission_disabled_bypasses_checks() {
        let meta = Arc::new(MemoryMetaClient::new());
        meta.add_node(ROOT_INO, "f", FileType::File, 0o600, 0, 0);

        let mut conf = ClientConf::default();
        conf.check_permission = false;
        conf.init().unwrap();
        let fs: TestFs = TideFileSystem::new(
            conf,
            AccessContext::new(1000, vec![1000], 0o022),
            meta,
            Arc::new(MemoryDataClient::new()),
        );

        assert!(fs.open("/f", libc::O_RDWR).await.is_ok());
    }
}
