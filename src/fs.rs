//! The kernel callback surface.
//!
//! fuser hands us inodes, the handlers speak absolute paths, so this layer
//! keeps a bijection between the two and nothing else. Inodes are assigned
//! on lookup and creation, dropped on removal, and re-keyed on rename
//! (including every descendant of a moved directory). All actual
//! filesystem logic lives in `handlers`; replies here only translate
//! results and negate errnos.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, info};

use crate::errors::FsError;
use crate::handlers::{self, Attributes, EntryKind};
use crate::paths;
use crate::state::MountState;
use crate::times::unix_now;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;
const BLOCK_SIZE: u32 = 512;

/// Bijection between kernel inode numbers and absolute paths.
struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = InodeTable {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.by_ino.insert(ROOT_INO, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INO);
        table
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    /// The inode for `path`, allocating one on first sight.
    fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    /// Re-key `old` and every path below it after a rename.
    fn rename_prefix(&mut self, old: &str, new: &str) {
        let old_subtree = format!("{old}/");
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&old_subtree))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (path, ino) in moved {
            self.by_path.remove(&path);
            let renamed = format!("{new}{}", &path[old.len()..]);
            self.by_ino.insert(ino, renamed.clone());
            self.by_path.insert(renamed, ino);
        }
    }
}

/// A mounted JSON document.
pub struct JsonFs {
    state: MountState,
    inodes: InodeTable,
}

impl JsonFs {
    pub fn new(state: MountState) -> Self {
        JsonFs { state, inodes: InodeTable::new() }
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, FsError> {
        let parent_path = self.inodes.path_of(parent).ok_or(FsError::NotFound)?;
        let name = name.to_str().ok_or(FsError::Invalid)?;
        Ok(join_path(parent_path, name))
    }

    fn owned_path(&self, ino: u64) -> Result<String, FsError> {
        self.inodes.path_of(ino).map(str::to_string).ok_or(FsError::NotFound)
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn system_time_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn time_or_now_secs(time: TimeOrNow) -> i64 {
    match time {
        TimeOrNow::SpecificTime(time) => system_time_secs(time),
        TimeOrNow::Now => unix_now(),
    }
}

fn to_file_attr(ino: u64, attrs: &Attributes) -> FileAttr {
    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.size.div_ceil(BLOCK_SIZE as u64),
        atime: to_system_time(attrs.atime),
        mtime: to_system_time(attrs.mtime),
        ctime: to_system_time(attrs.ctime),
        crtime: to_system_time(attrs.ctime),
        kind: file_type(attrs.kind),
        perm: attrs.perm,
        nlink: attrs.nlink,
        uid: attrs.uid,
        gid: attrs.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

impl Filesystem for JsonFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let looked_up = self
            .child_path(parent, name)
            .and_then(|path| handlers::getattr(&self.state, &path).map(|attrs| (path, attrs)));
        match looked_up {
            Ok((path, attrs)) => {
                let ino = self.inodes.assign(&path);
                reply.entry(&TTL, &to_file_attr(ino, &attrs), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let result = self
            .owned_path(ino)
            .and_then(|path| handlers::getattr(&self.state, &path));
        match result {
            Ok(attrs) => reply.attr(&TTL, &to_file_attr(ino, &attrs)),
            Err(err) => reply.error(err.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.owned_path(ino) {
            Ok(path) => path,
            Err(err) => return reply.error(err.errno()),
        };
        debug!(%path, ?size, "setattr");

        if let Some(length) = size {
            if let Err(err) = handlers::truncate(&mut self.state, &path, length as i64) {
                return reply.error(err.errno());
            }
        }
        if atime.is_some() || mtime.is_some() {
            let atime = atime.map(time_or_now_secs);
            let mtime = mtime.map(time_or_now_secs);
            if let Err(err) = handlers::utimens(&mut self.state, &path, atime, mtime) {
                return reply.error(err.errno());
            }
        }

        match handlers::getattr(&self.state, &path) {
            Ok(attrs) => reply.attr(&TTL, &to_file_attr(ino, &attrs)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child_path(parent, name).and_then(|path| {
            handlers::mknod(&mut self.state, &path, mode)?;
            let attrs = handlers::getattr(&self.state, &path)?;
            Ok((path, attrs))
        });
        match result {
            Ok((path, attrs)) => {
                debug!(%path, "mknod");
                let ino = self.inodes.assign(&path);
                reply.entry(&TTL, &to_file_attr(ino, &attrs), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child_path(parent, name).and_then(|path| {
            handlers::mkdir(&mut self.state, &path)?;
            let attrs = handlers::getattr(&self.state, &path)?;
            Ok((path, attrs))
        });
        match result {
            Ok((path, attrs)) => {
                debug!(%path, "mkdir");
                let ino = self.inodes.assign(&path);
                reply.entry(&TTL, &to_file_attr(ino, &attrs), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|path| {
            handlers::unlink(&mut self.state, &path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                debug!(%path, "unlink");
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|path| {
            handlers::rmdir(&mut self.state, &path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                debug!(%path, "rmdir");
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let pair = self
            .child_path(parent, name)
            .and_then(|old| self.child_path(newparent, newname).map(|new| (old, new)));
        let (old, new) = match pair {
            Ok(pair) => pair,
            Err(err) => return reply.error(err.errno()),
        };
        match handlers::rename(&mut self.state, &old, &new) {
            Ok(()) => {
                debug!(%old, %new, "rename");
                // An overwritten destination keeps its stale inode otherwise.
                self.inodes.forget_path(&new);
                self.inodes.rename_prefix(&old, &new);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self
            .owned_path(ino)
            .and_then(|path| handlers::read(&mut self.state, &path, size, offset));
        match result {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self.owned_path(ino).and_then(|path| {
            debug!(%path, offset, len = data.len(), "write");
            handlers::write(&mut self.state, &path, data, offset)
        });
        match result {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.owned_path(ino) {
            Ok(path) => path,
            Err(err) => return reply.error(err.errno()),
        };
        let entries = match handlers::readdir(&self.state, &path) {
            Ok(entries) => entries,
            Err(err) => return reply.error(err.errno()),
        };

        for (index, (name, kind)) in entries.iter().enumerate().skip(offset as usize) {
            let entry_ino = match name.as_str() {
                "." => ino,
                ".." => {
                    let (parent, _) = paths::split(&path);
                    self.inodes.assign(&parent)
                }
                _ => self.inodes.assign(&join_path(&path, name)),
            };
            if reply.add(entry_ino, (index + 1) as i64, file_type(*kind), name) {
                break;
            }
        }
        reply.ok();
    }

    fn destroy(&mut self) {
        info!(source = %self.state.source_path.display(), "filesystem unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_pinned_at_ino_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INO), Some("/"));
    }

    #[test]
    fn assign_is_stable_per_path() {
        let mut table = InodeTable::new();
        let a = table.assign("/a");
        let b = table.assign("/b");
        assert_ne!(a, b);
        assert_eq!(table.assign("/a"), a);
        assert_eq!(table.path_of(a), Some("/a"));
    }

    #[test]
    fn forget_drops_both_directions() {
        let mut table = InodeTable::new();
        let ino = table.assign("/a");
        table.forget_path("/a");
        assert_eq!(table.path_of(ino), None);
        assert_ne!(table.assign("/a"), ino);
    }

    #[test]
    fn rename_rekeys_descendants() {
        let mut table = InodeTable::new();
        let dir = table.assign("/a");
        let leaf = table.assign("/a/b/c");
        let bystander = table.assign("/ab");
        table.rename_prefix("/a", "/z");
        assert_eq!(table.path_of(dir), Some("/z"));
        assert_eq!(table.path_of(leaf), Some("/z/b/c"));
        assert_eq!(table.path_of(bystander), Some("/ab"));
        assert_eq!(table.assign("/z/b/c"), leaf);
    }

    #[test]
    fn join_handles_the_root() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
    }

    #[test]
    fn time_conversion_round_trips() {
        assert_eq!(system_time_secs(to_system_time(1234)), 1234);
        assert_eq!(system_time_secs(UNIX_EPOCH), 0);
    }
}
