//! One handler per filesystem operation.
//!
//! Handlers speak absolute paths, not inodes; the callback layer owns that
//! mapping. Reads serialize the resolved node; writes go through
//! serialize, patch the text, reparse, then replace the node in place, so
//! a failed reparse never leaves a partial mutation behind. Every
//! successful mutation clears the saved flag and stamps the time sidecar.

use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::FsError;
use crate::paths::{self, SAVE_PATH, STATUS_PATH};
use crate::shadow::{self, NodeAddr};
use crate::state::MountState;
use crate::times::TimeSet;

pub const STATUS_SAVED: &str = "SAVED\n";
pub const STATUS_UNSAVED: &str = "UNSAVED\n";

/// What a path resolves to, as the host sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Attributes reported by [`getattr`], independent of the host's stat
/// structure layout.
#[derive(Debug, Clone, Copy)]
pub struct Attributes {
    pub kind: EntryKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

// ---------------------------------------------------------------------------
// Lookup operations
// ---------------------------------------------------------------------------

pub fn getattr(state: &MountState, path: &str) -> Result<Attributes, FsError> {
    let (atime, mtime, ctime) = times_for(state, path);
    let base = Attributes {
        kind: EntryKind::File,
        perm: 0o666,
        nlink: 1,
        size: 0,
        uid: state.uid,
        gid: state.gid,
        atime,
        mtime,
        ctime,
    };

    if paths::is_control_file(path) {
        let (perm, size) = if path == STATUS_PATH {
            let label = if state.saved { "SAVED" } else { "UNSAVED" };
            (0o444, label.len() as u64)
        } else {
            (0o666, 1)
        };
        return Ok(Attributes { perm, size, ..base });
    }

    let node = shadow::resolve(path, &state.root).ok_or(FsError::NotFound)?;
    if node.is_object() {
        Ok(Attributes {
            kind: EntryKind::Directory,
            perm: 0o775,
            nlink: 2 + shadow::count_dir_children(node) as u32,
            ..base
        })
    } else {
        Ok(Attributes { size: dump(node)?.len() as u64, ..base })
    }
}

pub fn readdir(state: &MountState, path: &str) -> Result<Vec<(String, EntryKind)>, FsError> {
    let node = shadow::resolve(path, &state.root).ok_or(FsError::NotFound)?;
    let map = node.as_object().ok_or(FsError::NotDir)?;

    let mut entries = vec![
        (".".to_string(), EntryKind::Directory),
        ("..".to_string(), EntryKind::Directory),
    ];
    if path == "/" {
        entries.push((".status".to_string(), EntryKind::File));
        entries.push((".save".to_string(), EntryKind::File));
    }
    for (key, child) in map {
        let kind = if child.is_object() { EntryKind::Directory } else { EntryKind::File };
        entries.push((key.clone(), kind));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Data operations
// ---------------------------------------------------------------------------

pub fn read(state: &mut MountState, path: &str, size: u32, offset: i64) -> Result<Vec<u8>, FsError> {
    if offset < 0 {
        return Err(FsError::Invalid);
    }
    let text = if paths::is_control_file(path) {
        control_text(state, path)
    } else {
        let node = shadow::resolve(path, &state.root).ok_or(FsError::NotFound)?;
        dump(node)?
    };
    let data = slice_range(text.as_bytes(), offset as usize, size as usize);
    state.times.touch(path, TimeSet::ACCESS);
    Ok(data)
}

pub fn write(state: &mut MountState, path: &str, data: &[u8], offset: i64) -> Result<u32, FsError> {
    if offset < 0 {
        return Err(FsError::Invalid);
    }
    if paths::is_control_file(path) {
        return write_control(state, path, data.len());
    }

    let old = shadow::resolve(path, &state.root).ok_or(FsError::NotFound)?;
    let target = NodeAddr::of(old);
    let mut content = dump(old)?.into_bytes();

    let offset = offset as usize;
    if offset + data.len() > content.len() {
        content.resize(offset + data.len(), 0);
    }
    content[offset..offset + data.len()].copy_from_slice(data);

    let new_node: Value = serde_json::from_slice(&content).map_err(|_| FsError::Invalid)?;
    shadow::replace_node(&mut state.root, target, new_node).map_err(|_| FsError::NotFound)?;

    state.saved = false;
    state.times.touch(path, TimeSet::MODIFY);
    Ok(data.len() as u32)
}

pub fn truncate(state: &mut MountState, path: &str, length: i64) -> Result<(), FsError> {
    if length < 0 {
        return Err(FsError::Invalid);
    }
    let old = shadow::resolve(path, &state.root).ok_or(FsError::NotFound)?;
    let target = NodeAddr::of(old);

    let new_node = if length == 0 {
        Value::from(0)
    } else {
        let mut content = dump(old)?.into_bytes();
        content.resize(length as usize, 0);
        serde_json::from_slice(&content).map_err(|_| FsError::Invalid)?
    };
    shadow::replace_node(&mut state.root, target, new_node).map_err(|_| FsError::NotFound)?;

    state.saved = false;
    state.times.touch(path, TimeSet::MODIFY);
    Ok(())
}

// ---------------------------------------------------------------------------
// Namespace operations
// ---------------------------------------------------------------------------

pub fn mknod(state: &mut MountState, path: &str, mode: u32) -> Result<(), FsError> {
    if mode & libc::S_IFMT as u32 != libc::S_IFREG as u32 {
        return Err(FsError::Invalid);
    }
    create_entry(state, path, Value::from(0))
}

pub fn mkdir(state: &mut MountState, path: &str) -> Result<(), FsError> {
    create_entry(state, path, Value::Object(Map::new()))
}

fn create_entry(state: &mut MountState, path: &str, node: Value) -> Result<(), FsError> {
    // Editors probe for swapfiles; those never belong in the document.
    if path.contains(".sw") {
        return Err(FsError::Perm);
    }
    let (parent, base) = paths::split(path);
    if parent.is_empty() || base.is_empty() {
        return Err(FsError::Invalid);
    }
    if base.len() >= paths::MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }

    let parent_node =
        shadow::resolve_mut(&parent, &mut state.root).ok_or(FsError::NotFound)?;
    let map = parent_node.as_object_mut().ok_or(FsError::NotDir)?;
    if map.contains_key(&base) {
        return Err(FsError::Exists);
    }
    map.insert(base, node);

    state.saved = false;
    state.times.touch(path, TimeSet::MODIFY);
    Ok(())
}

pub fn unlink(state: &mut MountState, path: &str) -> Result<(), FsError> {
    remove_entry(state, path, EntryKind::File)
}

pub fn rmdir(state: &mut MountState, path: &str) -> Result<(), FsError> {
    remove_entry(state, path, EntryKind::Directory)
}

fn remove_entry(state: &mut MountState, path: &str, kind: EntryKind) -> Result<(), FsError> {
    let node = match shadow::resolve(path, &state.root) {
        Some(node) => node,
        None if paths::is_control_file(path) => return Err(FsError::Perm),
        None => return Err(FsError::NotFound),
    };
    match kind {
        EntryKind::File => {
            if node.is_object() {
                return Err(FsError::IsDir);
            }
        }
        EntryKind::Directory => {
            let map = node.as_object().ok_or(FsError::NotDir)?;
            if path == "/" {
                return Err(FsError::Busy);
            }
            if !map.is_empty() {
                return Err(FsError::NotEmpty);
            }
        }
    }

    let target = NodeAddr::of(node);
    shadow::remove_node(&mut state.root, target)?;
    state.times.remove(path);
    state.saved = false;
    Ok(())
}

pub fn rename(state: &mut MountState, old_path: &str, new_path: &str) -> Result<(), FsError> {
    if old_path == new_path {
        return Ok(());
    }
    let node = shadow::resolve(old_path, &state.root)
        .ok_or(FsError::NotFound)?
        .clone();

    let (old_parent, old_name) = paths::split(old_path);
    let (new_parent, new_name) = paths::split(new_path);
    if old_name.is_empty() || new_name.is_empty() {
        return Err(FsError::Invalid);
    }

    resolve_parent(&state.root, &old_parent).ok_or(FsError::NotFound)?;
    resolve_parent(&state.root, &new_parent)
        .ok_or(FsError::NotFound)?
        .as_object()
        .ok_or(FsError::NotDir)?;

    // Moving a directory below itself would orphan the subtree.
    if new_path.starts_with(old_path) && new_path.as_bytes().get(old_path.len()) == Some(&b'/') {
        return Err(FsError::Invalid);
    }

    // Install under the new name first; only then drop the old linkage.
    let installed = resolve_parent_mut(&mut state.root, &new_parent)
        .and_then(Value::as_object_mut)
        .ok_or(FsError::Io)?;
    installed.insert(new_name, node);

    if let Some(map) = resolve_parent_mut(&mut state.root, &old_parent).and_then(Value::as_object_mut) {
        map.remove(&old_name);
    }

    state.times.remove(old_path);
    state.saved = false;
    Ok(())
}

fn resolve_parent<'a>(root: &'a Value, parent: &str) -> Option<&'a Value> {
    if parent == "." {
        Some(root)
    } else {
        shadow::resolve(parent, root)
    }
}

fn resolve_parent_mut<'a>(root: &'a mut Value, parent: &str) -> Option<&'a mut Value> {
    if parent == "." {
        Some(root)
    } else {
        shadow::resolve_mut(parent, root)
    }
}

// ---------------------------------------------------------------------------
// Times and persistence
// ---------------------------------------------------------------------------

pub fn utimens(
    state: &mut MountState,
    path: &str,
    atime: Option<i64>,
    mtime: Option<i64>,
) -> Result<(), FsError> {
    let record = state.times.entry_mut(path);
    if let Some(atime) = atime {
        record.atime = atime;
    }
    if let Some(mtime) = mtime {
        record.mtime = mtime;
        record.ctime = mtime;
    }
    Ok(())
}

fn write_control(state: &mut MountState, path: &str, size: usize) -> Result<u32, FsError> {
    if path != SAVE_PATH {
        return Err(FsError::Access);
    }
    if let Err(err) = state.persist() {
        warn!(source = %state.source_path.display(), "failed to persist document");
        return Err(err);
    }
    state.times.touch(SAVE_PATH, TimeSet::MODIFY);
    Ok(size as u32)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn control_text(state: &MountState, path: &str) -> String {
    if path == STATUS_PATH {
        (if state.saved { STATUS_SAVED } else { STATUS_UNSAVED }).to_string()
    } else {
        (if state.saved { "0" } else { "1" }).to_string()
    }
}

/// Serialize a node the way file contents are presented. Any value is a
/// legal root here, scalars included.
fn dump(node: &Value) -> Result<String, FsError> {
    serde_json::to_string(node).map_err(|_| FsError::Io)
}

fn times_for(state: &MountState, path: &str) -> (i64, i64, i64) {
    let record = state.times.find(path).unwrap_or_else(|| state.times.head());
    (record.atime, record.mtime, record.ctime)
}

fn slice_range(bytes: &[u8], offset: usize, size: usize) -> Vec<u8> {
    if offset >= bytes.len() {
        return Vec::new();
    }
    let end = bytes.len().min(offset + size);
    bytes[offset..end].to_vec()
}
