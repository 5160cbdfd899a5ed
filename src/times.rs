//! Per-path file times, kept apart from the JSON payload.
//!
//! The document model has no room for atime/mtime/ctime, so the mount
//! carries a sidecar of records keyed by path. The record for `/` is
//! created at mount, is never removed, and its fields double as the
//! defaults for any path that has no record of its own.

use std::time::{SystemTime, UNIX_EPOCH};

/// Selects which fields of a record receive the current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSet {
    pub atime: bool,
    pub mtime: bool,
    pub ctime: bool,
}

impl TimeSet {
    /// Inherit everything from the head record.
    pub const NONE: TimeSet = TimeSet { atime: false, mtime: false, ctime: false };
    /// A read happened: atime and ctime move.
    pub const ACCESS: TimeSet = TimeSet { atime: true, mtime: false, ctime: true };
    /// A mutation happened: mtime and ctime move.
    pub const MODIFY: TimeSet = TimeSet { atime: false, mtime: true, ctime: true };
}

#[derive(Debug, Clone)]
pub struct FileTimes {
    pub path: String,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// The sidecar itself. Linear scans are fine at interactive scale.
#[derive(Debug)]
pub struct Sidecar {
    records: Vec<FileTimes>,
}

impl Sidecar {
    /// A fresh sidecar whose head record for `/` carries the mount time.
    pub fn new(mount_time: i64) -> Self {
        Sidecar {
            records: vec![FileTimes {
                path: "/".to_string(),
                atime: mount_time,
                mtime: mount_time,
                ctime: mount_time,
            }],
        }
    }

    /// The permanent record for `/`.
    pub fn head(&self) -> &FileTimes {
        &self.records[0]
    }

    pub fn find(&self, path: &str) -> Option<&FileTimes> {
        self.records.iter().find(|rec| rec.path == path)
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut FileTimes> {
        self.records.iter_mut().find(|rec| rec.path == path)
    }

    /// Add a record for `path`. Duplicates are rejected.
    ///
    /// Fields selected in `set` get the current wall-clock second, the
    /// rest inherit from the head record.
    pub fn add(&mut self, path: &str, set: TimeSet) -> Option<&FileTimes> {
        if self.find(path).is_some() {
            return None;
        }
        let now = unix_now();
        let head = self.head();
        let record = FileTimes {
            path: path.to_string(),
            atime: if set.atime { now } else { head.atime },
            mtime: if set.mtime { now } else { head.mtime },
            ctime: if set.ctime { now } else { head.ctime },
        };
        self.records.push(record);
        self.records.last()
    }

    /// Drop the record for `path`. The head is never removed.
    pub fn remove(&mut self, path: &str) -> bool {
        let pos = self.records[1..].iter().position(|rec| rec.path == path);
        match pos {
            Some(index) => {
                self.records.remove(index + 1);
                true
            }
            None => false,
        }
    }

    /// Stamp `path` with the current time in the selected fields,
    /// creating the record if it does not exist yet.
    pub fn touch(&mut self, path: &str, set: TimeSet) {
        let now = unix_now();
        match self.find_mut(path) {
            Some(record) => {
                if set.atime {
                    record.atime = now;
                }
                if set.mtime {
                    record.mtime = now;
                }
                if set.ctime {
                    record.ctime = now;
                }
            }
            None => {
                self.add(path, set);
            }
        }
    }

    /// The record for `path`, created with inherited fields when absent.
    pub fn entry_mut(&mut self, path: &str) -> &mut FileTimes {
        let index = match self.records.iter().position(|rec| rec.path == path) {
            Some(index) => index,
            None => {
                let head = self.head();
                let record = FileTimes {
                    path: path.to_string(),
                    atime: head.atime,
                    mtime: head.mtime,
                    ctime: head.ctime,
                };
                self.records.push(record);
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }
}

/// Current wall-clock time in whole seconds since the epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
