use thiserror::Error;

/// Failures produced by the operation handlers.
///
/// Each variant corresponds to one POSIX errno; the callback layer converts
/// with [`FsError::errno`] when replying to the kernel. Nothing is recovered
/// internally, every error propagates to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such entry")]
    NotFound,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("entry already exists")]
    Exists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("resource busy")]
    Busy,
    #[error("permission denied")]
    Access,
    #[error("operation not permitted")]
    Perm,
    #[error("name too long")]
    NameTooLong,
    #[error("invalid argument")]
    Invalid,
    #[error("i/o error")]
    Io,
}

impl FsError {
    /// The errno value reported to the host for this failure.
    pub fn errno(self) -> libc::c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotDir => libc::ENOTDIR,
            FsError::IsDir => libc::EISDIR,
            FsError::Exists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Busy => libc::EBUSY,
            FsError::Access => libc::EACCES,
            FsError::Perm => libc::EPERM,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::Invalid => libc::EINVAL,
            FsError::Io => libc::EIO,
        }
    }
}
