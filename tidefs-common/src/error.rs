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

use thiserror::Error;

/// Client-side error taxonomy. `NotFound` is a normal negative outcome of
/// metadata lookups, not a transport fault.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("name too long: {0}")]
    NameTooLong(String),

    #[error("permission denied: {0}")]
    NoPermission(String),

    #[error("bad file descriptor: {0}")]
    BadDescriptor(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("end of stream")]
    EndOfStream,

    #[error("too many levels of symbolic links: {0}")]
    LoopExists(String),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    Common(String),
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound(path.into())
    }

    pub fn common(msg: impl Into<String>) -> Self {
        FsError::Common(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    /// POSIX errno for the OS-facing layer.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::NameTooLong(_) => libc::ENAMETOOLONG,
            FsError::NoPermission(_) => libc::EACCES,
            FsError::BadDescriptor(_) => libc::EBADF,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::EndOfStream => libc::ENODATA,
            FsError::LoopExists(_) => libc::ELOOP,
            FsError::IO(_) | FsError::Common(_) => libc::EIO,
        }
    }
}

impl From<String> for FsError {
    fn from(value: String) -> Self {
        FsError::Common(value)
    }
}

impl From<&str> for FsError {
    fn from(value: &str) -> Self {
        FsError::Common(value.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Build an `Err(FsError::Common)` from a format string.
#[macro_export]
macro_rules! err_box {
    ($($arg:tt)*) => {
        Err($crate::FsError::Common(format!($($arg)*)))
    };
}
