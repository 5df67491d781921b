//! Error taxonomy shared by entries, backends, and the store facade.

use crate::state::FileState;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file {name} not found")]
    NotFound { name: String },

    #[error("{op} {name}: file is in state {current:?}, expected one of {expected:?}")]
    WrongState {
        op: &'static str,
        name: String,
        current: FileState,
        expected: Vec<FileState>,
    },

    #[error("file {name} already exists")]
    AlreadyExists { name: String },

    #[error("file {name} is already in state {state:?}")]
    AlreadyInState { name: String, state: FileState },

    #[error("file {name} still has {count} references")]
    StillReferenced { name: String, count: i64 },

    /// Advisory only: open handles survive renames on POSIX filesystems,
    /// so moves proceed rather than returning this.
    #[error("file {name} still has {count} open handles")]
    StillOpen { name: String, count: u32 },

    #[error("handle for {name} already closed")]
    AlreadyClosed { name: String },

    #[error("invalid content for {name}: {reason}")]
    InvalidContent { name: String, reason: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[inline]
    pub fn is_wrong_state(&self) -> bool {
        matches!(self, StoreError::WrongState { .. })
    }

    #[inline]
    pub fn is_still_referenced(&self) -> bool {
        matches!(self, StoreError::StillReferenced { .. })
    }

    #[inline]
    pub fn is_already_in_state(&self) -> bool {
        matches!(self, StoreError::AlreadyInState { .. })
    }

    /// Map `ENOENT` from a path probe to [`StoreError::NotFound`]; any
    /// other IO failure passes through.
    pub(crate) fn from_probe(err: io::Error, name: &str) -> StoreError {
        if err.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound {
                name: name.to_owned(),
            }
        } else {
            StoreError::Io { source: err }
        }
    }
}
