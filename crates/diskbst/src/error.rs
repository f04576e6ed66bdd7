use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BstError>;

#[derive(Debug, Error)]
pub enum BstError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The first bytes of the file are not the store magic.
    #[error("invalid store header: {found:02x?}")]
    InvalidFormat { found: Vec<u8> },

    /// A node record could not be read or decoded in full.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: &'static str },

    #[error("key not found")]
    KeyNotFound,
}

impl BstError {
    /// Returns `true` for the expected negative lookup result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BstError::KeyNotFound)
    }

    pub(crate) fn corruption(offset: u64, reason: &'static str) -> Self {
        BstError::Corruption { offset, reason }
    }

    /// Maps a failed positioned read onto the error taxonomy: running out of
    /// bytes means the file is truncated, anything else is a plain I/O failure.
    pub(crate) fn from_read(err: io::Error, offset: u64, reason: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BstError::corruption(offset, reason)
        } else {
            BstError::Io(err)
        }
    }
}
