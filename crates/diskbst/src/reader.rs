use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;

use crate::error::{BstError, Result};
use crate::format::{read_header, read_node_at, HEADER_LEN, NULL_OFFSET};

/// Read-only handle for point lookups in a store file.
///
/// Nothing is cached: each [`get`](BstReader::get) walks the tree from the
/// root, reading one record per level straight from the file. A lookup
/// therefore sees records appended by a writer after this reader was opened.
pub struct BstReader {
    file: File,
}

impl BstReader {
    /// Opens an existing store and validates its header.
    ///
    /// # Errors
    ///
    /// Returns [`BstError::Io`] if the file cannot be opened (including when
    /// it does not exist) and [`BstError::InvalidFormat`] if the header does
    /// not match.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        read_header(&mut file)?;
        tracing::debug!(path = %path.as_ref().display(), "opened store for reading");
        Ok(Self { file })
    }

    /// Looks up `key`.
    ///
    /// The descent stops at the first node whose key equals `key`. Later
    /// duplicates hang below it on the left and are never returned.
    ///
    /// # Errors
    ///
    /// [`BstError::KeyNotFound`] if the key is absent. A truncated or
    /// inconsistent record on the path is [`BstError::Corruption`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let file_len = self.file.metadata()?.len();
        if file_len <= HEADER_LEN {
            return Err(BstError::KeyNotFound);
        }

        let mut offset = HEADER_LEN;
        loop {
            let node = read_node_at(&self.file, offset, file_len)?;

            let next = match key.cmp(node.key.as_slice()) {
                Ordering::Equal => return Ok(node.value),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };

            if next == NULL_OFFSET {
                return Err(BstError::KeyNotFound);
            }
            if next <= offset {
                return Err(BstError::corruption(offset, "child offset precedes parent"));
            }
            offset = next;
        }
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.file.metadata()?.len() <= HEADER_LEN)
    }

    /// Releases the file handle.
    pub fn close(self) {
        drop(self.file);
    }
}
