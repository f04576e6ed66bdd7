use byteorder::{LittleEndian, WriteBytesExt};
use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BstError, Result};
use crate::format::{read_header, read_node_at, Node, HEADER_LEN, MAGIC, NULL_OFFSET};

/// Appends key/value pairs to a store file and links each one into the
/// on-disk tree.
///
/// Every [`put`](BstWriter::put) performs two writes: the new leaf record is
/// appended at `tail`, then the 8-byte child field of its parent is patched
/// to point at it. Nothing else in the file is ever rewritten.
///
/// There is no in-memory copy of the tree; finding the parent walks the
/// records on disk from the root. Only one writer may have a file open at a
/// time.
pub struct BstWriter {
    file: File,
    /// Offset at which the next record will be appended.
    tail: u64,
    /// If `true`, every `put` is followed by `sync_data`.
    sync: bool,
}

impl BstWriter {
    /// Opens the store at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BstError::InvalidFormat`] if an existing file does not start
    /// with the store magic, and [`BstError::Io`] on any I/O failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_sync(path, false)
    }

    /// Like [`open`](BstWriter::open), optionally syncing file data to disk
    /// after every `put`.
    pub fn open_with_sync<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self> {
        let path = path.as_ref();

        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut file) => {
                read_header(&mut file)?;
                file
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => create_store(path)?,
            Err(e) => return Err(e.into()),
        };

        let tail = file.metadata()?.len();
        tracing::debug!(path = %path.display(), tail, sync, "opened store for writing");

        Ok(Self { file, tail, sync })
    }

    /// Inserts `key` → `value`.
    ///
    /// Keys equal to an existing key are placed in its left subtree, so the
    /// first value stored under a key is the one lookups return.
    ///
    /// # Errors
    ///
    /// A failed or short write is [`BstError::Io`]. A damaged record met
    /// while searching for the parent is [`BstError::Corruption`]. On error
    /// `tail` is left unchanged and the next `put` overwrites the unlinked
    /// record.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let offset = self.tail;
        let node = Node::leaf(key, value);

        self.append(offset, &node.encode()?)?;

        if let Some(slot) = self.find_parent_slot(key)? {
            self.patch(slot, offset)?;
        }

        self.tail = offset + node.encoded_len();

        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Offset at which the next record will be written.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.tail == HEADER_LEN
    }

    /// Syncs the file to disk and releases the handle.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn append(&mut self, offset: u64, record: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(record)?;
        tracing::trace!(offset, len = record.len(), "appended record");
        Ok(())
    }

    /// Overwrites one child field with `child`. This is the only in-place
    /// mutation the format allows.
    fn patch(&mut self, slot: u64, child: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(slot))?;
        self.file.write_u64::<LittleEndian>(child)?;
        tracing::trace!(slot, child, "patched child pointer");
        Ok(())
    }

    /// Walks from the root to the node that will become the parent of `key`
    /// and returns the file position of its empty child field, or `None` when
    /// the tree has no nodes yet.
    fn find_parent_slot(&mut self, key: &[u8]) -> Result<Option<u64>> {
        if self.is_empty() {
            return Ok(None);
        }

        let mut offset = HEADER_LEN;
        loop {
            let node = read_node_at(&self.file, offset, self.tail)?;

            let (next, slot) = match key.cmp(node.key.as_slice()) {
                Ordering::Less | Ordering::Equal => (node.left, node.left_slot(offset)),
                Ordering::Greater => (node.right, node.right_slot(offset)),
            };

            if next == NULL_OFFSET {
                return Ok(Some(slot));
            }
            // Children are always appended after their parent.
            if next <= offset {
                return Err(BstError::corruption(offset, "child offset precedes parent"));
            }
            offset = next;
        }
    }
}

/// Creates a fresh store holding only the header. Fails if `path` already
/// exists, so a file created concurrently is never overwritten.
fn create_store(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(&MAGIC)?;
    tracing::debug!(path = %path.display(), "created new store");
    Ok(file)
}
