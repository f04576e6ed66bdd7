//! # diskbst — on-disk binary search tree
//!
//! A persistent key/value store whose index *is* the file: an unbalanced
//! binary search tree serialized into a single append-only file, with child
//! links stored as absolute byte offsets.
//!
//! [`BstWriter`] appends one record per `put` and links it under its parent by
//! overwriting that parent's 8-byte child field. [`BstReader`] answers `get`
//! by walking the records on disk from the root. Neither keeps the tree in
//! memory.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ HEADER (offset 0, 3 bytes)                    │
//! │                                               │
//! │ magic = 0x0D 0x0B 0x0D                        │
//! ├───────────────────────────────────────────────┤
//! │ ROOT NODE (always at offset 3)                │
//! │                                               │
//! │ record_size (u64) | key_len (u64) | key       │
//! │ val_len (u64) | val                           │
//! │ left (u64) | right (u64)                      │
//! ├───────────────────────────────────────────────┤
//! │ ... further nodes in insertion order ...      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `record_size` counts the bytes after
//! itself. A child offset of `0` means "no child"; no node can live there
//! because the header does.
//!
//! ## Ordering
//!
//! Keys compare bytewise. Inserts route `key <= node.key` left and
//! `key > node.key` right, so a repeated key lands in the left subtree of
//! its first occurrence. Lookups stop at the first equal key, which means
//! the **first** value stored under a key is the one returned.
//!
//! ## Example
//! ```rust
//! use diskbst::{BstReader, BstWriter};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("store.bst");
//!
//! let mut w = BstWriter::open(&path).unwrap();
//! w.put(b"hello", b"world").unwrap();
//! w.close().unwrap();
//!
//! let r = BstReader::open(&path).unwrap();
//! assert_eq!(r.get(b"hello").unwrap(), b"world");
//! assert!(r.get(b"blah").unwrap_err().is_not_found());
//! ```

mod error;
pub mod format;
mod reader;
mod writer;

pub use error::{BstError, Result};
pub use format::{HEADER_LEN, MAGIC};
pub use reader::BstReader;
pub use writer::BstWriter;
