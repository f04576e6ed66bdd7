//! Store file binary format: header constants, node record encode/decode and
//! the positioned node read shared by the writer and reader descents.
//!
//! A node record is laid out as:
//!
//! ```text
//! [record_size: u64][key_len: u64][key][val_len: u64][val][left: u64][right: u64]
//! ```
//!
//! `record_size` counts every byte after itself. Child fields hold absolute
//! file offsets, `0` meaning "no child".

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{BstError, Result};

/// Magic bytes at offset 0 of every store file.
pub const MAGIC: [u8; 3] = [0x0D, 0x0B, 0x0D];

/// Length of the header, which is also the offset of the root node.
pub const HEADER_LEN: u64 = MAGIC.len() as u64;

/// Child offset meaning "no child". Never a valid node offset because the
/// header occupies offset 0.
pub const NULL_OFFSET: u64 = 0;

/// Width of every integer field in a record.
const U64_BYTES: u64 = 8;

/// Smallest possible record body: both length fields plus both children.
pub const MIN_RECORD_BODY: u64 = 4 * U64_BYTES;

/// One decoded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub left: u64,
    pub right: u64,
}

impl Node {
    /// A fresh leaf, as written by every append.
    pub fn leaf(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
            left: NULL_OFFSET,
            right: NULL_OFFSET,
        }
    }

    /// Byte length of the record body (the value stored in `record_size`).
    pub fn body_len(&self) -> u64 {
        MIN_RECORD_BODY + self.key.len() as u64 + self.value.len() as u64
    }

    /// Total on-disk length including the `record_size` prefix.
    pub fn encoded_len(&self) -> u64 {
        U64_BYTES + self.body_len()
    }

    /// File position of the `left` field for a node stored at `node_offset`.
    pub fn left_slot(&self, node_offset: u64) -> u64 {
        node_offset + 3 * U64_BYTES + self.key.len() as u64 + self.value.len() as u64
    }

    /// File position of the `right` field for a node stored at `node_offset`.
    pub fn right_slot(&self, node_offset: u64) -> u64 {
        self.left_slot(node_offset) + U64_BYTES
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_node(&self.key, &self.value, self.left, self.right)
    }
}

/// Serializes a complete record, `record_size` prefix included.
pub fn encode_node(key: &[u8], value: &[u8], left: u64, right: u64) -> Result<Vec<u8>> {
    let body_len = MIN_RECORD_BODY + key.len() as u64 + value.len() as u64;
    let mut buf = Vec::with_capacity((U64_BYTES + body_len) as usize);

    buf.write_u64::<LittleEndian>(body_len)?;
    buf.write_u64::<LittleEndian>(key.len() as u64)?;
    buf.extend_from_slice(key);
    buf.write_u64::<LittleEndian>(value.len() as u64)?;
    buf.extend_from_slice(value);
    buf.write_u64::<LittleEndian>(left)?;
    buf.write_u64::<LittleEndian>(right)?;
    Ok(buf)
}

/// Decodes a record body (everything after `record_size`).
///
/// `offset` is the record's file position and is only used for error
/// reporting.
///
/// # Errors
///
/// Returns [`BstError::Corruption`] if the body is shorter than the lengths
/// it declares.
pub fn decode_node(body: &[u8], offset: u64) -> Result<Node> {
    let mut rdr = body;

    let key = read_field(&mut rdr, offset, "key")?;
    let value = read_field(&mut rdr, offset, "value")?;
    let left = rdr
        .read_u64::<LittleEndian>()
        .map_err(|_| BstError::corruption(offset, "truncated left child"))?;
    let right = rdr
        .read_u64::<LittleEndian>()
        .map_err(|_| BstError::corruption(offset, "truncated right child"))?;

    Ok(Node {
        key,
        value,
        left,
        right,
    })
}

/// Reads one `len(u64) | bytes` field, advancing `rdr`.
fn read_field(rdr: &mut &[u8], offset: u64, what: &'static str) -> Result<Vec<u8>> {
    let len = rdr
        .read_u64::<LittleEndian>()
        .map_err(|_| BstError::corruption(offset, what))?;
    if len > rdr.len() as u64 {
        return Err(BstError::corruption(offset, what));
    }
    let (field, rest) = rdr.split_at(len as usize);
    *rdr = rest;
    Ok(field.to_vec())
}

/// Checks the leading bytes of a file against [`MAGIC`].
///
/// # Errors
///
/// Returns [`BstError::InvalidFormat`] on any mismatch, including a buffer
/// shorter than the header.
pub fn validate_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] == MAGIC {
        return Ok(());
    }
    tracing::warn!(found = ?bytes, "store header mismatch");
    Err(BstError::InvalidFormat {
        found: bytes.iter().take(MAGIC.len()).copied().collect(),
    })
}

/// Reads the header from the start of `r` and validates it.
///
/// A file too short to hold the header is reported as
/// [`BstError::InvalidFormat`]; other read failures propagate as I/O errors.
pub fn read_header<R: Read + Seek>(r: &mut R) -> Result<()> {
    r.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(MAGIC.len());
    r.by_ref().take(HEADER_LEN).read_to_end(&mut buf)?;
    validate_header(&buf)
}

/// Positioned reads that leave any shared file cursor untouched, so one
/// handle can serve concurrent lookups.
pub trait ReadAt {
    /// Fills `buf` from `offset`, failing with `UnexpectedEof` on a short read.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Reads and decodes the node stored at `offset`.
///
/// `file_len` bounds the declared record size so a damaged size field is
/// reported as corruption instead of driving a huge allocation.
///
/// # Errors
///
/// Short reads and inconsistent lengths are [`BstError::Corruption`]; other
/// read failures are [`BstError::Io`].
pub fn read_node_at<R: ReadAt + ?Sized>(r: &R, offset: u64, file_len: u64) -> Result<Node> {
    let mut size_buf = [0u8; U64_BYTES as usize];
    r.read_exact_at(&mut size_buf, offset)
        .map_err(|e| BstError::from_read(e, offset, "truncated record size"))?;
    let record_size = LittleEndian::read_u64(&size_buf);

    if record_size < MIN_RECORD_BODY {
        tracing::warn!(offset, record_size, "record size below minimum");
        return Err(BstError::corruption(offset, "record size too small"));
    }
    let body_end = offset
        .checked_add(U64_BYTES)
        .and_then(|start| start.checked_add(record_size));
    if body_end.map_or(true, |end| end > file_len) {
        tracing::warn!(offset, record_size, file_len, "record extends past end of file");
        return Err(BstError::corruption(offset, "record extends past end of file"));
    }

    let mut body = vec![0u8; record_size as usize];
    r.read_exact_at(&mut body, offset + U64_BYTES)
        .map_err(|e| BstError::from_read(e, offset, "truncated record body"))?;

    decode_node(&body, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_layout_is_little_endian() {
        let bytes = encode_node(b"ab", b"xyz", 0x0102, 0).unwrap();

        // record_size = 32 + 2 + 3
        assert_eq!(&bytes[0..8], &37u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_le_bytes());
        assert_eq!(&bytes[16..18], b"ab");
        assert_eq!(&bytes[18..26], &3u64.to_le_bytes());
        assert_eq!(&bytes[26..29], b"xyz");
        assert_eq!(&bytes[29..37], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[37..45], &[0u8; 8]);
        assert_eq!(bytes.len(), 45);
    }

    #[test]
    fn decode_inverts_encode() {
        let node = Node {
            key: b"hello".to_vec(),
            value: b"world".to_vec(),
            left: 99,
            right: 1234,
        };
        let bytes = node.encode().unwrap();
        assert_eq!(bytes.len() as u64, node.encoded_len());

        let decoded = decode_node(&bytes[8..], HEADER_LEN).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn empty_key_and_value() {
        let node = Node::leaf(b"", b"");
        assert_eq!(node.body_len(), MIN_RECORD_BODY);
        let decoded = decode_node(&node.encode().unwrap()[8..], HEADER_LEN).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn decode_rejects_short_body() {
        let bytes = encode_node(b"key", b"value", 0, 0).unwrap();
        let body = &bytes[8..];

        for cut in [0, 4, 10, body.len() - 1] {
            let err = decode_node(&body[..cut], 3).unwrap_err();
            assert!(
                matches!(err, BstError::Corruption { offset: 3, .. }),
                "cut at {cut} gave {err:?}"
            );
        }
    }

    #[test]
    fn decode_rejects_oversized_key_len() {
        let mut body = Vec::new();
        body.extend_from_slice(&u64::MAX.to_le_bytes());
        body.extend_from_slice(&[0u8; 24]);
        let err = decode_node(&body, 3).unwrap_err();
        assert!(matches!(err, BstError::Corruption { .. }));
    }

    #[test]
    fn slot_positions_point_at_child_fields() {
        let node = Node {
            key: b"k".to_vec(),
            value: b"vv".to_vec(),
            left: 0x1111,
            right: 0x2222,
        };
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&node.encode().unwrap());

        let left = node.left_slot(HEADER_LEN) as usize;
        let right = node.right_slot(HEADER_LEN) as usize;
        assert_eq!(&file[left..left + 8], &0x1111u64.to_le_bytes());
        assert_eq!(&file[right..right + 8], &0x2222u64.to_le_bytes());
        assert_eq!(right + 8, file.len());
    }

    #[test]
    fn header_validation() {
        assert!(validate_header(&MAGIC).is_ok());
        assert!(validate_header(&[0x0D, 0x0B, 0x0D, 0xFF]).is_ok());
        assert!(matches!(
            validate_header(&[0x0D, 0x0B, 0x0E]),
            Err(BstError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_header(&[0x0D, 0x0B]),
            Err(BstError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_header(&[]),
            Err(BstError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn read_header_from_cursor() {
        let mut good = Cursor::new(MAGIC.to_vec());
        assert!(read_header(&mut good).is_ok());

        let mut short = Cursor::new(vec![0x0D]);
        assert!(matches!(
            read_header(&mut short),
            Err(BstError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn slice_read_at_bounds() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 2];
        data[..].read_exact_at(&mut buf, 3).unwrap();
        assert_eq!(buf, [4, 5]);

        let err = data[..].read_exact_at(&mut buf, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let err = data[..].read_exact_at(&mut buf, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn read_node_at_offset() {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&encode_node(b"a", b"1", 0, 0).unwrap());
        let second = file.len() as u64;
        file.extend_from_slice(&encode_node(b"b", b"2", 7, 0).unwrap());
        let len = file.len() as u64;

        let node = read_node_at(file.as_slice(), second, len).unwrap();
        assert_eq!(node.key, b"b");
        assert_eq!(node.value, b"2");
        assert_eq!(node.left, 7);

        let root = read_node_at(file.as_slice(), HEADER_LEN, len).unwrap();
        assert_eq!(root.key, b"a");
    }

    #[test]
    fn read_node_truncated_is_corruption() {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&encode_node(b"key", b"value", 0, 0).unwrap());
        file.truncate(file.len() - 5);
        let len = file.len() as u64;

        let err = read_node_at(file.as_slice(), HEADER_LEN, len).unwrap_err();
        assert!(matches!(err, BstError::Corruption { offset: 3, .. }));
    }

    #[test]
    fn read_node_truncated_size_field_is_corruption() {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&[1, 2, 3]);

        // Claim a larger file so the bound check does not fire first.
        let err = read_node_at(file.as_slice(), HEADER_LEN, 1_000).unwrap_err();
        assert!(matches!(err, BstError::Corruption { .. }));
    }

    #[test]
    fn read_node_rejects_tiny_record_size() {
        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&8u64.to_le_bytes());
        file.extend_from_slice(&[0u8; 8]);
        let len = file.len() as u64;

        let err = read_node_at(file.as_slice(), HEADER_LEN, len).unwrap_err();
        assert!(matches!(
            err,
            BstError::Corruption {
                reason: "record size too small",
                ..
            }
        ));
    }
}
