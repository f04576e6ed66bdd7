//! Subcommand implementations, kept apart from argument parsing so they can
//! be tested directly.

use anyhow::{Context, Result};
use diskbst::{BstError, BstReader, BstWriter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Basic facts about a store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub file_len: u64,
    pub empty: bool,
}

pub fn put(path: &Path, key: &[u8], value: &[u8], sync: bool) -> Result<()> {
    let mut w = BstWriter::open_with_sync(path, sync)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    w.put(key, value)?;
    w.close()?;
    tracing::info!(path = %path.display(), "stored 1 pair");
    Ok(())
}

/// Returns `Ok(None)` when the key is absent; every other failure is an error.
pub fn get(path: &Path, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let r = BstReader::open(path)
        .with_context(|| format!("opening {} for reading", path.display()))?;
    match r.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(BstError::KeyNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Inserts every `key<TAB>value` line of `input`, in file order. Lines with
/// no tab are skipped. Returns the number of pairs written.
pub fn load(path: &Path, input: &Path, sync: bool) -> Result<usize> {
    let src = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut w = BstWriter::open_with_sync(path, sync)
        .with_context(|| format!("opening {} for writing", path.display()))?;

    let mut count = 0usize;
    for (lineno, line) in BufReader::new(src).lines().enumerate() {
        let line = line?;
        let Some((key, value)) = line.split_once('\t') else {
            if !line.is_empty() {
                tracing::warn!(line = lineno + 1, "skipping line without tab separator");
            }
            continue;
        };
        w.put(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("inserting line {}", lineno + 1))?;
        count += 1;
    }

    w.close()?;
    tracing::info!(path = %path.display(), count, "bulk load finished");
    Ok(count)
}

pub fn info(path: &Path) -> Result<StoreInfo> {
    let r = BstReader::open(path)
        .with_context(|| format!("opening {} for reading", path.display()))?;
    let file_len = std::fs::metadata(path)?.len();
    let empty = r.is_empty()?;
    r.close();
    Ok(StoreInfo { file_len, empty })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cli.bst");

        put(&path, b"name", b"alice", false)?;
        put(&path, b"city", b"paris", true)?;

        assert_eq!(get(&path, b"name")?, Some(b"alice".to_vec()));
        assert_eq!(get(&path, b"city")?, Some(b"paris".to_vec()));
        assert_eq!(get(&path, b"nope")?, None);
        Ok(())
    }

    #[test]
    fn get_on_missing_store_is_error() {
        let dir = tempdir().unwrap();
        assert!(get(&dir.path().join("missing.bst"), b"k").is_err());
    }

    #[test]
    fn load_skips_lines_without_tab() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("load.bst");
        let input = dir.path().join("pairs.tsv");
        std::fs::write(&input, "a\t1\nbroken line\n\nb\t2\t3\nc\t\n")?;

        assert_eq!(load(&path, &input, false)?, 3);
        assert_eq!(get(&path, b"a")?, Some(b"1".to_vec()));
        // Only the first tab separates key from value.
        assert_eq!(get(&path, b"b")?, Some(b"2\t3".to_vec()));
        assert_eq!(get(&path, b"c")?, Some(Vec::new()));
        assert_eq!(get(&path, b"broken line")?, None);
        Ok(())
    }

    #[test]
    fn info_reports_size_and_emptiness() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("info.bst");

        BstWriter::open(&path)?.close()?;
        let before = info(&path)?;
        assert_eq!(
            before,
            StoreInfo {
                file_len: 3,
                empty: true
            }
        );

        put(&path, b"k", b"v", false)?;
        let after = info(&path)?;
        assert!(!after.empty);
        assert_eq!(after.file_len, 3 + 8 + 32 + 1 + 1);
        Ok(())
    }

    #[test]
    fn info_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.bin");
        std::fs::write(&path, b"not a store").unwrap();
        assert!(info(&path).is_err());
    }
}
