//! Sorted run files spilled by the precompute scan.
//!
//! A run is an immutable, key-sorted array of `(key: u64, count: u32)`
//! records with a fixed header and a CRC32 footer. Runs are written once,
//! merged during the reduce stage, and recomputable from the index if a
//! CRC check fails.
//!
//! ```text
//! magic "CLXR" | version u32 | record_count u32 | reserved u32
//! records: (key u64, count u32) × record_count, key-sorted
//! footer: crc32 u32 | "RXLC"
//! ```

use std::path::Path;

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{Error, Result};
use crate::util::write_atomic;

pub const RUN_MAGIC: [u8; 4] = *b"CLXR";
pub const RUN_FOOTER_MAGIC: [u8; 4] = *b"RXLC";
pub const RUN_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;
const RECORD_LEN: usize = 12;
const FOOTER_LEN: usize = 8;

/// Write one sorted run atomically. `records` must already be key-sorted.
pub fn write_run(path: &Path, records: &[(u64, u32)]) -> Result<()> {
    debug_assert!(records.windows(2).all(|w| w[0].0 < w[1].0));
    let mut buf = Vec::with_capacity(HEADER_LEN + records.len() * RECORD_LEN + FOOTER_LEN);
    buf.extend_from_slice(&RUN_MAGIC);
    buf.extend_from_slice(&RUN_VERSION.to_le_bytes());
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    for &(key, count) in records {
        buf.extend_from_slice(&key.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
    }
    let mut hasher = Crc32Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf.extend_from_slice(&RUN_FOOTER_MAGIC);
    write_atomic(path, &buf)
}

/// Read and validate one run. Corruption or truncation is `IndexFormat`;
/// the shard can be recomputed.
pub fn read_run(path: &Path) -> Result<Vec<(u64, u32)>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(Error::format(format!("run file {} truncated", path.display())));
    }
    if bytes[..4] != RUN_MAGIC {
        return Err(Error::format("bad run magic"));
    }
    let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap_or_default());
    if version != RUN_VERSION {
        return Err(Error::format(format!("unsupported run version {version}")));
    }
    let record_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap_or_default()) as usize;
    let expected = HEADER_LEN + record_count * RECORD_LEN + FOOTER_LEN;
    if bytes.len() != expected {
        return Err(Error::format(format!(
            "run file {} has {} bytes, expected {expected}",
            path.display(),
            bytes.len()
        )));
    }

    let content_end = bytes.len() - FOOTER_LEN;
    if bytes[content_end + 4..] != RUN_FOOTER_MAGIC {
        return Err(Error::format("bad run footer magic"));
    }
    let stored_crc =
        u32::from_le_bytes(bytes[content_end..content_end + 4].try_into().unwrap_or_default());
    let mut hasher = Crc32Hasher::new();
    hasher.update(&bytes[..content_end]);
    if hasher.finalize() != stored_crc {
        return Err(Error::format(format!("run file {} crc mismatch", path.display())));
    }

    let mut records = Vec::with_capacity(record_count);
    let mut at = HEADER_LEN;
    for _ in 0..record_count {
        let key = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or_default());
        let count = u32::from_le_bytes(bytes[at + 8..at + 12].try_into().unwrap_or_default());
        records.push((key, count));
        at += RECORD_LEN;
    }
    Ok(records)
}

/// Merge several sorted runs, aggregating counts for identical keys.
pub fn merge_runs(runs: Vec<Vec<(u64, u32)>>) -> Vec<(u64, u64)> {
    let mut cursors: Vec<usize> = vec![0; runs.len()];
    let mut out: Vec<(u64, u64)> = Vec::new();
    loop {
        let mut min_key: Option<u64> = None;
        for (run, &cursor) in runs.iter().zip(&cursors) {
            if let Some(&(key, _)) = run.get(cursor) {
                min_key = Some(min_key.map_or(key, |m: u64| m.min(key)));
            }
        }
        let Some(key) = min_key else {
            break;
        };
        let mut total = 0u64;
        for (run, cursor) in runs.iter().zip(cursors.iter_mut()) {
            while let Some(&(k, count)) = run.get(*cursor) {
                if k != key {
                    break;
                }
                total += count as u64;
                *cursor += 1;
            }
        }
        out.push((key, total));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-0.clxr");
        let records = vec![(1u64, 2u32), (5, 1), (900, 7)];
        write_run(&path, &records).unwrap();
        assert_eq!(read_run(&path).unwrap(), records);
    }

    #[test]
    fn test_corrupt_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-0.clxr");
        write_run(&path, &[(1, 1), (2, 2)]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_LEN + 2] ^= 0x55;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_run(&path), Err(Error::IndexFormat(_))));
    }

    #[test]
    fn test_truncated_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-0.clxr");
        write_run(&path, &[(1, 1), (2, 2)]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(matches!(read_run(&path), Err(Error::IndexFormat(_))));
    }

    #[test]
    fn test_merge_aggregates_identical_keys() {
        let merged = merge_runs(vec![
            vec![(1, 1), (3, 2), (7, 1)],
            vec![(1, 4), (7, 1)],
            vec![(2, 1)],
        ]);
        assert_eq!(merged, vec![(1, 5), (2, 1), (3, 2), (7, 2)]);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_runs(vec![]).is_empty());
        assert!(merge_runs(vec![vec![], vec![]]).is_empty());
    }
}
