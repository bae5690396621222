//! Small file-handling helpers shared by every on-disk component.

use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

/// Memory-map a file read-only.
///
/// All engine files are immutable once written (builds are batch, queries
/// are read-only), which is what makes sharing the map across query tasks
/// sound. This is the only unsafe block in the crate; `unsafe_code` is
/// denied everywhere else.
#[allow(unsafe_code)]
pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: engine files are never mutated after finalization; every
    // writer publishes via atomic rename before a reader can open the path.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

/// Write `bytes` to `path` atomically: write a sibling temp file, then
/// rename over the target. Readers either see the old file or the new one,
/// never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
