//! Staging directories for in-flight clones.
//!
//! A clone is built in a private directory next to the cache entries and only
//! renamed to its checkout location once checkout succeeded. The rename is
//! atomic on POSIX, so readers never observe a half-populated checkout.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique staging names within a process
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh staging path inside `staging_dir`.
///
/// The directory itself is not created (`git clone` creates it), only its
/// parent. Names are `{pid}.{counter}`; a name left over from a crashed run is
/// skipped.
pub fn allocate(staging_dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(staging_dir)?;
    loop {
        let counter = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = staging_dir.join(format!("{}.{}", std::process::id(), counter));
        match std::fs::symlink_metadata(&candidate) {
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(e),
        }
    }
}

/// Move a finished staging directory to `dest`, creating `dest`'s parents.
pub fn promote(staging: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(staging, dest)
}

/// Remove a staging directory, ignoring errors.
pub fn discard(staging: &Path) {
    if std::fs::remove_dir_all(staging).is_err() {
        let _ = std::fs::remove_file(staging);
    }
}
