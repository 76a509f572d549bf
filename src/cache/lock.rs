//! Per-checkout exclusive locks.
//!
//! One lock file per checkout location, in the cache's locks directory. The
//! file is named after the SHA-256 of the location relative to the cache root,
//! so its name has the same length however long the repository and reference
//! are. Lock files are never removed.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// How long a resolver waits for another one working on the same checkout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const FIRST_PAUSE: Duration = Duration::from_millis(10);
const LONGEST_PAUSE: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum LockError {
    /// The lock stayed held by someone else for the whole timeout.
    #[error("gave up after {waited:?} waiting for {}", path.display())]
    TimedOut { path: PathBuf, waited: Duration },
    /// The lock file could not be created or locked.
    #[error("cannot lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive hold on one checkout location, released on drop.
///
/// `flock` locks belong to the open file description, so two threads of the
/// same process exclude each other just like two processes do.
#[derive(Debug)]
pub struct CheckoutLock {
    file: File,
    path: PathBuf,
}

impl CheckoutLock {
    /// Lock file name for a checkout at `relative` (below the cache root).
    pub fn file_name(relative: &Path) -> String {
        let digest = Sha256::digest(relative.as_os_str().as_encoded_bytes());
        format!("{}.lock", hex::encode(digest))
    }

    /// Lock the checkout at `relative`, waiting at most `timeout`.
    ///
    /// Creates `locks_dir` if needed.
    pub fn acquire(
        locks_dir: &Path,
        relative: &Path,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let path = locks_dir.join(Self::file_name(relative));
        let io_error = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(locks_dir).map_err(io_error)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut pause = FIRST_PAUSE;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(e) if e.kind() != io::ErrorKind::WouldBlock => return Err(io_error(e)),
                Err(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::TimedOut {
                    path,
                    waited: started.elapsed(),
                });
            }
            if pause == FIRST_PAUSE {
                log::debug!("Waiting for {} (held elsewhere)", relative.display());
            }
            std::thread::sleep(pause.min(deadline - now));
            pause = (pause * 2).min(LONGEST_PAUSE);
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckoutLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
