//! Cache directory path management
//!
//! This module provides the `CheckoutPaths` struct which maps untrusted
//! repository/reference pairs onto the cache directory layout:
//!
//! ```text
//! <cache root>/
//! ├── <repository id>/
//! │   └── <reference>/              # Working tree + .git
//! ├── .extrepo-staging/
//! │   └── <pid>.<n>/                # In-flight clone, renamed into place
//! └── .extrepo-locks/
//!     └── <sha256 of location>.lock # flock-based locking
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};

/// Directory holding in-flight clones.
pub const STAGING_DIR: &str = ".extrepo-staging";

/// Directory holding per-checkout lock files.
pub const LOCKS_DIR: &str = ".extrepo-locks";

/// Name of the git metadata directory inside a checkout.
pub const GIT_DIR: &str = ".git";

/// Why a repository/reference pair was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    ControlCharacter,
    LeadingDash,
    OutsideRoot,
    Reserved,
}

/// Manages all filesystem paths under the cache root
#[derive(Debug, Clone)]
pub struct CheckoutPaths {
    root: PathBuf,
}

impl CheckoutPaths {
    /// Creates a new CheckoutPaths rooted at `root`.
    ///
    /// A relative root is made absolute against the current directory; no
    /// symlinks are resolved.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: normalize(&root),
        })
    }

    /// Returns the root cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the staging directory path: `{root}/.extrepo-staging`
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Returns the locks directory path: `{root}/.extrepo-locks`
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// Returns the checkout location: `{root}/{repository}/{reference}`.
    ///
    /// The pieces are joined and `.`/`..` segments resolved lexically. The
    /// result must be strictly below the root and must not land in one of the
    /// reserved directories.
    pub fn checkout_location(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<PathBuf, Rejection> {
        screen(repository)?;
        screen(reference)?;
        if reference.starts_with('-') {
            return Err(Rejection::LeadingDash);
        }

        let mut joined: OsString = self.root.as_os_str().to_owned();
        for piece in [repository, reference] {
            joined.push(MAIN_SEPARATOR_STR);
            joined.push(piece);
        }
        let location = normalize(Path::new(&joined));

        let relative = location
            .strip_prefix(&self.root)
            .map_err(|_| Rejection::OutsideRoot)?;
        match relative.components().next() {
            None => Err(Rejection::OutsideRoot),
            Some(Component::Normal(first)) if first == STAGING_DIR || first == LOCKS_DIR => {
                Err(Rejection::Reserved)
            }
            Some(_) => Ok(location),
        }
    }

    /// Returns `location` relative to the root, the key its lock is named by.
    pub fn relative<'a>(&self, location: &'a Path) -> &'a Path {
        location.strip_prefix(&self.root).unwrap_or(location)
    }
}

impl Default for CheckoutPaths {
    /// Creates a CheckoutPaths using the system cache directory + "extrepo/checkouts"
    ///
    /// Uses `dirs::cache_dir()` which resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let root = cache_dir.join("extrepo").join("checkouts");
        Self::new(&root).unwrap_or(Self {
            root: normalize(&root),
        })
    }
}

fn screen(value: &str) -> Result<(), Rejection> {
    if value.is_empty() {
        return Err(Rejection::Empty);
    }
    if value.chars().any(char::is_control) {
        return Err(Rejection::ControlCharacter);
    }
    Ok(())
}

/// Lexically resolve `.` and `..` segments and repeated separators.
///
/// `..` never climbs above the filesystem root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
