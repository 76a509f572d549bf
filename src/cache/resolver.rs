//! Checkout resolver
//!
//! Turns an untrusted repository/reference pair into a directory under the
//! cache root holding a working tree of that repository at that reference.
//!
//! 1. Compute the location and check it stays under the cache root
//! 2. Return it if it already exists
//! 3. Otherwise, under a per-location lock: clone into a staging directory,
//!    check out the reference, drop the credential from the recorded remote,
//!    rename into place

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::git::{self, GitCli, GitError};
use super::lock::{CheckoutLock, DEFAULT_LOCK_TIMEOUT, LockError};
use super::paths::CheckoutPaths;
use super::staging;
use crate::connection::{ConnectionDetails, ConnectionError};
use crate::process::{ProcessRunner, SystemRunner};

/// Errors returned by [`CheckoutResolver::resolve`]. None of them carry the
/// credential.
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// The location would escape the cache root, or the input is unusable.
    #[error("'{repository}@{reference}' is not a valid repository and reference.")]
    InvalidReference {
        repository: String,
        reference: String,
    },
    /// The connection details cannot produce an authenticated clone URL.
    #[error("invalid connection details: {0}")]
    InvalidConnection(#[from] ConnectionError),
    /// git clone or git checkout failed.
    #[error("failed to check out '{repository}@{reference}': {source}")]
    ExternalProcess {
        repository: String,
        reference: String,
        #[source]
        source: GitError,
    },
    /// Another resolver held the location's lock for too long.
    #[error("timed out waiting for lock on {}", location.display())]
    LockTimeout { location: PathBuf },
    /// Underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of a [`CheckoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed bad input; retrying will not help.
    InvalidInput,
    /// The operation failed: credentials, network, reference or disk.
    OperationFailed,
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::InvalidReference { .. } | CheckoutError::InvalidConnection(_) => {
                ErrorKind::InvalidInput
            }
            CheckoutError::ExternalProcess { .. }
            | CheckoutError::LockTimeout { .. }
            | CheckoutError::Io(_) => ErrorKind::OperationFailed,
        }
    }

    fn invalid_reference(repository: &str, reference: &str) -> Self {
        CheckoutError::InvalidReference {
            repository: repository.to_string(),
            reference: reference.to_string(),
        }
    }
}

/// Resolves repository/reference pairs to checkouts under one cache root.
pub struct CheckoutResolver<R = SystemRunner> {
    paths: CheckoutPaths,
    git: GitCli<R>,
    lock_timeout: Duration,
}

impl CheckoutResolver<SystemRunner> {
    /// Create a resolver rooted at `cache_root`, running the system git.
    pub fn new(cache_root: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_runner(cache_root, SystemRunner::new())
    }
}

impl<R: ProcessRunner> CheckoutResolver<R> {
    /// Create a resolver that runs git through `runner`.
    pub fn with_runner(cache_root: impl AsRef<Path>, runner: R) -> io::Result<Self> {
        Ok(Self {
            paths: CheckoutPaths::new(cache_root)?,
            git: GitCli::with_runner(runner),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Set how long to wait for a concurrent resolver of the same location.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Use a different git executable.
    pub fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git = self.git.with_git_path(git_path);
        self
    }

    /// Return the cache paths used by this resolver.
    pub fn paths(&self) -> &CheckoutPaths {
        &self.paths
    }

    /// Check out `repository` at `reference` and return the checkout directory.
    ///
    /// An existing directory at the location is returned as-is, without
    /// looking at its contents.
    pub fn resolve(
        &self,
        repository: &str,
        reference: &str,
        connection: &ConnectionDetails,
    ) -> Result<PathBuf, CheckoutError> {
        log::info!("Checking out {}", repository);

        let location = self
            .paths
            .checkout_location(repository, reference)
            .map_err(|rejection| {
                log::debug!("Rejected {}@{}: {:?}", repository, reference, rejection);
                CheckoutError::invalid_reference(repository, reference)
            })?;

        if location.exists() {
            log::debug!("Reusing cached checkout at {}", location.display());
            return Ok(location);
        }

        let relative = self.paths.relative(&location);
        let acquired = CheckoutLock::acquire(&self.paths.locks_dir(), relative, self.lock_timeout);
        let _lock = match acquired {
            Ok(lock) => lock,
            Err(LockError::TimedOut { waited, .. }) => {
                log::debug!("Gave up on {} after {:?}", location.display(), waited);
                return Err(CheckoutError::LockTimeout { location });
            }
            Err(LockError::Io { source, .. }) => return Err(CheckoutError::Io(source)),
        };

        // Another resolver may have finished while we waited.
        if location.exists() {
            log::debug!("Checkout appeared while waiting: {}", location.display());
            return Ok(location);
        }

        let url = connection.clone_url(repository)?;
        let stage = staging::allocate(&self.paths.staging_dir())?;
        log::debug!("Cloning {} into {}", url.redacted(), stage.display());

        let process_error = |source: GitError| CheckoutError::ExternalProcess {
            repository: repository.to_string(),
            reference: reference.to_string(),
            source: source.redact(&url),
        };

        if let Err(err) = self.git.clone_repository(&url, &stage) {
            staging::discard(&stage);
            return Err(process_error(err));
        }

        if let Err(err) = self.git.checkout(&stage, reference) {
            staging::discard(&stage);
            return Err(process_error(err));
        }

        if let Err(err) = git::strip_remote_credentials(&stage, &url) {
            staging::discard(&stage);
            return Err(err.into());
        }

        if let Err(err) = staging::promote(&stage, &location) {
            staging::discard(&stage);
            return Err(err.into());
        }

        Ok(location)
    }
}

/// Check out `repository` at `reference` under `cache_root` with the system git.
pub fn checkout_external_repository(
    repository: &str,
    reference: &str,
    connection: &ConnectionDetails,
    cache_root: impl AsRef<Path>,
) -> Result<PathBuf, CheckoutError> {
    CheckoutResolver::new(cache_root)?.resolve(repository, reference, connection)
}
