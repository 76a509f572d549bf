//! Checkout cache: paths, locking, git and the resolver tying them together.

mod git;
mod lock;
mod paths;
mod resolver;
mod staging;

pub use git::{GitCli, GitError, GitOperation, strip_remote_credentials};
pub use lock::{CheckoutLock, DEFAULT_LOCK_TIMEOUT, LockError};
pub use paths::{CheckoutPaths, Rejection};
pub use resolver::{CheckoutError, CheckoutResolver, ErrorKind, checkout_external_repository};
