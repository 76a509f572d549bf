//! Check out external repositories into a local cache.

pub mod cache;
pub mod connection;
pub mod process;

pub use cache::{CheckoutError, CheckoutResolver, ErrorKind, checkout_external_repository};
pub use connection::{AuthenticatedUrl, ConnectionDetails};
pub use process::{Arg, ProcessOutput, ProcessRunner, SystemRunner};

#[cfg(test)]
mod testing;
