//! Error and Result types.

use std::fmt::Debug;

/// A specialized `Result` type for this crate's pool operations.
pub type Result<T, E> = std::result::Result<T, Error<E>>;

/// Every way a pool operation can fail.
///
/// Generic over `E`, the error type of the [`crate::ConnectionFactory`] in use, so that
/// driver failures are chained in via [`std::error::Error::source`] without this crate
/// needing to know anything about the driver's own error representation.
#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    /// Raised from [`crate::Pool::new`] when pre-warming a partition's minimum connections
    /// failed. Any connections already opened during construction are closed before this
    /// error is returned.
    #[error("failed to initialize pool")]
    PoolInitFailed(#[source] E),

    /// An [`crate::Pool::acquire`] call (or the `CancellationToken`-aware variant) was
    /// cancelled before a connection became available.
    #[error("acquire was interrupted before a connection became available")]
    AcquireInterrupted,

    /// An explicit, awaited [`crate::Pool::release`] call was cancelled.
    #[error("release was interrupted")]
    ReleaseInterrupted,

    /// The pool has already been shut down.
    #[error("the pool has been shut down")]
    PoolShutDown,

    /// A connection was released to a pool that did not create it.
    #[error("connection was released to a pool it does not belong to")]
    AlienConnection,

    /// Surfaced only via [`crate::Partition`]'s `unable_to_create_more` latch; never returned
    /// directly to an `acquire` caller since they either receive a still-pooled connection or
    /// continue waiting.
    #[error("connection factory failed to produce a new connection")]
    FactoryFailure(#[source] E),
}
