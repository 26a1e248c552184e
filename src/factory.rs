//! The driver-facing seam: everything the pool needs from a concrete database client.

use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;

/// Produces connections and knows how to tell if one is still alive.
///
/// Implementors own whatever connection parameters they need (a DSN, a credentials
/// struct, TLS config, ...); the pool never sees them. This is deliberately a single
/// small seam: everything downstream of `connect` is the driver's business.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type this factory produces.
    type Connection: RawConnection;

    /// The error type surfaced by `connect` and by the connection's own operations.
    type Error: StdError + Send + Sync + 'static;

    /// Open a new connection. May take as long as a real network round-trip; the pool
    /// calls this from its background growth loop and during construction, never on
    /// the fast path of `acquire`.
    fn connect(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// An `Arc` of a factory is itself a factory, so callers can keep their own handle
/// to it (to flip fault-injection switches, read metrics, etc.) alongside the one
/// the pool holds.
impl<F: ConnectionFactory> ConnectionFactory for Arc<F> {
    type Connection = F::Connection;
    type Error = F::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        (**self).connect().await
    }
}

/// A single open connection to a database, or whatever resource this pool manages.
pub trait RawConnection: Send + 'static {
    /// The error type surfaced by connection operations.
    type Error: StdError + Send + Sync + 'static;

    /// Cheaply verify the connection is still usable.
    ///
    /// `test_statement`, when set, is executed and its result discarded; a round-trip
    /// without error counts as alive. When unset, implementations should fall back to
    /// some metadata round-trip (in the spirit of a sentinel-table lookup) that does
    /// not depend on any table existing in the target schema.
    fn probe(
        &mut self,
        test_statement: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Release any server-side or client-side cached statement handles held by this
    /// connection. Called on every return to the pool before the liveness check.
    fn clear_cached_statements(&mut self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    /// Best-effort close. Errors are logged, never surfaced: a connection is being
    /// discarded either way.
    fn close(self) -> impl std::future::Future<Output = ()> + Send;
}
