//! Optional lifecycle callbacks, invoked synchronously on the caller's task.
//!
//! A hook failure is logged and swallowed: it must never be allowed to corrupt pool
//! accounting or propagate out of `acquire`/`release`.

use crate::connection::PooledConnection;
use crate::factory::ConnectionFactory;

/// Observes connections as they move through the pool.
///
/// Any subset of the methods may be overridden; the defaults do nothing. All three are
/// called synchronously on whichever task triggered the transition (the acquirer for
/// `on_check_out`, the releaser for `on_check_in`, whichever task ran the destroy for
/// `on_destroy`).
pub trait ConnectionHook<F: ConnectionFactory>: Send + Sync + 'static {
    /// Called after a connection has been handed out by `acquire`, before it is
    /// returned to the caller.
    fn on_check_out(&self, _conn: &mut PooledConnection<F>) {}

    /// Called when a connection is handed back via `release`, before any liveness
    /// re-check or queue placement happens.
    fn on_check_in(&self, _conn: &mut PooledConnection<F>) {}

    /// Called once a connection has been torn down, just before its raw connection
    /// is closed, so the hook can still observe it (log its id, release per-connection
    /// resources it tracks) before it goes away.
    fn on_destroy(&self, _conn: &F::Connection) {}
}

/// A [`ConnectionHook`] that does nothing; the default when no hook is configured.
pub struct NopHook;

impl<F: ConnectionFactory> ConnectionHook<F> for NopHook {}
