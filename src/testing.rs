//! A deterministic in-memory [`ConnectionFactory`]/[`RawConnection`] pair, with
//! fault-injection hooks, used by this crate's own tests and available to
//! downstream crates that want to exercise pool behavior without a real database.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::factory::{ConnectionFactory, RawConnection};

/// Errors a [`MockFactory`]/[`MockConnection`] pair can produce.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("mock connection factory refused to open a connection")]
    OpenFailed,
    #[error("mock connection reports itself as broken")]
    Broken,
}

/// An in-memory stand-in for a real database connection.
///
/// Liveness is backed by a shared flag so a test can kill connections it has
/// already handed out to the pool, from outside, without reaching inside the pool.
pub struct MockConnection {
    pub id: u64,
    alive: Arc<AtomicBool>,
}

impl RawConnection for MockConnection {
    type Error = MockError;

    async fn probe(&mut self, _test_statement: Option<&str>) -> Result<(), Self::Error> {
        if self.alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(MockError::Broken)
        }
    }

    async fn close(self) {}
}

/// A factory for [`MockConnection`]s with fault-injection switches: refuse the
/// next connects, add an artificial delay, or kill every connection opened so far.
#[derive(Default)]
pub struct MockFactory {
    registry: Mutex<Vec<Arc<AtomicBool>>>,
    next_id: AtomicU64,
    fail_connect: AtomicBool,
    open_delay: Mutex<Option<Duration>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `connect()` call sleep for `delay` before succeeding
    /// (or failing, if `fail_next_connects` is also set).
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        *self.open_delay.lock().expect("mock factory poisoned") = delay;
    }

    /// Toggle whether `connect()` fails from now on.
    pub fn fail_next_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Release);
    }

    /// Flip every connection this factory has ever produced to "dead", so the
    /// next liveness probe against any of them fails.
    pub fn kill_all(&self) {
        for flag in self.registry.lock().expect("mock factory poisoned").iter() {
            flag.store(false, Ordering::Release);
        }
    }

    /// Total number of connections successfully opened so far.
    pub fn opened_count(&self) -> u64 {
        self.next_id.load(Ordering::Acquire)
    }
}

impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let delay = *self.open_delay.lock().expect("mock factory poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_connect.load(Ordering::Acquire) {
            return Err(MockError::OpenFailed);
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let alive = Arc::new(AtomicBool::new(true));
        self.registry
            .lock()
            .expect("mock factory poisoned")
            .push(Arc::clone(&alive));
        Ok(MockConnection { id, alive })
    }
}
