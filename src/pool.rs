//! The pool itself: construction, the acquire/release algorithms, and shutdown.

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::connection::{Idle, PooledConnection};
use crate::error::Error;
use crate::factory::ConnectionFactory;
use crate::hook::{ConnectionHook, NopHook};
use crate::metrics::PoolCounters;
use crate::partition::Partition;
use crate::{release_helper, tester, watch};

/// Cheap per-caller identity used to pick a home partition, in the spirit of a
/// thread id: a counter assigned once per OS thread and cached in a thread-local.
/// Tasks can migrate between worker threads on a multi-threaded runtime, but the
/// thread count is small and stable, so collisions stay rare in practice.
fn current_task_identity() -> usize {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static CURRENT_ID: usize = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    }
    CURRENT_ID.with(|id| *id)
}

/// A partitioned, self-healing pool of connections produced by `F`.
///
/// Cheaply `Clone`: internally an `Arc` handle over the shared state, matching
/// every caller pointing at the same partitions and background workers.
pub struct Pool<F: ConnectionFactory>(Arc<PoolInner<F>>);

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

pub(crate) struct PoolInner<F: ConnectionFactory> {
    pub(crate) factory: F,
    pub(crate) config: PoolConfig,
    pub(crate) partitions: Box<[Partition<F>]>,
    pub(crate) starvation_latch: AtomicBool,
    pub(crate) hook: Arc<dyn ConnectionHook<F>>,
    pub(crate) shutdown: CancellationToken,
    termination_lock: AtomicBool,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Build a pool with the default [`NopHook`].
    pub async fn new(factory: F, config: PoolConfig) -> Result<Self, Error<F::Error>> {
        Self::with_hook(factory, config, Arc::new(NopHook)).await
    }

    /// Build a pool, pre-warming `min_connections_per_partition` connections in
    /// each partition and starting its background workers.
    ///
    /// On a factory failure during pre-warming, every connection opened so far is
    /// closed and [`Error::PoolInitFailed`] is returned.
    pub async fn with_hook(
        factory: F,
        config: PoolConfig,
        hook: Arc<dyn ConnectionHook<F>>,
    ) -> Result<Self, Error<F::Error>> {
        let mut partitions = Vec::with_capacity(config.partition_count());
        for _ in 0..config.partition_count() {
            partitions.push(Partition::new(&config));
        }

        for partition in &partitions {
            for _ in 0..config.min_connections_per_partition {
                match factory.connect().await {
                    Ok(raw) => {
                        partition.created_count.fetch_add(1, Ordering::AcqRel);
                        let pushed = partition.free.push(Idle::fresh(raw)).is_ok();
                        debug_assert!(
                            pushed,
                            "free-queue overflowed during pre-warm: capacity should equal max_connections"
                        );
                    }
                    Err(error) => {
                        close_all(&partitions).await;
                        return Err(Error::PoolInitFailed(error));
                    }
                }
            }
        }

        let inner = Arc::new(PoolInner {
            factory,
            config,
            partitions: partitions.into_boxed_slice(),
            starvation_latch: AtomicBool::new(false),
            hook,
            shutdown: CancellationToken::new(),
            termination_lock: AtomicBool::new(false),
            background: std::sync::Mutex::new(Vec::new()),
        });

        let mut handles = Vec::new();
        for index in 0..inner.partitions.len() {
            handles.push(tokio::spawn(watch::run(Arc::clone(&inner), index)));
            if inner.config.idle_connection_test_period.is_some() {
                handles.push(tokio::spawn(tester::run(Arc::clone(&inner), index)));
            }
            for _ in 0..inner.config.release_helper_thread_count {
                handles.push(tokio::spawn(release_helper::run(Arc::clone(&inner), index)));
            }
        }
        *inner.background.lock().expect("background task list poisoned") = handles;

        Ok(Self(inner))
    }

    /// Check out a connection, blocking (asynchronously) until one is available.
    ///
    /// Dropping the returned future before it resolves is always safe: nothing has
    /// been moved out of any partition yet, so pool accounting is untouched.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, Error<F::Error>> {
        self.0.acquire_inner(None).await
    }

    /// Like [`acquire`](Self::acquire), but resolves to [`Error::AcquireInterrupted`]
    /// as soon as `cancel` fires instead of leaving the caller to drop the future.
    pub async fn acquire_with(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection<F>, Error<F::Error>> {
        self.0.acquire_inner(Some(cancel)).await
    }

    /// Hand a connection back to the pool and wait for the full release algorithm
    /// (cached-statement cleanup, liveness re-check on a possibly-broken connection,
    /// queue placement) to finish on the calling task.
    ///
    /// Most callers don't need this: dropping the [`PooledConnection`] does the same
    /// work, offloaded to a helper task or partition helper loop. Use this when you
    /// need release to have visibly completed before proceeding (e.g. in a test).
    pub async fn release(&self, mut conn: PooledConnection<F>) -> Result<(), Error<F::Error>> {
        if !Arc::ptr_eq(&conn.pool, &self.0) {
            return Err(Error::AlienConnection);
        }
        let origin = conn.origin();
        let idle = conn.check_in().expect("PooledConnection released twice");
        let already_shut_down = self.0.shutdown.is_cancelled();
        self.0.internal_release(idle, origin).await;
        if already_shut_down {
            return Err(Error::PoolShutDown);
        }
        Ok(())
    }

    /// Stop background workers and destroy every idle connection. Idempotent:
    /// calling this more than once (including concurrently) only the first caller
    /// does the draining; the rest return immediately.
    pub async fn shutdown(&self) {
        self.0.shutdown_inner().await;
    }

    /// A snapshot of the pool's connection accounting.
    pub fn counters(&self) -> PoolCounters {
        self.0.counters()
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    async fn acquire_inner(
        self: &Arc<Self>,
        cancel: Option<&CancellationToken>,
    ) -> Result<PooledConnection<F>, Error<F::Error>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::PoolShutDown);
        }

        let home = current_task_identity() % self.partitions.len();
        self.partitions[home].signal_growth_if_needed();

        let mut chosen = home;
        let mut idle = if self.starvation_latch.load(Ordering::Acquire) {
            Some(self.wait_for_free(home, cancel).await?)
        } else {
            self.partitions[home].free.pop()
        };

        if idle.is_none() {
            for (index, partition) in self.partitions.iter().enumerate() {
                if index == home {
                    continue;
                }
                if let Some(found) = partition.free.pop() {
                    idle = Some(found);
                    chosen = index;
                    break;
                }
            }
        }

        let idle = match idle {
            Some(found) => found,
            None => {
                self.starvation_latch.store(true, Ordering::Release);
                chosen = home;
                self.wait_for_free(home, cancel).await?
            }
        };

        let mut conn = PooledConnection::new(idle, chosen, Arc::clone(self));
        conn.renew();
        self.hook.on_check_out(&mut conn);
        Ok(conn)
    }

    async fn wait_for_free(
        &self,
        partition: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Idle<F>, Error<F::Error>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::PoolShutDown),
            _ = wait_for_cancel(cancel) => Err(Error::AcquireInterrupted),
            idle = self.partitions[partition].pop_free_blocking() => Ok(idle),
        }
    }

    /// The synchronous half of the release algorithm: invoked from
    /// [`PooledConnection`]'s `Drop`, which cannot `.await`.
    ///
    /// With release helpers configured, the handoff is a lock-free queue push — no
    /// spawn needed. Without them, Rust has no way to run the liveness re-check on
    /// the dropping task itself (a destructor can't be async), so a one-shot task is
    /// spawned to do exactly what a synchronous release would have done inline.
    pub(crate) fn release_on_drop(self: &Arc<Self>, idle: Idle<F>, origin: usize) {
        if self.shutdown.is_cancelled() {
            let pool = Arc::clone(self);
            tokio::spawn(async move { pool.destroy(idle, origin).await });
            return;
        }

        if self.config.release_helper_thread_count > 0 {
            match self.partitions[origin].pending_release.push(idle) {
                Ok(()) => self.partitions[origin].pending_release_ready.notify(1),
                Err(idle) => {
                    // Pending-release queue is momentarily full; fall back to a
                    // one-shot task rather than blocking the dropping caller.
                    let pool = Arc::clone(self);
                    tokio::spawn(async move { pool.internal_release(idle, origin).await });
                }
            }
        } else {
            let pool = Arc::clone(self);
            tokio::spawn(async move { pool.internal_release(idle, origin).await });
        }
    }

    /// Clear cached statements, re-probe liveness if the connection was marked
    /// possibly broken, and either destroy it or return it to the free-queue.
    pub(crate) async fn internal_release(&self, mut idle: Idle<F>, origin: usize) {
        idle.raw.clear_cached_statements().await;

        if idle.possibly_broken {
            let test_statement = self.config.connection_test_statement.as_deref();
            if idle.raw.probe(test_statement).await.is_err() {
                warn!(partition = origin, "destroying connection that failed its liveness probe");
                self.destroy(idle, origin).await;
                return;
            }
        }

        idle.possibly_broken = false;
        idle.last_used = Instant::now();

        if self.shutdown.is_cancelled() {
            self.destroy(idle, origin).await;
            return;
        }

        self.release_into_any_free_partition(idle, origin).await;
    }

    async fn release_into_any_free_partition(&self, mut idle: Idle<F>, preferred: usize) {
        match self.partitions[preferred].free.push(idle) {
            Ok(()) => {
                self.partitions[preferred].released.notify(1);
                return;
            }
            Err(returned) => idle = returned,
        }

        for (index, partition) in self.partitions.iter().enumerate() {
            if index == preferred {
                continue;
            }
            match partition.free.push(idle) {
                Ok(()) => {
                    partition.released.notify(1);
                    return;
                }
                Err(returned) => idle = returned,
            }
        }

        // Every free-queue was momentarily full. The accounting invariant
        // (free + pending_release + leased == created <= max) guarantees this
        // resolves; retry until the preferred partition has room.
        loop {
            match self.partitions[preferred].free.push(idle) {
                Ok(()) => {
                    self.partitions[preferred].released.notify(1);
                    return;
                }
                Err(returned) => {
                    idle = returned;
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Tear down a connection: decrement its partition's accounting, clear the
    /// "unable to create more" latch (a destroy is how the pool learns the
    /// database might be reachable again), invoke the destroy hook, and close the
    /// raw connection. Close errors are logged, never surfaced.
    pub(crate) async fn destroy(&self, idle: Idle<F>, origin: usize) {
        let previous = self.partitions[origin]
            .created_count
            .fetch_sub(1, Ordering::AcqRel);
        debug_assert!(
            previous > 0,
            "created_count underflowed on partition {origin}: destroyed more connections than were ever created"
        );
        self.partitions[origin]
            .unable_to_create_more
            .store(false, Ordering::Release);
        self.hook.on_destroy(&idle.raw);
        idle.raw.close().await;
        debug!(partition = origin, "destroyed connection");
    }

    async fn shutdown_inner(self: &Arc<Self>) {
        if self
            .termination_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        self.shutdown.cancel();

        for handle in self
            .background
            .lock()
            .expect("background task list poisoned")
            .drain(..)
        {
            handle.abort();
        }

        for index in 0..self.partitions.len() {
            while let Some(idle) = self.partitions[index].free.pop() {
                self.destroy(idle, index).await;
            }
            while let Some(idle) = self.partitions[index].pending_release.pop() {
                self.destroy(idle, index).await;
            }
        }
    }

    fn counters(&self) -> PoolCounters {
        let mut created = 0;
        let mut free = 0;
        let mut pending_release = 0;
        for partition in self.partitions.iter() {
            created += partition.created_count();
            free += partition.free.len() as u32;
            pending_release += partition.pending_release.len() as u32;
        }
        PoolCounters {
            total_created: created,
            total_free: free,
            total_pending_release: pending_release,
            total_leased: created.saturating_sub(free).saturating_sub(pending_release),
        }
    }
}

async fn wait_for_cancel(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => pending::<()>().await,
    }
}

async fn close_all<F: ConnectionFactory>(partitions: &[Partition<F>]) {
    for partition in partitions {
        while let Some(idle) = partition.free.pop() {
            idle.raw.close().await;
        }
    }
}
