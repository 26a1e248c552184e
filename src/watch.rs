//! The pool-watch loop: one per partition, manufactures new connections in
//! batches whenever `acquire` signals that the free-queue is running low.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::connection::Idle;
use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

pub(crate) async fn run<F: ConnectionFactory>(pool: Arc<PoolInner<F>>, index: usize) {
    // Check once up front: a partition started with fewer than its minimum (the
    // common case is `min == 0`) already satisfies the almost-full predicate before
    // any caller has had a chance to signal it, and registering the listener first
    // would otherwise let that initial notification race the subscription.
    grow_while_needed(&pool, index).await;

    loop {
        let listener = pool.partitions[index].almost_full.listen();
        // Re-check after registering: the predicate may have flipped true (and a
        // notification fired) in the gap between the last check and `listen()`.
        if pool.partitions[index].looks_almost_full() {
            grow_while_needed(&pool, index).await;
            continue;
        }
        tokio::select! {
            biased;
            _ = pool.shutdown.cancelled() => return,
            _ = listener => {}
        }

        grow_while_needed(&pool, index).await;
    }
}

async fn grow_while_needed<F: ConnectionFactory>(pool: &Arc<PoolInner<F>>, index: usize) {
    let partition = &pool.partitions[index];

    while partition.looks_almost_full()
        && partition.created_count() < partition.max_connections
        && !partition.unable_to_create_more.load(Ordering::Acquire)
    {
        if pool.shutdown.is_cancelled() {
            return;
        }

        let remaining = partition.max_connections - partition.created_count();
        let batch = partition.acquire_increment.min(remaining).max(1);
        let mut made_progress = false;

        for _ in 0..batch {
            match pool.factory.connect().await {
                Ok(raw) => {
                    partition.created_count.fetch_add(1, Ordering::AcqRel);
                    match partition.free.push(Idle::fresh(raw)) {
                        Ok(()) => {
                            partition.released.notify(1);
                            made_progress = true;
                        }
                        Err(idle) => {
                            // Should not happen: the free-queue's capacity equals
                            // max_connections and created_count never exceeds it.
                            debug_assert!(
                                false,
                                "free-queue overflowed on partition {index} despite created_count bound"
                            );
                            let previous = partition.created_count.fetch_sub(1, Ordering::AcqRel);
                            debug_assert!(previous > 0, "created_count underflowed on partition {index}");
                            idle.raw.close().await;
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        partition = index,
                        error = %error,
                        "connection factory failed; suspending growth for this partition"
                    );
                    partition.unable_to_create_more.store(true, Ordering::Release);
                    break;
                }
            }
        }

        if !made_progress {
            break;
        }
    }
}
