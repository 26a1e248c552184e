//! The idle-connection tester: one per partition, wakes on a fixed period and
//! evicts connections that are too old or fail their liveness probe.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::MissedTickBehavior;

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

pub(crate) async fn run<F: ConnectionFactory>(pool: Arc<PoolInner<F>>, index: usize) {
    let Some(period) = pool.config.idle_connection_test_period else {
        return;
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so we don't test right after the
    // partition was just pre-warmed.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = pool.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        sweep(&pool, index).await;
    }
}

/// Examine every connection currently idle in the partition's free-queue exactly
/// once, in the order it was snapshotted. Connections pushed back by this sweep,
/// or pushed fresh by a concurrent release or pool-watch growth, are left for the
/// next tick: the sweep never removes more than it re-offers or destroys.
async fn sweep<F: ConnectionFactory>(pool: &Arc<PoolInner<F>>, index: usize) {
    let partition = &pool.partitions[index];
    let snapshot_len = partition.free.len();

    for _ in 0..snapshot_len {
        let Some(mut idle) = partition.free.pop() else {
            break;
        };

        let too_old = pool.config.idle_max_age.is_some_and(|max_age| {
            Instant::now().duration_since(idle.last_used) >= max_age
        });

        if too_old {
            pool.destroy(idle, index).await;
            continue;
        }

        let test_statement = pool.config.connection_test_statement.as_deref();
        if idle.raw.probe(test_statement).await.is_err() {
            pool.destroy(idle, index).await;
            continue;
        }

        idle.last_used = Instant::now();
        match partition.free.push(idle) {
            Ok(()) => partition.released.notify(1),
            Err(idle) => {
                // Should not happen: nothing re-admits more connections to a
                // partition's free-queue than `created_count` allows for.
                debug_assert!(
                    false,
                    "free-queue overflowed on partition {index} while the tester tried to re-offer a connection"
                );
                let previous = partition.created_count.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0, "created_count underflowed on partition {index}");
                idle.raw.close().await;
            }
        }
    }
}
