//! Optional per-partition worker that performs release work off the releasing
//! caller's task, draining the pending-release queue.

use std::sync::Arc;

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

pub(crate) async fn run<F: ConnectionFactory>(pool: Arc<PoolInner<F>>, index: usize) {
    loop {
        tokio::select! {
            biased;
            _ = pool.shutdown.cancelled() => return,
            idle = pool.partitions[index].pop_pending_release_blocking() => {
                pool.internal_release(idle, index).await;
            }
        }
    }
}
