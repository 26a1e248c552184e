//! A partitioned, self-healing connection pool core.
//!
//! This crate is deliberately agnostic to what a "connection" is: plug in a
//! [`ConnectionFactory`] for your driver and get back a [`Pool`] that amortizes the
//! cost of opening connections, shards access across independent partitions to
//! keep contention down, repairs itself when the database goes away and comes
//! back, and evicts idle or aged-out connections in the background.
//!
//! ```no_run
//! use bonepool::{ConnectionFactory, Pool, PoolConfig};
//! # async fn example<F: ConnectionFactory>(factory: F) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::builder()
//!     .partition_count(4)
//!     .min_connections_per_partition(2)
//!     .max_connections_per_partition(10)
//!     .build();
//!
//! let pool = Pool::new(factory, config).await?;
//! let conn = pool.acquire().await?;
//! // ... use `conn` like the underlying driver connection, via Deref ...
//! drop(conn); // returns the connection to the pool
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod factory;
mod hook;
mod metrics;
mod partition;
mod pool;
mod release_helper;
mod tester;
mod watch;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use connection::PooledConnection;
pub use error::{Error, Result};
pub use factory::{ConnectionFactory, RawConnection};
pub use hook::{ConnectionHook, NopHook};
pub use metrics::PoolCounters;
pub use pool::Pool;
