//! ycsbint_bench drives [ycsbint] adapters from many threads.
//!
//! A [Workload] decides what each operation is; the [client] runs a bounded number of operations
//! per thread against one adapter, pacing itself with a [RateLimiter] and signalling completion
//! on a [CountDownLatch].

use biometrics::Collector;
use guacamole::Guacamole;
use skewgen::RandomValuePool;

use ycsbint::{Error, StorageAdapter};

pub mod client;
pub mod latch;
pub mod measured;
pub mod rate_limit;
pub mod workload;

pub use client::{client_thread, spawn_client, ClientThread, Mode};
pub use latch::CountDownLatch;
pub use measured::MeasuredAdapter;
pub use rate_limit::{per_thread_limiters, split_rate, RateLimiter};

//////////////////////////////////////////// ThreadState ///////////////////////////////////////////

/// Randomness owned by exactly one worker.
pub struct ThreadState {
    pub guac: Guacamole,
    pub pool: RandomValuePool,
}

impl ThreadState {
    /// A worker's state, seeded so that distinct seeds produce independent streams.
    pub fn new(seed: u64, pool_size: usize) -> Result<Self, Error> {
        let mut guac = Guacamole::new(seed);
        let pool = RandomValuePool::new(pool_size, &mut guac)?;
        Ok(Self { guac, pool })
    }
}

///////////////////////////////////////////// Workload /////////////////////////////////////////////

/// A workload chooses and issues one operation per call.
///
/// Each call returns `Ok(true)` when the operation succeeded, `Ok(false)` when it completed with
/// a recoverable not-OK status such as NotFound, and `Err` when the run must stop.
pub trait Workload: Send + Sync {
    /// Insert the next record of the load phase.
    fn do_insert(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error>;
    /// Issue one operation drawn from the transactional mix.
    fn do_transaction(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error>;
    /// Issue one analytic operation.
    fn do_analytic(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error>;
}

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

pub fn register_biometrics(collector: &Collector) {
    client::register_biometrics(collector);
    measured::register_biometrics(collector);
    rate_limit::register_biometrics(collector);
    workload::register_biometrics(collector);
    ycsbint::register_biometrics(collector);
    skewgen::register_biometrics(collector);
}
