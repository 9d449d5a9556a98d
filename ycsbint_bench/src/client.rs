//! The per-thread client loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use biometrics::{Collector, Counter};

use ycsbint::{Error, StorageAdapter};

use crate::{CountDownLatch, RateLimiter, ThreadState, Workload};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static OPERATIONS: Counter = Counter::new("ycsbint_bench.client.operations");
static NOT_OK: Counter = Counter::new("ycsbint_bench.client.not_ok");
static STOPPED_EARLY: Counter = Counter::new("ycsbint_bench.client.stopped_early");
static FATAL: Counter = Counter::new("ycsbint_bench.client.fatal");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&OPERATIONS);
    collector.register_counter(&NOT_OK);
    collector.register_counter(&STOPPED_EARLY);
    collector.register_counter(&FATAL);
}

/////////////////////////////////////////////// Mode ///////////////////////////////////////////////

/// What each iteration of a client thread does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Insert records.
    Load,
    /// Issue the transactional mix.
    Run,
    /// Issue analytic operations until the time limit is signalled.
    Analytic,
    /// Issue the transactional mix until every analytic thread is done.
    Transactional,
}

/////////////////////////////////////////// ClientThread ///////////////////////////////////////////

/// Everything one worker needs besides its workload and adapter.
#[derive(Clone, Debug)]
pub struct ClientThread {
    pub mode: Mode,
    pub ops: u64,
    /// Call `init` on the adapter before the first operation.
    pub init: bool,
    /// Call `cleanup` on the adapter after the last operation.
    pub cleanup: bool,
    pub latch: Arc<CountDownLatch>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Set once the analytic threads have finished.  Transactional threads poll it.
    pub ap_done: Arc<AtomicBool>,
    /// Set once the run has gone on long enough.  Analytic threads poll it.
    pub time_limit: Arc<AtomicBool>,
    pub seed: u64,
    pub value_pool_size: usize,
}

impl ClientThread {
    pub fn new(mode: Mode, ops: u64, latch: Arc<CountDownLatch>) -> Self {
        Self {
            mode,
            ops,
            init: true,
            cleanup: true,
            latch,
            rate_limiter: None,
            ap_done: Arc::new(AtomicBool::new(false)),
            time_limit: Arc::new(AtomicBool::new(false)),
            seed: 0,
            value_pool_size: 1_024,
        }
    }

    fn should_stop(&self) -> bool {
        match self.mode {
            Mode::Load | Mode::Run => false,
            Mode::Analytic => self.time_limit.load(Ordering::Relaxed),
            Mode::Transactional => self.ap_done.load(Ordering::Relaxed),
        }
    }
}

/// Run one client to completion and count down its latch, whether or not it succeeded.
///
/// Returns the number of operations issued.  Operations that finished with a not-OK status count
/// toward the total; errors end the loop and are returned.
pub fn client_thread(
    config: &ClientThread,
    workload: &dyn Workload,
    adapter: &mut dyn StorageAdapter,
) -> Result<u64, Error> {
    let result = run_client(config, workload, adapter);
    config.latch.count_down();
    result
}

fn run_client(
    config: &ClientThread,
    workload: &dyn Workload,
    adapter: &mut dyn StorageAdapter,
) -> Result<u64, Error> {
    let mut state = ThreadState::new(config.seed, config.value_pool_size)?;
    if config.init {
        adapter.init()?;
    }
    let mut done = 0;
    while done < config.ops {
        if config.should_stop() {
            STOPPED_EARLY.click();
            break;
        }
        if let Some(rate_limiter) = config.rate_limiter.as_ref() {
            rate_limiter.consume();
        }
        let ok = match config.mode {
            Mode::Load => workload.do_insert(adapter, &mut state)?,
            Mode::Run | Mode::Transactional => workload.do_transaction(adapter, &mut state)?,
            Mode::Analytic => workload.do_analytic(adapter, &mut state)?,
        };
        OPERATIONS.click();
        if !ok {
            NOT_OK.click();
        }
        done += 1;
    }
    if config.cleanup {
        adapter.cleanup()?;
    }
    Ok(done)
}

/// Run [client_thread] on its own thread.  An error logs and exits the process.
pub fn spawn_client(
    config: ClientThread,
    workload: Arc<dyn Workload>,
    mut adapter: Box<dyn StorageAdapter>,
) -> JoinHandle<u64> {
    std::thread::spawn(move || {
        match client_thread(&config, workload.as_ref(), adapter.as_mut()) {
            Ok(done) => done,
            Err(err) => {
                FATAL.click();
                log::error!("{:?} client failed: {}", config.mode, err);
                std::process::exit(1);
            }
        }
    })
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use ycsbint::{BasicAdapter, Field, Status};

    use super::*;

    #[derive(Default)]
    struct Tally {
        inserts: AtomicU64,
        transactions: AtomicU64,
        analytics: AtomicU64,
    }

    impl Workload for Tally {
        fn do_insert(
            &self,
            adapter: &mut dyn StorageAdapter,
            _: &mut ThreadState,
        ) -> Result<bool, Error> {
            self.inserts.fetch_add(1, Ordering::Relaxed);
            Ok(adapter.insert(b"k", &[Field::new("f", "v")])? == Status::Ok)
        }

        fn do_transaction(
            &self,
            adapter: &mut dyn StorageAdapter,
            _: &mut ThreadState,
        ) -> Result<bool, Error> {
            self.transactions.fetch_add(1, Ordering::Relaxed);
            Ok(adapter.read(b"k", None)?.is_some())
        }

        fn do_analytic(
            &self,
            _: &mut dyn StorageAdapter,
            _: &mut ThreadState,
        ) -> Result<bool, Error> {
            self.analytics.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }
    }

    #[test]
    fn mode_selects_operation() {
        let workload = Tally::default();
        let latch = Arc::new(CountDownLatch::new(2));
        let mut adapter = BasicAdapter::new();
        let load = ClientThread::new(Mode::Load, 5, Arc::clone(&latch));
        assert_eq!(5, client_thread(&load, &workload, &mut adapter).unwrap());
        let run = ClientThread::new(Mode::Run, 7, Arc::clone(&latch));
        // reads against the basic adapter are all not-OK, but still count
        assert_eq!(7, client_thread(&run, &workload, &mut adapter).unwrap());
        assert_eq!(5, workload.inserts.load(Ordering::Relaxed));
        assert_eq!(7, workload.transactions.load(Ordering::Relaxed));
        assert_eq!(0, workload.analytics.load(Ordering::Relaxed));
        assert_eq!(0, latch.count());
    }

    #[test]
    fn errors_still_count_down() {
        let workload = Tally::default();
        let latch = Arc::new(CountDownLatch::new(1));
        let mut adapter = BasicAdapter::new();
        let mut config = ClientThread::new(Mode::Load, 3, Arc::clone(&latch));
        config.init = false;
        let err = client_thread(&config, &workload, &mut adapter).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(0, latch.count());
    }

    #[test]
    fn flags_stop_their_modes() {
        let workload = Tally::default();
        let latch = Arc::new(CountDownLatch::new(3));
        let mut adapter = BasicAdapter::new();
        let mut analytic = ClientThread::new(Mode::Analytic, 100, Arc::clone(&latch));
        analytic.time_limit.store(true, Ordering::Relaxed);
        assert_eq!(0, client_thread(&analytic, &workload, &mut adapter).unwrap());
        let mut transactional = ClientThread::new(Mode::Transactional, 100, Arc::clone(&latch));
        transactional.ap_done.store(true, Ordering::Relaxed);
        assert_eq!(
            0,
            client_thread(&transactional, &workload, &mut adapter).unwrap()
        );
        // flags only stop the mode that polls them
        let mut load = ClientThread::new(Mode::Load, 4, Arc::clone(&latch));
        load.ap_done.store(true, Ordering::Relaxed);
        load.time_limit.store(true, Ordering::Relaxed);
        assert_eq!(4, client_thread(&load, &workload, &mut adapter).unwrap());
        assert_eq!(0, latch.count());
    }

    #[test]
    fn spawned_clients_join() {
        let workload: Arc<dyn Workload> = Arc::new(Tally::default());
        let latch = Arc::new(CountDownLatch::new(4));
        let limiter = Arc::new(RateLimiter::new(100_000, 100).unwrap());
        let mut threads = vec![];
        for idx in 0..4 {
            let mut config = ClientThread::new(Mode::Run, 10, Arc::clone(&latch));
            config.seed = idx;
            config.rate_limiter = Some(Arc::clone(&limiter));
            threads.push(spawn_client(
                config,
                Arc::clone(&workload),
                Box::new(BasicAdapter::new()),
            ));
        }
        latch.wait();
        let total: u64 = threads.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(40, total);
    }
}
