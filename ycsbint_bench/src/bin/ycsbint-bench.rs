//! Load and run a YCSB-style workload against one ycsbint adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arrrg::CommandLine;
use biometrics::Collector;

use ycsbint::{
    AdapterFactory, Properties, StorageAdapter, FIELD_COUNT_PROPERTY, FIELD_NAME_PREFIX_PROPERTY,
};
use ycsbint_bench::measured::summary;
use ycsbint_bench::workload::{CoreWorkload, WorkloadOptions};
use ycsbint_bench::{
    per_thread_limiters, register_biometrics, spawn_client, ClientThread, CountDownLatch,
    MeasuredAdapter, Mode, RateLimiter, Workload,
};

const USAGE: &str =
    "USAGE: ycsbint-bench [--db NAME] [--properties FILE] [--load] [--run] [--htap] [--workload-options]";

/////////////////////////////////////////// BenchOptions ///////////////////////////////////////////

#[derive(Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct BenchOptions {
    #[arrrg(optional, "Adapter to benchmark: basic, memory, tuple, or rocksdb.", "NAME")]
    db: String,
    #[arrrg(optional, "File of key=value engine properties.", "FILE")]
    properties: String,
    #[arrrg(optional, "Number of client threads.", "N")]
    threads: u64,
    #[arrrg(flag, "Insert record_count records.")]
    load: bool,
    #[arrrg(flag, "Issue operation_count operations from the transactional mix.")]
    run: bool,
    #[arrrg(flag, "Run analytic threads alongside transactional threads.")]
    htap: bool,
    #[arrrg(optional, "Number of analytic threads in the HTAP phase.", "N")]
    ap_threads: u64,
    #[arrrg(optional, "Stop analytic threads after this many seconds; 0 disables.", "SECS")]
    time_limit_secs: u64,
    #[arrrg(optional, "Transactional operations per second across all threads; 0 disables.", "OPS")]
    target_throughput: u64,
    #[arrrg(nested)]
    workload: WorkloadOptions,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            db: "basic".to_string(),
            properties: String::new(),
            threads: 1,
            load: false,
            run: false,
            htap: false,
            ap_threads: 1,
            time_limit_secs: 0,
            target_throughput: 0,
            workload: WorkloadOptions::default(),
        }
    }
}

////////////////////////////////////////////// helpers /////////////////////////////////////////////

fn or_die<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> T {
    match result {
        Ok(t) => t,
        Err(err) => {
            log::error!("{}: {}", what, err);
            eprintln!("{}: {}", what, err);
            std::process::exit(1);
        }
    }
}

fn seed_for(base: u64, index: u64, threads: u64) -> u64 {
    base.wrapping_add((u64::MAX / threads.max(1)) * index)
}

fn ops_for(total: u64, index: u64, threads: u64) -> u64 {
    total / threads + if index < total % threads { 1 } else { 0 }
}

struct Phase<'a> {
    options: &'a BenchOptions,
    factory: &'a AdapterFactory,
    workload: Arc<dyn Workload>,
}

impl<'a> Phase<'a> {
    fn client(
        &self,
        mode: Mode,
        ops: u64,
        index: u64,
        threads: u64,
        latch: &Arc<CountDownLatch>,
    ) -> ClientThread {
        let mut config = ClientThread::new(mode, ops, Arc::clone(latch));
        config.seed = seed_for(self.options.workload.seed, index, threads);
        config.value_pool_size = self.options.workload.value_pool_size;
        config
    }

    /// Split the target throughput across the `limited` threads that are paced.
    fn limiters(&self, limited: u64) -> Vec<Option<Arc<RateLimiter>>> {
        if self.options.target_throughput == 0 {
            return vec![None; limited as usize];
        }
        or_die(
            per_thread_limiters(self.options.target_throughput, limited),
            "invalid target throughput",
        )
        .into_iter()
        .map(|limiter| Some(Arc::new(limiter)))
        .collect()
    }

    fn spawn(&self, config: ClientThread) -> JoinHandle<u64> {
        let adapter = or_die(self.factory.create(&self.options.db), "could not create adapter");
        spawn_client(
            config,
            Arc::clone(&self.workload),
            Box::new(MeasuredAdapter::new(adapter)),
        )
    }

    /// Split `total` operations across the client threads and wait for all of them.
    fn run(&self, mode: Mode, total: u64) -> u64 {
        let threads = self.options.threads.max(1);
        let latch = Arc::new(CountDownLatch::new(threads));
        let limiters = self.limiters(threads);
        let start = Instant::now();
        let handles: Vec<_> = (0..threads)
            .zip(limiters)
            .map(|(idx, limiter)| {
                let ops = ops_for(total, idx, threads);
                let mut config = self.client(mode, ops, idx, threads, &latch);
                config.rate_limiter = limiter;
                self.spawn(config)
            })
            .collect();
        latch.wait();
        let done = join(handles);
        report(mode, done, start.elapsed());
        done
    }

    /// Run analytic threads until they finish or time out, with transactional threads running
    /// until the analytic threads are done.
    fn htap(&self, total: u64) {
        let tp_threads = self.options.threads.max(1);
        let ap_threads = self.options.ap_threads.max(1);
        let tp_latch = Arc::new(CountDownLatch::new(tp_threads));
        let ap_latch = Arc::new(CountDownLatch::new(ap_threads));
        let ap_done = Arc::new(AtomicBool::new(false));
        let time_limit = Arc::new(AtomicBool::new(false));
        let start = Instant::now();
        let mut ap_handles = vec![];
        for idx in 0..ap_threads {
            let mut config = self.client(
                Mode::Analytic,
                ops_for(total, idx, ap_threads),
                idx,
                ap_threads,
                &ap_latch,
            );
            config.time_limit = Arc::clone(&time_limit);
            ap_handles.push(self.spawn(config));
        }
        let mut tp_handles = vec![];
        // only the transactional threads are paced
        for (idx, limiter) in (0..tp_threads).zip(self.limiters(tp_threads)) {
            let mut config = self.client(
                Mode::Transactional,
                u64::MAX,
                ap_threads + idx,
                ap_threads + tp_threads,
                &tp_latch,
            );
            config.ap_done = Arc::clone(&ap_done);
            config.rate_limiter = limiter;
            tp_handles.push(self.spawn(config));
        }
        let timer = if self.options.time_limit_secs > 0 {
            let limit = Duration::from_secs(self.options.time_limit_secs);
            let ap_latch = Arc::clone(&ap_latch);
            let time_limit = Arc::clone(&time_limit);
            Some(std::thread::spawn(move || {
                if !ap_latch.wait_timeout(limit) {
                    log::info!("time limit reached; stopping analytic threads");
                    time_limit.store(true, Ordering::Relaxed);
                }
            }))
        } else {
            None
        };
        ap_latch.wait();
        ap_done.store(true, Ordering::Relaxed);
        tp_latch.wait();
        if let Some(timer) = timer {
            or_die(joined(timer), "time limit thread");
        }
        let elapsed = start.elapsed();
        report(Mode::Analytic, join(ap_handles), elapsed);
        report(Mode::Transactional, join(tp_handles), elapsed);
    }
}

/// Join `handle`, reporting a panic as an error instead of dropping it.
fn joined<T>(handle: JoinHandle<T>) -> Result<T, &'static str> {
    handle.join().map_err(|_| "panicked")
}

fn join(handles: Vec<JoinHandle<u64>>) -> u64 {
    handles
        .into_iter()
        .map(|handle| or_die(joined(handle), "client thread"))
        .sum()
}

fn report(mode: Mode, done: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
    log::info!(
        "{:?}: {} operations in {:.3}s ({:.1} ops/s)",
        mode,
        done,
        secs,
        rate
    );
}

/////////////////////////////////////////////// main ///////////////////////////////////////////////

fn main() {
    env_logger::init();
    let (options, free) = BenchOptions::from_command_line(USAGE);
    if !free.is_empty() {
        eprintln!("free arguments are not accepted");
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    if !options.load && !options.run && !options.htap {
        eprintln!("nothing to do: pass --load, --run, or --htap");
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let mut props = if options.properties.is_empty() {
        Properties::default()
    } else {
        or_die(
            Properties::load(&options.properties),
            "could not load properties",
        )
    };
    props.set(
        FIELD_COUNT_PROPERTY,
        options.workload.field_count.to_string(),
    );
    props.set(
        FIELD_NAME_PREFIX_PROPERTY,
        options.workload.field_name_prefix.clone(),
    );
    let collector = Collector::new();
    register_biometrics(&collector);
    let factory = AdapterFactory::new(props);
    let workload = Arc::new(or_die(
        CoreWorkload::new(options.workload.clone()),
        "invalid workload",
    ));
    // Hold one reference across phases so the engine stays open between them.
    let mut keeper = or_die(factory.create(&options.db), "could not create adapter");
    or_die(keeper.init(), "could not initialize adapter");
    let phase = Phase {
        options: &options,
        factory: &factory,
        workload: Arc::clone(&workload) as Arc<dyn Workload>,
    };
    if options.load {
        phase.run(Mode::Load, options.workload.record_count);
    } else {
        workload.assume_loaded();
    }
    if options.run {
        phase.run(Mode::Run, options.workload.operation_count);
    }
    if options.htap {
        phase.htap(options.workload.operation_count);
    }
    or_die(keeper.cleanup(), "could not clean up adapter");
    for op in summary() {
        log::info!("{} ok={} failed={}", op.operation, op.ok, op.failed);
        println!("{:<8} ok={:<12} failed={}", op.operation, op.ok, op.failed);
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
