//! Measure every operation an adapter performs.

use std::time::Instant;

use biometrics::{Collector, Counter, Moments, Sensor};

use ycsbint::{Error, Field, Row, Status, StorageAdapter};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

struct Measure {
    name: &'static str,
    ok: Counter,
    failed: Counter,
    latency: Moments,
}

impl Measure {
    const fn new(
        name: &'static str,
        ok: &'static str,
        failed: &'static str,
        latency: &'static str,
    ) -> Self {
        Self {
            name,
            ok: Counter::new(ok),
            failed: Counter::new(failed),
            latency: Moments::new(latency),
        }
    }

    fn record(&self, start: Instant, ok: bool) {
        self.latency.add(start.elapsed().as_micros() as f64);
        if ok {
            self.ok.click();
        } else {
            self.failed.click();
        }
    }
}

static READ: Measure = Measure::new(
    "READ",
    "ycsbint_bench.read",
    "ycsbint_bench.read_failed",
    "ycsbint_bench.read_latency_micros",
);
static SCAN: Measure = Measure::new(
    "SCAN",
    "ycsbint_bench.scan",
    "ycsbint_bench.scan_failed",
    "ycsbint_bench.scan_latency_micros",
);
static UPDATE: Measure = Measure::new(
    "UPDATE",
    "ycsbint_bench.update",
    "ycsbint_bench.update_failed",
    "ycsbint_bench.update_latency_micros",
);
static INSERT: Measure = Measure::new(
    "INSERT",
    "ycsbint_bench.insert",
    "ycsbint_bench.insert_failed",
    "ycsbint_bench.insert_latency_micros",
);
static DELETE: Measure = Measure::new(
    "DELETE",
    "ycsbint_bench.delete",
    "ycsbint_bench.delete_failed",
    "ycsbint_bench.delete_latency_micros",
);
static FILTER: Measure = Measure::new(
    "FILTER",
    "ycsbint_bench.filter",
    "ycsbint_bench.filter_failed",
    "ycsbint_bench.filter_latency_micros",
);

static MEASURES: [&Measure; 6] = [&READ, &SCAN, &UPDATE, &INSERT, &DELETE, &FILTER];

pub fn register_biometrics(collector: &Collector) {
    for measure in MEASURES.iter() {
        collector.register_counter(&measure.ok);
        collector.register_counter(&measure.failed);
        collector.register_moments(&measure.latency);
    }
}

/// One line of the end-of-run summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationSummary {
    pub operation: &'static str,
    pub ok: u64,
    pub failed: u64,
}

/// Read the OK and FAILED counters of every operation.
pub fn summary() -> Vec<OperationSummary> {
    MEASURES
        .iter()
        .map(|m| OperationSummary {
            operation: m.name,
            ok: m.ok.read(),
            failed: m.failed.read(),
        })
        .collect()
}

/////////////////////////////////////////// MeasuredAdapter ////////////////////////////////////////

/// Wrap an adapter so that every operation records its outcome and latency.
///
/// An operation is OK when it succeeds with [Status::Ok] or a found row.  NotFound and errors are
/// FAILED.  Errors are still returned to the caller.
pub struct MeasuredAdapter<A: StorageAdapter> {
    inner: A,
}

impl<A: StorageAdapter> MeasuredAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: StorageAdapter> StorageAdapter for MeasuredAdapter<A> {
    fn init(&mut self) -> Result<(), Error> {
        self.inner.init()
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        self.inner.cleanup()
    }

    fn read(&mut self, key: &[u8], fields: Option<&[String]>) -> Result<Option<Row>, Error> {
        let start = Instant::now();
        let result = self.inner.read(key, fields);
        READ.record(start, matches!(result, Ok(Some(_))));
        result
    }

    fn scan(
        &mut self,
        start_key: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        let start = Instant::now();
        let result = self.inner.scan(start_key, count, fields);
        SCAN.record(start, result.is_ok());
        result
    }

    fn update(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        let start = Instant::now();
        let result = self.inner.update(key, fields);
        UPDATE.record(start, matches!(result, Ok(Status::Ok)));
        result
    }

    fn insert(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        let start = Instant::now();
        let result = self.inner.insert(key, fields);
        INSERT.record(start, matches!(result, Ok(Status::Ok)));
        result
    }

    fn delete(&mut self, key: &[u8]) -> Result<Status, Error> {
        let start = Instant::now();
        let result = self.inner.delete(key);
        DELETE.record(start, matches!(result, Ok(Status::Ok)));
        result
    }

    fn filter(
        &mut self,
        low: &[Field],
        high: &[Field],
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        let start = Instant::now();
        let result = self.inner.filter(low, high, fields);
        FILTER.record(start, result.is_ok());
        result
    }
}
