//! A workload in the manner of YCSB's core workload, extended with value-range Filter queries.
//!
//! Keys are `user` followed by a zero-padded record number.  Field 0 of every row is drawn from a
//! sorted pool of distinct values so that Filter ranges over it select a predictable fraction of
//! rows; the remaining fields are filler drawn from each thread's random value pool.

use std::sync::atomic::{AtomicU64, Ordering};

use biometrics::{Collector, Counter};
use guacamole::{FromGuacamole, Guacamole};
use skewgen::{rank_chooser, DistinctValueGenerator, DistinctValueOptions, RankChooser};

use ycsbint::{Error, Field, Status, StorageAdapter};

use crate::{ThreadState, Workload};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static INSERT: Counter = Counter::new("ycsbint_bench.ycsb.insert");
static READ: Counter = Counter::new("ycsbint_bench.ycsb.read");
static UPDATE: Counter = Counter::new("ycsbint_bench.ycsb.update");
static SCAN: Counter = Counter::new("ycsbint_bench.ycsb.scan");
static DELETE: Counter = Counter::new("ycsbint_bench.ycsb.delete");
static FILTER: Counter = Counter::new("ycsbint_bench.ycsb.filter");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&INSERT);
    collector.register_counter(&READ);
    collector.register_counter(&UPDATE);
    collector.register_counter(&SCAN);
    collector.register_counter(&DELETE);
    collector.register_counter(&FILTER);
}

/////////////////////////////////////////////// keys ///////////////////////////////////////////////

/// The key of record `n`.  Zero-padding makes key order match record order.
pub fn build_key(n: u64) -> Vec<u8> {
    format!("user{:010}", n).into_bytes()
}

fn uniform(guac: &mut Guacamole, n: u64) -> u64 {
    u64::from_guacamole(&mut (), guac) % n
}

///////////////////////////////////////////// Operation ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    Read,
    Update,
    Insert,
    Scan,
    Delete,
    Filter,
}

////////////////////////////////////////// WorkloadOptions /////////////////////////////////////////

/// Core workload options.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct WorkloadOptions {
    /// The number of records the load phase inserts.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Number of records to load.", "N")
    )]
    pub record_count: u64,
    /// The number of operations the run phase issues.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Number of operations to run.", "N")
    )]
    pub operation_count: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Number of fields per record.", "N")
    )]
    pub field_count: usize,
    /// The length of every filler field.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Length of each filler field.", "LEN")
    )]
    pub field_length: usize,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Prefix of every field name.", "PREFIX")
    )]
    pub field_name_prefix: String,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to read operations.")
    )]
    pub read_proportion: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to update operations.")
    )]
    pub update_proportion: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to insert operations.")
    )]
    pub insert_proportion: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to scan operations.")
    )]
    pub scan_proportion: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to delete operations.")
    )]
    pub delete_proportion: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Weight to assign to filter operations.")
    )]
    pub filter_proportion: f64,
    /// Scans cover between one and this many records, uniformly.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Maximum number of records per scan.", "N")
    )]
    pub max_scan_length: u64,
    /// "uniform", "zipfian", or "scrambled".
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Key distribution: uniform, zipfian, or scrambled.", "DIST")
    )]
    pub request_distribution: String,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Zipfian skew of the key distribution.", "THETA")
    )]
    pub zipf_theta: f64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Read every field instead of one.")
    )]
    pub read_all_fields: bool,
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Update every field instead of one.")
    )]
    pub write_all_fields: bool,
    /// Slots in each thread's random value pool.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Slots in each thread's random value pool.", "N")
    )]
    pub value_pool_size: usize,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Seed for worker randomness.", "SEED")
    )]
    pub seed: u64,
    /// The pool field 0 is drawn from, and the ranges filters select.
    #[cfg_attr(feature = "command_line", arrrg(nested))]
    pub filter: DistinctValueOptions,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            record_count: 1_000,
            operation_count: 1_000,
            field_count: 10,
            field_length: 100,
            field_name_prefix: "field".to_string(),
            read_proportion: 0.95,
            update_proportion: 0.05,
            insert_proportion: 0.0,
            scan_proportion: 0.0,
            delete_proportion: 0.0,
            filter_proportion: 0.0,
            max_scan_length: 100,
            request_distribution: "uniform".to_string(),
            zipf_theta: 0.99,
            read_all_fields: false,
            write_all_fields: false,
            value_pool_size: 1_024,
            seed: 0,
            filter: DistinctValueOptions::default(),
        }
    }
}

impl PartialEq for WorkloadOptions {
    fn eq(&self, other: &WorkloadOptions) -> bool {
        fn approx_eq(lhs: f64, rhs: f64) -> bool {
            lhs * 0.999 <= rhs && lhs * 1.001 >= rhs
        }
        self.record_count == other.record_count
            && self.operation_count == other.operation_count
            && self.field_count == other.field_count
            && self.field_length == other.field_length
            && self.field_name_prefix == other.field_name_prefix
            && approx_eq(self.read_proportion, other.read_proportion)
            && approx_eq(self.update_proportion, other.update_proportion)
            && approx_eq(self.insert_proportion, other.insert_proportion)
            && approx_eq(self.scan_proportion, other.scan_proportion)
            && approx_eq(self.delete_proportion, other.delete_proportion)
            && approx_eq(self.filter_proportion, other.filter_proportion)
            && self.max_scan_length == other.max_scan_length
            && self.request_distribution == other.request_distribution
            && approx_eq(self.zipf_theta, other.zipf_theta)
            && self.read_all_fields == other.read_all_fields
            && self.write_all_fields == other.write_all_fields
            && self.value_pool_size == other.value_pool_size
            && self.seed == other.seed
            && self.filter == other.filter
    }
}

impl Eq for WorkloadOptions {}

/////////////////////////////////////////// CoreWorkload ///////////////////////////////////////////

/// The core workload.  Shared by every client thread.
pub struct CoreWorkload {
    options: WorkloadOptions,
    field_names: Vec<String>,
    keys: Box<dyn RankChooser>,
    filter_values: DistinctValueGenerator,
    thresholds: Vec<(f64, Operation)>,
    next_insert: AtomicU64,
}

impl CoreWorkload {
    pub fn new(options: WorkloadOptions) -> Result<Self, Error> {
        let invalid = |what: &str| Error::Configuration {
            what: what.to_string(),
        };
        if options.field_count == 0 {
            return Err(invalid("field_count must be positive"));
        }
        if options.record_count == 0 {
            return Err(invalid("record_count must be positive"));
        }
        if options.max_scan_length == 0 {
            return Err(invalid("max_scan_length must be positive"));
        }
        let weights = [
            (options.read_proportion, Operation::Read),
            (options.update_proportion, Operation::Update),
            (options.insert_proportion, Operation::Insert),
            (options.scan_proportion, Operation::Scan),
            (options.delete_proportion, Operation::Delete),
            (options.filter_proportion, Operation::Filter),
        ];
        if weights.iter().any(|(w, _)| !w.is_finite() || *w < 0.0) {
            return Err(invalid("proportions must be non-negative"));
        }
        let total: f64 = weights.iter().map(|(w, _)| w).sum();
        if total <= 0.0 {
            return Err(invalid("at least one proportion must be positive"));
        }
        let mut cumulative = 0.0;
        let mut thresholds = vec![];
        for (weight, op) in weights.into_iter() {
            if weight > 0.0 {
                cumulative += weight / total;
                thresholds.push((cumulative, op));
            }
        }
        let keys = rank_chooser(
            &options.request_distribution,
            options.record_count,
            options.zipf_theta,
        )?;
        let filter_values = options.filter.try_build()?;
        let field_names = (0..options.field_count)
            .map(|idx| format!("{}{}", options.field_name_prefix, idx))
            .collect();
        Ok(Self {
            options,
            field_names,
            keys,
            filter_values,
            thresholds,
            next_insert: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &WorkloadOptions {
        &self.options
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// The number of records inserted (or assumed present) so far.
    pub fn inserted(&self) -> u64 {
        self.next_insert.load(Ordering::Relaxed)
    }

    /// Continue numbering inserts after `record_count`, as though the load phase already ran.
    pub fn assume_loaded(&self) {
        self.next_insert
            .fetch_max(self.options.record_count, Ordering::Relaxed);
    }

    fn choose_operation(&self, guac: &mut Guacamole) -> Operation {
        let weight = f64::from_guacamole(&mut (), guac);
        for (threshold, op) in self.thresholds.iter() {
            if weight < *threshold {
                return *op;
            }
        }
        // SAFETY(rescrv): new() rejects workloads without a positive proportion.
        self.thresholds.last().map(|(_, op)| *op).unwrap()
    }

    fn choose_key(&self, guac: &mut Guacamole) -> Vec<u8> {
        build_key(self.keys.rank(guac))
    }

    fn value(&self, idx: usize, state: &mut ThreadState) -> Vec<u8> {
        if idx == 0 {
            self.filter_values.next(&mut state.guac).to_vec()
        } else {
            let mut value = vec![0u8; self.options.field_length];
            state.pool.fill(&mut value);
            state.pool.reset();
            value
        }
    }

    fn build_row(&self, state: &mut ThreadState) -> Vec<Field> {
        (0..self.field_names.len())
            .map(|idx| Field::new(self.field_names[idx].clone(), self.value(idx, state)))
            .collect()
    }

    fn build_update(&self, state: &mut ThreadState) -> Vec<Field> {
        if self.options.write_all_fields {
            self.build_row(state)
        } else {
            let idx = uniform(&mut state.guac, self.field_names.len() as u64) as usize;
            vec![Field::new(
                self.field_names[idx].clone(),
                self.value(idx, state),
            )]
        }
    }

    fn read_fields(&self, guac: &mut Guacamole) -> Option<Vec<String>> {
        if self.options.read_all_fields {
            None
        } else {
            let idx = uniform(guac, self.field_names.len() as u64) as usize;
            Some(vec![self.field_names[idx].clone()])
        }
    }

    fn filter(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error> {
        FILTER.click();
        let fields = self.read_fields(&mut state.guac);
        let (low, high) = self.filter_values.get(&mut state.guac);
        let name = &self.field_names[0];
        adapter.filter(
            &[Field::new(name.clone(), low)],
            &[Field::new(name.clone(), high)],
            fields.as_deref(),
        )?;
        Ok(true)
    }
}

impl Workload for CoreWorkload {
    fn do_insert(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error> {
        INSERT.click();
        let key = build_key(self.next_insert.fetch_add(1, Ordering::Relaxed));
        let row = self.build_row(state);
        Ok(adapter.insert(&key, &row)? == Status::Ok)
    }

    fn do_transaction(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error> {
        match self.choose_operation(&mut state.guac) {
            Operation::Read => {
                READ.click();
                let key = self.choose_key(&mut state.guac);
                let fields = self.read_fields(&mut state.guac);
                Ok(adapter.read(&key, fields.as_deref())?.is_some())
            }
            Operation::Update => {
                UPDATE.click();
                let key = self.choose_key(&mut state.guac);
                let fields = self.build_update(state);
                Ok(adapter.update(&key, &fields)? == Status::Ok)
            }
            Operation::Insert => self.do_insert(adapter, state),
            Operation::Scan => {
                SCAN.click();
                let key = self.choose_key(&mut state.guac);
                let count = 1 + uniform(&mut state.guac, self.options.max_scan_length);
                let fields = self.read_fields(&mut state.guac);
                adapter.scan(&key, count as usize, fields.as_deref())?;
                Ok(true)
            }
            Operation::Delete => {
                DELETE.click();
                let key = self.choose_key(&mut state.guac);
                Ok(adapter.delete(&key)? == Status::Ok)
            }
            Operation::Filter => self.filter(adapter, state),
        }
    }

    fn do_analytic(
        &self,
        adapter: &mut dyn StorageAdapter,
        state: &mut ThreadState,
    ) -> Result<bool, Error> {
        self.filter(adapter, state)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
