//! Engines are the storage systems adapters drive.
//!
//! An engine is opaque:  durability, compaction, and isolation are its own business.  ycsbint only
//! needs one of two shapes.  A [KeyValueEngine] stores one opaque byte string per key, and a
//! [TupleEngine] stores a fixed-width array of byte strings per key.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::{Error, Properties};

#[cfg(feature = "reference")]
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

////////////////////////////////////////////// Engine //////////////////////////////////////////////

/// The lifecycle every engine shares.  An engine is opened by constructing it.
pub trait Engine: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &str;
    /// Release the engine.  Every call after close fails.
    fn close(&self) -> Result<(), Error>;
}

/// Visitors return `Ok(true)` to keep going and `Ok(false)` to stop.
pub type KeyValueVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<bool, Error> + 'a;

/// A tuple visitor sees every slot of a stored tuple, the key in slot 0.
pub type TupleVisitor<'a> = dyn FnMut(&[Vec<u8>]) -> Result<bool, Error> + 'a;

////////////////////////////////////////// KeyValueEngine //////////////////////////////////////////

pub trait KeyValueEngine: Engine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;
    /// Fold `operand` into the value under `key` with the engine's merge operator.
    fn merge(&self, key: &[u8], operand: &[u8]) -> Result<(), Error>;
    fn del(&self, key: &[u8]) -> Result<(), Error>;
    /// Call `visitor` on every pair with key `>= start`, in key order.
    fn visit(&self, start: &[u8], visitor: &mut KeyValueVisitor<'_>) -> Result<(), Error>;

    /// Collect up to `limit` pairs starting at `start`.
    fn scan(&self, start: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut pairs = Vec::with_capacity(limit.min(1024));
        if limit == 0 {
            return Ok(pairs);
        }
        self.visit(start, &mut |key, value| {
            pairs.push((key.to_vec(), value.to_vec()));
            Ok(pairs.len() < limit)
        })?;
        Ok(pairs)
    }
}

//////////////////////////////////////////// TupleEngine ///////////////////////////////////////////

pub trait TupleEngine: Engine {
    fn get_tuple(&self, key: &[u8]) -> Result<Option<Vec<Vec<u8>>>, Error>;
    /// Store `slots` under `key`.  Slot 0 must equal `key`.
    fn put_tuple(&self, key: &[u8], slots: Vec<Vec<u8>>) -> Result<(), Error>;
    fn del_tuple(&self, key: &[u8]) -> Result<(), Error>;
    fn visit_tuples(&self, start: &[u8], visitor: &mut TupleVisitor<'_>) -> Result<(), Error>;

    fn scan_tuples(&self, start: &[u8], limit: usize) -> Result<Vec<Vec<Vec<u8>>>, Error> {
        let mut tuples = Vec::with_capacity(limit.min(1024));
        if limit == 0 {
            return Ok(tuples);
        }
        self.visit_tuples(start, &mut |slots| {
            tuples.push(slots.to_vec());
            Ok(tuples.len() < limit)
        })?;
        Ok(tuples)
    }
}

////////////////////////////////////////// MergingStrategy /////////////////////////////////////////

/// How an LSM engine shapes its levels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergingStrategy {
    /// Let the engine size levels dynamically.
    #[default]
    Elastic,
    /// Size-tiered merging.
    Tiering,
    /// Leveled merging.
    Leveling,
}

impl FromStr for MergingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "elastic" => Ok(MergingStrategy::Elastic),
            "tiering" => Ok(MergingStrategy::Tiering),
            "leveling" => Ok(MergingStrategy::Leveling),
            _ => Err(Error::configuration(format!(
                "unknown merging strategy {:?}",
                s
            ))),
        }
    }
}

impl Display for MergingStrategy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MergingStrategy::Elastic => write!(fmt, "elastic"),
            MergingStrategy::Tiering => write!(fmt, "tiering"),
            MergingStrategy::Leveling => write!(fmt, "leveling"),
        }
    }
}

//////////////////////////////////////////// Compression ///////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    #[default]
    No,
    Snappy,
    Zlib,
    Bzip2,
    Lz4,
    Lz4hc,
    Xpress,
    Zstd,
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(Compression::No),
            "snappy" => Ok(Compression::Snappy),
            "zlib" => Ok(Compression::Zlib),
            "bzip2" => Ok(Compression::Bzip2),
            "lz4" => Ok(Compression::Lz4),
            "lz4hc" => Ok(Compression::Lz4hc),
            "xpress" => Ok(Compression::Xpress),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(Error::configuration(format!(
                "unknown compression type {:?}",
                s
            ))),
        }
    }
}

/////////////////////////////////////////// EngineOptions //////////////////////////////////////////

/// Engine tuning resolved from properties under one engine prefix, e.g. `rocksdb.block_size`.
///
/// Knobs that are zero (or -1 for `max_open_files`) leave the engine's own default in place.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub storage_dir: String,
    pub merging_strategy: MergingStrategy,
    pub memtable_max_size: u64,
    pub level_0_max_size: u64,
    pub read_buffer_size: u64,
    pub write_buffer_size: u64,
    pub num_of_compaction_thread: u32,
    pub max_worker_thread: u32,
    pub false_positive: f64,
    pub max_level: u32,
    pub level_size_ratio: u32,
    pub block_size: u64,
    pub compression: Compression,
    pub destroy: bool,
    pub max_background_jobs: i32,
    pub max_open_files: i32,
    pub target_file_size_base: u64,
    pub use_direct_reads: bool,
    pub use_direct_io_for_flush_compaction: bool,
    pub increase_parallelism: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            storage_dir: String::new(),
            merging_strategy: MergingStrategy::Elastic,
            memtable_max_size: 1 << 20,
            level_0_max_size: 512 << 20,
            read_buffer_size: 1 << 20,
            write_buffer_size: 1 << 20,
            num_of_compaction_thread: 16,
            max_worker_thread: 16,
            false_positive: 0.01,
            max_level: 5,
            level_size_ratio: 10,
            block_size: 4096,
            compression: Compression::No,
            destroy: false,
            max_background_jobs: 0,
            max_open_files: -1,
            target_file_size_base: 0,
            use_direct_reads: false,
            use_direct_io_for_flush_compaction: false,
            increase_parallelism: false,
        }
    }
}

impl EngineOptions {
    /// Resolve options for `engine` from `props`.  Fails when the storage directory is missing
    /// or empty, or when any present value is malformed.
    pub fn from_properties(props: &Properties, engine: &str) -> Result<Self, Error> {
        let key = |name: &str| format!("{}.{}", engine, name);
        let dflt = Self::default();
        let storage_dir = props
            .get(&key("storage_dir"))
            .or_else(|| props.get(&key("dbname")))
            .unwrap_or("")
            .to_string();
        if storage_dir.is_empty() {
            return Err(Error::configuration(format!(
                "{} must name a storage directory",
                key("storage_dir")
            )));
        }
        let merging_strategy = match props.get(&key("merging_strategy")) {
            Some(s) => s.parse()?,
            None => dflt.merging_strategy,
        };
        let compression = match props.get(&key("compression")) {
            Some(s) => s.parse()?,
            None => dflt.compression,
        };
        let false_positive = props.parse_or(&key("false_positive"), dflt.false_positive)?;
        if !(false_positive > 0.0 && false_positive < 1.0) {
            return Err(Error::configuration(format!(
                "{}={} must lie in (0, 1)",
                key("false_positive"),
                false_positive
            )));
        }
        let opts = Self {
            storage_dir,
            merging_strategy,
            memtable_max_size: props.parse_or(&key("memtable_max_size"), dflt.memtable_max_size)?,
            level_0_max_size: props.parse_or(&key("level_0_max_size"), dflt.level_0_max_size)?,
            read_buffer_size: props.parse_or(&key("read_buffer_size"), dflt.read_buffer_size)?,
            write_buffer_size: props.parse_or(&key("write_buffer_size"), dflt.write_buffer_size)?,
            num_of_compaction_thread: props.parse_or(
                &key("num_of_compaction_thread"),
                dflt.num_of_compaction_thread,
            )?,
            max_worker_thread: props.parse_or(&key("max_worker_thread"), dflt.max_worker_thread)?,
            false_positive,
            max_level: props.parse_or(&key("max_level"), dflt.max_level)?,
            level_size_ratio: props.parse_or(&key("level_size_ratio"), dflt.level_size_ratio)?,
            block_size: props.parse_or(&key("block_size"), dflt.block_size)?,
            compression,
            destroy: props.bool_or(&key("destroy"), dflt.destroy)?,
            max_background_jobs: props
                .parse_or(&key("max_background_jobs"), dflt.max_background_jobs)?,
            max_open_files: props.parse_or(&key("max_open_files"), dflt.max_open_files)?,
            target_file_size_base: props
                .parse_or(&key("target_file_size_base"), dflt.target_file_size_base)?,
            use_direct_reads: props.bool_or(&key("use_direct_reads"), dflt.use_direct_reads)?,
            use_direct_io_for_flush_compaction: props.bool_or(
                &key("use_direct_io_for_flush_compaction"),
                dflt.use_direct_io_for_flush_compaction,
            )?,
            increase_parallelism: props
                .bool_or(&key("increase_parallelism"), dflt.increase_parallelism)?,
        };
        if opts.max_level == 0 || opts.level_size_ratio < 2 {
            return Err(Error::configuration(format!(
                "{} must be positive and {} at least 2",
                key("max_level"),
                key("level_size_ratio")
            )));
        }
        if opts.block_size == 0 {
            return Err(Error::configuration(format!(
                "{} must be positive",
                key("block_size")
            )));
        }
        Ok(opts)
    }

    /// Bits per key for a bloom filter with this false-positive rate.
    pub fn bloom_bits_per_key(&self) -> f64 {
        let ln2 = std::f64::consts::LN_2;
        (-self.false_positive.ln() / (ln2 * ln2)).ceil()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().copied().collect()
    }

    #[test]
    fn defaults_apply() {
        let opts =
            EngineOptions::from_properties(&props(&[("rocksdb.storage_dir", "/tmp/x")]), "rocksdb")
                .unwrap();
        assert_eq!("/tmp/x", opts.storage_dir);
        assert_eq!(MergingStrategy::Elastic, opts.merging_strategy);
        assert_eq!(1048576, opts.memtable_max_size);
        assert_eq!(536870912, opts.level_0_max_size);
        assert_eq!(16, opts.num_of_compaction_thread);
        assert_eq!(5, opts.max_level);
        assert_eq!(10, opts.level_size_ratio);
        assert_eq!(4096, opts.block_size);
        assert_eq!(Compression::No, opts.compression);
        assert_eq!(-1, opts.max_open_files);
        assert!(!opts.destroy);
        assert_eq!(10.0, opts.bloom_bits_per_key());
    }

    #[test]
    fn dbname_is_an_alias() {
        let opts =
            EngineOptions::from_properties(&props(&[("memory.dbname", "/tmp/y")]), "memory")
                .unwrap();
        assert_eq!("/tmp/y", opts.storage_dir);
    }

    #[test]
    fn storage_dir_is_required() {
        for p in [props(&[]), props(&[("rocksdb.storage_dir", "")])] {
            assert!(matches!(
                EngineOptions::from_properties(&p, "rocksdb"),
                Err(Error::Configuration { .. })
            ));
        }
        // another engine's directory does not count
        assert!(EngineOptions::from_properties(&props(&[("memory.storage_dir", "/x")]), "rocksdb")
            .is_err());
    }

    #[test]
    fn enumerations_parse() {
        let opts = EngineOptions::from_properties(
            &props(&[
                ("e.storage_dir", "/x"),
                ("e.merging_strategy", "TIERING"),
                ("e.compression", "zstd"),
                ("e.destroy", "true"),
            ]),
            "e",
        )
        .unwrap();
        assert_eq!(MergingStrategy::Tiering, opts.merging_strategy);
        assert_eq!(Compression::Zstd, opts.compression);
        assert!(opts.destroy);
        for (k, v) in [
            ("e.merging_strategy", "fastest"),
            ("e.compression", "gzip"),
            ("e.false_positive", "1.5"),
            ("e.false_positive", "0"),
            ("e.block_size", "many"),
            ("e.level_size_ratio", "1"),
        ] {
            let p = props(&[("e.storage_dir", "/x"), (k, v)]);
            assert!(
                matches!(
                    EngineOptions::from_properties(&p, "e"),
                    Err(Error::Configuration { .. })
                ),
                "{}={}",
                k,
                v
            );
        }
    }
}
