use std::sync::{RwLock, RwLockReadGuard};

use rocksdb::{
    BlockBasedOptions, DBCompactionStyle, DBCompressionType, Direction, IteratorMode,
    MergeOperands, Options, DB,
};

use crate::codec::merge_rows;
use crate::Error;

use super::{Compression, Engine, EngineOptions, KeyValueEngine, KeyValueVisitor, MergingStrategy};

/////////////////////////////////////////// merge operator /////////////////////////////////////////

fn merge_operator(key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    let mut value = existing.map(<[u8]>::to_vec);
    for operand in operands.iter() {
        match merge_rows(value.as_deref(), operand) {
            Ok(merged) => value = Some(merged),
            Err(err) => {
                log::error!("merge of {} failed: {}", crate::escape(key), err);
                return None;
            }
        }
    }
    value
}

////////////////////////////////////////////// options /////////////////////////////////////////////

fn compression(compression: Compression) -> Result<DBCompressionType, Error> {
    match compression {
        Compression::No => Ok(DBCompressionType::None),
        Compression::Snappy => Ok(DBCompressionType::Snappy),
        Compression::Zlib => Ok(DBCompressionType::Zlib),
        Compression::Bzip2 => Ok(DBCompressionType::Bz2),
        Compression::Lz4 => Ok(DBCompressionType::Lz4),
        Compression::Lz4hc => Ok(DBCompressionType::Lz4hc),
        Compression::Zstd => Ok(DBCompressionType::Zstd),
        Compression::Xpress => Err(Error::configuration(
            "xpress compression is not available in this build of rocksdb",
        )),
    }
}

/// Translate engine options into rocksdb options.
pub fn rocksdb_options(opts: &EngineOptions) -> Result<Options, Error> {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.set_merge_operator_associative("ycsbint.merge_rows", merge_operator);
    match opts.merging_strategy {
        MergingStrategy::Leveling => {
            options.set_compaction_style(DBCompactionStyle::Level);
        }
        MergingStrategy::Tiering => {
            options.set_compaction_style(DBCompactionStyle::Universal);
        }
        MergingStrategy::Elastic => {
            options.set_compaction_style(DBCompactionStyle::Level);
            options.set_level_compaction_dynamic_level_bytes(true);
        }
    }
    options.set_write_buffer_size(opts.memtable_max_size as usize);
    options.set_writable_file_max_buffer_size(opts.write_buffer_size);
    options.set_compaction_readahead_size(opts.read_buffer_size as usize);
    options.set_max_bytes_for_level_base(opts.level_0_max_size);
    options.set_max_bytes_for_level_multiplier(opts.level_size_ratio as f64);
    options.set_num_levels(opts.max_level as i32);
    options.set_max_subcompactions(opts.num_of_compaction_thread);
    options.set_compression_type(compression(opts.compression)?);
    let mut table = BlockBasedOptions::default();
    table.set_block_size(opts.block_size as usize);
    table.set_bloom_filter(opts.bloom_bits_per_key(), false);
    options.set_block_based_table_factory(&table);
    if opts.max_background_jobs > 0 {
        options.set_max_background_jobs(opts.max_background_jobs);
    }
    if opts.max_open_files != -1 {
        options.set_max_open_files(opts.max_open_files);
    }
    if opts.target_file_size_base > 0 {
        options.set_target_file_size_base(opts.target_file_size_base);
    }
    if opts.use_direct_reads {
        options.set_use_direct_reads(true);
    }
    if opts.use_direct_io_for_flush_compaction {
        options.set_use_direct_io_for_flush_and_compaction(true);
    }
    if opts.increase_parallelism {
        options.increase_parallelism(opts.max_worker_thread as i32);
    }
    Ok(options)
}

/////////////////////////////////////////// RocksDbEngine //////////////////////////////////////////

/// A rocksdb database whose merge operator understands schemaless rows.
pub struct RocksDbEngine {
    path: String,
    db: RwLock<Option<DB>>,
}

impl RocksDbEngine {
    /// Open (after destroying, if configured) the database at `opts.storage_dir`.
    pub fn open(opts: &EngineOptions) -> Result<Self, Error> {
        let options = rocksdb_options(opts)?;
        if opts.destroy {
            log::info!("destroying rocksdb at {}", opts.storage_dir);
            DB::destroy(&options, &opts.storage_dir)
                .map_err(|err| Error::engine(format!("rocksdb destroy error: {}", err)))?;
        }
        let db = DB::open(&options, &opts.storage_dir)
            .map_err(|err| Error::engine(format!("rocksdb open error: {}", err)))?;
        log::info!(
            "opened rocksdb at {} with {} merging",
            opts.storage_dir,
            opts.merging_strategy
        );
        Ok(Self {
            path: opts.storage_dir.clone(),
            db: RwLock::new(Some(db)),
        })
    }

    fn db(&self) -> Result<RwLockReadGuard<'_, Option<DB>>, Error> {
        let guard = self
            .db
            .read()
            .map_err(|_| Error::engine("rocksdb: lock poisoned"))?;
        if guard.is_none() {
            return Err(Error::engine(format!("rocksdb at {} is closed", self.path)));
        }
        Ok(guard)
    }
}

macro_rules! with_db {
    ($this:ident, $db:ident => $body:expr) => {{
        let guard = $this.db()?;
        match guard.as_ref() {
            Some($db) => $body,
            None => Err(Error::engine("rocksdb is closed")),
        }
    }};
}

impl Engine for RocksDbEngine {
    fn name(&self) -> &str {
        "rocksdb"
    }

    fn close(&self) -> Result<(), Error> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| Error::engine("rocksdb: lock poisoned"))?;
        match guard.take() {
            Some(db) => {
                drop(db);
                log::info!("closed rocksdb at {}", self.path);
                Ok(())
            }
            None => Err(Error::engine(format!(
                "rocksdb at {} closed twice",
                self.path
            ))),
        }
    }
}

impl KeyValueEngine for RocksDbEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        with_db!(self, db => db
            .get(key)
            .map_err(|err| Error::engine(format!("rocksdb get error: {}", err))))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        with_db!(self, db => db
            .put(key, value)
            .map_err(|err| Error::engine(format!("rocksdb put error: {}", err))))
    }

    fn merge(&self, key: &[u8], operand: &[u8]) -> Result<(), Error> {
        with_db!(self, db => db
            .merge(key, operand)
            .map_err(|err| Error::engine(format!("rocksdb merge error: {}", err))))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        with_db!(self, db => db
            .delete(key)
            .map_err(|err| Error::engine(format!("rocksdb delete error: {}", err))))
    }

    fn visit(&self, start: &[u8], visitor: &mut KeyValueVisitor<'_>) -> Result<(), Error> {
        with_db!(self, db => {
            for item in db.iterator(IteratorMode::From(start, Direction::Forward)) {
                let (key, value) =
                    item.map_err(|err| Error::engine(format!("rocksdb iterator error: {}", err)))?;
                if !visitor(&key[..], &value[..])? {
                    break;
                }
            }
            Ok(())
        })
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xpress_is_rejected() {
        let opts = EngineOptions {
            storage_dir: "/tmp/ycsbint-xpress".to_string(),
            compression: Compression::Xpress,
            ..EngineOptions::default()
        };
        assert!(matches!(
            rocksdb_options(&opts),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn every_strategy_builds() {
        for merging_strategy in [
            MergingStrategy::Elastic,
            MergingStrategy::Tiering,
            MergingStrategy::Leveling,
        ] {
            let opts = EngineOptions {
                storage_dir: "/tmp/ycsbint-strategy".to_string(),
                merging_strategy,
                compression: Compression::Snappy,
                max_open_files: 128,
                ..EngineOptions::default()
            };
            assert!(rocksdb_options(&opts).is_ok());
        }
    }
}
