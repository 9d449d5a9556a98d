//! Adapters bind the operation set to an engine.

use std::sync::Arc;

use biometrics::{Collector, Counter};

use crate::engine::Engine;
use crate::{Error, Field, Properties, Row, Status, StorageAdapter};

mod basic;
mod factory;
mod format;
mod handle;

pub use basic::BasicAdapter;
pub use factory::AdapterFactory;
pub use format::{
    ColumnarFormat, Formats, Predicate, RowFormat, SchemalessFormat, SchemalessMergeFormat,
    COLUMNAR, SINGLE,
};
pub use handle::{Opener, SharedHandle};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static INIT: Counter = Counter::new("ycsbint.adapter.init");
static CLEANUP: Counter = Counter::new("ycsbint.adapter.cleanup");
static READ: Counter = Counter::new("ycsbint.adapter.read");
static READ_NOT_FOUND: Counter = Counter::new("ycsbint.adapter.read.not_found");
static SCAN: Counter = Counter::new("ycsbint.adapter.scan");
static UPDATE: Counter = Counter::new("ycsbint.adapter.update");
static UPDATE_NOT_FOUND: Counter = Counter::new("ycsbint.adapter.update.not_found");
static INSERT: Counter = Counter::new("ycsbint.adapter.insert");
static DELETE: Counter = Counter::new("ycsbint.adapter.delete");
static FILTER: Counter = Counter::new("ycsbint.adapter.filter");
static ERROR: Counter = Counter::new("ycsbint.adapter.error");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&INIT);
    collector.register_counter(&CLEANUP);
    collector.register_counter(&READ);
    collector.register_counter(&READ_NOT_FOUND);
    collector.register_counter(&SCAN);
    collector.register_counter(&UPDATE);
    collector.register_counter(&UPDATE_NOT_FOUND);
    collector.register_counter(&INSERT);
    collector.register_counter(&DELETE);
    collector.register_counter(&FILTER);
    collector.register_counter(&ERROR);
    handle::register_biometrics(collector);
}

fn counted<T>(result: Result<T, Error>) -> Result<T, Error> {
    if result.is_err() {
        ERROR.click();
    }
    result
}

////////////////////////////////////////////// Adapter /////////////////////////////////////////////

struct Binding<E: ?Sized + 'static> {
    engine: Arc<E>,
    format: Box<dyn RowFormat<E>>,
}

/// A client thread's view of a shared engine.
///
/// `init` selects the row format from `<engine>.format` (and `<engine>.mergeupdate`) and takes a
/// reference on the shared handle; `cleanup` drops it.  Every operation between the two goes
/// straight to the selected format.
pub struct Adapter<E: ?Sized + Engine + Formats + 'static> {
    name: String,
    handle: Arc<SharedHandle<E>>,
    props: Arc<Properties>,
    binding: Option<Binding<E>>,
}

impl<E: ?Sized + Engine + Formats + 'static> Adapter<E> {
    /// Create an adapter for the engine configured under `name`.  Nothing is opened until `init`.
    pub fn new(
        name: impl Into<String>,
        handle: Arc<SharedHandle<E>>,
        props: Arc<Properties>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            props,
            binding: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    /// The name of the selected row format, once initialized.
    pub fn format(&self) -> Option<&'static str> {
        self.binding.as_ref().map(|b| b.format.name())
    }

    fn binding(&self) -> Result<&Binding<E>, Error> {
        self.binding.as_ref().ok_or_else(|| {
            Error::configuration(format!("{} adapter used outside init/cleanup", self.name))
        })
    }
}

impl<E: ?Sized + Engine + Formats + 'static> StorageAdapter for Adapter<E> {
    fn init(&mut self) -> Result<(), Error> {
        if self.binding.is_some() {
            return counted(Err(Error::configuration(format!(
                "{} adapter initialized twice",
                self.name
            ))));
        }
        let format_key = format!("{}.format", self.name);
        let format = self.props.get_or(&format_key, E::default_format());
        let format = counted(E::select(format, &self.props, &self.name))?;
        let engine = counted(self.handle.acquire())?;
        log::debug!("{} adapter initialized with {} format", self.name, format.name());
        INIT.click();
        self.binding = Some(Binding { engine, format });
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        match self.binding.take() {
            Some(binding) => {
                drop(binding);
                CLEANUP.click();
                counted(self.handle.release())
            }
            None => counted(Err(Error::configuration(format!(
                "{} adapter cleaned up without init",
                self.name
            )))),
        }
    }

    fn read(&mut self, key: &[u8], fields: Option<&[String]>) -> Result<Option<Row>, Error> {
        READ.click();
        let binding = counted(self.binding())?;
        let row = counted(binding.format.read(&*binding.engine, key, fields))?;
        if row.is_none() {
            READ_NOT_FOUND.click();
        }
        Ok(row)
    }

    fn scan(
        &mut self,
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        SCAN.click();
        let binding = counted(self.binding())?;
        counted(binding.format.scan(&*binding.engine, start, count, fields))
    }

    fn update(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        UPDATE.click();
        let binding = counted(self.binding())?;
        let status = counted(binding.format.update(&*binding.engine, key, fields))?;
        if status == Status::NotFound {
            UPDATE_NOT_FOUND.click();
        }
        Ok(status)
    }

    fn insert(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        INSERT.click();
        let binding = counted(self.binding())?;
        counted(binding.format.insert(&*binding.engine, key, fields))
    }

    fn delete(&mut self, key: &[u8]) -> Result<Status, Error> {
        DELETE.click();
        let binding = counted(self.binding())?;
        counted(binding.format.delete(&*binding.engine, key))
    }

    fn filter(
        &mut self,
        low: &[Field],
        high: &[Field],
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        FILTER.click();
        let binding = counted(self.binding())?;
        let predicate = counted(Predicate::new(low, high))?;
        counted(binding.format.filter(&*binding.engine, &predicate, fields))
    }
}

impl<E: ?Sized + Engine + Formats + 'static> Drop for Adapter<E> {
    fn drop(&mut self) {
        if self.binding.take().is_some() {
            log::warn!("{} adapter dropped without cleanup", self.name);
            if let Err(err) = self.handle.release() {
                log::error!("{} adapter could not release its engine: {}", self.name, err);
            }
        }
    }
}
