use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "reference")]
use crate::codec::merge_rows;
#[cfg(feature = "reference")]
use crate::engine::memory::{MemoryEngine, TupleStore};
#[cfg(feature = "rocksdb")]
use crate::engine::rocksdb::RocksDbEngine;
#[cfg(any(feature = "reference", feature = "rocksdb"))]
use crate::engine::EngineOptions;
use crate::engine::{KeyValueEngine, TupleEngine};
use crate::{Error, Properties, StorageAdapter};
#[cfg(feature = "reference")]
use crate::{FIELD_COUNT_DEFAULT, FIELD_COUNT_PROPERTY};

use super::{Adapter, BasicAdapter, SharedHandle};

/////////////////////////////////////////// engine openers /////////////////////////////////////////

#[cfg(feature = "reference")]
fn open_memory(props: &Properties) -> Result<Arc<dyn KeyValueEngine>, Error> {
    EngineOptions::from_properties(props, "memory")?;
    Ok(Arc::new(
        MemoryEngine::new("memory").with_merge_operator(merge_rows),
    ))
}

#[cfg(feature = "reference")]
fn open_tuple(props: &Properties) -> Result<Arc<dyn TupleEngine>, Error> {
    EngineOptions::from_properties(props, "tuple")?;
    let field_count: usize = props.parse_or(FIELD_COUNT_PROPERTY, FIELD_COUNT_DEFAULT)?;
    Ok(Arc::new(TupleStore::new("tuple", field_count + 1)))
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(props: &Properties) -> Result<Arc<dyn KeyValueEngine>, Error> {
    let opts = EngineOptions::from_properties(props, "rocksdb")?;
    Ok(Arc::new(RocksDbEngine::open(&opts)?))
}

////////////////////////////////////////// AdapterFactory //////////////////////////////////////////

enum Registered {
    KeyValue(Arc<SharedHandle<dyn KeyValueEngine>>),
    Tuple(Arc<SharedHandle<dyn TupleEngine>>),
}

/// The owner of every shared engine handle in a process.
///
/// Adapters created for the same engine name share one handle, and so one engine.  Dropping the
/// factory does not close engines; the last adapter's cleanup does.
pub struct AdapterFactory {
    props: Arc<Properties>,
    engines: BTreeMap<String, Registered>,
}

impl AdapterFactory {
    /// A factory that knows "basic" and every engine compiled in.
    pub fn new(props: Properties) -> Self {
        let mut factory = Self::empty(props);
        #[cfg(feature = "reference")]
        {
            factory.register_key_value("memory", open_memory);
            factory.register_tuple("tuple", open_tuple);
        }
        #[cfg(feature = "rocksdb")]
        factory.register_key_value("rocksdb", open_rocksdb);
        factory
    }

    /// A factory that knows only "basic".
    pub fn empty(props: Properties) -> Self {
        Self {
            props: Arc::new(props),
            engines: BTreeMap::new(),
        }
    }

    pub fn properties(&self) -> &Properties {
        &self.props
    }

    /// Register a key-value engine under `name`.  Its properties live under the `name.` prefix.
    pub fn register_key_value<F>(&mut self, name: &str, open: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn KeyValueEngine>, Error> + Send + Sync + 'static,
    {
        let props = Arc::clone(&self.props);
        let handle = SharedHandle::new(name, move || open(&props));
        self.engines
            .insert(name.to_string(), Registered::KeyValue(Arc::new(handle)));
    }

    /// Register a tuple engine under `name`.  Its properties live under the `name.` prefix.
    pub fn register_tuple<F>(&mut self, name: &str, open: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn TupleEngine>, Error> + Send + Sync + 'static,
    {
        let props = Arc::clone(&self.props);
        let handle = SharedHandle::new(name, move || open(&props));
        self.engines
            .insert(name.to_string(), Registered::Tuple(Arc::new(handle)));
    }

    /// Every name `create` accepts.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec!["basic"];
        names.extend(self.engines.keys().map(String::as_str));
        names
    }

    /// Create an uninitialized adapter for `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn StorageAdapter>, Error> {
        if name == "basic" {
            log::debug!("creating basic adapter");
            return Ok(Box::new(BasicAdapter::new()));
        }
        match self.engines.get(name) {
            Some(Registered::KeyValue(handle)) => {
                log::debug!("creating key-value adapter for {}", name);
                Ok(Box::new(Adapter::new(
                    name,
                    Arc::clone(handle),
                    Arc::clone(&self.props),
                )))
            }
            Some(Registered::Tuple(handle)) => {
                log::debug!("creating tuple adapter for {}", name);
                Ok(Box::new(Adapter::new(
                    name,
                    Arc::clone(handle),
                    Arc::clone(&self.props),
                )))
            }
            None => Err(Error::configuration(format!(
                "unknown adapter {:?}; expected one of {}",
                name,
                self.names().join(", ")
            ))),
        }
    }

    /// The shared handle of a key-value engine.
    pub fn key_value_handle(&self, name: &str) -> Option<Arc<SharedHandle<dyn KeyValueEngine>>> {
        match self.engines.get(name) {
            Some(Registered::KeyValue(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// The shared handle of a tuple engine.
    pub fn tuple_handle(&self, name: &str) -> Option<Arc<SharedHandle<dyn TupleEngine>>> {
        match self.engines.get(name) {
            Some(Registered::Tuple(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
