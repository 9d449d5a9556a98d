//! In-memory reference engines.  They keep no state beyond the lifetime of the handle.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::Error;

use super::{Engine, KeyValueEngine, KeyValueVisitor, TupleEngine, TupleVisitor};

/// Combine an existing value (if any) with a merge operand.
pub type MergeOperator = fn(Option<&[u8]>, &[u8]) -> Result<Vec<u8>, Error>;

fn read_lock<'a, T>(name: &str, lock: &'a RwLock<T>) -> Result<RwLockReadGuard<'a, T>, Error> {
    lock.read()
        .map_err(|_| Error::engine(format!("{}: lock poisoned", name)))
}

fn write_lock<'a, T>(name: &str, lock: &'a RwLock<T>) -> Result<RwLockWriteGuard<'a, T>, Error> {
    lock.write()
        .map_err(|_| Error::engine(format!("{}: lock poisoned", name)))
}

fn check_open(name: &str, closed: &AtomicBool) -> Result<(), Error> {
    if closed.load(Ordering::Acquire) {
        Err(Error::engine(format!("{}: engine is closed", name)))
    } else {
        Ok(())
    }
}

/////////////////////////////////////////// MemoryEngine ///////////////////////////////////////////

/// A sorted map behind a reader-writer lock.
///
/// Visitors run under the read lock and must not write to the engine they visit.
#[derive(Debug)]
pub struct MemoryEngine {
    name: String,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    merge_operator: Option<MergeOperator>,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            merge_operator: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_merge_operator(mut self, merge_operator: MergeOperator) -> Self {
        self.merge_operator = Some(merge_operator);
        self
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(read_lock(&self.name, &self.entries)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

impl Engine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::engine(format!("{}: closed twice", self.name)));
        }
        write_lock(&self.name, &self.entries)?.clear();
        Ok(())
    }
}

impl KeyValueEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        check_open(&self.name, &self.closed)?;
        Ok(read_lock(&self.name, &self.entries)?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        write_lock(&self.name, &self.entries)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn merge(&self, key: &[u8], operand: &[u8]) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        let merge_operator = self
            .merge_operator
            .ok_or_else(|| Error::engine(format!("{}: no merge operator", self.name)))?;
        let mut entries = write_lock(&self.name, &self.entries)?;
        let merged = merge_operator(entries.get(key).map(Vec::as_slice), operand)?;
        entries.insert(key.to_vec(), merged);
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        write_lock(&self.name, &self.entries)?.remove(key);
        Ok(())
    }

    fn visit(&self, start: &[u8], visitor: &mut KeyValueVisitor<'_>) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        let entries = read_lock(&self.name, &self.entries)?;
        for (key, value) in entries.range::<[u8], _>((Bound::Included(start), Bound::Unbounded)) {
            if !visitor(key, value)? {
                break;
            }
        }
        Ok(())
    }
}

//////////////////////////////////////////// TupleStore ////////////////////////////////////////////

/// A sorted map from key to a fixed number of slots.
#[derive(Debug)]
pub struct TupleStore {
    name: String,
    width: usize,
    tuples: RwLock<BTreeMap<Vec<u8>, Vec<Vec<u8>>>>,
    closed: AtomicBool,
}

impl TupleStore {
    /// Every stored tuple has exactly `width` slots, the key included.
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            tuples: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl Engine for TupleStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::engine(format!("{}: closed twice", self.name)));
        }
        write_lock(&self.name, &self.tuples)?.clear();
        Ok(())
    }
}

impl TupleEngine for TupleStore {
    fn get_tuple(&self, key: &[u8]) -> Result<Option<Vec<Vec<u8>>>, Error> {
        check_open(&self.name, &self.closed)?;
        Ok(read_lock(&self.name, &self.tuples)?.get(key).cloned())
    }

    fn put_tuple(&self, key: &[u8], slots: Vec<Vec<u8>>) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        if slots.len() != self.width {
            return Err(Error::InvalidArgument {
                what: format!(
                    "{}: tuple has {} slots, expected {}",
                    self.name,
                    slots.len(),
                    self.width
                ),
            });
        }
        if slots[0] != key {
            return Err(Error::InvalidArgument {
                what: format!("{}: slot 0 must hold the key", self.name),
            });
        }
        write_lock(&self.name, &self.tuples)?.insert(key.to_vec(), slots);
        Ok(())
    }

    fn del_tuple(&self, key: &[u8]) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        write_lock(&self.name, &self.tuples)?.remove(key);
        Ok(())
    }

    fn visit_tuples(&self, start: &[u8], visitor: &mut TupleVisitor<'_>) -> Result<(), Error> {
        check_open(&self.name, &self.closed)?;
        let tuples = read_lock(&self.name, &self.tuples)?;
        for (_, slots) in tuples.range::<[u8], _>((Bound::Included(start), Bound::Unbounded)) {
            if !visitor(slots)? {
                break;
            }
        }
        Ok(())
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn append(existing: Option<&[u8]>, operand: &[u8]) -> Result<Vec<u8>, Error> {
        let mut value = existing.map(<[u8]>::to_vec).unwrap_or_default();
        value.extend_from_slice(operand);
        Ok(value)
    }

    #[test]
    fn get_put_del() {
        let engine = MemoryEngine::new("memory");
        assert_eq!(None, engine.get(b"k").unwrap());
        engine.put(b"k", b"v").unwrap();
        assert_eq!(Some(b"v".to_vec()), engine.get(b"k").unwrap());
        engine.del(b"k").unwrap();
        assert_eq!(None, engine.get(b"k").unwrap());
        assert!(engine.is_empty().unwrap());
    }

    #[test]
    fn merge_uses_operator() {
        let engine = MemoryEngine::new("memory");
        assert!(matches!(engine.merge(b"k", b"x"), Err(Error::Engine { .. })));
        let engine = MemoryEngine::new("memory").with_merge_operator(append);
        engine.merge(b"k", b"ab").unwrap();
        engine.merge(b"k", b"cd").unwrap();
        assert_eq!(Some(b"abcd".to_vec()), engine.get(b"k").unwrap());
    }

    #[test]
    fn scan_from_start() {
        let engine = MemoryEngine::new("memory");
        for key in ["a", "b", "c", "d"] {
            engine.put(key.as_bytes(), key.as_bytes()).unwrap();
        }
        let keys = |pairs: Vec<(Vec<u8>, Vec<u8>)>| {
            pairs
                .into_iter()
                .map(|(k, _)| String::from_utf8(k).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(vec!["b", "c"], keys(engine.scan(b"b", 2).unwrap()));
        assert_eq!(vec!["c", "d"], keys(engine.scan(b"bb", 10).unwrap()));
        assert!(engine.scan(b"a", 0).unwrap().is_empty());
        assert!(engine.scan(b"e", 5).unwrap().is_empty());
    }

    #[test]
    fn closed_engine_fails() {
        let engine = MemoryEngine::new("memory");
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.get(b"k"), Err(Error::Engine { .. })));
        assert!(engine.close().is_err());
    }

    #[test]
    fn tuples_have_fixed_width() {
        let store = TupleStore::new("tuple", 3);
        let slots = vec![b"k".to_vec(), b"a".to_vec(), b"b".to_vec()];
        store.put_tuple(b"k", slots.clone()).unwrap();
        assert_eq!(Some(slots), store.get_tuple(b"k").unwrap());
        assert!(store.put_tuple(b"k", vec![b"k".to_vec()]).is_err());
        assert!(store
            .put_tuple(b"k", vec![b"j".to_vec(), vec![], vec![]])
            .is_err());
        assert_eq!(1, store.scan_tuples(b"", 10).unwrap().len());
        store.del_tuple(b"k").unwrap();
        assert_eq!(None, store.get_tuple(b"k").unwrap());
    }
}
