//! Row formats are the dispatch table of an adapter.
//!
//! Every adapter selects one [RowFormat] when it is initialized.  The format decides how rows are
//! laid out in the engine and implements each operation against that layout, so operations carry
//! no per-call branching on configuration.

use crate::codec::{
    decode_row, decode_row_filtered, encode_row, overlay_fields, ColumnLayout,
};
use crate::engine::{KeyValueEngine, TupleEngine};
use crate::{
    Error, Field, Properties, Row, Status, FIELD_COUNT_DEFAULT, FIELD_COUNT_PROPERTY,
    FIELD_NAME_PREFIX_DEFAULT, FIELD_NAME_PREFIX_PROPERTY,
};

/// The schemaless format's name.
pub const SINGLE: &str = "single";
/// The columnar format's name.
pub const COLUMNAR: &str = "columnar";

///////////////////////////////////////////// Predicate ////////////////////////////////////////////

/// Inclusive bytewise ranges over named fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Predicate {
    ranges: Vec<(String, Vec<u8>, Vec<u8>)>,
}

impl Predicate {
    /// Pair `low` and `high` by position.  The lists must be equally long and name the same field
    /// at every position.
    pub fn new(low: &[Field], high: &[Field]) -> Result<Self, Error> {
        if low.len() != high.len() {
            return Err(Error::InvalidArgument {
                what: format!(
                    "filter has {} low bounds and {} high bounds",
                    low.len(),
                    high.len()
                ),
            });
        }
        let mut ranges = Vec::with_capacity(low.len());
        for (lo, hi) in low.iter().zip(high.iter()) {
            if lo.name() != hi.name() {
                return Err(Error::InvalidArgument {
                    what: format!(
                        "filter pairs low bound {:?} with high bound {:?}",
                        lo.name(),
                        hi.name()
                    ),
                });
            }
            ranges.push((
                lo.name().to_string(),
                lo.value().to_vec(),
                hi.value().to_vec(),
            ));
        }
        Ok(Self { ranges })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ranges.iter().map(|(name, _, _)| name.as_str())
    }

    /// True when every designated field is present and within its range.
    pub fn matches<'a, F: FnMut(&str) -> Option<&'a [u8]>>(&self, mut lookup: F) -> bool {
        self.ranges.iter().all(|(name, low, high)| match lookup(name) {
            Some(value) => low.as_slice() <= value && value <= high.as_slice(),
            None => false,
        })
    }

    pub fn matches_row(&self, row: &Row) -> bool {
        self.matches(|name| row.iter().find(|f| f.name() == name).map(Field::value))
    }
}

///////////////////////////////////////////// RowFormat ////////////////////////////////////////////

/// One implementation of the operation set against engines of type `E`.
pub trait RowFormat<E: ?Sized>: Send + Sync {
    fn name(&self) -> &'static str;
    fn read(&self, engine: &E, key: &[u8], fields: Option<&[String]>)
        -> Result<Option<Row>, Error>;
    fn scan(
        &self,
        engine: &E,
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error>;
    fn update(&self, engine: &E, key: &[u8], fields: &[Field]) -> Result<Status, Error>;
    fn insert(&self, engine: &E, key: &[u8], fields: &[Field]) -> Result<Status, Error>;
    fn delete(&self, engine: &E, key: &[u8]) -> Result<Status, Error>;
    fn filter(
        &self,
        engine: &E,
        predicate: &Predicate,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error>;
}

/// Engine kinds that know which row formats they support.
pub trait Formats {
    /// The format used when `<engine>.format` is not set.
    fn default_format() -> &'static str;
    /// Build the format named `format`, configured from `props` under the `engine` prefix.
    fn select(
        format: &str,
        props: &Properties,
        engine: &str,
    ) -> Result<Box<dyn RowFormat<Self>>, Error>;
}

fn field_count(props: &Properties) -> Result<usize, Error> {
    props.parse_or(FIELD_COUNT_PROPERTY, FIELD_COUNT_DEFAULT)
}

fn unknown_format(format: &str, engine: &str) -> Error {
    Error::configuration(format!(
        "format {:?} is not supported by {} engines",
        format, engine
    ))
}

impl Formats for dyn KeyValueEngine {
    fn default_format() -> &'static str {
        SINGLE
    }

    fn select(
        format: &str,
        props: &Properties,
        engine: &str,
    ) -> Result<Box<dyn RowFormat<Self>>, Error> {
        if format != SINGLE {
            return Err(unknown_format(format, "key-value"));
        }
        let field_count = field_count(props)?;
        if props.bool_or(&format!("{}.mergeupdate", engine), false)? {
            Ok(Box::new(SchemalessMergeFormat {
                inner: SchemalessFormat { field_count },
            }))
        } else {
            Ok(Box::new(SchemalessFormat { field_count }))
        }
    }
}

impl Formats for dyn TupleEngine {
    fn default_format() -> &'static str {
        COLUMNAR
    }

    fn select(
        format: &str,
        props: &Properties,
        _: &str,
    ) -> Result<Box<dyn RowFormat<Self>>, Error> {
        if format != COLUMNAR {
            return Err(unknown_format(format, "tuple"));
        }
        let prefix = props.get_or(FIELD_NAME_PREFIX_PROPERTY, FIELD_NAME_PREFIX_DEFAULT);
        Ok(Box::new(ColumnarFormat {
            layout: ColumnLayout::new(prefix, field_count(props)?),
        }))
    }
}

////////////////////////////////////////// SchemalessFormat ////////////////////////////////////////

/// One encoded row per key.  Updates read, overlay, and rewrite the row.
#[derive(Clone, Debug)]
pub struct SchemalessFormat {
    field_count: usize,
}

impl SchemalessFormat {
    fn decode(&self, key: &[u8], value: &[u8], fields: Option<&[String]>) -> Result<Row, Error> {
        match fields {
            Some(fields) => decode_row_filtered(value, fields),
            None => {
                let row = decode_row(value)?;
                if row.len() != self.field_count {
                    return Err(Error::corrupt(format!(
                        "row {} has {} fields, expected {}",
                        crate::escape(key),
                        row.len(),
                        self.field_count
                    )));
                }
                Ok(row)
            }
        }
    }
}

impl RowFormat<dyn KeyValueEngine> for SchemalessFormat {
    fn name(&self) -> &'static str {
        SINGLE
    }

    fn read(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: Option<&[String]>,
    ) -> Result<Option<Row>, Error> {
        match engine.get(key)? {
            Some(value) => Ok(Some(self.decode(key, &value, fields)?)),
            None => Ok(None),
        }
    }

    fn scan(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        engine
            .scan(start, count)?
            .into_iter()
            .map(|(key, value)| self.decode(&key, &value, fields))
            .collect()
    }

    fn update(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        let value = match engine.get(key)? {
            Some(value) => value,
            None => return Ok(Status::NotFound),
        };
        let mut row = decode_row(&value)?;
        overlay_fields(&mut row, fields)?;
        engine.put(key, &encode_row(&row)?)?;
        Ok(Status::Ok)
    }

    fn insert(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        engine.put(key, &encode_row(fields)?)?;
        Ok(Status::Ok)
    }

    fn delete(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
    ) -> Result<Status, Error> {
        engine.del(key)?;
        Ok(Status::Ok)
    }

    fn filter(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        predicate: &Predicate,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        let mut rows = vec![];
        engine.visit(&[], &mut |key, value| {
            let row = self.decode(key, value, None)?;
            if predicate.matches_row(&row) {
                match fields {
                    Some(fields) => rows.push(decode_row_filtered(value, fields)?),
                    None => rows.push(row),
                }
            }
            Ok(true)
        })?;
        Ok(rows)
    }
}

/////////////////////////////////////// SchemalessMergeFormat //////////////////////////////////////

/// The schemaless format, with updates written as merge operands instead of read-modify-write.
///
/// The engine's merge operator overlays operand fields onto the stored row and appends fields the
/// row lacks.  The merge operator assumes a stored row, so an update of an absent key is NotFound
/// and writes nothing.
#[derive(Clone, Debug)]
pub struct SchemalessMergeFormat {
    inner: SchemalessFormat,
}

impl RowFormat<dyn KeyValueEngine> for SchemalessMergeFormat {
    fn name(&self) -> &'static str {
        SINGLE
    }

    fn read(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: Option<&[String]>,
    ) -> Result<Option<Row>, Error> {
        self.inner.read(engine, key, fields)
    }

    fn scan(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        self.inner.scan(engine, start, count, fields)
    }

    fn update(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        if engine.get(key)?.is_none() {
            return Ok(Status::NotFound);
        }
        engine.merge(key, &encode_row(fields)?)?;
        Ok(Status::Ok)
    }

    fn insert(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        self.inner.insert(engine, key, fields)
    }

    fn delete(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        key: &[u8],
    ) -> Result<Status, Error> {
        self.inner.delete(engine, key)
    }

    fn filter(
        &self,
        engine: &(dyn KeyValueEngine + 'static),
        predicate: &Predicate,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        self.inner.filter(engine, predicate, fields)
    }
}

/////////////////////////////////////////// ColumnarFormat /////////////////////////////////////////

/// One slot per field, located by the numeric suffix of the field's name.
#[derive(Clone, Debug)]
pub struct ColumnarFormat {
    layout: ColumnLayout,
}

impl ColumnarFormat {
    fn decode(&self, slots: &[Vec<u8>], fields: Option<&[String]>) -> Result<Row, Error> {
        match fields {
            Some(fields) => self.layout.decode_filtered(slots, fields),
            None => self.layout.decode(slots),
        }
    }
}

impl RowFormat<dyn TupleEngine> for ColumnarFormat {
    fn name(&self) -> &'static str {
        COLUMNAR
    }

    fn read(
        &self,
        engine: &(dyn TupleEngine + 'static),
        key: &[u8],
        fields: Option<&[String]>,
    ) -> Result<Option<Row>, Error> {
        match engine.get_tuple(key)? {
            Some(slots) => Ok(Some(self.decode(&slots, fields)?)),
            None => Ok(None),
        }
    }

    fn scan(
        &self,
        engine: &(dyn TupleEngine + 'static),
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        engine
            .scan_tuples(start, count)?
            .iter()
            .map(|slots| self.decode(slots, fields))
            .collect()
    }

    fn update(
        &self,
        engine: &(dyn TupleEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        let mut slots = match engine.get_tuple(key)? {
            Some(slots) => slots,
            None => return Ok(Status::NotFound),
        };
        self.layout.overlay(&mut slots, fields)?;
        engine.put_tuple(key, slots)?;
        Ok(Status::Ok)
    }

    fn insert(
        &self,
        engine: &(dyn TupleEngine + 'static),
        key: &[u8],
        fields: &[Field],
    ) -> Result<Status, Error> {
        engine.put_tuple(key, self.layout.encode(key, fields)?)?;
        Ok(Status::Ok)
    }

    fn delete(
        &self,
        engine: &(dyn TupleEngine + 'static),
        key: &[u8],
    ) -> Result<Status, Error> {
        engine.del_tuple(key)?;
        Ok(Status::Ok)
    }

    fn filter(
        &self,
        engine: &(dyn TupleEngine + 'static),
        predicate: &Predicate,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        let slots_of = predicate
            .names()
            .map(|name| self.layout.slot_of(name))
            .collect::<Result<Vec<_>, Error>>()?;
        let mut rows = vec![];
        engine.visit_tuples(&[], &mut |slots| {
            let mut designated = slots_of.iter();
            let matched = predicate.matches(|_| {
                designated
                    .next()
                    .and_then(|slot| slots.get(*slot))
                    .map(Vec::as_slice)
            });
            if matched {
                rows.push(self.decode(slots, fields)?);
            }
            Ok(true)
        })?;
        Ok(rows)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &[u8])]) -> Vec<Field> {
        pairs.iter().map(|(n, v)| Field::new(*n, *v)).collect()
    }

    #[test]
    fn predicate_pairs_names() {
        assert!(matches!(
            Predicate::new(&fields(&[("a", b"1")]), &[]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            Predicate::new(&fields(&[("a", b"1")]), &fields(&[("b", b"2")])),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn predicate_is_inclusive() {
        let p = Predicate::new(&fields(&[("a", b"b")]), &fields(&[("a", b"d")])).unwrap();
        for (value, expected) in [
            (&b"a"[..], false),
            (b"b", true),
            (b"c", true),
            (b"d", true),
            (b"da", false),
        ] {
            assert_eq!(
                expected,
                p.matches_row(&fields(&[("a", value)])),
                "{:?}",
                value
            );
        }
        assert!(!p.matches_row(&fields(&[("z", b"c")])));
        assert!(Predicate::default().matches_row(&vec![]));
    }

    #[test]
    fn formats_by_engine_kind() {
        let props = Properties::default();
        assert_eq!(
            SINGLE,
            <dyn KeyValueEngine as Formats>::select(SINGLE, &props, "memory")
                .unwrap()
                .name()
        );
        assert_eq!(
            COLUMNAR,
            <dyn TupleEngine as Formats>::select(COLUMNAR, &props, "tuple")
                .unwrap()
                .name()
        );
        assert!(<dyn KeyValueEngine as Formats>::select(COLUMNAR, &props, "memory").is_err());
        assert!(<dyn TupleEngine as Formats>::select(SINGLE, &props, "tuple").is_err());
        assert!(<dyn KeyValueEngine as Formats>::select("multi", &props, "memory").is_err());
    }
}
