//! ycsbint provides a YCSB INTerface.
//!
//! One workload driver issues Read, Scan, Update, Insert, Delete, and Filter against a
//! [StorageAdapter].  Adapters translate rows to and from bytes with the [codec] and issue
//! engine-native calls against an [engine].  Which engine and which row layout is a matter of
//! [Properties], resolved when the adapter is initialized rather than when it is compiled.

use std::fmt::{Display, Formatter};

use biometrics::Collector;

pub mod adapter;
pub mod codec;
pub mod engine;
pub mod properties;

pub use adapter::{Adapter, AdapterFactory, BasicAdapter, SharedHandle};
pub use codec::{ColumnLayout, RowReader};
pub use engine::{EngineOptions, KeyValueEngine, TupleEngine};
pub use properties::Properties;

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// The property naming the number of fields in a row.
pub const FIELD_COUNT_PROPERTY: &str = "fieldcount";
/// The number of fields in a row when unspecified.
pub const FIELD_COUNT_DEFAULT: usize = 10;
/// The property naming the prefix of every field name.
pub const FIELD_NAME_PREFIX_PROPERTY: &str = "fieldnameprefix";
/// The field name prefix when unspecified.
pub const FIELD_NAME_PREFIX_DEFAULT: &str = "field";

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// All Error conditions within `ycsbint`.  None of them are recoverable; a key that is not found
/// is a [Status], not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Configuration was missing or invalid, or an adapter was used outside init/cleanup.
    Configuration {
        /// What is wrong with the configuration.
        what: String,
    },
    /// A row did not decode.  Writer and reader disagree on the row format.
    CorruptRow {
        /// Where decoding failed.
        context: String,
    },
    /// The underlying engine failed.
    Engine {
        /// The engine's description of the failure.
        what: String,
    },
    /// A field name that is not part of the row or the schema.
    UnknownField {
        /// The offending name.
        name: String,
    },
    /// The caller passed arguments that cannot be satisfied.
    InvalidArgument {
        /// What is wrong with the arguments.
        what: String,
    },
}

impl Error {
    /// Every error aborts the run.  Recoverable outcomes are reported as [Status].
    pub fn is_fatal(&self) -> bool {
        true
    }

    pub(crate) fn configuration(what: impl Into<String>) -> Self {
        Error::Configuration { what: what.into() }
    }

    pub(crate) fn corrupt(context: impl Into<String>) -> Self {
        Error::CorruptRow {
            context: context.into(),
        }
    }

    pub(crate) fn engine(what: impl Into<String>) -> Self {
        Error::Engine { what: what.into() }
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Configuration { what } => fmt
                .debug_struct("Configuration")
                .field("what", what)
                .finish(),
            Error::CorruptRow { context } => fmt
                .debug_struct("CorruptRow")
                .field("context", context)
                .finish(),
            Error::Engine { what } => fmt.debug_struct("Engine").field("what", what).finish(),
            Error::UnknownField { name } => fmt
                .debug_struct("UnknownField")
                .field("name", name)
                .finish(),
            Error::InvalidArgument { what } => fmt
                .debug_struct("InvalidArgument")
                .field("what", what)
                .finish(),
        }
    }
}

impl std::error::Error for Error {}

impl From<skewgen::Error> for Error {
    fn from(err: skewgen::Error) -> Self {
        Error::configuration(err.to_string())
    }
}

////////////////////////////////////////////// Status //////////////////////////////////////////////

/// The recoverable outcome of an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    NotFound,
}

/////////////////////////////////////////////// Field //////////////////////////////////////////////

/// One named attribute of a row.  Values are arbitrary bytes.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Field {
    name: String,
    value: Vec<u8>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}

impl Display for Field {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{}=\"{}\"", self.name, escape(&self.value))
    }
}

/// Render bytes printable.
pub fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

/// A record's fields, excluding its key.  Order is significant on the wire.
pub type Row = Vec<Field>;

////////////////////////////////////////// StorageAdapter //////////////////////////////////////////

/// The operation set every engine is driven through.
///
/// Each client thread owns one adapter.  `init` must be called before any operation and `cleanup`
/// once at the end; adapters that share an engine open it on the first `init` and close it on the
/// last `cleanup`.  Fields are selected by `fields`:  `None` means every field.
pub trait StorageAdapter: Send {
    fn init(&mut self) -> Result<(), Error>;
    fn cleanup(&mut self) -> Result<(), Error>;

    /// Read one row.  `Ok(None)` when `key` is absent.
    fn read(&mut self, key: &[u8], fields: Option<&[String]>) -> Result<Option<Row>, Error>;
    /// Read up to `count` rows in key order starting at `start`.
    fn scan(
        &mut self,
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error>;
    /// Overwrite the named fields of an existing row.
    fn update(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error>;
    /// Write a whole row.
    fn insert(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error>;
    fn delete(&mut self, key: &[u8]) -> Result<Status, Error>;
    /// Return every row whose designated fields fall within `[low, high]`, inclusive.
    fn filter(
        &mut self,
        low: &[Field],
        high: &[Field],
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error>;
}

impl<A: StorageAdapter + ?Sized> StorageAdapter for Box<A> {
    fn init(&mut self) -> Result<(), Error> {
        A::init(self)
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        A::cleanup(self)
    }

    fn read(&mut self, key: &[u8], fields: Option<&[String]>) -> Result<Option<Row>, Error> {
        A::read(self, key, fields)
    }

    fn scan(
        &mut self,
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        A::scan(self, start, count, fields)
    }

    fn update(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        A::update(self, key, fields)
    }

    fn insert(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        A::insert(self, key, fields)
    }

    fn delete(&mut self, key: &[u8]) -> Result<Status, Error> {
        A::delete(self, key)
    }

    fn filter(
        &mut self,
        low: &[Field],
        high: &[Field],
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        A::filter(self, low, high, fields)
    }
}

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

pub fn register_biometrics(collector: &Collector) {
    adapter::register_biometrics(collector);
    codec::register_biometrics(collector);
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
