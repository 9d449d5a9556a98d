//! String-keyed configuration shared by every adapter in a process.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use super::Error;

///////////////////////////////////////////// Properties ///////////////////////////////////////////

/// A property-name to string-value mapping.  Interpretation of values is left to the reader.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Load properties from a file of `key=value` lines.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::configuration(format!("could not read {}: {}", path.display(), err))
        })?;
        Self::parse(&text)
    }

    /// Parse properties from `key=value` lines.  Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut props = Self::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => props.set(key.trim(), value.trim()),
                None => {
                    return Err(Error::configuration(format!(
                        "line {} is not of the form key=value: {:?}",
                        number + 1,
                        line
                    )));
                }
            }
        }
        Ok(props)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Parse `key` as a `T`, returning `default` when absent.  A present value that does not
    /// parse is a configuration error.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error> {
        match self.get(key) {
            Some(value) => value.parse::<T>().map_err(|_| {
                Error::configuration(format!(
                    "{}={:?} is not a valid {}",
                    key,
                    value,
                    std::any::type_name::<T>()
                ))
            }),
            None => Ok(default),
        }
    }

    /// Interpret `key` as a boolean.  Accepts true/false, yes/no, on/off, and 1/0.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, Error> {
        match self.get(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(Error::configuration(format!(
                    "{}={:?} is not a boolean",
                    key, value
                ))),
            },
            None => Ok(default),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::default();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_trims() {
        let props = Properties::parse(
            "# engine\n\n  rocksdb.dbname = /tmp/db  \nfieldcount=4\nempty=\nurl=a=b\n",
        )
        .unwrap();
        assert_eq!(Some("/tmp/db"), props.get("rocksdb.dbname"));
        assert_eq!(Some("4"), props.get("fieldcount"));
        assert_eq!(Some(""), props.get("empty"));
        assert_eq!(Some("a=b"), props.get("url"));
        assert_eq!(4, props.len());
    }

    #[test]
    fn parse_rejects_lines_without_equals() {
        let err = Properties::parse("a=1\nnonsense\n").unwrap_err();
        match err {
            Error::Configuration { what } => assert!(what.contains("line 2"), "{}", what),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn typed_access() {
        let props: Properties = [("n", "42"), ("b", "Yes"), ("bad", "x")]
            .into_iter()
            .collect();
        assert_eq!(42u64, props.parse_or("n", 7).unwrap());
        assert_eq!(7u64, props.parse_or("missing", 7).unwrap());
        assert!(props.parse_or::<u64>("bad", 7).is_err());
        assert!(props.bool_or("b", false).unwrap());
        assert!(!props.bool_or("missing", false).unwrap());
        assert!(props.bool_or("bad", false).is_err());
        assert_eq!("dflt", props.get_or("missing", "dflt"));
    }

    #[test]
    fn load_missing_file() {
        let err = Properties::load("/nonexistent/ycsbint/properties").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
