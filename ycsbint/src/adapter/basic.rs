use crate::{escape, Error, Field, Row, Status, StorageAdapter};

/////////////////////////////////////////// BasicAdapter ///////////////////////////////////////////

/// An adapter that logs every operation and stores nothing.  Useful for measuring the overhead
/// of the harness itself.
#[derive(Debug, Default)]
pub struct BasicAdapter {
    initialized: bool,
}

impl BasicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, op: &str) -> Result<(), Error> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "basic adapter {} outside init/cleanup",
                op
            )))
        }
    }
}

fn field_list(fields: Option<&[String]>) -> String {
    match fields {
        Some(fields) => format!("[{}]", fields.join(" ")),
        None => "<all fields>".to_string(),
    }
}

fn values(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl StorageAdapter for BasicAdapter {
    fn init(&mut self) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::configuration("basic adapter initialized twice"));
        }
        self.initialized = true;
        log::info!("basic init");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::configuration(
                "basic adapter cleaned up without init",
            ));
        }
        self.initialized = false;
        log::info!("basic cleanup");
        Ok(())
    }

    fn read(&mut self, key: &[u8], fields: Option<&[String]>) -> Result<Option<Row>, Error> {
        self.check("read")?;
        log::info!("READ {} {}", escape(key), field_list(fields));
        Ok(None)
    }

    fn scan(
        &mut self,
        start: &[u8],
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        self.check("scan")?;
        log::info!("SCAN {} {} {}", escape(start), count, field_list(fields));
        Ok(vec![])
    }

    fn update(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        self.check("update")?;
        log::info!("UPDATE {} [ {} ]", escape(key), values(fields));
        Ok(Status::Ok)
    }

    fn insert(&mut self, key: &[u8], fields: &[Field]) -> Result<Status, Error> {
        self.check("insert")?;
        log::info!("INSERT {} [ {} ]", escape(key), values(fields));
        Ok(Status::Ok)
    }

    fn delete(&mut self, key: &[u8]) -> Result<Status, Error> {
        self.check("delete")?;
        log::info!("DELETE {}", escape(key));
        Ok(Status::Ok)
    }

    fn filter(
        &mut self,
        low: &[Field],
        high: &[Field],
        fields: Option<&[String]>,
    ) -> Result<Vec<Row>, Error> {
        self.check("filter")?;
        log::info!(
            "FILTER [ {} ] [ {} ] {}",
            values(low),
            values(high),
            field_list(fields)
        );
        Ok(vec![])
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_enforced() {
        let mut basic = BasicAdapter::new();
        assert!(basic.read(b"k", None).is_err());
        assert!(basic.cleanup().is_err());
        basic.init().unwrap();
        assert!(basic.init().is_err());
        assert_eq!(None, basic.read(b"k", None).unwrap());
        assert_eq!(
            Status::Ok,
            basic.insert(b"k", &[Field::new("field0", "v")]).unwrap()
        );
        assert!(basic.scan(b"k", 10, None).unwrap().is_empty());
        basic.cleanup().unwrap();
        assert!(basic.delete(b"k").is_err());
    }
}
