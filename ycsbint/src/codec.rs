//! Row encodings.
//!
//! The schemaless format concatenates `[u32 LE name_len][name][u32 LE value_len][value]` for
//! every field, in order, with no header or footer.  A buffer must be exhausted exactly by
//! decoding.
//!
//! The columnar format stores `field_count + 1` slots:  slot 0 is the key and slot `i + 1` holds
//! the field whose name is the prefix followed by `i`.

use biometrics::{Collector, Counter};
use buffertk::{length_free, stack_pack, Unpacker};

use super::{Error, Field, Row};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ENCODE: Counter = Counter::new("ycsbint.codec.encode");
static DECODE: Counter = Counter::new("ycsbint.codec.decode");
static DECODE_FILTERED: Counter = Counter::new("ycsbint.codec.decode_filtered");
static CORRUPT: Counter = Counter::new("ycsbint.codec.corrupt");
static MERGE: Counter = Counter::new("ycsbint.codec.merge");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&ENCODE);
    collector.register_counter(&DECODE);
    collector.register_counter(&DECODE_FILTERED);
    collector.register_counter(&CORRUPT);
    collector.register_counter(&MERGE);
}

///////////////////////////////////////////// RowReader ////////////////////////////////////////////

/// RowReader walks a schemaless buffer start to finish, checking bounds on every read.
#[derive(Clone)]
pub struct RowReader<'a> {
    buf: &'a [u8],
    up: Unpacker<'a>,
}

impl<'a> RowReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            up: Unpacker::new(buf),
        }
    }

    /// True iff every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// The number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.buf.len() - self.remaining()
    }

    /// The number of bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.up.remain().len()
    }

    /// Consume exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let remain = self.up.remain();
        if len > remain.len() {
            return Err(self.corrupt(buffertk::Error::BufferTooShort {
                required: len,
                had: remain.len(),
            }));
        }
        self.up.advance(len);
        Ok(&remain[..len])
    }

    /// Consume a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.up
            .unpack::<buffertk::Error, u32>()
            .map_err(|err| self.corrupt(err))
    }

    /// Consume one length-prefixed name and one length-prefixed value.
    pub fn read_field(&mut self) -> Result<(&'a [u8], &'a [u8]), Error> {
        let name_len = self.read_u32()? as usize;
        let name = self.read_bytes(name_len)?;
        let value_len = self.read_u32()? as usize;
        let value = self.read_bytes(value_len)?;
        Ok((name, value))
    }

    fn corrupt(&self, err: buffertk::Error) -> Error {
        CORRUPT.click();
        Error::corrupt(format!(
            "{} at offset {} of a {} byte row",
            err,
            self.offset(),
            self.buf.len()
        ))
    }
}

impl std::fmt::Debug for RowReader<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RowReader")
            .field("offset", &self.offset())
            .field("remaining", &self.remaining())
            .finish()
    }
}

fn field_name(name: &[u8], offset: usize) -> Result<String, Error> {
    String::from_utf8(name.to_vec()).map_err(|_| {
        CORRUPT.click();
        Error::corrupt(format!("field name ending at offset {} is not utf-8", offset))
    })
}

////////////////////////////////////////////// encode //////////////////////////////////////////////

fn length_prefix(what: &str, len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| Error::InvalidArgument {
        what: format!("{} of {} bytes does not fit a u32 length", what, len),
    })
}

/// Append the schemaless encoding of `fields` to `out`.
pub fn encode_row_into(fields: &[Field], out: &mut Vec<u8>) -> Result<(), Error> {
    ENCODE.click();
    for field in fields {
        let name_len = length_prefix("field name", field.name.len())?;
        let value_len = length_prefix("field value", field.value.len())?;
        stack_pack(name_len)
            .pack(length_free(field.name.as_bytes()))
            .pack(value_len)
            .pack(length_free(&field.value))
            .append_to_vec(out);
    }
    Ok(())
}

/// Encode `fields` in the schemaless format.
pub fn encode_row(fields: &[Field]) -> Result<Vec<u8>, Error> {
    let sz = fields
        .iter()
        .map(|f| 8 + f.name.len() + f.value.len())
        .sum();
    let mut out = Vec::with_capacity(sz);
    encode_row_into(fields, &mut out)?;
    Ok(out)
}

////////////////////////////////////////////// decode //////////////////////////////////////////////

/// Decode every field of a schemaless buffer.
pub fn decode_row(buf: &[u8]) -> Result<Row, Error> {
    DECODE.click();
    let mut reader = RowReader::new(buf);
    let mut row = Row::new();
    while !reader.is_empty() {
        let (name, value) = reader.read_field()?;
        row.push(Field {
            name: field_name(name, reader.offset())?,
            value: value.to_vec(),
        });
    }
    Ok(row)
}

/// Decode only the fields named in `fields`.
///
/// Matching is a single forward pass:  `fields` must list names in the order they appear in the
/// buffer.  A name requested out of order is never matched and is absent from the result.
/// Decoding stops as soon as every requested field has been found.
pub fn decode_row_filtered(buf: &[u8], fields: &[String]) -> Result<Row, Error> {
    DECODE_FILTERED.click();
    let mut reader = RowReader::new(buf);
    let mut wanted = fields.iter().peekable();
    let mut row = Row::with_capacity(fields.len());
    while !reader.is_empty() {
        let next = match wanted.peek() {
            Some(next) => next,
            None => break,
        };
        let (name, value) = reader.read_field()?;
        if name == next.as_bytes() {
            row.push(Field {
                name: field_name(name, reader.offset())?,
                value: value.to_vec(),
            });
            wanted.next();
        }
    }
    Ok(row)
}

/////////////////////////////////////////// update/merge ///////////////////////////////////////////

/// Overwrite fields of `current` by name.  Every name in `updates` must already be present.
pub fn overlay_fields(current: &mut Row, updates: &[Field]) -> Result<(), Error> {
    for update in updates {
        match current.iter_mut().find(|f| f.name == update.name) {
            Some(field) => field.value.clone_from(&update.value),
            None => {
                return Err(Error::UnknownField {
                    name: update.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Overwrite fields of `current` by name, appending names that are not present.
pub fn merge_fields(current: &mut Row, updates: &[Field]) {
    for update in updates {
        match current.iter_mut().find(|f| f.name == update.name) {
            Some(field) => field.value.clone_from(&update.value),
            None => current.push(update.clone()),
        }
    }
}

/// Apply a schemaless merge operand to an optional existing schemaless row.
pub fn merge_rows(existing: Option<&[u8]>, operand: &[u8]) -> Result<Vec<u8>, Error> {
    MERGE.click();
    let updates = decode_row(operand)?;
    let mut current = match existing {
        Some(existing) => decode_row(existing)?,
        None => Row::new(),
    };
    merge_fields(&mut current, &updates);
    encode_row(&current)
}

/////////////////////////////////////////// ColumnLayout ///////////////////////////////////////////

/// ColumnLayout maps field names to fixed slots.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnLayout {
    prefix: String,
    field_count: usize,
}

impl ColumnLayout {
    pub fn new(prefix: impl Into<String>, field_count: usize) -> Self {
        Self {
            prefix: prefix.into(),
            field_count,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// The number of slots in an encoded row, including the key.
    pub fn slots(&self) -> usize {
        self.field_count + 1
    }

    /// The name of the field with logical index `index`.
    pub fn field_name(&self, index: usize) -> String {
        format!("{}{}", self.prefix, index)
    }

    /// The slot that holds `name`.
    pub fn slot_of(&self, name: &str) -> Result<usize, Error> {
        let unknown = || Error::UnknownField {
            name: name.to_string(),
        };
        let suffix = name.strip_prefix(self.prefix.as_str()).ok_or_else(unknown)?;
        if suffix.is_empty()
            || !suffix.bytes().all(|b| b.is_ascii_digit())
            || (suffix.len() > 1 && suffix.starts_with('0'))
        {
            return Err(unknown());
        }
        let index: usize = suffix.parse().map_err(|_| unknown())?;
        if index >= self.field_count {
            return Err(unknown());
        }
        Ok(index + 1)
    }

    /// Lay out `key` and `fields` in slots.  Slots of fields not supplied are empty.
    pub fn encode(&self, key: &[u8], fields: &[Field]) -> Result<Vec<Vec<u8>>, Error> {
        ENCODE.click();
        let mut slots = vec![Vec::new(); self.slots()];
        slots[0] = key.to_vec();
        self.overlay(&mut slots, fields)?;
        Ok(slots)
    }

    /// Overwrite the slots of `fields`.
    pub fn overlay(&self, slots: &mut [Vec<u8>], fields: &[Field]) -> Result<(), Error> {
        self.check(slots)?;
        for field in fields {
            let slot = self.slot_of(&field.name)?;
            slots[slot].clone_from(&field.value);
        }
        Ok(())
    }

    /// Decode every field slot.
    pub fn decode(&self, slots: &[Vec<u8>]) -> Result<Row, Error> {
        DECODE.click();
        self.check(slots)?;
        Ok(slots[1..]
            .iter()
            .enumerate()
            .map(|(idx, value)| Field {
                name: self.field_name(idx),
                value: value.clone(),
            })
            .collect())
    }

    /// Decode the named fields, in the order requested.
    pub fn decode_filtered(&self, slots: &[Vec<u8>], fields: &[String]) -> Result<Row, Error> {
        DECODE_FILTERED.click();
        self.check(slots)?;
        fields
            .iter()
            .map(|name| {
                let slot = self.slot_of(name)?;
                Ok(Field {
                    name: name.clone(),
                    value: slots[slot].clone(),
                })
            })
            .collect()
    }

    /// The value of `name` in `slots`.
    pub fn value<'a>(&self, slots: &'a [Vec<u8>], name: &str) -> Result<&'a [u8], Error> {
        self.check(slots)?;
        Ok(&slots[self.slot_of(name)?])
    }

    fn check(&self, slots: &[Vec<u8>]) -> Result<(), Error> {
        if slots.len() != self.slots() {
            CORRUPT.click();
            return Err(Error::corrupt(format!(
                "expected {} slots, found {}",
                self.slots(),
                slots.len()
            )));
        }
        Ok(())
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &[u8])]) -> Row {
        pairs.iter().map(|(n, v)| Field::new(*n, *v)).collect()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wire_layout() {
        let buf = encode_row(&row(&[("ab", b"xyz")])).unwrap();
        assert_eq!(
            vec![2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0, b'x', b'y', b'z'],
            buf
        );
    }

    #[test]
    fn round_trip_preserves_order() {
        let r = row(&[
            ("field9", b"nine"),
            ("field0", b""),
            ("", b"\x00\x01\xff"),
            ("field3", b"three"),
        ]);
        assert_eq!(r, decode_row(&encode_row(&r).unwrap()).unwrap());
        assert_eq!(Row::new(), decode_row(&[]).unwrap());
    }

    #[test]
    fn filtered_subset() {
        let r = row(&[("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")]);
        let buf = encode_row(&r).unwrap();
        assert_eq!(
            row(&[("b", b"2"), ("d", b"4")]),
            decode_row_filtered(&buf, &names(&["b", "d"])).unwrap()
        );
        assert_eq!(Row::new(), decode_row_filtered(&buf, &[]).unwrap());
    }

    #[test]
    fn filtered_out_of_order_drops_fields() {
        let r = row(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let buf = encode_row(&r).unwrap();
        // "a" is skipped while looking for "c" and is never revisited.
        assert_eq!(
            row(&[("c", b"3")]),
            decode_row_filtered(&buf, &names(&["c", "a"])).unwrap()
        );
    }

    #[test]
    fn filtered_stops_after_last_match() {
        let mut buf = encode_row(&row(&[("a", b"1")])).unwrap();
        // garbage after the last requested field is never read
        buf.extend_from_slice(&[0xff, 0xff]);
        assert_eq!(
            row(&[("a", b"1")]),
            decode_row_filtered(&buf, &names(&["a"])).unwrap()
        );
        assert!(decode_row(&buf).is_err());
    }

    #[test]
    fn truncated_is_corrupt() {
        let buf = encode_row(&row(&[("name", b"value"), ("other", b"x")])).unwrap();
        // 17 ends the first field and decodes it alone
        for cut in (1..buf.len()).filter(|cut| *cut != 17) {
            let err = decode_row(&buf[..cut]).unwrap_err();
            assert!(matches!(err, Error::CorruptRow { .. }), "cut={}", cut);
        }
        // truncated mid value-length
        let cut = 4 + 4 + 2;
        assert!(matches!(
            decode_row(&buf[..cut]),
            Err(Error::CorruptRow { .. })
        ));
    }

    #[test]
    fn oversized_length_is_corrupt() {
        let mut buf = vec![];
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        buf.extend_from_slice(b"abc");
        assert!(matches!(decode_row(&buf), Err(Error::CorruptRow { .. })));
    }

    #[test]
    fn non_utf8_name_is_corrupt() {
        let mut buf = vec![];
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&[0xc3, 0x28]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(decode_row(&buf), Err(Error::CorruptRow { .. })));
    }

    #[test]
    fn reader_tracks_offset() {
        let mut reader = RowReader::new(&[1, 0, 0, 0, 9, 8]);
        assert_eq!(1, reader.read_u32().unwrap());
        assert_eq!(4, reader.offset());
        assert_eq!(&[9u8][..], reader.read_bytes(1).unwrap());
        assert_eq!(1, reader.remaining());
        assert!(reader.read_bytes(2).is_err());
        assert_eq!(5, reader.offset());
    }

    #[test]
    fn short_length_prefix_is_corrupt() {
        let mut reader = RowReader::new(&[7, 0, 0]);
        match reader.read_u32() {
            Err(Error::CorruptRow { context }) => {
                assert!(context.contains("BufferTooShort"), "{}", context);
            }
            other => panic!("expected CorruptRow, got {:?}", other),
        }
        assert_eq!(0, reader.offset());
        assert_eq!(3, reader.remaining());
    }

    #[test]
    fn encoding_appends_to_existing_buffer() {
        let mut out = vec![0xee];
        encode_row_into(&row(&[("", b""), ("k", b"\xff")]), &mut out).unwrap();
        assert_eq!(
            vec![0xee, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, b'k', 1, 0, 0, 0, 0xff],
            out
        );
        assert_eq!(row(&[("", b""), ("k", b"\xff")]), decode_row(&out[1..]).unwrap());
    }

    #[test]
    fn overlay_and_merge() {
        let mut current = row(&[("a", b"1"), ("b", b"2")]);
        overlay_fields(&mut current, &row(&[("b", b"two")])).unwrap();
        assert_eq!(row(&[("a", b"1"), ("b", b"two")]), current);
        assert_eq!(
            Err(Error::UnknownField {
                name: "z".to_string()
            }),
            overlay_fields(&mut current, &row(&[("z", b"26")]))
        );
        merge_fields(&mut current, &row(&[("z", b"26"), ("a", b"one")]));
        assert_eq!(row(&[("a", b"one"), ("b", b"two"), ("z", b"26")]), current);
    }

    #[test]
    fn merge_rows_matches_full_put() {
        let full = row(&[("a", b"1"), ("b", b"2")]);
        let old = encode_row(&row(&[("a", b"x"), ("b", b"y")])).unwrap();
        let put = encode_row(&full).unwrap();
        assert_eq!(put, merge_rows(Some(&old), &put).unwrap());
        assert_eq!(put, merge_rows(None, &put).unwrap());
    }

    #[test]
    fn columnar_round_trip() {
        let layout = ColumnLayout::new("field", 3);
        let fields = row(&[("field2", b"c"), ("field0", b"a"), ("field1", b"b")]);
        let slots = layout.encode(b"key", &fields).unwrap();
        assert_eq!(4, slots.len());
        assert_eq!(b"key".to_vec(), slots[0]);
        assert_eq!(b"a".to_vec(), slots[1]);
        assert_eq!(
            row(&[("field0", b"a"), ("field1", b"b"), ("field2", b"c")]),
            layout.decode(&slots).unwrap()
        );
        assert_eq!(
            row(&[("field2", b"c"), ("field0", b"a")]),
            layout
                .decode_filtered(&slots, &names(&["field2", "field0"]))
                .unwrap()
        );
    }

    #[test]
    fn columnar_slots() {
        let layout = ColumnLayout::new("field", 10);
        assert_eq!(4, layout.slot_of("field3").unwrap());
        assert_eq!(10, layout.slot_of("field9").unwrap());
        for bad in ["field10", "field", "field03", "field+3", "other3", "field-1"] {
            assert!(
                matches!(layout.slot_of(bad), Err(Error::UnknownField { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn columnar_slot_count_checked() {
        let layout = ColumnLayout::new("field", 2);
        assert!(matches!(
            layout.decode(&[vec![], vec![]]),
            Err(Error::CorruptRow { .. })
        ));
    }
}
