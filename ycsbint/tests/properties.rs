use proptest::prelude::*;

use ycsbint::codec::{decode_row, decode_row_filtered, encode_row};
use ycsbint::{ColumnLayout, Error, Field, Row};

fn arb_row() -> impl Strategy<Value = Row> {
    proptest::collection::vec(
        ("[a-z]{1,8}", proptest::collection::vec(any::<u8>(), 0..32)),
        0..12,
    )
    .prop_map(|fields| {
        fields
            .into_iter()
            .map(|(name, value)| Field::new(name, value))
            .collect()
    })
}

proptest! {
    #[test]
    fn schemaless_round_trip(row in arb_row()) {
        let buf = encode_row(&row).unwrap();
        prop_assert_eq!(row, decode_row(&buf).unwrap());
    }

    #[test]
    fn filtered_is_a_subsequence(row in arb_row(), mask: u16) {
        // distinct names so a subsequence of names picks out exactly one field each
        let mut seen = std::collections::BTreeSet::new();
        let row: Row = row.into_iter().filter(|f| seen.insert(f.name().to_string())).collect();
        let wanted: Row = row
            .iter()
            .enumerate()
            .filter(|(idx, _)| mask & (1 << idx) != 0)
            .map(|(_, f)| f.clone())
            .collect();
        let names: Vec<String> = wanted.iter().map(|f| f.name().to_string()).collect();
        let buf = encode_row(&row).unwrap();
        prop_assert_eq!(wanted, decode_row_filtered(&buf, &names).unwrap());
    }

    #[test]
    fn truncation_is_corruption(row in arb_row(), cut: usize) {
        let buf = encode_row(&row).unwrap();
        prop_assume!(!buf.is_empty());
        let cut = cut % buf.len();
        // a cut on a field boundary decodes a strict prefix; anywhere else is corrupt
        match decode_row(&buf[..cut]) {
            Ok(prefix) => {
                prop_assert!(prefix.len() < row.len());
                prop_assert!(row.starts_with(&prefix));
            }
            Err(Error::CorruptRow { .. }) => {}
            Err(err) => prop_assert!(false, "unexpected error {}", err),
        }
    }

    #[test]
    fn columnar_round_trip(values in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..16)) {
        let layout = ColumnLayout::new("field", values.len());
        let row: Row = values
            .iter()
            .enumerate()
            .map(|(idx, v)| Field::new(layout.field_name(idx), v.clone()))
            .collect();
        let slots = layout.encode(b"key", &row).unwrap();
        prop_assert_eq!(values.len() + 1, slots.len());
        prop_assert_eq!(b"key".to_vec(), slots[0].clone());
        prop_assert_eq!(row, layout.decode(&slots).unwrap());
    }
}
