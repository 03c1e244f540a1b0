//! Tests for host/foreign value conversion.

mod common;

use std::collections::{BTreeMap, HashMap};

use common::run;
use indexmap::IndexMap;
use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use tether::{Bytes, Context, FromForeign, ToForeign};

/// Converts `value` to a foreign value and reads it back as the same host type.
fn round_trip<T: ToForeign + FromForeign>(cx: &Context<'_>, value: &T) -> Option<T> {
    cx.to_foreign(value).unwrap().extract::<T>(cx)
}

// === Round trips ===

#[test]
fn scalars_round_trip() {
    run(|cx| {
        assert_eq!(round_trip(cx, &true), Some(true));
        assert_eq!(round_trip(cx, &i64::MIN), Some(i64::MIN));
        assert_eq!(round_trip(cx, &u64::MAX), Some(u64::MAX));
        assert_eq!(round_trip(cx, &-7_i8), Some(-7));
        assert_eq!(round_trip(cx, &1.5_f64), Some(1.5));
        assert_eq!(round_trip(cx, &0.25_f32), Some(0.25));
        assert_eq!(round_trip(cx, &'λ'), Some('λ'));
        assert_eq!(round_trip(cx, &"naïve".to_owned()), Some("naïve".to_owned()));
        assert_eq!(round_trip(cx, &()), Some(()));
    });
}

#[test]
fn big_integers_round_trip() {
    run(|cx| {
        let huge: BigInt = "123456789012345678901234567890".parse().unwrap();
        assert_eq!(round_trip(cx, &huge), Some(huge.clone()));
        assert_eq!(round_trip(cx, &-huge.clone()), Some(-huge));
    });
}

#[test]
fn composites_round_trip() {
    run(|cx| {
        let list = vec![vec![1_i64, 2], vec![], vec![3]];
        assert_eq!(round_trip(cx, &list), Some(list));

        let pair = ("x".to_owned(), 2.5_f64);
        assert_eq!(round_trip(cx, &pair), Some(pair));

        let triple = (1_u8, Some(2_i32), None::<bool>);
        assert_eq!(round_trip(cx, &triple), Some(triple));

        let map: HashMap<String, i64> = [("a".to_owned(), 1), ("b".to_owned(), 2)].into_iter().collect();
        assert_eq!(round_trip(cx, &map), Some(map));

        let sorted: BTreeMap<i64, String> = [(2, "two".to_owned()), (1, "one".to_owned())].into_iter().collect();
        assert_eq!(round_trip(cx, &sorted), Some(sorted));

        let bytes = Bytes(vec![0, 159, 255]);
        assert_eq!(round_trip(cx, &bytes), Some(bytes));

        assert_eq!(round_trip(cx, &(2_isize..9)), Some(2..9));
    });
}

#[test]
fn index_map_keeps_insertion_order() {
    run(|cx| {
        let mut ordered = IndexMap::new();
        ordered.insert("zeta".to_owned(), 1_i64);
        ordered.insert("alpha".to_owned(), 2);
        let dict = cx.to_foreign(&ordered).unwrap();
        assert_eq!(dict.repr(cx).unwrap(), "{'zeta': 1, 'alpha': 2}");
        let back = dict.extract::<IndexMap<String, i64>>(cx).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    });
}

// === Foreign shapes ===

#[test]
fn host_values_take_expected_foreign_types() {
    run(|cx| {
        let cases: [(&dyn ToForeign, &str); 8] = [
            (&true, "bool"),
            (&3_u16, "int"),
            (&3.0_f64, "float"),
            (&"s", "str"),
            (&Bytes(vec![1]), "bytes"),
            (&vec![1_i32], "list"),
            (&(1_i32, 2_i32), "tuple"),
            (&None::<i32>, "NoneType"),
        ];
        for (value, expected) in cases {
            assert_eq!(cx.to_foreign(value).unwrap().type_name(cx), expected);
        }
        let slice = cx.to_foreign(&(1_isize..4)).unwrap();
        assert_eq!(slice.repr(cx).unwrap(), "slice(1, 4, 1)");
    });
}

#[test]
fn sequences_accept_tuples_and_ranges_accept_slices() {
    run(|cx| {
        assert_eq!(cx.eval("(1, 2, 3)").unwrap().extract::<Vec<i64>>(cx), Some(vec![1, 2, 3]));
        assert_eq!(cx.eval("[4, 5]").unwrap().extract::<(i64, i64)>(cx), Some((4, 5)));
        assert_eq!(cx.eval("range(3, 7)").unwrap().extract::<std::ops::Range<isize>>(cx), Some(3..7));
        assert_eq!(cx.eval("slice(None, 5)").unwrap().extract::<std::ops::Range<isize>>(cx), Some(0..5));
        assert_eq!(cx.eval("bytearray(b'ab')").unwrap().extract::<Bytes>(cx), Some(Bytes(b"ab".to_vec())));
        assert_eq!(cx.eval("2").unwrap().extract::<f64>(cx), Some(2.0));
    });
}

// === Mismatches ===

#[test]
fn incompatible_types_give_none() {
    run(|cx| {
        let text = cx.eval("'42'").unwrap();
        assert_eq!(text.extract::<i64>(cx), None);
        assert_eq!(text.extract::<f64>(cx), None);
        assert_eq!(text.extract::<bool>(cx), None);

        let flag = cx.eval("True").unwrap();
        assert_eq!(flag.extract::<i64>(cx), None);
        assert_eq!(flag.extract::<BigInt>(cx), None);

        assert_eq!(cx.eval("1.5").unwrap().extract::<i64>(cx), None);
        assert_eq!(cx.eval("{'a': 1}").unwrap().extract::<Vec<i64>>(cx), None);
        assert_eq!(cx.eval("b'x'").unwrap().extract::<String>(cx), None);
        assert_eq!(cx.eval("'ab'").unwrap().extract::<char>(cx), None);
        assert_eq!(cx.eval("None").unwrap().extract::<i64>(cx), None);
    });
}

#[test]
fn out_of_range_values_give_none() {
    run(|cx| {
        assert_eq!(cx.eval("256").unwrap().extract::<u8>(cx), None);
        assert_eq!(cx.eval("-1").unwrap().extract::<u64>(cx), None);
        assert_eq!(cx.eval("2 ** 64").unwrap().extract::<i64>(cx), None);
        assert_eq!(cx.eval("2 ** 53 + 1").unwrap().extract::<f64>(cx), None);
        assert_eq!(cx.eval("10 ** 400").unwrap().extract::<f64>(cx), None);
        assert_eq!(cx.eval("1e300").unwrap().extract::<f32>(cx), None);
        assert_eq!(cx.eval("16777217").unwrap().extract::<f32>(cx), None);
        assert_eq!(cx.eval("slice(0, 10, 2)").unwrap().extract::<std::ops::Range<isize>>(cx), None);
    });
}

#[test]
fn exactly_representable_ints_become_floats() {
    run(|cx| {
        assert_eq!(cx.eval("2 ** 60").unwrap().extract::<f64>(cx), Some(2.0_f64.powi(60)));
        assert_eq!(cx.eval("-(2 ** 53)").unwrap().extract::<f64>(cx), Some(-(2.0_f64.powi(53))));
        assert_eq!(cx.eval("16777216").unwrap().extract::<f32>(cx), Some(16_777_216.0));
        assert_eq!(cx.eval("2 ** 100").unwrap().extract::<f32>(cx), Some(2.0_f32.powi(100)));
        // floats narrow to the nearest f32
        assert_eq!(cx.eval("0.1").unwrap().extract::<f32>(cx), Some(0.1));
    });
}

#[test]
fn composite_fails_as_a_whole() {
    run(|cx| {
        assert_eq!(cx.eval("[1, 'two', 3]").unwrap().extract::<Vec<i64>>(cx), None);
        assert_eq!(cx.eval("{'a': 1, 'b': None}").unwrap().extract::<HashMap<String, i64>>(cx), None);
        assert_eq!(
            cx.eval("{'a': 1, 'b': None}").unwrap().extract::<HashMap<String, Option<i64>>>(cx),
            Some([("a".to_owned(), Some(1)), ("b".to_owned(), None)].into_iter().collect())
        );
        assert_eq!(cx.eval("(1, 2, 3)").unwrap().extract::<(i64, i64)>(cx), None);
    });
}
