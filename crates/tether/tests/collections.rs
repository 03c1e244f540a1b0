//! Tests for collection views, lengths, mappings and sequences.

mod common;

use common::run;
use pretty_assertions::assert_eq;
use tether::{Error, ForeignMapping, ForeignSequence, ViewState};

// === CollectionView ===

#[test]
fn five_elements_then_exhausted() {
    let (values, trailing) = run(|cx| {
        let sequence = cx.eval("[10, 20, 30, 40, 50]").unwrap();
        let mut view = sequence.iterate(cx).unwrap();
        let mut values = Vec::new();
        for _ in 0..5 {
            assert_eq!(view.state(), ViewState::Active);
            let element = view.advance(cx).unwrap().expect("element before end");
            values.push(element.extract::<i64>(cx).unwrap());
        }
        let trailing = view.advance(cx).unwrap().is_none();
        (values, trailing)
    });
    assert_eq!(values, vec![10, 20, 30, 40, 50]);
    assert!(trailing);
}

#[test]
fn exhausted_is_sticky() {
    run(|cx| {
        let mut view = cx.eval("iter(())").unwrap().iterate(cx).unwrap();
        assert!(!view.is_exhausted());
        for _ in 0..3 {
            assert!(view.advance(cx).unwrap().is_none());
            assert_eq!(view.state(), ViewState::Exhausted);
        }
    });
}

#[test]
fn exhaustion_releases_iterator() {
    run(|cx| {
        let iterator = cx.eval("iter([1])").unwrap();
        let baseline = iterator.retention_count(cx);
        let mut view = iterator.iterate(cx).unwrap();
        // iter() of an iterator is the iterator itself
        assert_eq!(iterator.retention_count(cx), baseline + 1);
        while view.advance(cx).unwrap().is_some() {}
        assert_eq!(iterator.retention_count(cx), baseline);
    });
}

#[test]
fn generator_error_propagates_without_exhausting() {
    let (err, state) = run(|cx| {
        cx.execute(
            "def flaky():\n    yield 1\n    raise RuntimeError('mid-stream')\n",
            None,
        )
        .unwrap();
        let mut view = cx.eval("flaky()").unwrap().iterate(cx).unwrap();
        assert_eq!(view.advance(cx).unwrap().unwrap().extract::<i64>(cx), Some(1));
        let err = view.advance(cx).unwrap_err();
        (err, view.state())
    });
    assert_eq!(err.diagnostic().unwrap().summary(), "RuntimeError: mid-stream");
    assert_eq!(state, ViewState::Active);
}

#[test]
fn cursor_collects_host_iterator() {
    let squares = run(|cx| {
        let mut view = cx.eval("(n * n for n in range(4))").unwrap().iterate(cx).unwrap();
        let squares = view
            .iter(cx)
            .map(|element| element.map(|element| element.extract::<i64>(cx).unwrap()))
            .collect::<tether::Result<Vec<_>>>()
            .unwrap();
        assert!(view.is_exhausted());
        squares
    });
    assert_eq!(squares, vec![0, 1, 4, 9]);
}

#[test]
fn iterating_a_dict_yields_keys() {
    let keys = run(|cx| {
        let mut view = cx.eval("{'x': 1, 'y': 2}").unwrap().iterate(cx).unwrap();
        let keys: Vec<String> = view
            .iter(cx)
            .map(|key| key.unwrap().extract::<String>(cx).unwrap())
            .collect();
        keys
    });
    assert_eq!(keys, vec!["x", "y"]);
}

// === Length ===

#[test]
fn length_when_supported() {
    run(|cx| {
        assert_eq!(cx.eval("[1, 2, 3]").unwrap().length(cx).unwrap(), Some(3));
        assert_eq!(cx.eval("'héllo'").unwrap().length(cx).unwrap(), Some(5));
        assert_eq!(cx.eval("{}").unwrap().length(cx).unwrap(), Some(0));
    });
}

#[test]
fn length_absent_is_none() {
    run(|cx| {
        assert_eq!(cx.eval("42").unwrap().length(cx).unwrap(), None);
        assert_eq!(cx.eval("iter([1, 2])").unwrap().length(cx).unwrap(), None);
        assert_eq!(cx.eval("(x for x in [])").unwrap().length(cx).unwrap(), None);
    });
}

// === ForeignMapping ===

#[test]
fn mapping_get_set_remove() {
    run(|cx| {
        let mapping = ForeignMapping::empty(cx);
        assert!(mapping.is_empty(cx).unwrap());

        mapping.set(cx, "alpha", &1_i64).unwrap();
        mapping.set(cx, "beta", &2_i64).unwrap();
        assert_eq!(mapping.len(cx).unwrap(), 2);
        assert!(mapping.contains_key(cx, "alpha").unwrap());
        assert_eq!(mapping.get(cx, "beta").unwrap().extract::<i64>(cx), Some(2));

        let keys: Vec<String> = mapping
            .keys(cx)
            .unwrap()
            .iter()
            .map(|key| key.extract::<String>(cx).unwrap())
            .collect();
        assert_eq!(keys, vec!["alpha", "beta"]);

        mapping.remove(cx, "alpha").unwrap();
        assert!(!mapping.contains_key(cx, "alpha").unwrap());
    });
}

#[test]
fn mapping_absent_key_is_index_error() {
    let (get_err, remove_err) = run(|cx| {
        let mapping = ForeignMapping::new(cx.eval("{'present': True}").unwrap());
        (mapping.get(cx, "absent").unwrap_err(), mapping.remove(cx, "absent").unwrap_err())
    });
    let Error::IndexError { key, diagnostic, .. } = get_err else {
        panic!("expected IndexError, got {get_err:?}");
    };
    assert_eq!(key, "'absent'");
    assert_eq!(diagnostic.type_name, "KeyError");
    assert!(matches!(remove_err, Error::IndexError { .. }), "got {remove_err:?}");
}

#[test]
fn mapping_over_default_dict_does_not_insert() {
    let len = run(|cx| {
        let mapping = ForeignMapping::new(cx.eval("__import__('collections').defaultdict(int)").unwrap());
        assert!(mapping.get(cx, "ghost").is_err());
        mapping.len(cx).unwrap()
    });
    assert_eq!(len, 0);
}

// === ForeignSequence ===

#[test]
fn sequence_get_set_push() {
    let repr = run(|cx| {
        let sequence = ForeignSequence::new(cx.to_foreign(&vec![1_i64, 2, 3]).unwrap());
        assert_eq!(sequence.get(cx, 0).unwrap().extract::<i64>(cx), Some(1));
        assert_eq!(sequence.get(cx, -1).unwrap().extract::<i64>(cx), Some(3));

        sequence.set(cx, 1, "two").unwrap();
        sequence.push(cx, &4.5_f64).unwrap();
        assert_eq!(sequence.len(cx).unwrap(), 4);
        sequence.handle().repr(cx).unwrap()
    });
    assert_eq!(repr, "[1, 'two', 3, 4.5]");
}

#[test]
fn sequence_out_of_range_is_index_error() {
    let errors = run(|cx| {
        let sequence = ForeignSequence::new(cx.eval("(1, 2)").unwrap());
        vec![
            sequence.get(cx, 2).unwrap_err(),
            sequence.get(cx, -3).unwrap_err(),
            sequence.set(cx, 7, &0_i64).unwrap_err(),
        ]
    });
    let keys: Vec<String> = errors
        .iter()
        .map(|err| match err {
            Error::IndexError { key, .. } => key.clone(),
            other => panic!("expected IndexError, got {other:?}"),
        })
        .collect();
    assert_eq!(keys, vec!["2", "-3", "7"]);
}

#[test]
fn sequence_on_empty_list() {
    let err = run(|cx| {
        let sequence = ForeignSequence::new(cx.eval("[]").unwrap());
        assert!(sequence.is_empty(cx).unwrap());
        sequence.get(cx, 0).unwrap_err()
    });
    assert_eq!(err.diagnostic().unwrap().message, "index 0 out of range for length 0");
}
