//! Tests for translation of foreign failures into `tether::Error`.

mod common;

use common::run;
use pretty_assertions::assert_eq;
use tether::Error;

#[test]
fn division_by_zero_is_foreign_exception_with_traceback() {
    let (err, traceback_type, exception_type) = run(|cx| {
        let err = cx.execute("result = 1 / 0", Some("result")).unwrap_err();
        let traceback_type = err.traceback().map(|traceback| traceback.type_name(cx).to_owned());
        let exception_type = match &err {
            Error::ForeignException { exception, .. } => Some(exception.type_name(cx).to_owned()),
            _ => None,
        };
        (err, traceback_type, exception_type)
    });
    assert!(matches!(err, Error::ForeignException { .. }), "got {err:?}");
    assert_eq!(traceback_type.as_deref(), Some("traceback"));
    assert_eq!(exception_type.as_deref(), Some("ZeroDivisionError"));

    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.summary(), "ZeroDivisionError: division by zero");
    let rendered = err.render();
    assert!(rendered.starts_with("Traceback (most recent call last):"), "{rendered}");
    assert!(rendered.contains("File \"test.py\", line 1"), "{rendered}");
    assert!(rendered.ends_with("ZeroDivisionError: division by zero"), "{rendered}");
}

#[test]
fn syntax_error_is_run_error() {
    let err = run(|cx| cx.execute("def broken(:\n    pass\n", None).unwrap_err());
    let Error::RunError { diagnostic, .. } = &err else {
        panic!("expected RunError, got {err:?}");
    };
    assert_eq!(diagnostic.type_name, "SyntaxError");
    assert!(err.to_string().starts_with("run failed: SyntaxError"));
}

#[test]
fn eval_syntax_error_is_run_error() {
    let err = run(|cx| cx.eval("1 +").unwrap_err());
    assert_eq!(err.kind_name(), "run_error");
}

#[test]
fn undefined_name_is_foreign_exception() {
    let err = run(|cx| cx.execute("print(never_defined)", None).unwrap_err());
    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.type_name, "NameError");
    assert!(diagnostic.message.contains("never_defined"));
}

#[test]
fn exception_raised_inside_callee_keeps_its_frames() {
    let err = run(|cx| {
        cx.execute(
            "class Overheated(RuntimeError):\n    pass\n\ndef boil():\n    raise Overheated('too hot')\n",
            None,
        )
        .unwrap();
        cx.eval("boil").unwrap().call(cx, &[], &[]).unwrap_err()
    });
    let Error::ForeignException { diagnostic, .. } = &err else {
        panic!("expected ForeignException, got {err:?}");
    };
    assert_eq!(diagnostic.summary(), "Overheated: too hot");
    let traceback = diagnostic.traceback.as_deref().unwrap();
    assert!(traceback.contains("in boil"), "{traceback}");
}

#[test]
fn exception_handle_carries_foreign_payload() {
    let args = run(|cx| {
        let err = cx.execute("raise ValueError('bad', 7)", None).unwrap_err();
        let Error::ForeignException { exception, .. } = &err else {
            panic!("expected ForeignException, got {err:?}");
        };
        exception.member(cx, "args").unwrap().extract::<(String, i64)>(cx)
    });
    assert_eq!(args, Some(("bad".to_owned(), 7)));
}

#[test]
fn iterating_non_iterable_is_invalid_call() {
    let err = run(|cx| cx.eval("42").unwrap().iterate(cx).unwrap_err());
    let Error::InvalidCall { reason, .. } = &err else {
        panic!("expected InvalidCall, got {err:?}");
    };
    assert!(reason.contains("not iterable"), "{reason}");
    assert!(err.diagnostic().is_none());
}

#[test]
fn failure_in_length_propagates() {
    let err = run(|cx| {
        cx.execute("class Broken:\n    def __len__(self):\n        raise OSError('disk')\n", None)
            .unwrap();
        cx.eval("Broken()").unwrap().length(cx).unwrap_err()
    });
    assert_eq!(err.diagnostic().map(|d| d.type_name.as_str()), Some("OSError"));
}

#[test]
fn key_error_raised_by_code_is_not_an_index_error() {
    // only subscripts map lookup failures to IndexError
    let err = run(|cx| cx.execute("{}['k']", None).unwrap_err());
    assert_eq!(err.kind_name(), "foreign_exception");
    assert_eq!(err.diagnostic().unwrap().type_name, "KeyError");
}

#[test]
fn display_is_one_line_summary() {
    let err = run(|cx| cx.execute("raise KeyError('x')", None).unwrap_err());
    assert_eq!(err.to_string(), "KeyError: 'x'");
}
