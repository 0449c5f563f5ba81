//! End-to-end properties of decoding and encoding.

use libyml::{
    decode_all, decode_one, decode_one_with, encode_all, encode_one, to_string, to_string_with, DecodeOptions,
    EncodeOptions, Error, FlowStyle, LineBreak, Value,
};

fn s(text: &str) -> Value {
    Value::from(text)
}

fn round_trip(value: &Value) -> Value {
    let text = to_string(value).unwrap();
    decode_one(&text).unwrap_or_else(|e| panic!("re-decode failed: {}\n{}", e, text))
}

#[test]
fn test_round_trip_builtin_types() {
    let timestamp = decode_one("2001-12-14 21:59:43.10 -5").unwrap();
    let big = decode_one("123456789012345678901234567890").unwrap();
    let value = Value::mapping(vec![
        (s("null"), Value::Null),
        (s("bools"), Value::sequence(vec![Value::Bool(true), Value::Bool(false)])),
        (s("ints"), Value::sequence(vec![Value::from(0), Value::from(-17), big])),
        (
            s("floats"),
            Value::sequence(vec![
                Value::from(1.5),
                Value::from(-0.25),
                Value::from(1e20),
                Value::from(f64::INFINITY),
            ]),
        ),
        (
            s("tricky strings"),
            Value::sequence(vec![
                s(""),
                s(" "),
                s("yes"),
                s("123"),
                s("1.5"),
                s("~"),
                s("null"),
                s("a: b"),
                s("- x"),
                s("#comment"),
                s("key, value"),
                s("'quoted'"),
                s("\"double\""),
                s("line\nbreak"),
                s("tab\tand\rreturn"),
                s("trailing newline\n"),
                s("2001-01-01"),
                s("<<"),
                s("="),
            ]),
        ),
        (s("binary"), Value::Binary(vec![0, 1, 2, 254, 255])),
        (s("timestamp"), timestamp),
        (Value::from(42), s("integer key")),
        (Value::Null, s("null key")),
    ]);
    assert_eq!(round_trip(&value), value);

    for layout in [FlowStyle::Block, FlowStyle::Flow] {
        let options = EncodeOptions::new().with_flow_style(layout);
        let text = to_string_with(&value, &options).unwrap();
        assert_eq!(decode_one(&text).unwrap(), value, "{:?}:\n{}", layout, text);
    }
    let canonical = to_string_with(&value, &EncodeOptions::new().with_canonical(true)).unwrap();
    assert_eq!(decode_one(&canonical).unwrap(), value, "{}", canonical);
}

#[test]
fn test_alias_preservation() {
    let shared = Value::mapping(vec![(s("k"), s("v"))]);
    let value = Value::mapping(vec![(s("first"), shared.clone()), (s("second"), shared)]);
    let text = to_string(&value).unwrap();
    assert!(text.contains("&id001") && text.contains("*id001"), "{}", text);

    let back = decode_one(&text).unwrap();
    let first = back.get("first").unwrap();
    let second = back.get("second").unwrap();
    assert!(first.ptr_eq(&second));

    // Equal but distinct containers stay distinct.
    let value = Value::sequence(vec![Value::sequence(vec![]), Value::sequence(vec![])]);
    let text = to_string(&value).unwrap();
    assert!(!text.contains('&'), "{}", text);
    let back = decode_one(&text).unwrap();
    assert!(!back.get_index(0).unwrap().ptr_eq(&back.get_index(1).unwrap()));
}

#[test]
fn test_cycle_survival() {
    let seq = Value::sequence(vec![s("x")]);
    if let Value::Sequence(items) = &seq {
        items.borrow_mut().push(seq.clone());
    }
    let text = to_string(&seq).unwrap();
    assert_eq!(text, "&id001\n- x\n- *id001\n");
    let back = decode_one(&text).unwrap();
    assert!(back.get_index(1).unwrap().ptr_eq(&back));

    let map = Value::mapping(vec![]);
    if let Value::Mapping(pairs) = &map {
        pairs.borrow_mut().push((s("self"), map.clone()));
    }
    let back = decode_one(&to_string(&map).unwrap()).unwrap();
    assert!(back.get("self").unwrap().ptr_eq(&back));
}

#[test]
fn test_duplicate_anchor_rejected() {
    let err = decode_one("- &id001 a\n- &id001 b\n").unwrap_err();
    assert!(matches!(err, Error::Composer(_)), "{:?}", err);
    let message = err.to_string();
    assert!(message.contains("found duplicate anchor"), "{}", message);
    assert!(message.contains("line 1") && message.contains("line 2"), "{}", message);
}

#[test]
fn test_undefined_alias_rejected() {
    let err = decode_one("a: *unknown\n").unwrap_err();
    assert!(matches!(err, Error::Composer(_)), "{:?}", err);
    assert!(err.to_string().contains("found undefined alias \"unknown\""));
}

#[test]
fn test_implicit_tag_boundary() {
    let value = decode_one("- yes\n- 123\n- 1.5\n- 2001-01-01\n- ~\n-\n- \"123\"\n").unwrap();
    assert_eq!(value.get_index(0).unwrap().as_bool(), Some(true));
    assert_eq!(value.get_index(1).unwrap().as_i64(), Some(123));
    assert_eq!(value.get_index(2).unwrap().as_float(), Some(1.5));
    assert_eq!(
        value.get_index(3).unwrap().as_timestamp().map(|t| t.to_string()),
        Some("2001-01-01".to_string())
    );
    assert!(value.get_index(4).unwrap().is_null());
    assert!(value.get_index(5).unwrap().is_null());
    assert_eq!(value.get_index(6).unwrap().as_str(), Some("123"));
}

#[test]
fn test_indentation_close() {
    let input = "outer:\n    inner:\n        - a\n        - b\n    sibling: 1\nnext: 2\n";
    let value = decode_one(input).unwrap();
    assert_eq!(value.len(), Some(2));
    let outer = value.get("outer").unwrap();
    assert_eq!(outer.len(), Some(2));
    assert_eq!(outer.get("inner").unwrap().len(), Some(2));
    assert_eq!(outer.get("sibling").unwrap().as_i64(), Some(1));
    assert_eq!(value.get("next").unwrap().as_i64(), Some(2));
}

#[test]
fn test_scalar_style_fallback() {
    let text = "first line\n  indented line\n";
    let value = Value::mapping(vec![(s("text"), s(text))]);
    let out = to_string_with(&value, &EncodeOptions::new().with_flow_style(FlowStyle::Block)).unwrap();
    assert!(!out.contains("text: '") && (out.contains("text: \"") || out.contains("text: |")), "{}", out);
    assert_eq!(decode_one(&out).unwrap().get("text").unwrap().as_str(), Some(text));
}

#[test]
fn test_multiple_documents() {
    let values = vec![Value::from(1), s("two"), Value::sequence(vec![Value::Null])];
    let mut out = Vec::new();
    let written = encode_all(&values, &mut out, &EncodeOptions::new().with_explicit_start(true)).unwrap();
    assert_eq!(written, out.len());
    let text = String::from_utf8(out).unwrap();
    let back: Vec<Value> = decode_all(&text).collect::<Result<_, _>>().unwrap();
    assert_eq!(back, values);
}

#[test]
fn test_line_breaks() {
    let value = Value::mapping(vec![(s("a"), Value::sequence(vec![s("x"), s("y\nz")]))]);
    for line_break in [LineBreak::Lf, LineBreak::Cr, LineBreak::CrLf] {
        let options = EncodeOptions::new()
            .with_line_break(line_break)
            .with_flow_style(FlowStyle::Block);
        let text = to_string_with(&value, &options).unwrap();
        assert!(text.ends_with(line_break.as_str()), "{:?}", text);
        assert_eq!(decode_one(&text).unwrap(), value, "{:?}", text);
    }
}

#[test]
fn test_partial_output_stays_in_sink() {
    let mut out = Vec::new();
    let err = encode_all(&[Value::from(1), Value::tagged("", Value::Null)], &mut out, &EncodeOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::Representer(_)));
    assert!(out.starts_with(b"1"), "{:?}", String::from_utf8_lossy(&out));

    let mut out = Vec::new();
    let written = encode_one(&Value::from("ok"), &mut out, &EncodeOptions::new()).unwrap();
    assert_eq!(written, out.len());
}

#[test]
fn test_deep_nesting() {
    let depth = 500;
    let input = format!("{}x{}", "[".repeat(depth), "]".repeat(depth));
    let value = decode_one(&input).unwrap();
    for layout in [FlowStyle::Auto, FlowStyle::Flow] {
        let text = to_string_with(&value, &EncodeOptions::new().with_flow_style(layout)).unwrap();
        assert_eq!(decode_one(&text).unwrap(), value);
    }
}

fn nest(depth: usize, inner: Value) -> Value {
    (0..depth).fold(inner, |value, _| Value::mapping(vec![(s("k"), value)]))
}

#[test]
fn test_wrapped_strings_past_width() {
    let layouts = [
        EncodeOptions::new(),
        EncodeOptions::new().with_width(20).with_indent(4),
        EncodeOptions::new().with_width(20).with_indent(4).with_flow_style(FlowStyle::Flow),
        EncodeOptions::new().with_indent(9).with_line_break(LineBreak::CrLf),
    ];
    for text in ["a\n  b", "a   \n   b", "one two three four five six seven eight nine ten"] {
        for depth in [3, 45] {
            let value = nest(depth, s(text));
            for options in &layouts {
                let out = to_string_with(&value, options).unwrap();
                let back = decode_one(&out).unwrap_or_else(|e| panic!("{}\n{}", e, out));
                assert_eq!(back, value, "{:?}\n{}", options, out);
            }
        }
    }
}

#[test]
fn test_round_trip_narrow_layouts() {
    let long = "the quick brown fox jumps over the lazy dog ".repeat(4);
    let value = Value::mapping(vec![
        (s("title"), s(long.trim_end())),
        (
            s("items"),
            Value::sequence(vec![
                Value::mapping(vec![(s("name"), s("first")), (s("note"), s(&format!(" {}\n", long)))]),
                Value::sequence(vec![Value::from(1), Value::from(2.5), s("three\tfour")]),
                nest(6, s("deep\n  indented\nlines")),
            ]),
        ),
    ]);
    for indent in [2, 3, 5, 9] {
        for width in [20, 40, 200] {
            for layout in [FlowStyle::Auto, FlowStyle::Block, FlowStyle::Flow] {
                let options = EncodeOptions::new()
                    .with_indent(indent)
                    .with_width(width)
                    .with_flow_style(layout);
                let out = to_string_with(&value, &options).unwrap();
                assert_eq!(decode_one(&out).unwrap(), value, "{:?}\n{}", options, out);
            }
        }
    }
}

#[test]
fn test_cyclic_values_compare_after_round_trip() {
    let value = decode_one("&a [*a]").unwrap();
    assert_eq!(round_trip(&value), value);

    let value = decode_one("&m {name: m, self: *m, list: [*m, 1]}").unwrap();
    let back = round_trip(&value);
    assert_eq!(back, value);
    assert!(back.get("self").unwrap().ptr_eq(&back));

    let other = decode_one("&m {name: n, self: *m, list: [*m, 1]}").unwrap();
    assert_ne!(other, value);
}

#[test]
fn test_nesting_limit_is_an_error() {
    let depth = 20_000;
    let input = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
    let err = decode_one(&input).unwrap_err();
    assert!(matches!(err, Error::Composer(_)), "{:?}", err);
    assert!(err.to_string().contains("maximum nesting depth"), "{}", err);

    let options = DecodeOptions::new().with_max_depth(10);
    assert!(decode_one_with("[[[[[[[[[[x]]]]]]]]]]", &options).is_ok());
    assert!(decode_one_with("[[[[[[[[[[[x]]]]]]]]]]]", &options).is_err());
}
