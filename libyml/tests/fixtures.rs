//! Test harness for the YAML fixture files.
//!
//! Every `tests/fixtures/good/*.yml` file must decode, encode back to text,
//! and decode again to equal values. Every `tests/fixtures/bad/*.yml` file
//! must fail to decode with a message containing the text of the matching
//! `.error` file.

use std::fs;
use std::path::{Path, PathBuf};

use libyml::{decode_all, encode_all, EncodeOptions, FlowStyle, Value};

/// Compare two values, treating NaN as equal to NaN.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
        (Value::Sequence(a), Value::Sequence(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Mapping(a), Value::Mapping(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| values_equal(ka, kb) && values_equal(va, vb))
        }
        (Value::Tagged(a), Value::Tagged(b)) => a.tag == b.tag && values_equal(&a.value, &b.value),
        _ => a == b,
    }
}

fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// All `.yml` files in a fixture subdirectory, sorted.
fn fixture_files(subdir: &str) -> Vec<PathBuf> {
    let pattern = fixture_root().join(subdir).join("*.yml");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .expect("valid glob pattern")
        .flatten()
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

fn decode_file(content: &str) -> libyml::Result<Vec<Value>> {
    decode_all(content).collect()
}

/// Decode, encode with `options`, and decode again.
fn round_trip(path: &Path, options: &EncodeOptions) -> Result<(), String> {
    let filename = file_name(path);
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", filename, e))?;

    let values = decode_file(&content).map_err(|e| format!("{}: Unexpected decode error: {}", filename, e))?;
    if values.is_empty() {
        return Err(format!("{}: no documents", filename));
    }

    let mut out = Vec::new();
    encode_all(&values, &mut out, options).map_err(|e| format!("{}: Encode error: {}", filename, e))?;
    let text = String::from_utf8(out).map_err(|e| format!("{}: Encoded text is not UTF-8: {}", filename, e))?;

    let again = decode_file(&text)
        .map_err(|e| format!("{}: Re-decode error: {}\n    encoded:\n{}", filename, e, text))?;
    if values.len() != again.len() || !values.iter().zip(again.iter()).all(|(a, b)| values_equal(a, b)) {
        return Err(format!(
            "{}: Round trip mismatch\n    decoded:    {:?}\n    re-decoded: {:?}\n    encoded:\n{}",
            filename, values, again, text
        ));
    }
    Ok(())
}

/// Read the expected error message for a bad fixture.
fn read_expected_error(path: &Path) -> Option<String> {
    fs::read_to_string(path.with_extension("error"))
        .ok()
        .map(|s| s.trim().to_string())
}

fn run_bad_test(path: &Path) -> Result<(), String> {
    let filename = file_name(path);
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", filename, e))?;
    let expected = read_expected_error(path).ok_or_else(|| format!("{}: missing .error file", filename))?;

    match decode_file(&content) {
        Ok(values) => Err(format!("{}: Expected error but decoded {:?}", filename, values)),
        Err(e) => {
            let message = e.to_string();
            if message.contains(&expected) {
                println!("  {} => error (as expected)", filename);
                Ok(())
            } else {
                Err(format!(
                    "{}: Error mismatch\n    expected: {}\n    actual:   {}",
                    filename, expected, message
                ))
            }
        }
    }
}

fn report(kind: &str, results: Vec<Result<(), String>>) {
    let failed: Vec<String> = results.into_iter().filter_map(Result::err).collect();
    println!("\n{} fixtures: {} failed", kind, failed.len());
    for error in &failed {
        println!("  - {}", error);
    }
    assert!(failed.is_empty(), "{} {} fixtures failed", failed.len(), kind);
}

#[test]
fn test_all_good_fixtures() {
    let files = fixture_files("good");
    assert!(!files.is_empty(), "no good fixtures found");
    println!("\nRunning {} good fixtures:", files.len());
    report(
        "good",
        files
            .iter()
            .map(|path| round_trip(path, &EncodeOptions::default()))
            .collect(),
    );
}

#[test]
fn test_good_fixtures_in_every_layout() {
    let layouts = [
        EncodeOptions::default().with_flow_style(FlowStyle::Block),
        EncodeOptions::default().with_flow_style(FlowStyle::Flow),
        EncodeOptions::default().with_canonical(true),
        EncodeOptions::default()
            .with_indent(4)
            .with_width(30)
            .with_explicit_start(true)
            .with_explicit_end(true),
        EncodeOptions::default().with_allow_unicode(false),
    ];
    let files = fixture_files("good");
    let mut results = Vec::new();
    for options in &layouts {
        for path in &files {
            results.push(round_trip(path, options));
        }
    }
    report("layout", results);
}

#[test]
fn test_all_bad_fixtures() {
    let files = fixture_files("bad");
    assert!(!files.is_empty(), "no bad fixtures found");
    println!("\nRunning {} bad fixtures:", files.len());
    report("bad", files.iter().map(|path| run_bad_test(path)).collect());
}
