//! Encoding entry points: values in, text out.

use std::io::Write;

use crate::emitter::Emitter;
use crate::error::Result;
use crate::options::EncodeOptions;
use crate::representer::Representer;
use crate::resolver::Resolver;
use crate::serializer::Serializer;
use crate::value::Value;

/// Encode one value as a single-document stream. Returns the number of
/// bytes written.
pub fn encode_one<W: Write>(value: &Value, writer: &mut W, options: &EncodeOptions) -> Result<usize> {
    encode_all(std::slice::from_ref(value), writer, options)
}

/// Encode each value as one document of a stream. Returns the number of
/// bytes written. Output written before an error stays in the sink.
pub fn encode_all<W: Write>(values: &[Value], writer: &mut W, options: &EncodeOptions) -> Result<usize> {
    encode_all_with(values, writer, options, Resolver::new())
}

/// Like [`encode_all`], deciding implicit tags with a custom resolver.
pub fn encode_all_with<W: Write>(
    values: &[Value],
    writer: &mut W,
    options: &EncodeOptions,
    resolver: Resolver,
) -> Result<usize> {
    let emitter = Emitter::new(writer, options);
    let mut serializer = Serializer::new(emitter, resolver, options);
    serializer.open()?;
    for value in values {
        let document = Representer::new(options.flow_style).represent(value)?;
        serializer.serialize(&document)?;
    }
    serializer.close()?;
    Ok(serializer.written())
}

/// Encode one value with the default options.
///
/// # Example
///
/// ```
/// use libyml::{to_string, Value};
///
/// let value = Value::mapping(vec![(Value::from("answer"), Value::from(42))]);
/// assert_eq!(to_string(&value).unwrap(), "{answer: 42}\n");
/// ```
pub fn to_string(value: &Value) -> Result<String> {
    to_string_with(value, &EncodeOptions::default())
}

pub fn to_string_with(value: &Value, options: &EncodeOptions) -> Result<String> {
    let mut buffer = Vec::new();
    encode_one(value, &mut buffer, options)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
