//! Decoding entry points: text in, values out.

use std::io::Read;

use tracing::debug;

use crate::composer::Composer;
use crate::constructor::{Constructor, ConstructorRegistry};
use crate::error::Result;
use crate::nodes::Document;
use crate::options::DecodeOptions;
use crate::parser::Parser;
use crate::reader::Reader;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::value::Value;

/// Lazy iterator over the documents of a stream.
///
/// Each item is one constructed document. After the first error the
/// iterator is exhausted.
pub struct Documents<'a> {
    composer: Composer<'a>,
    registry: ConstructorRegistry,
    allow_duplicate_keys: bool,
    done: bool,
}

impl<'a> Documents<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_options(input, &DecodeOptions::default())
    }

    pub fn with_options(input: &'a str, options: &DecodeOptions) -> Self {
        Self::from_source(Reader::from_str(input), options)
    }

    /// Documents read from a byte stream, decoded as UTF-8.
    pub fn from_reader<R: Read + 'a>(input: R) -> Self {
        Self::from_reader_with_options(input, &DecodeOptions::default())
    }

    pub fn from_reader_with_options<R: Read + 'a>(input: R, options: &DecodeOptions) -> Self {
        Self::from_source(Reader::from_reader(input), options)
    }

    fn from_source(reader: Reader<'a>, options: &DecodeOptions) -> Self {
        let reader = reader.with_name(&options.name);
        let parser = Parser::new(Scanner::new(reader));
        let mut registry = ConstructorRegistry::default();
        if options.strict_tags {
            registry.clear_fallback();
        }
        Self {
            composer: Composer::new(parser, Resolver::new()).with_max_depth(options.max_depth),
            registry,
            allow_duplicate_keys: options.allow_duplicate_keys,
            done: false,
        }
    }

    /// Tag resolution for the documents not yet read.
    pub fn resolver_mut(&mut self) -> &mut Resolver {
        self.composer.resolver_mut()
    }

    /// Constructors for the documents not yet read.
    pub fn registry_mut(&mut self) -> &mut ConstructorRegistry {
        &mut self.registry
    }

    /// The next document as a node graph, without constructing values.
    pub fn next_node(&mut self) -> Option<Result<Document>> {
        if self.done {
            return None;
        }
        match self.composer.get_node() {
            Ok(Some(document)) => Some(Ok(document)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn construct(&self, document: &Document) -> Result<Value> {
        Constructor::new(&document.graph, self.registry.clone())
            .allow_duplicate_keys(self.allow_duplicate_keys)
            .construct_document(document)
    }
}

impl Iterator for Documents<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = match self.next_node()? {
            Ok(document) => document,
            Err(err) => return Some(Err(err)),
        };
        let value = self.construct(&document);
        if value.is_err() {
            self.done = true;
        }
        Some(value)
    }
}

/// Decode a stream holding at most one document. An empty stream is
/// `Value::Null`; a second document is an error.
///
/// # Example
///
/// ```
/// use libyml::decode_one;
///
/// let value = decode_one("answer: 42").unwrap();
/// assert_eq!(value.get("answer").and_then(|v| v.as_i64()), Some(42));
/// ```
pub fn decode_one(input: &str) -> Result<Value> {
    decode_one_with(input, &DecodeOptions::default())
}

pub fn decode_one_with(input: &str, options: &DecodeOptions) -> Result<Value> {
    let mut documents = Documents::with_options(input, options);
    let Some(document) = documents.composer.get_single_node()? else {
        debug!(name = %options.name, "empty stream");
        return Ok(Value::Null);
    };
    documents.construct(&document)
}

/// Decode every document of a stream, lazily.
///
/// # Example
///
/// ```
/// use libyml::decode_all;
///
/// let values: Vec<_> = decode_all("--- 1\n--- 2\n").collect::<Result<_, _>>().unwrap();
/// assert_eq!(values.len(), 2);
/// ```
pub fn decode_all(input: &str) -> Documents<'_> {
    Documents::new(input)
}

/// Decode every document of a byte stream, lazily.
pub fn decode_reader<'a, R: Read + 'a>(input: R) -> Documents<'a> {
    Documents::from_reader(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_empty_stream_is_null() {
        assert!(decode_one("").unwrap().is_null());
        assert!(decode_one("# only a comment\n").unwrap().is_null());
        assert_eq!(decode_all("").count(), 0);
    }

    #[test]
    fn test_second_document_is_error() {
        let err = decode_one("--- 1\n--- 2\n").unwrap_err();
        assert!(matches!(err, Error::Composer(_)));
        assert!(err.to_string().contains("expected a single document"));
    }

    #[test]
    fn test_documents_are_lazy() {
        let mut docs = decode_all("--- 1\n--- [\n");
        assert_eq!(docs.next().unwrap().unwrap().as_i64(), Some(1));
        assert!(docs.next().unwrap().is_err());
        assert!(docs.next().is_none());
    }

    #[test]
    fn test_reader_source() {
        let input: &[u8] = b"- a\n- b\n---\nc: d\n";
        let values: Vec<Value> = decode_reader(input).collect::<Result<_>>().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].get_index(1).and_then(|v| v.as_str().map(String::from)), Some("b".into()));
        assert_eq!(values[1].get("c").and_then(|v| v.as_str().map(String::from)), Some("d".into()));
    }

    #[test]
    fn test_options() {
        let options = DecodeOptions::new().with_name("config.yml");
        let err = decode_one_with("a: [", &options).unwrap_err();
        assert!(err.to_string().contains("config.yml"), "{}", err);

        let strict = DecodeOptions::new().with_strict_tags(true);
        assert!(decode_one_with("!thing x", &strict).is_err());
        let tagged = decode_one("!thing x").unwrap();
        assert_eq!(tagged.as_tagged().map(|t| t.tag.as_str()), Some("!thing"));

        assert!(decode_one("a: 1\na: 2\n").is_err());
        let lenient = DecodeOptions::new().with_allow_duplicate_keys(true);
        let value = decode_one_with("a: 1\na: 2\n", &lenient).unwrap();
        assert_eq!(value.get("a").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(value.len(), Some(1));
    }

    #[test]
    fn test_custom_constructor() {
        let mut docs = decode_all("!upper abc\n");
        docs.registry_mut().add_constructor("!upper", |c, id| {
            Ok(Value::String(c.scalar_text(id)?.to_uppercase()))
        });
        assert_eq!(docs.next().unwrap().unwrap().as_str(), Some("ABC"));
    }
}
