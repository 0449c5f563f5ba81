//! YAML 1.1 processing with anchor-preserving values.
//!
//! Documents decode into [`Value`]s whose collections are shared: an anchor
//! and its aliases become the same container, and a document may contain
//! itself. Encoding writes such values back with generated anchors.
//!
//! # Decoding Pipeline
//!
//! 1. **Reader**: Decodes the input into characters, checks that each one is
//!    printable and tracks the line and column of every position.
//!
//! 2. **Scanner**: Turns characters into tokens, inserting the implicit
//!    block start and end markers implied by indentation.
//!
//! 3. **Parser**: Checks the token grammar and produces events.
//!
//! 4. **Composer**: Builds a node graph per document, joining aliases to
//!    their anchored nodes and giving every node a tag through the
//!    **Resolver**.
//!
//! 5. **Constructor**: Builds native values from the graph, dispatching on
//!    tags.
//!
//! # Encoding Pipeline
//!
//! 1. **Representer**: Builds a node graph from values, one node per shared
//!    container.
//!
//! 2. **Serializer**: Names shared nodes and turns the graph into events,
//!    leaving out tags the resolver would infer.
//!
//! 3. **Emitter**: Lays the events out as text.

pub mod composer;
pub mod constructor;
mod decode;
pub mod emitter;
mod encode;
mod error;
pub mod events;
pub mod nodes;
mod options;
pub mod parser;
pub mod reader;
pub mod representer;
pub mod resolver;
pub mod scanner;
pub mod serializer;
pub mod tokens;
mod value;

pub use constructor::{Constructor, ConstructorRegistry};
pub use decode::{decode_all, decode_one, decode_one_with, decode_reader, Documents};
pub use encode::{encode_all, encode_all_with, encode_one, to_string, to_string_with};
pub use error::{Error, Mark, MarkedProblem, Result};
pub use options::{DecodeOptions, EncodeOptions, FlowStyle, LineBreak};
pub use resolver::Resolver;
pub use value::{MappingRef, SequenceRef, Tagged, Timestamp, Value};
