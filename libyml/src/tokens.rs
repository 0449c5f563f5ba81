//! Tokens produced by the scanner.

use std::fmt;

use crate::error::Mark;

/// How a scalar was (or should be) written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

impl ScalarStyle {
    /// The indicator character, or `None` for plain scalars.
    pub fn indicator(self) -> Option<char> {
        match self {
            ScalarStyle::Plain => None,
            ScalarStyle::SingleQuoted => Some('\''),
            ScalarStyle::DoubleQuoted => Some('"'),
            ScalarStyle::Literal => Some('|'),
            ScalarStyle::Folded => Some('>'),
        }
    }
}

/// Payload of a `%` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveValue {
    /// `%YAML major.minor`
    Version(u32, u32),
    /// `%TAG handle prefix`
    Tag { handle: String, prefix: String },
    /// Any other directive; ignored by the parser.
    Reserved,
}

/// The token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    StreamStart,
    StreamEnd,
    Directive { name: String, value: DirectiveValue },
    DocumentStart,
    DocumentEnd,
    BlockSequenceStart,
    BlockMappingStart,
    BlockEnd,
    FlowSequenceStart,
    FlowSequenceEnd,
    FlowMappingStart,
    FlowMappingEnd,
    Key,
    Value,
    BlockEntry,
    FlowEntry,
    Alias(String),
    Anchor(String),
    /// `handle` is `None` for verbatim tags (`!<...>`).
    Tag {
        handle: Option<String>,
        suffix: String,
    },
    Scalar {
        value: String,
        plain: bool,
        style: ScalarStyle,
    },
}

impl TokenKind {
    /// Name used in diagnostics, e.g. `<block end>`.
    pub fn id(&self) -> &'static str {
        match self {
            TokenKind::StreamStart => "<stream start>",
            TokenKind::StreamEnd => "<stream end>",
            TokenKind::Directive { .. } => "<directive>",
            TokenKind::DocumentStart => "<document start>",
            TokenKind::DocumentEnd => "<document end>",
            TokenKind::BlockSequenceStart => "<block sequence start>",
            TokenKind::BlockMappingStart => "<block mapping start>",
            TokenKind::BlockEnd => "<block end>",
            TokenKind::FlowSequenceStart => "'['",
            TokenKind::FlowSequenceEnd => "']'",
            TokenKind::FlowMappingStart => "'{'",
            TokenKind::FlowMappingEnd => "'}'",
            TokenKind::Key => "?",
            TokenKind::Value => ":",
            TokenKind::BlockEntry => "-",
            TokenKind::FlowEntry => "','",
            TokenKind::Alias(_) => "<alias>",
            TokenKind::Anchor(_) => "<anchor>",
            TokenKind::Tag { .. } => "<tag>",
            TokenKind::Scalar { .. } => "<scalar>",
        }
    }
}

/// A single token with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Mark,
    pub end: Mark,
}

impl Token {
    pub fn new(kind: TokenKind, start: Mark, end: Mark) -> Self {
        Self { kind, start, end }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ", self.start.line + 1, self.start.column + 1)?;
        match &self.kind {
            TokenKind::Directive { name, value } => match value {
                DirectiveValue::Version(major, minor) => write!(f, "%{} {}.{}", name, major, minor),
                DirectiveValue::Tag { handle, prefix } => write!(f, "%{} {} {}", name, handle, prefix),
                DirectiveValue::Reserved => write!(f, "%{}", name),
            },
            TokenKind::Alias(name) => write!(f, "*{}", name),
            TokenKind::Anchor(name) => write!(f, "&{}", name),
            TokenKind::Tag { handle, suffix } => match handle {
                Some(handle) => write!(f, "<tag {}{}>", handle, suffix),
                None => write!(f, "<tag !<{}>>", suffix),
            },
            TokenKind::Scalar { value, style, .. } => write!(f, "<scalar {:?} {:?}>", style, value),
            other => write!(f, "{}", other.id()),
        }
    }
}
