//! Encoding and decoding options.

use std::env;

use crate::composer::DEFAULT_MAX_DEPTH;

/// Collection layout for the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowStyle {
    /// Block collections, with flow style for collections of scalars only.
    #[default]
    Auto,
    /// Block collections everywhere.
    Block,
    /// Flow collections everywhere.
    Flow,
}

/// Line terminator written by the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreak {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineBreak {
    pub fn as_str(self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::Cr => "\r",
            LineBreak::CrLf => "\r\n",
        }
    }
}

pub const DEFAULT_INDENT: usize = 2;
pub const DEFAULT_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub explicit_start: bool,
    pub explicit_end: bool,
    pub canonical: bool,
    pub flow_style: FlowStyle,
    pub indent: usize,
    pub width: usize,
    pub line_break: LineBreak,
    /// Write non-ASCII printable characters as-is instead of escaping them.
    pub allow_unicode: bool,
    /// Emit a `%YAML` directive with this version.
    pub version: Option<(u32, u32)>,
    /// `%TAG` directives: handle and prefix.
    pub tags: Vec<(String, String)>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            explicit_start: false,
            explicit_end: false,
            canonical: false,
            flow_style: FlowStyle::Auto,
            indent: DEFAULT_INDENT,
            width: DEFAULT_WIDTH,
            line_break: LineBreak::Lf,
            allow_unicode: true,
            version: None,
            tags: Vec::new(),
        }
    }
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `YML_INDENT`, `YML_WIDTH` and `YML_CANONICAL` applied.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(indent) = env::var("YML_INDENT").ok().and_then(|v| v.trim().parse().ok()) {
            options = options.with_indent(indent);
        }
        if let Some(width) = env::var("YML_WIDTH").ok().and_then(|v| v.trim().parse().ok()) {
            options = options.with_width(width);
        }
        if let Ok(canonical) = env::var("YML_CANONICAL") {
            options.canonical = matches!(canonical.trim(), "1" | "true" | "yes");
        }
        options
    }

    pub fn with_explicit_start(mut self, explicit_start: bool) -> Self {
        self.explicit_start = explicit_start;
        self
    }

    pub fn with_explicit_end(mut self, explicit_end: bool) -> Self {
        self.explicit_end = explicit_end;
        self
    }

    pub fn with_canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_flow_style(mut self, flow_style: FlowStyle) -> Self {
        self.flow_style = flow_style;
        self
    }

    /// Indentation step; anything outside 2..=9 falls back to 2.
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Preferred line width; anything not above twice the indent falls back
    /// to 80.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_line_break(mut self, line_break: LineBreak) -> Self {
        self.line_break = line_break;
        self
    }

    pub fn with_allow_unicode(mut self, allow_unicode: bool) -> Self {
        self.allow_unicode = allow_unicode;
        self
    }

    pub fn with_version(mut self, version: Option<(u32, u32)>) -> Self {
        self.version = version;
        self
    }

    pub fn with_tag(mut self, handle: &str, prefix: &str) -> Self {
        self.tags.push((handle.to_string(), prefix.to_string()));
        self
    }

    /// The indentation step after clamping.
    pub fn effective_indent(&self) -> usize {
        if (2..=9).contains(&self.indent) {
            self.indent
        } else {
            DEFAULT_INDENT
        }
    }

    /// The line width after clamping.
    pub fn effective_width(&self) -> usize {
        if self.width > self.effective_indent() * 2 {
            self.width
        } else {
            DEFAULT_WIDTH
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Source name used in error marks.
    pub name: String,
    /// Fail on tags without a registered constructor instead of keeping
    /// them as tagged values.
    pub strict_tags: bool,
    /// Let a repeated mapping key replace the earlier entry.
    pub allow_duplicate_keys: bool,
    /// Deepest collection nesting accepted before decoding fails.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            name: "<input>".to_string(),
            strict_tags: false,
            allow_duplicate_keys: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_strict_tags(mut self, strict_tags: bool) -> Self {
        self.strict_tags = strict_tags;
        self
    }

    pub fn with_allow_duplicate_keys(mut self, allow: bool) -> Self {
        self.allow_duplicate_keys = allow;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
