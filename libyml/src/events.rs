//! Events exchanged between parser and composer, and between serializer and
//! emitter.

use std::fmt;

use crate::error::Mark;
use crate::tokens::ScalarStyle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart {
        explicit: bool,
        version: Option<(u32, u32)>,
        tags: Vec<(String, String)>,
    },
    DocumentEnd {
        explicit: bool,
    },
    Alias {
        anchor: String,
    },
    /// `implicit.0`: the tag may be omitted when the scalar is written plain.
    /// `implicit.1`: the tag may be omitted when the scalar is written in any
    /// other style.
    Scalar {
        anchor: Option<String>,
        tag: Option<String>,
        implicit: (bool, bool),
        value: String,
        style: Option<ScalarStyle>,
    },
    SequenceStart {
        anchor: Option<String>,
        tag: Option<String>,
        implicit: bool,
        flow_style: bool,
    },
    SequenceEnd,
    MappingStart {
        anchor: Option<String>,
        tag: Option<String>,
        implicit: bool,
        flow_style: bool,
    },
    MappingEnd,
}

impl EventKind {
    /// The anchor of a node event.
    pub fn anchor(&self) -> Option<&str> {
        match self {
            EventKind::Scalar { anchor, .. }
            | EventKind::SequenceStart { anchor, .. }
            | EventKind::MappingStart { anchor, .. } => anchor.as_deref(),
            EventKind::Alias { anchor } => Some(anchor),
            _ => None,
        }
    }

    /// The tag of a scalar or collection start event.
    pub fn tag(&self) -> Option<&str> {
        match self {
            EventKind::Scalar { tag, .. }
            | EventKind::SequenceStart { tag, .. }
            | EventKind::MappingStart { tag, .. } => tag.as_deref(),
            _ => None,
        }
    }

    pub fn is_collection_end(&self) -> bool {
        matches!(self, EventKind::SequenceEnd | EventKind::MappingEnd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub start: Mark,
    pub end: Mark,
}

impl Event {
    pub fn new(kind: EventKind, start: Mark, end: Mark) -> Self {
        Self { kind, start, end }
    }

    /// An event with no source position, as produced on the encode side.
    pub fn unmarked(kind: EventKind) -> Self {
        Self {
            kind,
            start: Mark::default(),
            end: Mark::default(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ", self.start.line + 1, self.start.column + 1)?;
        let props = |anchor: &Option<String>, tag: &Option<String>| {
            let mut s = String::new();
            if let Some(anchor) = anchor {
                s.push_str(&format!(" &{}", anchor));
            }
            if let Some(tag) = tag {
                s.push_str(&format!(" <{}>", tag));
            }
            s
        };
        match &self.kind {
            EventKind::StreamStart => write!(f, "+STR"),
            EventKind::StreamEnd => write!(f, "-STR"),
            EventKind::DocumentStart { explicit, .. } => {
                write!(f, "+DOC{}", if *explicit { " ---" } else { "" })
            }
            EventKind::DocumentEnd { explicit } => {
                write!(f, "-DOC{}", if *explicit { " ..." } else { "" })
            }
            EventKind::Alias { anchor } => write!(f, "=ALI *{}", anchor),
            EventKind::Scalar {
                anchor,
                tag,
                value,
                style,
                ..
            } => {
                let indicator = style.and_then(|s| s.indicator()).unwrap_or(':');
                write!(f, "=VAL{} {}{:?}", props(anchor, tag), indicator, value)
            }
            EventKind::SequenceStart {
                anchor,
                tag,
                flow_style,
                ..
            } => write!(
                f,
                "+SEQ{}{}",
                if *flow_style { " []" } else { "" },
                props(anchor, tag)
            ),
            EventKind::SequenceEnd => write!(f, "-SEQ"),
            EventKind::MappingStart {
                anchor,
                tag,
                flow_style,
                ..
            } => write!(
                f,
                "+MAP{}{}",
                if *flow_style { " {}" } else { "" },
                props(anchor, tag)
            ),
            EventKind::MappingEnd => write!(f, "-MAP"),
        }
    }
}
