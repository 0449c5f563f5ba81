//! Stage 3: Parser
//!
//! The parser turns the token stream into events. The grammar is driven by
//! an explicit stack of pending states instead of recursion, so events can be
//! pulled one at a time and nesting depth never grows the call stack:
//!
//! ```text
//! stream   ::= STREAM-START implicit_document? explicit_document* STREAM-END
//! document ::= DIRECTIVE* DOCUMENT-START block_node? DOCUMENT-END*
//! node     ::= ALIAS | properties? (block_collection | flow_collection | SCALAR)
//! ```
//!
//! It also handles:
//! - Properties: an anchor and a tag, in either order
//! - `%YAML` and `%TAG` directives, with shorthand tag expansion
//! - Empty nodes, reported as empty plain scalars

use std::collections::HashMap;

use crate::error::{Error, Mark, Result};
use crate::events::{Event, EventKind};
use crate::reader::Reader;
use crate::scanner::Scanner;
use crate::tokens::{DirectiveValue, Token, TokenKind};

/// The namespace of the core schema.
pub const DEFAULT_TAG_PREFIX: &str = "tag:yaml.org,2002:";

fn default_tag_handles(version: Option<(u32, u32)>) -> [(&'static str, &'static str); 2] {
    // YAML 1.0 documents bind the primary handle to the core namespace.
    if version == Some((1, 0)) {
        [("!", DEFAULT_TAG_PREFIX), ("!!", "")]
    } else {
        [("!", "!"), ("!!", DEFAULT_TAG_PREFIX)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StreamStart,
    ImplicitDocumentStart,
    DocumentStart,
    DocumentContent,
    DocumentEnd,
    BlockNode,
    BlockSequenceFirstEntry,
    BlockSequenceEntry,
    IndentlessSequenceEntry,
    BlockMappingFirstKey,
    BlockMappingKey,
    BlockMappingValue,
    FlowSequenceFirstEntry,
    FlowSequenceEntry,
    FlowSequenceEntryMappingKey,
    FlowSequenceEntryMappingValue,
    FlowSequenceEntryMappingEnd,
    FlowMappingFirstKey,
    FlowMappingKey,
    FlowMappingValue,
    FlowMappingEmptyValue,
    End,
}

/// Pull-based event stream over a [`Scanner`].
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    current: Option<Event>,
    state: State,
    states: Vec<State>,
    marks: Vec<Mark>,
    tag_handles: HashMap<String, String>,
    failed: bool,
}

impl<'a> Parser<'a> {
    pub fn new(scanner: Scanner<'a>) -> Self {
        Self {
            scanner,
            current: None,
            state: State::StreamStart,
            states: Vec::new(),
            marks: Vec::new(),
            tag_handles: HashMap::new(),
            failed: false,
        }
    }

    pub fn from_str(input: &'a str) -> Self {
        Self::new(Scanner::new(Reader::from_str(input)))
    }

    /// Whether another event is available.
    pub fn check_event(&mut self) -> Result<bool> {
        self.ensure_event()?;
        Ok(self.current.is_some())
    }

    /// The next event without consuming it; `None` after the stream end.
    pub fn peek_event(&mut self) -> Result<Option<&Event>> {
        self.ensure_event()?;
        Ok(self.current.as_ref())
    }

    /// Consume the next event; `None` after the stream end.
    pub fn get_event(&mut self) -> Result<Option<Event>> {
        self.ensure_event()?;
        Ok(self.current.take())
    }

    fn ensure_event(&mut self) -> Result<()> {
        if self.current.is_none() && self.state != State::End {
            self.current = Some(self.step()?);
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Event> {
        match self.state {
            State::StreamStart => self.parse_stream_start(),
            State::ImplicitDocumentStart => self.parse_implicit_document_start(),
            State::DocumentStart => self.parse_document_start(),
            State::DocumentContent => self.parse_document_content(),
            State::DocumentEnd => self.parse_document_end(),
            State::BlockNode => self.parse_node(true, false),
            State::BlockSequenceFirstEntry => {
                let token = self.next_token()?;
                self.marks.push(token.start);
                self.parse_block_sequence_entry()
            }
            State::BlockSequenceEntry => self.parse_block_sequence_entry(),
            State::IndentlessSequenceEntry => self.parse_indentless_sequence_entry(),
            State::BlockMappingFirstKey => {
                let token = self.next_token()?;
                self.marks.push(token.start);
                self.parse_block_mapping_key()
            }
            State::BlockMappingKey => self.parse_block_mapping_key(),
            State::BlockMappingValue => self.parse_block_mapping_value(),
            State::FlowSequenceFirstEntry => {
                let token = self.next_token()?;
                self.marks.push(token.start);
                self.parse_flow_sequence_entry(true)
            }
            State::FlowSequenceEntry => self.parse_flow_sequence_entry(false),
            State::FlowSequenceEntryMappingKey => self.parse_flow_sequence_entry_mapping_key(),
            State::FlowSequenceEntryMappingValue => self.parse_flow_sequence_entry_mapping_value(),
            State::FlowSequenceEntryMappingEnd => {
                self.state = State::FlowSequenceEntry;
                let mark = self.peek_token()?.start.clone();
                Ok(Event::new(EventKind::MappingEnd, mark.clone(), mark))
            }
            State::FlowMappingFirstKey => {
                let token = self.next_token()?;
                self.marks.push(token.start);
                self.parse_flow_mapping_key(true)
            }
            State::FlowMappingKey => self.parse_flow_mapping_key(false),
            State::FlowMappingValue => self.parse_flow_mapping_value(),
            State::FlowMappingEmptyValue => {
                self.state = State::FlowMappingKey;
                let mark = self.peek_token()?.start.clone();
                Ok(empty_scalar(mark))
            }
            State::End => Err(Error::parser(None, "no more events", Mark::default())),
        }
    }

    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    fn peek_token(&mut self) -> Result<&Token> {
        self.scanner
            .peek_token()?
            .ok_or_else(|| Error::parser(None, "unexpected end of token stream", Mark::default()))
    }

    fn next_token(&mut self) -> Result<Token> {
        self.scanner
            .get_token()?
            .ok_or_else(|| Error::parser(None, "unexpected end of token stream", Mark::default()))
    }

    fn check(&mut self, test: fn(&TokenKind) -> bool) -> Result<bool> {
        Ok(test(&self.peek_token()?.kind))
    }

    fn pop_state(&mut self) {
        self.state = self.states.pop().unwrap_or(State::End);
    }

    fn unexpected(&mut self, context: &str, problem: &str) -> Error {
        let context_mark = self.marks.last().cloned().unwrap_or_default();
        match self.peek_token() {
            Ok(token) => Error::parser(
                Some((context, context_mark)),
                format!("{}, but found {}", problem, token.kind.id()),
                token.start.clone(),
            ),
            Err(err) => err,
        }
    }

    // ------------------------------------------------------------------
    // Stream and documents
    // ------------------------------------------------------------------

    fn parse_stream_start(&mut self) -> Result<Event> {
        let token = self.next_token()?;
        self.state = State::ImplicitDocumentStart;
        Ok(Event::new(EventKind::StreamStart, token.start, token.end))
    }

    fn parse_implicit_document_start(&mut self) -> Result<Event> {
        let explicit = self.check(|k| {
            matches!(
                k,
                TokenKind::Directive { .. } | TokenKind::DocumentStart | TokenKind::StreamEnd
            )
        })?;
        if explicit {
            return self.parse_document_start();
        }
        self.tag_handles = default_tag_handles(None)
            .iter()
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .collect();
        let mark = self.peek_token()?.start.clone();
        self.states.push(State::DocumentEnd);
        self.state = State::BlockNode;
        Ok(Event::new(
            EventKind::DocumentStart {
                explicit: false,
                version: None,
                tags: Vec::new(),
            },
            mark.clone(),
            mark,
        ))
    }

    fn parse_document_start(&mut self) -> Result<Event> {
        while self.check(|k| matches!(k, TokenKind::DocumentEnd))? {
            self.next_token()?;
        }
        if self.check(|k| matches!(k, TokenKind::StreamEnd))? {
            let token = self.next_token()?;
            self.state = State::End;
            return Ok(Event::new(EventKind::StreamEnd, token.start, token.end));
        }
        let start = self.peek_token()?.start.clone();
        let (version, tags) = self.process_directives()?;
        if !self.check(|k| matches!(k, TokenKind::DocumentStart))? {
            let token = self.peek_token()?;
            return Err(Error::parser(
                None,
                format!("expected '<document start>', but found {}", token.kind.id()),
                token.start.clone(),
            ));
        }
        let token = self.next_token()?;
        self.states.push(State::DocumentEnd);
        self.state = State::DocumentContent;
        Ok(Event::new(
            EventKind::DocumentStart {
                explicit: true,
                version,
                tags,
            },
            start,
            token.end,
        ))
    }

    fn parse_document_end(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        let start = token.start.clone();
        let mut end = start.clone();
        let explicit = matches!(token.kind, TokenKind::DocumentEnd);
        if explicit {
            end = self.next_token()?.end;
        }
        self.state = State::DocumentStart;
        Ok(Event::new(EventKind::DocumentEnd { explicit }, start, end))
    }

    fn parse_document_content(&mut self) -> Result<Event> {
        let empty = self.check(|k| {
            matches!(
                k,
                TokenKind::Directive { .. }
                    | TokenKind::DocumentStart
                    | TokenKind::DocumentEnd
                    | TokenKind::StreamEnd
            )
        })?;
        if empty {
            let mark = self.peek_token()?.start.clone();
            self.pop_state();
            Ok(empty_scalar(mark))
        } else {
            self.parse_node(true, false)
        }
    }

    #[allow(clippy::type_complexity)]
    fn process_directives(&mut self) -> Result<(Option<(u32, u32)>, Vec<(String, String)>)> {
        let mut version = None;
        let mut declared: Vec<(String, String)> = Vec::new();
        while self.check(|k| matches!(k, TokenKind::Directive { .. }))? {
            let token = self.next_token()?;
            let TokenKind::Directive { value, .. } = token.kind else {
                continue;
            };
            match value {
                DirectiveValue::Version(major, minor) => {
                    if version.is_some() {
                        return Err(Error::parser(
                            None,
                            "found duplicate YAML directive",
                            token.start,
                        ));
                    }
                    if major != 1 {
                        return Err(Error::parser(
                            None,
                            "found incompatible YAML document (version 1.* is required)",
                            token.start,
                        ));
                    }
                    version = Some((major, minor));
                }
                DirectiveValue::Tag { handle, prefix } => {
                    if declared.iter().any(|(h, _)| *h == handle) {
                        return Err(Error::parser(
                            None,
                            format!("duplicate tag handle {:?}", handle),
                            token.start,
                        ));
                    }
                    declared.push((handle, prefix));
                }
                DirectiveValue::Reserved => {}
            }
        }
        self.tag_handles = declared.iter().cloned().collect();
        for (handle, prefix) in default_tag_handles(version) {
            self.tag_handles
                .entry(handle.to_string())
                .or_insert_with(|| prefix.to_string());
        }
        Ok((version, declared))
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    fn parse_node(&mut self, block: bool, indentless_sequence: bool) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::Alias(_)))? {
            let token = self.next_token()?;
            self.pop_state();
            if let TokenKind::Alias(anchor) = token.kind {
                return Ok(Event::new(EventKind::Alias { anchor }, token.start, token.end));
            }
        }

        let mut anchor = None;
        let mut raw_tag = None;
        let mut start = None;
        let mut end = None;
        let mut tag_mark = None;
        // Anchor and tag may come in either order, each at most once.
        loop {
            if anchor.is_none() && self.check(|k| matches!(k, TokenKind::Anchor(_)))? {
                let token = self.next_token()?;
                start.get_or_insert_with(|| token.start.clone());
                end = Some(token.end);
                if let TokenKind::Anchor(name) = token.kind {
                    anchor = Some(name);
                }
            } else if raw_tag.is_none() && self.check(|k| matches!(k, TokenKind::Tag { .. }))? {
                let token = self.next_token()?;
                start.get_or_insert_with(|| token.start.clone());
                tag_mark = Some(token.start);
                end = Some(token.end);
                if let TokenKind::Tag { handle, suffix } = token.kind {
                    raw_tag = Some((handle, suffix));
                }
            } else {
                break;
            }
        }

        let tag = match raw_tag {
            Some((Some(handle), suffix)) => match self.tag_handles.get(&handle) {
                Some(prefix) => Some(format!("{}{}", prefix, suffix)),
                None => {
                    return Err(Error::parser(
                        Some(("while parsing a node", start.unwrap_or_default())),
                        format!("found undefined tag handle {:?}", handle),
                        tag_mark.unwrap_or_default(),
                    ))
                }
            },
            Some((None, suffix)) => Some(suffix),
            None => None,
        };

        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                let mark = self.peek_token()?.start.clone();
                (mark.clone(), mark)
            }
        };
        let implicit = tag.as_deref().map_or(true, |t| t == "!");

        if self.check(|k| matches!(k, TokenKind::Scalar { .. }))? {
            let token = self.next_token()?;
            self.pop_state();
            if let TokenKind::Scalar { value, plain, style } = token.kind {
                let implicit = if (plain && tag.is_none()) || tag.as_deref() == Some("!") {
                    (true, false)
                } else if tag.is_none() {
                    (false, true)
                } else {
                    (false, false)
                };
                return Ok(Event::new(
                    EventKind::Scalar {
                        anchor,
                        tag,
                        implicit,
                        value,
                        style: Some(style),
                    },
                    start,
                    token.end,
                ));
            }
        }

        let token = self.peek_token()?;
        let opening = match token.kind {
            TokenKind::BlockEntry if indentless_sequence => {
                Some((State::IndentlessSequenceEntry, true, false))
            }
            TokenKind::FlowSequenceStart => Some((State::FlowSequenceFirstEntry, true, true)),
            TokenKind::FlowMappingStart => Some((State::FlowMappingFirstKey, false, true)),
            TokenKind::BlockSequenceStart if block => {
                Some((State::BlockSequenceFirstEntry, true, false))
            }
            TokenKind::BlockMappingStart if block => {
                Some((State::BlockMappingFirstKey, false, false))
            }
            _ => None,
        };
        let found = token.kind.id();
        let found_start = token.start.clone();
        let found_end = token.end.clone();

        if let Some((next, sequence, flow_style)) = opening {
            self.state = next;
            let kind = if sequence {
                EventKind::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    flow_style,
                }
            } else {
                EventKind::MappingStart {
                    anchor,
                    tag,
                    implicit,
                    flow_style,
                }
            };
            return Ok(Event::new(kind, start, found_end));
        }

        if anchor.is_some() || tag.is_some() {
            // Properties with no content make an empty scalar.
            self.pop_state();
            return Ok(Event::new(
                EventKind::Scalar {
                    anchor,
                    tag,
                    implicit: (implicit, false),
                    value: String::new(),
                    style: None,
                },
                start,
                end,
            ));
        }

        let context = if block {
            "while parsing a block node"
        } else {
            "while parsing a flow node"
        };
        Err(Error::parser(
            Some((context, start)),
            format!("expected the node content, but found {}", found),
            found_start,
        ))
    }

    // ------------------------------------------------------------------
    // Block collections
    // ------------------------------------------------------------------

    fn parse_block_sequence_entry(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::BlockEntry))? {
            let token = self.next_token()?;
            if self.check(|k| matches!(k, TokenKind::BlockEntry | TokenKind::BlockEnd))? {
                self.state = State::BlockSequenceEntry;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::BlockSequenceEntry);
            return self.parse_node(true, false);
        }
        if !self.check(|k| matches!(k, TokenKind::BlockEnd))? {
            return Err(self.unexpected("while parsing a block collection", "expected <block end>"));
        }
        let token = self.next_token()?;
        self.pop_state();
        self.marks.pop();
        Ok(Event::new(EventKind::SequenceEnd, token.start, token.end))
    }

    fn parse_indentless_sequence_entry(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::BlockEntry))? {
            let token = self.next_token()?;
            let empty = self.check(|k| {
                matches!(
                    k,
                    TokenKind::BlockEntry | TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd
                )
            })?;
            if empty {
                self.state = State::IndentlessSequenceEntry;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::IndentlessSequenceEntry);
            return self.parse_node(true, false);
        }
        let mark = self.peek_token()?.start.clone();
        self.pop_state();
        Ok(Event::new(EventKind::SequenceEnd, mark.clone(), mark))
    }

    fn parse_block_mapping_key(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::Key))? {
            let token = self.next_token()?;
            if self.check(|k| matches!(k, TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd))? {
                self.state = State::BlockMappingValue;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::BlockMappingValue);
            return self.parse_node(true, true);
        }
        if !self.check(|k| matches!(k, TokenKind::BlockEnd))? {
            return Err(self.unexpected("while parsing a block mapping", "expected <block end>"));
        }
        let token = self.next_token()?;
        self.pop_state();
        self.marks.pop();
        Ok(Event::new(EventKind::MappingEnd, token.start, token.end))
    }

    fn parse_block_mapping_value(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::Value))? {
            let token = self.next_token()?;
            if self.check(|k| matches!(k, TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd))? {
                self.state = State::BlockMappingKey;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::BlockMappingKey);
            return self.parse_node(true, true);
        }
        self.state = State::BlockMappingKey;
        let mark = self.peek_token()?.start.clone();
        Ok(empty_scalar(mark))
    }

    // ------------------------------------------------------------------
    // Flow collections
    // ------------------------------------------------------------------

    fn parse_flow_sequence_entry(&mut self, first: bool) -> Result<Event> {
        if !self.check(|k| matches!(k, TokenKind::FlowSequenceEnd))? {
            if !first {
                if self.check(|k| matches!(k, TokenKind::FlowEntry))? {
                    self.next_token()?;
                } else {
                    return Err(self.unexpected("while parsing a flow sequence", "expected ',' or ']'"));
                }
            }
            if self.check(|k| matches!(k, TokenKind::Key))? {
                // A single `key: value` pair inside a flow sequence.
                let token = self.peek_token()?;
                let (start, end) = (token.start.clone(), token.end.clone());
                self.state = State::FlowSequenceEntryMappingKey;
                return Ok(Event::new(
                    EventKind::MappingStart {
                        anchor: None,
                        tag: None,
                        implicit: true,
                        flow_style: true,
                    },
                    start,
                    end,
                ));
            }
            if !self.check(|k| matches!(k, TokenKind::FlowSequenceEnd))? {
                self.states.push(State::FlowSequenceEntry);
                return self.parse_node(false, false);
            }
        }
        let token = self.next_token()?;
        self.pop_state();
        self.marks.pop();
        Ok(Event::new(EventKind::SequenceEnd, token.start, token.end))
    }

    fn parse_flow_sequence_entry_mapping_key(&mut self) -> Result<Event> {
        let token = self.next_token()?;
        let empty = self.check(|k| {
            matches!(
                k,
                TokenKind::Value | TokenKind::FlowEntry | TokenKind::FlowSequenceEnd
            )
        })?;
        if empty {
            self.state = State::FlowSequenceEntryMappingValue;
            return Ok(empty_scalar(token.end));
        }
        self.states.push(State::FlowSequenceEntryMappingValue);
        self.parse_node(false, false)
    }

    fn parse_flow_sequence_entry_mapping_value(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::Value))? {
            let token = self.next_token()?;
            if self.check(|k| matches!(k, TokenKind::FlowEntry | TokenKind::FlowSequenceEnd))? {
                self.state = State::FlowSequenceEntryMappingEnd;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::FlowSequenceEntryMappingEnd);
            return self.parse_node(false, false);
        }
        self.state = State::FlowSequenceEntryMappingEnd;
        let mark = self.peek_token()?.start.clone();
        Ok(empty_scalar(mark))
    }

    fn parse_flow_mapping_key(&mut self, first: bool) -> Result<Event> {
        if !self.check(|k| matches!(k, TokenKind::FlowMappingEnd))? {
            if !first {
                if self.check(|k| matches!(k, TokenKind::FlowEntry))? {
                    self.next_token()?;
                } else {
                    return Err(self.unexpected("while parsing a flow mapping", "expected ',' or '}'"));
                }
            }
            if self.check(|k| matches!(k, TokenKind::Key))? {
                let token = self.next_token()?;
                let empty = self.check(|k| {
                    matches!(
                        k,
                        TokenKind::Value | TokenKind::FlowEntry | TokenKind::FlowMappingEnd
                    )
                })?;
                if empty {
                    self.state = State::FlowMappingValue;
                    return Ok(empty_scalar(token.end));
                }
                self.states.push(State::FlowMappingValue);
                return self.parse_node(false, false);
            }
            if !self.check(|k| matches!(k, TokenKind::FlowMappingEnd))? {
                self.states.push(State::FlowMappingEmptyValue);
                return self.parse_node(false, false);
            }
        }
        let token = self.next_token()?;
        self.pop_state();
        self.marks.pop();
        Ok(Event::new(EventKind::MappingEnd, token.start, token.end))
    }

    fn parse_flow_mapping_value(&mut self) -> Result<Event> {
        if self.check(|k| matches!(k, TokenKind::Value))? {
            let token = self.next_token()?;
            if self.check(|k| matches!(k, TokenKind::FlowEntry | TokenKind::FlowMappingEnd))? {
                self.state = State::FlowMappingKey;
                return Ok(empty_scalar(token.end));
            }
            self.states.push(State::FlowMappingKey);
            return self.parse_node(false, false);
        }
        self.state = State::FlowMappingKey;
        let mark = self.peek_token()?.start.clone();
        Ok(empty_scalar(mark))
    }
}

/// An empty plain scalar standing in for a missing node.
fn empty_scalar(mark: Mark) -> Event {
    Event::new(
        EventKind::Scalar {
            anchor: None,
            tag: None,
            implicit: (true, false),
            value: String::new(),
            style: None,
        },
        mark.clone(),
        mark,
    )
}

impl Iterator for Parser<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.get_event() {
            Ok(event) => event.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
