//! Stage 9: Emitter
//!
//! The emitter writes an event stream as text. Like the parser it is an
//! explicit state machine with a stack of return states. It holds back
//! collection and document starts until enough following events are queued
//! to tell whether the collection is empty or fits on one key line.
//!
//! Scalars are analyzed once to find which styles can carry their text, and
//! each style has its own writer with wrapping and indentation rules.

use std::collections::VecDeque;
use std::io::Write;

use tracing::trace;

use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::options::EncodeOptions;
use crate::parser::DEFAULT_TAG_PREFIX;
use crate::tokens::ScalarStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StreamStart,
    FirstDocumentStart,
    DocumentStart,
    DocumentEnd,
    DocumentRoot,
    FirstFlowSequenceItem,
    FlowSequenceItem,
    FirstFlowMappingKey,
    FlowMappingKey,
    FlowMappingSimpleValue,
    FlowMappingValue,
    FirstBlockSequenceItem,
    BlockSequenceItem,
    FirstBlockMappingKey,
    BlockMappingKey,
    BlockMappingSimpleValue,
    BlockMappingValue,
    Nothing,
}

/// Which styles can represent a scalar's text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScalarAnalysis {
    empty: bool,
    multiline: bool,
    allow_flow_plain: bool,
    allow_block_plain: bool,
    allow_single_quoted: bool,
    allow_block: bool,
}

fn is_break(ch: char) -> bool {
    ch == '\n'
}

fn is_space_or_end(ch: Option<char>) -> bool {
    matches!(ch, None | Some('\0' | ' ' | '\t' | '\r' | '\n' | '\u{85}'))
}

fn analyze_scalar(text: &str, allow_unicode: bool) -> ScalarAnalysis {
    if text.is_empty() {
        return ScalarAnalysis {
            empty: true,
            multiline: false,
            allow_flow_plain: false,
            allow_block_plain: true,
            allow_single_quoted: true,
            allow_block: false,
        };
    }
    let chars: Vec<char> = text.chars().collect();
    let mut block_indicators = false;
    let mut flow_indicators = false;
    let mut line_breaks = false;
    let mut special_characters = false;

    let mut leading_space = false;
    let mut leading_break = false;
    let mut trailing_space = false;
    let mut trailing_break = false;
    let mut break_space = false;
    let mut space_break = false;
    let mut previous_space = false;
    let mut previous_break = false;

    if text.starts_with("---") || text.starts_with("...") {
        block_indicators = true;
        flow_indicators = true;
    }
    let mut preceded_by_whitespace = true;
    let mut followed_by_whitespace = is_space_or_end(chars.get(1).copied());
    let last = chars.len() - 1;

    for (index, &ch) in chars.iter().enumerate() {
        if index == 0 {
            if "#,[]{}&*!|>'\"%@`".contains(ch) {
                flow_indicators = true;
                block_indicators = true;
            }
            if ch == '?' || ch == ':' {
                flow_indicators = true;
                if followed_by_whitespace {
                    block_indicators = true;
                }
            }
            if ch == '-' && followed_by_whitespace {
                flow_indicators = true;
                block_indicators = true;
            }
        } else {
            if ",?[]{}".contains(ch) {
                flow_indicators = true;
            }
            if ch == ':' {
                flow_indicators = true;
                if followed_by_whitespace {
                    block_indicators = true;
                }
            }
            if ch == '#' && preceded_by_whitespace {
                flow_indicators = true;
                block_indicators = true;
            }
        }

        if is_break(ch) {
            line_breaks = true;
        }
        if !(ch == '\n' || (' '..='~').contains(&ch)) {
            let printable = matches!(ch, '\u{A0}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
                && ch != '\u{FEFF}';
            if !printable || !allow_unicode {
                special_characters = true;
            }
        }

        if ch == ' ' {
            if index == 0 {
                leading_space = true;
            }
            if index == last {
                trailing_space = true;
            }
            if previous_break {
                break_space = true;
            }
            previous_space = true;
            previous_break = false;
        } else if is_break(ch) {
            if index == 0 {
                leading_break = true;
            }
            if index == last {
                trailing_break = true;
            }
            if previous_space {
                space_break = true;
            }
            previous_space = false;
            previous_break = true;
        } else {
            previous_space = false;
            previous_break = false;
        }

        preceded_by_whitespace = is_space_or_end(Some(ch));
        followed_by_whitespace = is_space_or_end(chars.get(index + 2).copied());
    }

    let mut allow_flow_plain = true;
    let mut allow_block_plain = true;
    let mut allow_single_quoted = true;
    let mut allow_block = true;

    if leading_space || leading_break || trailing_space || trailing_break {
        allow_flow_plain = false;
        allow_block_plain = false;
    }
    if trailing_space {
        allow_block = false;
    }
    if break_space {
        allow_flow_plain = false;
        allow_block_plain = false;
        allow_single_quoted = false;
    }
    if space_break || special_characters {
        allow_flow_plain = false;
        allow_block_plain = false;
        allow_single_quoted = false;
        allow_block = false;
    }
    if line_breaks {
        allow_flow_plain = false;
        allow_block_plain = false;
    }
    if flow_indicators {
        allow_flow_plain = false;
    }
    if block_indicators {
        allow_block_plain = false;
    }

    ScalarAnalysis {
        empty: false,
        multiline: line_breaks,
        allow_flow_plain,
        allow_block_plain,
        allow_single_quoted,
        allow_block,
    }
}

fn escape(ch: char) -> Option<char> {
    Some(match ch {
        '\0' => '0',
        '\x07' => 'a',
        '\x08' => 'b',
        '\t' => 't',
        '\n' => 'n',
        '\x0B' => 'v',
        '\x0C' => 'f',
        '\r' => 'r',
        '\x1B' => 'e',
        '"' => '"',
        '\\' => '\\',
        '\u{85}' => 'N',
        '\u{A0}' => '_',
        '\u{2028}' => 'L',
        '\u{2029}' => 'P',
        _ => return None,
    })
}

fn event_name(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::StreamStart => "StreamStart",
        EventKind::StreamEnd => "StreamEnd",
        EventKind::DocumentStart { .. } => "DocumentStart",
        EventKind::DocumentEnd { .. } => "DocumentEnd",
        EventKind::Alias { .. } => "Alias",
        EventKind::Scalar { .. } => "Scalar",
        EventKind::SequenceStart { .. } => "SequenceStart",
        EventKind::SequenceEnd => "SequenceEnd",
        EventKind::MappingStart { .. } => "MappingStart",
        EventKind::MappingEnd => "MappingEnd",
    }
}

fn unexpected(expected: &str, event: &Event) -> Error {
    Error::Emitter(format!("expected {}, but got {}", expected, event_name(&event.kind)))
}

pub struct Emitter<W: Write> {
    writer: W,
    written: usize,

    states: Vec<State>,
    state: State,
    events: VecDeque<Event>,

    indents: Vec<Option<usize>>,
    indent: Option<usize>,
    flow_level: usize,

    root_context: bool,
    sequence_context: bool,
    mapping_context: bool,
    simple_key_context: bool,

    line: usize,
    column: usize,
    whitespace: bool,
    indention: bool,
    open_ended: bool,

    canonical: bool,
    allow_unicode: bool,
    best_indent: usize,
    best_width: usize,
    best_line_break: &'static str,

    /// Prefix to handle, for shortening tags.
    tag_prefixes: Vec<(String, String)>,

    prepared_anchor: Option<String>,
    prepared_tag: Option<String>,
    analysis: Option<ScalarAnalysis>,
    style: Option<ScalarStyle>,
}

impl<W: Write> Emitter<W> {
    pub fn new(writer: W, options: &EncodeOptions) -> Self {
        Self {
            writer,
            written: 0,
            states: Vec::new(),
            state: State::StreamStart,
            events: VecDeque::new(),
            indents: Vec::new(),
            indent: None,
            flow_level: 0,
            root_context: false,
            sequence_context: false,
            mapping_context: false,
            simple_key_context: false,
            line: 0,
            column: 0,
            whitespace: true,
            indention: true,
            open_ended: false,
            canonical: options.canonical,
            allow_unicode: options.allow_unicode,
            best_indent: options.effective_indent(),
            best_width: options.effective_width(),
            best_line_break: options.line_break.as_str(),
            tag_prefixes: Vec::new(),
            prepared_anchor: None,
            prepared_tag: None,
            analysis: None,
            style: None,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Lines started so far.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn emit(&mut self, event: Event) -> Result<()> {
        self.events.push_back(event);
        while !self.need_more_events() {
            let Some(event) = self.events.pop_front() else {
                break;
            };
            self.step(&event)?;
        }
        Ok(())
    }

    /// Document starts wait for one more event, sequence starts for two and
    /// mapping starts for three, unless the enclosing node ends first.
    fn need_more_events(&self) -> bool {
        let Some(first) = self.events.front() else {
            return true;
        };
        let count = match first.kind {
            EventKind::DocumentStart { .. } => 1,
            EventKind::SequenceStart { .. } => 2,
            EventKind::MappingStart { .. } => 3,
            _ => return false,
        };
        let mut level: isize = 0;
        for event in self.events.iter().skip(1) {
            match event.kind {
                EventKind::DocumentStart { .. }
                | EventKind::SequenceStart { .. }
                | EventKind::MappingStart { .. } => level += 1,
                EventKind::DocumentEnd { .. } | EventKind::SequenceEnd | EventKind::MappingEnd => {
                    level -= 1
                }
                EventKind::StreamEnd => level = -1,
                _ => {}
            }
            if level < 0 {
                return false;
            }
        }
        self.events.len() < count + 1
    }

    fn increase_indent(&mut self, flow: bool, indentless: bool) {
        self.indents.push(self.indent);
        self.indent = match self.indent {
            None if flow => Some(self.best_indent),
            None => Some(0),
            Some(indent) if !indentless => Some(indent + self.best_indent),
            Some(indent) => Some(indent),
        };
    }

    fn pop_indent(&mut self) {
        self.indent = self.indents.pop().flatten();
    }

    fn pop_state(&mut self) {
        self.state = self.states.pop().unwrap_or(State::Nothing);
    }

    fn step(&mut self, event: &Event) -> Result<()> {
        match self.state {
            State::StreamStart => self.expect_stream_start(event),
            State::FirstDocumentStart => self.expect_document_start(event, true),
            State::DocumentStart => self.expect_document_start(event, false),
            State::DocumentEnd => self.expect_document_end(event),
            State::DocumentRoot => self.expect_document_root(event),
            State::FirstFlowSequenceItem => self.expect_flow_sequence_item(event, true),
            State::FlowSequenceItem => self.expect_flow_sequence_item(event, false),
            State::FirstFlowMappingKey => self.expect_flow_mapping_key(event, true),
            State::FlowMappingKey => self.expect_flow_mapping_key(event, false),
            State::FlowMappingSimpleValue => self.expect_flow_mapping_simple_value(event),
            State::FlowMappingValue => self.expect_flow_mapping_value(event),
            State::FirstBlockSequenceItem => self.expect_block_sequence_item(event, true),
            State::BlockSequenceItem => self.expect_block_sequence_item(event, false),
            State::FirstBlockMappingKey => self.expect_block_mapping_key(event, true),
            State::BlockMappingKey => self.expect_block_mapping_key(event, false),
            State::BlockMappingSimpleValue => self.expect_block_mapping_simple_value(event),
            State::BlockMappingValue => self.expect_block_mapping_value(event),
            State::Nothing => Err(unexpected("nothing", event)),
        }
    }

    // Stream and document handlers.

    fn expect_stream_start(&mut self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::StreamStart => {
                self.state = State::FirstDocumentStart;
                Ok(())
            }
            _ => Err(unexpected("StreamStart", event)),
        }
    }

    fn expect_document_start(&mut self, event: &Event, first: bool) -> Result<()> {
        match &event.kind {
            EventKind::DocumentStart {
                explicit,
                version,
                tags,
            } => {
                if (version.is_some() || !tags.is_empty()) && self.open_ended {
                    self.write_indicator("...", true, false, false)?;
                    self.write_indent()?;
                }
                if let Some(version) = version {
                    let text = prepare_version(*version)?;
                    self.write_directive(&format!("%YAML {}", text))?;
                }
                self.tag_prefixes = vec![
                    ("!".to_string(), "!".to_string()),
                    (DEFAULT_TAG_PREFIX.to_string(), "!!".to_string()),
                ];
                let mut sorted = tags.clone();
                sorted.sort();
                for (handle, prefix) in sorted {
                    let handle_text = prepare_tag_handle(&handle)?;
                    let prefix_text = prepare_tag_prefix(&prefix)?;
                    self.write_directive(&format!("%TAG {} {}", handle_text, prefix_text))?;
                    self.tag_prefixes.retain(|(p, _)| *p != prefix);
                    self.tag_prefixes.push((prefix, handle));
                }
                let implicit = first
                    && !explicit
                    && !self.canonical
                    && version.is_none()
                    && tags.is_empty()
                    && !self.check_empty_document(event);
                if !implicit {
                    self.write_indent()?;
                    self.write_indicator("---", true, false, false)?;
                    if self.canonical {
                        self.write_indent()?;
                    }
                }
                self.state = State::DocumentRoot;
                Ok(())
            }
            EventKind::StreamEnd => {
                if self.open_ended {
                    self.write_indicator("...", true, false, false)?;
                    self.write_indent()?;
                }
                self.writer.flush()?;
                self.state = State::Nothing;
                Ok(())
            }
            _ => Err(unexpected("DocumentStart", event)),
        }
    }

    fn expect_document_end(&mut self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::DocumentEnd { explicit } => {
                self.write_indent()?;
                if explicit {
                    self.write_indicator("...", true, false, false)?;
                    self.write_indent()?;
                }
                self.writer.flush()?;
                self.state = State::DocumentStart;
                Ok(())
            }
            _ => Err(unexpected("DocumentEnd", event)),
        }
    }

    fn expect_document_root(&mut self, event: &Event) -> Result<()> {
        self.states.push(State::DocumentEnd);
        self.expect_node(event, true, false, false, false)
    }

    // Node handlers.

    fn expect_node(
        &mut self,
        event: &Event,
        root: bool,
        sequence: bool,
        mapping: bool,
        simple_key: bool,
    ) -> Result<()> {
        self.root_context = root;
        self.sequence_context = sequence;
        self.mapping_context = mapping;
        self.simple_key_context = simple_key;
        match &event.kind {
            EventKind::Alias { .. } => self.expect_alias(event),
            EventKind::Scalar { .. } => {
                self.process_anchor(event, "&")?;
                self.process_tag(event)?;
                self.expect_scalar(event)
            }
            EventKind::SequenceStart { flow_style, .. } => {
                self.process_anchor(event, "&")?;
                self.process_tag(event)?;
                if self.flow_level > 0 || self.canonical || *flow_style || self.check_empty_sequence(event) {
                    self.expect_flow_sequence()
                } else {
                    self.expect_block_sequence();
                    Ok(())
                }
            }
            EventKind::MappingStart { flow_style, .. } => {
                self.process_anchor(event, "&")?;
                self.process_tag(event)?;
                if self.flow_level > 0 || self.canonical || *flow_style || self.check_empty_mapping(event) {
                    self.expect_flow_mapping()
                } else {
                    self.increase_indent(false, false);
                    self.state = State::FirstBlockMappingKey;
                    Ok(())
                }
            }
            _ => Err(unexpected("a node", event)),
        }
    }

    fn expect_alias(&mut self, event: &Event) -> Result<()> {
        self.process_anchor(event, "*")?;
        self.pop_state();
        Ok(())
    }

    fn expect_scalar(&mut self, event: &Event) -> Result<()> {
        self.increase_indent(true, false);
        self.process_scalar(event)?;
        self.pop_indent();
        self.pop_state();
        Ok(())
    }

    // Flow sequence handlers.

    fn expect_flow_sequence(&mut self) -> Result<()> {
        self.write_indicator("[", true, true, false)?;
        self.flow_level += 1;
        self.increase_indent(true, false);
        self.state = State::FirstFlowSequenceItem;
        Ok(())
    }

    fn expect_flow_sequence_item(&mut self, event: &Event, first: bool) -> Result<()> {
        if let EventKind::SequenceEnd = event.kind {
            self.pop_indent();
            self.flow_level -= 1;
            if self.canonical && !first {
                self.write_indicator(",", false, false, false)?;
                self.write_indent()?;
            }
            self.write_indicator("]", false, false, false)?;
            self.pop_state();
            return Ok(());
        }
        if !first {
            self.write_indicator(",", false, false, false)?;
        }
        if self.canonical || self.column > self.best_width {
            self.write_indent()?;
        }
        self.states.push(State::FlowSequenceItem);
        self.expect_node(event, false, true, false, false)
    }

    // Flow mapping handlers.

    fn expect_flow_mapping(&mut self) -> Result<()> {
        self.write_indicator("{", true, true, false)?;
        self.flow_level += 1;
        self.increase_indent(true, false);
        self.state = State::FirstFlowMappingKey;
        Ok(())
    }

    fn expect_flow_mapping_key(&mut self, event: &Event, first: bool) -> Result<()> {
        if let EventKind::MappingEnd = event.kind {
            self.pop_indent();
            self.flow_level -= 1;
            if self.canonical && !first {
                self.write_indicator(",", false, false, false)?;
                self.write_indent()?;
            }
            self.write_indicator("}", false, false, false)?;
            self.pop_state();
            return Ok(());
        }
        if !first {
            self.write_indicator(",", false, false, false)?;
        }
        if self.canonical || self.column > self.best_width {
            self.write_indent()?;
        }
        if !self.canonical && self.check_simple_key(event)? {
            self.states.push(State::FlowMappingSimpleValue);
            self.expect_node(event, false, false, true, true)
        } else {
            self.write_indicator("?", true, false, false)?;
            self.states.push(State::FlowMappingValue);
            self.expect_node(event, false, false, true, false)
        }
    }

    fn expect_flow_mapping_simple_value(&mut self, event: &Event) -> Result<()> {
        self.write_indicator(":", false, false, false)?;
        self.states.push(State::FlowMappingKey);
        self.expect_node(event, false, false, true, false)
    }

    fn expect_flow_mapping_value(&mut self, event: &Event) -> Result<()> {
        if self.canonical || self.column > self.best_width {
            self.write_indent()?;
        }
        self.write_indicator(":", true, false, false)?;
        self.states.push(State::FlowMappingKey);
        self.expect_node(event, false, false, true, false)
    }

    // Block sequence handlers.

    fn expect_block_sequence(&mut self) {
        let indentless = self.mapping_context && !self.indention;
        self.increase_indent(false, indentless);
        self.state = State::FirstBlockSequenceItem;
    }

    fn expect_block_sequence_item(&mut self, event: &Event, first: bool) -> Result<()> {
        if !first && matches!(event.kind, EventKind::SequenceEnd) {
            self.pop_indent();
            self.pop_state();
            return Ok(());
        }
        self.write_indent()?;
        self.write_indicator("-", true, false, true)?;
        self.states.push(State::BlockSequenceItem);
        self.expect_node(event, false, true, false, false)
    }

    // Block mapping handlers.

    fn expect_block_mapping_key(&mut self, event: &Event, first: bool) -> Result<()> {
        if !first && matches!(event.kind, EventKind::MappingEnd) {
            self.pop_indent();
            self.pop_state();
            return Ok(());
        }
        self.write_indent()?;
        if self.check_simple_key(event)? {
            self.states.push(State::BlockMappingSimpleValue);
            self.expect_node(event, false, false, true, true)
        } else {
            self.write_indicator("?", true, false, true)?;
            self.states.push(State::BlockMappingValue);
            self.expect_node(event, false, false, true, false)
        }
    }

    fn expect_block_mapping_simple_value(&mut self, event: &Event) -> Result<()> {
        self.write_indicator(":", false, false, false)?;
        self.states.push(State::BlockMappingKey);
        self.expect_node(event, false, false, true, false)
    }

    fn expect_block_mapping_value(&mut self, event: &Event) -> Result<()> {
        self.write_indent()?;
        self.write_indicator(":", true, false, true)?;
        self.states.push(State::BlockMappingKey);
        self.expect_node(event, false, false, true, false)
    }

    // Checkers.

    fn check_empty_sequence(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::SequenceStart { .. })
            && matches!(self.events.front().map(|e| &e.kind), Some(EventKind::SequenceEnd))
    }

    fn check_empty_mapping(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::MappingStart { .. })
            && matches!(self.events.front().map(|e| &e.kind), Some(EventKind::MappingEnd))
    }

    fn check_empty_document(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::DocumentStart { .. }) {
            return false;
        }
        matches!(
            self.events.front().map(|e| &e.kind),
            Some(EventKind::Scalar { anchor: None, tag: None, value, .. }) if value.is_empty()
        )
    }

    /// Whether the node fits on a single key line: an alias, a short
    /// one-line scalar, or an empty collection.
    fn check_simple_key(&mut self, event: &Event) -> Result<bool> {
        let mut length = 0;
        if let Some(anchor) = event.kind.anchor() {
            if self.prepared_anchor.is_none() {
                self.prepared_anchor = Some(prepare_anchor(anchor)?);
            }
            length += self.prepared_anchor.as_deref().map_or(0, str::len);
        }
        if let Some(tag) = event.kind.tag() {
            if self.prepared_tag.is_none() {
                self.prepared_tag = Some(self.prepare_tag(tag)?);
            }
            length += self.prepared_tag.as_deref().map_or(0, str::len);
        }
        let mut simple_scalar = false;
        if let EventKind::Scalar { value, .. } = &event.kind {
            let analysis = self.analysis(value);
            length += value.chars().count();
            simple_scalar = !analysis.empty && !analysis.multiline;
        }
        Ok(length < 128
            && (matches!(event.kind, EventKind::Alias { .. })
                || simple_scalar
                || self.check_empty_sequence(event)
                || self.check_empty_mapping(event)))
    }

    fn analysis(&mut self, value: &str) -> ScalarAnalysis {
        let allow_unicode = self.allow_unicode;
        self.analysis
            .get_or_insert_with(|| analyze_scalar(value, allow_unicode))
            .clone()
    }

    // Anchor, tag and scalar processors.

    fn process_anchor(&mut self, event: &Event, indicator: &str) -> Result<()> {
        let Some(anchor) = event.kind.anchor() else {
            if matches!(event.kind, EventKind::Alias { .. }) {
                return Err(Error::Emitter("anchor is not specified for alias".into()));
            }
            self.prepared_anchor = None;
            return Ok(());
        };
        let prepared = match self.prepared_anchor.take() {
            Some(prepared) => prepared,
            None => prepare_anchor(anchor)?,
        };
        self.write_indicator(&format!("{}{}", indicator, prepared), true, false, false)
    }

    fn process_tag(&mut self, event: &Event) -> Result<()> {
        let mut tag = event.kind.tag().map(str::to_string);
        match &event.kind {
            EventKind::Scalar { implicit, .. } => {
                if self.style.is_none() {
                    self.style = Some(self.choose_scalar_style(event));
                }
                let plain = self.style == Some(ScalarStyle::Plain);
                if (!self.canonical || tag.is_none()) && ((plain && implicit.0) || (!plain && implicit.1)) {
                    self.prepared_tag = None;
                    return Ok(());
                }
                if implicit.0 && tag.is_none() {
                    tag = Some("!".to_string());
                    self.prepared_tag = None;
                }
            }
            EventKind::SequenceStart { implicit, .. } | EventKind::MappingStart { implicit, .. } => {
                if (!self.canonical || tag.is_none()) && *implicit {
                    self.prepared_tag = None;
                    return Ok(());
                }
            }
            _ => {}
        }
        let Some(tag) = tag else {
            return Err(Error::Emitter("tag is not specified".into()));
        };
        let prepared = match self.prepared_tag.take() {
            Some(prepared) => prepared,
            None => self.prepare_tag(&tag)?,
        };
        if !prepared.is_empty() {
            self.write_indicator(&prepared, true, false, false)?;
        }
        Ok(())
    }

    fn choose_scalar_style(&mut self, event: &Event) -> ScalarStyle {
        let EventKind::Scalar {
            value,
            style,
            implicit,
            ..
        } = &event.kind
        else {
            return ScalarStyle::DoubleQuoted;
        };
        let analysis = self.analysis(value);
        let requested = style.filter(|s| *s != ScalarStyle::Plain);
        if requested == Some(ScalarStyle::DoubleQuoted) || self.canonical {
            return ScalarStyle::DoubleQuoted;
        }
        let awkward_key = self.simple_key_context && (analysis.empty || analysis.multiline);
        if requested.is_none() && implicit.0 && !awkward_key {
            let plain_ok = if self.flow_level > 0 {
                analysis.allow_flow_plain
            } else {
                analysis.allow_block_plain
            };
            if plain_ok {
                return ScalarStyle::Plain;
            }
        }
        if let Some(block @ (ScalarStyle::Literal | ScalarStyle::Folded)) = requested {
            if self.flow_level == 0 && !self.simple_key_context && analysis.allow_block {
                return block;
            }
        }
        if matches!(requested, None | Some(ScalarStyle::SingleQuoted))
            && analysis.allow_single_quoted
            && !(self.simple_key_context && analysis.multiline)
        {
            return ScalarStyle::SingleQuoted;
        }
        if analysis.multiline
            && analysis.allow_block
            && self.flow_level == 0
            && !self.simple_key_context
            && !value.split('\n').any(|line| line.starts_with(' '))
        {
            return ScalarStyle::Literal;
        }
        ScalarStyle::DoubleQuoted
    }

    fn process_scalar(&mut self, event: &Event) -> Result<()> {
        let EventKind::Scalar { value, .. } = &event.kind else {
            return Ok(());
        };
        let style = match self.style.take() {
            Some(style) => style,
            None => self.choose_scalar_style(event),
        };
        trace!(?style, length = value.len(), "writing scalar");
        let split = !self.simple_key_context;
        let text: Vec<char> = value.chars().collect();
        match style {
            ScalarStyle::DoubleQuoted => self.write_double_quoted(&text, split)?,
            ScalarStyle::SingleQuoted => self.write_single_quoted(&text, split)?,
            ScalarStyle::Folded => self.write_folded(&text)?,
            ScalarStyle::Literal => self.write_literal(&text)?,
            ScalarStyle::Plain => self.write_plain(&text, split)?,
        }
        self.analysis = None;
        Ok(())
    }

    /// Shorten a tag with the longest matching registered prefix, or write
    /// it verbatim.
    fn prepare_tag(&self, tag: &str) -> Result<String> {
        if tag.is_empty() {
            return Err(Error::Emitter("tag must not be empty".into()));
        }
        if tag == "!" {
            return Ok(tag.to_string());
        }
        let mut handle: Option<&str> = None;
        let mut suffix = tag;
        let mut best = 0;
        for (prefix, prefix_handle) in &self.tag_prefixes {
            if tag.starts_with(prefix.as_str())
                && (prefix == "!" || prefix.len() < tag.len())
                && prefix.len() >= best
            {
                best = prefix.len();
                handle = Some(prefix_handle);
                suffix = &tag[prefix.len()..];
            }
        }
        let mut text = String::new();
        for ch in suffix.chars() {
            if ch.is_ascii_alphanumeric()
                || "-;/?:@&=+$,_.~*'()[]".contains(ch)
                || (ch == '!' && handle != Some("!"))
            {
                text.push(ch);
            } else {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    text.push_str(&format!("%{:02X}", byte));
                }
            }
        }
        Ok(match handle {
            Some(handle) => format!("{}{}", handle, text),
            None => format!("!<{}>", text),
        })
    }

    // Writers.

    fn write_raw(&mut self, data: &str) -> Result<()> {
        self.writer.write_all(data.as_bytes())?;
        self.written += data.len();
        Ok(())
    }

    /// Write text that continues the current line.
    fn write_text(&mut self, data: &[char]) -> Result<()> {
        let data: String = data.iter().collect();
        self.column += data.chars().count();
        self.write_raw(&data)
    }

    fn write_indicator(
        &mut self,
        indicator: &str,
        need_whitespace: bool,
        whitespace: bool,
        indention: bool,
    ) -> Result<()> {
        let data = if self.whitespace || !need_whitespace {
            indicator.to_string()
        } else {
            format!(" {}", indicator)
        };
        self.whitespace = whitespace;
        self.indention = self.indention && indention;
        self.column += data.chars().count();
        self.open_ended = false;
        self.write_raw(&data)
    }

    fn write_indent(&mut self) -> Result<()> {
        let indent = self.indent.unwrap_or(0);
        if !self.indention || self.column > indent || (self.column == indent && !self.whitespace) {
            self.write_line_break()?;
        }
        if self.column < indent {
            self.whitespace = true;
            let data = " ".repeat(indent - self.column);
            self.column = indent;
            self.write_raw(&data)?;
        }
        Ok(())
    }

    fn write_line_break(&mut self) -> Result<()> {
        self.whitespace = true;
        self.indention = true;
        self.line += 1;
        self.column = 0;
        self.write_raw(self.best_line_break)
    }

    fn write_directive(&mut self, data: &str) -> Result<()> {
        self.write_raw(data)?;
        self.write_line_break()
    }

    fn write_single_quoted(&mut self, text: &[char], split: bool) -> Result<()> {
        self.write_indicator("'", true, false, false)?;
        let mut spaces = false;
        let mut breaks = false;
        let (mut start, mut end) = (0, 0);
        while end <= text.len() {
            let ch = text.get(end).copied();
            if spaces {
                if ch != Some(' ') {
                    if start + 1 == end && self.column > self.best_width && split && start != 0 && end != text.len() {
                        self.write_indent()?;
                    } else {
                        self.write_text(&text[start..end])?;
                    }
                    start = end;
                }
            } else if breaks {
                if !ch.is_some_and(is_break) {
                    if text[start] == '\n' {
                        self.write_line_break()?;
                    }
                    for _ in start..end {
                        self.write_line_break()?;
                    }
                    self.write_indent()?;
                    start = end;
                }
            } else if matches!(ch, None | Some(' ' | '\n' | '\'')) && start < end {
                self.write_text(&text[start..end])?;
                start = end;
            }
            if ch == Some('\'') {
                self.column += 2;
                self.write_raw("''")?;
                start = end + 1;
            }
            if let Some(ch) = ch {
                spaces = ch == ' ';
                breaks = is_break(ch);
            }
            end += 1;
        }
        self.write_indicator("'", false, false, false)
    }

    fn write_double_quoted(&mut self, text: &[char], split: bool) -> Result<()> {
        self.write_indicator("\"", true, false, false)?;
        let (mut start, mut end) = (0, 0);
        // Set after a line break until something is written on the new line.
        let mut fresh_line = false;
        while end <= text.len() {
            let ch = text.get(end).copied();
            let needs_escape = match ch {
                None => true,
                Some(ch) => {
                    matches!(ch, '"' | '\\' | '\u{85}' | '\u{2028}' | '\u{2029}' | '\u{FEFF}')
                        || !((' '..='~').contains(&ch)
                            || (self.allow_unicode
                                && matches!(ch, '\u{A0}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')))
                }
            };
            if needs_escape {
                if start < end {
                    self.write_text(&text[start..end])?;
                    start = end;
                }
                if let Some(ch) = ch {
                    let data = match escape(ch) {
                        Some(code) => format!("\\{}", code),
                        None if (ch as u32) <= 0xFF => format!("\\x{:02X}", ch as u32),
                        None if (ch as u32) <= 0xFFFF => format!("\\u{:04X}", ch as u32),
                        None => format!("\\U{:08X}", ch as u32),
                    };
                    self.column += data.len();
                    self.write_raw(&data)?;
                    start = end + 1;
                    fresh_line = false;
                }
            }
            if 0 < end
                && end + 1 < text.len()
                && (ch == Some(' ') || start >= end)
                && !(fresh_line && start >= end)
                && self.column + end.saturating_sub(start) > self.best_width
                && split
            {
                let mut data: String = text[start.min(end)..end].iter().collect();
                data.push('\\');
                if start < end {
                    start = end;
                }
                self.column += data.chars().count();
                self.write_raw(&data)?;
                self.write_indent()?;
                self.whitespace = false;
                self.indention = false;
                fresh_line = true;
                // A leading space would be folded away, so it is written
                // as an escape and consumed here.
                if text.get(start) == Some(&' ') {
                    self.column += 2;
                    self.write_raw("\\ ")?;
                    start += 1;
                    fresh_line = false;
                }
            }
            end += 1;
        }
        self.write_indicator("\"", false, false, false)
    }

    /// Indentation indicator and chomping indicator for a block scalar.
    fn block_hints(&self, text: &[char]) -> String {
        let mut hints = String::new();
        if let Some(&first) = text.first() {
            if first == ' ' || is_break(first) {
                hints.push_str(&self.best_indent.to_string());
            }
        }
        match text {
            [] => {}
            [.., last] if !is_break(*last) => hints.push('-'),
            [_] => hints.push('+'),
            [.., before, _] if is_break(*before) => hints.push('+'),
            _ => {}
        }
        hints
    }

    fn write_folded(&mut self, text: &[char]) -> Result<()> {
        let hints = self.block_hints(text);
        self.write_indicator(&format!(">{}", hints), true, false, false)?;
        if hints.ends_with('+') {
            self.open_ended = true;
        }
        self.write_line_break()?;
        let mut leading_space = true;
        let mut spaces = false;
        let mut breaks = true;
        let (mut start, mut end) = (0, 0);
        while end <= text.len() {
            let ch = text.get(end).copied();
            if breaks {
                if !ch.is_some_and(is_break) {
                    if !leading_space && ch.is_some_and(|c| c != ' ') && text.get(start) == Some(&'\n') {
                        self.write_line_break()?;
                    }
                    leading_space = ch == Some(' ');
                    for _ in start..end {
                        self.write_line_break()?;
                    }
                    if ch.is_some() {
                        self.write_indent()?;
                    }
                    start = end;
                }
            } else if spaces {
                if ch != Some(' ') {
                    if start + 1 == end && self.column > self.best_width {
                        self.write_indent()?;
                    } else {
                        self.write_text(&text[start..end])?;
                    }
                    start = end;
                }
            } else if matches!(ch, None | Some(' ' | '\n')) {
                self.write_text(&text[start..end])?;
                if ch.is_none() {
                    self.write_line_break()?;
                }
                start = end;
            }
            if let Some(ch) = ch {
                breaks = is_break(ch);
                spaces = ch == ' ';
            }
            end += 1;
        }
        Ok(())
    }

    fn write_literal(&mut self, text: &[char]) -> Result<()> {
        let hints = self.block_hints(text);
        self.write_indicator(&format!("|{}", hints), true, false, false)?;
        if hints.ends_with('+') {
            self.open_ended = true;
        }
        self.write_line_break()?;
        let mut breaks = true;
        let (mut start, mut end) = (0, 0);
        while end <= text.len() {
            let ch = text.get(end).copied();
            if breaks {
                if !ch.is_some_and(is_break) {
                    for _ in start..end {
                        self.write_line_break()?;
                    }
                    if ch.is_some() {
                        self.write_indent()?;
                    }
                    start = end;
                }
            } else if ch.map_or(true, is_break) {
                self.write_text(&text[start..end])?;
                if ch.is_none() {
                    self.write_line_break()?;
                }
                start = end;
            }
            if let Some(ch) = ch {
                breaks = is_break(ch);
            }
            end += 1;
        }
        Ok(())
    }

    fn write_plain(&mut self, text: &[char], split: bool) -> Result<()> {
        if self.root_context {
            self.open_ended = true;
        }
        if text.is_empty() {
            return Ok(());
        }
        if !self.whitespace {
            self.column += 1;
            self.write_raw(" ")?;
        }
        self.whitespace = false;
        self.indention = false;
        let mut spaces = false;
        let mut breaks = false;
        let (mut start, mut end) = (0, 0);
        while end <= text.len() {
            let ch = text.get(end).copied();
            if spaces {
                if ch != Some(' ') {
                    if start + 1 == end && self.column > self.best_width && split {
                        self.write_indent()?;
                        self.whitespace = false;
                        self.indention = false;
                    } else {
                        self.write_text(&text[start..end])?;
                    }
                    start = end;
                }
            } else if breaks {
                if !ch.is_some_and(is_break) {
                    if text[start] == '\n' {
                        self.write_line_break()?;
                    }
                    for _ in start..end {
                        self.write_line_break()?;
                    }
                    self.write_indent()?;
                    self.whitespace = false;
                    self.indention = false;
                    start = end;
                }
            } else if matches!(ch, None | Some(' ' | '\n')) {
                self.write_text(&text[start..end])?;
                start = end;
            }
            if let Some(ch) = ch {
                spaces = ch == ' ';
                breaks = is_break(ch);
            }
            end += 1;
        }
        Ok(())
    }
}

fn prepare_version((major, minor): (u32, u32)) -> Result<String> {
    if major != 1 {
        return Err(Error::Emitter(format!("unsupported YAML version: {}.{}", major, minor)));
    }
    Ok(format!("{}.{}", major, minor))
}

fn prepare_tag_handle(handle: &str) -> Result<String> {
    if handle.is_empty() {
        return Err(Error::Emitter("tag handle must not be empty".into()));
    }
    if !handle.starts_with('!') || !handle.ends_with('!') {
        return Err(Error::Emitter(format!("tag handle must start and end with '!': {:?}", handle)));
    }
    let inner = &handle[1..handle.len().max(2) - 1];
    if let Some(ch) = inner.chars().find(|&ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')) {
        return Err(Error::Emitter(format!(
            "invalid character {:?} in the tag handle: {:?}",
            ch, handle
        )));
    }
    Ok(handle.to_string())
}

fn prepare_tag_prefix(prefix: &str) -> Result<String> {
    if prefix.is_empty() {
        return Err(Error::Emitter("tag prefix must not be empty".into()));
    }
    let mut text = String::new();
    for (i, ch) in prefix.chars().enumerate() {
        if (i == 0 && ch == '!') || ch.is_ascii_alphanumeric() || "-;/?!:@&=+$,_.~*'()[]".contains(ch) {
            text.push(ch);
        } else {
            let mut buffer = [0u8; 4];
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                text.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    Ok(text)
}

fn prepare_anchor(anchor: &str) -> Result<String> {
    if anchor.is_empty() {
        return Err(Error::Emitter("anchor must not be empty".into()));
    }
    if let Some(ch) = anchor.chars().find(|&ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')) {
        return Err(Error::Emitter(format!(
            "invalid character {:?} in the anchor: {:?}",
            ch, anchor
        )));
    }
    Ok(anchor.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LineBreak;

    fn scalar(value: &str) -> Event {
        Event::unmarked(EventKind::Scalar {
            anchor: None,
            tag: None,
            implicit: (true, true),
            value: value.to_string(),
            style: None,
        })
    }

    fn seq_start(flow_style: bool) -> Event {
        Event::unmarked(EventKind::SequenceStart {
            anchor: None,
            tag: None,
            implicit: true,
            flow_style,
        })
    }

    fn map_start(flow_style: bool) -> Event {
        Event::unmarked(EventKind::MappingStart {
            anchor: None,
            tag: None,
            implicit: true,
            flow_style,
        })
    }

    fn document(body: Vec<Event>) -> Vec<Event> {
        let mut events = vec![
            Event::unmarked(EventKind::StreamStart),
            Event::unmarked(EventKind::DocumentStart {
                explicit: false,
                version: None,
                tags: Vec::new(),
            }),
        ];
        events.extend(body);
        events.push(Event::unmarked(EventKind::DocumentEnd { explicit: false }));
        events.push(Event::unmarked(EventKind::StreamEnd));
        events
    }

    fn emit_with(events: Vec<Event>, options: &EncodeOptions) -> Result<String> {
        let mut emitter = Emitter::new(Vec::new(), options);
        for event in events {
            emitter.emit(event)?;
        }
        Ok(String::from_utf8(emitter.into_inner()).unwrap())
    }

    fn emit(events: Vec<Event>) -> String {
        emit_with(events, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn test_block_mapping() {
        let out = emit(document(vec![
            map_start(false),
            scalar("a"),
            scalar("1"),
            scalar("b"),
            seq_start(false),
            scalar("x"),
            scalar("y"),
            Event::unmarked(EventKind::SequenceEnd),
            Event::unmarked(EventKind::MappingEnd),
        ]));
        assert_eq!(out, "a: 1\nb:\n- x\n- y\n");
    }

    #[test]
    fn test_flow_collections() {
        let out = emit(document(vec![
            map_start(true),
            scalar("a"),
            seq_start(true),
            scalar("1"),
            scalar("2"),
            Event::unmarked(EventKind::SequenceEnd),
            Event::unmarked(EventKind::MappingEnd),
        ]));
        assert_eq!(out, "{a: [1, 2]}\n");
    }

    #[test]
    fn test_empty_collections_are_flow() {
        let out = emit(document(vec![
            map_start(false),
            scalar("a"),
            seq_start(false),
            Event::unmarked(EventKind::SequenceEnd),
            scalar("b"),
            map_start(false),
            Event::unmarked(EventKind::MappingEnd),
            Event::unmarked(EventKind::MappingEnd),
        ]));
        assert_eq!(out, "a: []\nb: {}\n");
    }

    #[test]
    fn test_root_plain_scalar_is_open_ended() {
        assert_eq!(emit(document(vec![scalar("foo")])), "foo\n...\n");
    }

    #[test]
    fn test_scalar_styles() {
        let out = emit(document(vec![
            seq_start(false),
            scalar("- item"),
            scalar(" padded"),
            scalar("tab\there"),
            scalar("it's"),
            scalar("one\ntwo\n"),
            Event::unmarked(EventKind::SequenceEnd),
        ]));
        assert_eq!(
            out,
            "- '- item'\n- ' padded'\n- \"tab\\there\"\n- it's\n- 'one\n\n  two\n\n  '\n"
        );
    }

    #[test]
    fn test_requested_literal() {
        let out = emit(document(vec![
            map_start(false),
            scalar("text"),
            Event::unmarked(EventKind::Scalar {
                anchor: None,
                tag: None,
                implicit: (true, true),
                value: "line one\nline two\n".to_string(),
                style: Some(ScalarStyle::Literal),
            }),
            Event::unmarked(EventKind::MappingEnd),
        ]));
        assert_eq!(out, "text: |\n  line one\n  line two\n");
    }

    #[test]
    fn test_block_hints() {
        let emitter = Emitter::new(Vec::new(), &EncodeOptions::default());
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(emitter.block_hints(&chars("a")), "-");
        assert_eq!(emitter.block_hints(&chars("a\n")), "");
        assert_eq!(emitter.block_hints(&chars("a\n\n")), "+");
        assert_eq!(emitter.block_hints(&chars(" a\n")), "2");
    }

    #[test]
    fn test_tags_and_anchors() {
        let out = emit(document(vec![
            Event::unmarked(EventKind::SequenceStart {
                anchor: Some("id001".into()),
                tag: Some("tag:yaml.org,2002:seq".into()),
                implicit: false,
                flow_style: false,
            }),
            Event::unmarked(EventKind::Scalar {
                anchor: None,
                tag: Some("!point".into()),
                implicit: (false, false),
                value: "x".into(),
                style: None,
            }),
            Event::unmarked(EventKind::Alias { anchor: "id001".into() }),
            Event::unmarked(EventKind::SequenceEnd),
        ]));
        assert_eq!(out, "&id001 !!seq\n- !point 'x'\n- *id001\n");
    }

    #[test]
    fn test_verbatim_tag() {
        let out = emit(document(vec![Event::unmarked(EventKind::Scalar {
            anchor: None,
            tag: Some("tag:example.com,2000:app/foo".into()),
            implicit: (false, false),
            value: "bar".into(),
            style: None,
        })]));
        assert_eq!(out, "!<tag:example.com,2000:app/foo> 'bar'\n");
    }

    #[test]
    fn test_directives() {
        let events = vec![
            Event::unmarked(EventKind::StreamStart),
            Event::unmarked(EventKind::DocumentStart {
                explicit: true,
                version: Some((1, 1)),
                tags: vec![("!e!".into(), "tag:example.com,2000:".into())],
            }),
            Event::unmarked(EventKind::Scalar {
                anchor: None,
                tag: Some("tag:example.com,2000:x".into()),
                implicit: (false, false),
                value: "v".into(),
                style: None,
            }),
            Event::unmarked(EventKind::DocumentEnd { explicit: true }),
            Event::unmarked(EventKind::StreamEnd),
        ];
        assert_eq!(
            emit(events),
            "%YAML 1.1\n%TAG !e! tag:example.com,2000:\n--- !e!x 'v'\n...\n"
        );
    }

    #[test]
    fn test_canonical() {
        let options = EncodeOptions::default().with_canonical(true);
        let events = document(vec![
            Event::unmarked(EventKind::SequenceStart {
                anchor: None,
                tag: Some("tag:yaml.org,2002:seq".into()),
                implicit: true,
                flow_style: false,
            }),
            Event::unmarked(EventKind::Scalar {
                anchor: None,
                tag: Some("tag:yaml.org,2002:int".into()),
                implicit: (true, false),
                value: "1".into(),
                style: None,
            }),
            Event::unmarked(EventKind::SequenceEnd),
        ]);
        assert_eq!(
            emit_with(events, &options).unwrap(),
            "---\n!!seq [\n  !!int \"1\",\n]\n"
        );
    }

    #[test]
    fn test_crlf_and_indent() {
        let options = EncodeOptions::default()
            .with_line_break(LineBreak::CrLf)
            .with_indent(4);
        let out = emit_with(
            document(vec![
                map_start(false),
                scalar("a"),
                map_start(false),
                scalar("b"),
                scalar("c"),
                Event::unmarked(EventKind::MappingEnd),
                Event::unmarked(EventKind::MappingEnd),
            ]),
            &options,
        )
        .unwrap();
        assert_eq!(out, "a:\r\n    b: c\r\n");
    }

    #[test]
    fn test_long_plain_wraps() {
        let options = EncodeOptions::default().with_width(20);
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";
        let out = emit_with(
            document(vec![seq_start(false), scalar(text), Event::unmarked(EventKind::SequenceEnd)]),
            &options,
        )
        .unwrap();
        assert!(out.lines().count() > 1, "{}", out);
        assert!(out.lines().all(|line| line.len() <= 26), "{}", out);
    }

    #[test]
    fn test_double_quoted_wrap_past_width() {
        let options = EncodeOptions::default().with_width(20).with_indent(4);
        for text in ["a\n  b", "a   \n   b", "x y\n z"] {
            let depth = 12;
            let mut body = Vec::new();
            for _ in 0..depth {
                body.push(map_start(false));
                body.push(scalar("k"));
            }
            body.push(scalar(text));
            for _ in 0..depth {
                body.push(Event::unmarked(EventKind::MappingEnd));
            }
            let out = emit_with(document(body), &options).unwrap();
            assert!(!out.contains("\\\\"), "{}", out);

            let mut value = crate::decode::decode_one(&out).unwrap();
            for _ in 0..depth {
                value = value.get("k").unwrap();
            }
            assert_eq!(value.as_str(), Some(text), "{}", out);
        }
    }

    #[test]
    fn test_errors() {
        let err = emit_with(vec![Event::unmarked(EventKind::StreamEnd)], &EncodeOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "emitter: expected StreamStart, but got StreamEnd");
        let err = emit_with(
            document(vec![Event::unmarked(EventKind::Scalar {
                anchor: Some("bad anchor".into()),
                tag: None,
                implicit: (true, true),
                value: "x".into(),
                style: None,
            })]),
            &EncodeOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid character ' ' in the anchor"));
        let err = emit_with(
            document(vec![Event::unmarked(EventKind::Scalar {
                anchor: None,
                tag: None,
                implicit: (false, false),
                value: "x".into(),
                style: None,
            })]),
            &EncodeOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("tag is not specified"));
    }

    #[test]
    fn test_analysis() {
        let a = analyze_scalar("plain text", true);
        assert!(a.allow_block_plain && a.allow_flow_plain);
        let a = analyze_scalar("a: b", true);
        assert!(!a.allow_block_plain && !a.allow_flow_plain);
        let a = analyze_scalar("a, b", true);
        assert!(a.allow_block_plain && !a.allow_flow_plain);
        let a = analyze_scalar("trailing ", true);
        assert!(!a.allow_block && a.allow_single_quoted);
        let a = analyze_scalar("caf\u{e9}", false);
        assert!(!a.allow_single_quoted);
        assert!(analyze_scalar("caf\u{e9}", true).allow_block_plain);
    }
}
