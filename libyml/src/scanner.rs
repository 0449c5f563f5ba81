//! Stage 2: Scanner
//!
//! The scanner converts the character stream into tokens. It tracks:
//! - Indentation, emitting `BlockSequenceStart`/`BlockMappingStart` when a
//!   block collection opens and `BlockEnd` when the column drops back
//! - Flow nesting (`[ ]`, `{ }`), inside which indentation is ignored
//! - Possible simple keys: a token that may turn out to be a mapping key is
//!   remembered until a `:` confirms it, at which point `Key` (and maybe
//!   `BlockMappingStart`) is inserted before it in the queue
//!
//! Tokens are produced on demand; the queue only grows far enough to decide
//! whether the oldest pending token is a simple key.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{Error, MarkedProblem, Mark, Result};
use crate::reader::Reader;
use crate::tokens::{DirectiveValue, ScalarStyle, Token, TokenKind};

/// A simple key may not span more than this many characters.
const MAX_SIMPLE_KEY_LENGTH: usize = 128;

#[derive(Debug, Clone)]
struct SimpleKey {
    token_number: usize,
    required: bool,
    index: usize,
    line: usize,
    column: usize,
    mark: Mark,
}

fn is_break(ch: char) -> bool {
    matches!(ch, '\r' | '\n' | '\u{85}')
}

fn is_breakz(ch: char) -> bool {
    ch == '\0' || is_break(ch)
}

fn is_blank(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

fn is_blankz(ch: char) -> bool {
    is_blank(ch) || is_breakz(ch)
}

/// `'\0'`, space, or a line break; the end of a directive argument or tag.
fn is_spacez(ch: char) -> bool {
    ch == ' ' || is_breakz(ch)
}

fn is_word(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn is_uri_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "-;/?:@&=+$,_.!~*'()[]%".contains(ch)
}

fn escape_replacement(ch: char) -> Option<char> {
    Some(match ch {
        '0' => '\0',
        'a' => '\u{07}',
        'b' => '\u{08}',
        't' | '\t' => '\t',
        'n' => '\n',
        'v' => '\u{0B}',
        'f' => '\u{0C}',
        'r' => '\r',
        'e' => '\u{1B}',
        ' ' => ' ',
        '"' => '"',
        '\\' => '\\',
        'N' => '\u{85}',
        '_' => '\u{A0}',
        'L' => '\u{2028}',
        'P' => '\u{2029}',
        _ => return None,
    })
}

fn escape_code_length(ch: char) -> Option<usize> {
    match ch {
        'x' => Some(2),
        'u' => Some(4),
        'U' => Some(8),
        _ => None,
    }
}

/// Lazy token stream over a [`Reader`].
pub struct Scanner<'a> {
    reader: Reader<'a>,
    done: bool,
    failed: bool,
    flow_level: usize,
    tokens: VecDeque<Token>,
    tokens_taken: usize,
    indent: isize,
    indents: Vec<isize>,
    allow_simple_key: bool,
    possible_simple_keys: BTreeMap<usize, SimpleKey>,
}

impl<'a> Scanner<'a> {
    pub fn new(reader: Reader<'a>) -> Self {
        let mut scanner = Self {
            reader,
            done: false,
            failed: false,
            flow_level: 0,
            tokens: VecDeque::new(),
            tokens_taken: 0,
            indent: -1,
            indents: Vec::new(),
            allow_simple_key: true,
            possible_simple_keys: BTreeMap::new(),
        };
        let mark = scanner.reader.mark();
        scanner
            .tokens
            .push_back(Token::new(TokenKind::StreamStart, mark.clone(), mark));
        scanner
    }

    pub fn from_str(input: &'a str) -> Self {
        Self::new(Reader::from_str(input))
    }

    /// Whether another token is available.
    pub fn check_token(&mut self) -> Result<bool> {
        self.ensure_tokens()?;
        Ok(!self.tokens.is_empty())
    }

    /// The next token without consuming it; `None` after the stream end.
    pub fn peek_token(&mut self) -> Result<Option<&Token>> {
        self.ensure_tokens()?;
        Ok(self.tokens.front())
    }

    /// Consume the next token; `None` after the stream end.
    pub fn get_token(&mut self) -> Result<Option<Token>> {
        self.ensure_tokens()?;
        let token = self.tokens.pop_front();
        if token.is_some() {
            self.tokens_taken += 1;
        }
        Ok(token)
    }

    fn ensure_tokens(&mut self) -> Result<()> {
        while self.need_more_tokens()? {
            self.fetch_more_tokens()?;
        }
        Ok(())
    }

    fn need_more_tokens(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        if self.tokens.is_empty() {
            return Ok(true);
        }
        // The oldest token may still become a simple key.
        self.stale_possible_simple_keys()?;
        Ok(self.next_possible_simple_key() == Some(self.tokens_taken))
    }

    fn fetch_more_tokens(&mut self) -> Result<()> {
        let result = self.fetch_next_token();
        // A reader failure ends the input early; report it instead of
        // whatever the truncated input looked like.
        if let Some(err) = self.reader.take_error() {
            return Err(err);
        }
        result
    }

    fn fetch_next_token(&mut self) -> Result<()> {
        self.scan_to_next_token();
        self.stale_possible_simple_keys()?;
        let column = self.reader.column() as isize;
        self.unwind_indent(column);

        let ch = self.reader.peek(0);
        match ch {
            '\0' => self.fetch_stream_end(),
            '%' if self.check_directive() => self.fetch_directive(),
            '-' if self.check_document_indicator("---") => {
                self.fetch_document_indicator(TokenKind::DocumentStart)
            }
            '.' if self.check_document_indicator("...") => {
                self.fetch_document_indicator(TokenKind::DocumentEnd)
            }
            '[' => self.fetch_flow_collection_start(TokenKind::FlowSequenceStart),
            '{' => self.fetch_flow_collection_start(TokenKind::FlowMappingStart),
            ']' => self.fetch_flow_collection_end(TokenKind::FlowSequenceEnd),
            '}' => self.fetch_flow_collection_end(TokenKind::FlowMappingEnd),
            ',' => self.fetch_flow_entry(),
            '-' if self.check_block_entry() => self.fetch_block_entry(),
            '?' if self.check_key() => self.fetch_key(),
            ':' if self.check_value() => self.fetch_value(),
            '*' => self.fetch_anchor(true),
            '&' => self.fetch_anchor(false),
            '!' => self.fetch_tag(),
            '|' if self.flow_level == 0 => self.fetch_block_scalar(false),
            '>' if self.flow_level == 0 => self.fetch_block_scalar(true),
            '\'' => self.fetch_flow_scalar(false),
            '"' => self.fetch_flow_scalar(true),
            _ if self.check_plain() => self.fetch_plain(),
            _ => Err(Error::Scanner(MarkedProblem::with_context(
                "while scanning for the next token",
                None,
                format!("found character {:?} that cannot start any token", ch),
                Some(self.reader.mark_with_snippet()),
            ))),
        }
    }

    fn error_here(&self, problem: impl Into<String>) -> Error {
        Error::Scanner(MarkedProblem::new(
            problem,
            Some(self.reader.mark_with_snippet()),
        ))
    }

    fn error_in(&self, context: &str, start: &Mark, problem: impl Into<String>) -> Error {
        Error::scanner(context, start.clone(), problem, self.reader.mark_with_snippet())
    }

    // ------------------------------------------------------------------
    // Simple keys
    // ------------------------------------------------------------------

    fn next_possible_simple_key(&self) -> Option<usize> {
        self.possible_simple_keys
            .values()
            .map(|key| key.token_number)
            .min()
    }

    fn stale_possible_simple_keys(&mut self) -> Result<()> {
        let line = self.reader.line();
        let index = self.reader.index();
        let mut stale = Vec::new();
        for (&level, key) in &self.possible_simple_keys {
            if key.line != line || index - key.index > MAX_SIMPLE_KEY_LENGTH {
                if key.required {
                    return Err(Error::scanner(
                        "while scanning a simple key",
                        key.mark.clone(),
                        "could not find expected ':'",
                        self.reader.mark_with_snippet(),
                    ));
                }
                stale.push(level);
            }
        }
        for level in stale {
            self.possible_simple_keys.remove(&level);
        }
        Ok(())
    }

    fn save_possible_simple_key(&mut self) -> Result<()> {
        // A key at the current block indentation must be followed by ':'.
        let required = self.flow_level == 0 && self.indent == self.reader.column() as isize;
        if self.allow_simple_key {
            self.remove_possible_simple_key()?;
            let key = SimpleKey {
                token_number: self.tokens_taken + self.tokens.len(),
                required,
                index: self.reader.index(),
                line: self.reader.line(),
                column: self.reader.column(),
                mark: self.reader.mark(),
            };
            self.possible_simple_keys.insert(self.flow_level, key);
        }
        Ok(())
    }

    fn remove_possible_simple_key(&mut self) -> Result<()> {
        if let Some(key) = self.possible_simple_keys.remove(&self.flow_level) {
            if key.required {
                return Err(Error::scanner(
                    "while scanning a simple key",
                    key.mark,
                    "could not find expected ':'",
                    self.reader.mark_with_snippet(),
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indentation
    // ------------------------------------------------------------------

    fn unwind_indent(&mut self, column: isize) {
        if self.flow_level > 0 {
            return;
        }
        while self.indent > column {
            let mark = self.reader.mark();
            self.indent = self.indents.pop().unwrap_or(-1);
            self.tokens
                .push_back(Token::new(TokenKind::BlockEnd, mark.clone(), mark));
        }
    }

    fn add_indent(&mut self, column: isize) -> bool {
        if self.indent < column {
            self.indents.push(self.indent);
            self.indent = column;
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Fetchers
    // ------------------------------------------------------------------

    fn push_simple(&mut self, kind: TokenKind, length: usize) {
        let start = self.reader.mark();
        self.reader.forward(length);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(kind, start, end));
    }

    fn fetch_stream_end(&mut self) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        self.possible_simple_keys.clear();
        let mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenKind::StreamEnd, mark.clone(), mark));
        self.done = true;
        Ok(())
    }

    fn fetch_directive(&mut self) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_directive()?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_document_indicator(&mut self, kind: TokenKind) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        self.push_simple(kind, 3);
        Ok(())
    }

    fn fetch_flow_collection_start(&mut self, kind: TokenKind) -> Result<()> {
        self.save_possible_simple_key()?;
        self.flow_level += 1;
        self.allow_simple_key = true;
        self.push_simple(kind, 1);
        Ok(())
    }

    fn fetch_flow_collection_end(&mut self, kind: TokenKind) -> Result<()> {
        self.remove_possible_simple_key()?;
        self.flow_level = self.flow_level.saturating_sub(1);
        self.allow_simple_key = false;
        self.push_simple(kind, 1);
        Ok(())
    }

    fn fetch_flow_entry(&mut self) -> Result<()> {
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        self.push_simple(TokenKind::FlowEntry, 1);
        Ok(())
    }

    fn fetch_block_entry(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.allow_simple_key {
                return Err(self.error_here("sequence entries are not allowed here"));
            }
            if self.add_indent(self.reader.column() as isize) {
                let mark = self.reader.mark();
                self.tokens.push_back(Token::new(
                    TokenKind::BlockSequenceStart,
                    mark.clone(),
                    mark,
                ));
            }
        }
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        self.push_simple(TokenKind::BlockEntry, 1);
        Ok(())
    }

    fn fetch_key(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.allow_simple_key {
                return Err(self.error_here("mapping keys are not allowed here"));
            }
            if self.add_indent(self.reader.column() as isize) {
                let mark = self.reader.mark();
                self.tokens.push_back(Token::new(
                    TokenKind::BlockMappingStart,
                    mark.clone(),
                    mark,
                ));
            }
        }
        self.allow_simple_key = self.flow_level == 0;
        self.remove_possible_simple_key()?;
        self.push_simple(TokenKind::Key, 1);
        Ok(())
    }

    fn fetch_value(&mut self) -> Result<()> {
        if let Some(key) = self.possible_simple_keys.remove(&self.flow_level) {
            // Retroactively mark the remembered token as a key.
            let position = key.token_number - self.tokens_taken;
            self.tokens.insert(
                position,
                Token::new(TokenKind::Key, key.mark.clone(), key.mark.clone()),
            );
            if self.flow_level == 0 && self.add_indent(key.column as isize) {
                self.tokens.insert(
                    position,
                    Token::new(TokenKind::BlockMappingStart, key.mark.clone(), key.mark),
                );
            }
            self.allow_simple_key = false;
        } else {
            if self.flow_level == 0 {
                if !self.allow_simple_key {
                    return Err(self.error_here("mapping values are not allowed here"));
                }
                if self.add_indent(self.reader.column() as isize) {
                    let mark = self.reader.mark();
                    self.tokens.push_back(Token::new(
                        TokenKind::BlockMappingStart,
                        mark.clone(),
                        mark,
                    ));
                }
            }
            self.allow_simple_key = self.flow_level == 0;
            self.remove_possible_simple_key()?;
        }
        self.push_simple(TokenKind::Value, 1);
        Ok(())
    }

    fn fetch_anchor(&mut self, alias: bool) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_anchor(alias)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_tag(&mut self) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_tag()?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_block_scalar(&mut self, folded: bool) -> Result<()> {
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        let token = self.scan_block_scalar(folded)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_flow_scalar(&mut self, double: bool) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_flow_scalar(double)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_plain(&mut self) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_plain()?;
        self.tokens.push_back(token);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checkers
    // ------------------------------------------------------------------

    fn check_directive(&self) -> bool {
        self.reader.column() == 0
    }

    fn check_document_indicator(&mut self, indicator: &str) -> bool {
        self.reader.column() == 0
            && self.reader.prefix(3) == indicator
            && is_blankz(self.reader.peek(3))
    }

    fn check_block_entry(&mut self) -> bool {
        is_blankz(self.reader.peek(1))
    }

    fn check_key(&mut self) -> bool {
        self.flow_level > 0 || is_blankz(self.reader.peek(1))
    }

    fn check_value(&mut self) -> bool {
        self.flow_level > 0 || is_blankz(self.reader.peek(1))
    }

    fn check_plain(&mut self) -> bool {
        let ch = self.reader.peek(0);
        let indicator = is_blankz(ch) || "-?:,[]{}#&*!|>'\"%@`".contains(ch);
        !indicator
            || (!is_blankz(self.reader.peek(1))
                && (ch == '-' || (self.flow_level == 0 && (ch == '?' || ch == ':'))))
    }

    // ------------------------------------------------------------------
    // Scanners
    // ------------------------------------------------------------------

    fn scan_to_next_token(&mut self) {
        if self.reader.index() == 0 && self.reader.peek(0) == '\u{FEFF}' {
            self.reader.forward(1);
        }
        loop {
            while self.reader.peek(0) == ' ' {
                self.reader.forward(1);
            }
            if self.reader.peek(0) == '#' {
                while !is_breakz(self.reader.peek(0)) {
                    self.reader.forward(1);
                }
            }
            if self.scan_line_break().is_empty() {
                break;
            }
            if self.flow_level == 0 {
                self.allow_simple_key = true;
            }
        }
    }

    fn scan_directive(&mut self) -> Result<Token> {
        let start = self.reader.mark();
        self.reader.forward(1);
        let name = self.scan_directive_name(&start)?;
        let value = match name.as_str() {
            "YAML" => {
                let (major, minor) = self.scan_yaml_directive_value(&start)?;
                DirectiveValue::Version(major, minor)
            }
            "TAG" => {
                let (handle, prefix) = self.scan_tag_directive_value(&start)?;
                DirectiveValue::Tag { handle, prefix }
            }
            _ => {
                while !is_breakz(self.reader.peek(0)) {
                    self.reader.forward(1);
                }
                DirectiveValue::Reserved
            }
        };
        let end = self.reader.mark();
        self.scan_directive_ignored_line(&start)?;
        Ok(Token::new(TokenKind::Directive { name, value }, start, end))
    }

    fn scan_directive_name(&mut self, start: &Mark) -> Result<String> {
        let mut length = 0;
        while is_word(self.reader.peek(length)) {
            length += 1;
        }
        if length == 0 {
            let ch = self.reader.peek(0);
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected alphabetic or numeric character, but found {:?}", ch),
            ));
        }
        let value = self.reader.prefix(length);
        self.reader.forward(length);
        let ch = self.reader.peek(0);
        if !is_spacez(ch) {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected alphabetic or numeric character, but found {:?}", ch),
            ));
        }
        Ok(value)
    }

    fn skip_spaces(&mut self) {
        while self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
    }

    fn scan_yaml_directive_value(&mut self, start: &Mark) -> Result<(u32, u32)> {
        self.skip_spaces();
        let major = self.scan_yaml_directive_number(start)?;
        let ch = self.reader.peek(0);
        if ch != '.' {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected a digit or '.', but found {:?}", ch),
            ));
        }
        self.reader.forward(1);
        let minor = self.scan_yaml_directive_number(start)?;
        let ch = self.reader.peek(0);
        if !is_spacez(ch) {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected a digit or ' ', but found {:?}", ch),
            ));
        }
        Ok((major, minor))
    }

    fn scan_yaml_directive_number(&mut self, start: &Mark) -> Result<u32> {
        let ch = self.reader.peek(0);
        if !ch.is_ascii_digit() {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected a digit, but found {:?}", ch),
            ));
        }
        let mut length = 0;
        while self.reader.peek(length).is_ascii_digit() {
            length += 1;
        }
        let digits = self.reader.prefix(length);
        let value = digits.parse::<u32>().map_err(|_| {
            self.error_in(
                "while scanning a directive",
                start,
                format!("version number {} is out of range", digits),
            )
        })?;
        self.reader.forward(length);
        Ok(value)
    }

    fn scan_tag_directive_value(&mut self, start: &Mark) -> Result<(String, String)> {
        self.skip_spaces();
        let handle = self.scan_tag_handle("directive", start)?;
        let ch = self.reader.peek(0);
        if ch != ' ' {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected ' ', but found {:?}", ch),
            ));
        }
        self.skip_spaces();
        let prefix = self.scan_tag_uri("directive", start)?;
        let ch = self.reader.peek(0);
        if !is_spacez(ch) {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected ' ', but found {:?}", ch),
            ));
        }
        Ok((handle, prefix))
    }

    fn scan_directive_ignored_line(&mut self, start: &Mark) -> Result<()> {
        self.skip_spaces();
        if self.reader.peek(0) == '#' {
            while !is_breakz(self.reader.peek(0)) {
                self.reader.forward(1);
            }
        }
        let ch = self.reader.peek(0);
        if !is_breakz(ch) {
            return Err(self.error_in(
                "while scanning a directive",
                start,
                format!("expected a comment or a line break, but found {:?}", ch),
            ));
        }
        self.scan_line_break();
        Ok(())
    }

    fn scan_anchor(&mut self, alias: bool) -> Result<Token> {
        let start = self.reader.mark();
        let context = if alias {
            "while scanning an alias"
        } else {
            "while scanning an anchor"
        };
        self.reader.forward(1);
        let mut length = 0;
        while is_word(self.reader.peek(length)) {
            length += 1;
        }
        if length == 0 {
            let ch = self.reader.peek(0);
            return Err(self.error_in(
                context,
                &start,
                format!("expected alphabetic or numeric character, but found {:?}", ch),
            ));
        }
        let value = self.reader.prefix(length);
        self.reader.forward(length);
        let ch = self.reader.peek(0);
        if !is_blankz(ch) && !"?:,]}%@`".contains(ch) {
            return Err(self.error_in(
                context,
                &start,
                format!("expected alphabetic or numeric character, but found {:?}", ch),
            ));
        }
        let end = self.reader.mark();
        let kind = if alias {
            TokenKind::Alias(value)
        } else {
            TokenKind::Anchor(value)
        };
        Ok(Token::new(kind, start, end))
    }

    fn scan_tag(&mut self) -> Result<Token> {
        let start = self.reader.mark();
        let ch = self.reader.peek(1);
        let (handle, suffix) = if ch == '<' {
            self.reader.forward(2);
            let suffix = self.scan_tag_uri("tag", &start)?;
            let ch = self.reader.peek(0);
            if ch != '>' {
                return Err(self.error_in(
                    "while parsing a tag",
                    &start,
                    format!("expected '>', but found {:?}", ch),
                ));
            }
            self.reader.forward(1);
            (None, suffix)
        } else if is_blankz(ch) {
            self.reader.forward(1);
            (None, "!".to_string())
        } else {
            let mut length = 1;
            let mut use_handle = false;
            let mut ch = ch;
            while !is_spacez(ch) {
                if ch == '!' {
                    use_handle = true;
                    break;
                }
                length += 1;
                ch = self.reader.peek(length);
            }
            let handle = if use_handle {
                self.scan_tag_handle("tag", &start)?
            } else {
                self.reader.forward(1);
                "!".to_string()
            };
            let suffix = self.scan_tag_uri("tag", &start)?;
            (Some(handle), suffix)
        };
        let ch = self.reader.peek(0);
        if !is_spacez(ch) && !(self.flow_level > 0 && ",]}".contains(ch)) {
            return Err(self.error_in(
                "while scanning a tag",
                &start,
                format!("expected ' ', but found {:?}", ch),
            ));
        }
        let end = self.reader.mark();
        Ok(Token::new(TokenKind::Tag { handle, suffix }, start, end))
    }

    fn scan_tag_handle(&mut self, name: &str, start: &Mark) -> Result<String> {
        let context = format!("while scanning a {}", name);
        let ch = self.reader.peek(0);
        if ch != '!' {
            return Err(self.error_in(
                &context,
                start,
                format!("expected '!', but found {:?}", ch),
            ));
        }
        let mut length = 1;
        let mut ch = self.reader.peek(length);
        if ch != ' ' {
            while is_word(ch) {
                length += 1;
                ch = self.reader.peek(length);
            }
            if ch != '!' {
                self.reader.forward(length);
                return Err(self.error_in(
                    &context,
                    start,
                    format!("expected '!', but found {:?}", ch),
                ));
            }
            length += 1;
        }
        let value = self.reader.prefix(length);
        self.reader.forward(length);
        Ok(value)
    }

    fn scan_tag_uri(&mut self, name: &str, start: &Mark) -> Result<String> {
        let mut chunks = String::new();
        let mut length = 0;
        let mut ch = self.reader.peek(length);
        while is_uri_char(ch) && !(self.flow_level > 0 && ",[]{}".contains(ch)) {
            if ch == '%' {
                chunks.push_str(&self.reader.prefix(length));
                self.reader.forward(length);
                length = 0;
                chunks.push_str(&self.scan_uri_escapes(name, start)?);
            } else {
                length += 1;
            }
            ch = self.reader.peek(length);
        }
        if length > 0 {
            chunks.push_str(&self.reader.prefix(length));
            self.reader.forward(length);
        }
        if chunks.is_empty() {
            return Err(self.error_in(
                &format!("while parsing a {}", name),
                start,
                format!("expected URI, but found {:?}", ch),
            ));
        }
        Ok(chunks)
    }

    fn scan_uri_escapes(&mut self, name: &str, start: &Mark) -> Result<String> {
        let mut bytes = Vec::new();
        let mark = self.reader.mark();
        while self.reader.peek(0) == '%' {
            self.reader.forward(1);
            for k in 0..2 {
                let ch = self.reader.peek(k);
                if !ch.is_ascii_hexdigit() {
                    return Err(self.error_in(
                        &format!("while scanning a {}", name),
                        start,
                        format!(
                            "expected URI escaped sequence of 2 hexadecimal numbers, but found {:?}",
                            ch
                        ),
                    ));
                }
            }
            let hex = self.reader.prefix(2);
            bytes.push(u8::from_str_radix(&hex, 16).unwrap_or_default());
            self.reader.forward(2);
        }
        String::from_utf8(bytes).map_err(|e| {
            Error::scanner(
                &format!("while scanning a {}", name),
                start.clone(),
                e.to_string(),
                mark,
            )
        })
    }

    fn scan_block_scalar(&mut self, folded: bool) -> Result<Token> {
        let start = self.reader.mark();
        self.reader.forward(1);
        let (chomping, increment) = self.scan_block_scalar_indicators(&start)?;
        self.scan_block_scalar_ignored_line(&start)?;

        let min_indent = (self.indent + 1).max(1) as usize;
        let (mut breaks, mut end, indent) = match increment {
            None => {
                let (breaks, max_indent, end) = self.scan_block_scalar_indentation();
                (breaks, end, min_indent.max(max_indent))
            }
            Some(increment) => {
                let indent = min_indent + increment - 1;
                let (breaks, end) = self.scan_block_scalar_breaks(indent);
                (breaks, end, indent)
            }
        };

        let mut chunks = String::new();
        let mut line_break = String::new();
        while self.reader.column() == indent && self.reader.peek(0) != '\0' {
            chunks.push_str(&breaks);
            let leading_non_space = !is_blank(self.reader.peek(0));
            let mut length = 0;
            while !is_breakz(self.reader.peek(length)) {
                length += 1;
            }
            chunks.push_str(&self.reader.prefix(length));
            self.reader.forward(length);
            line_break = self.scan_line_break();
            let (next_breaks, next_end) = self.scan_block_scalar_breaks(indent);
            breaks = next_breaks;
            end = next_end;
            if self.reader.column() == indent && self.reader.peek(0) != '\0' {
                // Folding joins two non-indented lines with a space.
                if folded
                    && line_break == "\n"
                    && leading_non_space
                    && !is_blank(self.reader.peek(0))
                {
                    if breaks.is_empty() {
                        chunks.push(' ');
                    }
                } else {
                    chunks.push_str(&line_break);
                }
            } else {
                break;
            }
        }

        if chomping != Some(false) {
            chunks.push_str(&line_break);
        }
        if chomping == Some(true) {
            chunks.push_str(&breaks);
        }

        let style = if folded {
            ScalarStyle::Folded
        } else {
            ScalarStyle::Literal
        };
        Ok(Token::new(
            TokenKind::Scalar {
                value: chunks,
                plain: false,
                style,
            },
            start,
            end,
        ))
    }

    /// Returns `(chomping, increment)`; chomping is `Some(true)` for keep
    /// (`+`), `Some(false)` for strip (`-`), `None` for clip.
    fn scan_block_scalar_indicators(
        &mut self,
        start: &Mark,
    ) -> Result<(Option<bool>, Option<usize>)> {
        const CONTEXT: &str = "while scanning a block scalar";
        let mut chomping = None;
        let mut increment = None;
        let mut ch = self.reader.peek(0);
        if ch == '+' || ch == '-' {
            chomping = Some(ch == '+');
            self.reader.forward(1);
            ch = self.reader.peek(0);
            if let Some(digit) = ch.to_digit(10) {
                if digit == 0 {
                    return Err(self.error_in(
                        CONTEXT,
                        start,
                        "expected indentation indicator in the range 1-9, but found 0",
                    ));
                }
                increment = Some(digit as usize);
                self.reader.forward(1);
            }
        } else if let Some(digit) = ch.to_digit(10) {
            if digit == 0 {
                return Err(self.error_in(
                    CONTEXT,
                    start,
                    "expected indentation indicator in the range 1-9, but found 0",
                ));
            }
            increment = Some(digit as usize);
            self.reader.forward(1);
            ch = self.reader.peek(0);
            if ch == '+' || ch == '-' {
                chomping = Some(ch == '+');
                self.reader.forward(1);
            }
        }
        let ch = self.reader.peek(0);
        if !is_spacez(ch) {
            return Err(self.error_in(
                CONTEXT,
                start,
                format!(
                    "expected chomping or indentation indicators, but found {:?}",
                    ch
                ),
            ));
        }
        Ok((chomping, increment))
    }

    fn scan_block_scalar_ignored_line(&mut self, start: &Mark) -> Result<()> {
        self.skip_spaces();
        if self.reader.peek(0) == '#' {
            while !is_breakz(self.reader.peek(0)) {
                self.reader.forward(1);
            }
        }
        let ch = self.reader.peek(0);
        if !is_breakz(ch) {
            return Err(self.error_in(
                "while scanning a block scalar",
                start,
                format!("expected a comment or a line break, but found {:?}", ch),
            ));
        }
        self.scan_line_break();
        Ok(())
    }

    fn scan_block_scalar_indentation(&mut self) -> (String, usize, Mark) {
        let mut chunks = String::new();
        let mut max_indent = 0;
        let mut end = self.reader.mark();
        loop {
            let ch = self.reader.peek(0);
            if ch == ' ' {
                self.reader.forward(1);
                max_indent = max_indent.max(self.reader.column());
            } else if is_break(ch) {
                chunks.push_str(&self.scan_line_break());
                end = self.reader.mark();
            } else {
                break;
            }
        }
        (chunks, max_indent, end)
    }

    fn scan_block_scalar_breaks(&mut self, indent: usize) -> (String, Mark) {
        let mut chunks = String::new();
        let mut end = self.reader.mark();
        while self.reader.column() < indent && self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
        while is_break(self.reader.peek(0)) {
            chunks.push_str(&self.scan_line_break());
            end = self.reader.mark();
            while self.reader.column() < indent && self.reader.peek(0) == ' ' {
                self.reader.forward(1);
            }
        }
        (chunks, end)
    }

    fn scan_flow_scalar(&mut self, double: bool) -> Result<Token> {
        let start = self.reader.mark();
        let quote = self.reader.peek(0);
        self.reader.forward(1);
        let mut chunks = String::new();
        self.scan_flow_scalar_non_spaces(double, &start, &mut chunks)?;
        while self.reader.peek(0) != quote {
            self.scan_flow_scalar_spaces(&start, &mut chunks)?;
            self.scan_flow_scalar_non_spaces(double, &start, &mut chunks)?;
        }
        self.reader.forward(1);
        let end = self.reader.mark();
        let style = if double {
            ScalarStyle::DoubleQuoted
        } else {
            ScalarStyle::SingleQuoted
        };
        Ok(Token::new(
            TokenKind::Scalar {
                value: chunks,
                plain: false,
                style,
            },
            start,
            end,
        ))
    }

    fn scan_flow_scalar_non_spaces(
        &mut self,
        double: bool,
        start: &Mark,
        chunks: &mut String,
    ) -> Result<()> {
        const CONTEXT: &str = "while scanning a double-quoted scalar";
        loop {
            let mut length = 0;
            while !is_blankz(self.reader.peek(length))
                && !"'\"\\".contains(self.reader.peek(length))
            {
                length += 1;
            }
            if length > 0 {
                chunks.push_str(&self.reader.prefix(length));
                self.reader.forward(length);
            }
            let ch = self.reader.peek(0);
            if !double && ch == '\'' && self.reader.peek(1) == '\'' {
                chunks.push('\'');
                self.reader.forward(2);
            } else if (double && ch == '\'') || (!double && (ch == '"' || ch == '\\')) {
                chunks.push(ch);
                self.reader.forward(1);
            } else if double && ch == '\\' {
                self.reader.forward(1);
                let ch = self.reader.peek(0);
                if let Some(replacement) = escape_replacement(ch) {
                    chunks.push(replacement);
                    self.reader.forward(1);
                } else if let Some(length) = escape_code_length(ch) {
                    self.reader.forward(1);
                    for k in 0..length {
                        let digit = self.reader.peek(k);
                        if !digit.is_ascii_hexdigit() {
                            return Err(self.error_in(
                                CONTEXT,
                                start,
                                format!(
                                    "expected escape sequence of {} hexadecimal numbers, but found {:?}",
                                    length, digit
                                ),
                            ));
                        }
                    }
                    let hex = self.reader.prefix(length);
                    let code = u32::from_str_radix(&hex, 16).unwrap_or(u32::MAX);
                    let Some(decoded) = char::from_u32(code) else {
                        return Err(self.error_in(
                            CONTEXT,
                            start,
                            format!("found invalid Unicode character escape code {}", hex),
                        ));
                    };
                    chunks.push(decoded);
                    self.reader.forward(length);
                } else if is_break(ch) {
                    self.scan_line_break();
                    self.scan_flow_scalar_breaks(start, chunks)?;
                } else {
                    return Err(self.error_in(
                        CONTEXT,
                        start,
                        format!("found unknown escape character {:?}", ch),
                    ));
                }
            } else {
                return Ok(());
            }
        }
    }

    fn scan_flow_scalar_spaces(&mut self, start: &Mark, chunks: &mut String) -> Result<()> {
        let mut length = 0;
        while is_blank(self.reader.peek(length)) {
            length += 1;
        }
        let whitespaces = self.reader.prefix(length);
        self.reader.forward(length);
        let ch = self.reader.peek(0);
        if ch == '\0' {
            return Err(self.error_in(
                "while scanning a quoted scalar",
                start,
                "found unexpected end of stream",
            ));
        }
        if is_break(ch) {
            let line_break = self.scan_line_break();
            let mut breaks = String::new();
            self.scan_flow_scalar_breaks(start, &mut breaks)?;
            if line_break != "\n" {
                chunks.push_str(&line_break);
            } else if breaks.is_empty() {
                chunks.push(' ');
            }
            chunks.push_str(&breaks);
        } else {
            chunks.push_str(&whitespaces);
        }
        Ok(())
    }

    fn scan_flow_scalar_breaks(&mut self, start: &Mark, chunks: &mut String) -> Result<()> {
        loop {
            let prefix = self.reader.prefix(3);
            if self.reader.column() == 0
                && (prefix == "---" || prefix == "...")
                && is_blankz(self.reader.peek(3))
            {
                return Err(self.error_in(
                    "while scanning a quoted scalar",
                    start,
                    "found unexpected document separator",
                ));
            }
            while is_blank(self.reader.peek(0)) {
                self.reader.forward(1);
            }
            if is_break(self.reader.peek(0)) {
                chunks.push_str(&self.scan_line_break());
            } else {
                return Ok(());
            }
        }
    }

    fn scan_plain(&mut self) -> Result<Token> {
        let start = self.reader.mark();
        let mut end = start.clone();
        let mut chunks = String::new();
        let indent = self.indent + 1;
        let mut spaces = String::new();
        loop {
            if self.reader.peek(0) == '#' {
                break;
            }
            let mut length = 0;
            let mut ch;
            loop {
                ch = self.reader.peek(length);
                if is_blankz(ch)
                    || (self.flow_level == 0 && ch == ':' && is_blankz(self.reader.peek(length + 1)))
                    || (self.flow_level > 0 && ",:?[]{}".contains(ch))
                {
                    break;
                }
                length += 1;
            }
            if self.flow_level > 0 && ch == ':' {
                let next = self.reader.peek(length + 1);
                if !is_blankz(next) && !",[]{}".contains(next) {
                    self.reader.forward(length);
                    return Err(Error::Scanner(
                        MarkedProblem::with_context(
                            "while scanning a plain scalar",
                            Some(start),
                            "found unexpected ':'",
                            Some(self.reader.mark_with_snippet()),
                        )
                        .note("quote the scalar or put a space after ':' inside flow collections"),
                    ));
                }
            }
            if length == 0 {
                break;
            }
            self.allow_simple_key = false;
            chunks.push_str(&spaces);
            chunks.push_str(&self.reader.prefix(length));
            self.reader.forward(length);
            end = self.reader.mark();
            spaces = self.scan_plain_spaces();
            if spaces.is_empty()
                || self.reader.peek(0) == '#'
                || (self.flow_level == 0 && (self.reader.column() as isize) < indent)
            {
                break;
            }
        }
        Ok(Token::new(
            TokenKind::Scalar {
                value: chunks,
                plain: true,
                style: ScalarStyle::Plain,
            },
            start,
            end,
        ))
    }

    fn at_document_separator(&mut self) -> bool {
        let prefix = self.reader.prefix(3);
        self.reader.column() == 0
            && (prefix == "---" || prefix == "...")
            && is_blankz(self.reader.peek(3))
    }

    fn scan_plain_spaces(&mut self) -> String {
        let mut chunks = String::new();
        let mut length = 0;
        while self.reader.peek(length) == ' ' {
            length += 1;
        }
        let whitespaces = self.reader.prefix(length);
        self.reader.forward(length);
        let ch = self.reader.peek(0);
        if is_break(ch) {
            let line_break = self.scan_line_break();
            self.allow_simple_key = true;
            if self.at_document_separator() {
                return String::new();
            }
            let mut breaks = String::new();
            loop {
                let ch = self.reader.peek(0);
                if ch == ' ' {
                    self.reader.forward(1);
                } else if is_break(ch) {
                    breaks.push_str(&self.scan_line_break());
                    if self.at_document_separator() {
                        return String::new();
                    }
                } else {
                    break;
                }
            }
            if line_break != "\n" {
                chunks.push_str(&line_break);
            } else if breaks.is_empty() {
                chunks.push(' ');
            }
            chunks.push_str(&breaks);
        } else if !whitespaces.is_empty() {
            chunks.push_str(&whitespaces);
        }
        chunks
    }

    /// Consume one line break, normalized to `"\n"`.
    fn scan_line_break(&mut self) -> String {
        let ch = self.reader.peek(0);
        if is_break(ch) {
            if ch == '\r' && self.reader.peek(1) == '\n' {
                self.reader.forward(2);
            } else {
                self.reader.forward(1);
            }
            "\n".to_string()
        } else {
            String::new()
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.get_token() {
            Ok(token) => token.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Scanner::from_str(input)
            .map(|t| t.unwrap().kind)
            .collect()
    }

    fn scalar(value: &str, style: ScalarStyle) -> TokenKind {
        TokenKind::Scalar {
            value: value.to_string(),
            plain: style == ScalarStyle::Plain,
            style,
        }
    }

    fn plain(value: &str) -> TokenKind {
        scalar(value, ScalarStyle::Plain)
    }

    #[test]
    fn test_scan_empty() {
        assert_eq!(kinds(""), vec![TokenKind::StreamStart, TokenKind::StreamEnd]);
    }

    #[test]
    fn test_scan_simple_mapping() {
        use TokenKind::*;
        assert_eq!(
            kinds("a: 1\nb: 2\n"),
            vec![
                StreamStart,
                BlockMappingStart,
                Key,
                plain("a"),
                Value,
                plain("1"),
                Key,
                plain("b"),
                Value,
                plain("2"),
                BlockEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_scan_nested_then_dedent() {
        use TokenKind::*;
        let tokens = kinds("outer:\n    inner:\n    - x\nnext: y\n");
        assert_eq!(
            tokens,
            vec![
                StreamStart,
                BlockMappingStart,
                Key,
                plain("outer"),
                Value,
                BlockMappingStart,
                Key,
                plain("inner"),
                Value,
                BlockEntry,
                plain("x"),
                BlockEnd,
                Key,
                plain("next"),
                Value,
                plain("y"),
                BlockEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_scan_flow_collections() {
        use TokenKind::*;
        assert_eq!(
            kinds("[a, {b: c}]"),
            vec![
                StreamStart,
                FlowSequenceStart,
                plain("a"),
                FlowEntry,
                FlowMappingStart,
                Key,
                plain("b"),
                Value,
                plain("c"),
                FlowMappingEnd,
                FlowSequenceEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_scan_anchor_alias_tag() {
        use TokenKind::*;
        assert_eq!(
            kinds("- &a !!str x\n- *a\n"),
            vec![
                StreamStart,
                BlockSequenceStart,
                BlockEntry,
                Anchor("a".into()),
                Tag {
                    handle: Some("!!".into()),
                    suffix: "str".into()
                },
                plain("x"),
                BlockEntry,
                Alias("a".into()),
                BlockEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_scan_verbatim_and_bare_tags() {
        let tokens = kinds("!<tag:example.com,2000:a%20b> x");
        assert_eq!(
            tokens[1],
            TokenKind::Tag {
                handle: None,
                suffix: "tag:example.com,2000:a b".into()
            }
        );
        let tokens = kinds("! x");
        assert_eq!(
            tokens[1],
            TokenKind::Tag {
                handle: None,
                suffix: "!".into()
            }
        );
        let tokens = kinds("!local x");
        assert_eq!(
            tokens[1],
            TokenKind::Tag {
                handle: Some("!".into()),
                suffix: "local".into()
            }
        );
    }

    #[test]
    fn test_scan_directives() {
        let tokens = kinds("%YAML 1.1\n%TAG !e! tag:example.com,2000:\n--- x\n");
        assert_eq!(
            tokens[1],
            TokenKind::Directive {
                name: "YAML".into(),
                value: DirectiveValue::Version(1, 1)
            }
        );
        assert_eq!(
            tokens[2],
            TokenKind::Directive {
                name: "TAG".into(),
                value: DirectiveValue::Tag {
                    handle: "!e!".into(),
                    prefix: "tag:example.com,2000:".into()
                }
            }
        );
        assert_eq!(tokens[3], TokenKind::DocumentStart);
    }

    #[test]
    fn test_scan_quoted_scalars() {
        let tokens = kinds("'it''s' \"a\\tb\\x41\\u263A\"");
        // Two scalars on one line is not valid YAML, but the scanner is happy.
        assert_eq!(tokens[1], scalar("it's", ScalarStyle::SingleQuoted));
        assert_eq!(tokens[2], scalar("a\tbA\u{263A}", ScalarStyle::DoubleQuoted));
    }

    #[test]
    fn test_scan_quoted_folding() {
        let tokens = kinds("\"one\n  two\n\n  three\"");
        assert_eq!(tokens[1], scalar("one two\nthree", ScalarStyle::DoubleQuoted));
        let tokens = kinds("\"join\\\n  ed\"");
        assert_eq!(tokens[1], scalar("joined", ScalarStyle::DoubleQuoted));
    }

    #[test]
    fn test_scan_plain_multiline() {
        let tokens = kinds("a\n  b\n\n  c\n");
        assert_eq!(tokens[1], plain("a b\nc"));
    }

    #[test]
    fn test_scan_literal_block() {
        let tokens = kinds("|\n  line 1\n    line 2\n\n");
        assert_eq!(tokens[1], scalar("line 1\n  line 2\n", ScalarStyle::Literal));
    }

    #[test]
    fn test_scan_folded_block_with_chomping() {
        let tokens = kinds(">-\n  one\n  two\n\n  three\n");
        assert_eq!(tokens[1], scalar("one two\nthree", ScalarStyle::Folded));
        let tokens = kinds("|+\n  keep\n\n");
        assert_eq!(tokens[1], scalar("keep\n\n", ScalarStyle::Literal));
    }

    #[test]
    fn test_scan_block_indentation_indicator() {
        let tokens = kinds("|2\n   leading\n  x\n");
        assert_eq!(tokens[1], scalar(" leading\nx\n", ScalarStyle::Literal));
    }

    #[test]
    fn test_scan_comments_skipped() {
        use TokenKind::*;
        assert_eq!(
            kinds("# head\na: b # tail\n"),
            vec![
                StreamStart,
                BlockMappingStart,
                Key,
                plain("a"),
                Value,
                plain("b"),
                BlockEnd,
                StreamEnd
            ]
        );
    }

    #[test]
    fn test_scan_colon_in_flow_plain_is_error() {
        let err = Scanner::from_str("{a:b}")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("found unexpected ':'"), "{}", err);
    }

    #[test]
    fn test_scan_url_in_block_plain() {
        let tokens = kinds("site: http://example.com\n");
        assert_eq!(tokens[5], plain("http://example.com"));
    }

    #[test]
    fn test_scan_invalid_token() {
        let err = Scanner::from_str("a: @b")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, Error::Scanner(_)));
        assert!(err.to_string().contains("cannot start any token"));
    }

    #[test]
    fn test_scan_unknown_escape() {
        let err = Scanner::from_str("\"\\q\"")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("unknown escape character"));
    }

    #[test]
    fn test_scan_reader_error_wins() {
        let err = Scanner::from_str("a: b\u{1}")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, Error::Reader { .. }), "{:?}", err);
    }

    #[test]
    fn test_scan_long_key_is_not_simple() {
        let key = "k".repeat(MAX_SIMPLE_KEY_LENGTH + 10);
        let err = Scanner::from_str(&format!("{}: v", key))
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("mapping values are not allowed here"));
    }

    #[test]
    fn test_scan_marks() {
        let mut scanner = Scanner::from_str("a:\n  b: c\n");
        let mut found = None;
        while let Some(token) = scanner.get_token().unwrap() {
            if token.kind == plain("c") {
                found = Some(token.start);
            }
        }
        let mark = found.unwrap();
        assert_eq!((mark.line, mark.column), (1, 5));
    }
}
