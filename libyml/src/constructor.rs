//! Stage 5: Constructor
//!
//! The constructor turns a composed node graph into native values. Each node
//! is dispatched on its tag through a [`ConstructorRegistry`]:
//! - An exact tag match first
//! - Then the longest registered tag prefix
//! - Then the fallback, which keeps unknown tags as [`Value::Tagged`]
//!
//! Results are memoized per node, so an alias yields the same shared value.
//! Collection constructors register their (still empty) container before
//! constructing children, which lets a child alias an ancestor.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use base64::Engine;
use chrono::{FixedOffset, NaiveDate};
use num_bigint::BigInt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::nodes::{Document, Graph, Node, NodeData, NodeId, NodeKind};
use crate::resolver::{
    BOOL_TAG, FLOAT_TAG, INT_TAG, MAP_TAG, MERGE_TAG, NULL_TAG, SEQ_TAG, STR_TAG, TIMESTAMP_TAG,
    VALUE_TAG,
};
use crate::value::{Timestamp, Value};

pub const BINARY_TAG: &str = "tag:yaml.org,2002:binary";
pub const OMAP_TAG: &str = "tag:yaml.org,2002:omap";
pub const PAIRS_TAG: &str = "tag:yaml.org,2002:pairs";
pub const SET_TAG: &str = "tag:yaml.org,2002:set";

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<year>[0-9]{4})-(?P<month>[0-9]{1,2})-(?P<day>[0-9]{1,2})(?:(?:[Tt]|[ \t]+)(?P<hour>[0-9]{1,2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2})(?:\.(?P<fraction>[0-9]*))?(?:[ \t]*(?P<tz>Z|(?P<tz_sign>[-+])(?P<tz_hour>[0-9]{1,2})(?::(?P<tz_minute>[0-9]{2}))?))?)?$",
    )
    .expect("timestamp pattern")
});

/// Builds the value for one node.
pub type Handler = Rc<dyn Fn(&mut Constructor<'_>, NodeId) -> Result<Value>>;

/// Builds the value for one node of a tag family; receives the tag suffix
/// after the registered prefix.
pub type MultiHandler = Rc<dyn Fn(&mut Constructor<'_>, &str, NodeId) -> Result<Value>>;

/// Tag dispatch table.
#[derive(Clone)]
pub struct ConstructorRegistry {
    exact: HashMap<String, Handler>,
    prefixes: Vec<(String, MultiHandler)>,
    fallback: Option<Handler>,
}

impl Default for ConstructorRegistry {
    /// The core-schema constructors with a fallback for unknown tags.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.add_constructor(NULL_TAG, |c, n| c.scalar_text(n).map(|_| Value::Null));
        registry.add_constructor(BOOL_TAG, construct_bool);
        registry.add_constructor(INT_TAG, construct_int);
        registry.add_constructor(FLOAT_TAG, construct_float);
        registry.add_constructor(STR_TAG, construct_str);
        registry.add_constructor(VALUE_TAG, construct_str);
        registry.add_constructor(MERGE_TAG, construct_str);
        registry.add_constructor(BINARY_TAG, construct_binary);
        registry.add_constructor(TIMESTAMP_TAG, construct_timestamp);
        registry.add_constructor(SEQ_TAG, construct_seq);
        registry.add_constructor(MAP_TAG, construct_map);
        registry.add_constructor(OMAP_TAG, construct_omap);
        registry.add_constructor(PAIRS_TAG, construct_pairs);
        registry.add_constructor(SET_TAG, construct_set);
        registry.set_fallback(Some(construct_undefined));
        registry
    }
}

impl ConstructorRegistry {
    /// A registry with no constructors at all.
    pub fn empty() -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            fallback: None,
        }
    }

    pub fn add_constructor<F>(&mut self, tag: &str, handler: F)
    where
        F: Fn(&mut Constructor<'_>, NodeId) -> Result<Value> + 'static,
    {
        self.exact.insert(tag.to_string(), Rc::new(handler));
    }

    pub fn add_multi_constructor<F>(&mut self, prefix: &str, handler: F)
    where
        F: Fn(&mut Constructor<'_>, &str, NodeId) -> Result<Value> + 'static,
    {
        self.prefixes.push((prefix.to_string(), Rc::new(handler)));
    }

    /// Handler for tags nothing else claims; `None` makes them an error.
    pub fn set_fallback<F>(&mut self, handler: Option<F>)
    where
        F: Fn(&mut Constructor<'_>, NodeId) -> Result<Value> + 'static,
    {
        self.fallback = handler.map(|h| Rc::new(h) as Handler);
    }

    pub fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    fn lookup(&self, tag: &str) -> Option<Handler> {
        if let Some(handler) = self.exact.get(tag) {
            return Some(handler.clone());
        }
        let family = self
            .prefixes
            .iter()
            .filter(|(prefix, _)| tag.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        if let Some((prefix, handler)) = family {
            let handler = handler.clone();
            let suffix = tag[prefix.len()..].to_string();
            return Some(bind_suffix(handler, suffix));
        }
        debug!(tag = %tag, "no constructor registered for tag");
        self.fallback.clone()
    }
}

fn bind_suffix(family: MultiHandler, suffix: String) -> Handler {
    fn erase<F>(f: F) -> Handler
    where
        F: Fn(&mut Constructor<'_>, NodeId) -> Result<Value> + 'static,
    {
        Rc::new(f)
    }
    erase(move |c, n| family(c, &suffix, n))
}

/// Hashable form of scalar keys, for duplicate detection.
#[derive(PartialEq, Eq, Hash)]
enum ScalarKey {
    Null,
    Bool(bool),
    Integer(BigInt),
    Float(u64),
    String(String),
    Binary(Vec<u8>),
    Timestamp(String),
}

impl ScalarKey {
    fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => ScalarKey::Null,
            Value::Bool(b) => ScalarKey::Bool(*b),
            Value::Integer(n) => ScalarKey::Integer(n.clone()),
            Value::Float(f) => ScalarKey::Float(f.to_bits()),
            Value::String(s) => ScalarKey::String(s.clone()),
            Value::Binary(b) => ScalarKey::Binary(b.clone()),
            Value::Timestamp(t) => ScalarKey::Timestamp(t.to_string()),
            _ => return None,
        })
    }
}

/// Builds values for one document.
pub struct Constructor<'g> {
    graph: &'g Graph,
    registry: ConstructorRegistry,
    memo: HashMap<NodeId, Value>,
    in_progress: HashSet<NodeId>,
    allow_duplicate_keys: bool,
}

impl<'g> Constructor<'g> {
    pub fn new(graph: &'g Graph, registry: ConstructorRegistry) -> Self {
        Self {
            graph,
            registry,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            allow_duplicate_keys: false,
        }
    }

    /// Let later duplicate mapping keys replace earlier ones instead of
    /// failing.
    pub fn allow_duplicate_keys(mut self, allow: bool) -> Self {
        self.allow_duplicate_keys = allow;
        self
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn node(&self, id: NodeId) -> &'g Node {
        &self.graph[id]
    }

    /// Construct the root value of a document.
    pub fn construct_document(&mut self, document: &Document) -> Result<Value> {
        let value = self.construct_object(document.root)?;
        self.memo.clear();
        self.in_progress.clear();
        Ok(value)
    }

    /// Construct (or fetch the memoized value of) a node.
    pub fn construct_object(&mut self, id: NodeId) -> Result<Value> {
        if let Some(value) = self.memo.get(&id) {
            return Ok(value.clone());
        }
        let node = self.node(id);
        if !self.in_progress.insert(id) {
            return Err(Error::constructor(
                None,
                "found unconstructable recursive node",
                node.start.clone(),
            ));
        }
        let Some(handler) = self.registry.lookup(&node.tag) else {
            return Err(Error::constructor(
                None,
                format!("could not determine a constructor for the tag {:?}", node.tag),
                node.start.clone(),
            ));
        };
        let value = handler(self, id)?;
        self.in_progress.remove(&id);
        self.memo.insert(id, value.clone());
        Ok(value)
    }

    /// Publish a collection's value before its children are constructed.
    pub fn remember(&mut self, id: NodeId, value: Value) {
        self.memo.insert(id, value);
    }

    /// The text of a scalar node. A mapping holding a `=` key stands for
    /// the value under that key.
    pub fn scalar_text(&self, id: NodeId) -> Result<&'g str> {
        let node = self.node(id);
        match &node.data {
            NodeData::Scalar { value, .. } => Ok(value.as_str()),
            NodeData::Mapping { pairs, .. } => {
                match pairs.iter().find(|(k, _)| self.node(*k).tag == VALUE_TAG) {
                    Some(&(_, value)) => self.scalar_text(value),
                    None => Err(self.expected("a scalar node", id)),
                }
            }
            NodeData::Sequence { .. } => Err(self.expected("a scalar node", id)),
        }
    }

    fn expected(&self, what: &str, id: NodeId) -> Error {
        let node = self.node(id);
        Error::constructor(
            None,
            format!("expected {}, but found {}", what, kind_name(node.kind())),
            node.start.clone(),
        )
    }

    /// An error pointing at `id`, for use by constructor handlers.
    pub fn invalid(&self, id: NodeId, context: &str, problem: String) -> Error {
        let node = self.node(id);
        Error::constructor(Some((context, node.start.clone())), problem, node.start.clone())
    }

    /// Construct the items of a sequence node into `target`.
    pub fn construct_sequence_into(&mut self, id: NodeId, target: &Rc<RefCell<Vec<Value>>>) -> Result<()> {
        let Some(items) = self.node(id).items() else {
            return Err(self.expected("a sequence node", id));
        };
        for &item in items {
            let value = self.construct_object(item)?;
            target.borrow_mut().push(value);
        }
        Ok(())
    }

    /// Construct the pairs of a mapping node into `target`, applying merge
    /// keys and checking for duplicate keys.
    pub fn construct_mapping_into(
        &mut self,
        id: NodeId,
        target: &Rc<RefCell<Vec<(Value, Value)>>>,
    ) -> Result<()> {
        let mut visiting = Vec::new();
        let pairs = self.flatten_mapping(id, &mut visiting)?;
        let mut scalar_keys: HashMap<ScalarKey, usize> = HashMap::new();
        let mut merged_positions: HashSet<usize> = HashSet::new();
        for (key_id, value_id, merged) in pairs {
            let key = self.construct_object(key_id)?;
            let value = self.construct_object(value_id)?;
            let existing = match ScalarKey::of(&key) {
                Some(fingerprint) => scalar_keys.get(&fingerprint).copied().or_else(|| {
                    scalar_keys.insert(fingerprint, target.borrow().len());
                    None
                }),
                None => target.borrow().iter().position(|(k, _)| *k == key),
            };
            match existing {
                Some(position) => {
                    // Merged entries give way to later ones; explicit
                    // entries may only repeat when allowed.
                    if !merged && !merged_positions.contains(&position) && !self.allow_duplicate_keys {
                        let key_node = self.node(key_id);
                        return Err(Error::constructor(
                            Some(("while constructing a mapping", self.node(id).start.clone())),
                            format!("found duplicate key {:?}", key),
                            key_node.start.clone(),
                        ));
                    }
                    if !merged {
                        merged_positions.remove(&position);
                    }
                    target.borrow_mut()[position].1 = value;
                }
                None => {
                    if merged {
                        merged_positions.insert(target.borrow().len());
                    }
                    target.borrow_mut().push((key, value));
                }
            }
        }
        Ok(())
    }

    /// The pairs of a mapping with `<<` entries replaced by the pairs they
    /// merge. Merged pairs come first, flagged `true`; among merge sources
    /// the earlier ones are placed last so they win.
    fn flatten_mapping(&self, id: NodeId, visiting: &mut Vec<NodeId>) -> Result<Vec<(NodeId, NodeId, bool)>> {
        let node = self.node(id);
        let Some(pairs) = node.pairs() else {
            return Err(self.expected("a mapping node", id));
        };
        if visiting.contains(&id) {
            return Err(self.invalid(id, "while constructing a mapping", "found recursive merge".into()));
        }
        visiting.push(id);
        let mut merge = Vec::new();
        let mut own = Vec::new();
        for &(key, value) in pairs {
            if self.node(key).tag != MERGE_TAG {
                own.push((key, value, false));
                continue;
            }
            let source = self.node(value);
            match &source.data {
                NodeData::Mapping { .. } => {
                    merge.extend(
                        self.flatten_mapping(value, visiting)?
                            .into_iter()
                            .map(|(k, v, _)| (k, v, true)),
                    );
                }
                NodeData::Sequence { items, .. } => {
                    let mut sources = Vec::new();
                    for &item in items {
                        if self.node(item).kind() != NodeKind::Mapping {
                            return Err(Error::constructor(
                                Some(("while constructing a mapping", node.start.clone())),
                                format!(
                                    "expected a mapping for merging, but found {}",
                                    kind_name(self.node(item).kind())
                                ),
                                self.node(item).start.clone(),
                            ));
                        }
                        sources.push(self.flatten_mapping(item, visiting)?);
                    }
                    for source in sources.into_iter().rev() {
                        merge.extend(source.into_iter().map(|(k, v, _)| (k, v, true)));
                    }
                }
                NodeData::Scalar { .. } => {
                    return Err(Error::constructor(
                        Some(("while constructing a mapping", node.start.clone())),
                        "expected a mapping or list of mappings for merging, but found scalar",
                        source.start.clone(),
                    ));
                }
            }
        }
        visiting.pop();
        merge.extend(own);
        Ok(merge)
    }
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Scalar => "scalar",
        NodeKind::Sequence => "sequence",
        NodeKind::Mapping => "mapping",
    }
}

fn construct_str(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    Ok(Value::String(c.scalar_text(id)?.to_string()))
}

fn construct_bool(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let text = c.scalar_text(id)?;
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" => Ok(Value::Bool(true)),
        "no" | "false" | "off" => Ok(Value::Bool(false)),
        _ => Err(c.invalid(id, "while constructing a boolean", format!("invalid boolean {:?}", text))),
    }
}

/// Split a leading sign off a numeric scalar with `_` separators removed.
fn split_sign(text: &str) -> (bool, String) {
    let cleaned: String = text.chars().filter(|&ch| ch != '_').collect();
    match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned).to_string()),
    }
}

fn parse_int(text: &str) -> Option<BigInt> {
    let (negative, digits) = split_sign(text);
    let magnitude = if digits == "0" {
        BigInt::from(0)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        BigInt::parse_bytes(bin.as_bytes(), 2)?
    } else if let Some(hex) = digits.strip_prefix("0x") {
        BigInt::parse_bytes(hex.as_bytes(), 16)?
    } else if digits.len() > 1 && digits.starts_with('0') {
        BigInt::parse_bytes(digits[1..].as_bytes(), 8)?
    } else if digits.contains(':') {
        let mut total = BigInt::from(0);
        for part in digits.split(':') {
            total = total * 60 + BigInt::parse_bytes(part.as_bytes(), 10)?;
        }
        total
    } else {
        BigInt::parse_bytes(digits.as_bytes(), 10)?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn construct_int(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let text = c.scalar_text(id)?;
    parse_int(text)
        .map(Value::Integer)
        .ok_or_else(|| c.invalid(id, "while constructing an integer", format!("invalid integer {:?}", text)))
}

fn parse_float(text: &str) -> Option<f64> {
    let (negative, digits) = split_sign(text);
    let digits = digits.to_ascii_lowercase();
    let sign = if negative { -1.0 } else { 1.0 };
    if digits == ".inf" {
        return Some(sign * f64::INFINITY);
    }
    if digits == ".nan" {
        return Some(f64::NAN);
    }
    if digits.contains(':') {
        let mut total = 0.0;
        for part in digits.split(':') {
            total = total * 60.0 + part.parse::<f64>().ok()?;
        }
        return Some(sign * total);
    }
    digits.parse::<f64>().ok().map(|f| sign * f)
}

fn construct_float(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let text = c.scalar_text(id)?;
    parse_float(text)
        .map(Value::Float)
        .ok_or_else(|| c.invalid(id, "while constructing a float", format!("invalid float {:?}", text)))
}

fn construct_binary(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let text = c.scalar_text(id)?;
    let cleaned: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map(Value::Binary)
        .map_err(|e| {
            c.invalid(
                id,
                "while constructing a binary value",
                format!("failed to decode base64 data: {}", e),
            )
        })
}

/// Parse a `!!timestamp` scalar.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let caps = TIMESTAMP.captures(text)?;
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
    let date = NaiveDate::from_ymd_opt(
        caps.name("year")?.as_str().parse().ok()?,
        number("month")?,
        number("day")?,
    )?;
    let Some(hour) = number("hour") else {
        return Some(Timestamp::Date(date));
    };
    let nanos = match caps.name("fraction").map(|m| m.as_str()) {
        Some(fraction) if !fraction.is_empty() => {
            let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
            digits.parse::<u32>().ok()?
        }
        _ => 0,
    };
    let naive = date.and_hms_nano_opt(hour, number("minute")?, number("second")?, nanos)?;
    if caps.name("tz").is_none() {
        return Some(Timestamp::Naive(naive));
    }
    let mut offset = 0i32;
    if let Some(tz_hour) = number("tz_hour") {
        let minutes = number("tz_minute").unwrap_or(0);
        offset = (tz_hour * 3600 + minutes * 60) as i32;
        if caps.name("tz_sign").map(|m| m.as_str()) == Some("-") {
            offset = -offset;
        }
    }
    let zone = FixedOffset::east_opt(offset)?;
    naive.and_local_timezone(zone).single().map(Timestamp::Offset)
}

fn construct_timestamp(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let text = c.scalar_text(id)?;
    parse_timestamp(text)
        .map(Value::Timestamp)
        .ok_or_else(|| c.invalid(id, "while constructing a timestamp", format!("invalid timestamp {:?}", text)))
}

fn construct_seq(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let items = Rc::new(RefCell::new(Vec::new()));
    c.remember(id, Value::Sequence(items.clone()));
    c.construct_sequence_into(id, &items)?;
    Ok(Value::Sequence(items))
}

fn construct_map(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let pairs = Rc::new(RefCell::new(Vec::new()));
    c.remember(id, Value::Mapping(pairs.clone()));
    c.construct_mapping_into(id, &pairs)?;
    Ok(Value::Mapping(pairs))
}

/// The single pair of each entry of an `!!omap` or `!!pairs` sequence.
fn single_pairs(c: &Constructor<'_>, id: NodeId, context: &str) -> Result<Vec<(NodeId, NodeId)>> {
    let node = c.node(id);
    let Some(items) = node.items() else {
        return Err(c.invalid(
            id,
            context,
            format!("expected a sequence, but found {}", kind_name(node.kind())),
        ));
    };
    let mut pairs = Vec::with_capacity(items.len());
    for &item in items {
        match c.node(item).pairs() {
            Some([pair]) => pairs.push(*pair),
            Some(entries) => {
                return Err(Error::constructor(
                    Some((context, node.start.clone())),
                    format!("expected a single mapping item, but found {} items", entries.len()),
                    c.node(item).start.clone(),
                ))
            }
            None => {
                return Err(Error::constructor(
                    Some((context, node.start.clone())),
                    format!(
                        "expected a mapping of length 1, but found {}",
                        kind_name(c.node(item).kind())
                    ),
                    c.node(item).start.clone(),
                ))
            }
        }
    }
    Ok(pairs)
}

fn construct_omap(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let pairs = Rc::new(RefCell::new(Vec::new()));
    c.remember(id, Value::Mapping(pairs.clone()));
    for (key, value) in single_pairs(c, id, "while constructing an ordered map")? {
        let key = c.construct_object(key)?;
        let value = c.construct_object(value)?;
        pairs.borrow_mut().push((key, value));
    }
    Ok(Value::Mapping(pairs))
}

fn construct_pairs(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let items = Rc::new(RefCell::new(Vec::new()));
    c.remember(id, Value::Sequence(items.clone()));
    for (key, value) in single_pairs(c, id, "while constructing pairs")? {
        let key = c.construct_object(key)?;
        let value = c.construct_object(value)?;
        items.borrow_mut().push(Value::sequence(vec![key, value]));
    }
    Ok(Value::Sequence(items))
}

fn construct_set(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let pairs = Rc::new(RefCell::new(Vec::new()));
    let set = Value::tagged(SET_TAG, Value::Mapping(pairs.clone()));
    c.remember(id, set.clone());
    c.construct_mapping_into(id, &pairs)?;
    Ok(set)
}

/// Keep a node with an unknown tag as a tagged value of its plain shape.
fn construct_undefined(c: &mut Constructor<'_>, id: NodeId) -> Result<Value> {
    let node = c.node(id);
    let tag = node.tag.clone();
    match &node.data {
        NodeData::Scalar { value, .. } => Ok(Value::tagged(tag, Value::String(value.clone()))),
        NodeData::Sequence { .. } => {
            let items = Rc::new(RefCell::new(Vec::new()));
            let tagged = Value::tagged(tag, Value::Sequence(items.clone()));
            c.remember(id, tagged.clone());
            c.construct_sequence_into(id, &items)?;
            Ok(tagged)
        }
        NodeData::Mapping { .. } => {
            let pairs = Rc::new(RefCell::new(Vec::new()));
            let tagged = Value::tagged(tag, Value::Mapping(pairs.clone()));
            c.remember(id, tagged.clone());
            c.construct_mapping_into(id, &pairs)?;
            Ok(tagged)
        }
    }
}
