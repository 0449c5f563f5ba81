//! Stage 7: Representer
//!
//! Turns a [`Value`] into a node graph. Shared containers become one node
//! reached from several places, which the serializer later writes as an
//! anchor and aliases.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::constructor::BINARY_TAG;
use crate::error::{Error, Mark, Result};
use crate::nodes::{Document, Graph, Node, NodeId};
use crate::options::FlowStyle;
use crate::resolver::{BOOL_TAG, FLOAT_TAG, INT_TAG, MAP_TAG, NULL_TAG, SEQ_TAG, STR_TAG, TIMESTAMP_TAG};
use crate::tokens::ScalarStyle;
use crate::value::Value;

const BASE64_LINE: usize = 76;

pub struct Representer {
    graph: Graph,
    /// Container identity to its node.
    memo: HashMap<usize, NodeId>,
    /// Containers whose children are still to be represented.
    pending: Vec<(NodeId, Value)>,
    flow_style: FlowStyle,
}

impl Representer {
    pub fn new(flow_style: FlowStyle) -> Self {
        Self {
            graph: Graph::new(),
            memo: HashMap::new(),
            pending: Vec::new(),
            flow_style,
        }
    }

    /// Build the node graph of one document.
    pub fn represent(mut self, value: &Value) -> Result<Document> {
        let root = self.node_for(value)?;
        while let Some((id, container)) = self.pending.pop() {
            self.fill(id, &container)?;
        }
        debug!(nodes = self.graph.len(), shared = self.shared_count(), "represented document");
        Ok(Document {
            graph: self.graph,
            root,
            start: Mark::default(),
            end: Mark::default(),
        })
    }

    fn shared_count(&self) -> usize {
        let mut seen = vec![0u8; self.graph.len()];
        for id in self.graph.ids() {
            let node = &self.graph[id];
            let children = node
                .items()
                .map(|items| items.to_vec())
                .or_else(|| node.pairs().map(|pairs| pairs.iter().flat_map(|&(k, v)| [k, v]).collect()))
                .unwrap_or_default();
            for child in children {
                seen[child.index()] = seen[child.index()].saturating_add(1);
            }
        }
        seen.iter().filter(|&&count| count > 1).count()
    }

    /// The node for `value`. Containers get an empty node that is filled
    /// later, so a container that is reached again maps to the same node.
    fn node_for(&mut self, value: &Value) -> Result<NodeId> {
        if let Some(identity) = value.identity() {
            if let Some(&id) = self.memo.get(&identity) {
                return Ok(id);
            }
        }
        let id = match value {
            Value::Sequence(items) => {
                let flow = self.flow_for(items.borrow().iter());
                self.open(value, Node::sequence(SEQ_TAG, flow))
            }
            Value::Mapping(pairs) => {
                let flow = self.flow_for(pairs.borrow().iter().flat_map(|(k, v)| [k, v]));
                self.open(value, Node::mapping(MAP_TAG, flow))
            }
            Value::Tagged(tagged) => {
                if tagged.tag.is_empty() {
                    return Err(Error::Representer("tagged value has an empty tag".into()));
                }
                match &tagged.value {
                    Value::Tagged(inner) => {
                        return Err(Error::Representer(format!(
                            "tagged value {:?} wraps another tagged value {:?}",
                            tagged.tag, inner.tag
                        )))
                    }
                    Value::Sequence(items) => {
                        let flow = self.flow_for(items.borrow().iter());
                        let id = self.graph.add(Node::sequence(tagged.tag.clone(), flow));
                        self.register(value, id);
                        self.pending.push((id, tagged.value.clone()));
                        id
                    }
                    Value::Mapping(pairs) => {
                        let flow = self.flow_for(pairs.borrow().iter().flat_map(|(k, v)| [k, v]));
                        let id = self.graph.add(Node::mapping(tagged.tag.clone(), flow));
                        self.register(value, id);
                        self.pending.push((id, tagged.value.clone()));
                        id
                    }
                    scalar => {
                        let (_, text, style) = represent_scalar(scalar)?;
                        let id = self.graph.add(Node::scalar(tagged.tag.clone(), text, style));
                        self.register(value, id);
                        id
                    }
                }
            }
            scalar => {
                let (tag, text, style) = represent_scalar(scalar)?;
                self.graph.add(Node::scalar(tag, text, style))
            }
        };
        Ok(id)
    }

    fn open(&mut self, value: &Value, node: Node) -> NodeId {
        let id = self.graph.add(node);
        self.register(value, id);
        self.pending.push((id, value.clone()));
        id
    }

    fn register(&mut self, value: &Value, id: NodeId) {
        if let Some(identity) = value.identity() {
            self.memo.insert(identity, id);
        }
    }

    fn fill(&mut self, id: NodeId, container: &Value) -> Result<()> {
        match container {
            Value::Sequence(items) => {
                let items = items.borrow().clone();
                for item in &items {
                    let child = self.node_for(item)?;
                    self.graph.push_item(id, child);
                }
            }
            Value::Mapping(pairs) => {
                let pairs = pairs.borrow().clone();
                for (key, value) in &pairs {
                    let key = self.node_for(key)?;
                    let value = self.node_for(value)?;
                    self.graph.push_pair(id, key, value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Auto layout uses flow style only when every child is an unstyled
    /// scalar.
    fn flow_for<'v>(&self, mut children: impl Iterator<Item = &'v Value>) -> bool {
        match self.flow_style {
            FlowStyle::Block => false,
            FlowStyle::Flow => true,
            FlowStyle::Auto => children.all(is_simple_scalar),
        }
    }
}

fn is_simple_scalar(value: &Value) -> bool {
    match value {
        Value::Sequence(_) | Value::Mapping(_) | Value::Binary(_) => false,
        Value::Tagged(tagged) => !matches!(
            tagged.value,
            Value::Sequence(_) | Value::Mapping(_) | Value::Binary(_)
        ),
        _ => true,
    }
}

/// Tag, text and style of a scalar value.
fn represent_scalar(value: &Value) -> Result<(&'static str, String, Option<ScalarStyle>)> {
    Ok(match value {
        Value::Null => (NULL_TAG, "null".to_string(), None),
        Value::Bool(b) => (BOOL_TAG, b.to_string(), None),
        Value::Integer(n) => (INT_TAG, n.to_string(), None),
        Value::Float(f) => (FLOAT_TAG, format_float(*f), None),
        Value::String(s) => (STR_TAG, s.clone(), None),
        Value::Binary(bytes) => (BINARY_TAG, encode_base64(bytes), Some(ScalarStyle::Literal)),
        Value::Timestamp(t) => (TIMESTAMP_TAG, t.to_string(), None),
        other => {
            return Err(Error::Representer(format!("{:?} is not a scalar", other)));
        }
    })
}

/// Float text the resolver reads back as a float: always a `.`, and an
/// exponent with an explicit sign.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return ".nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { ".inf" } else { "-.inf" }.to_string();
    }
    let text = format!("{:?}", f);
    let (mantissa, exponent) = match text.split_once('e') {
        Some((m, e)) => (m.to_string(), Some(e.to_string())),
        None => (text, None),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa
    } else {
        format!("{}.0", mantissa)
    };
    match exponent {
        Some(e) if e.starts_with('-') => format!("{}e{}", mantissa, e),
        Some(e) => format!("{}e+{}", mantissa, e),
        None => mantissa,
    }
}

/// Base64 in lines of 76 characters, each ending with a newline.
fn encode_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut text = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE + 1);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        text.push_str(&String::from_utf8_lossy(chunk));
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NodeData, NodeKind};

    fn represent(value: &Value) -> Document {
        Representer::new(FlowStyle::Auto).represent(value).unwrap()
    }

    #[test]
    fn test_scalars() {
        let doc = represent(&Value::sequence(vec![
            Value::Null,
            Value::Bool(true),
            Value::from(42),
            Value::from("text"),
        ]));
        let root = &doc.graph[doc.root];
        let values: Vec<_> = root
            .items()
            .unwrap()
            .iter()
            .map(|&id| (doc.graph[id].tag.as_str(), doc.graph[id].scalar_value().unwrap()))
            .collect();
        assert_eq!(
            values,
            [(NULL_TAG, "null"), (BOOL_TAG, "true"), (INT_TAG, "42"), (STR_TAG, "text")]
        );
    }

    #[test]
    fn test_floats() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(1e20), "1.0e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-7");
        assert_eq!(format_float(f64::NAN), ".nan");
        assert_eq!(format_float(f64::NEG_INFINITY), "-.inf");
    }

    #[test]
    fn test_binary_lines() {
        let text = encode_base64(&[0u8; 100]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_shared_container_is_one_node() {
        let shared = Value::sequence(vec![Value::from(1)]);
        let doc = represent(&Value::mapping(vec![
            (Value::from("a"), shared.clone()),
            (Value::from("b"), shared),
        ]));
        let pairs = doc.graph[doc.root].pairs().unwrap();
        assert_eq!(pairs[0].1, pairs[1].1);
    }

    #[test]
    fn test_cycle() {
        let seq = Value::sequence(Vec::new());
        if let Value::Sequence(items) = &seq {
            items.borrow_mut().push(seq.clone());
        }
        let doc = represent(&seq);
        assert_eq!(doc.graph[doc.root].items(), Some(&[doc.root][..]));
    }

    #[test]
    fn test_flow_style() {
        let value = Value::mapping(vec![
            (Value::from("a"), Value::sequence(vec![Value::from(1)])),
        ]);
        let doc = represent(&value);
        let root = &doc.graph[doc.root];
        assert!(matches!(root.data, NodeData::Mapping { flow_style: false, .. }));
        let inner = &doc.graph[root.pairs().unwrap()[0].1];
        assert!(matches!(inner.data, NodeData::Sequence { flow_style: true, .. }));

        let doc = Representer::new(FlowStyle::Block).represent(&value).unwrap();
        let inner = &doc.graph[doc.graph[doc.root].pairs().unwrap()[0].1];
        assert!(matches!(inner.data, NodeData::Sequence { flow_style: false, .. }));
    }

    #[test]
    fn test_tagged() {
        let doc = represent(&Value::tagged("!point", Value::mapping(Vec::new())));
        assert_eq!(doc.graph[doc.root].tag, "!point");
        assert_eq!(doc.graph[doc.root].kind(), NodeKind::Mapping);

        let err = Representer::new(FlowStyle::Auto)
            .represent(&Value::tagged("", Value::Null))
            .unwrap_err();
        assert!(err.to_string().contains("empty tag"));
        let err = Representer::new(FlowStyle::Auto)
            .represent(&Value::tagged("!a", Value::tagged("!b", Value::Null)))
            .unwrap_err();
        assert!(err.to_string().contains("wraps another tagged value"));
    }

    #[test]
    fn test_deep_nesting() {
        let mut value = Value::Null;
        for _ in 0..2_000 {
            value = Value::sequence(vec![value]);
        }
        let doc = represent(&value);
        assert_eq!(doc.graph.len(), 2_001);
    }
}
