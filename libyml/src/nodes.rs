//! The node graph shared by the composer, constructor, representer and
//! serializer.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The same id
//! may sit at several positions (an anchored node reached again through an
//! alias) or inside its own descendants (a cycle).

use std::ops::Index;

use crate::error::Mark;
use crate::tokens::ScalarStyle;

/// Handle of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Scalar,
    Sequence,
    Mapping,
}

impl NodeKind {
    /// The core-schema tag for nodes of this kind that carry no other tag.
    pub fn default_tag(self) -> &'static str {
        match self {
            NodeKind::Scalar => "tag:yaml.org,2002:str",
            NodeKind::Sequence => "tag:yaml.org,2002:seq",
            NodeKind::Mapping => "tag:yaml.org,2002:map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Scalar {
        value: String,
        style: Option<ScalarStyle>,
    },
    Sequence {
        items: Vec<NodeId>,
        flow_style: bool,
    },
    Mapping {
        pairs: Vec<(NodeId, NodeId)>,
        flow_style: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub data: NodeData,
    pub start: Mark,
    pub end: Mark,
}

impl Node {
    pub fn scalar(tag: impl Into<String>, value: impl Into<String>, style: Option<ScalarStyle>) -> Self {
        Self {
            tag: tag.into(),
            data: NodeData::Scalar {
                value: value.into(),
                style,
            },
            start: Mark::default(),
            end: Mark::default(),
        }
    }

    pub fn sequence(tag: impl Into<String>, flow_style: bool) -> Self {
        Self {
            tag: tag.into(),
            data: NodeData::Sequence {
                items: Vec::new(),
                flow_style,
            },
            start: Mark::default(),
            end: Mark::default(),
        }
    }

    pub fn mapping(tag: impl Into<String>, flow_style: bool) -> Self {
        Self {
            tag: tag.into(),
            data: NodeData::Mapping {
                pairs: Vec::new(),
                flow_style,
            },
            start: Mark::default(),
            end: Mark::default(),
        }
    }

    pub fn with_marks(mut self, start: Mark, end: Mark) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Scalar { .. } => NodeKind::Scalar,
            NodeData::Sequence { .. } => NodeKind::Sequence,
            NodeData::Mapping { .. } => NodeKind::Mapping,
        }
    }

    /// The text of a scalar node.
    pub fn scalar_value(&self) -> Option<&str> {
        match &self.data {
            NodeData::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[NodeId]> {
        match &self.data {
            NodeData::Sequence { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn pairs(&self) -> Option<&[(NodeId, NodeId)]> {
        match &self.data {
            NodeData::Mapping { pairs, .. } => Some(pairs),
            _ => None,
        }
    }
}

/// Arena of nodes for one document.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append an item to a sequence node; other nodes are left untouched.
    pub fn push_item(&mut self, sequence: NodeId, item: NodeId) {
        if let Some(Node {
            data: NodeData::Sequence { items, .. },
            ..
        }) = self.nodes.get_mut(sequence.0)
        {
            items.push(item);
        }
    }

    /// Append a pair to a mapping node; other nodes are left untouched.
    pub fn push_pair(&mut self, mapping: NodeId, key: NodeId, value: NodeId) {
        if let Some(Node {
            data: NodeData::Mapping { pairs, .. },
            ..
        }) = self.nodes.get_mut(mapping.0)
        {
            pairs.push((key, value));
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

/// One composed document.
#[derive(Debug, Clone)]
pub struct Document {
    pub graph: Graph,
    pub root: NodeId,
    pub start: Mark,
    pub end: Mark,
}
