//! Stage 8: Serializer
//!
//! Walks a node graph and feeds events to the emitter. A first pass finds
//! nodes reached more than once and names them `id001`, `id002`, ...; the
//! second pass writes every other occurrence of such a node as an alias.
//! Tags that the resolver would infer anyway are marked implicit.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use tracing::debug;

use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::nodes::{Document, Graph, NodeData, NodeId, NodeKind};
use crate::options::EncodeOptions;
use crate::resolver::{PathIndex, Resolver};

#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    Key,
    Value(NodeId),
    Item(usize),
}

enum Task {
    Visit { id: NodeId, parent: Option<NodeId>, slot: Slot },
    Close(NodeKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Fresh,
    Open,
    Closed,
}

pub struct Serializer<W: Write> {
    emitter: Emitter<W>,
    resolver: Resolver,
    explicit_start: bool,
    explicit_end: bool,
    version: Option<(u32, u32)>,
    tags: Vec<(String, String)>,
    state: StreamState,
}

impl<W: Write> Serializer<W> {
    pub fn new(emitter: Emitter<W>, resolver: Resolver, options: &EncodeOptions) -> Self {
        Self {
            emitter,
            resolver,
            explicit_start: options.explicit_start,
            explicit_end: options.explicit_end,
            version: options.version,
            tags: options.tags.clone(),
            state: StreamState::Fresh,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        match self.state {
            StreamState::Fresh => {
                self.emitter.emit(Event::unmarked(EventKind::StreamStart))?;
                self.state = StreamState::Open;
                Ok(())
            }
            StreamState::Open => Err(Error::Emitter("serializer is already opened".into())),
            StreamState::Closed => Err(Error::Emitter("serializer is closed".into())),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self.state {
            StreamState::Fresh => Err(Error::Emitter("serializer is not opened".into())),
            StreamState::Open => {
                self.emitter.emit(Event::unmarked(EventKind::StreamEnd))?;
                self.state = StreamState::Closed;
                Ok(())
            }
            StreamState::Closed => Ok(()),
        }
    }

    pub fn serialize(&mut self, document: &Document) -> Result<()> {
        match self.state {
            StreamState::Fresh => return Err(Error::Emitter("serializer is not opened".into())),
            StreamState::Closed => return Err(Error::Emitter("serializer is closed".into())),
            StreamState::Open => {}
        }
        let anchors = anchor_nodes(&document.graph, document.root);
        debug!(nodes = document.graph.len(), anchors = anchors.len(), "serializing document");
        self.emitter.emit(Event::unmarked(EventKind::DocumentStart {
            explicit: self.explicit_start,
            version: self.version,
            tags: self.tags.clone(),
        }))?;
        self.serialize_root(&document.graph, document.root, &anchors)?;
        self.emitter.emit(Event::unmarked(EventKind::DocumentEnd {
            explicit: self.explicit_end,
        }))
    }

    /// Bytes the emitter has written so far.
    pub fn written(&self) -> usize {
        self.emitter.written()
    }

    pub fn into_inner(self) -> W {
        self.emitter.into_inner()
    }

    fn serialize_root(&mut self, graph: &Graph, root: NodeId, anchors: &HashMap<NodeId, String>) -> Result<()> {
        let mut serialized: HashSet<NodeId> = HashSet::new();
        let mut tasks = vec![Task::Visit {
            id: root,
            parent: None,
            slot: Slot::Root,
        }];
        while let Some(task) = tasks.pop() {
            let (id, parent, slot) = match task {
                Task::Visit { id, parent, slot } => (id, parent, slot),
                Task::Close(kind) => {
                    let end = match kind {
                        NodeKind::Mapping => EventKind::MappingEnd,
                        _ => EventKind::SequenceEnd,
                    };
                    self.emitter.emit(Event::unmarked(end))?;
                    self.resolver.ascend_resolver();
                    continue;
                }
            };
            let anchor = anchors.get(&id).cloned();
            if !serialized.insert(id) {
                let Some(anchor) = anchor else {
                    return Err(Error::Emitter(format!("node {} is repeated without an anchor", id.index())));
                };
                self.emitter.emit(Event::unmarked(EventKind::Alias { anchor }))?;
                continue;
            }
            let current = parent.map(|p| {
                let index = match slot {
                    Slot::Key | Slot::Root => PathIndex::Key,
                    Slot::Value(key) => PathIndex::Value(&graph[key]),
                    Slot::Item(i) => PathIndex::Item(i),
                };
                (&graph[p], index)
            });
            self.resolver.descend_resolver(current);
            let node = &graph[id];
            let tag = Some(node.tag.clone());
            match &node.data {
                NodeData::Scalar { value, style } => {
                    let detected = self.resolver.resolve(NodeKind::Scalar, value, (true, false));
                    let default = self.resolver.resolve(NodeKind::Scalar, value, (false, true));
                    let implicit = (node.tag == detected, node.tag == default);
                    self.emitter.emit(Event::unmarked(EventKind::Scalar {
                        anchor,
                        tag,
                        implicit,
                        value: value.clone(),
                        style: *style,
                    }))?;
                    self.resolver.ascend_resolver();
                }
                NodeData::Sequence { items, flow_style } => {
                    let implicit = node.tag == self.resolver.resolve(NodeKind::Sequence, "", (true, false));
                    self.emitter.emit(Event::unmarked(EventKind::SequenceStart {
                        anchor,
                        tag,
                        implicit,
                        flow_style: *flow_style,
                    }))?;
                    tasks.push(Task::Close(NodeKind::Sequence));
                    for (i, &item) in items.iter().enumerate().rev() {
                        tasks.push(Task::Visit {
                            id: item,
                            parent: Some(id),
                            slot: Slot::Item(i),
                        });
                    }
                }
                NodeData::Mapping { pairs, flow_style } => {
                    let implicit = node.tag == self.resolver.resolve(NodeKind::Mapping, "", (true, false));
                    self.emitter.emit(Event::unmarked(EventKind::MappingStart {
                        anchor,
                        tag,
                        implicit,
                        flow_style: *flow_style,
                    }))?;
                    tasks.push(Task::Close(NodeKind::Mapping));
                    for &(key, value) in pairs.iter().rev() {
                        tasks.push(Task::Visit {
                            id: value,
                            parent: Some(id),
                            slot: Slot::Value(key),
                        });
                        tasks.push(Task::Visit {
                            id: key,
                            parent: Some(id),
                            slot: Slot::Key,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Names for the nodes reached more than once, numbered in the order their
/// second occurrence is found.
fn anchor_nodes(graph: &Graph, root: NodeId) -> HashMap<NodeId, String> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut anchors: HashMap<NodeId, String> = HashMap::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            if !anchors.contains_key(&id) {
                let name = format!("id{:03}", anchors.len() + 1);
                anchors.insert(id, name);
            }
            continue;
        }
        match &graph[id].data {
            NodeData::Scalar { .. } => {}
            NodeData::Sequence { items, .. } => stack.extend(items.iter().rev()),
            NodeData::Mapping { pairs, .. } => {
                for &(key, value) in pairs.iter().rev() {
                    stack.push(value);
                    stack.push(key);
                }
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Node;
    use crate::resolver::{IndexCheck, NodeCheck, INT_TAG, STR_TAG};

    fn serialize_with(document: &Document, resolver: Resolver, options: &EncodeOptions) -> String {
        let emitter = Emitter::new(Vec::new(), options);
        let mut serializer = Serializer::new(emitter, resolver, options);
        serializer.open().unwrap();
        serializer.serialize(document).unwrap();
        serializer.close().unwrap();
        String::from_utf8(serializer.into_inner()).unwrap()
    }

    fn serialize(document: &Document) -> String {
        serialize_with(document, Resolver::new(), &EncodeOptions::default())
    }

    fn document(graph: Graph, root: NodeId) -> Document {
        Document {
            graph,
            root,
            start: Default::default(),
            end: Default::default(),
        }
    }

    #[test]
    fn test_implicit_tags() {
        let mut graph = Graph::new();
        let root = graph.add(Node::sequence(NodeKind::Sequence.default_tag(), false));
        for (tag, text) in [(INT_TAG, "123"), (STR_TAG, "123"), (STR_TAG, "abc"), (STR_TAG, "yes")] {
            let item = graph.add(Node::scalar(tag, text, None));
            graph.push_item(root, item);
        }
        assert_eq!(serialize(&document(graph, root)), "- 123\n- '123'\n- abc\n- 'yes'\n");
    }

    #[test]
    fn test_anchors_and_aliases() {
        let mut graph = Graph::new();
        let root = graph.add(Node::mapping(NodeKind::Mapping.default_tag(), false));
        let shared = graph.add(Node::sequence(NodeKind::Sequence.default_tag(), true));
        let one = graph.add(Node::scalar(INT_TAG, "1", None));
        graph.push_item(shared, one);
        for key in ["a", "b"] {
            let key = graph.add(Node::scalar(STR_TAG, key, None));
            graph.push_pair(root, key, shared);
        }
        assert_eq!(serialize(&document(graph, root)), "a: &id001 [1]\nb: *id001\n");
    }

    #[test]
    fn test_self_reference() {
        let mut graph = Graph::new();
        let root = graph.add(Node::sequence(NodeKind::Sequence.default_tag(), false));
        graph.push_item(root, root);
        assert_eq!(serialize(&document(graph, root)), "&id001\n- *id001\n");
    }

    #[test]
    fn test_anchor_numbering() {
        let mut graph = Graph::new();
        let root = graph.add(Node::sequence(NodeKind::Sequence.default_tag(), false));
        let first = graph.add(Node::scalar(STR_TAG, "x", None));
        let second = graph.add(Node::scalar(STR_TAG, "y", None));
        for item in [second, first, first, second] {
            graph.push_item(root, item);
        }
        let names = anchor_nodes(&graph, root);
        assert_eq!(names[&first], "id001");
        assert_eq!(names[&second], "id002");
    }

    #[test]
    fn test_path_resolver_makes_tag_implicit() {
        let mut resolver = Resolver::new();
        resolver
            .add_path_resolver(
                "!point",
                vec![(NodeCheck::Kind(NodeKind::Mapping), IndexCheck::KeyText("at".into()))],
                Some(NodeKind::Mapping),
            )
            .unwrap();
        let mut graph = Graph::new();
        let root = graph.add(Node::mapping(NodeKind::Mapping.default_tag(), false));
        let key = graph.add(Node::scalar(STR_TAG, "at", None));
        let point = graph.add(Node::mapping("!point", true));
        let x = graph.add(Node::scalar(STR_TAG, "x", None));
        let one = graph.add(Node::scalar(INT_TAG, "1", None));
        graph.push_pair(point, x, one);
        graph.push_pair(root, key, point);
        let out = serialize_with(&document(graph, root), resolver, &EncodeOptions::default());
        assert_eq!(out, "at: {x: 1}\n");
    }

    #[test]
    fn test_explicit_markers() {
        let mut graph = Graph::new();
        let root = graph.add(Node::scalar(STR_TAG, "abc", None));
        let options = EncodeOptions::default()
            .with_explicit_start(true)
            .with_explicit_end(true);
        let out = serialize_with(&document(graph, root), Resolver::new(), &options);
        assert_eq!(out, "--- abc\n...\n");
    }

    #[test]
    fn test_stream_state_errors() {
        let mut graph = Graph::new();
        let root = graph.add(Node::scalar(STR_TAG, "abc", None));
        let doc = document(graph, root);
        let options = EncodeOptions::default();
        let mut serializer = Serializer::new(Emitter::new(Vec::new(), &options), Resolver::new(), &options);
        assert!(serializer.serialize(&doc).is_err());
        serializer.open().unwrap();
        assert!(serializer.open().is_err());
        serializer.close().unwrap();
        let err = serializer.serialize(&doc).unwrap_err();
        assert_eq!(err.to_string(), "emitter: serializer is closed");
    }
}
