//! Stage 4: Composer
//!
//! The composer turns the event stream into one node [`Graph`] per document.
//! Anchored nodes are registered before their children are composed, so an
//! alias inside a collection may refer to the collection itself.
//!
//! Composition keeps its own stack of open collections instead of recursing.
//! Nesting is still capped at [`DEFAULT_MAX_DEPTH`] (or the composer's own
//! limit) because constructing and dropping values recurse per level.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Mark, Result};
use crate::events::{Event, EventKind};
use crate::nodes::{Document, Graph, Node, NodeId, NodeKind};
use crate::parser::Parser;
use crate::resolver::{PathIndex, Resolver};

/// Collection nesting accepted by default.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// An open collection and, for mappings, the key awaiting its value.
struct Frame {
    id: NodeId,
    pending_key: Option<NodeId>,
}

pub struct Composer<'a> {
    parser: Parser<'a>,
    resolver: Resolver,
    anchors: HashMap<String, (NodeId, Mark)>,
    max_depth: usize,
}

impl<'a> Composer<'a> {
    pub fn new(parser: Parser<'a>, resolver: Resolver) -> Self {
        Self {
            parser,
            resolver,
            anchors: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    /// Whether another document is available.
    pub fn check_node(&mut self) -> Result<bool> {
        self.skip_stream_start()?;
        Ok(matches!(
            self.parser.peek_event()?.map(|e| &e.kind),
            Some(EventKind::DocumentStart { .. })
        ))
    }

    /// Compose the next document; `None` at the end of the stream.
    pub fn get_node(&mut self) -> Result<Option<Document>> {
        if self.check_node()? {
            return self.compose_document().map(Some);
        }
        self.parser.get_event()?;
        Ok(None)
    }

    /// Compose the only document of the stream; `None` for an empty stream.
    pub fn get_single_node(&mut self) -> Result<Option<Document>> {
        let document = if self.check_node()? {
            Some(self.compose_document()?)
        } else {
            None
        };
        if let Some(event) = self.parser.get_event()? {
            if !matches!(event.kind, EventKind::StreamEnd) {
                let context_mark = document.as_ref().map(|d| d.start.clone()).unwrap_or_default();
                return Err(Error::composer(
                    Some(("expected a single document in the stream", context_mark)),
                    "but found another document",
                    event.start,
                ));
            }
        }
        Ok(document)
    }

    fn skip_stream_start(&mut self) -> Result<()> {
        if matches!(
            self.parser.peek_event()?.map(|e| &e.kind),
            Some(EventKind::StreamStart)
        ) {
            self.parser.get_event()?;
        }
        Ok(())
    }

    fn next_event(&mut self) -> Result<Event> {
        self.parser.get_event()?.ok_or_else(|| {
            Error::composer(None, "unexpected end of the event stream", Mark::default())
        })
    }

    fn compose_document(&mut self) -> Result<Document> {
        let start = self.next_event()?.start;
        let mut graph = Graph::new();
        let root = self.compose_root(&mut graph)?;
        let end = self.next_event()?.end;
        self.anchors.clear();
        debug!(nodes = graph.len(), line = start.line + 1, "composed document");
        Ok(Document {
            graph,
            root,
            start,
            end,
        })
    }

    fn compose_root(&mut self, graph: &mut Graph) -> Result<NodeId> {
        let mut stack: Vec<Frame> = Vec::new();
        loop {
            let event = self.next_event()?;
            let (id, opened) = match event.kind {
                EventKind::Alias { anchor } => match self.anchors.get(&anchor) {
                    Some(&(id, _)) => (id, false),
                    None => {
                        return Err(Error::composer(
                            None,
                            format!("found undefined alias {:?}", anchor),
                            event.start,
                        ))
                    }
                },
                EventKind::Scalar {
                    anchor,
                    tag,
                    implicit,
                    value,
                    style,
                } => {
                    self.check_anchor(anchor.as_deref(), &event.start)?;
                    self.descend(graph, &stack);
                    let tag = self.resolve_tag(NodeKind::Scalar, tag, &value, implicit);
                    self.resolver.ascend_resolver();
                    let node = Node::scalar(tag, value, style).with_marks(event.start.clone(), event.end);
                    let id = graph.add(node);
                    self.register_anchor(anchor, id, event.start);
                    (id, false)
                }
                EventKind::SequenceStart {
                    anchor,
                    tag,
                    flow_style,
                    ..
                } => {
                    self.check_anchor(anchor.as_deref(), &event.start)?;
                    self.descend(graph, &stack);
                    let tag = self.resolve_tag(NodeKind::Sequence, tag, "", (true, false));
                    let node = Node::sequence(tag, flow_style).with_marks(event.start.clone(), event.end);
                    let id = graph.add(node);
                    self.register_anchor(anchor, id, event.start);
                    (id, true)
                }
                EventKind::MappingStart {
                    anchor,
                    tag,
                    flow_style,
                    ..
                } => {
                    self.check_anchor(anchor.as_deref(), &event.start)?;
                    self.descend(graph, &stack);
                    let tag = self.resolve_tag(NodeKind::Mapping, tag, "", (true, false));
                    let node = Node::mapping(tag, flow_style).with_marks(event.start.clone(), event.end);
                    let id = graph.add(node);
                    self.register_anchor(anchor, id, event.start);
                    (id, true)
                }
                EventKind::SequenceEnd | EventKind::MappingEnd => {
                    let Some(frame) = stack.pop() else {
                        return Err(Error::composer(None, "unexpected end of a collection", event.start));
                    };
                    if let Some(node) = graph.get_mut(frame.id) {
                        node.end = event.end;
                    }
                    self.resolver.ascend_resolver();
                    if stack.is_empty() {
                        return Ok(frame.id);
                    }
                    continue;
                }
                _ => {
                    return Err(Error::composer(
                        None,
                        format!("expected a node, but found {}", event_name(&event.kind)),
                        event.start,
                    ))
                }
            };
            match stack.last_mut() {
                Some(parent) => attach(graph, parent, id),
                None if !opened => return Ok(id),
                None => {}
            }
            if opened {
                if stack.len() >= self.max_depth {
                    let mark = graph[id].start.clone();
                    return Err(Error::composer(
                        Some(("while composing a collection", mark.clone())),
                        format!("exceeded the maximum nesting depth of {}", self.max_depth),
                        mark,
                    ));
                }
                stack.push(Frame { id, pending_key: None });
            }
        }
    }

    fn check_anchor(&self, anchor: Option<&str>, mark: &Mark) -> Result<()> {
        let Some(anchor) = anchor else {
            return Ok(());
        };
        match self.anchors.get(anchor) {
            Some((_, first)) => Err(Error::composer(
                Some((
                    format!("found duplicate anchor {:?}; first occurrence", anchor).as_str(),
                    first.clone(),
                )),
                "second occurrence",
                mark.clone(),
            )),
            None => Ok(()),
        }
    }

    fn register_anchor(&mut self, anchor: Option<String>, id: NodeId, mark: Mark) {
        if let Some(anchor) = anchor {
            self.anchors.insert(anchor, (id, mark));
        }
    }

    /// Enter the resolver path for the child about to be added under the
    /// innermost open collection.
    fn descend(&mut self, graph: &Graph, stack: &[Frame]) {
        let current = stack.last().map(|frame| {
            let parent = &graph[frame.id];
            let index = match (parent.items(), frame.pending_key) {
                (Some(items), _) => PathIndex::Item(items.len()),
                (None, Some(key)) => PathIndex::Value(&graph[key]),
                (None, None) => PathIndex::Key,
            };
            (parent, index)
        });
        self.resolver.descend_resolver(current);
    }

    /// A missing tag or the non-specific `!` is resolved; `!` never
    /// matches the implicit patterns.
    fn resolve_tag(&self, kind: NodeKind, tag: Option<String>, value: &str, implicit: (bool, bool)) -> String {
        match tag {
            Some(tag) if tag != "!" => tag,
            Some(_) => self.resolver.resolve(kind, value, (false, false)),
            None => self.resolver.resolve(kind, value, implicit),
        }
    }
}

fn attach(graph: &mut Graph, parent: &mut Frame, child: NodeId) {
    if graph[parent.id].kind() == NodeKind::Sequence {
        graph.push_item(parent.id, child);
        return;
    }
    match parent.pending_key.take() {
        Some(key) => graph.push_pair(parent.id, key, child),
        None => parent.pending_key = Some(child),
    }
}

fn event_name(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::StreamStart => "stream start",
        EventKind::StreamEnd => "stream end",
        EventKind::DocumentStart { .. } => "document start",
        EventKind::DocumentEnd { .. } => "document end",
        _ => "node event",
    }
}
