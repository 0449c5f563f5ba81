//! Tag resolution.
//!
//! Plain scalars get their tag from an ordered list of regular expressions,
//! bucketed by the first character of the text so only a few patterns are
//! tried per scalar. Collections (and scalars that no pattern claims) may be
//! tagged by path resolvers, which match the chain of parents and keys that
//! leads to a node. The same resolver runs on the encode side to decide
//! whether a tag can be left implicit.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::nodes::{Node, NodeKind};

pub const BOOL_TAG: &str = "tag:yaml.org,2002:bool";
pub const FLOAT_TAG: &str = "tag:yaml.org,2002:float";
pub const INT_TAG: &str = "tag:yaml.org,2002:int";
pub const MERGE_TAG: &str = "tag:yaml.org,2002:merge";
pub const NULL_TAG: &str = "tag:yaml.org,2002:null";
pub const TIMESTAMP_TAG: &str = "tag:yaml.org,2002:timestamp";
pub const VALUE_TAG: &str = "tag:yaml.org,2002:value";
pub const STR_TAG: &str = "tag:yaml.org,2002:str";
pub const SEQ_TAG: &str = "tag:yaml.org,2002:seq";
pub const MAP_TAG: &str = "tag:yaml.org,2002:map";

/// Built-in implicit resolvers in registration order: tag, pattern, first
/// characters.
static BUILTIN: Lazy<Vec<(&'static str, Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            BOOL_TAG,
            r"^(?:yes|Yes|YES|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF)$",
            "yYnNtTfFoO",
        ),
        (
            FLOAT_TAG,
            r"^(?:[-+]?(?:[0-9][0-9_]*)\.[0-9_]*(?:[eE][-+][0-9]+)?|\._*[0-9][0-9_]*(?:[eE][-+][0-9]+)?|[-+]?[0-9][0-9_]*(?::[0-5]?[0-9])+\.[0-9_]*|[-+]?\.(?:inf|Inf|INF)|\.(?:nan|NaN|NAN))$",
            "-+0123456789.",
        ),
        (
            INT_TAG,
            r"^(?:[-+]?0b[0-1_]+|[-+]?0[0-7_]+|[-+]?(?:0|[1-9][0-9_]*)|[-+]?0x[0-9a-fA-F_]+|[-+]?[1-9][0-9_]*(?::[0-5]?[0-9])+)$",
            "-+0123456789",
        ),
        (MERGE_TAG, r"^(?:<<)$", "<"),
        (NULL_TAG, r"^(?:~|null|Null|NULL|)$", "~nN"),
        (
            TIMESTAMP_TAG,
            r"^(?:[0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}(?:[Tt]|[ \t]+)[0-9]{1,2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]*)?(?:[ \t]*(?:Z|[-+][0-9]{1,2}(?::[0-9]{2})?))?)$",
            "0123456789",
        ),
        (VALUE_TAG, r"^(?:=)$", "="),
    ]
    .into_iter()
    .map(|(tag, pattern, first)| (tag, Regex::new(pattern).expect("built-in resolver pattern"), first))
    .collect()
});

/// What a path element requires of the parent collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCheck {
    Any,
    Kind(NodeKind),
    Tag(String),
}

/// Which child of the parent a path element selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCheck {
    /// Any sequence item or mapping value.
    AnyValue,
    /// A mapping key.
    Key,
    /// The value stored under the scalar key with this text.
    KeyText(String),
    /// The sequence item at this position.
    Index(usize),
}

/// Where the node being resolved sits inside its parent.
#[derive(Debug, Clone, Copy)]
pub enum PathIndex<'n> {
    Key,
    Value(&'n Node),
    Item(usize),
}

#[derive(Debug, Clone)]
struct PathResolver {
    tag: String,
    path: Vec<(NodeCheck, IndexCheck)>,
    kind: Option<NodeKind>,
}

type ImplicitResolver = (String, Regex);

/// Implicit and path-based tag resolution.
#[derive(Debug, Clone)]
pub struct Resolver {
    buckets: HashMap<char, Vec<ImplicitResolver>>,
    empty: Vec<ImplicitResolver>,
    wildcard: Vec<ImplicitResolver>,
    path_resolvers: Vec<PathResolver>,
    exact_paths: Vec<Vec<(Option<NodeKind>, String)>>,
    prefix_paths: Vec<Vec<usize>>,
}

impl Default for Resolver {
    fn default() -> Self {
        let mut resolver = Self::empty();
        for (tag, regex, first) in BUILTIN.iter() {
            resolver.insert_implicit(tag, regex.clone(), Some(*first));
        }
        resolver
    }
}

impl Resolver {
    /// A resolver with the YAML 1.1 implicit types.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver with no implicit types: every plain scalar is a string.
    pub fn empty() -> Self {
        Self {
            buckets: HashMap::new(),
            empty: Vec::new(),
            wildcard: Vec::new(),
            path_resolvers: Vec::new(),
            exact_paths: Vec::new(),
            prefix_paths: Vec::new(),
        }
    }

    /// Register an implicit resolver. `first` lists the characters a
    /// matching scalar may start with; `None` tries the pattern on every
    /// scalar. Patterns that match the empty string also apply to empty
    /// scalars.
    pub fn add_implicit_resolver(&mut self, tag: &str, pattern: &str, first: Option<&str>) -> Result<()> {
        if tag.is_empty() {
            return Err(Error::Resolver("implicit resolver tag must not be empty".into()));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Resolver(format!("invalid pattern for {}: {}", tag, e)))?;
        self.insert_implicit(tag, regex, first);
        Ok(())
    }

    fn insert_implicit(&mut self, tag: &str, regex: Regex, first: Option<&str>) {
        let entry = (tag.to_string(), regex);
        if entry.1.is_match("") {
            self.empty.push(entry.clone());
        }
        match first {
            Some(chars) => {
                for ch in chars.chars() {
                    self.buckets.entry(ch).or_default().push(entry.clone());
                }
            }
            None => self.wildcard.push(entry),
        }
    }

    /// Register a path resolver: nodes of `kind` (any kind when `None`)
    /// reached through `path` get `tag`.
    pub fn add_path_resolver(
        &mut self,
        tag: &str,
        path: Vec<(NodeCheck, IndexCheck)>,
        kind: Option<NodeKind>,
    ) -> Result<()> {
        if tag.is_empty() {
            return Err(Error::Resolver("path resolver tag must not be empty".into()));
        }
        for (depth, (node_check, _)) in path.iter().enumerate() {
            if matches!(node_check, NodeCheck::Tag(t) if t.is_empty()) {
                return Err(Error::Resolver(format!(
                    "invalid node checker at path element {}: empty tag",
                    depth
                )));
            }
        }
        self.path_resolvers.push(PathResolver {
            tag: tag.to_string(),
            path,
            kind,
        });
        Ok(())
    }

    /// Enter a child of `current`; `None` enters the document root.
    pub fn descend_resolver(&mut self, current: Option<(&Node, PathIndex<'_>)>) {
        if self.path_resolvers.is_empty() {
            return;
        }
        let mut exact = Vec::new();
        let mut prefix = Vec::new();
        match current {
            Some((node, index)) => {
                let depth = self.prefix_paths.len();
                for &i in self.prefix_paths.last().map(Vec::as_slice).unwrap_or(&[]) {
                    let resolver = &self.path_resolvers[i];
                    if check_resolver_prefix(depth, &resolver.path, node, index) {
                        if resolver.path.len() > depth {
                            prefix.push(i);
                        } else {
                            exact.push((resolver.kind, resolver.tag.clone()));
                        }
                    }
                }
            }
            None => {
                for (i, resolver) in self.path_resolvers.iter().enumerate() {
                    if resolver.path.is_empty() {
                        exact.push((resolver.kind, resolver.tag.clone()));
                    } else {
                        prefix.push(i);
                    }
                }
            }
        }
        self.exact_paths.push(exact);
        self.prefix_paths.push(prefix);
    }

    pub fn ascend_resolver(&mut self) {
        if self.path_resolvers.is_empty() {
            return;
        }
        self.exact_paths.pop();
        self.prefix_paths.pop();
    }

    /// The tag for a node of `kind` with text `value` (ignored for
    /// collections). `implicit.0` allows pattern matching; `implicit.1` is
    /// carried for quoted scalars.
    pub fn resolve(&self, kind: NodeKind, value: &str, implicit: (bool, bool)) -> String {
        if kind == NodeKind::Scalar && implicit.0 {
            let (bucket, wildcard): (&[ImplicitResolver], &[ImplicitResolver]) =
                match value.chars().next() {
                    None => (&self.empty, &[]),
                    Some(ch) => (
                        self.buckets.get(&ch).map(Vec::as_slice).unwrap_or(&[]),
                        &self.wildcard,
                    ),
                };
            let found = bucket
                .iter()
                .chain(wildcard)
                .find(|(_, regex)| regex.is_match(value));
            if let Some((tag, _)) = found {
                return tag.clone();
            }
        }
        if let Some(exact) = self.exact_paths.last() {
            let by_kind = exact.iter().find(|(k, _)| *k == Some(kind));
            let any = exact.iter().find(|(k, _)| k.is_none());
            if let Some((_, tag)) = by_kind.or(any) {
                return tag.clone();
            }
        }
        kind.default_tag().to_string()
    }
}

fn check_resolver_prefix(
    depth: usize,
    path: &[(NodeCheck, IndexCheck)],
    node: &Node,
    index: PathIndex<'_>,
) -> bool {
    let Some((node_check, index_check)) = depth.checked_sub(1).and_then(|d| path.get(d)) else {
        return false;
    };
    let node_ok = match node_check {
        NodeCheck::Any => true,
        NodeCheck::Kind(kind) => node.kind() == *kind,
        NodeCheck::Tag(tag) => node.tag == *tag,
    };
    node_ok
        && match (index_check, index) {
            (IndexCheck::Key, PathIndex::Key) => true,
            (IndexCheck::Key, _) => false,
            (IndexCheck::AnyValue, PathIndex::Key) => false,
            (IndexCheck::AnyValue, _) => true,
            (IndexCheck::KeyText(text), PathIndex::Value(key)) => key.scalar_value() == Some(text.as_str()),
            (IndexCheck::KeyText(_), _) => false,
            (IndexCheck::Index(i), PathIndex::Item(j)) => *i == j,
            (IndexCheck::Index(_), _) => false,
        }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(value: &str) -> String {
        Resolver::new().resolve(NodeKind::Scalar, value, (true, false))
    }

    #[test]
    fn test_resolve_bool() {
        for text in ["yes", "No", "TRUE", "false", "on", "OFF"] {
            assert_eq!(plain(text), BOOL_TAG, "{}", text);
        }
        assert_eq!(plain("yEs"), STR_TAG);
    }

    #[test]
    fn test_resolve_numbers() {
        for text in ["123", "-17", "0b1010", "0x_1F", "0777", "1_000", "190:20:30"] {
            assert_eq!(plain(text), INT_TAG, "{}", text);
        }
        for text in ["1.5", "-1.0e+3", ".5", ".inf", "-.Inf", ".NaN", "190:20:30.15", "1."] {
            assert_eq!(plain(text), FLOAT_TAG, "{}", text);
        }
        assert_eq!(plain("1e3"), STR_TAG);
        assert_eq!(plain("0x"), STR_TAG);
        // A mantissa needs at least one digit.
        assert_eq!(plain("._5"), FLOAT_TAG);
        for text in [".", "._", "._e+1", "-._"] {
            assert_eq!(plain(text), STR_TAG, "{}", text);
        }
    }

    #[test]
    fn test_resolve_null_and_specials() {
        for text in ["", "~", "null", "Null", "NULL"] {
            assert_eq!(plain(text), NULL_TAG, "{:?}", text);
        }
        assert_eq!(plain("<<"), MERGE_TAG);
        assert_eq!(plain("="), VALUE_TAG);
        assert_eq!(plain("nil"), STR_TAG);
    }

    #[test]
    fn test_resolve_timestamp() {
        for text in [
            "2001-01-01",
            "2001-12-14t21:59:43.10-05:00",
            "2001-12-14 21:59:43.10 -5",
            "2001-12-15T02:59:43.1Z",
            "2002-12-14",
        ] {
            assert_eq!(plain(text), TIMESTAMP_TAG, "{}", text);
        }
        assert_eq!(plain("2001-1-1"), STR_TAG);
    }

    #[test]
    fn test_quoted_scalars_are_strings() {
        let r = Resolver::new();
        assert_eq!(r.resolve(NodeKind::Scalar, "123", (false, true)), STR_TAG);
        assert_eq!(r.resolve(NodeKind::Sequence, "", (true, false)), SEQ_TAG);
        assert_eq!(r.resolve(NodeKind::Mapping, "", (true, false)), MAP_TAG);
    }

    #[test]
    fn test_custom_implicit_resolver() {
        let mut r = Resolver::new();
        r.add_implicit_resolver("!dice", r"^\d+d\d+$", Some("0123456789")).unwrap();
        assert_eq!(r.resolve(NodeKind::Scalar, "3d6", (true, false)), "!dice");
        let mut r = Resolver::empty();
        r.add_implicit_resolver("!any", r"^x", None).unwrap();
        assert_eq!(r.resolve(NodeKind::Scalar, "xyz", (true, false)), "!any");
        assert_eq!(r.resolve(NodeKind::Scalar, "123", (true, false)), STR_TAG);
    }

    #[test]
    fn test_bad_registrations() {
        let mut r = Resolver::new();
        assert!(matches!(
            r.add_implicit_resolver("!bad", "(", None),
            Err(Error::Resolver(_))
        ));
        assert!(matches!(
            r.add_path_resolver("!p", vec![(NodeCheck::Tag(String::new()), IndexCheck::Key)], None),
            Err(Error::Resolver(_))
        ));
        assert!(matches!(
            r.add_path_resolver("", Vec::new(), None),
            Err(Error::Resolver(_))
        ));
    }

    #[test]
    fn test_path_resolver_descends_and_ascends() {
        let mut r = Resolver::new();
        r.add_path_resolver(
            "!person",
            vec![(NodeCheck::Kind(NodeKind::Mapping), IndexCheck::KeyText("owner".into()))],
            Some(NodeKind::Mapping),
        )
        .unwrap();
        let root = Node::mapping(MAP_TAG, false);
        let key = Node::scalar(STR_TAG, "owner", None);
        let other = Node::scalar(STR_TAG, "other", None);

        r.descend_resolver(None);
        assert_eq!(r.resolve(NodeKind::Mapping, "", (true, false)), MAP_TAG);

        r.descend_resolver(Some((&root, PathIndex::Value(&key))));
        assert_eq!(r.resolve(NodeKind::Mapping, "", (true, false)), "!person");
        // The kind restriction leaves scalars alone.
        assert_eq!(r.resolve(NodeKind::Scalar, "x", (true, false)), STR_TAG);
        r.ascend_resolver();

        r.descend_resolver(Some((&root, PathIndex::Value(&other))));
        assert_eq!(r.resolve(NodeKind::Mapping, "", (true, false)), MAP_TAG);
        r.ascend_resolver();

        r.descend_resolver(Some((&root, PathIndex::Key)));
        assert_eq!(r.resolve(NodeKind::Mapping, "", (true, false)), MAP_TAG);
        r.ascend_resolver();
        r.ascend_resolver();
    }

    #[test]
    fn test_path_resolver_sequence_index() {
        let mut r = Resolver::new();
        r.add_path_resolver(
            "!first",
            vec![(NodeCheck::Any, IndexCheck::Index(0))],
            None,
        )
        .unwrap();
        let root = Node::sequence(SEQ_TAG, false);
        r.descend_resolver(None);
        r.descend_resolver(Some((&root, PathIndex::Item(0))));
        assert_eq!(r.resolve(NodeKind::Scalar, "a", (true, false)), "!first");
        // Implicit patterns still win for plain scalars they match.
        assert_eq!(r.resolve(NodeKind::Scalar, "12", (true, false)), INT_TAG);
        r.ascend_resolver();
        r.descend_resolver(Some((&root, PathIndex::Item(1))));
        assert_eq!(r.resolve(NodeKind::Scalar, "a", (true, false)), STR_TAG);
    }
}
