//! Configuration Types

use serde_yaml::{Mapping, Value};

/// Merged configuration tree. Keys are always strings.
pub type ConfigTree = Mapping;

/// Top-level key holding the dump revision
pub const VERSION_KEY: &str = "_version";

/// Keys starting with this prefix are bookkeeping, not configuration
pub const RESERVED_PREFIX: char = '_';

/// Separator between path segments of a flattened key
pub const FLATTEN_DELIMITER: &str = "-";

/// Whether a key is reserved and skipped by flattening and template checks
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Borrowed view of a node found by path lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Mapping(&'a Mapping),
    Sequence(&'a [Value]),
    Scalar(&'a Value),
    Absent,
}

impl<'a> Node<'a> {
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Mapping(map) => Node::Mapping(map),
            Value::Sequence(items) => Node::Sequence(items),
            Value::Tagged(tagged) => Node::from_value(&tagged.value),
            scalar => Node::Scalar(scalar),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Absent)
    }

    /// Scalar value, if this node is one
    pub fn as_scalar(&self) -> Option<&'a Value> {
        match self {
            Node::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.as_scalar().and_then(Value::as_str)
    }

    /// Step into a child. Sequence segments are decimal indices.
    pub fn child(self, segment: &str) -> Node<'a> {
        match self {
            Node::Mapping(map) => map.get(segment).map_or(Node::Absent, Node::from_value),
            Node::Sequence(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx))
                .map_or(Node::Absent, Node::from_value),
            Node::Scalar(_) | Node::Absent => Node::Absent,
        }
    }
}

/// Walk a mapping along `segments`
pub fn lookup<'a, S: AsRef<str>>(tree: &'a Mapping, segments: &[S]) -> Node<'a> {
    segments
        .iter()
        .fold(Node::Mapping(tree), |node, segment| node.child(segment.as_ref()))
}

/// One leaf of a flattened tree
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedEntry {
    pub key: String,
    pub value: Value,
}

/// Flattened configuration, ordered by first appearance of each key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    entries: Vec<FlattenedEntry>,
}

impl Flattened {
    /// Flatten a value depth-first. Reserved mapping keys are skipped at any depth.
    pub fn from_value(value: &Value) -> Self {
        let mut flat = Flattened::default();
        let mut path = Vec::new();
        flat.walk(&mut path, value);
        flat
    }

    pub fn from_tree(tree: &Mapping) -> Self {
        let mut flat = Flattened::default();
        let mut path = Vec::new();
        flat.walk_mapping(&mut path, tree);
        flat
    }

    fn walk(&mut self, path: &mut Vec<String>, value: &Value) {
        match value {
            Value::Mapping(map) => self.walk_mapping(path, map),
            Value::Sequence(items) => {
                for (idx, item) in items.iter().enumerate() {
                    path.push(idx.to_string());
                    self.walk(path, item);
                    path.pop();
                }
            }
            Value::Tagged(tagged) => self.walk(path, &tagged.value),
            leaf => self.push(path.join(FLATTEN_DELIMITER), leaf.clone()),
        }
    }

    fn walk_mapping(&mut self, path: &mut Vec<String>, map: &Mapping) {
        for (key, item) in map {
            let Some(key) = key.as_str() else { continue };
            if is_reserved(key) {
                continue;
            }
            path.push(key.to_string());
            self.walk(path, item);
            path.pop();
        }
    }

    /// Insert keeping the position of the first occurrence and the last value
    fn push(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(existing) => existing.value = value,
            None => self.entries.push(FlattenedEntry { key, value }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlattenedEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn entries(&self) -> &[FlattenedEntry] {
        &self.entries
    }
}

impl IntoIterator for Flattened {
    type Item = FlattenedEntry;
    type IntoIter = std::vec::IntoIter<FlattenedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Flattened {
    type Item = &'a FlattenedEntry;
    type IntoIter = std::slice::Iter<'a, FlattenedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
