// Document trees - arena of YAML nodes with comments, addressed by stable handles

mod codec;
mod comments;

pub use codec::{decode, encode, PLACEHOLDER};
pub(crate) use codec::complex_key;

/// Suffix that marks a file as a document.
pub const DOCUMENT_EXTENSION: &str = ".yaml";

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};

/// Stable handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Mapping,
    Sequence,
    Scalar,
}

/// A single YAML node.
///
/// Mappings keep their pairs flattened in `content` as
/// `key, value, key, value, ...`; the list always has even length.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Explicit tag including the leading `!`, e.g. `!Thing`.
    pub tag: Option<String>,
    /// Payload of a scalar node; `Null` for every other kind.
    pub scalar: Value,
    pub content: Vec<NodeId>,
    pub head_comment: String,
    pub line_comment: String,
    pub foot_comment: String,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            tag: None,
            scalar: Value::Null,
            content: Vec::new(),
            head_comment: String::new(),
            line_comment: String::new(),
            foot_comment: String::new(),
        }
    }
}

/// The decoded tree of one YAML file: a document root wrapping at most one
/// top-level node.
///
/// Nodes live in an arena and are never moved, so a [`NodeId`] stays valid
/// while siblings are spliced in and out of a parent's content list. Nodes cut
/// out of the tree stay in the arena unreferenced; encoding only walks what is
/// reachable from the root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document root with no content.
    pub fn new() -> Self {
        Document {
            nodes: vec![Node::new(NodeKind::Document)],
            root: NodeId(0),
        }
    }

    /// A document whose single top-level node holds `value`.
    pub fn from_value(value: &Value) -> Self {
        let mut doc = Document::new();
        let child = doc.build(value);
        doc.nodes[doc.root.0].content.push(child);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The single node wrapped by the document root, if there is exactly one.
    pub fn top(&self) -> Option<NodeId> {
        match self.node(self.root).content.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn build(&mut self, value: &Value) -> NodeId {
        let id = self.alloc(Node::new(NodeKind::Scalar));
        self.assign(id, value);
        id
    }

    /// Overwrite the structure and payload of `id` with `value`. Comments on
    /// `id` are left untouched; a document root gets `value` as its single
    /// top-level node.
    fn assign(&mut self, id: NodeId, value: &Value) {
        if self.node(id).kind == NodeKind::Document {
            let child = self.build(value);
            self.node_mut(id).content = vec![child];
            return;
        }

        let (kind, tag, scalar, content) = match value {
            Value::Sequence(items) => {
                let content = items.iter().map(|item| self.build(item)).collect();
                (NodeKind::Sequence, None, Value::Null, content)
            }
            Value::Mapping(map) => {
                let mut content = Vec::with_capacity(map.len() * 2);
                for (k, v) in map {
                    content.push(self.build(k));
                    content.push(self.build(v));
                }
                (NodeKind::Mapping, None, Value::Null, content)
            }
            Value::Tagged(tagged) => {
                self.assign(id, &tagged.value);
                self.node_mut(id).tag = Some(tagged.tag.to_string());
                return;
            }
            scalar => (NodeKind::Scalar, None, scalar.clone(), Vec::new()),
        };

        let node = self.node_mut(id);
        node.kind = kind;
        node.tag = tag;
        node.scalar = scalar;
        node.content = content;
    }

    /// Re-encode `value` into `id`, keeping the node's head, line and foot
    /// comments.
    pub fn set_value(&mut self, id: NodeId, value: &Value) {
        let node = self.node(id);
        let head = node.head_comment.clone();
        let line = node.line_comment.clone();
        let foot = node.foot_comment.clone();

        self.assign(id, value);

        let node = self.node_mut(id);
        node.head_comment = head;
        node.line_comment = line;
        node.foot_comment = foot;
    }

    /// Decode the subtree rooted at `id`.
    pub fn to_value(&self, id: NodeId) -> Value {
        let node = self.node(id);
        let value = match node.kind {
            NodeKind::Document => match node.content.first() {
                Some(&child) => self.to_value(child),
                None => Value::Null,
            },
            NodeKind::Scalar => node.scalar.clone(),
            NodeKind::Sequence => {
                Value::Sequence(node.content.iter().map(|&c| self.to_value(c)).collect())
            }
            NodeKind::Mapping => {
                let mut map = Mapping::new();
                for pair in node.content.chunks(2) {
                    if let [k, v] = pair {
                        map.insert(self.to_value(*k), self.to_value(*v));
                    }
                }
                Value::Mapping(map)
            }
        };

        match &node.tag {
            Some(tag) => Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new(tag.clone()),
                value,
            })),
            None => value,
        }
    }

    /// The textual form of a scalar, as used to match mapping keys.
    pub fn scalar_text(&self, id: NodeId) -> Option<String> {
        let node = self.node(id);
        if node.kind != NodeKind::Scalar {
            return None;
        }
        match &node.scalar {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => Some("null".to_string()),
            _ => None,
        }
    }

    /// Linear scan of a mapping for the pair whose scalar key reads `name`.
    /// Returns `(key, value)`.
    pub fn find_key(&self, mapping: NodeId, name: &str) -> Option<(NodeId, NodeId)> {
        self.node(mapping)
            .content
            .chunks(2)
            .find_map(|pair| match pair {
                [k, v] if self.scalar_text(*k).as_deref() == Some(name) => Some((*k, *v)),
                _ => None,
            })
    }

    /// Append `name: null` to a mapping. Returns `(key, value)`.
    pub fn push_pair(&mut self, mapping: NodeId, name: &str) -> (NodeId, NodeId) {
        let key = self.build(&Value::String(name.to_string()));
        let value = self.build(&Value::Null);
        let content = &mut self.node_mut(mapping).content;
        content.push(key);
        content.push(value);
        (key, value)
    }

    /// Append a null element to a sequence.
    pub fn push_element(&mut self, sequence: NodeId) -> NodeId {
        let element = self.build(&Value::Null);
        self.node_mut(sequence).content.push(element);
        element
    }

    /// Turn a leaf into the single-key mapping `{name: null}` in place, keeping
    /// its comments. Returns `(key, value)` of the new pair.
    pub fn promote(&mut self, id: NodeId, name: &str) -> (NodeId, NodeId) {
        let node = self.node_mut(id);
        node.kind = NodeKind::Mapping;
        node.tag = None;
        node.scalar = Value::Null;
        node.content.clear();
        self.push_pair(id, name)
    }

    /// Splice a key and its value out of a mapping, keeping the order of the
    /// remaining pairs. Returns false when `key` is not a key of `mapping`.
    pub fn remove_pair(&mut self, mapping: NodeId, key: NodeId) -> bool {
        let content = &mut self.node_mut(mapping).content;
        let position = content.iter().step_by(2).position(|&k| k == key);
        match position {
            Some(pair) => {
                content.drain(pair * 2..pair * 2 + 2);
                true
            }
            None => false,
        }
    }

    /// Remove an element from a sequence, shifting later elements down.
    pub fn remove_element(&mut self, sequence: NodeId, element: NodeId) -> bool {
        let content = &mut self.node_mut(sequence).content;
        match content.iter().position(|&e| e == element) {
            Some(index) => {
                content.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_from_value_round_trips() {
        let value = yaml("name: Alice\ntags: [a, b]\nnested:\n  n: 1\n");
        let doc = Document::from_value(&value);
        assert_eq!(doc.to_value(doc.root()), value);

        let top = doc.top().unwrap();
        assert_eq!(doc.node(top).kind, NodeKind::Mapping);
        assert_eq!(doc.node(top).content.len(), 6);
    }

    #[test]
    fn test_find_key_matches_scalar_text() {
        let doc = Document::from_value(&yaml("1: one\ntrue: yes\nname: x\n"));
        let top = doc.top().unwrap();
        assert!(doc.find_key(top, "1").is_some());
        assert!(doc.find_key(top, "true").is_some());
        let (_, v) = doc.find_key(top, "name").unwrap();
        assert_eq!(doc.to_value(v), Value::String("x".into()));
        assert!(doc.find_key(top, "missing").is_none());
    }

    #[test]
    fn test_set_value_keeps_comments() {
        let mut doc = Document::from_value(&yaml("a: 1\n"));
        let top = doc.top().unwrap();
        let (_, v) = doc.find_key(top, "a").unwrap();
        doc.node_mut(v).line_comment = "# keep me".into();
        doc.node_mut(v).head_comment = "# above".into();

        doc.set_value(v, &yaml("{x: [1, 2]}"));

        let node = doc.node(v);
        assert_eq!(node.kind, NodeKind::Mapping);
        assert_eq!(node.line_comment, "# keep me");
        assert_eq!(node.head_comment, "# above");
        assert_eq!(doc.to_value(top), yaml("a: {x: [1, 2]}"));
    }

    #[test]
    fn test_set_value_on_root_replaces_top() {
        let mut doc = Document::from_value(&yaml("a: 1"));
        doc.set_value(doc.root(), &Value::String("hello".into()));
        assert_eq!(doc.node(doc.root()).content.len(), 1);
        assert_eq!(doc.to_value(doc.root()), Value::String("hello".into()));
    }

    #[test]
    fn test_remove_pair_preserves_order() {
        let mut doc = Document::from_value(&yaml("a: 1\nb: 2\nc: 3\n"));
        let top = doc.top().unwrap();
        let (kb, _) = doc.find_key(top, "b").unwrap();

        assert!(doc.remove_pair(top, kb));
        assert_eq!(doc.node(top).content.len(), 4);
        assert_eq!(doc.to_value(top), yaml("a: 1\nc: 3\n"));
        assert!(!doc.remove_pair(top, kb));
    }

    #[test]
    fn test_remove_pair_ignores_value_handles() {
        let mut doc = Document::from_value(&yaml("a: b\nb: c\n"));
        let top = doc.top().unwrap();
        let (_, value_a) = doc.find_key(top, "a").unwrap();
        assert!(!doc.remove_pair(top, value_a));
        assert_eq!(doc.node(top).content.len(), 4);
    }

    #[test]
    fn test_remove_element_shifts() {
        let mut doc = Document::from_value(&yaml("[a, b, c]"));
        let top = doc.top().unwrap();
        let b = doc.node(top).content[1];
        assert!(doc.remove_element(top, b));
        assert_eq!(doc.to_value(top), yaml("[a, c]"));
    }

    #[test]
    fn test_promote_and_push() {
        let mut doc = Document::from_value(&Value::Null);
        let top = doc.top().unwrap();
        let (_, v) = doc.promote(top, "fruits");
        doc.set_value(v, &yaml("[]"));
        let e = doc.push_element(v);
        doc.set_value(e, &Value::String("apple".into()));
        assert_eq!(doc.to_value(doc.root()), yaml("fruits: [apple]"));
    }

    #[test]
    fn test_tags_survive() {
        let value = yaml("kind: !Thing {a: 1}");
        let doc = Document::from_value(&value);
        let top = doc.top().unwrap();
        let (_, v) = doc.find_key(top, "kind").unwrap();
        assert_eq!(doc.node(v).tag.as_deref(), Some("!Thing"));
        assert_eq!(doc.to_value(doc.root()), value);
    }
}
