use super::{comments, Document, NodeId, NodeKind};
use crate::error::{Result, SeerError};
use serde_yaml::Value;

/// Content of a freshly created document: an empty mapping, so the codec has
/// something to parse.
pub const PLACEHOLDER: &str = "--- {}\n";

const INDENT: usize = 2;

/// Parse YAML bytes into a document tree. `path` is only used for errors.
///
/// Input without any content yields a document root with no children. Mapping
/// keys must be scalars, since only those can be written back.
pub fn decode(path: &str, source: &[u8]) -> Result<Document> {
    let text = std::str::from_utf8(source).map_err(|e| SeerError::MalformedDocument {
        path: path.to_string(),
        reason: format!("not valid UTF-8: {e}"),
    })?;

    let mut doc = if has_content(text) {
        let value: Value = serde_yaml::from_str(text).map_err(|source| SeerError::Yaml {
            path: path.to_string(),
            source,
        })?;
        if let Some(key) = complex_key(&value) {
            return Err(SeerError::MalformedDocument {
                path: path.to_string(),
                reason: format!("unsupported non-scalar mapping key {key:?}"),
            });
        }
        Document::from_value(&value)
    } else {
        Document::new()
    };

    comments::attach(&mut doc, text);
    Ok(doc)
}

/// The first mapping key anywhere in `value` that is a sequence or mapping.
pub(crate) fn complex_key(value: &Value) -> Option<&Value> {
    match value {
        Value::Mapping(map) => map.iter().find_map(|(k, v)| match k {
            Value::Sequence(_) | Value::Mapping(_) => Some(k),
            Value::Tagged(tagged)
                if matches!(tagged.value, Value::Sequence(_) | Value::Mapping(_)) =>
            {
                Some(k)
            }
            _ => complex_key(v),
        }),
        Value::Sequence(items) => items.iter().find_map(complex_key),
        Value::Tagged(tagged) => complex_key(&tagged.value),
        _ => None,
    }
}

fn has_content(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !(line.is_empty()
            || line.starts_with('#')
            || line.starts_with('%')
            || line == "---"
            || line == "...")
    })
}

/// Serialize a document tree as block-style YAML, comments included.
pub fn encode(doc: &Document) -> Result<String> {
    let mut emitter = Emitter {
        doc,
        out: String::new(),
    };
    emitter.document()?;
    Ok(emitter.out)
}

struct Emitter<'a> {
    doc: &'a Document,
    out: String,
}

impl<'a> Emitter<'a> {
    fn document(&mut self) -> Result<()> {
        let doc = self.doc;
        let root = doc.node(doc.root());
        if !root.head_comment.is_empty() {
            self.comment(&root.head_comment, 0);
            self.out.push('\n');
        }
        if let Some(&top) = root.content.first() {
            self.top_level(top)?;
        }
        self.comment(&root.foot_comment, 0);
        Ok(())
    }

    fn top_level(&mut self, id: NodeId) -> Result<()> {
        let doc = self.doc;
        let node = doc.node(id);
        self.comment(&node.head_comment, 0);
        if self.is_block(id) {
            if let Some(tag) = &node.tag {
                self.out.push_str(tag);
                self.out.push_str(&line_suffix(&node.line_comment));
                self.out.push('\n');
            }
            self.block(id, 0)?;
        } else {
            let scalar = self.inline(id)?;
            self.out.push_str(&scalar);
            self.out.push_str(&line_suffix(&node.line_comment));
            self.out.push('\n');
        }
        self.comment(&node.foot_comment, 0);
        Ok(())
    }

    /// Non-empty mappings and sequences are written as indented blocks; every
    /// other node fits on the line of its parent.
    fn is_block(&self, id: NodeId) -> bool {
        let node = self.doc.node(id);
        matches!(node.kind, NodeKind::Mapping | NodeKind::Sequence) && !node.content.is_empty()
    }

    fn block(&mut self, id: NodeId, indent: usize) -> Result<()> {
        match self.doc.node(id).kind {
            NodeKind::Mapping => self.mapping(id, indent),
            NodeKind::Sequence => self.sequence(id, indent),
            _ => Err(SeerError::Encode(format!(
                "{:?} node cannot be written as a block",
                self.doc.node(id).kind
            ))),
        }
    }

    fn mapping(&mut self, id: NodeId, indent: usize) -> Result<()> {
        let doc = self.doc;
        for pair in doc.node(id).content.chunks(2) {
            let (k, v) = match pair {
                [k, v] => (*k, *v),
                _ => return Err(SeerError::Encode("mapping with a dangling key".into())),
            };
            let key = doc.node(k);
            let value = doc.node(v);

            self.comment(&key.head_comment, indent);
            self.comment(&value.head_comment, indent);
            self.pad(indent);
            let key_text = self.key(k)?;
            self.out.push_str(&key_text);
            self.out.push(':');

            if self.is_block(v) {
                if let Some(tag) = &value.tag {
                    self.out.push(' ');
                    self.out.push_str(tag);
                }
                self.out
                    .push_str(&line_suffix(first_non_empty(&key.line_comment, &value.line_comment)));
                self.out.push('\n');
                self.block(v, indent + INDENT)?;
            } else {
                self.out.push(' ');
                let scalar = self.inline(v)?;
                self.out.push_str(&scalar);
                self.out
                    .push_str(&line_suffix(first_non_empty(&value.line_comment, &key.line_comment)));
                self.out.push('\n');
            }

            self.comment(&value.foot_comment, indent);
            self.comment(&key.foot_comment, indent);
        }
        Ok(())
    }

    fn sequence(&mut self, id: NodeId, indent: usize) -> Result<()> {
        let doc = self.doc;
        for &item in &doc.node(id).content {
            let node = doc.node(item);
            self.comment(&node.head_comment, indent);

            if self.is_block(item) {
                if node.tag.is_some() || !node.line_comment.is_empty() {
                    self.pad(indent);
                    self.out.push('-');
                    if let Some(tag) = &node.tag {
                        self.out.push(' ');
                        self.out.push_str(tag);
                    }
                    self.out.push_str(&line_suffix(&node.line_comment));
                    self.out.push('\n');
                    self.block(item, indent + INDENT)?;
                } else {
                    // Render the nested block on its own, then hoist its first
                    // line onto the dash.
                    let mut nested = Emitter {
                        doc,
                        out: String::new(),
                    };
                    nested.block(item, indent + INDENT)?;
                    let body = &nested.out[indent + INDENT..];
                    self.pad(indent);
                    if body.starts_with('#') {
                        self.out.push_str("-\n");
                        self.out.push_str(&nested.out);
                    } else {
                        self.out.push_str("- ");
                        self.out.push_str(body);
                    }
                }
            } else {
                self.pad(indent);
                self.out.push_str("- ");
                let scalar = self.inline(item)?;
                self.out.push_str(&scalar);
                self.out.push_str(&line_suffix(&node.line_comment));
                self.out.push('\n');
            }

            self.comment(&node.foot_comment, indent);
        }
        Ok(())
    }

    /// A node that fits on one line: a scalar or an empty collection, with its
    /// tag if it has one.
    fn inline(&self, id: NodeId) -> Result<String> {
        let node = self.doc.node(id);
        let body = match node.kind {
            NodeKind::Scalar => render_scalar(&node.scalar)?,
            NodeKind::Mapping => "{}".to_string(),
            NodeKind::Sequence => "[]".to_string(),
            NodeKind::Document => {
                return Err(SeerError::Encode("nested document node".into()));
            }
        };
        Ok(match &node.tag {
            Some(tag) => format!("{tag} {body}"),
            None => body,
        })
    }

    fn key(&self, id: NodeId) -> Result<String> {
        let node = self.doc.node(id);
        if node.kind != NodeKind::Scalar {
            return Err(SeerError::Encode(
                "unsupported non-scalar mapping key".into(),
            ));
        }
        self.inline(id)
    }

    fn comment(&mut self, comment: &str, indent: usize) {
        for line in comment.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.pad(indent);
            if !line.starts_with('#') {
                self.out.push_str("# ");
            }
            self.out.push_str(line);
            self.out.push('\n');
        }
    }

    fn pad(&mut self, indent: usize) {
        for _ in 0..indent {
            self.out.push(' ');
        }
    }
}

fn first_non_empty<'s>(a: &'s str, b: &'s str) -> &'s str {
    if a.is_empty() {
        b
    } else {
        a
    }
}

fn line_suffix(comment: &str) -> String {
    let joined = comment
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        String::new()
    } else if joined.starts_with('#') {
        format!(" {joined}")
    } else {
        format!(" # {joined}")
    }
}

/// Render a scalar for use after `key: ` or `- `. Anything serde_yaml would
/// spread over several lines is written double-quoted instead.
fn render_scalar(value: &Value) -> Result<String> {
    let rendered = serde_yaml::to_string(value).map_err(|e| SeerError::Encode(e.to_string()))?;
    let rendered = rendered.strip_prefix("--- ").unwrap_or(&rendered);
    let rendered = rendered.strip_suffix('\n').unwrap_or(rendered);

    if rendered.contains('\n') || rendered.starts_with('|') || rendered.starts_with('>') {
        match value {
            Value::String(s) => {
                serde_json::to_string(s).map_err(|e| SeerError::Encode(e.to_string()))
            }
            other => Err(SeerError::Encode(format!(
                "scalar {other:?} does not fit on one line"
            ))),
        }
    } else {
        Ok(rendered.to_string())
    }
}
