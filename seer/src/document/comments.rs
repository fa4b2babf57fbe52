// Comment attachment for block-style YAML.
//
// serde_yaml drops comments, so after the structure is decoded this pass walks
// the source lines, tracks which key or sequence item each line opens, and
// hangs the surrounding comments on the matching node.

use super::{Document, NodeId, NodeKind};

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

struct Frame {
    indent: usize,
    segment: Segment,
}

struct Scanner<'d, 's> {
    doc: &'d mut Document,
    frames: Vec<Frame>,
    pending: Vec<&'s str>,
    seen_content: bool,
    /// Lines indented deeper than this belong to a block scalar.
    block_scalar: Option<usize>,
}

pub(super) fn attach(doc: &mut Document, source: &str) {
    let mut scanner = Scanner {
        doc,
        frames: Vec::new(),
        pending: Vec::new(),
        seen_content: false,
        block_scalar: None,
    };

    for raw in source.lines() {
        let text = raw.trim_start();
        let indent = raw.len() - text.len();

        if let Some(limit) = scanner.block_scalar {
            if text.is_empty() || indent > limit {
                continue;
            }
            scanner.block_scalar = None;
        }

        if text.is_empty() {
            if !scanner.seen_content && !scanner.pending.is_empty() {
                let head = scanner.take_pending();
                let root = scanner.doc.root();
                append(&mut scanner.doc.node_mut(root).head_comment, &head);
            }
            continue;
        }
        if text.starts_with('#') {
            scanner.pending.push(text.trim_end());
            continue;
        }
        if text.starts_with('%') || text == "---" || text == "..." {
            continue;
        }

        scanner.seen_content = true;
        match text.strip_prefix("--- ") {
            Some(rest) => scanner.content(indent + 4, rest),
            None => scanner.content(indent, text),
        }
    }

    if !scanner.pending.is_empty() {
        let foot = scanner.take_pending();
        let root = scanner.doc.root();
        append(&mut scanner.doc.node_mut(root).foot_comment, &foot);
    }
}

impl<'d, 's> Scanner<'d, 's> {
    fn take_pending(&mut self) -> String {
        let joined = self.pending.join("\n");
        self.pending.clear();
        joined
    }

    fn content(&mut self, indent: usize, text: &'s str) {
        if text == "-" || text.starts_with("- ") {
            self.item(indent, text);
        } else if let Some((key, rest)) = split_key(text) {
            self.key(indent, key, rest);
        } else if self.frames.is_empty() {
            // A top-level scalar or flow collection.
            let (value, comment) = split_comment(text);
            let head = self.take_pending();
            if let Some(top) = self.doc.top() {
                let node = self.doc.node_mut(top);
                append(&mut node.head_comment, &head);
                append(&mut node.line_comment, comment);
            }
            self.note_block_scalar(indent, value);
        } else {
            // Continuation of a flow collection or a multi-line plain scalar.
            self.pending.clear();
        }
    }

    fn item(&mut self, indent: usize, text: &'s str) {
        while self.frames.last().is_some_and(|f| f.indent > indent) {
            self.frames.pop();
        }
        match self.frames.last_mut() {
            Some(Frame {
                indent: top,
                segment: Segment::Index(n),
            }) if *top == indent => *n += 1,
            _ => {
                self.frames.push(Frame {
                    indent,
                    segment: Segment::Index(0),
                });
            }
        }

        let element = self.locate().map(|(_, node)| node);
        let head = self.take_pending();
        if let Some(id) = element {
            append(&mut self.doc.node_mut(id).head_comment, &head);
        }

        let rest = &text[1..];
        let nested = rest.trim_start();
        let nested_indent = indent + 1 + (rest.len() - nested.len());

        if nested == "-" || nested.starts_with("- ") || split_key(nested).is_some() {
            self.content(nested_indent, nested);
            return;
        }

        let (value, comment) = split_comment(nested);
        if let Some(id) = element {
            append(&mut self.doc.node_mut(id).line_comment, comment);
        }
        self.note_block_scalar(indent, value);
    }

    fn key(&mut self, indent: usize, key: String, rest: &'s str) {
        while self.frames.last().is_some_and(|f| f.indent >= indent) {
            self.frames.pop();
        }
        self.frames.push(Frame {
            indent,
            segment: Segment::Key(key),
        });

        let (value, comment) = split_comment(rest);
        let value = value.trim();
        let head = self.take_pending();

        if let Some((Some(key_id), value_id)) = self.locate() {
            append(&mut self.doc.node_mut(key_id).head_comment, &head);
            let target = if value.is_empty() { key_id } else { value_id };
            append(&mut self.doc.node_mut(target).line_comment, comment);
        }
        self.note_block_scalar(indent, value);
    }

    fn note_block_scalar(&mut self, indent: usize, value: &str) {
        let value = value.trim_start();
        let value = match value.strip_prefix('!') {
            // Skip a tag in front of the indicator.
            Some(tagged) => tagged
                .split_once(char::is_whitespace)
                .map_or("", |(_, v)| v.trim_start()),
            None => value,
        };
        if value.starts_with('|') || value.starts_with('>') {
            self.block_scalar = Some(indent);
        }
    }

    /// Resolve the current frame stack to `(key, node)`; `key` is set when the
    /// last segment is a mapping key.
    fn locate(&self) -> Option<(Option<NodeId>, NodeId)> {
        let mut current = self.doc.top()?;
        let mut key = None;
        for frame in &self.frames {
            let node = self.doc.node(current);
            match (&frame.segment, node.kind) {
                (Segment::Key(name), NodeKind::Mapping) => {
                    let (k, v) = self.doc.find_key(current, name)?;
                    key = Some(k);
                    current = v;
                }
                (Segment::Index(i), NodeKind::Sequence) => {
                    key = None;
                    current = *node.content.get(*i)?;
                }
                _ => return None,
            }
        }
        Some((key, current))
    }
}

fn append(target: &mut String, comment: &str) {
    if comment.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(comment);
}

/// Split `key: rest` into the unquoted key and what follows the colon.
fn split_key(text: &str) -> Option<(String, &str)> {
    let first = text.chars().next()?;
    if matches!(first, '{' | '[' | '?' | '&' | '*' | '!' | '#' | '|' | '>') {
        return None;
    }

    if first == '"' || first == '\'' {
        let end = closing_quote(text, first)?;
        let quoted = &text[..=end];
        let after = text[end + 1..].trim_start();
        let rest = after.strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with(' ')) {
            return None;
        }
        let key: String = serde_yaml::from_str(quoted).ok()?;
        return Some((key, rest));
    }

    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'#' if i > 0 && bytes[i - 1] == b' ' => return None,
            b':' if i + 1 == bytes.len() || bytes[i + 1] == b' ' => {
                let key = text[..i].trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some((key.to_string(), &text[i + 1..]));
            }
            _ => {}
        }
    }
    None
}

/// Byte offset of the quote closing the scalar opened at offset 0.
fn closing_quote(text: &str, quote: char) -> Option<usize> {
    let bytes = text.as_bytes();
    let q = quote as u8;
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if q == b'"' => i += 2,
            b if b == q => {
                // '' is an escaped quote inside a single-quoted scalar
                if q == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                } else {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Split a value from its trailing ` # comment`.
fn split_comment(text: &str) -> (&str, &str) {
    let trimmed = text.trim_start();
    let offset = text.len() - trimmed.len();

    let scan_from = match trimmed.chars().next() {
        Some(q @ ('"' | '\'')) => match closing_quote(trimmed, q) {
            Some(end) => end + 1,
            None => return (text, ""),
        },
        _ => 0,
    };

    let bytes = trimmed.as_bytes();
    for i in scan_from..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            let at = offset + i;
            return (text[..at].trim_end(), text[at..].trim_end());
        }
    }
    (text.trim_end(), "")
}
