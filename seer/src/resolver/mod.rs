// Node resolution - interprets query steps against the filesystem layer and the
// in-document node layer

use crate::document::{self, Document, NodeId, NodeKind, DOCUMENT_EXTENSION};
use crate::error::{Result, SeerError};
use crate::fs::{self, EntryKind, FileSystem};
use crate::query::Step;
use crate::store::Documents;
use serde_yaml::Value;
use std::io;

/// Whether a replay may create or change anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Read,
    Write,
}

/// A resolved location inside a cached document.
///
/// `key` is only set when `node` is the value of a mapping pair, so the pair can
/// be removed as a whole. `node` is `None` once the node has been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub document: String,
    pub parent: Option<NodeId>,
    pub key: Option<NodeId>,
    pub node: Option<NodeId>,
}

impl Cursor {
    fn root(document: String, doc: &Document) -> Self {
        Cursor {
            node: Some(doc.root()),
            document,
            parent: None,
            key: None,
        }
    }
}

/// Running state of a replay: the segments walked so far and, once a
/// document has been entered, the cursor inside it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Position {
    pub path: Vec<String>,
    pub cursor: Option<Cursor>,
}

impl Position {
    fn display(&self) -> String {
        fs::join(&self.path)
    }
}

/// What a replay ended on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    /// Names of the entries of a directory.
    Directory(Vec<String>),
    Node(Value),
}

pub(crate) struct Resolver<'a> {
    fs: &'a dyn FileSystem,
    documents: &'a mut Documents,
    mode: Mode,
}

impl<'a> Resolver<'a> {
    pub fn new(fs: &'a dyn FileSystem, documents: &'a mut Documents, mode: Mode) -> Self {
        Resolver {
            fs,
            documents,
            mode,
        }
    }

    fn writing(&self) -> bool {
        self.mode == Mode::Write
    }

    /// Apply one step.
    pub fn apply(&mut self, step: &Step, position: Position) -> Result<Position> {
        match step {
            Step::Navigate(name) => match position.cursor {
                None => self.navigate_fs(position.path, name),
                Some(cursor) => self.navigate_document(position.path, cursor, name),
            },
            Step::OpenDocument(name) => {
                if position.cursor.is_some() {
                    return Err(SeerError::PathConflict {
                        path: position.display(),
                        reason: "already inside a document",
                    });
                }
                self.open_document(position.path, name)
            }
            Step::Set(value) => self.set(position, value),
            Step::Delete => self.delete(position),
        }
    }

    /// Turn the final position of a replay into a value or a directory listing.
    pub fn resolve(&self, position: &Position) -> Result<Resolved> {
        match &position.cursor {
            None => {
                let path = position.display();
                match self.stat(&path)? {
                    Some(EntryKind::Directory) => {
                        Ok(Resolved::Directory(list_entries(self.fs, &path)?))
                    }
                    _ => Err(SeerError::NotFound { path }),
                }
            }
            Some(cursor) => {
                let node = cursor.node.ok_or_else(|| SeerError::NotFound {
                    path: position.display(),
                })?;
                let doc = self.document(&cursor.document)?;
                Ok(Resolved::Node(doc.to_value(node)))
            }
        }
    }

    fn stat(&self, path: &str) -> Result<Option<EntryKind>> {
        match self.fs.stat(path) {
            Ok(kind) => Ok(Some(kind)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SeerError::io(path, e)),
        }
    }

    fn document(&self, path: &str) -> Result<&Document> {
        self.documents.get(path).ok_or_else(|| SeerError::NotFound {
            path: path.to_string(),
        })
    }

    fn document_mut(&mut self, path: &str) -> Result<&mut Document> {
        self.documents.get_mut(path).ok_or_else(|| SeerError::NotFound {
            path: path.to_string(),
        })
    }

    fn load(&mut self, path: &str) -> Result<Cursor> {
        let bytes = self.fs.read(path).map_err(|e| SeerError::io(path, e))?;
        let doc = document::decode(path, &bytes)?;
        log::debug!("Loaded document {path}");
        let cursor = Cursor::root(path.to_string(), &doc);
        self.documents.insert(path.to_string(), doc);
        Ok(cursor)
    }

    fn cached(&self, path: &str) -> Option<Cursor> {
        self.documents
            .get(path)
            .map(|doc| Cursor::root(path.to_string(), doc))
    }

    fn navigate_fs(&mut self, mut path: Vec<String>, name: &str) -> Result<Position> {
        validate_segment(name)?;
        path.push(name.to_string());
        let target = fs::join(&path);
        let document = format!("{target}{DOCUMENT_EXTENSION}");

        let as_document = |mut path: Vec<String>, cursor: Cursor| {
            if let Some(last) = path.last_mut() {
                last.push_str(DOCUMENT_EXTENSION);
            }
            Position {
                path,
                cursor: Some(cursor),
            }
        };

        if let Some(cursor) = self.cached(&document) {
            return Ok(as_document(path, cursor));
        }

        match self.stat(&target)? {
            Some(EntryKind::Directory) => Ok(Position { path, cursor: None }),
            Some(EntryKind::File) => Err(SeerError::UnsupportedFile { path: target }),
            None => match self.stat(&document)? {
                Some(EntryKind::File) => {
                    let cursor = self.load(&document)?;
                    Ok(as_document(path, cursor))
                }
                Some(EntryKind::Directory) => Err(SeerError::PathConflict {
                    path: document,
                    reason: "a directory, not a document",
                }),
                None if self.writing() => {
                    self.fs
                        .mkdir(&target)
                        .map_err(|e| SeerError::io(target.as_str(), e))?;
                    log::debug!("Created directory {target}");
                    Ok(Position { path, cursor: None })
                }
                None => Err(SeerError::NotFound { path: target }),
            },
        }
    }

    fn open_document(&mut self, mut path: Vec<String>, name: &str) -> Result<Position> {
        validate_segment(name)?;
        path.push(format!("{name}{DOCUMENT_EXTENSION}"));
        let document = fs::join(&path);

        if let Some(cursor) = self.cached(&document) {
            return Ok(Position {
                path,
                cursor: Some(cursor),
            });
        }

        match self.stat(&document)? {
            Some(EntryKind::Directory) => {
                return Err(SeerError::PathConflict {
                    path: document,
                    reason: "a directory, not a document",
                })
            }
            Some(EntryKind::File) => {}
            None if self.writing() => {
                self.fs
                    .write(&document, document::PLACEHOLDER.as_bytes())
                    .map_err(|e| SeerError::io(document.as_str(), e))?;
                log::debug!("Created document {document}");
            }
            None => return Err(SeerError::DocumentMissing { path: document }),
        }

        let cursor = self.load(&document)?;
        Ok(Position {
            path,
            cursor: Some(cursor),
        })
    }

    fn navigate_document(
        &mut self,
        mut path: Vec<String>,
        cursor: Cursor,
        name: &str,
    ) -> Result<Position> {
        path.push(name.to_string());
        let display = fs::join(&path);
        let writing = self.writing();
        let doc = self.document_mut(&cursor.document)?;

        let mut current = cursor.node.ok_or_else(|| SeerError::NotFound {
            path: display.clone(),
        })?;

        if doc.node(current).kind == NodeKind::Document {
            current = doc.top().ok_or_else(|| SeerError::MalformedDocument {
                path: cursor.document.clone(),
                reason: format!(
                    "expected exactly one top-level node, found {}",
                    doc.node(current).content.len()
                ),
            })?;
        }

        let (key, node) = match doc.node(current).kind {
            NodeKind::Mapping => match doc.find_key(current, name) {
                Some((k, v)) => (Some(k), v),
                None if writing => {
                    let (k, v) = doc.push_pair(current, name);
                    (Some(k), v)
                }
                None => return Err(SeerError::NotFound { path: display }),
            },
            NodeKind::Sequence => {
                let index: usize =
                    name.parse()
                        .map_err(|source| SeerError::InvalidIndex {
                            path: display.clone(),
                            segment: name.to_string(),
                            source,
                        })?;
                let len = doc.node(current).content.len();
                if index < len {
                    (None, doc.node(current).content[index])
                } else if writing {
                    (None, doc.push_element(current))
                } else {
                    return Err(SeerError::IndexOutOfRange {
                        path: display,
                        index,
                        len,
                    });
                }
            }
            NodeKind::Scalar if writing => {
                let (k, v) = doc.promote(current, name);
                (Some(k), v)
            }
            NodeKind::Scalar => return Err(SeerError::NotFound { path: display }),
            NodeKind::Document => {
                return Err(SeerError::MalformedDocument {
                    path: cursor.document.clone(),
                    reason: "nested document node".to_string(),
                })
            }
        };

        Ok(Position {
            path,
            cursor: Some(Cursor {
                document: cursor.document,
                parent: Some(current),
                key,
                node: Some(node),
            }),
        })
    }

    fn set(&mut self, position: Position, value: &Value) -> Result<Position> {
        if !self.writing() {
            return Err(SeerError::ReadOnly { op: "Set()" });
        }
        let (document, node) = match &position.cursor {
            Some(Cursor {
                document,
                node: Some(node),
                ..
            }) => (document.clone(), *node),
            _ => return Err(SeerError::SetOutsideDocument),
        };
        self.document_mut(&document)?.set_value(node, value);
        Ok(position)
    }

    fn delete(&mut self, position: Position) -> Result<Position> {
        if !self.writing() {
            return Err(SeerError::ReadOnly { op: "Delete()" });
        }
        match position.cursor {
            None => self.delete_fs(position.path),
            // The cursor sits on a document root: remove the whole file.
            Some(Cursor { parent: None, .. }) => self.delete_fs(position.path),
            Some(cursor) => self.delete_in_document(position.path, cursor),
        }
    }

    fn delete_in_document(&mut self, path: Vec<String>, cursor: Cursor) -> Result<Position> {
        let (parent, node) = match (cursor.parent, cursor.node) {
            (Some(parent), Some(node)) => (parent, node),
            _ => return Err(SeerError::DeleteOutsideValue),
        };
        let doc = self.document_mut(&cursor.document)?;

        let removed = match (doc.node(parent).kind, cursor.key) {
            (NodeKind::Mapping, Some(key)) => doc.remove_pair(parent, key),
            (NodeKind::Sequence, None) => doc.remove_element(parent, node),
            _ => false,
        };
        if !removed {
            return Err(SeerError::DeleteOutsideValue);
        }

        Ok(Position {
            path,
            cursor: Some(Cursor {
                document: cursor.document,
                parent: Some(parent),
                key: None,
                node: None,
            }),
        })
    }

    fn delete_fs(&mut self, path: Vec<String>) -> Result<Position> {
        if path.is_empty() {
            return Err(SeerError::DeleteRoot);
        }
        let target = fs::join(&path);
        let evicted = self.evict(&target);

        let removed = match self.stat(&target)? {
            Some(EntryKind::Directory) => self.fs.remove_all(&target),
            Some(EntryKind::File) => self.fs.remove(&target),
            None if evicted > 0 => Ok(()),
            None => return Err(SeerError::NotFound { path: target }),
        };
        removed.map_err(|e| SeerError::io(target.as_str(), e))?;

        log::debug!("Deleted {target} ({evicted} cached documents evicted)");
        Ok(Position { path, cursor: None })
    }

    /// Drop `path` and everything below it from the cache.
    fn evict(&mut self, path: &str) -> usize {
        let prefix = format!("{path}/");
        let before = self.documents.len();
        self.documents
            .retain(|key, _| key != path && !key.starts_with(&prefix));
        before - self.documents.len()
    }
}

/// Directories and documents (extension stripped) directly under `path`.
pub(crate) fn list_entries(fs: &dyn FileSystem, path: &str) -> Result<Vec<String>> {
    let entries = fs.read_dir(path).map_err(|e| SeerError::io(path, e))?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry.kind {
            EntryKind::Directory => Some(entry.name),
            EntryKind::File => entry
                .name
                .strip_suffix(DOCUMENT_EXTENSION)
                .filter(|stem| !stem.is_empty())
                .map(str::to_string),
        })
        .collect())
}

fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(SeerError::InvalidSegment {
            segment: name.to_string(),
        });
    }
    Ok(())
}
