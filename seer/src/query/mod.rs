// Query pipeline - an immutable recipe of steps, replayed against the store on
// commit or read

use crate::document::complex_key;
use crate::error::{BuildError, Result, SeerError};
use crate::fs;
use crate::resolver::{Mode, Position, Resolved, Resolver};
use crate::store::{Documents, Seer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;

/// One recorded operation of a query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    /// Descend into a directory, document, mapping key or sequence index.
    Navigate(String),
    /// Open `name.yaml`, creating it on commit if needed.
    OpenDocument(String),
    Set(Value),
    Delete,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Navigate(_) => "Get()",
            Step::OpenDocument(_) => "Document()",
            Step::Set(_) => "Set()",
            Step::Delete => "Delete()",
        }
    }
}

/// A chain of path steps and mutations against a [`Seer`].
///
/// Building a query never touches the store. Nothing happens until
/// [`commit`](Query::commit), [`value`](Query::value) or [`list`](Query::list)
/// replays the recorded steps, and every replay starts again from the store
/// root. Problems found while building are collected and reported through
/// [`errors`](Query::errors); a query carrying any of them refuses to run.
///
/// ```no_run
/// # fn main() -> seer::Result<()> {
/// let seer = seer::Seer::open("./data")?;
/// seer.get("config").get("app").document().get("port").set(8080).commit()?;
/// let port: u16 = seer.get("config").get("app").get("port").value()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Query {
    seer: Seer,
    steps: Vec<Step>,
    requested_path: Vec<String>,
    errors: Vec<BuildError>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("steps", &self.steps)
            .field("requested_path", &self.requested_path)
            .field("errors", &self.errors)
            .finish()
    }
}

impl Query {
    pub(crate) fn new(seer: Seer) -> Self {
        Query {
            seer,
            steps: Vec::new(),
            requested_path: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Descend one level: a directory, a document (`name.yaml`), a mapping key
    /// or a sequence index, depending on where the path currently is.
    pub fn get(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.requested_path.push(name.clone());
        self.steps.push(Step::Navigate(name));
        self
    }

    /// Replace the node at the current path with `value`. Comments attached to
    /// the node survive.
    pub fn set<V: Serialize>(mut self, value: V) -> Self {
        let path = fs::join(&self.requested_path);
        match serde_yaml::to_value(value) {
            Ok(value) => match complex_key(&value) {
                Some(key) => self.errors.push(BuildError::Encode {
                    path,
                    message: format!("unsupported non-scalar mapping key {key:?}"),
                }),
                None => self.steps.push(Step::Set(value)),
            },
            Err(e) => self.errors.push(BuildError::Encode {
                path,
                message: e.to_string(),
            }),
        }
        self
    }

    /// Remove whatever the current path points at: a key, a sequence element,
    /// a whole document or a directory tree.
    pub fn delete(mut self) -> Self {
        self.steps.push(Step::Delete);
        self
    }

    /// Mark the last `get` as a document, so a commit creates `name.yaml`
    /// instead of a directory.
    pub fn document(mut self) -> Self {
        match self.steps.last() {
            None => self.errors.push(BuildError::RootDocument),
            Some(Step::Navigate(_)) => {
                if let Some(Step::Navigate(name)) = self.steps.pop() {
                    self.steps.push(Step::OpenDocument(name));
                }
            }
            Some(other) => self.errors.push(BuildError::NotNavigation { step: other.name() }),
        }
        self
    }

    /// An independent copy sharing the same store.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Drop every recorded step and error, leaving an empty query on the same
    /// store that can be built up again.
    pub fn clear(mut self) -> Self {
        self.steps.clear();
        self.requested_path.clear();
        self.errors.clear();
        self
    }

    pub fn errors(&self) -> &[BuildError] {
        &self.errors
    }

    /// Path segments passed to [`get`](Query::get), in order.
    pub fn requested_path(&self) -> &[String] {
        &self.requested_path
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn seer(&self) -> &Seer {
        &self.seer
    }

    /// Replay the steps with mutation allowed. Missing directories, documents
    /// and nodes along the path are created.
    ///
    /// Changes to documents stay in the store's cache until [`Seer::sync`];
    /// directory creation and deletions hit the filesystem right away.
    pub fn commit(&self) -> Result<()> {
        let mut documents = self.seer.lock();
        self.commit_locked(&mut documents)
    }

    /// Commit while the caller already holds the store lock.
    pub(crate) fn commit_locked(&self, documents: &mut Documents) -> Result<()> {
        let mut resolver = Resolver::new(self.seer.fs(), documents, Mode::Write);
        self.replay(&mut resolver)?;
        log::debug!("Committed {}", fs::join(&self.requested_path));
        Ok(())
    }

    /// Read the value at the path into `T`. A directory decodes as the sequence
    /// of its entry names.
    pub fn value<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match self.resolve()? {
            Resolved::Directory(names) => {
                Value::Sequence(names.into_iter().map(Value::String).collect())
            }
            Resolved::Node(value) => value,
        };
        serde_yaml::from_value(value).map_err(|source| SeerError::Decode {
            path: fs::join(&self.requested_path),
            source,
        })
    }

    /// Names under the path: directory entries, mapping keys, or the text of
    /// sequence elements. A path that does not exist lists as empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let resolved = match self.resolve() {
            Ok(resolved) => resolved,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let not_listable = || SeerError::NotListable {
            path: fs::join(&self.requested_path),
        };
        match resolved {
            Resolved::Directory(names) => Ok(names),
            Resolved::Node(value) => match untag(value) {
                Value::Mapping(map) => map
                    .keys()
                    .map(|k| scalar_text(k).ok_or_else(not_listable))
                    .collect(),
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| scalar_text(item).ok_or_else(not_listable))
                    .collect(),
                _ => Err(not_listable()),
            },
        }
    }

    fn resolve(&self) -> Result<Resolved> {
        let mut documents = self.seer.lock();
        let mut resolver = Resolver::new(self.seer.fs(), &mut documents, Mode::Read);
        let position = self.replay(&mut resolver)?;
        resolver.resolve(&position)
    }

    fn replay(&self, resolver: &mut Resolver<'_>) -> Result<Position> {
        if !self.errors.is_empty() {
            return Err(SeerError::Build {
                count: self.errors.len(),
            });
        }
        let mut position = Position::default();
        for step in &self.steps {
            position = resolver.apply(step, position)?;
        }
        Ok(position)
    }
}

fn untag(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => untag(tagged.value),
        other => other,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        _ => None,
    }
}
