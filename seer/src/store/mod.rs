use crate::config::Options;
use crate::document::{self, Document};
use crate::error::{Result, SeerError};
use crate::fs::FileSystem;
use crate::query::Query;
use crate::resolver;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Parsed documents keyed by their absolute store path (`/dir/name.yaml`).
pub(crate) type Documents = BTreeMap<String, Document>;

/// The main entry point: a tree of directories and YAML documents rooted in a
/// filesystem, with a cache of the documents touched so far.
///
/// Queries mutate the cached documents; [`sync`](Seer::sync) writes them back.
/// All replays, syncs and batches are serialized by one lock, so a `Seer` can
/// be cloned and shared between threads freely.
#[derive(Clone)]
pub struct Seer {
    inner: Arc<Inner>,
}

struct Inner {
    fs: Box<dyn FileSystem>,
    documents: Mutex<Documents>,
}

impl std::fmt::Debug for Seer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seer")
            .field("documents", &self.cached_documents())
            .finish_non_exhaustive()
    }
}

impl Seer {
    /// Open a store rooted at an existing directory on disk.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Options::new().system_fs(root).build()
    }

    /// Open a store over any filesystem provider, rooted at its `/`.
    pub fn with_fs(fs: impl FileSystem + 'static) -> Result<Self> {
        Options::new().virtual_fs(fs, "/").build()
    }

    pub(crate) fn from_fs(fs: Box<dyn FileSystem>) -> Self {
        Seer {
            inner: Arc::new(Inner {
                fs,
                documents: Mutex::new(Documents::new()),
            }),
        }
    }

    /// Start a query at the store root.
    pub fn get(&self, name: impl Into<String>) -> Query {
        Query::new(self.clone()).get(name)
    }

    /// Directories and documents at the store root.
    pub fn list(&self) -> Result<Vec<String>> {
        let _documents = self.lock();
        resolver::list_entries(self.fs(), "/")
    }

    /// Group queries so they commit under a single lock acquisition.
    pub fn batch(&self, queries: impl IntoIterator<Item = Query>) -> Batch {
        Batch {
            seer: self.clone(),
            queries: queries.into_iter().collect(),
        }
    }

    /// Write every cached document back to its file, in path order. Stops at
    /// the first failure; documents written before it stay written.
    pub fn sync(&self) -> Result<()> {
        let documents = self.lock();
        for (path, doc) in documents.iter() {
            let encoded = document::encode(doc).map_err(|e| match e {
                SeerError::Encode(message) => SeerError::Encode(format!("{path}: {message}")),
                other => other,
            })?;
            self.fs()
                .write(path, encoded.as_bytes())
                .map_err(|e| SeerError::io(path.as_str(), e))?;
        }
        log::info!("Synced {} documents", documents.len());
        Ok(())
    }

    /// Paths of the documents currently held in the cache.
    pub fn cached_documents(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Documents> {
        self.inner.documents.lock()
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        &*self.inner.fs
    }

    fn same_store(&self, other: &Seer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Queries committed together while the store lock is held once.
///
/// Queries run in order. The first failure stops the batch; queries before it
/// keep their effects.
#[derive(Debug, Clone)]
pub struct Batch {
    seer: Seer,
    queries: Vec<Query>,
}

impl Batch {
    pub fn commit(&self) -> Result<()> {
        if let Some(index) = self
            .queries
            .iter()
            .position(|q| !q.seer().same_store(&self.seer))
        {
            return Err(SeerError::Batch {
                index,
                source: Box::new(SeerError::Other(
                    "query belongs to a different store".to_string(),
                )),
            });
        }

        let mut documents = self.seer.lock();
        for (index, query) in self.queries.iter().enumerate() {
            query
                .commit_locked(&mut documents)
                .map_err(|source| SeerError::Batch {
                    index,
                    source: Box::new(source),
                })?;
        }
        log::debug!("Committed batch of {} queries", self.queries.len());
        Ok(())
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{EntryKind, MemFs};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_yaml::Value;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const FRUITS: [&str; 5] = ["oranges", "bananas", "pears", "pineapples", "coconuts"];

    fn setup_disk_store() -> (TempDir, Seer) {
        let tmp = TempDir::new().unwrap();
        let seer = Seer::open(tmp.path()).unwrap();
        (tmp, seer)
    }

    fn setup_memory_store() -> (Arc<MemFs>, Seer) {
        let fs = Arc::new(MemFs::new());
        let seer = Seer::with_fs(fs.clone()).unwrap();
        (fs, seer)
    }

    #[test]
    fn test_list_empty_paths() {
        let (_tmp, seer) = setup_disk_store();
        assert!(seer.list().unwrap().is_empty());
        assert!(seer.get("parent").list().unwrap().is_empty());
        assert!(seer.get("parent").get("p").document().list().unwrap().is_empty());
        assert!(seer
            .get("a")
            .get("b")
            .get("C")
            .document()
            .get("a")
            .get("orange")
            .list()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_set_and_list() {
        let (_tmp, seer) = setup_disk_store();
        seer.get("parent").get("p").commit().unwrap();
        assert_eq!(seer.list().unwrap(), vec!["parent"]);
        assert_eq!(seer.get("parent").list().unwrap(), vec!["p"]);

        for fruit in FRUITS {
            seer.get("parent").get(fruit).commit().unwrap();
        }
        let listed = seer.get("parent").list().unwrap();
        for fruit in FRUITS {
            assert!(listed.contains(&fruit.to_string()), "{fruit} not in {listed:?}");
        }
        assert!(listed.contains(&"p".to_string()));
    }

    #[test]
    fn test_deep_commit_and_delete() {
        let (_tmp, seer) = setup_disk_store();
        let query = seer.get("parent").get("sad").get("fruits");
        for fruit in FRUITS {
            query.fork().get(fruit).commit().unwrap();
        }
        for fruit in ["bananas", "pears"] {
            query.fork().get(fruit).delete().commit().unwrap();
        }

        assert_eq!(
            query.list().unwrap(),
            vec!["coconuts", "oranges", "pineapples"]
        );
    }

    #[test]
    fn test_list_document_keys() {
        let (_tmp, seer) = setup_disk_store();
        seer.get("some-doc").document().get("pears").set(10).commit().unwrap();
        seer.get("some-doc").document().get("bananas").set(20).commit().unwrap();
        assert_eq!(seer.get("some-doc").list().unwrap(), vec!["pears", "bananas"]);
        assert_eq!(seer.list().unwrap(), vec!["some-doc"]);
    }

    #[test]
    fn test_delete_then_read_fails() {
        let (_tmp, seer) = setup_disk_store();
        let values = [
            Value::from(1),
            Value::from("text"),
            Value::from(vec!["a", "b"]),
            serde_yaml::from_str("{x: 1, y: [2]}").unwrap(),
        ];
        for value in values {
            seer.get("doc").document().get("inner").set(&value).commit().unwrap();
            assert_eq!(seer.get("doc").get("inner").value::<Value>().unwrap(), value);

            seer.get("doc").get("inner").delete().commit().unwrap();
            let err = seer.get("doc").get("inner").value::<Value>().unwrap_err();
            assert!(err.is_not_found(), "{err}");
        }
    }

    #[test]
    fn test_delete_one_of_many_keys() {
        let (_tmp, seer) = setup_disk_store();
        for key in ["a", "b", "c"] {
            seer.get("doc").document().get(key).set(key).commit().unwrap();
        }
        seer.get("doc").get("b").delete().commit().unwrap();

        let map: BTreeMap<String, String> = seer.get("doc").value().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_delete_everything_in_a_document() {
        let (_tmp, seer) = setup_disk_store();
        seer.get("doc").document().get("only").set(1).commit().unwrap();
        seer.get("doc").get("only").delete().commit().unwrap();

        let map: BTreeMap<String, Value> = seer.get("doc").value().unwrap_or_default();
        assert!(map.is_empty());
    }

    #[test]
    fn test_delete_whole_document() {
        let (tmp, seer) = setup_disk_store();
        seer.get("dir").get("doc").document().get("k").set(1).commit().unwrap();
        seer.sync().unwrap();
        assert!(tmp.path().join("dir/doc.yaml").exists());

        seer.get("dir").get("doc").delete().commit().unwrap();
        assert!(!tmp.path().join("dir/doc.yaml").exists());
        assert!(seer.cached_documents().is_empty());
        assert!(seer.get("dir").get("doc").value::<Value>().unwrap_err().is_not_found());

        // A later sync must not resurrect it.
        seer.sync().unwrap();
        assert!(!tmp.path().join("dir/doc.yaml").exists());
    }

    #[test]
    fn test_delete_root_is_refused() {
        let (_fs, seer) = setup_memory_store();
        let err = seer.get("x").clear().delete().commit().unwrap_err();
        assert!(matches!(err, SeerError::DeleteRoot));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Server {
        host: String,
        port: u16,
        tags: Vec<String>,
    }

    #[test]
    fn test_sync_and_reopen() {
        let (tmp, seer) = setup_disk_store();
        let server = Server {
            host: "localhost".into(),
            port: 8080,
            tags: vec!["a".into(), "b".into()],
        };
        seer.get("config").get("server").document().set(&server).commit().unwrap();

        // Nothing is written until sync.
        let path = tmp.path().join("config/server.yaml");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), document::PLACEHOLDER);

        seer.sync().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "host: localhost\nport: 8080\ntags:\n  - a\n  - b\n"
        );

        let reopened = Seer::open(tmp.path()).unwrap();
        let loaded: Server = reopened.get("config").get("server").value().unwrap();
        assert_eq!(loaded, server);
    }

    #[test]
    fn test_set_keeps_comments() {
        let (fs, seer) = setup_memory_store();
        fs.write(
            "/app.yaml",
            b"# Application settings\nname: old # the name\nport: 1\n",
        )
        .unwrap();

        seer.get("app").get("name").set("new").commit().unwrap();
        seer.sync().unwrap();

        assert_eq!(
            String::from_utf8(fs.read("/app.yaml").unwrap()).unwrap(),
            "# Application settings\nname: new # the name\nport: 1\n"
        );
    }

    #[test]
    fn test_sequence_delete_shifts_elements() {
        let (_fs, seer) = setup_memory_store();
        seer.get("doc").document().get("list").set(["a", "b", "c"]).commit().unwrap();
        seer.get("doc").get("list").get("0").delete().commit().unwrap();

        assert_eq!(seer.get("doc").get("list").list().unwrap(), vec!["b", "c"]);
        assert_eq!(
            seer.get("doc").get("list").get("0").value::<String>().unwrap(),
            "b"
        );
    }

    #[test]
    fn test_batch_commits_in_order() {
        let (_fs, seer) = setup_memory_store();
        let doc = seer.get("doc").document();
        let batch = seer.batch([
            doc.fork().get("a").set(1),
            doc.fork().get("b").set(2),
            doc.fork().get("a").delete(),
        ]);
        assert_eq!(batch.len(), 3);
        batch.commit().unwrap();

        assert_eq!(seer.get("doc").list().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let (fs, seer) = setup_memory_store();
        let batch = seer.batch([
            seer.get("first"),
            seer.get("dir").set("not in a document"),
            seer.get("never"),
        ]);

        let err = batch.commit().unwrap_err();
        match err {
            SeerError::Batch { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, SeerError::SetOutsideDocument));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs.stat("/first").unwrap(), EntryKind::Directory);
        assert!(fs.stat("/never").is_err());
    }

    #[test]
    fn test_batch_rejects_foreign_queries() {
        let (_fs, seer) = setup_memory_store();
        let (_other_fs, other) = setup_memory_store();
        let err = seer.batch([seer.get("a"), other.get("b")]).commit().unwrap_err();
        assert!(matches!(err, SeerError::Batch { index: 1, .. }));
    }

    #[test]
    fn test_concurrent_batches() {
        let (_fs, seer) = setup_memory_store();
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let seer = seer.clone();
                scope.spawn(move || {
                    let doc = seer.get("log").document().get(format!("w{worker}"));
                    let batch = seer.batch(
                        (0..10).map(|i| doc.fork().get(i.to_string()).set(i)),
                    );
                    batch.commit().unwrap();
                });
            }
        });

        assert_eq!(seer.get("log").list().unwrap().len(), 4);
        let entries: BTreeMap<String, u32> = seer.get("log").get("w2").value().unwrap();
        assert_eq!(entries.len(), 10);
    }

    #[test]
    fn test_open_requires_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(Seer::open(tmp.path().join("missing")).is_err());

        let file = tmp.path().join("file");
        std::fs::write(&file, "").unwrap();
        assert!(Seer::open(&file).is_err());
    }

    /// MemFs that refuses writes to one path.
    struct RejectWrite {
        inner: Arc<MemFs>,
        path: &'static str,
    }

    impl FileSystem for RejectWrite {
        fn stat(&self, path: &str) -> std::io::Result<EntryKind> {
            self.inner.stat(path)
        }

        fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn write(&self, path: &str, contents: &[u8]) -> std::io::Result<()> {
            if path == self.path {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only file",
                ));
            }
            self.inner.write(path, contents)
        }

        fn mkdir(&self, path: &str) -> std::io::Result<()> {
            self.inner.mkdir(path)
        }

        fn remove(&self, path: &str) -> std::io::Result<()> {
            self.inner.remove(path)
        }

        fn remove_all(&self, path: &str) -> std::io::Result<()> {
            self.inner.remove_all(path)
        }

        fn read_dir(&self, path: &str) -> std::io::Result<Vec<crate::fs::DirEntry>> {
            self.inner.read_dir(path)
        }
    }

    fn read_text(fs: &MemFs, path: &str) -> String {
        String::from_utf8(fs.read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_sync_stops_at_first_failure() {
        let fs = Arc::new(MemFs::new());
        for name in ["/a.yaml", "/b.yaml", "/c.yaml"] {
            fs.write(name, b"k: 1\n").unwrap();
        }
        let seer = Seer::with_fs(RejectWrite {
            inner: fs.clone(),
            path: "/b.yaml",
        })
        .unwrap();

        for name in ["a", "b", "c"] {
            seer.get(name).get("k").set(2).commit().unwrap();
        }

        let err = seer.sync().unwrap_err();
        assert!(
            matches!(&err, SeerError::Io { path, .. } if path == "/b.yaml"),
            "{err}"
        );
        assert!(err.to_string().contains("/b.yaml"));
        assert_eq!(read_text(&fs, "/a.yaml"), "k: 2\n");
        assert_eq!(read_text(&fs, "/b.yaml"), "k: 1\n");
        assert_eq!(read_text(&fs, "/c.yaml"), "k: 1\n");

        // The cache still holds the unflushed edits.
        assert_eq!(seer.get("c").get("k").value::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_complex_key_document_does_not_block_sync() {
        let (fs, seer) = setup_memory_store();
        fs.write("/a.yaml", b"? [x, y]\n: v\nk: 1\n").unwrap();
        fs.write("/b.yaml", b"k: 1\n").unwrap();

        let err = seer.get("a").get("k").value::<u32>().unwrap_err();
        assert!(matches!(err, SeerError::MalformedDocument { .. }), "{err}");
        assert!(seer.get("a").get("k").set(2).commit().is_err());
        seer.get("b").get("k").set(2).commit().unwrap();

        assert_eq!(seer.cached_documents(), vec!["/b.yaml"]);
        seer.sync().unwrap();
        seer.sync().unwrap();
        assert_eq!(read_text(&fs, "/b.yaml"), "k: 2\n");
        assert_eq!(read_text(&fs, "/a.yaml"), "? [x, y]\n: v\nk: 1\n");
    }

    #[test]
    fn test_malformed_document_surfaces_on_read() {
        let (fs, seer) = setup_memory_store();
        fs.write("/bad.yaml", b"key: [unclosed\n").unwrap();
        let err = seer.get("bad").get("key").value::<Value>().unwrap_err();
        assert!(matches!(err, SeerError::Yaml { .. }));
        assert!(seer.cached_documents().is_empty());
    }
}
