use super::{normalize, DirEntry, EntryKind, FileSystem};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;

enum Entry {
    Directory,
    File(Vec<u8>),
}

/// An in-memory filesystem. The root directory always exists.
#[derive(Default)]
pub struct MemFs {
    entries: RwLock<BTreeMap<String, Entry>>,
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file or directory"))
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn kind(entries: &BTreeMap<String, Entry>, path: &str) -> Option<EntryKind> {
        if path == "/" {
            return Some(EntryKind::Directory);
        }
        entries.get(path).map(|entry| match entry {
            Entry::Directory => EntryKind::Directory,
            Entry::File(_) => EntryKind::File,
        })
    }

    fn require_parent_dir(entries: &BTreeMap<String, Entry>, path: &str) -> io::Result<()> {
        let parent = parent_of(path);
        match Self::kind(entries, parent) {
            Some(EntryKind::Directory) => Ok(()),
            Some(EntryKind::File) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{parent} is not a directory"),
            )),
            None => Err(not_found(parent)),
        }
    }
}

impl FileSystem for MemFs {
    fn stat(&self, path: &str) -> io::Result<EntryKind> {
        let path = normalize(path)?;
        Self::kind(&self.entries.read(), &path).ok_or_else(|| not_found(&path))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = normalize(path)?;
        match self.entries.read().get(&path) {
            Some(Entry::File(data)) => Ok(data.clone()),
            Some(Entry::Directory) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is a directory"),
            )),
            None if path == "/" => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "/ is a directory",
            )),
            None => Err(not_found(&path)),
        }
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let path = normalize(path)?;
        let mut entries = self.entries.write();
        if Self::kind(&entries, &path) == Some(EntryKind::Directory) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is a directory"),
            ));
        }
        Self::require_parent_dir(&entries, &path)?;
        entries.insert(path, Entry::File(contents.to_vec()));
        Ok(())
    }

    fn mkdir(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut entries = self.entries.write();
        if Self::kind(&entries, &path).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{path} already exists"),
            ));
        }
        Self::require_parent_dir(&entries, &path)?;
        entries.insert(path, Entry::Directory);
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to remove the root directory",
            ));
        }
        let mut entries = self.entries.write();
        let prefix = child_prefix(&path);
        if entries.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)) {
            return Err(io::Error::other(format!("{path}: directory not empty")));
        }
        entries.remove(&path).map(|_| ()).ok_or_else(|| not_found(&path))
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to remove the root directory",
            ));
        }
        let mut entries = self.entries.write();
        if entries.remove(&path).is_none() {
            return Err(not_found(&path));
        }
        let prefix = child_prefix(&path);
        entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = normalize(path)?;
        let entries = self.entries.read();
        match Self::kind(&entries, &path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{path} is not a directory"),
                ))
            }
            None => return Err(not_found(&path)),
        }

        let prefix = child_prefix(&path);
        let children = entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, entry)| {
                let name = &k[prefix.len()..];
                if name.contains('/') {
                    return None;
                }
                let kind = match entry {
                    Entry::Directory => EntryKind::Directory,
                    Entry::File(_) => EntryKind::File,
                };
                Some(DirEntry {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect();
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdir_requires_parent() {
        let fs = MemFs::new();
        assert_eq!(fs.mkdir("/a/b").unwrap_err().kind(), io::ErrorKind::NotFound);
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert_eq!(fs.mkdir("/a").unwrap_err().kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_read_dir_lists_immediate_children_sorted() {
        let fs = MemFs::new();
        fs.mkdir("/parent").unwrap();
        fs.mkdir("/parent/zeta").unwrap();
        fs.mkdir("/parent/alpha").unwrap();
        fs.mkdir("/parent/alpha/nested").unwrap();
        fs.write("/parent/doc.yaml", b"{}\n").unwrap();
        fs.mkdir("/parentheses").unwrap();

        let listed = fs.read_dir("/parent").unwrap();
        let names: Vec<_> = listed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "doc.yaml", "zeta"]);
        assert_eq!(listed[1].kind, EntryKind::File);

        let root: Vec<_> = fs.read_dir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(root, vec!["parent", "parentheses"]);
    }

    #[test]
    fn test_remove_all_is_scoped() {
        let fs = MemFs::new();
        fs.mkdir("/a").unwrap();
        fs.write("/a/x.yaml", b"").unwrap();
        fs.mkdir("/ab").unwrap();

        assert!(fs.remove("/a").is_err());
        fs.remove_all("/a").unwrap();
        assert!(fs.stat("/a/x.yaml").is_err());
        assert_eq!(fs.stat("/ab").unwrap(), EntryKind::Directory);
    }

    #[test]
    fn test_write_and_read() {
        let fs = MemFs::new();
        assert!(fs.write("/missing/doc.yaml", b"").is_err());
        fs.write("/doc.yaml", b"first").unwrap();
        fs.write("/doc.yaml", b"second").unwrap();
        assert_eq!(fs.read("/doc.yaml").unwrap(), b"second");
        assert!(fs.read("/").is_err());
    }
}
