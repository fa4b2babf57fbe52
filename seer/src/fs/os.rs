use super::{components, DirEntry, EntryKind, FileSystem};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The host filesystem, rooted at a directory.
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !fs::metadata(&root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(OsFs { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for part in components(path)? {
            resolved.push(part);
        }
        Ok(resolved)
    }
}

fn kind_of(metadata: &fs::Metadata) -> EntryKind {
    if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

impl FileSystem for OsFs {
    fn stat(&self, path: &str) -> io::Result<EntryKind> {
        Ok(kind_of(&fs::metadata(self.resolve(path)?)?))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path)?, contents)
    }

    fn mkdir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if fs::metadata(&target)?.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        }
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to remove the root directory",
            ));
        }
        if fs::metadata(&target)?.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    log::warn!("Skipping non UTF-8 entry {:?} in {}", raw, path);
                    continue;
                }
            };
            // Follow symlinks so a linked directory lists as a directory.
            let kind = kind_of(&fs::metadata(entry.path())?);
            entries.push(DirEntry { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
