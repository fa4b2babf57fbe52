// Filesystem providers - the rooted namespace a store lives in

mod memory;
mod os;

pub use memory::MemFs;
pub use os::OsFs;

use std::io;
use std::sync::Arc;

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// An immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A rooted namespace addressed by `/`-joined absolute paths.
///
/// `"/"` is the root and always exists. Paths never escape the root: a `..`
/// component is rejected with [`io::ErrorKind::InvalidInput`].
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &str) -> io::Result<EntryKind>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create the file or truncate it, then write `contents`. The parent
    /// directory must exist.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    /// Create a single directory. The parent must exist.
    fn mkdir(&self, path: &str) -> io::Result<()>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> io::Result<()>;

    /// Remove a file, or a directory and everything below it.
    fn remove_all(&self, path: &str) -> io::Result<()>;

    /// Immediate children of a directory, sorted by name.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;
}

macro_rules! forward_fs {
    ($($wrapper:ident),*) => {$(
        impl<F: FileSystem + ?Sized> FileSystem for $wrapper<F> {
            fn stat(&self, path: &str) -> io::Result<EntryKind> {
                (**self).stat(path)
            }

            fn read(&self, path: &str) -> io::Result<Vec<u8>> {
                (**self).read(path)
            }

            fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
                (**self).write(path, contents)
            }

            fn mkdir(&self, path: &str) -> io::Result<()> {
                (**self).mkdir(path)
            }

            fn remove(&self, path: &str) -> io::Result<()> {
                (**self).remove(path)
            }

            fn remove_all(&self, path: &str) -> io::Result<()> {
                (**self).remove_all(path)
            }

            fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
                (**self).read_dir(path)
            }
        }
    )*};
}

forward_fs!(Arc, Box);

/// Re-roots another provider at one of its sub-directories.
pub struct BasePathFs<F> {
    inner: F,
    base: String,
}

impl<F: FileSystem> BasePathFs<F> {
    pub fn new(inner: F, base: &str) -> io::Result<Self> {
        Ok(BasePathFs {
            inner,
            base: normalize(base)?,
        })
    }

    fn resolve(&self, path: &str) -> io::Result<String> {
        let relative = normalize(path)?;
        if self.base == "/" {
            Ok(relative)
        } else if relative == "/" {
            Ok(self.base.clone())
        } else {
            Ok(format!("{}{}", self.base, relative))
        }
    }
}

impl<F: FileSystem> FileSystem for BasePathFs<F> {
    fn stat(&self, path: &str) -> io::Result<EntryKind> {
        self.inner.stat(&self.resolve(path)?)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner.read(&self.resolve(path)?)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.inner.write(&self.resolve(path)?, contents)
    }

    fn mkdir(&self, path: &str) -> io::Result<()> {
        self.inner.mkdir(&self.resolve(path)?)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let resolved = self.resolve(path)?;
        if resolved == self.base {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to remove the base directory",
            ));
        }
        self.inner.remove(&resolved)
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let resolved = self.resolve(path)?;
        if resolved == self.base {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to remove the base directory",
            ));
        }
        self.inner.remove_all(&resolved)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.inner.read_dir(&self.resolve(path)?)
    }
}

/// Split a store path into its components, dropping empty and `.` parts.
pub(crate) fn components(path: &str) -> io::Result<Vec<&str>> {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path `{path}` escapes the root"),
                ))
            }
            _ => out.push(part),
        }
    }
    Ok(out)
}

/// Canonical `/a/b` form of a store path; the root is `/`.
pub(crate) fn normalize(path: &str) -> io::Result<String> {
    let parts = components(path)?;
    if parts.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

/// Join path segments into an absolute store path.
pub(crate) fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::from("/");
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(segment.as_ref());
    }
    out
}
