// Store configuration - which filesystem backs a store, and the YAML config
// file the command line tool reads

use crate::error::{Result, SeerError};
use crate::fs::{BasePathFs, EntryKind, FileSystem, OsFs};
use crate::store::Seer;
use serde::Deserialize;
use std::path::{Path, PathBuf};

enum Backend {
    System(PathBuf),
    Virtual {
        fs: Box<dyn FileSystem>,
        base: String,
    },
}

/// Builder for a [`Seer`]. Exactly one filesystem option must be chosen.
#[derive(Default)]
pub struct Options {
    backends: Vec<Backend>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back the store with the OS filesystem, rooted at `root`.
    pub fn system_fs(mut self, root: impl AsRef<Path>) -> Self {
        self.backends
            .push(Backend::System(root.as_ref().to_path_buf()));
        self
    }

    /// Back the store with `fs`, re-rooted at `base` inside it.
    pub fn virtual_fs(mut self, fs: impl FileSystem + 'static, base: &str) -> Self {
        self.backends.push(Backend::Virtual {
            fs: Box::new(fs),
            base: base.to_string(),
        });
        self
    }

    pub fn build(self) -> Result<Seer> {
        let mut backends = self.backends.into_iter();
        let backend = match (backends.next(), backends.next()) {
            (Some(backend), None) => backend,
            (None, _) => {
                return Err(SeerError::Repository(
                    "no filesystem option given".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(SeerError::Repository(
                    "can't combine filesystem options".to_string(),
                ))
            }
        };

        let fs: Box<dyn FileSystem> = match backend {
            Backend::System(root) => {
                let os = OsFs::new(&root).map_err(|e| {
                    SeerError::Repository(format!("{}: {e}", root.display()))
                })?;
                log::info!("Opening store at {}", os.root().display());
                Box::new(os)
            }
            Backend::Virtual { fs, base } => Box::new(
                BasePathFs::new(fs, &base)
                    .map_err(|e| SeerError::Repository(format!("{base}: {e}")))?,
            ),
        };

        match fs.stat("/") {
            Ok(EntryKind::Directory) => Ok(Seer::from_fs(fs)),
            Ok(EntryKind::File) => Err(SeerError::Repository(
                "store root is not a directory".to_string(),
            )),
            Err(e) => Err(SeerError::Repository(e.to_string())),
        }
    }
}

/// On-disk configuration for a store.
///
/// ```yaml
/// root: ./data
/// create_root: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeerConfig {
    pub root: PathBuf,
    /// Create `root` (and its parents) when it does not exist yet.
    #[serde(default)]
    pub create_root: bool,
}

impl SeerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SeerConfig {
            root: root.into(),
            create_root: false,
        }
    }

    /// Read a config file. A relative `root` is taken relative to the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let contents =
            std::fs::read_to_string(path).map_err(|e| SeerError::io(display.as_str(), e))?;
        let mut config: SeerConfig =
            serde_yaml::from_str(&contents).map_err(|source| SeerError::Yaml {
                path: display,
                source,
            })?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }

    pub fn open(&self) -> Result<Seer> {
        if self.create_root && !self.root.exists() {
            std::fs::create_dir_all(&self.root)
                .map_err(|e| SeerError::io(self.root.display().to_string(), e))?;
            log::info!("Created store root {}", self.root.display());
        }
        Options::new().system_fs(&self.root).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_combined_backends_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Options::new()
            .system_fs(tmp.path())
            .virtual_fs(MemFs::new(), "/")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("can't combine filesystem options"));

        assert!(Options::new().build().is_err());
    }

    #[test]
    fn test_virtual_base_must_be_a_directory() {
        let fs = Arc::new(MemFs::new());
        fs.write("/file", b"").unwrap();
        let err = Options::new()
            .virtual_fs(fs.clone(), "/file")
            .build()
            .unwrap_err();
        assert!(matches!(err, SeerError::Repository(_)));
        assert!(Options::new().virtual_fs(fs.clone(), "/missing").build().is_err());
    }

    #[test]
    fn test_virtual_base_scopes_the_store() {
        let fs = Arc::new(MemFs::new());
        fs.mkdir("/tenant").unwrap();
        let seer = Options::new().virtual_fs(fs.clone(), "/tenant").build().unwrap();

        seer.get("doc").document().commit().unwrap();
        assert_eq!(fs.stat("/tenant/doc.yaml").unwrap(), EntryKind::File);
        assert_eq!(seer.list().unwrap(), vec!["doc"]);
    }

    #[test]
    fn test_config_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seer.yaml");
        std::fs::write(&path, "root: data\ncreate_root: true\n").unwrap();

        let config = SeerConfig::from_file(&path).unwrap();
        assert_eq!(config.root, tmp.path().join("data"));
        assert!(config.create_root);

        let seer = config.open().unwrap();
        assert!(tmp.path().join("data").is_dir());
        assert!(seer.list().unwrap().is_empty());
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seer.yaml");
        std::fs::write(&path, "root: data\nroots: typo\n").unwrap();
        assert!(matches!(
            SeerConfig::from_file(&path).unwrap_err(),
            SeerError::Yaml { .. }
        ));
    }

    #[test]
    fn test_missing_root_without_create() {
        let tmp = TempDir::new().unwrap();
        let config = SeerConfig::new(tmp.path().join("absent"));
        assert!(config.open().is_err());
        assert!(!tmp.path().join("absent").exists());
    }
}
