//! Isolated working directories for supervised runs
//!
//! A [`WorkDir`] is a scratch directory that one harness owns exclusively. It
//! can be populated from a nested JSON tree where strings are file contents
//! and objects are directories:
//!
//! ```
//! use buildrig_process::WorkDir;
//! use serde_json::json;
//!
//! let dir = WorkDir::create().unwrap();
//! dir.setup(&json!({
//!     "package.json": "{}",
//!     "src": { "client.js": "console.log('hi')" },
//!     "test/a.spec.js": "",
//! }))
//! .unwrap();
//! assert!(dir.contains(&["src/client.js", "test/a.spec.js"]));
//! dir.remove().unwrap();
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{ProcessError, Result};

/// Scratch directory a supervised process runs in
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
    /// Created by us under the temp dir and removed on drop
    temporary: bool,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under the system temp dir
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("buildrig-").tempdir()?;
        Ok(Self {
            root: dir.keep(),
            temporary: true,
        })
    }

    /// Use (and create if needed) an explicit directory
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            temporary: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Whether this is a scratch dir that nobody asked to keep
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Keep the directory on disk when this value is dropped
    pub fn persist(&mut self) {
        self.temporary = false;
    }

    /// Absolute path of a file inside the directory
    pub fn join(&self, file: &str) -> Result<PathBuf> {
        Ok(self.root.join(self.relative(file)?))
    }

    /// Write every file of a nested fixture tree
    pub fn setup(&self, tree: &Value) -> Result<()> {
        for (file, content) in flatten_tree(tree)? {
            self.write(&file, &content)?;
        }
        Ok(())
    }

    /// Write `content` to `file`, creating parent directories
    pub fn write(&self, file: &str, content: &str) -> Result<()> {
        let path = self.join(file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// File contents with surrounding whitespace trimmed
    pub fn content(&self, file: &str) -> Result<String> {
        Ok(fs::read_to_string(self.join(file)?)?.trim().to_string())
    }

    /// Rewrite a file from its current (trimmed) contents
    pub fn modify<F>(&self, file: &str, f: F) -> Result<()>
    where
        F: FnOnce(&str) -> String,
    {
        let current = self.content(file).unwrap_or_default();
        self.write(file, &f(&current))
    }

    /// Create the file if missing and bump its modification time
    pub fn touch(&self, file: &str) -> Result<()> {
        let path = self.join(file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let handle = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        handle.set_modified(std::time::SystemTime::now())?;
        Ok(())
    }

    /// Whether every listed file or directory exists
    pub fn contains(&self, files: &[&str]) -> bool {
        !files.is_empty()
            && files
                .iter()
                .all(|file| self.join(file).map(|p| p.exists()).unwrap_or(false))
    }

    /// Sorted entry names of a directory inside the work dir
    pub fn list(&self, dir: &str) -> Result<Vec<String>> {
        let path = if dir.is_empty() {
            self.root.clone()
        } else {
            self.join(dir)?
        };
        let mut names = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    /// Recursively delete the directory
    pub fn remove(mut self) -> Result<()> {
        self.temporary = false;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessError::WorkDir {
                path: self.root.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn relative<'a>(&self, file: &'a str) -> Result<&'a Path> {
        let path = Path::new(file);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || file.is_empty() {
            return Err(ProcessError::WorkDir {
                path: self.root.join(file),
                reason: "fixture paths must be relative and stay inside the work dir".to_string(),
            });
        }
        Ok(path)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.root.display(), error = %e, "Failed to remove work dir");
            }
        }
    }
}

/// Flatten a nested fixture tree into `path -> content`
///
/// Keys may themselves contain `/`. Numbers and booleans are written using
/// their JSON text; arrays and null are rejected.
pub fn flatten_tree(tree: &Value) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    flatten_into(tree, "", &mut files)?;
    Ok(files)
}

fn flatten_into(value: &Value, prefix: &str, files: &mut BTreeMap<String, String>) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", prefix, key)
                };
                flatten_into(child, &path, files)?;
            }
            Ok(())
        }
        _ if prefix.is_empty() => Err(ProcessError::WorkDir {
            path: PathBuf::new(),
            reason: "fixture tree must be an object".to_string(),
        }),
        Value::String(content) => {
            files.insert(prefix.to_string(), content.clone());
            Ok(())
        }
        Value::Number(_) | Value::Bool(_) => {
            files.insert(prefix.to_string(), value.to_string());
            Ok(())
        }
        Value::Array(_) | Value::Null => Err(ProcessError::WorkDir {
            path: PathBuf::from(prefix),
            reason: "fixture values must be strings or nested objects".to_string(),
        }),
    }
}
