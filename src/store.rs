use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::template::Template;

/// A keyed collection of templates. Templates are stored serialized, so a
/// `load` re-parses and therefore re-checks the shape of what was saved; a
/// backend shared with other writers surfaces foreign garbage as
/// [`StoreError::Malformed`] instead of a panic later on.
pub trait TemplateStore {
    fn load(&self, key: &str) -> Result<Template, StoreError>;
    fn save(&mut self, key: &str, template: &Template) -> Result<(), StoreError>;
}

/// An in-memory store, mostly useful for request-scoped caches and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Template, StoreError> {
        let raw = self
            .entries
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Template::from_json(raw).map_err(|error| StoreError::Malformed {
            key: key.to_string(),
            reason: error.to_string(),
        })
    }

    fn save(&mut self, key: &str, template: &Template) -> Result<(), StoreError> {
        let raw = template
            .to_json()
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        self.entries.insert(key.to_string(), raw);
        Ok(())
    }
}

/// A store that keeps each template as a JSON file under a root directory. The
/// key is interpreted as a path relative to the root, `.json` appended when the
/// key has no extension.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let candidate = self.root.join(key);
        if candidate.extension().is_some() {
            candidate
        } else {
            candidate.with_extension("json")
        }
    }
}

impl TemplateStore for FileStore {
    fn load(&self, key: &str) -> Result<Template, StoreError> {
        let path = self.resolve(key);
        let raw = fs::read_to_string(&path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Backend(format!("could not read {:?}: {}", path, error))
            }
        })?;
        Template::from_json(&raw).map_err(|error| StoreError::Malformed {
            key: key.to_string(),
            reason: error.to_string(),
        })
    }

    fn save(&mut self, key: &str, template: &Template) -> Result<(), StoreError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                StoreError::Backend(format!("could not create {:?}: {}", parent, error))
            })?;
        }
        let raw = template
            .to_json()
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        fs::write(&path, raw)
            .map_err(|error| StoreError::Backend(format!("could not write {:?}: {}", path, error)))
    }
}
