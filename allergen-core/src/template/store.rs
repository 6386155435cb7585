//! Where templates come from

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

use super::TemplateDocument;
use crate::error::{ConvertError, Result};

/// Source of template documents, looked up by name
///
/// Every call returns a freshly parsed document; callers mutate it freely.
pub trait TemplateStore {
    fn load(&self, name: &str) -> Result<TemplateDocument>;
}

/// Templates stored as files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryTemplateStore {
    root: PathBuf,
}

impl DirectoryTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateStore for DirectoryTemplateStore {
    fn load(&self, name: &str) -> Result<TemplateDocument> {
        let path = self.root.join(name);
        debug!(path = %path.display(), "loading template");
        let bytes = fs::read(&path).map_err(|source| ConvertError::TemplateLoad {
            name: name.to_string(),
            source,
        })?;
        TemplateDocument::from_bytes(name, &bytes)
    }
}

/// Template bytes registered in memory, e.g. embedded in a service
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, Vec<u8>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.templates.insert(name.into(), bytes)
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self, name: &str) -> Result<TemplateDocument> {
        let bytes = self
            .templates
            .get(name)
            .ok_or_else(|| ConvertError::TemplateLoad {
                name: name.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "template not registered"),
            })?;
        TemplateDocument::from_bytes(name, bytes)
    }
}

impl<S: TemplateStore + ?Sized> TemplateStore for &S {
    fn load(&self, name: &str) -> Result<TemplateDocument> {
        (**self).load(name)
    }
}
