//! Loader for declarative resource files.

use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::error::{AuthoringError, Result};
use super::fs::FileSystem;
use super::resource::{ResourceItem, ResourceSchema};
use super::status::Status;

/// Items produced by one load pass. The two lists never overlap.
#[derive(Debug, Clone)]
pub struct LoadOutcome<P> {
    /// Resources parsed successfully.
    pub loaded: Vec<ResourceItem<P>>,
    /// One item per file that could not be read or parsed.
    pub failed: Vec<ResourceItem<P>>,
}

impl<P> Default for LoadOutcome<P> {
    fn default() -> Self {
        Self {
            loaded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Reads resource files through a [`FileSystem`] and parses them with a schema.
pub struct ResourceLoader<'a, S, F> {
    schema: &'a S,
    fs: &'a F,
}

impl<'a, S, F> ResourceLoader<'a, S, F>
where
    S: ResourceSchema,
    F: FileSystem,
{
    pub fn new(schema: &'a S, fs: &'a F) -> Self {
        Self { schema, fs }
    }

    /// Loads every path. A failing file becomes a failed item and never stops
    /// the others from loading.
    pub async fn load(&self, paths: &[PathBuf]) -> LoadOutcome<S::Payload> {
        let results = join_all(paths.iter().map(|path| self.load_file(path))).await;

        let mut outcome = LoadOutcome::default();
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(items) => outcome.loaded.extend(items),
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    let status = if e.is_content_error() {
                        Status::failed_to_read(e.to_string())
                    } else {
                        Status::failed_to_load(e.to_string())
                    };
                    outcome.failed.push(ResourceItem::failed(path.clone(), status));
                }
            }
        }

        log::debug!(
            "Loaded {} {} resource(s) from {} file(s), {} file(s) failed",
            outcome.loaded.len(),
            self.schema.service(),
            paths.len(),
            outcome.failed.len()
        );

        outcome
    }

    /// Loads a single file, which may hold several resources.
    pub async fn load_file(&self, path: &Path) -> Result<Vec<ResourceItem<S::Payload>>> {
        let text = self.fs.read_all_text(path).await?;
        self.parse(&text, path)
    }

    /// Parses file content. Every resulting item inherits `path`.
    pub fn parse(&self, text: &str, path: &Path) -> Result<Vec<ResourceItem<S::Payload>>> {
        let entries = self.schema.deserialize(text, path)?;
        Ok(entries
            .into_iter()
            .map(|(name, payload)| {
                let id = self.schema.identifier(&name, &payload);
                ResourceItem::local(id, name, path, payload)
            })
            .collect())
    }
}

/// Finds files with `extension` under `dir`, skipping hidden files and
/// directories. The result is sorted for stable ordering.
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| AuthoringError::ReadDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        if let Ok(relative) = path.strip_prefix(dir) {
            let hidden = relative.components().any(|c| {
                c.as_os_str()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            });
            if hidden {
                continue;
            }
        }

        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
