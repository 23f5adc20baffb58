//! Resume support for batch imports

use crate::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Set of URLs already imported, persisted as a JSON array
#[derive(Debug, Default)]
pub struct ProgressFile {
    path: Option<PathBuf>,
    imported: HashSet<String>,
}

impl ProgressFile {
    /// An in-memory checkpoint that is never written to disk
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Loads the checkpoint at `path`
    ///
    /// A missing file starts an empty checkpoint. An unreadable or corrupt
    /// file is reported and ignored so the import can still run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let imported = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(urls) => urls.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt progress file");
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read progress file");
                HashSet::new()
            }
        };

        if !imported.is_empty() {
            info!(count = imported.len(), "Loaded already imported URLs from progress file");
        }

        Self {
            path: Some(path),
            imported,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_imported(&self, url: &str) -> bool {
        self.imported.contains(url)
    }

    pub fn mark_imported(&mut self, url: &str) {
        self.imported.insert(url.to_string());
    }

    pub fn len(&self) -> usize {
        self.imported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imported.is_empty()
    }

    /// Writes the checkpoint as a sorted, pretty-printed JSON array
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut urls: Vec<&String> = self.imported.iter().collect();
        urls.sort();
        std::fs::write(path, serde_json::to_string_pretty(&urls)?)?;
        Ok(())
    }
}

/// Reads one URL per line, skipping blank lines and `#` comments
pub fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
