//! Destinations for extracted payloads.
//!
//! The extraction engine hands every payload to a [`PayloadSink`] and stores
//! the returned path in the output record.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Receives extracted payloads
///
/// # Example
///
/// ```
/// use rtfd_guns_core::{PayloadSink, Result};
///
/// #[derive(Default)]
/// struct MemorySink {
///     files: Vec<(String, Vec<u8>)>,
/// }
///
/// impl PayloadSink for MemorySink {
///     fn store(&mut self, filename: &str, data: &[u8]) -> Result<String> {
///         self.files.push((filename.to_string(), data.to_vec()));
///         Ok(format!("memory://{}", filename))
///     }
/// }
/// ```
pub trait PayloadSink {
    /// Stores `data` under a name derived from `filename`, returning the path
    fn store(&mut self, filename: &str, data: &[u8]) -> Result<String>;
}

/// Replaces path separators so a recovered name stays a single component
pub fn sanitize_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match safe.as_str() {
        "" => "_".to_string(),
        "." | ".." => safe.replace('.', "_"),
        _ => safe,
    }
}

/// A sink that writes nothing and reports the sanitized name
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PayloadSink for NullSink {
    fn store(&mut self, filename: &str, _data: &[u8]) -> Result<String> {
        Ok(sanitize_filename(filename))
    }
}

/// Writes payloads into a single output directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    force: bool,
}

impl DirectorySink {
    /// Creates a sink rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force: false,
        }
    }

    /// Sets whether existing files are overwritten
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The output directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if `path` is a readable file holding exactly `data`
    pub fn matches_content(path: &Path, data: &[u8]) -> bool {
        fs::read(path).map(|existing| existing == data).unwrap_or(false)
    }

    /// Resolves the output path for `filename`, rejecting anything that
    /// would land outside the output directory
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let safe = sanitize_filename(filename);
        let relative = Path::new(&safe);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(relative)),
            _ => Err(Error::path_traversal(relative)),
        }
    }
}

impl PayloadSink for DirectorySink {
    fn store(&mut self, filename: &str, data: &[u8]) -> Result<String> {
        let path = self.resolve(filename)?;

        fs::create_dir_all(&self.root).map_err(|e| Error::directory_create(&self.root, e))?;

        if path.exists() && !self.force {
            if Self::matches_content(&path, data) {
                trace!("{} already holds this payload", path.display());
                return Ok(path.display().to_string());
            }
            return Err(Error::FileExists { path });
        }

        fs::write(&path, data).map_err(|e| Error::file_write(&path, e))?;
        trace!("Wrote {} bytes to {}", data.len(), path.display());

        Ok(path.display().to_string())
    }
}
