//! Dataset snapshot writer.
//!
//! Serializes harvested payloads to stable locations under the output root.
//! Every file is written whole to a temp sibling and renamed into place, so
//! a process interrupt never leaves a truncated snapshot behind. JSON is
//! pretty-printed with 4-space indentation and non-ASCII characters are kept
//! literal; combined with `BTreeMap`-backed payloads, two runs against an
//! unchanged upstream produce byte-identical files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from dataset persistence.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Filesystem failure while preparing or writing a snapshot.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload could not be serialized.
    #[error("serialization failed for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writer rooted at the run's output directory.
///
/// The orchestrator owns the root's lifecycle and is the only caller of
/// [`DatasetWriter::reset`]; harvest stages only add files under it. Writers
/// for different (kind, key) pairs never collide on a path.
pub struct DatasetWriter {
    root: PathBuf,
}

impl DatasetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deletes and recreates the output root.
    ///
    /// Idempotent wipe: after this, the root contains exactly the files the
    /// current run will produce — stale snapshots from a prior run never
    /// persist next to fresh siblings.
    pub fn reset(&self) -> Result<(), WriteError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|source| WriteError::Io {
                path: self.root.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&self.root).map_err(|source| WriteError::Io {
            path: self.root.clone(),
            source,
        })?;
        info!(root = %self.root.display(), "output root recreated");
        Ok(())
    }

    /// Idempotently creates one directory under the root.
    pub fn prepare_dir(&self, relative: &str) -> Result<(), WriteError> {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).map_err(|source| WriteError::Io { path, source })
    }

    /// Serializes `value` as pretty JSON to `<root>/<relative>`, replacing
    /// any prior content atomically at the file level.
    pub fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<(), WriteError> {
        let path = self.root.join(relative);
        let bytes = to_pretty_json(value).map_err(|source| WriteError::Serialize {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        let io_err = |source, at: &Path| WriteError::Io {
            path: at.to_path_buf(),
            source,
        };
        fs::write(&tmp, &bytes).map_err(|e| io_err(e, &tmp))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(e, &path))?;

        debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }
}

/// Pretty-prints with 4-space indentation, preserving non-ASCII literally.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}
