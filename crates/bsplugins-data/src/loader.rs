//! Settings files and the shared file plumbing of this crate.
//!
//! Provides format detection (RON/JSON/TOML), deserialization helpers and
//! atomic text-file replacement used by the list readers and writers.

use bsplugins_core::config::Settings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while reading or writing collaborator files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A value could not be serialized for writing.
    #[error("cannot serialize {file}: {detail}")]
    Serialize { file: PathBuf, detail: String },

    /// The path given for a directory scan is not a directory.
    #[error("not a directory: {dir}")]
    NotADirectory { dir: PathBuf },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported settings file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Serialize `value` in the format implied by `path` and write it there.
pub fn serialize_file<T: Serialize>(path: &Path, value: &T) -> Result<(), DataLoadError> {
    let format = detect_format(path)?;
    let serialize_error = |detail: String| DataLoadError::Serialize {
        file: path.to_path_buf(),
        detail,
    };

    let content = match format {
        Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map_err(|e| serialize_error(e.to_string()))?,
        Format::Json => {
            serde_json::to_string_pretty(value).map_err(|e| serialize_error(e.to_string()))?
        }
        Format::Toml => toml::to_string_pretty(value).map_err(|e| serialize_error(e.to_string()))?,
    };
    write_atomic(path, content.as_bytes())
}

// ===========================================================================
// Settings
// ===========================================================================

/// Load [`Settings`] from a `.ron`, `.toml` or `.json` file. Missing fields
/// take their defaults.
pub fn load_settings(path: &Path) -> Result<Settings, DataLoadError> {
    deserialize_file(path)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), DataLoadError> {
    serialize_file(path, settings)
}

// ===========================================================================
// Writing
// ===========================================================================

/// Replace `path` with `bytes` through a temporary file in the same
/// directory, so readers never see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataLoadError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
