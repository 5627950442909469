//! JSON artifact helpers shared by every stage.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PipelineError, Result};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed, with a trailing newline so hand-edited tables diff cleanly.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(data).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    write_bytes(path, json.as_bytes())?;
    tracing::debug!("  {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Compact output for the large build artifacts.
pub fn write_json_compact<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_vec(data).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes(path, &json)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    std::fs::write(path, bytes).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Delete an artifact left over from an earlier run. Returns whether a file
/// was removed.
pub fn remove_stale(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::warn!("Removed stale {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}
