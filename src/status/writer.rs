use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Writes `value` as compact JSON, replacing any previous file. Returns the path and byte size.
pub fn write_compact<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<(PathBuf, u64)> {
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let path = dir.join(file_name);
    let body = serde_json::to_vec(value).with_context(|| format!("serialize {file_name}"))?;
    fs::write(&path, &body).with_context(|| format!("write {}", path.display()))?;
    Ok((path, body.len() as u64))
}
