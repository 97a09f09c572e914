//! Document Loading
//!
//! Reads schema documents from disk (`.json`, `.yaml`, `.yml`) and finds
//! them under a directory.

use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{GenError, Result};

/// Extensions recognised as schema documents
pub const DOCUMENT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Directories never searched
const SKIPPED_DIRS: &[&str] = &["target", ".git", "node_modules"];

/// Read one document, choosing the parser by extension
pub fn load_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    match extension_of(path).as_deref() {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(GenError::UnsupportedInput(path.display().to_string())),
    }
}

/// Every schema document under `root`, sorted by path.
///
/// A file path is returned as-is when it has a recognised extension.
pub fn discover(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_document(root) { vec![root.to_path_buf()] } else { Vec::new() };
    }

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_document(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Default root schema name for a document: its file stem
pub fn root_name_for(path: &Path) -> Option<String> {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

fn is_document(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}
