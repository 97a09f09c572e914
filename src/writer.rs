//! Artifact Writer
//!
//! Turns generated artifacts into files: one `{name}.{ext}` per artifact,
//! with its imports and an optional banner. Files whose content would not
//! change are left untouched, and a dry run can preview line changes.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};

use crate::checksum::Checksum;
use crate::codegen::{ArtifactSet, GeneratedArtifact};
use crate::config::OutputConfig;
use crate::error::Result;

/// First line of every generated file when the banner is on
pub const GENERATED_HEADER: &str = "# Generated by kclgen from JSON Schema. DO NOT EDIT.";

/// Full file text: banner, imports, then the artifact body
pub fn render_file(artifact: &GeneratedArtifact, header: bool) -> String {
    let mut output = String::new();
    if header {
        output.push_str(GENERATED_HEADER);
        output.push_str("\n\n");
    }
    for module in &artifact.required_imports {
        output.push_str(&format!("import {}\n", module));
    }
    if !artifact.required_imports.is_empty() {
        output.push('\n');
    }
    output.push_str(&artifact.content);
    output
}

/// Path an artifact is written to
pub fn artifact_path(dir: &Path, artifact: &GeneratedArtifact, output: &OutputConfig) -> PathBuf {
    dir.join(format!("{}.{}", artifact.name, output.extension))
}

/// What [`write_artifacts`] did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    /// Files already holding the same content
    pub unchanged: Vec<PathBuf>,
}

/// Write every artifact into `dir`, skipping files whose checksum matches
pub fn write_artifacts(artifacts: &ArtifactSet, dir: &Path, output: &OutputConfig) -> Result<WriteReport> {
    fs::create_dir_all(dir)?;
    let mut report = WriteReport::default();

    for artifact in artifacts.iter() {
        let path = artifact_path(dir, artifact, output);
        let text = render_file(artifact, output.header);

        if Checksum::of_file(&path)? == Some(Checksum::from_str(&text)) {
            tracing::debug!(path = %path.display(), "Unchanged");
            report.unchanged.push(path);
            continue;
        }

        fs::write(&path, &text)?;
        tracing::debug!(path = %path.display(), "Written");
        report.written.push(path);
    }

    tracing::info!(
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        "Wrote artifacts to {}",
        dir.display()
    );
    Ok(report)
}

// =============================================================================
// Diff preview
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileChange {
    Added,
    /// Changed lines, each prefixed with `-` or `+`
    Modified { lines: Vec<String> },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactDiff {
    pub path: PathBuf,
    pub change: FileChange,
}

/// Compare what would be written against the files in `dir`, writing nothing
pub fn diff_artifacts(artifacts: &ArtifactSet, dir: &Path, output: &OutputConfig) -> Result<Vec<ArtifactDiff>> {
    let mut diffs = Vec::with_capacity(artifacts.len());

    for artifact in artifacts.iter() {
        let path = artifact_path(dir, artifact, output);
        let new_text = render_file(artifact, output.header);

        let change = match fs::read_to_string(&path) {
            Ok(old_text) if old_text == new_text => FileChange::Unchanged,
            Ok(old_text) => FileChange::Modified {
                lines: changed_lines(&old_text, &new_text),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileChange::Added,
            Err(e) => return Err(e.into()),
        };
        diffs.push(ArtifactDiff { path, change });
    }

    Ok(diffs)
}

fn changed_lines(old_text: &str, new_text: &str) -> Vec<String> {
    let diff = TextDiff::from_lines(old_text, new_text);
    diff.iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => return None,
            };
            Some(format!("{}{}", sign, change.value().trim_end_matches('\n')))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn artifact(name: &str, content: &str, imports: &[&str]) -> GeneratedArtifact {
        GeneratedArtifact {
            name: name.to_string(),
            content: content.to_string(),
            required_imports: imports.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn set(items: Vec<GeneratedArtifact>) -> ArtifactSet {
        let mut set = ArtifactSet::new();
        for item in items {
            set.insert(item);
        }
        set
    }

    #[test]
    fn test_render_file_layout() {
        let a = artifact("Code", "type Code = str\n", &["regex", "math"]);
        assert_eq!(
            render_file(&a, true),
            format!("{}\n\nimport math\nimport regex\n\ntype Code = str\n", GENERATED_HEADER)
        );
        assert_eq!(render_file(&artifact("A", "type A = int\n", &[]), false), "type A = int\n");
    }

    #[test]
    fn test_write_skips_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig::default();
        let first = set(vec![artifact("A", "type A = int\n", &[]), artifact("B", "type B = str\n", &[])]);

        let report = write_artifacts(&first, dir.path(), &output).unwrap();
        assert_eq!(report.written.len(), 2);
        assert!(dir.path().join("A.k").exists());

        let second = set(vec![artifact("A", "type A = int\n", &[]), artifact("B", "type B = float\n", &[])]);
        let report = write_artifacts(&second, dir.path(), &output).unwrap();
        assert_eq!(report.unchanged, vec![dir.path().join("A.k")]);
        assert_eq!(report.written, vec![dir.path().join("B.k")]);
    }

    #[test]
    fn test_diff_preview() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            header: false,
            ..OutputConfig::default()
        };
        write_artifacts(&set(vec![artifact("A", "type A = int\n", &[])]), dir.path(), &output).unwrap();

        let next = set(vec![artifact("A", "type A = float\n", &[]), artifact("C", "type C = str\n", &[])]);
        let diffs = diff_artifacts(&next, dir.path(), &output).unwrap();
        assert_eq!(
            diffs[0].change,
            FileChange::Modified {
                lines: vec!["-type A = int".to_string(), "+type A = float".to_string()]
            }
        );
        assert_eq!(diffs[1].change, FileChange::Added);
        // Nothing was written
        assert!(!dir.path().join("C.k").exists());
    }
}
