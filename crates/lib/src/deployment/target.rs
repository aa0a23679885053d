//! Building the remote target from a resolved config.

use std::fs;
use std::path::Path;

use crate::document::Document;
use crate::remote::{ImportFile, Target};

use super::DeploymentError;

/// Serialize the config and read every file listed under `imports`.
///
/// Import paths are relative to `base_dir`. An entry's `name` defaults to its
/// `path`.
pub(crate) fn build_target(document: &Document, base_dir: &Path) -> Result<Target, DeploymentError> {
  let config = document.to_yaml()?;

  let mut imports = Vec::new();
  for entry in document.get("imports").and_then(Document::as_sequence).unwrap_or_default() {
    let Some(path) = entry.get("path").and_then(Document::as_str) else {
      continue;
    };
    let name = entry.get("name").and_then(Document::as_str).unwrap_or(path);
    let full = base_dir.join(path);
    let content = fs::read_to_string(&full).map_err(|source| DeploymentError::Import { path: full, source })?;
    imports.push(ImportFile {
      name: name.to_string(),
      content,
    });
  }

  Ok(Target { config, imports })
}
