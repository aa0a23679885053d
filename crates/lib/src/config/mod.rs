//! Configuration nodes.
//!
//! A [`Config`] is one deployable unit: the rendered and parsed text of a
//! config source, its `(project, deployment)` identity and the set of
//! deployments it references. Everything is computed once when the config is
//! loaded and never changes afterwards.

mod source;

pub use source::{ConfigSource, collect_sources};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::consts::{PROJECT_ENV, REMOTE_CONFIG_KEYS, SDK_PROJECT_ENV};
use crate::document::{Document, DocumentError};
use crate::reference::{self, OutputReference, ReferenceError};
use crate::render::{RenderError, TemplateRenderer, process_env};
use crate::types::NodeId;

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error("failed to parse {source_name}: {source}")]
  Document {
    source_name: String,
    #[source]
    source: DocumentError,
  },

  #[error("{source_name}: config must be a YAML mapping")]
  NotAMapping { source_name: String },

  #[error("{source_name}: inline config has no 'name' field")]
  MissingName { source_name: String },

  #[error("{source_name}: no project set; use --project, a 'project' field, or CLOUD_FOUNDATION_PROJECT_ID")]
  MissingProject { source_name: String },

  #[error(transparent)]
  Reference(#[from] ReferenceError),
}

/// Inputs that influence how a config resolves its identity.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
  /// Explicit project override. Wins over everything else.
  pub project: Option<String>,
  /// Environment visible to templates and used for project fallbacks.
  pub env: BTreeMap<String, String>,
}

impl LoadOptions {
  /// Options seeded from the current process environment.
  pub fn from_env(project: Option<String>) -> Self {
    Self {
      project,
      env: process_env(),
    }
  }

  fn ambient_project(&self) -> Option<String> {
    [PROJECT_ENV, SDK_PROJECT_ENV]
      .iter()
      .filter_map(|key| self.env.get(*key))
      .find(|value| !value.is_empty())
      .cloned()
  }
}

/// One configuration, loaded and analysed.
#[derive(Debug, Clone)]
pub struct Config {
  source: ConfigSource,
  document: Document,
  id: NodeId,
  references: BTreeSet<OutputReference>,
  dependencies: BTreeSet<NodeId>,
}

impl Config {
  /// Read, render and parse a config source.
  ///
  /// The project comes from, in order: the explicit override, the document's
  /// `project` field, `CLOUD_FOUNDATION_PROJECT_ID`, `CLOUDSDK_CORE_PROJECT`.
  /// The deployment name is the document's `name`, else the file name up to
  /// its first `.`.
  pub fn load(
    source: ConfigSource,
    renderer: &dyn TemplateRenderer,
    options: &LoadOptions,
  ) -> Result<Self, ConfigError> {
    let source_name = source.label();
    let raw = source.read()?;
    let rendered = renderer.render(&source_name, &raw, &options.env)?;
    let document = Document::parse(&rendered).map_err(|source| ConfigError::Document {
      source_name: source_name.clone(),
      source,
    })?;

    if document.as_mapping().is_none() {
      return Err(ConfigError::NotAMapping { source_name });
    }

    let project = options
      .project
      .clone()
      .or_else(|| string_field(&document, "project"))
      .or_else(|| options.ambient_project())
      .ok_or_else(|| ConfigError::MissingProject {
        source_name: source_name.clone(),
      })?;

    let deployment = string_field(&document, "name")
      .or_else(|| source.default_name())
      .ok_or_else(|| ConfigError::MissingName {
        source_name: source_name.clone(),
      })?;

    let references = reference::scan(&rendered, &project)?;
    let dependencies = references.iter().map(OutputReference::node).collect();
    let id = NodeId::new(project, deployment);

    debug!(config = %id, source = %source_name, dependencies = ?dependencies, "loaded config");

    Ok(Self {
      source,
      document,
      id,
      references,
      dependencies,
    })
  }

  pub fn source(&self) -> &ConfigSource {
    &self.source
  }

  pub fn document(&self) -> &Document {
    &self.document
  }

  pub fn id(&self) -> &NodeId {
    &self.id
  }

  pub fn project(&self) -> &str {
    &self.id.project
  }

  pub fn deployment(&self) -> &str {
    &self.id.deployment
  }

  /// Every output reference found in the rendered text.
  pub fn references(&self) -> &BTreeSet<OutputReference> {
    &self.references
  }

  /// Deployments this config consumes outputs from.
  pub fn dependencies(&self) -> &BTreeSet<NodeId> {
    &self.dependencies
  }

  /// Directory that relative `imports[].path` entries resolve against.
  pub fn base_dir(&self) -> PathBuf {
    self.source.base_dir()
  }

  /// The part of the document that is sent to the remote API.
  pub fn remote_document(&self) -> Document {
    self.document.select(&REMOTE_CONFIG_KEYS)
  }
}

fn string_field(document: &Document, key: &str) -> Option<String> {
  document
    .get(key)
    .and_then(Document::as_str)
    .filter(|value| !value.is_empty())
    .map(str::to_string)
}

/// Load every source, stopping at the first error.
pub fn load_configs(
  sources: Vec<ConfigSource>,
  renderer: &dyn TemplateRenderer,
  options: &LoadOptions,
) -> Result<Vec<Config>, ConfigError> {
  sources
    .into_iter()
    .map(|source| Config::load(source, renderer, options))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::render::JinjaRenderer;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  fn options(project: Option<&str>, env: &[(&str, &str)]) -> LoadOptions {
    LoadOptions {
      project: project.map(str::to_string),
      env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
  }

  fn inline(text: &str, opts: &LoadOptions) -> Result<Config, ConfigError> {
    Config::load(ConfigSource::Inline(text.to_string()), &JinjaRenderer, opts)
  }

  #[test]
  fn identity_from_document() {
    let config = inline("name: net\nproject: doc-proj\nresources: []", &options(None, &[])).unwrap();
    assert_eq!(config.id(), &NodeId::new("doc-proj", "net"));
  }

  #[test]
  fn project_override_wins() {
    let opts = options(Some("cli-proj"), &[(PROJECT_ENV, "env-proj")]);
    let config = inline("name: net\nproject: doc-proj", &opts).unwrap();
    assert_eq!(config.project(), "cli-proj");
  }

  #[test]
  fn document_project_beats_environment() {
    let opts = options(None, &[(PROJECT_ENV, "env-proj"), (SDK_PROJECT_ENV, "sdk-proj")]);
    let config = inline("name: net\nproject: doc-proj", &opts).unwrap();
    assert_eq!(config.project(), "doc-proj");
  }

  #[test]
  fn environment_fallbacks_in_order() {
    let both = options(None, &[(PROJECT_ENV, "env-proj"), (SDK_PROJECT_ENV, "sdk-proj")]);
    assert_eq!(inline("name: net", &both).unwrap().project(), "env-proj");

    let sdk_only = options(None, &[(SDK_PROJECT_ENV, "sdk-proj")]);
    assert_eq!(inline("name: net", &sdk_only).unwrap().project(), "sdk-proj");
  }

  #[test]
  fn missing_project_is_an_error() {
    let err = inline("name: net", &options(None, &[])).unwrap_err();
    assert!(matches!(err, ConfigError::MissingProject { .. }));
  }

  #[test]
  fn inline_without_name_is_an_error() {
    let err = inline("resources: []", &options(Some("p"), &[])).unwrap_err();
    assert!(matches!(err, ConfigError::MissingName { .. }));
  }

  #[test]
  fn file_name_is_default_deployment() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("my-firewalls.prod.yaml");
    fs::write(&path, "resources: []\n").unwrap();

    let config = Config::load(ConfigSource::File(path), &JinjaRenderer, &options(Some("p"), &[])).unwrap();
    assert_eq!(config.deployment(), "my-firewalls");
    assert_eq!(config.base_dir(), temp.path());
  }

  #[test]
  fn non_mapping_document_is_rejected() {
    let err = inline("- a\n- b", &options(Some("p"), &[])).unwrap_err();
    assert!(matches!(err, ConfigError::NotAMapping { .. }));
  }

  #[test]
  fn dependencies_use_rendered_text_and_own_project() {
    let opts = options(Some("p"), &[("NET", "shared-net")]);
    let text = "name: vm\nresources:\n- name: vm\n  properties:\n    network: $(out.{{ env.NET }}.net.selfLink)\n    subnet: !DMOutput dm://other/subnets/sub/selfLink\n";
    let config = inline(text, &opts).unwrap();

    assert_eq!(
      config.dependencies().iter().cloned().collect::<Vec<_>>(),
      vec![NodeId::new("other", "subnets"), NodeId::new("p", "shared-net")]
    );
    assert_eq!(config.references().len(), 2);
  }

  #[test]
  fn invalid_reference_fails_load() {
    let err = inline("name: vm\nx: $(out.too.short)", &options(Some("p"), &[])).unwrap_err();
    assert!(matches!(err, ConfigError::Reference(_)));
  }

  #[test]
  fn remote_document_keeps_api_keys_only() {
    let config = inline(
      "name: vm\nproject: p\ndescription: x\nresources: []\noutputs: []",
      &options(None, &[]),
    )
    .unwrap();
    let remote = config.remote_document();
    let keys: Vec<_> = remote.as_mapping().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["outputs", "resources"]);
  }

  #[test]
  #[serial]
  fn from_env_reads_process_environment() {
    temp_env::with_vars(
      [(PROJECT_ENV, Some("from-process")), (SDK_PROJECT_ENV, None::<&str>)],
      || {
        let opts = LoadOptions::from_env(None);
        let config = inline("name: net", &opts).unwrap();
        assert_eq!(config.project(), "from-process");
      },
    );
  }
}
