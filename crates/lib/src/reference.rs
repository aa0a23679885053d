//! Cross-deployment output references.
//!
//! A configuration can consume an output of another deployment's resource.
//! Two spellings are recognised:
//!
//! - `!DMOutput dm://[project/]deployment/resource/name` - a YAML tag carrying
//!   a URL-like locator
//! - `$(out.[project.]deployment.resource.name)` - an inline token
//!
//! When the project segment is omitted, the referencing config's own project
//! is used. Each reference contributes one `(project, deployment)` dependency.
//!
//! # Example
//!
//! ```
//! use cft_lib::reference::{scan, OutputReference};
//!
//! let refs = scan("network: $(out.my-networks.net.selfLink)\n", "my-project").unwrap();
//! assert!(refs.contains(&OutputReference::new("my-project", "my-networks", "net", "selfLink")));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

use crate::types::NodeId;

/// YAML tag (without `!`) marking a structured reference.
pub const OUTPUT_TAG: &str = "DMOutput";

const URL_SCHEME: &str = "dm://";

const URL_FORMAT: &str = "dm://${project}/${deployment}/${resource}/${name} or dm://${deployment}/${resource}/${name}";

const TOKEN_FORMAT: &str =
  "$(out.${project}.${deployment}.${resource}.${name}) or $(out.${deployment}.${resource}.${name})";

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"!DMOutput\s+(?P<url>\bdm://[-/a-zA-Z0-9]+\b)|\$\(out\.(?P<token>[-.a-zA-Z0-9]+)\)")
    .expect("reference pattern is valid")
});

static COMMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*#").expect("comment pattern is valid"));

/// A pointer to a named output of a resource in another deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OutputReference {
  pub project: String,
  pub deployment: String,
  pub resource: String,
  pub name: String,
}

impl OutputReference {
  pub fn new(
    project: impl Into<String>,
    deployment: impl Into<String>,
    resource: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    Self {
      project: project.into(),
      deployment: deployment.into(),
      resource: resource.into(),
      name: name.into(),
    }
  }

  /// The deployment this reference depends on.
  pub fn node(&self) -> NodeId {
    NodeId::new(&self.project, &self.deployment)
  }
}

impl fmt::Display for OutputReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}{}/{}/{}/{}",
      URL_SCHEME, self.project, self.deployment, self.resource, self.name
    )
  }
}

/// Errors that can occur while parsing references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
  #[error("invalid output reference '{reference}': expected {expected}")]
  InvalidReferenceFormat { reference: String, expected: &'static str },
}

/// A reference found inside a string, with the byte range it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMatch {
  pub range: Range<usize>,
  pub reference: OutputReference,
}

/// Parse a `dm://` locator.
///
/// The locator must have three segments (`deployment/resource/name`, project
/// defaulted) or four (`project/deployment/resource/name`).
pub fn parse_url(url: &str, default_project: &str) -> Result<OutputReference, ReferenceError> {
  let invalid = || ReferenceError::InvalidReferenceFormat {
    reference: url.to_string(),
    expected: URL_FORMAT,
  };

  let rest = url.trim().strip_prefix(URL_SCHEME).ok_or_else(invalid)?;
  let segments: Vec<&str> = rest.split('/').collect();
  if segments.iter().any(|s| s.is_empty()) {
    return Err(invalid());
  }

  match segments.as_slice() {
    [deployment, resource, name] => Ok(OutputReference::new(default_project, *deployment, *resource, *name)),
    [project, deployment, resource, name] => Ok(OutputReference::new(*project, *deployment, *resource, *name)),
    _ => Err(invalid()),
  }
}

/// Parse the dotted body of an `$(out.…)` token (without the `out.` prefix).
pub fn parse_token(token: &str, default_project: &str) -> Result<OutputReference, ReferenceError> {
  let invalid = || ReferenceError::InvalidReferenceFormat {
    reference: format!("$(out.{token})"),
    expected: TOKEN_FORMAT,
  };

  let parts: Vec<&str> = token.split('.').collect();
  if parts.iter().any(|p| p.is_empty()) {
    return Err(invalid());
  }

  match parts.as_slice() {
    [deployment, resource, name] => Ok(OutputReference::new(default_project, *deployment, *resource, *name)),
    [project, deployment, resource, name] => Ok(OutputReference::new(*project, *deployment, *resource, *name)),
    _ => Err(invalid()),
  }
}

/// Scan raw configuration text for references, skipping comment lines.
pub fn scan(text: &str, default_project: &str) -> Result<BTreeSet<OutputReference>, ReferenceError> {
  let mut references = BTreeSet::new();

  for line in text.lines() {
    if COMMENT_PATTERN.is_match(line) {
      continue;
    }
    for captures in REFERENCE_PATTERN.captures_iter(line) {
      references.insert(from_captures(&captures, default_project)?);
    }
  }

  Ok(references)
}

/// The set of deployments a configuration text depends on.
pub fn dependencies(text: &str, default_project: &str) -> Result<BTreeSet<NodeId>, ReferenceError> {
  Ok(scan(text, default_project)?.iter().map(OutputReference::node).collect())
}

/// Find every reference embedded in a single string value.
pub fn find_in_str(value: &str, default_project: &str) -> Result<Vec<ReferenceMatch>, ReferenceError> {
  REFERENCE_PATTERN
    .captures_iter(value)
    .filter_map(|captures| {
      let whole = captures.get(0)?;
      Some(from_captures(&captures, default_project).map(|reference| ReferenceMatch {
        range: whole.range(),
        reference,
      }))
    })
    .collect()
}

fn from_captures(captures: &Captures<'_>, default_project: &str) -> Result<OutputReference, ReferenceError> {
  match (captures.name("url"), captures.name("token")) {
    (Some(url), _) => parse_url(url.as_str(), default_project),
    (None, Some(token)) => parse_token(token.as_str(), default_project),
    (None, None) => Err(ReferenceError::InvalidReferenceFormat {
      reference: captures.get(0).map_or_else(String::new, |m| m.as_str().to_string()),
      expected: TOKEN_FORMAT,
    }),
  }
}
