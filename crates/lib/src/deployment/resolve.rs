//! Replacing output references in a document with live values.

use std::collections::{BTreeMap, BTreeSet};

use crate::document::Document;
use crate::reference::{self, OUTPUT_TAG, OutputReference, ReferenceError};
use crate::remote::{DeploymentApi, OutputValue, resolve_output};
use crate::types::NodeId;

use super::DeploymentError;

/// Resolved reference values, keyed by reference.
pub(crate) type ResolvedOutputs = BTreeMap<OutputReference, Document>;

/// Every reference appearing in `document`.
pub(crate) fn collect_references(
  document: &Document,
  project: &str,
) -> Result<BTreeSet<OutputReference>, ReferenceError> {
  let mut found = BTreeSet::new();
  visit(document, project, &mut found)?;
  Ok(found)
}

fn visit(node: &Document, project: &str, found: &mut BTreeSet<OutputReference>) -> Result<(), ReferenceError> {
  match node {
    Document::Tagged { tag, value } if tag == OUTPUT_TAG => {
      if let Some(url) = value.as_str() {
        found.insert(reference::parse_url(url, project)?);
      }
    }
    Document::Tagged { value, .. } => visit(value, project, found)?,
    Document::String(text) => {
      for m in reference::find_in_str(text, project)? {
        found.insert(m.reference);
      }
    }
    Document::Sequence(items) => {
      for item in items {
        visit(item, project, found)?;
      }
    }
    Document::Mapping(map) => {
      for value in map.values() {
        visit(value, project, found)?;
      }
    }
    Document::Null | Document::Bool(_) | Document::Number(_) => {}
  }
  Ok(())
}

/// Fetch the value of every reference. A missing output fails the node.
pub(crate) async fn resolve_all(
  api: &dyn DeploymentApi,
  node: &NodeId,
  references: BTreeSet<OutputReference>,
) -> Result<ResolvedOutputs, DeploymentError> {
  let mut resolved = ResolvedOutputs::new();
  for reference in references {
    let value = resolve_output(api, &reference)
      .await
      .map_err(|source| DeploymentError::Remote {
        node: node.clone(),
        source,
      })?;
    match value {
      OutputValue::Found(value) => {
        resolved.insert(reference, value);
      }
      OutputValue::NotFound => {
        return Err(DeploymentError::UnresolvedOutput {
          node: node.clone(),
          reference,
        });
      }
    }
  }
  Ok(resolved)
}

/// Rebuild `document` with references replaced.
///
/// A string that is exactly one reference takes the referenced value with its
/// type. References embedded in longer strings are interpolated as text.
pub(crate) fn substitute(
  document: &Document,
  project: &str,
  resolved: &ResolvedOutputs,
) -> Result<Document, ReferenceError> {
  Ok(match document {
    Document::Tagged { tag, value } if tag == OUTPUT_TAG => match value.as_str() {
      Some(url) => lookup(resolved, &reference::parse_url(url, project)?),
      None => document.clone(),
    },
    Document::Tagged { tag, value } => Document::Tagged {
      tag: tag.clone(),
      value: Box::new(substitute(value, project, resolved)?),
    },
    Document::String(text) => substitute_str(text, project, resolved)?,
    Document::Sequence(items) => Document::Sequence(
      items
        .iter()
        .map(|item| substitute(item, project, resolved))
        .collect::<Result<_, _>>()?,
    ),
    Document::Mapping(map) => {
      let mut out = BTreeMap::new();
      for (key, value) in map {
        out.insert(key.clone(), substitute(value, project, resolved)?);
      }
      Document::Mapping(out)
    }
    Document::Null | Document::Bool(_) | Document::Number(_) => document.clone(),
  })
}

fn substitute_str(text: &str, project: &str, resolved: &ResolvedOutputs) -> Result<Document, ReferenceError> {
  let matches = reference::find_in_str(text, project)?;
  if matches.is_empty() {
    return Ok(Document::String(text.to_string()));
  }

  if let [only] = matches.as_slice()
    && text[..only.range.start].trim().is_empty()
    && text[only.range.end..].trim().is_empty()
  {
    return Ok(lookup(resolved, &only.reference));
  }

  let mut out = String::with_capacity(text.len());
  let mut last = 0;
  for m in &matches {
    out.push_str(&text[last..m.range.start]);
    out.push_str(&lookup(resolved, &m.reference).to_inline_string());
    last = m.range.end;
  }
  out.push_str(&text[last..]);
  Ok(Document::String(out))
}

fn lookup(resolved: &ResolvedOutputs, reference: &OutputReference) -> Document {
  resolved.get(reference).cloned().unwrap_or(Document::Null)
}
