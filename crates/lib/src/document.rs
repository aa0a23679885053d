//! Typed document model for rendered configurations.
//!
//! Configurations are YAML documents. Instead of passing untyped maps around,
//! every rendered config is parsed once into a [`Document`] tree. The reference
//! scanner and the output substitution both walk this tree.
//!
//! YAML tags (e.g. `!DMOutput dm://...`) survive parsing as
//! [`Document::Tagged`] nodes so they can be resolved at deployment time.
//!
//! Mapping keys are always strings: integer and boolean keys are converted
//! on parse, so `80: http` is sent to the API as `'80': http`. Mappings are
//! ordered by key, not by their position in the source text.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_yaml::value::{Tag, TaggedValue};
use thiserror::Error;

/// A node of a parsed configuration document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
  Null,
  Bool(bool),
  Number(serde_yaml::Number),
  String(String),
  Sequence(Vec<Document>),
  Mapping(BTreeMap<String, Document>),
  /// A tagged node. `tag` is stored without the leading `!`.
  Tagged { tag: String, value: Box<Document> },
}

/// Errors that can occur while parsing or serializing a document.
#[derive(Debug, Error)]
pub enum DocumentError {
  #[error("invalid YAML: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("unsupported mapping key: {0}")]
  UnsupportedKey(String),
}

impl Document {
  /// Parse YAML text into a document. Blank input yields [`Document::Null`].
  pub fn parse(text: &str) -> Result<Self, DocumentError> {
    if text.trim().is_empty() {
      return Ok(Document::Null);
    }
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    Document::try_from(value)
  }

  /// Serialize the document back into YAML text.
  pub fn to_yaml(&self) -> Result<String, DocumentError> {
    Ok(serde_yaml::to_string(&self.to_value())?)
  }

  /// Look up a key when this node is a mapping.
  pub fn get(&self, key: &str) -> Option<&Document> {
    self.as_mapping().and_then(|map| map.get(key))
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Document::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_mapping(&self) -> Option<&BTreeMap<String, Document>> {
    match self {
      Document::Mapping(map) => Some(map),
      _ => None,
    }
  }

  pub fn as_sequence(&self) -> Option<&[Document]> {
    match self {
      Document::Sequence(items) => Some(items),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Document::Null)
  }

  /// Returns a mapping holding only the given top-level keys.
  ///
  /// Keys missing from this document are skipped. Non-mapping documents yield
  /// an empty mapping.
  pub fn select(&self, keys: &[&str]) -> Document {
    let selected = keys
      .iter()
      .filter_map(|key| self.get(key).map(|value| (key.to_string(), value.clone())))
      .collect();
    Document::Mapping(selected)
  }

  /// Render a scalar for inline interpolation into a larger string.
  ///
  /// Collections are rendered as JSON.
  pub fn to_inline_string(&self) -> String {
    match self {
      Document::Null => String::new(),
      Document::Bool(b) => b.to_string(),
      Document::Number(n) => n.to_string(),
      Document::String(s) => s.clone(),
      Document::Tagged { value, .. } => value.to_inline_string(),
      Document::Sequence(_) | Document::Mapping(_) => serde_json::to_string(&self.to_value()).unwrap_or_default(),
    }
  }

  /// Convert into the equivalent `serde_yaml` value.
  pub fn to_value(&self) -> serde_yaml::Value {
    match self {
      Document::Null => serde_yaml::Value::Null,
      Document::Bool(b) => serde_yaml::Value::Bool(*b),
      Document::Number(n) => serde_yaml::Value::Number(n.clone()),
      Document::String(s) => serde_yaml::Value::String(s.clone()),
      Document::Sequence(items) => serde_yaml::Value::Sequence(items.iter().map(Document::to_value).collect()),
      Document::Mapping(map) => serde_yaml::Value::Mapping(
        map
          .iter()
          .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.to_value()))
          .collect(),
      ),
      Document::Tagged { tag, value } => serde_yaml::Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag.clone()),
        value: value.to_value(),
      })),
    }
  }
}

impl TryFrom<serde_yaml::Value> for Document {
  type Error = DocumentError;

  fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
    Ok(match value {
      serde_yaml::Value::Null => Document::Null,
      serde_yaml::Value::Bool(b) => Document::Bool(b),
      serde_yaml::Value::Number(n) => Document::Number(n),
      serde_yaml::Value::String(s) => Document::String(s),
      serde_yaml::Value::Sequence(items) => {
        Document::Sequence(items.into_iter().map(Document::try_from).collect::<Result<_, _>>()?)
      }
      serde_yaml::Value::Mapping(mapping) => {
        let mut map = BTreeMap::new();
        for (key, value) in mapping {
          map.insert(mapping_key(key)?, Document::try_from(value)?);
        }
        Document::Mapping(map)
      }
      serde_yaml::Value::Tagged(tagged) => {
        let TaggedValue { tag, value } = *tagged;
        Document::Tagged {
          tag: tag.to_string().trim_start_matches('!').to_string(),
          value: Box::new(Document::try_from(value)?),
        }
      }
    })
  }
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, DocumentError> {
  match key {
    serde_yaml::Value::String(s) => Ok(s),
    serde_yaml::Value::Number(n) => Ok(n.to_string()),
    serde_yaml::Value::Bool(b) => Ok(b.to_string()),
    other => Err(DocumentError::UnsupportedKey(format!("{other:?}"))),
  }
}

impl Serialize for Document {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_value().serialize(serializer)
  }
}

impl From<&str> for Document {
  fn from(s: &str) -> Self {
    Document::String(s.to_string())
  }
}

impl From<String> for Document {
  fn from(s: String) -> Self {
    Document::String(s)
  }
}

impl From<bool> for Document {
  fn from(b: bool) -> Self {
    Document::Bool(b)
  }
}

impl From<i64> for Document {
  fn from(n: i64) -> Self {
    Document::Number(n.into())
  }
}
