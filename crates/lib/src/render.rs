//! Template rendering for raw configuration text.
//!
//! Configs may be Jinja templates. The process environment is exposed to the
//! template as the `env` mapping, e.g. `{{ env['HOME'] }}` or `{{ env.USER }}`.

use std::collections::BTreeMap;

use minijinja::{Environment, context};
use thiserror::Error;

/// Errors that can occur while rendering a template.
#[derive(Debug, Error)]
#[error("failed to render {name}: {source}")]
pub struct RenderError {
  pub name: String,
  #[source]
  pub source: minijinja::Error,
}

/// Turns raw config text into rendered text.
///
/// Implementations must be deterministic for the same input.
pub trait TemplateRenderer: Send + Sync {
  /// Render `text`. `name` identifies the source in error messages.
  fn render(&self, name: &str, text: &str, env: &BTreeMap<String, String>) -> Result<String, RenderError>;
}

/// Renders configs with Jinja syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct JinjaRenderer;

impl TemplateRenderer for JinjaRenderer {
  fn render(&self, name: &str, text: &str, env: &BTreeMap<String, String>) -> Result<String, RenderError> {
    let jinja = Environment::new();
    jinja
      .render_str(text, context! { env => env })
      .map_err(|source| RenderError {
        name: name.to_string(),
        source,
      })
  }
}

/// Snapshot of the current process environment.
pub fn process_env() -> BTreeMap<String, String> {
  std::env::vars().collect()
}
