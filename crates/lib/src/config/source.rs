//! Where configuration text comes from.
//!
//! Each command-line `config` argument is either a directory (expanded to the
//! config files directly inside it), a file path, or an inline YAML document.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::CONFIG_EXTENSIONS;

use super::ConfigError;

/// The origin of one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
  /// A config file on disk.
  File(PathBuf),
  /// Raw config text given directly on the command line.
  Inline(String),
}

impl ConfigSource {
  /// Classify a single argument. Anything that is not an existing file is
  /// treated as inline text.
  pub fn from_arg(arg: &str) -> Self {
    let path = Path::new(arg);
    if path.is_file() {
      ConfigSource::File(path.to_path_buf())
    } else {
      ConfigSource::Inline(arg.to_string())
    }
  }

  /// Read the raw (unrendered) text.
  pub fn read(&self) -> Result<String, ConfigError> {
    match self {
      ConfigSource::File(path) => fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
      }),
      ConfigSource::Inline(text) => Ok(text.clone()),
    }
  }

  /// Default deployment name: the file name up to its first `.`.
  pub fn default_name(&self) -> Option<String> {
    match self {
      ConfigSource::File(path) => path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string),
      ConfigSource::Inline(_) => None,
    }
  }

  /// Directory that relative import paths are resolved against.
  pub fn base_dir(&self) -> PathBuf {
    match self {
      ConfigSource::File(path) => path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")),
      ConfigSource::Inline(_) => PathBuf::from("."),
    }
  }

  /// Short label for logs and error messages.
  pub fn label(&self) -> String {
    match self {
      ConfigSource::File(path) => path.display().to_string(),
      ConfigSource::Inline(_) => "<inline>".to_string(),
    }
  }
}

impl fmt::Display for ConfigSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigSource::File(path) => write!(f, "{}", path.display()),
      ConfigSource::Inline(text) => f.write_str(text),
    }
  }
}

/// Expand command-line arguments into config sources.
///
/// Directories contribute their `.yaml`, `.yml` and `.jinja` files (not
/// recursive), sorted by path.
pub fn collect_sources<S: AsRef<str>>(args: &[S]) -> Result<Vec<ConfigSource>, ConfigError> {
  let mut sources = Vec::new();

  for arg in args {
    let arg = arg.as_ref();
    let path = Path::new(arg);
    if path.is_dir() {
      let mut files = config_files_in(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      files.sort();
      sources.extend(files.into_iter().map(ConfigSource::File));
    } else {
      sources.push(ConfigSource::from_arg(arg));
    }
  }

  debug!(count = sources.len(), "collected config sources");
  Ok(sources)
}

fn config_files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_file() && has_config_extension(&path) {
      files.push(path);
    }
  }
  Ok(files)
}

fn has_config_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
}
