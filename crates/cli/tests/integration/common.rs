//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file or directory.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment with its own config directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Copy every file of a fixture directory into the temp directory.
  pub fn from_fixture_dir(name: &str) -> Self {
    let env = Self::empty();
    for entry in std::fs::read_dir(fixture_path(name)).unwrap() {
      let entry = entry.unwrap();
      std::fs::copy(entry.path(), env.temp.path().join(entry.file_name())).unwrap();
    }
    env
  }

  /// Write a file relative to the temp directory and return its path.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn path(&self) -> PathBuf {
    self.temp.path().to_path_buf()
  }

  /// Get a pre-configured Command for the cft binary.
  ///
  /// Ambient project and credential variables are removed and the API
  /// endpoint points at a closed local port.
  pub fn cft_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("cft");
    cmd.current_dir(self.temp.path());
    cmd.env("CFT_API_ENDPOINT", "http://127.0.0.1:9");
    cmd.env_remove("CLOUD_FOUNDATION_PROJECT_ID");
    cmd.env_remove("CLOUDSDK_CORE_PROJECT");
    cmd.env_remove("CFT_ACCESS_TOKEN");
    cmd.env_remove("GOOGLE_OAUTH_ACCESS_TOKEN");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
