//! Constants shared across the crate.

use std::time::Duration;

/// Environment variable holding the default project for every config.
pub const PROJECT_ENV: &str = "CLOUD_FOUNDATION_PROJECT_ID";

/// Project configured for the cloud SDK, used as the last fallback.
pub const SDK_PROJECT_ENV: &str = "CLOUDSDK_CORE_PROJECT";

/// Overrides the base URL of the Deployment Manager API.
pub const API_ENDPOINT_ENV: &str = "CFT_API_ENDPOINT";

/// Bearer tokens, checked in order.
pub const ACCESS_TOKEN_ENVS: [&str; 2] = ["CFT_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

pub const DEFAULT_API_ENDPOINT: &str = "https://www.googleapis.com/deploymentmanager/v2";

/// Ceiling for a single remote operation. Matches gcloud.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_PARALLELISM: usize = 4;

/// Top-level keys of a config that the remote API understands.
pub const REMOTE_CONFIG_KEYS: [&str; 4] = ["imports", "resources", "outputs", "configVersion"];

/// File extensions picked up when a directory is passed as a config.
pub const CONFIG_EXTENSIONS: [&str; 3] = ["yaml", "yml", "jinja"];
