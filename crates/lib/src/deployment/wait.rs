//! Polling remote operations to completion.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, trace};

use crate::consts::{OPERATION_TIMEOUT, POLL_INTERVAL};
use crate::remote::{DeploymentApi, Operation, OperationStatus};
use crate::types::NodeId;

use super::DeploymentError;

/// How long and how often to poll an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
  pub poll_interval: Duration,
  pub timeout: Duration,
}

impl Default for WaitConfig {
  fn default() -> Self {
    Self {
      poll_interval: POLL_INTERVAL,
      timeout: OPERATION_TIMEOUT,
    }
  }
}

/// Poll `operation` until it finishes or the timeout passes.
pub(crate) async fn wait_for_operation(
  api: &dyn DeploymentApi,
  node: &NodeId,
  operation: &Operation,
  config: &WaitConfig,
) -> Result<(), DeploymentError> {
  let deadline = Instant::now() + config.timeout;
  let mut status = operation.status.clone();
  debug!(deployment = %node, operation = %operation.name, kind = %operation.operation_type, "waiting for operation");

  let timed_out = || DeploymentError::OperationTimeout {
    node: node.clone(),
    operation: operation.name.clone(),
    timeout: config.timeout,
  };

  loop {
    match status {
      OperationStatus::Done => {
        debug!(deployment = %node, operation = %operation.name, "operation done");
        return Ok(());
      }
      OperationStatus::Error(message) => {
        return Err(DeploymentError::OperationFailed {
          node: node.clone(),
          operation: operation.name.clone(),
          message,
        });
      }
      OperationStatus::Pending => {}
    }

    let now = Instant::now();
    if now >= deadline {
      return Err(timed_out());
    }
    sleep(config.poll_interval.min(deadline - now)).await;

    // A single stalled poll must not outlive the deadline either.
    let remaining = deadline.saturating_duration_since(Instant::now());
    status = timeout(remaining, api.poll_operation(&node.project, &operation.name))
      .await
      .map_err(|_| timed_out())?
      .map_err(|source| DeploymentError::Remote {
        node: node.clone(),
        source,
      })?;
    trace!(deployment = %node, operation = %operation.name, status = %status, "polled operation");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::{DeploymentSpec, MemoryDeploymentApi, MutationOptions, Target};

  fn fast() -> WaitConfig {
    WaitConfig {
      poll_interval: Duration::from_millis(5),
      timeout: Duration::from_millis(200),
    }
  }

  async fn start(api: &MemoryDeploymentApi) -> Operation {
    let spec = DeploymentSpec {
      name: "net".into(),
      target: Some(Target {
        config: "resources: []".into(),
        imports: Vec::new(),
      }),
      fingerprint: None,
    };
    api
      .create_deployment("p", &spec, &MutationOptions::default())
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn finishes_after_pending_polls() {
    let api = MemoryDeploymentApi::new().polls_until_done(3);
    let op = start(&api).await;
    wait_for_operation(&api, &NodeId::new("p", "net"), &op, &fast())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn failed_operation_is_an_error() {
    let node = NodeId::new("p", "net");
    let api = MemoryDeploymentApi::new().failing_operations(node.clone(), "QUOTA_EXCEEDED");
    let op = start(&api).await;
    let err = wait_for_operation(&api, &node, &op, &fast()).await.unwrap_err();
    assert!(matches!(err, DeploymentError::OperationFailed { ref message, .. } if message == "QUOTA_EXCEEDED"));
  }

  #[tokio::test]
  async fn never_finishing_operation_times_out() {
    let node = NodeId::new("p", "net");
    let api = MemoryDeploymentApi::new().hanging_operations(node.clone());
    let op = start(&api).await;
    let config = WaitConfig {
      poll_interval: Duration::from_millis(5),
      timeout: Duration::from_millis(40),
    };
    let err = wait_for_operation(&api, &node, &op, &config).await.unwrap_err();
    assert!(matches!(err, DeploymentError::OperationTimeout { .. }));
  }

  #[tokio::test]
  async fn stalled_poll_times_out_at_the_deadline() {
    let node = NodeId::new("p", "net");
    let api = MemoryDeploymentApi::new().polls_until_done(1).stalling_operations(node.clone());
    let op = start(&api).await;
    let config = WaitConfig {
      poll_interval: Duration::from_millis(5),
      timeout: Duration::from_millis(100),
    };

    let started = std::time::Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(5), wait_for_operation(&api, &node, &op, &config))
      .await
      .expect("wait must not hang past its own deadline")
      .unwrap_err();

    assert!(matches!(err, DeploymentError::OperationTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
  }
}
