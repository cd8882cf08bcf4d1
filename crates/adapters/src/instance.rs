// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compute-instance and autoscaling control seam.
//!
//! Every operation is best-effort from the worker's point of view: failures
//! are reported as values, logged by the caller, and never abort the
//! service loop.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from instance-control operations.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("instance control unavailable: {0}")]
    Unavailable(String),
    #[error("instance control failure: {0}")]
    Failed(String),
}

/// Adapter over the compute-instance and autoscaling control planes.
#[async_trait]
pub trait InstanceControl: Clone + Send + Sync + 'static {
    /// Identity of the instance this worker runs on, when determinable.
    async fn self_instance_id(&self) -> Option<String>;

    async fn stop_instance(&self, instance_id: &str) -> Result<(), InstanceError>;

    async fn set_scale_in_protection(
        &self,
        group: &str,
        instance_id: &str,
        enabled: bool,
    ) -> Result<(), InstanceError>;

    async fn set_group_size(
        &self,
        group: &str,
        min: Option<u32>,
        desired: Option<u32>,
        max: Option<u32>,
    ) -> Result<(), InstanceError>;

    /// OS-level shutdown of the host itself.
    async fn request_os_shutdown(&self) -> Result<(), InstanceError>;
}

/// Host-only instance control.
///
/// No cloud control plane is wired in: the instance id is unknown and
/// stop/scale operations report unavailability. OS shutdown is real and
/// runs the configured command.
#[derive(Clone, Debug)]
pub struct HostInstanceControl {
    shutdown_command: Vec<String>,
}

impl HostInstanceControl {
    pub fn new() -> Self {
        Self {
            shutdown_command: vec![
                "shutdown".to_string(),
                "-h".to_string(),
                "now".to_string(),
            ],
        }
    }

    pub fn with_shutdown_command(command: Vec<String>) -> Self {
        Self { shutdown_command: command }
    }
}

impl Default for HostInstanceControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceControl for HostInstanceControl {
    async fn self_instance_id(&self) -> Option<String> {
        None
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), InstanceError> {
        Err(InstanceError::Unavailable(format!("no control plane to stop {instance_id}")))
    }

    async fn set_scale_in_protection(
        &self,
        group: &str,
        _instance_id: &str,
        _enabled: bool,
    ) -> Result<(), InstanceError> {
        Err(InstanceError::Unavailable(format!("no control plane for group {group}")))
    }

    async fn set_group_size(
        &self,
        group: &str,
        _min: Option<u32>,
        _desired: Option<u32>,
        _max: Option<u32>,
    ) -> Result<(), InstanceError> {
        Err(InstanceError::Unavailable(format!("no control plane for group {group}")))
    }

    async fn request_os_shutdown(&self) -> Result<(), InstanceError> {
        let Some((program, args)) = self.shutdown_command.split_first() else {
            return Err(InstanceError::Failed("empty shutdown command".to_string()));
        };
        tracing::warn!(command = ?self.shutdown_command, "requesting OS shutdown");
        tokio::process::Command::new(program)
            .args(args)
            .spawn()
            .map(|_| ())
            .map_err(|e| InstanceError::Failed(format!("shutdown spawn failed: {e}")))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{InstanceControl, InstanceError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A recorded instance-control invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum InstanceCall {
        Stop { instance_id: String },
        ScaleInProtection { group: String, instance_id: String, enabled: bool },
        GroupSize { group: String, min: Option<u32>, desired: Option<u32>, max: Option<u32> },
        OsShutdown,
    }

    struct FakeState {
        instance_id: Option<String>,
        calls: Vec<InstanceCall>,
        fail_all: bool,
        fail_stop: bool,
    }

    /// Recording fake for instance control.
    #[derive(Clone)]
    pub struct FakeInstanceControl {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeInstanceControl {
        /// Fake with a known instance identity.
        pub fn new(instance_id: &str) -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    instance_id: Some(instance_id.to_string()),
                    calls: Vec::new(),
                    fail_all: false,
                    fail_stop: false,
                })),
            }
        }

        /// Fake with no determinable instance identity.
        pub fn anonymous() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    instance_id: None,
                    calls: Vec::new(),
                    fail_all: false,
                    fail_stop: false,
                })),
            }
        }

        /// Make every control call fail.
        pub fn fail_all(&self, fail: bool) {
            self.inner.lock().fail_all = fail;
        }

        /// Make only stop-instance calls fail.
        pub fn fail_stop(&self, fail: bool) {
            self.inner.lock().fail_stop = fail;
        }

        pub fn calls(&self) -> Vec<InstanceCall> {
            self.inner.lock().calls.clone()
        }

        fn record(&self, call: InstanceCall) -> Result<(), InstanceError> {
            let mut state = self.inner.lock();
            state.calls.push(call);
            if state.fail_all {
                Err(InstanceError::Failed("forced failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl InstanceControl for FakeInstanceControl {
        async fn self_instance_id(&self) -> Option<String> {
            self.inner.lock().instance_id.clone()
        }

        async fn stop_instance(&self, instance_id: &str) -> Result<(), InstanceError> {
            let result = self.record(InstanceCall::Stop { instance_id: instance_id.to_string() });
            if self.inner.lock().fail_stop {
                return Err(InstanceError::Failed("forced stop failure".to_string()));
            }
            result
        }

        async fn set_scale_in_protection(
            &self,
            group: &str,
            instance_id: &str,
            enabled: bool,
        ) -> Result<(), InstanceError> {
            self.record(InstanceCall::ScaleInProtection {
                group: group.to_string(),
                instance_id: instance_id.to_string(),
                enabled,
            })
        }

        async fn set_group_size(
            &self,
            group: &str,
            min: Option<u32>,
            desired: Option<u32>,
            max: Option<u32>,
        ) -> Result<(), InstanceError> {
            self.record(InstanceCall::GroupSize { group: group.to_string(), min, desired, max })
        }

        async fn request_os_shutdown(&self) -> Result<(), InstanceError> {
            self.record(InstanceCall::OsShutdown)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeInstanceControl, InstanceCall};
