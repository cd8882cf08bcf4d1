// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host memory and process probes for the watchdog.

use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, RefreshKind, System};
use thiserror::Error;

/// Errors from host operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("restart spawn failed: {0}")]
    RestartFailed(String),
}

/// Probes for system memory and auxiliary-process liveness.
pub trait HostMonitor: Clone + Send + Sync + 'static {
    fn total_memory_bytes(&self) -> u64;

    /// Memory currently available to new allocations.
    fn free_memory_bytes(&self) -> u64;

    fn process_running(&self, name: &str) -> bool;

    /// Launch the restart command for a dead auxiliary process. The command
    /// runs detached through the shell; liveness is re-checked on later
    /// watchdog samples rather than awaited here.
    fn restart_process(&self, command: &str) -> Result<(), HostError>;
}

/// Real host monitor backed by the `sysinfo` crate.
#[derive(Clone)]
pub struct SysinfoMonitor {
    system: Arc<Mutex<System>>,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_memory(MemoryRefreshKind::everything())
                .with_processes(ProcessRefreshKind::new()),
        );
        Self { system: Arc::new(Mutex::new(system)) }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMonitor for SysinfoMonitor {
    fn total_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.total_memory()
    }

    fn free_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }

    fn process_running(&self, name: &str) -> bool {
        let mut system = self.system.lock();
        system.refresh_processes();
        let found = system.processes_by_name(name).next().is_some();
        found
    }

    fn restart_process(&self, command: &str) -> Result<(), HostError> {
        tracing::info!(%command, "launching auxiliary-process restart");
        std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .spawn()
            .map(|_| ())
            .map_err(|e| HostError::RestartFailed(e.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{HostError, HostMonitor};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct FakeState {
        total: u64,
        free: u64,
        running: HashSet<String>,
        restarts: Vec<String>,
    }

    /// Host monitor with settable readings.
    #[derive(Clone)]
    pub struct FakeHostMonitor {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeHostMonitor {
        pub fn new(total: u64, free: u64) -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    total,
                    free,
                    running: HashSet::new(),
                    restarts: Vec::new(),
                })),
            }
        }

        pub fn set_free(&self, free: u64) {
            self.inner.lock().free = free;
        }

        pub fn set_process_running(&self, name: &str, running: bool) {
            let mut state = self.inner.lock();
            if running {
                state.running.insert(name.to_string());
            } else {
                state.running.remove(name);
            }
        }

        pub fn restarts(&self) -> Vec<String> {
            self.inner.lock().restarts.clone()
        }
    }

    impl HostMonitor for FakeHostMonitor {
        fn total_memory_bytes(&self) -> u64 {
            self.inner.lock().total
        }

        fn free_memory_bytes(&self) -> u64 {
            self.inner.lock().free
        }

        fn process_running(&self, name: &str) -> bool {
            self.inner.lock().running.contains(name)
        }

        fn restart_process(&self, command: &str) -> Result<(), HostError> {
            self.inner.lock().restarts.push(command.to_string());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHostMonitor;

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
