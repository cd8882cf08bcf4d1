// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived credential source seam.
//!
//! Resolution walks a fallback chain:
//!
//! ```text
//! 1. LANDFORM_CREDENTIALS env var (inline JSON object)
//! 2. ~/.landform/credentials.json
//! ```
//!
//! The bundle is opaque to the chassis; only the credential manager reads
//! it, and only to hand it to the queue-client factory on rotation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from credential loading.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials available")]
    NotFound,
    #[error("credential source unreadable: {0}")]
    Unreadable(String),
}

/// An opaque token bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn from_json(raw: &str) -> Result<Self, CredentialError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| CredentialError::Unreadable(format!("not JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| CredentialError::Unreadable("not a JSON object".to_string()))?;
        let values = object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        Ok(Self { values })
    }
}

/// Adapter that produces a fresh credential bundle on demand.
#[async_trait]
pub trait CredentialSource: Clone + Send + Sync + 'static {
    async fn load(&self) -> Result<Credentials, CredentialError>;
}

/// Environment-first credential source (env var, then dotfile).
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    fn credentials_path() -> Option<PathBuf> {
        std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".landform/credentials.json"))
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn load(&self) -> Result<Credentials, CredentialError> {
        if let Ok(raw) = std::env::var("LANDFORM_CREDENTIALS") {
            if !raw.is_empty() {
                return Credentials::from_json(&raw);
            }
        }
        let path = Self::credentials_path().ok_or(CredentialError::NotFound)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Credentials::from_json(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CredentialError::NotFound),
            Err(e) => Err(CredentialError::Unreadable(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{CredentialError, CredentialSource, Credentials};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeState {
        loads: u32,
        fail: bool,
    }

    /// Counting fake credential source; each load yields a distinct token.
    #[derive(Clone)]
    pub struct FakeCredentialSource {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeCredentialSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakeCredentialSource {
        pub fn new() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeState { loads: 0, fail: false })) }
        }

        pub fn fail_next(&self, fail: bool) {
            self.inner.lock().fail = fail;
        }

        pub fn load_count(&self) -> u32 {
            self.inner.lock().loads
        }
    }

    #[async_trait]
    impl CredentialSource for FakeCredentialSource {
        async fn load(&self) -> Result<Credentials, CredentialError> {
            let mut state = self.inner.lock();
            if state.fail {
                return Err(CredentialError::NotFound);
            }
            state.loads += 1;
            let mut values = HashMap::new();
            values.insert("token".to_string(), format!("fake-token-{}", state.loads));
            Ok(Credentials::new(values))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCredentialSource;

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
