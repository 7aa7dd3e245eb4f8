//! ActionID generation

use crate::constants::FALLBACK_HOSTNAME;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Produces `<host>-<n>` correlation IDs, `n` counting up from 1.
///
/// Safe to share between tasks; every call returns a distinct value for the
/// lifetime of the generator.
#[derive(Debug)]
pub struct ActionIdGenerator {
    host: String,
    counter: AtomicU64,
}

impl ActionIdGenerator {
    /// Generator prefixed with the local hostname.
    pub fn new() -> Self {
        Self::with_host(local_hostname())
    }

    /// Generator with an explicit prefix.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            counter: AtomicU64::new(1),
        }
    }

    /// Prefix used for every ID.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next ID.
    pub fn generate(&self) -> String {
        let n = self
            .counter
            .fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.host, n)
    }
}

impl Default for ActionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Local hostname, or [`FALLBACK_HOSTNAME`] when it cannot be read.
pub(crate) fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name
            .to_string_lossy()
            .into_owned(),
        Err(e) => {
            debug!("hostname lookup failed ({}), using {}", e, FALLBACK_HOSTNAME);
            FALLBACK_HOSTNAME.to_string()
        }
    }
}
