//! Provisioning notifications
//!
//! When a client asks for a joinable match and none exists, the registry
//! tells an external allocator to start one. The notification is
//! fire-and-forget: it returns nothing and its failures are the
//! implementation's to log.

use std::sync::Mutex;

use async_trait::async_trait;

/// Receives "this namespace needs a new match" signals
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn request_match(&self, namespace: &str);

    fn name(&self) -> &'static str;
}

/// Drops every request
#[derive(Debug, Default, Clone)]
pub struct NoopProvisioner;

impl NoopProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn request_match(&self, namespace: &str) {
        tracing::debug!(namespace, "no provisioner configured, dropping match request");
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Remembers requested namespaces, in order
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    requests: Mutex<Vec<String>>,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn request_match(&self, namespace: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(namespace.to_string());
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
