//! Dual-deployment configuration — the core owns selecting which backend URL
//! is active and logs that selection; loading `.env` files or CLI flags into
//! this struct is the embedding application's job. Plain fields, a
//! `Default`, no I/O.
use serde::{Deserialize, Serialize};

/// Which backend an embedding application wants to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Always use `local_url`.
    Local,
    /// Always use `managed_url`.
    Managed,
    /// Prefer `local_url` when set, otherwise fall back to `managed_url`.
    Auto,
}

/// Where to reach the memory engine's backend, and how to choose between a
/// local (self-hosted) and managed deployment when both are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// URL of a locally-run backend, if any.
    pub local_url: Option<String>,
    /// URL of a managed/hosted backend, if any.
    pub managed_url: Option<String>,
    /// Selection strategy.
    pub mode: DeploymentMode,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self { local_url: None, managed_url: None, mode: DeploymentMode::Auto }
    }
}

impl DeploymentConfig {
    /// Resolve the active URL per `mode`, logging the decision. `Auto`
    /// prefers `local_url` whenever it is set, falling back to
    /// `managed_url`.
    pub fn resolve(&self) -> Option<&str> {
        let chosen = match self.mode {
            DeploymentMode::Local => self.local_url.as_deref(),
            DeploymentMode::Managed => self.managed_url.as_deref(),
            DeploymentMode::Auto => self.local_url.as_deref().or(self.managed_url.as_deref()),
        };
        match chosen {
            Some(url) => tracing::info!(mode = ?self.mode, url, "resolved deployment target"),
            None => tracing::warn!(mode = ?self.mode, "no deployment target configured"),
        }
        chosen
    }
}
