//! End-to-end scenario: a caller configures both a local and a managed
//! backend, then drives every `DeploymentMode` to confirm resolution never
//! silently picks the wrong one — the one piece of ambient "which backend am
//! I talking to" bookkeeping this crate owns.
use agent_memory_core::{DeploymentConfig, DeploymentMode};

#[test]
fn local_mode_test_harness_is_isolated_from_managed_url() {
    let config = DeploymentConfig { local_url: Some("http://127.0.0.1:7070".into()), managed_url: Some("https://managed.example.com".into()), mode: DeploymentMode::Local };
    assert_eq!(config.resolve(), Some("http://127.0.0.1:7070"));
}

#[test]
fn managed_mode_test_harness_is_isolated_from_local_url() {
    let config = DeploymentConfig { local_url: Some("http://127.0.0.1:7070".into()), managed_url: Some("https://managed.example.com".into()), mode: DeploymentMode::Managed };
    assert_eq!(config.resolve(), Some("https://managed.example.com"));
}

#[test]
fn auto_mode_prefers_local_but_degrades_gracefully() {
    let both = DeploymentConfig { local_url: Some("http://127.0.0.1:7070".into()), managed_url: Some("https://managed.example.com".into()), mode: DeploymentMode::Auto };
    assert_eq!(both.resolve(), Some("http://127.0.0.1:7070"));

    let managed_only = DeploymentConfig { local_url: None, ..both.clone() };
    assert_eq!(managed_only.resolve(), Some("https://managed.example.com"));

    let neither = DeploymentConfig { local_url: None, managed_url: None, mode: DeploymentMode::Auto };
    assert_eq!(neither.resolve(), None);
}
