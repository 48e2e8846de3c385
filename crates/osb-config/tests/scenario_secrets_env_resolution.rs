//! Resolution of the three ambient environment variables (everything except
//! `POLLER_ENCRYPTION_KEY`, which the credential-at-rest adapter reads
//! itself): defaults apply when unset, explicit values override them, and
//! the webhook default is redacted wherever it is displayed.

use osb_config::secrets::{resolve_from, DEFAULT_DB_PATH, DEFAULT_LOG_LEVEL};

#[test]
fn all_defaults_apply_when_nothing_is_set() {
    let resolved = resolve_from(None, None, None);
    assert_eq!(resolved.db_path, DEFAULT_DB_PATH);
    assert_eq!(resolved.log_level, DEFAULT_LOG_LEVEL);
    assert!(resolved.default_webhook_url.is_none());
}

#[test]
fn explicit_db_path_and_log_level_override_defaults() {
    let resolved = resolve_from(
        Some("/srv/poller/data.db".to_string()),
        Some("warn".to_string()),
        None,
    );
    assert_eq!(resolved.db_path, "/srv/poller/data.db");
    assert_eq!(resolved.log_level, "warn");
}

#[test]
fn default_webhook_url_is_optional_and_redacted() {
    let resolved = resolve_from(
        None,
        None,
        Some("https://hooks.example.com/default-sink".to_string()),
    );
    assert_eq!(
        resolved.default_webhook_url.as_deref(),
        Some("https://hooks.example.com/default-sink")
    );

    let debug_str = format!("{resolved:?}");
    assert!(
        !debug_str.contains("hooks.example.com"),
        "Debug must not expose the webhook URL, got: {debug_str}"
    );
    assert!(debug_str.contains("REDACTED"));
}

#[test]
fn blank_env_values_fall_back_to_defaults() {
    let resolved = resolve_from(Some("   ".to_string()), Some(String::new()), Some("".to_string()));
    assert_eq!(resolved.db_path, DEFAULT_DB_PATH);
    assert_eq!(resolved.log_level, DEFAULT_LOG_LEVEL);
    assert!(resolved.default_webhook_url.is_none());
}
