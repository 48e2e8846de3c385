use osb_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

/// Validates the unused-key lint applied to the layered config document:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys that are known to be consumed in a mode are not flagged.
/// 4) Exact-leaf consumption does NOT accidentally consume sibling keys.
/// 5) Deterministic ordering of unused pointers.
///
/// The consumed-pointer registry in `consumption.rs` must reflect what the
/// daemon and CLI actually read today.

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
service:
  name: "order-sync-bridge"

log:
  level: "info"

unused_section:
  foo: 123
  bar: 456
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(
        ConfigMode::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert!(!report.is_clean(), "report should detect unused keys");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/foo".to_string()),
        "missing unused pointer for foo"
    );

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/bar".to_string()),
        "missing unused pointer for bar"
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
service:
  name: "order-sync-bridge"

log:
  level: "info"

unused_section:
  foo: 1
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let result = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail);

    assert!(
        result.is_err(),
        "fail policy must error when unused keys exist"
    );

    let msg = format!("{:?}", result.err().unwrap());
    assert!(
        msg.contains("CONFIG_UNUSED_KEYS"),
        "error message should contain CONFIG_UNUSED_KEYS"
    );
}

#[test]
fn only_consumed_keys_are_clean_in_daemon_mode() {
    // A config containing ONLY keys that are currently consumed in Daemon mode.
    let yaml = r#"
service:
  name: "order-sync-bridge"
  bind_addr: "0.0.0.0:8080"

log:
  level: "info"

retry:
  default_max_attempts: 5
  backoff_base_secs: 30
  backoff_cap_secs: 600

ledger:
  limit: 30

scheduler:
  supervisor_backoff_base_secs: 30
  supervisor_backoff_cap_secs: 300

webhook:
  default_timeout_secs: 30

upstream:
  default_timeout_secs: 30
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(
        ConfigMode::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert!(
        report.is_clean(),
        "config should be clean when it only uses consumed keys, got: {:?}",
        report.unused_leaf_pointers
    );
}

#[test]
fn exact_leaf_consumption_does_not_consume_sibling_keys() {
    // Daemon consumes /retry/default_max_attempts.
    // It must NOT treat /retry/default_max_attempts_extra as consumed.
    let yaml = r#"
service:
  name: "order-sync-bridge"

retry:
  default_max_attempts: 5
  default_max_attempts_extra: 999
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(
        ConfigMode::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/retry/default_max_attempts_extra".to_string()),
        "sibling key must remain unused"
    );
}

#[test]
fn cli_mode_flags_keys_only_the_daemon_consumes() {
    let yaml = r#"
service:
  name: "order-sync-bridge"

log:
  level: "info"

retry:
  default_max_attempts: 5
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/retry/default_max_attempts".to_string()),
        "CLI mode should not consider retry settings consumed"
    );
}

#[test]
fn deterministic_unused_pointer_ordering() {
    let yaml = r#"
service:
  name: "order-sync-bridge"

log:
  level: "info"

unused:
  b: 2
  a: 1
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(
        ConfigMode::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/unused/a".to_string(), "/unused/b".to_string()],
        "unused pointers must be sorted deterministically"
    );
}
