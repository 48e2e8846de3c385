pub mod consumption;
pub mod secrets;

pub use consumption::ConfigMode;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut layers = Vec::with_capacity(paths.len());
    for p in paths {
        layers.push(fs::read_to_string(p).with_context(|| format!("read config: {p}"))?);
    }
    let refs: Vec<&str> = layers.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but takes already-loaded YAML documents
/// instead of file paths — used by deployments that assemble an overlay from
/// an env var or a secrets manager, and by tests.
pub fn load_layered_yaml_from_strings(layers: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in layers.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    reject_embedded_secrets(&merged, "")?;

    // Canonicalize (stable key order) by sorting all object keys recursively,
    // so the hash is stable regardless of source key ordering.
    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Config YAML must carry credential *names* (env var names, references),
/// never literal credential values — connections.api_key et al. live
/// encrypted in the Store, not in a deployment YAML file that ends up in
/// version control. Walks every leaf string in the merged document and
/// rejects anything that looks like a literal secret.
fn reject_embedded_secrets(v: &Value, pointer: &str) -> Result<()> {
    match v {
        Value::Object(map) => {
            for (k, val) in map {
                reject_embedded_secrets(val, &format!("{pointer}/{k}"))?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter().enumerate() {
                reject_embedded_secrets(val, &format!("{pointer}/{i}"))?;
            }
            Ok(())
        }
        Value::String(s) => {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED: literal secret-like value at {pointer}");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Heuristic: recognizable prefixes/markers used by common credential
/// formats. Not exhaustive — this is a deployment-time lint, not a DLP
/// system, and deliberately errs toward false positives over false
/// negatives for well-known shapes (PEM blocks, AWS/Stripe/OpenAI/GitHub/
/// Slack token prefixes).
fn looks_like_secret(s: &str) -> bool {
    const PREFIXES: &[&str] = &["sk-", "AKIA", "ghp_", "xox"];
    if PREFIXES.iter().any(|p| s.starts_with(p)) {
        return true;
    }
    s.contains("-----BEGIN")
}

/// Which part of the system is loading the config — governs which YAML
/// pointers are expected to be consumed (see the consumption registry) and how
/// strictly unused keys are treated.
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Diff the config's leaf pointers against the set this `mode` is known to
/// consume. Under [`UnusedKeyPolicy::Warn`] the report is returned either
/// way; under [`UnusedKeyPolicy::Fail`] a non-empty report is an error, so a
/// production boot can refuse to start on a YAML typo or stale section.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed = consumption::consumed_pointers(mode);
    let mut unused: Vec<String> = collect_leaf_pointers(config_json, "")
        .into_iter()
        .filter(|leaf| !is_consumed(leaf, consumed))
        .collect();
    unused.sort();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if matches!(policy, UnusedKeyPolicy::Fail) && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config key(s) not consumed in this mode: {}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.join(", ")
        );
    }
    Ok(report)
}

fn is_consumed(leaf: &str, consumed: &[&str]) -> bool {
    consumed
        .iter()
        .any(|c| leaf == *c || leaf.starts_with(&format!("{c}/")))
}

fn collect_leaf_pointers(v: &Value, pointer: &str) -> Vec<String> {
    match v {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .flat_map(|(k, val)| collect_leaf_pointers(val, &format!("{pointer}/{k}")))
            .collect(),
        Value::Array(arr) if !arr.is_empty() => arr
            .iter()
            .enumerate()
            .flat_map(|(i, val)| collect_leaf_pointers(val, &format!("{pointer}/{i}")))
            .collect(),
        _ => vec![pointer.to_string()],
    }
}
