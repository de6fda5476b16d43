//! Serialization envelope and schema migrations
//!
//! Bundles are persisted as `{schema_version, bundle}` JSON envelopes.
//! Deserializing a newer or unmigratable version is a `SchemaMismatch`,
//! never a best-effort guess. Upgrades walk an ordered registry of
//! single-step migrations.

use crate::error::{TalosError, TalosResult};
use crate::model::bundle::TaskContextBundle;
use serde_json::{json, Value};

/// Current bundle schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Serialize a bundle into the versioned envelope
pub fn serialize_bundle(bundle: &TaskContextBundle) -> TalosResult<String> {
    let envelope = json!({
        "schema_version": SCHEMA_VERSION,
        // Token duplicated at the top level so the atomic-write layer
        // can check it without knowing the bundle schema
        "version_token": bundle.version_token,
        "bundle": bundle,
    });
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Deserialize a bundle, migrating older versions in memory.
///
/// Returns the bundle and the version it was stored at, so callers can
/// decide whether to persist the upgraded form.
pub fn deserialize_bundle(text: &str) -> TalosResult<(TaskContextBundle, u32)> {
    let value: Value = serde_json::from_str(text)?;

    let stored_version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or(TalosError::SchemaMismatch {
            found: 0,
            expected: SCHEMA_VERSION,
        })? as u32;

    let migrated = MigrationRegistry::standard()?.migrate_value(value, stored_version)?;

    let bundle_value = migrated
        .get("bundle")
        .cloned()
        .ok_or(TalosError::SchemaMismatch {
            found: stored_version,
            expected: SCHEMA_VERSION,
        })?;

    let bundle: TaskContextBundle = serde_json::from_value(bundle_value)?;
    Ok((bundle, stored_version))
}

type MigrationFn = fn(Value) -> TalosResult<Value>;

/// One registered upgrade step
struct Migration {
    from: u32,
    to: u32,
    apply: MigrationFn,
}

/// Ordered registry of schema upgrade steps.
///
/// Validated at construction: steps must form a contiguous chain ending
/// at `SCHEMA_VERSION` with no duplicates.
pub struct MigrationRegistry {
    steps: Vec<Migration>,
}

impl MigrationRegistry {
    /// The registry with all known migrations
    pub fn standard() -> TalosResult<Self> {
        Self::from_steps(vec![Migration {
            from: 1,
            to: 2,
            apply: migrate_v1_to_v2,
        }])
    }

    fn from_steps(steps: Vec<Migration>) -> TalosResult<Self> {
        let registry = Self { steps };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> TalosResult<()> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.to != step.from + 1 {
                return Err(TalosError::MigrationRegistryInvalid(format!(
                    "step {} -> {} is not a single increment",
                    step.from, step.to
                )));
            }
            if !seen.insert(step.from) {
                return Err(TalosError::MigrationRegistryInvalid(format!(
                    "duplicate migration from version {}",
                    step.from
                )));
            }
        }
        // Every version between the oldest supported and current must
        // have a step
        if let Some(oldest) = self.steps.iter().map(|s| s.from).min() {
            for v in oldest..SCHEMA_VERSION {
                if !seen.contains(&v) {
                    return Err(TalosError::MigrationRegistryInvalid(format!(
                        "missing migration from version {v}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply registered steps in sequence until `SCHEMA_VERSION`
    pub fn migrate_value(&self, mut value: Value, stored_version: u32) -> TalosResult<Value> {
        if stored_version == SCHEMA_VERSION {
            return Ok(value);
        }
        if stored_version > SCHEMA_VERSION || stored_version == 0 {
            return Err(TalosError::SchemaMismatch {
                found: stored_version,
                expected: SCHEMA_VERSION,
            });
        }

        let mut current = stored_version;
        while current < SCHEMA_VERSION {
            let step = self
                .steps
                .iter()
                .find(|s| s.from == current)
                .ok_or(TalosError::SchemaMismatch {
                    found: stored_version,
                    expected: SCHEMA_VERSION,
                })?;
            value = (step.apply)(value)?;
            current = step.to;
        }

        if let Some(obj) = value.as_object_mut() {
            obj.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
        }
        Ok(value)
    }
}

/// v1 bundles lacked `version_token`, and QA results had neither
/// `status` nor `duration_ms`. The token defaults to 0, the value the
/// conflict-checked writer reads from a document without the field, so
/// the first persist after migration is accepted. The QA status is
/// inferred from the exit code.
fn migrate_v1_to_v2(mut value: Value) -> TalosResult<Value> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| TalosError::Internal("envelope is not an object".to_string()))?;

    obj.entry("version_token").or_insert(json!(0));

    if let Some(bundle) = obj.get_mut("bundle").and_then(Value::as_object_mut) {
        bundle.entry("version_token").or_insert(json!(0));

        if let Some(results) = bundle.get_mut("qa_results").and_then(Value::as_array_mut) {
            for result in results {
                if let Some(r) = result.as_object_mut() {
                    r.entry("duration_ms").or_insert(json!(0));
                    if !r.contains_key("status") {
                        let pass = r
                            .get("exit_code")
                            .and_then(Value::as_i64)
                            .is_some_and(|c| c == 0);
                        r.insert(
                            "status".to_string(),
                            json!(if pass { "pass" } else { "fail" }),
                        );
                    }
                }
            }
        }
    }

    Ok(value)
}
