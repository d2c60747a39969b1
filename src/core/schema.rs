//! Purpose: Describe the config schema of each resource kind.
//! Exports: `ConfigSchema`, `SchemaMode`.
//! Role: Defaults, required fields, field metadata and value checks for configs.
//! Invariants: `SchemaMode::Base` never enforces required fields.
//! Invariants: Field merge behavior comes from `metas` over the field's metadata items.
use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::{CompareBehavior, MergeBehavior, ShowBehavior, metas};
use crate::core::patterns::compile_insensitive;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConfigSchema {
    Node,
    Model,
    Seed,
    Snapshot,
    Test,
    Source,
    Exposure,
    Metric,
    SemanticModel,
    SavedQuery,
    UnitTest,
    Group,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemaMode {
    Full,
    Base,
}

const SEVERITY_VALUES: &[&str] = &["warn", "error"];

impl ConfigSchema {
    pub fn name(self) -> &'static str {
        match self {
            ConfigSchema::Node => "NodeConfig",
            ConfigSchema::Model => "ModelConfig",
            ConfigSchema::Seed => "SeedConfig",
            ConfigSchema::Snapshot => "SnapshotConfig",
            ConfigSchema::Test => "TestConfig",
            ConfigSchema::Source => "SourceConfig",
            ConfigSchema::Exposure => "ExposureConfig",
            ConfigSchema::Metric => "MetricConfig",
            ConfigSchema::SemanticModel => "SemanticModelConfig",
            ConfigSchema::SavedQuery => "SavedQueryConfig",
            ConfigSchema::UnitTest => "UnitTestConfig",
            ConfigSchema::Group => "GroupConfig",
        }
    }

    pub fn defaults(self) -> Map<String, Value> {
        let value = match self {
            ConfigSchema::Node => node_defaults(),
            ConfigSchema::Model => extend(node_defaults(), json!({"access": "protected"})),
            ConfigSchema::Seed => extend(
                node_defaults(),
                json!({"materialized": "seed", "delimiter": ",", "quote_columns": null}),
            ),
            ConfigSchema::Snapshot => extend(
                node_defaults(),
                json!({
                    "materialized": "snapshot",
                    "strategy": null,
                    "unique_key": null,
                    "target_schema": null,
                    "target_database": null,
                    "updated_at": null,
                    "check_cols": null,
                }),
            ),
            ConfigSchema::Test => extend(
                node_defaults(),
                json!({
                    "materialized": "test",
                    "severity": "ERROR",
                    "store_failures": null,
                    "where": null,
                    "limit": null,
                    "fail_calc": "count(*)",
                    "warn_if": "!= 0",
                    "error_if": "!= 0",
                    "schema": "dbt_test__audit",
                }),
            ),
            ConfigSchema::Source => json!({"enabled": true, "event_time": null}),
            ConfigSchema::Exposure => json!({"enabled": true, "tags": [], "meta": {}}),
            ConfigSchema::Metric | ConfigSchema::SemanticModel => {
                json!({"enabled": true, "group": null, "meta": {}})
            }
            ConfigSchema::SavedQuery => json!({
                "enabled": true,
                "group": null,
                "meta": {},
                "export_as": null,
                "schema": null,
                "cache": {"enabled": false},
            }),
            ConfigSchema::UnitTest => json!({"enabled": true, "tags": [], "meta": {}}),
            ConfigSchema::Group => json!({"meta": {}}),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ConfigSchema::Snapshot => &["strategy", "unique_key"],
            _ => &[],
        }
    }

    pub fn field_metadata(self, field: &str) -> Map<String, Value> {
        match field {
            "tags" => metas(&[
                &ShowBehavior::Hide,
                &MergeBehavior::Append,
                &CompareBehavior::Exclude,
            ]),
            "meta" => metas(&[
                &ShowBehavior::Hide,
                &MergeBehavior::Update,
                &CompareBehavior::Exclude,
            ]),
            "pre-hook" | "post-hook" => metas(&[&MergeBehavior::Append]),
            "grants" | "persist_docs" | "quoting" | "column_types" | "docs" | "contract" => {
                metas(&[&MergeBehavior::Update])
            }
            "cache" if self == ConfigSchema::SavedQuery => metas(&[&MergeBehavior::Update]),
            _ => Map::new(),
        }
    }

    pub fn merge_behavior(self, field: &str) -> MergeBehavior {
        MergeBehavior::from_metadata(&self.field_metadata(field))
    }

    /// Allowed values for a field, as case-insensitive literals.
    pub fn field_pattern(self, field: &str) -> Option<&'static [&'static str]> {
        match (self, field) {
            (ConfigSchema::Test, "severity") => Some(SEVERITY_VALUES),
            _ => None,
        }
    }

    /// Layer `overlay` on top of `base`, field by field.
    pub fn merge(
        self,
        mut base: Map<String, Value>,
        overlay: &Map<String, Value>,
    ) -> Map<String, Value> {
        for (key, value) in overlay {
            let merged = match (self.merge_behavior(key), base.remove(key)) {
                (MergeBehavior::Append, Some(existing)) => append_values(existing, value),
                (MergeBehavior::Update, Some(Value::Object(mut existing))) => {
                    if let Value::Object(update) = value {
                        for (inner_key, inner_value) in update {
                            existing.insert(inner_key.clone(), inner_value.clone());
                        }
                        Value::Object(existing)
                    } else {
                        value.clone()
                    }
                }
                _ => value.clone(),
            };
            base.insert(key.clone(), merged);
        }
        base
    }

    /// Apply defaults under `raw`, then check required fields and patterns.
    pub fn finalize(
        self,
        raw: &Map<String, Value>,
        mode: SchemaMode,
    ) -> Result<Map<String, Value>, Error> {
        let config = self.merge(self.defaults(), raw);

        if mode == SchemaMode::Full {
            let missing = self
                .required_fields()
                .iter()
                .filter(|field| config.get(**field).is_none_or(Value::is_null))
                .copied()
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(Error::new(ErrorKind::Config)
                    .with_message(format!(
                        "{} is missing required field(s): {}",
                        self.name(),
                        missing.join(", ")
                    ))
                    .with_hint(
                        "Set the missing fields, or resolve with --base to skip required checks.",
                    ));
            }
        }

        for (field, value) in &config {
            let Some(allowed) = self.field_pattern(field) else {
                continue;
            };
            let Some(text) = value.as_str() else {
                continue;
            };
            let pattern = compile_insensitive(allowed)?;
            if !pattern.is_match(text) {
                return Err(Error::new(ErrorKind::Config).with_message(format!(
                    "{}.{field} must be one of {} (case-insensitive), got '{text}'",
                    self.name(),
                    allowed.join(", ")
                )));
            }
        }

        tracing::debug!(schema = self.name(), fields = config.len(), "finalized config");
        Ok(config)
    }
}

fn node_defaults() -> Value {
    json!({
        "enabled": true,
        "materialized": "view",
        "tags": [],
        "meta": {},
        "persist_docs": {},
        "quoting": {},
        "column_types": {},
        "full_refresh": null,
        "on_schema_change": "ignore",
        "on_configuration_change": "apply",
        "grants": {},
        "packages": [],
        "docs": {"show": true},
        "contract": {"enforced": false},
        "pre-hook": [],
        "post-hook": [],
    })
}

fn extend(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
        base_map.extend(extra_map);
    }
    base
}

fn append_values(existing: Value, addition: &Value) -> Value {
    let mut items = into_list(existing);
    for item in into_list(addition.clone()) {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigSchema, SchemaMode};
    use crate::core::error::ErrorKind;
    use crate::core::metadata::MergeBehavior;
    use serde_json::{Map, Value, json};

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn model_defaults_extend_node_defaults() {
        let defaults = ConfigSchema::Model.defaults();
        assert_eq!(defaults["materialized"], "view");
        assert_eq!(defaults["access"], "protected");
        assert!(ConfigSchema::Node.defaults().get("access").is_none());
    }

    #[test]
    fn tags_append_and_meta_updates() {
        let schema = ConfigSchema::Model;
        assert_eq!(schema.merge_behavior("tags"), MergeBehavior::Append);
        assert_eq!(schema.merge_behavior("meta"), MergeBehavior::Update);
        assert_eq!(schema.merge_behavior("materialized"), MergeBehavior::Clobber);

        let base = object(json!({
            "tags": ["a"],
            "meta": {"owner": "x", "tier": 1},
            "materialized": "view",
        }));
        let overlay = object(json!({
            "tags": ["b", "a"],
            "meta": {"tier": 2},
            "materialized": "table",
        }));
        let merged = schema.merge(base, &overlay);
        assert_eq!(merged["tags"], json!(["a", "b"]));
        assert_eq!(merged["meta"], json!({"owner": "x", "tier": 2}));
        assert_eq!(merged["materialized"], "table");
    }

    #[test]
    fn string_tag_is_appended_as_list_item() {
        let merged = ConfigSchema::Model.merge(
            object(json!({"tags": "nightly"})),
            &object(json!({"tags": "hourly"})),
        );
        assert_eq!(merged["tags"], json!(["nightly", "hourly"]));
    }

    #[test]
    fn snapshot_requires_strategy_in_full_mode_only() {
        let raw = object(json!({"unique_key": "id"}));
        let err = ConfigSchema::Snapshot
            .finalize(&raw, SchemaMode::Full)
            .expect_err("missing strategy");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().unwrap().contains("strategy"));

        let config = ConfigSchema::Snapshot
            .finalize(&raw, SchemaMode::Base)
            .expect("base mode");
        assert_eq!(config["unique_key"], "id");
        assert_eq!(config["materialized"], "snapshot");
    }

    #[test]
    fn test_severity_is_case_insensitive() {
        let ok = ConfigSchema::Test
            .finalize(&object(json!({"severity": "Warn"})), SchemaMode::Full)
            .expect("warn ok");
        assert_eq!(ok["severity"], "Warn");

        let err = ConfigSchema::Test
            .finalize(&object(json!({"severity": "fatal"})), SchemaMode::Base)
            .expect_err("fatal rejected");
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn default_severity_passes_validation() {
        let config = ConfigSchema::Test
            .finalize(&Map::new(), SchemaMode::Full)
            .expect("defaults valid");
        assert_eq!(config["severity"], "ERROR");
    }
}
