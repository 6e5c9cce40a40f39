//! Per-kind resource declarations
//!
//! A [`ResourceSchema`] states everything the lifecycle needs to know about a
//! kind without knowing its fields in detail: how updates are sent, which
//! fields force a new object, which fields the server fills in, whether the
//! kind lives in an ordered collection, and how old state is upgraded.

use crate::error::{ReconcileError, Result};
use crate::object::ObservedState;
use crate::remote::Fields;
use crate::upgrade::Upgrader;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// How the remote API accepts updates for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// The whole object is replaced on every update
    FullReplace,
    /// Only the fields named in a mask are changed
    FieldMask,
}

/// Fields that place an object in an ordered collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingFields {
    pub order_field: String,
    pub source_type_field: String,
}

#[derive(Debug)]
pub struct ResourceSchema {
    kind: String,
    update_mode: UpdateMode,
    immutable: BTreeSet<String>,
    computed: BTreeSet<String>,
    ordering: Option<OrderingFields>,
    upgrader: Upgrader,
}

impl ResourceSchema {
    pub fn new(kind: impl Into<String>, update_mode: UpdateMode) -> Self {
        Self {
            kind: kind.into(),
            update_mode,
            immutable: BTreeSet::new(),
            computed: BTreeSet::new(),
            ordering: None,
            upgrader: Upgrader::default(),
        }
    }

    /// Fields that cannot change after creation
    pub fn with_immutable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Fields set by the server, never diffed against the declaration
    pub fn with_computed<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.computed.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn ordered_by(
        mut self,
        order_field: impl Into<String>,
        source_type_field: impl Into<String>,
    ) -> Self {
        self.ordering = Some(OrderingFields {
            order_field: order_field.into(),
            source_type_field: source_type_field.into(),
        });
        self
    }

    pub fn with_upgrader(mut self, upgrader: Upgrader) -> Self {
        self.upgrader = upgrader;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    pub fn version(&self) -> u32 {
        self.upgrader.current_version()
    }

    pub fn ordering(&self) -> Option<&OrderingFields> {
        self.ordering.as_ref()
    }

    pub fn is_immutable(&self, field: &str) -> bool {
        self.immutable.contains(field)
    }

    pub fn is_computed(&self, field: &str) -> bool {
        self.computed.contains(field)
    }

    /// Whether a field takes part in drift detection and update payloads.
    /// The id, computed fields and the order field (owned by the collection
    /// reconciler) do not.
    pub fn is_diffable(&self, field: &str) -> bool {
        field != "id"
            && !self.is_computed(field)
            && self
                .ordering
                .as_ref()
                .is_none_or(|o| o.order_field != field)
    }

    pub fn upgrade_fields(&self, version: u32, raw: Value) -> Result<Fields> {
        self.upgrader.upgrade(&self.kind, version, raw)
    }

    /// Load a persisted observed-state record, upgrading it to the current
    /// schema version. Records written before versioning count as version 0.
    pub fn load_state(&self, raw: Value) -> Result<ObservedState> {
        let mut record = match raw {
            Value::Object(record) => record,
            other => {
                return Err(ReconcileError::Upgrade {
                    kind: self.kind.clone(),
                    from: 0,
                    message: format!("stored record must be an object, found {other}"),
                });
            }
        };

        let version = match record.get("schema_version") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| ReconcileError::Upgrade {
                    kind: self.kind.clone(),
                    from: 0,
                    message: format!("invalid schema_version {v}"),
                })?,
        };

        let id = match record.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(ReconcileError::Upgrade {
                    kind: self.kind.clone(),
                    from: version,
                    message: "stored record has no id".to_string(),
                });
            }
        };

        let raw_fields = record.remove("fields").unwrap_or(Value::Object(Fields::new()));
        let fields = self.upgrade_fields(version, raw_fields)?;

        let observed_at = record
            .get("observed_at")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(Utc::now);

        Ok(ObservedState {
            id,
            kind: self.kind.clone(),
            schema_version: self.version(),
            fields,
            observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::StepError;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        let upgrader = Upgrader::builder(0)
            .step(0, |mut fields: Fields| {
                let name = fields.remove("title").ok_or_else(|| {
                    StepError::Invalid("title is missing".to_string())
                })?;
                fields.insert("name".to_string(), name);
                Ok(fields)
            })
            .build("widget")
            .unwrap();

        ResourceSchema::new("widget", UpdateMode::FieldMask)
            .with_immutable(["group_id"])
            .with_computed(["created_by"])
            .ordered_by("order", "source_type")
            .with_upgrader(upgrader)
    }

    #[test]
    fn test_diffable_fields() {
        let s = schema();
        assert!(s.is_diffable("name"));
        assert!(s.is_diffable("group_id"));
        assert!(!s.is_diffable("id"));
        assert!(!s.is_diffable("created_by"));
        assert!(!s.is_diffable("order"));
        assert!(s.is_diffable("source_type"));
    }

    #[test]
    fn test_load_unversioned_record() {
        let state = schema()
            .load_state(json!({"id": "w-1", "fields": {"title": "first"}}))
            .unwrap();
        assert_eq!(state.id, "w-1");
        assert_eq!(state.schema_version, 1);
        assert_eq!(state.fields.get("name"), Some(&json!("first")));
    }

    #[test]
    fn test_load_current_record() {
        let state = schema()
            .load_state(json!({
                "id": "w-1",
                "schema_version": 1,
                "observed_at": "2024-05-01T00:00:00Z",
                "fields": {"name": "first"}
            }))
            .unwrap();
        assert_eq!(state.fields.get("name"), Some(&json!("first")));
        assert_eq!(state.observed_at.to_rfc3339(), "2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn test_load_without_id_fails() {
        let err = schema().load_state(json!({"fields": {}})).unwrap_err();
        assert!(err.to_string().contains("no id"));
    }

    #[test]
    fn test_load_with_failing_step_fails() {
        let err = schema()
            .load_state(json!({"id": "w-1", "schema_version": 0, "fields": {}}))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Upgrade { from: 0, .. }));
    }
}
