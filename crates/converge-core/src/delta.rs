//! Field-level differences between observed and desired state

use crate::remote::{Fields, UpdatePayload};
use crate::schema::{ResourceSchema, UpdateMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Change to a single top-level field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum FieldChange {
    Added { value: Value },
    Changed { from: Value, to: Value },
    Removed { previous: Value },
}

/// Set of field changes needed to go from observed to desired
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    changes: BTreeMap<String, FieldChange>,
}

impl Delta {
    /// Compare `desired` against `observed`.
    ///
    /// Only fields named in `desired` are managed: a field the declaration
    /// does not mention is left alone, while an explicit `null` removes it.
    /// Fields the schema does not diff (id, computed, order) are skipped.
    pub fn between(observed: &Fields, desired: &Fields, schema: &ResourceSchema) -> Self {
        let mut changes = BTreeMap::new();

        for (name, wanted) in desired {
            if !schema.is_diffable(name) {
                continue;
            }

            let current = observed.get(name).filter(|v| !v.is_null());
            let change = match (current, wanted) {
                (None, Value::Null) => None,
                (None, value) => Some(FieldChange::Added {
                    value: value.clone(),
                }),
                (Some(previous), Value::Null) => Some(FieldChange::Removed {
                    previous: previous.clone(),
                }),
                (Some(previous), value) if previous != value => Some(FieldChange::Changed {
                    from: previous.clone(),
                    to: value.clone(),
                }),
                (Some(_), _) => None,
            };

            if let Some(change) = change {
                changes.insert(name.clone(), change);
            }
        }

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// Names of all changed fields, sorted
    pub fn touched(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    /// Changed fields the schema declares immutable
    pub fn immutable_violations(&self, schema: &ResourceSchema) -> Vec<String> {
        self.changes
            .keys()
            .filter(|name| schema.is_immutable(name))
            .cloned()
            .collect()
    }

    /// Update request for this delta, shaped by the kind's update mode
    pub fn payload(&self, desired: &Fields, schema: &ResourceSchema) -> UpdatePayload {
        match schema.update_mode() {
            UpdateMode::FullReplace => UpdatePayload::Replace {
                fields: request_fields(desired, schema),
            },
            UpdateMode::FieldMask => {
                let fields = self
                    .changes
                    .iter()
                    .filter_map(|(name, change)| match change {
                        FieldChange::Added { value } | FieldChange::Changed { to: value, .. } => {
                            Some((name.clone(), value.clone()))
                        }
                        FieldChange::Removed { .. } => None,
                    })
                    .collect();
                UpdatePayload::Patch {
                    fields,
                    mask: self.touched(),
                }
            }
        }
    }
}

/// Declared fields as sent to the remote side: no nulls, nothing the schema
/// leaves to the server or to the collection reconciler
pub fn request_fields(desired: &Fields, schema: &ResourceSchema) -> Fields {
    desired
        .iter()
        .filter(|(name, value)| !value.is_null() && schema.is_diffable(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
