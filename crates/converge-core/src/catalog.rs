//! Built-in resource declarations
//!
//! | Kind           | Update mode  | Immutable        | Computed                               | Ordered |
//! |----------------|--------------|------------------|----------------------------------------|---------|
//! | `alert`        | FullReplace  |                  | `created_by`, `created_at`, `updated_at` | no      |
//! | `parsing_rule` | FieldMask    | `rules_group_id` |                                        | no      |
//! | `tco_policy`   | FieldMask    |                  |                                        | by `order` within `source_type` |
//!
//! `tco_policy` state is at schema version 2. Version 0 stored the
//! application and subsystem filters as four boolean flags, version 1
//! stored the archive retention as a flat id.

use crate::codec::{EnumCodec, Vocabulary};
use crate::decode::{DecodeResult, Decoder};
use crate::error::{ReconcileError, Result};
use crate::lifecycle::{Lifecycle, ResourceLifecycle};
use crate::ordering::{OrderReconciler, OrderedLifecycle, ReorderStrategy, SourceType};
use crate::remote::{Fields, RemoteApi};
use crate::retry::RetryConfig;
use crate::schema::{ResourceSchema, UpdateMode};
use crate::status::StatusCode;
use crate::upgrade::{StepError, Upgrader};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

pub const ALERT: &str = "alert";
pub const PARSING_RULE: &str = "parsing_rule";
pub const TCO_POLICY: &str = "tco_policy";

/// Blocks of a TCO policy that filter by name
const FILTER_BLOCKS: [&str; 2] = ["applications", "subsystems"];

/// How a TCO policy filter matches names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Is,
    IsNot,
    StartsWith,
    Includes,
}

impl Vocabulary for RuleType {
    const NAME: &'static str = "rule type";
    // Also the precedence of the version 0 boolean flags
    const VARIANTS: &'static [Self] = &[
        RuleType::Is,
        RuleType::IsNot,
        RuleType::StartsWith,
        RuleType::Includes,
    ];

    fn wire_name(self) -> &'static str {
        match self {
            RuleType::Is => "is",
            RuleType::IsNot => "is_not",
            RuleType::StartsWith => "starts_with",
            RuleType::Includes => "includes",
        }
    }
}

pub fn alert_schema() -> ResourceSchema {
    ResourceSchema::new(ALERT, UpdateMode::FullReplace).with_computed([
        "created_by",
        "created_at",
        "updated_at",
    ])
}

pub fn parsing_rule_schema() -> ResourceSchema {
    ResourceSchema::new(PARSING_RULE, UpdateMode::FieldMask).with_immutable(["rules_group_id"])
}

pub fn tco_policy_schema(rule_types: Arc<EnumCodec<RuleType>>) -> Result<ResourceSchema> {
    let upgrader = Upgrader::builder(0)
        .step(0, move |fields| collapse_rule_flags(&rule_types, fields))
        .step(1, nest_archive_retention)
        .build(TCO_POLICY)?;

    Ok(ResourceSchema::new(TCO_POLICY, UpdateMode::FieldMask)
        .ordered_by("order", "source_type")
        .with_upgrader(upgrader))
}

/// Rule type encoded by the version 0 flags of one filter block.
///
/// The first flag set to `true`, in [`RuleType::VARIANTS`] order, wins. No
/// flag set means `is`. Every flag is checked, so a malformed flag fails even
/// when an earlier one is set.
fn rule_type_from_flags(filter: &Decoder<'_>) -> DecodeResult<RuleType> {
    let mut chosen = None;
    for &rule_type in RuleType::VARIANTS {
        let set = filter.optional_bool(rule_type.wire_name())?.unwrap_or(false);
        if set && chosen.is_none() {
            chosen = Some(rule_type);
        }
    }
    Ok(chosen.unwrap_or(RuleType::Is))
}

/// Version 0 to 1: boolean match flags become a single `rule_type`
fn collapse_rule_flags(
    rule_types: &EnumCodec<RuleType>,
    mut fields: Fields,
) -> std::result::Result<Fields, StepError> {
    for block in FILTER_BLOCKS {
        let rule_type = match Decoder::new(&fields).object(block)? {
            Some(filter) => rule_type_from_flags(&filter)?,
            None => continue,
        };

        if let Some(Value::Object(filter)) = fields.get_mut(block) {
            for flag in RuleType::VARIANTS {
                filter.remove(flag.wire_name());
            }
            filter.insert(
                "rule_type".to_string(),
                Value::String(rule_types.encode(rule_type).to_string()),
            );
        }
    }
    Ok(fields)
}

/// Version 1 to 2: `archive_retention_id` moves under `archive_retention.id`
fn nest_archive_retention(mut fields: Fields) -> std::result::Result<Fields, StepError> {
    let id = Decoder::new(&fields)
        .optional_str("archive_retention_id")?
        .map(str::to_string);
    fields.remove("archive_retention_id");

    if let Some(id) = id {
        fields.insert("archive_retention".to_string(), json!({ "id": id }));
    }
    Ok(fields)
}

/// Codecs and schemas shared by every lifecycle in a process
#[derive(Debug, Clone)]
pub struct Catalog {
    status_codes: Arc<EnumCodec<StatusCode>>,
    source_types: Arc<EnumCodec<SourceType>>,
    rule_types: Arc<EnumCodec<RuleType>>,
    schemas: HashMap<String, Arc<ResourceSchema>>,
}

impl Catalog {
    pub fn new() -> Result<Self> {
        let rule_types = Arc::new(EnumCodec::new()?);

        let schemas = [
            alert_schema(),
            parsing_rule_schema(),
            tco_policy_schema(Arc::clone(&rule_types))?,
        ]
        .into_iter()
        .map(|schema| (schema.kind().to_string(), Arc::new(schema)))
        .collect();

        Ok(Self {
            status_codes: Arc::new(EnumCodec::new()?),
            source_types: Arc::new(EnumCodec::new()?),
            rule_types,
            schemas,
        })
    }

    pub fn status_codes(&self) -> &Arc<EnumCodec<StatusCode>> {
        &self.status_codes
    }

    pub fn source_types(&self) -> &Arc<EnumCodec<SourceType>> {
        &self.source_types
    }

    pub fn rule_types(&self) -> &Arc<EnumCodec<RuleType>> {
        &self.rule_types
    }

    pub fn schema(&self, kind: &str) -> Option<&Arc<ResourceSchema>> {
        self.schemas.get(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Lifecycle manager for `kind`. Ordered kinds get an
    /// [`OrderedLifecycle`] using `strategy`.
    pub fn lifecycle(
        &self,
        kind: &str,
        remote: Arc<dyn RemoteApi>,
        retry: RetryConfig,
        strategy: ReorderStrategy,
    ) -> Result<Box<dyn Lifecycle>> {
        let schema = self
            .schema(kind)
            .cloned()
            .ok_or_else(|| ReconcileError::InvalidSchema {
                kind: kind.to_string(),
                message: "unknown resource kind".to_string(),
            })?;

        let ordered = schema.ordering().is_some();
        let inner = ResourceLifecycle::new(Arc::clone(&remote), schema, retry.clone());
        if !ordered {
            return Ok(Box::new(inner));
        }

        let reconciler = OrderReconciler::new(remote, retry).with_strategy(strategy);
        Ok(Box::new(OrderedLifecycle::new(
            inner,
            reconciler,
            Arc::clone(&self.source_types),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRemote;

    fn upgrade(version: u32, raw: Value) -> Result<Value> {
        let schema = tco_policy_schema(Arc::new(EnumCodec::new().unwrap())).unwrap();
        schema.upgrade_fields(version, raw).map(Value::Object)
    }

    #[test]
    fn test_current_version() {
        let catalog = Catalog::new().unwrap();
        assert_eq!(catalog.schema(TCO_POLICY).unwrap().version(), 2);
        assert_eq!(catalog.schema(ALERT).unwrap().version(), 0);
        assert_eq!(catalog.kinds(), vec![ALERT, PARSING_RULE, TCO_POLICY]);
    }

    #[test]
    fn test_first_true_flag_wins() {
        let upgraded = upgrade(
            0,
            json!({
                "name": "p",
                "applications": {"names": ["web"], "is": false, "is_not": true, "starts_with": true},
            }),
        )
        .unwrap();
        assert_eq!(
            upgraded,
            json!({
                "name": "p",
                "applications": {"names": ["web"], "rule_type": "is_not"},
            })
        );
    }

    #[test]
    fn test_no_true_flag_means_is() {
        let upgraded = upgrade(
            0,
            json!({"subsystems": {"names": ["db"], "includes": false}}),
        )
        .unwrap();
        assert_eq!(
            upgraded,
            json!({"subsystems": {"names": ["db"], "rule_type": "is"}})
        );
    }

    #[test]
    fn test_absent_blocks_stay_absent() {
        let upgraded = upgrade(0, json!({"name": "p", "priority": "high"})).unwrap();
        assert_eq!(upgraded, json!({"name": "p", "priority": "high"}));
    }

    #[test]
    fn test_non_boolean_flag_fails() {
        let err = upgrade(
            0,
            json!({"applications": {"is": true, "includes": "yes"}}),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Upgrade { from: 0, .. }));
        assert!(err.to_string().contains("applications.includes: expected a boolean"));
    }

    #[test]
    fn test_archive_retention_nested() {
        let upgraded = upgrade(1, json!({"archive_retention_id": "r-1"})).unwrap();
        assert_eq!(upgraded, json!({"archive_retention": {"id": "r-1"}}));

        let upgraded = upgrade(1, json!({"archive_retention_id": null})).unwrap();
        assert_eq!(upgraded, json!({}));
    }

    #[test]
    fn test_full_chain() {
        let upgraded = upgrade(
            0,
            json!({
                "applications": {"names": ["a"], "starts_with": true},
                "subsystems": {"names": ["b"], "includes": true},
                "archive_retention_id": "r-2",
            }),
        )
        .unwrap();
        assert_eq!(
            upgraded,
            json!({
                "applications": {"names": ["a"], "rule_type": "starts_with"},
                "subsystems": {"names": ["b"], "rule_type": "includes"},
                "archive_retention": {"id": "r-2"},
            })
        );
    }

    #[test]
    fn test_unknown_kind_has_no_lifecycle() {
        let catalog = Catalog::new().unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        let err = catalog
            .lifecycle("dashboard", remote, RetryConfig::none(), ReorderStrategy::Swap)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Invalid schema for dashboard: unknown resource kind"
        );
    }
}
