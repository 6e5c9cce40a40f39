use converge_core::catalog::{self, Catalog};
use converge_core::schema::OrderingFields;
use converge_core::testing::InMemoryRemote;
use converge_core::{Fields, Lifecycle, ReorderStrategy, RetryConfig};
use serde_json::{Value, json};
use std::sync::Arc;

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("test fixture must be an object"),
    }
}

/// Control plane with the catalog kinds registered the way the real one
/// behaves: alerts get server-side audit fields, TCO policies are ordered.
#[allow(dead_code)]
pub fn remote() -> Arc<InMemoryRemote> {
    let remote = InMemoryRemote::new()
        .with_server_defaults(
            catalog::ALERT,
            fields(json!({
                "created_by": "api-key-7",
                "created_at": "2024-05-01T00:00:00Z",
                "updated_at": "2024-05-01T00:00:00Z",
            })),
        )
        .with_ordered_kind(
            catalog::TCO_POLICY,
            OrderingFields {
                order_field: "order".to_string(),
                source_type_field: "source_type".to_string(),
            },
        );
    Arc::new(remote)
}

#[allow(dead_code)]
pub fn lifecycle(kind: &str, remote: &Arc<InMemoryRemote>) -> Box<dyn Lifecycle> {
    lifecycle_with(kind, remote, RetryConfig::none(), ReorderStrategy::Swap)
}

#[allow(dead_code)]
pub fn lifecycle_with(
    kind: &str,
    remote: &Arc<InMemoryRemote>,
    retry: RetryConfig,
    strategy: ReorderStrategy,
) -> Box<dyn Lifecycle> {
    Catalog::new()
        .unwrap()
        .lifecycle(kind, remote.clone(), retry, strategy)
        .unwrap()
}

#[allow(dead_code)]
pub fn policy(name: &str, source_type: &str) -> Fields {
    fields(json!({"name": name, "source_type": source_type, "priority": "medium"}))
}
