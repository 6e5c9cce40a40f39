//! Remote control-plane API consumed by the core
//!
//! The transport (gRPC, HTTP, ...) lives behind this trait. Implementations
//! must be safe for concurrent use: one client is shared by every lifecycle
//! manager in the process.

use crate::ordering::SourceType;
use crate::quota::TeamId;
use crate::status::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Untyped field tree of a managed object, as declared or as observed
pub type Fields = serde_json::Map<String, serde_json::Value>;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Control-plane operations used by the reconciliation core
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create an object; the remote side assigns the id
    async fn create_object(&self, kind: &str, fields: &Fields) -> RemoteResult<Created>;

    async fn get_object(&self, kind: &str, id: &str) -> RemoteResult<Fields>;

    async fn update_object(
        &self,
        kind: &str,
        id: &str,
        payload: &UpdatePayload,
    ) -> RemoteResult<Fields>;

    async fn delete_object(&self, kind: &str, id: &str) -> RemoteResult<()>;

    /// Whole ordered collection of one source type, sorted by ascending order
    async fn list_collection(&self, source_type: SourceType) -> RemoteResult<Vec<CollectionMember>>;

    /// Replace the order of the whole collection in one call
    async fn overwrite_collection_order(
        &self,
        source_type: SourceType,
        orders: &[MemberOrder],
    ) -> RemoteResult<()>;

    async fn get_quota(&self, team: &TeamId) -> RemoteResult<f64>;

    /// Move `units` from `source` to `destination` atomically
    async fn transfer_quota(
        &self,
        source: &TeamId,
        destination: &TeamId,
        units: f64,
    ) -> RemoteResult<QuotaBalances>;
}

/// Response of a successful create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub id: String,
    pub fields: Fields,
}

/// Body of an update request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpdatePayload {
    /// Replace the whole object with these fields
    Replace { fields: Fields },

    /// Touch only the fields in `mask`. A masked field missing from
    /// `fields` is cleared.
    Patch { fields: Fields, mask: Vec<String> },
}

impl UpdatePayload {
    pub fn fields(&self) -> &Fields {
        match self {
            UpdatePayload::Replace { fields } | UpdatePayload::Patch { fields, .. } => fields,
        }
    }
}

/// Member of an ordered collection as listed by the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMember {
    pub id: String,
    pub name: String,
    pub order: u32,
}

impl CollectionMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order,
        }
    }
}

/// One entry of a whole-collection reorder request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOrder {
    pub id: String,
    pub order: u32,
}

/// Balances after a transfer, as reported by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaBalances {
    pub source: f64,
    pub destination: f64,
}
