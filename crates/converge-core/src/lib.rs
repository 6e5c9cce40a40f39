//! Converge Core
//!
//! Reconciliation core for declaratively managed control-plane objects:
//! alerts, parsing rules, TCO policies and team quotas. A host (a
//! provisioning tool, an operator, a CLI) declares the desired objects and
//! drives their lifecycle through this crate.
//!
//! # What the core guarantees
//!
//! - Transient remote failures are retried with bounded exponential backoff
//!   and jitter; credential and argument errors fail immediately
//! - An object deleted out of band reads as [`ReadOutcome::Absent`], so the
//!   host can recreate it instead of failing
//! - Every create and update ends with a read, so the returned state holds
//!   what the server stored, defaults included
//! - Ordered collections keep their dense `1..=N` order after a reorder
//! - Quota transfers conserve the total and never lower the destination
//! - Persisted state from older schema versions is upgraded before use
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           Host (provisioning / operator)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │  desired fields / observed state
//! ┌─────────────────▼───────────────────────────────┐
//! │                 converge-core                    │
//! │  ┌──────────────┐ ┌───────────────┐ ┌─────────┐ │
//! │  │  Lifecycle   │ │ OrderedLife-  │ │  Quota  │ │
//! │  │  (CRUD)      │ │ cycle/Reorder │ │ Engine  │ │
//! │  └──────┬───────┘ └──────┬────────┘ └────┬────┘ │
//! │  ┌──────▼────────────────▼───────────────▼────┐ │
//! │  │      retry::call  (classify + backoff)      │ │
//! │  └─────────────────────┬──────────────────────┘ │
//! │  ┌──────────┐ ┌────────┴───┐ ┌───────────────┐  │
//! │  │ Catalog  │ │  Upgrader  │ │ Decoder/Codec │  │
//! │  └──────────┘ └────────────┘ └───────────────┘  │
//! └─────────────────────┬───────────────────────────┘
//!                       │  trait RemoteApi
//!               ┌───────▼────────┐
//!               │ control plane  │
//!               └────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Each operation is one sequential chain of awaits. Nothing is spawned and
//! nothing runs in the background. Operations on distinct objects may run
//! concurrently; operations on the same object, and reorders within the same
//! [`SourceType`], must be serialized by the host.

pub mod catalog;
pub mod codec;
pub mod decode;
pub mod delta;
pub mod error;
pub mod lifecycle;
pub mod object;
pub mod ordering;
pub mod quota;
pub mod remote;
pub mod retry;
pub mod schema;
pub mod status;
pub mod upgrade;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use catalog::{Catalog, RuleType};
pub use codec::{CodecError, EnumCodec, Vocabulary};
pub use decode::{DecodeError, Decoder, FieldPath};
pub use delta::{Delta, FieldChange};
pub use error::{CallContext, FailureKind, ReconcileError, Result};
pub use lifecycle::{Lifecycle, ResourceLifecycle};
pub use object::{ManagedObject, ObservedState, ReadOutcome};
pub use ordering::{
    OrderReconciler, OrderedLifecycle, ReorderPlan, ReorderStrategy, SourceType, plan_reorder,
};
pub use quota::{QuotaEngine, QuotaTransfer, TeamId};
pub use remote::{
    CollectionMember, Created, Fields, MemberOrder, QuotaBalances, RemoteApi, UpdatePayload,
};
pub use retry::RetryConfig;
pub use schema::{ResourceSchema, UpdateMode};
pub use status::{CallOutcome, RemoteError, StatusCode, classify};
pub use upgrade::{StepError, Upgrader};
