//! Reconciliation of remote-ordered collections
//!
//! Some kinds (TCO policies) live in a list whose order the remote side owns.
//! The list is partitioned by [`SourceType`]; inside a partition the order
//! values always form the dense sequence `1..=N`. The remote API only
//! accepts whole-collection reorders, so moving one member means reading the
//! entire partition and writing it back.
//!
//! # Concurrency
//!
//! A reorder reads and then rewrites the whole partition. Two reorders of the
//! same source type that interleave will each act on a stale read and corrupt
//! the order. Callers must run at most one reorder (or ordered create/update)
//! per source type at a time. No lock is taken here.

use crate::codec::{EnumCodec, Vocabulary};
use crate::decode::Decoder;
use crate::error::{CallContext, ReconcileError, Result};
use crate::lifecycle::{Lifecycle, ResourceLifecycle};
use crate::object::{ObservedState, ReadOutcome};
use crate::remote::{CollectionMember, Fields, MemberOrder, RemoteApi};
use crate::retry::{self, RetryConfig};
use crate::schema::OrderingFields;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Partition of an ordered collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Logs,
    Spans,
}

impl Vocabulary for SourceType {
    const NAME: &'static str = "source type";
    const VARIANTS: &'static [Self] = &[SourceType::Logs, SourceType::Spans];

    fn wire_name(self) -> &'static str {
        match self {
            SourceType::Logs => "logs",
            SourceType::Spans => "spans",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// How a member is moved to its desired position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderStrategy {
    /// Swap the member with whatever occupies the desired position. Members
    /// in between keep their order.
    #[default]
    Swap,
    /// Move the member to the desired position; members in between shift by
    /// one.
    Shift,
}

/// What a reconciliation did, or would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderPlan {
    /// The member already sits at its desired position
    Unchanged { order: u32 },
    /// The whole collection is rewritten with `orders`
    Overwrite {
        from: u32,
        to: u32,
        orders: Vec<MemberOrder>,
    },
}

impl ReorderPlan {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReorderPlan::Unchanged { .. })
    }
}

/// Compute the reorder request that puts `member_id` at `desired_order`.
///
/// `members` must be the full partition as listed by the remote side, sorted
/// by ascending order; positions are taken from the slice order. A desired
/// order past the end of the list clamps to the last position. Declarations
/// with order 0 are rejected by [`OrderedLifecycle`]; here 0 means first.
pub fn plan_reorder(
    source_type: SourceType,
    members: &[CollectionMember],
    member_id: &str,
    desired_order: u32,
    strategy: ReorderStrategy,
) -> Result<ReorderPlan> {
    let current_index = members
        .iter()
        .position(|m| m.id == member_id)
        .ok_or_else(|| ReconcileError::MemberNotInCollection {
            source_type,
            id: member_id.to_string(),
        })?;

    let last_index = members.len() - 1;
    let desired_index = (desired_order.saturating_sub(1) as usize).min(last_index);

    if current_index == desired_index {
        return Ok(ReorderPlan::Unchanged {
            order: current_index as u32 + 1,
        });
    }

    let mut ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
    match strategy {
        ReorderStrategy::Swap => ids.swap(current_index, desired_index),
        ReorderStrategy::Shift => {
            let moved = ids.remove(current_index);
            ids.insert(desired_index, moved);
        }
    }

    let orders = ids
        .into_iter()
        .enumerate()
        .map(|(index, id)| MemberOrder {
            id: id.to_string(),
            order: index as u32 + 1,
        })
        .collect();

    Ok(ReorderPlan::Overwrite {
        from: current_index as u32 + 1,
        to: desired_index as u32 + 1,
        orders,
    })
}

/// Whether the listed order values are exactly `1..=N` in slice order
fn is_dense(members: &[CollectionMember]) -> bool {
    members
        .iter()
        .enumerate()
        .all(|(index, m)| m.order as usize == index + 1)
}

/// Moves one member of an ordered collection to its desired position
pub struct OrderReconciler {
    remote: Arc<dyn RemoteApi>,
    retry: RetryConfig,
    strategy: ReorderStrategy,
}

impl OrderReconciler {
    pub fn new(remote: Arc<dyn RemoteApi>, retry: RetryConfig) -> Self {
        Self {
            remote,
            retry,
            strategy: ReorderStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ReorderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> ReorderStrategy {
        self.strategy
    }

    /// Put `member_id` at `desired_order` within `source_type`.
    ///
    /// Issues no mutation when the member is already in place. Callers must
    /// not run two reconciliations of the same source type concurrently.
    pub async fn reconcile(
        &self,
        source_type: SourceType,
        member_id: &str,
        desired_order: u32,
    ) -> Result<ReorderPlan> {
        let collection = format!("{source_type} collection");
        let remote = self.remote.as_ref();

        let members = retry::call(
            &self.retry,
            &CallContext::new("list", collection.as_str()),
            source_type.wire_name(),
            move || remote.list_collection(source_type),
        )
        .await?;

        if !is_dense(&members) {
            tracing::warn!(
                "{} order values are not the dense sequence 1..={}; using listed positions",
                collection,
                members.len()
            );
        }

        let plan = plan_reorder(source_type, &members, member_id, desired_order, self.strategy)?;
        let (from, to, orders) = match &plan {
            ReorderPlan::Unchanged { order } => {
                tracing::debug!("'{}' already at order {} in {}", member_id, order, collection);
                return Ok(plan);
            }
            ReorderPlan::Overwrite { from, to, orders } => (*from, *to, orders.as_slice()),
        };

        let request = serde_json::to_string(orders)?;
        tracing::info!(
            "Moving '{}' from order {} to {} in {} ({:?})",
            member_id,
            from,
            to,
            collection,
            self.strategy
        );
        retry::call(
            &self.retry,
            &CallContext::new("reorder", collection.as_str()).with_id(member_id),
            &request,
            move || remote.overwrite_collection_order(source_type, orders),
        )
        .await?;

        Ok(plan)
    }
}

/// Lifecycle for kinds that belong to an ordered collection.
///
/// Create and Update run the plain lifecycle first and then move the object
/// to its declared order. The same per-source-type serialization rule as for
/// [`OrderReconciler`] applies.
pub struct OrderedLifecycle {
    inner: ResourceLifecycle,
    reconciler: OrderReconciler,
    source_types: Arc<EnumCodec<SourceType>>,
    fields: OrderingFields,
}

impl OrderedLifecycle {
    pub fn new(
        inner: ResourceLifecycle,
        reconciler: OrderReconciler,
        source_types: Arc<EnumCodec<SourceType>>,
    ) -> Result<Self> {
        let fields = inner
            .schema()
            .ordering()
            .cloned()
            .ok_or_else(|| ReconcileError::InvalidSchema {
                kind: inner.schema().kind().to_string(),
                message: "kind is not declared as ordered".to_string(),
            })?;

        Ok(Self {
            inner,
            reconciler,
            source_types,
            fields,
        })
    }

    pub fn inner(&self) -> &ResourceLifecycle {
        &self.inner
    }

    /// Source type and desired order from a declaration. No declared order
    /// means the position is left to the remote side. Orders start at 1.
    fn desired_position(&self, desired: &Fields) -> Result<(SourceType, Option<u32>)> {
        let decoder = Decoder::new(desired);
        let source_type = decoder.enumeration(&self.fields.source_type_field, &self.source_types)?;
        let order = decoder.optional_positive_u32(&self.fields.order_field)?;
        Ok((source_type, order))
    }

    async fn place(&self, state: ObservedState, desired: &Fields) -> Result<ObservedState> {
        let (source_type, order) = self.desired_position(desired)?;
        let Some(order) = order else {
            return Ok(state);
        };

        let plan = self.reconciler.reconcile(source_type, &state.id, order).await?;
        if plan.is_unchanged() {
            return Ok(state);
        }

        match self.inner.read(&state.id).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Absent => Err(ReconcileError::NotFound {
                context: CallContext::new("reorder", self.inner.schema().kind()).with_id(state.id.as_str()),
            }),
        }
    }
}

#[async_trait]
impl Lifecycle for OrderedLifecycle {
    async fn create(&self, desired: &Fields) -> Result<ObservedState> {
        // Validate the position before anything is created
        self.desired_position(desired)?;
        let state = self.inner.create(desired).await?;
        let id = state.id.clone();
        self.place(state, desired)
            .await
            .map_err(|e| e.partially_created(self.inner.schema().kind(), &id))
    }

    async fn read(&self, id: &str) -> Result<ReadOutcome> {
        self.inner.read(id).await
    }

    async fn update(&self, prior: &ObservedState, desired: &Fields) -> Result<ObservedState> {
        self.desired_position(desired)?;
        let state = self.inner.update(prior, desired).await?;
        self.place(state, desired).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}
