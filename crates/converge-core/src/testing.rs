//! In-memory control plane for tests
//!
//! [`InMemoryRemote`] implements [`RemoteApi`] over plain maps. It keeps
//! ordered collections dense, fills in server-side defaults, checks quota
//! balances, counts calls per [`Operation`] and can be scripted to fail.

use crate::codec::Vocabulary;
use crate::ordering::SourceType;
use crate::quota::TeamId;
use crate::remote::{
    CollectionMember, Created, Fields, MemberOrder, QuotaBalances, RemoteApi, RemoteResult,
    UpdatePayload,
};
use crate::schema::OrderingFields;
use crate::status::{RemoteError, StatusCode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Remote call kinds, for call counting and scripted failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
    ListCollection,
    OverwriteOrder,
    GetQuota,
    TransferQuota,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Create,
        Operation::Get,
        Operation::Update,
        Operation::Delete,
        Operation::ListCollection,
        Operation::OverwriteOrder,
        Operation::GetQuota,
        Operation::TransferQuota,
    ];

    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Update
                | Operation::Delete
                | Operation::OverwriteOrder
                | Operation::TransferQuota
        )
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    kind: String,
    fields: Fields,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    objects: HashMap<String, StoredObject>,
    collections: HashMap<SourceType, Vec<CollectionMember>>,
    ordered_kinds: HashMap<String, OrderingFields>,
    server_defaults: HashMap<String, Fields>,
    quotas: HashMap<TeamId, f64>,
    denied: HashSet<TeamId>,
    failures: HashMap<Operation, VecDeque<RemoteError>>,
    lost_responses: HashMap<Operation, VecDeque<RemoteError>>,
    calls: HashMap<Operation, usize>,
    updates: Vec<(String, UpdatePayload)>,
}

impl State {
    /// Count the call and pop a scripted failure, if any
    fn begin(&mut self, operation: Operation) -> RemoteResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Report `value`, unless a lost response is scripted for `operation`
    fn finish<T>(&mut self, operation: Operation, value: T) -> RemoteResult<T> {
        match self
            .lost_responses
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    fn object(&self, kind: &str, id: &str) -> RemoteResult<&StoredObject> {
        self.objects
            .get(id)
            .filter(|o| o.kind == kind)
            .ok_or_else(|| RemoteError::not_found(format!("{kind} '{id}' does not exist")))
    }

    /// Fields as the server returns them, order field included
    fn render(&self, id: &str, object: &StoredObject) -> Fields {
        let mut fields = object.fields.clone();
        fields.insert("id".to_string(), Value::String(id.to_string()));

        if let Some(ordering) = self.ordered_kinds.get(&object.kind) {
            let order = self
                .collections
                .values()
                .flat_map(|members| members.iter())
                .find(|m| m.id == id)
                .map(|m| m.order);
            if let Some(order) = order {
                fields.insert(ordering.order_field.clone(), Value::from(order));
            }
        }
        fields
    }

    fn remove_member(&mut self, id: &str) {
        for members in self.collections.values_mut() {
            let before = members.len();
            members.retain(|m| m.id != id);
            if members.len() != before {
                renumber(members);
            }
        }
    }

    fn check_team(&self, team: &TeamId) -> RemoteResult<f64> {
        if self.denied.contains(team) {
            return Err(RemoteError::new(
                StatusCode::PermissionDenied,
                format!("no access to team {team}"),
            ));
        }
        self.quotas
            .get(team)
            .copied()
            .ok_or_else(|| RemoteError::not_found(format!("team {team} does not exist")))
    }
}

fn renumber(members: &mut [CollectionMember]) {
    for (index, member) in members.iter_mut().enumerate() {
        member.order = index as u32 + 1;
    }
}

fn invalid(message: impl Into<String>) -> RemoteError {
    RemoteError::new(StatusCode::InvalidArgument, message)
}

/// Control plane kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Objects of `kind` join the collection named by their source-type field
    /// and report their position in the order field
    pub fn with_ordered_kind(self, kind: &str, ordering: OrderingFields) -> Self {
        self.state().ordered_kinds.insert(kind.to_string(), ordering);
        self
    }

    /// Fields the server fills in on create when the request leaves them out
    pub fn with_server_defaults(self, kind: &str, defaults: Fields) -> Self {
        self.state().server_defaults.insert(kind.to_string(), defaults);
        self
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Apply the next call of `operation`, then report `error` as if the
    /// response had been lost
    pub fn fail_after_apply(&self, operation: Operation, error: RemoteError) {
        self.state()
            .lost_responses
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `times` calls of `operation` with `code`
    pub fn fail_times(&self, operation: Operation, times: usize, code: StatusCode) {
        for attempt in 1..=times {
            self.fail_next(
                operation,
                RemoteError::new(code, format!("scripted failure {attempt}/{times}")),
            );
        }
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Calls that could have changed remote state
    pub fn mutation_calls(&self) -> usize {
        let state = self.state();
        Operation::ALL
            .iter()
            .filter(|op| op.is_mutation())
            .map(|op| state.calls.get(op).copied().unwrap_or(0))
            .sum()
    }

    /// Update payloads received so far, oldest first
    pub fn updates(&self) -> Vec<(String, UpdatePayload)> {
        self.state().updates.clone()
    }

    /// Store an object as if it had been created out of band
    pub fn insert_object(&self, kind: &str, id: &str, fields: Fields) {
        self.state().objects.insert(
            id.to_string(),
            StoredObject {
                kind: kind.to_string(),
                fields,
            },
        );
    }

    /// Stored fields of an object, as the server would return them
    pub fn object(&self, id: &str) -> Option<Fields> {
        let state = self.state();
        state.objects.get(id).map(|o| state.render(id, o))
    }

    /// Delete an object out of band, leaving its collection dense
    pub fn remove_object(&self, id: &str) {
        let mut state = self.state();
        state.objects.remove(id);
        state.remove_member(id);
    }

    /// Replace a collection as is. Orders are not checked, so a test can
    /// start from a non-dense listing.
    pub fn set_collection(&self, source_type: SourceType, members: Vec<CollectionMember>) {
        self.state().collections.insert(source_type, members);
    }

    /// Collection sorted by order
    pub fn collection(&self, source_type: SourceType) -> Vec<CollectionMember> {
        let mut members = self
            .state()
            .collections
            .get(&source_type)
            .cloned()
            .unwrap_or_default();
        members.sort_by_key(|m| m.order);
        members
    }

    pub fn set_quota(&self, team: impl Into<TeamId>, quota: f64) {
        self.state().quotas.insert(team.into(), quota);
    }

    pub fn quota(&self, team: &TeamId) -> Option<f64> {
        self.state().quotas.get(team).copied()
    }

    /// Reject every call touching `team` with `PERMISSION_DENIED`
    pub fn deny_team(&self, team: impl Into<TeamId>) {
        self.state().denied.insert(team.into());
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn create_object(&self, kind: &str, fields: &Fields) -> RemoteResult<Created> {
        let mut state = self.state();
        state.begin(Operation::Create)?;

        let mut stored = state.server_defaults.get(kind).cloned().unwrap_or_default();
        stored.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let source_type = match state.ordered_kinds.get(kind) {
            Some(ordering) => {
                let raw = stored
                    .get(&ordering.source_type_field)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let source_type = SourceType::VARIANTS
                    .iter()
                    .copied()
                    .find(|s| s.wire_name() == raw)
                    .ok_or_else(|| invalid(format!("unknown source type '{raw}'")))?;
                stored.remove(&ordering.order_field);
                Some(source_type)
            }
            None => None,
        };

        state.next_id += 1;
        let id = format!("{kind}-{}", state.next_id);

        if let Some(source_type) = source_type {
            let name = stored
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&id)
                .to_string();
            let members = state.collections.entry(source_type).or_default();
            let order = members.len() as u32 + 1;
            members.push(CollectionMember::new(id.clone(), name, order));
        }

        let object = StoredObject {
            kind: kind.to_string(),
            fields: stored,
        };
        let fields = state.render(&id, &object);
        state.objects.insert(id.clone(), object);
        state.finish(Operation::Create, Created { id, fields })
    }

    async fn get_object(&self, kind: &str, id: &str) -> RemoteResult<Fields> {
        let mut state = self.state();
        state.begin(Operation::Get)?;
        let object = state.object(kind, id)?;
        Ok(state.render(id, object))
    }

    async fn update_object(
        &self,
        kind: &str,
        id: &str,
        payload: &UpdatePayload,
    ) -> RemoteResult<Fields> {
        let mut state = self.state();
        state.begin(Operation::Update)?;
        let current = state.object(kind, id)?.fields.clone();
        let defaults = state.server_defaults.get(kind).cloned().unwrap_or_default();

        let fields = match payload {
            UpdatePayload::Replace { fields } => {
                // Server-owned fields survive a replace
                let mut next: Fields = current
                    .into_iter()
                    .filter(|(name, _)| defaults.contains_key(name))
                    .collect();
                next.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                next
            }
            UpdatePayload::Patch { fields, mask } => {
                let mut next = current;
                for name in mask {
                    match fields.get(name) {
                        Some(value) => {
                            next.insert(name.clone(), value.clone());
                        }
                        None => {
                            next.remove(name);
                        }
                    }
                }
                next
            }
        };

        state.updates.push((id.to_string(), payload.clone()));
        let object = StoredObject {
            kind: kind.to_string(),
            fields,
        };
        let rendered = state.render(id, &object);
        state.objects.insert(id.to_string(), object);
        state.finish(Operation::Update, rendered)
    }

    async fn delete_object(&self, kind: &str, id: &str) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin(Operation::Delete)?;
        state.object(kind, id)?;
        state.objects.remove(id);
        state.remove_member(id);
        state.finish(Operation::Delete, ())
    }

    async fn list_collection(&self, source_type: SourceType) -> RemoteResult<Vec<CollectionMember>> {
        self.state().begin(Operation::ListCollection)?;
        Ok(self.collection(source_type))
    }

    async fn overwrite_collection_order(
        &self,
        source_type: SourceType,
        orders: &[MemberOrder],
    ) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin(Operation::OverwriteOrder)?;

        let members = state.collections.entry(source_type).or_default();
        if orders.len() != members.len() {
            return Err(invalid(format!(
                "{source_type} collection has {} members, {} orders given",
                members.len(),
                orders.len()
            )));
        }

        let mut seen = vec![false; orders.len()];
        let mut ids = HashSet::new();
        for entry in orders {
            if !ids.insert(entry.id.as_str()) {
                return Err(invalid(format!("'{}' is given twice", entry.id)));
            }
            let slot = (entry.order as usize)
                .checked_sub(1)
                .filter(|&i| i < seen.len())
                .ok_or_else(|| invalid(format!("order {} is out of range", entry.order)))?;
            if std::mem::replace(&mut seen[slot], true) {
                return Err(invalid(format!("order {} is given twice", entry.order)));
            }
            if !members.iter().any(|m| m.id == entry.id) {
                return Err(invalid(format!("'{}' is not in the collection", entry.id)));
            }
        }

        for member in members.iter_mut() {
            if let Some(entry) = orders.iter().find(|o| o.id == member.id) {
                member.order = entry.order;
            }
        }
        members.sort_by_key(|m| m.order);
        state.finish(Operation::OverwriteOrder, ())
    }

    async fn get_quota(&self, team: &TeamId) -> RemoteResult<f64> {
        let mut state = self.state();
        state.begin(Operation::GetQuota)?;
        state.check_team(team)
    }

    async fn transfer_quota(
        &self,
        source: &TeamId,
        destination: &TeamId,
        units: f64,
    ) -> RemoteResult<QuotaBalances> {
        let mut state = self.state();
        state.begin(Operation::TransferQuota)?;

        let available = state.check_team(source)?;
        let held = state.check_team(destination)?;
        if !units.is_finite() || units <= 0.0 || units > available {
            return Err(invalid(format!(
                "cannot move {units} units from team {source} holding {available}"
            )));
        }

        let balances = QuotaBalances {
            source: available - units,
            destination: held + units,
        };
        state.quotas.insert(source.clone(), balances.source);
        state.quotas.insert(destination.clone(), balances.destination);
        state.finish(Operation::TransferQuota, balances)
    }
}
