//! Create/Read/Update/Delete contract for one managed-object kind
//!
//! Every operation that mutates remote state finishes with a fresh read, so
//! the returned [`ObservedState`] always carries what the server actually
//! stored, defaults included.
//!
//! A [`ResourceLifecycle`] holds no per-object state and may be used
//! concurrently for distinct object ids. Calls for the same id must be
//! serialized by the caller.

use crate::delta::{Delta, request_fields};
use crate::error::{CallContext, ReconcileError, Result};
use crate::object::{ObservedState, ReadOutcome};
use crate::remote::{Fields, RemoteApi};
use crate::retry::{self, RetryConfig};
use crate::schema::ResourceSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// Lifecycle operations exposed to the orchestrator
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Create the object and return its authoritative state.
    ///
    /// A create whose response is lost to a transient failure is sent again,
    /// which can leave a duplicate object behind. If the object was created
    /// but finishing it failed, the error is
    /// [`ReconcileError::PartiallyCreated`] and carries the new id.
    async fn create(&self, desired: &Fields) -> Result<ObservedState>;

    /// Refresh the object. A missing object is reported as
    /// [`ReadOutcome::Absent`], not as an error.
    async fn read(&self, id: &str) -> Result<ReadOutcome>;

    /// Converge the object from `prior` towards `desired`. A `prior` recorded
    /// under an older schema version is upgraded first.
    async fn update(&self, prior: &ObservedState, desired: &Fields) -> Result<ObservedState>;

    /// Delete the object. Deleting an object that is already gone succeeds.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Lifecycle manager for one resource kind
pub struct ResourceLifecycle {
    remote: Arc<dyn RemoteApi>,
    schema: Arc<ResourceSchema>,
    retry: RetryConfig,
}

impl ResourceLifecycle {
    pub fn new(remote: Arc<dyn RemoteApi>, schema: Arc<ResourceSchema>, retry: RetryConfig) -> Self {
        Self {
            remote,
            schema,
            retry,
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Field changes an update would make, without calling the remote side
    pub fn detect_drift(&self, observed: &ObservedState, desired: &Fields) -> Result<Delta> {
        let fields = self.current_fields(observed)?;
        Ok(Delta::between(&fields, desired, &self.schema))
    }

    fn context(&self, operation: &'static str) -> CallContext {
        CallContext::new(operation, self.schema.kind())
    }

    fn observed(&self, id: &str, fields: Fields) -> ObservedState {
        ObservedState::new(id, self.schema.kind(), self.schema.version(), fields)
    }

    /// Fields of `prior` in the current schema layout
    fn current_fields<'a>(&self, prior: &'a ObservedState) -> Result<Cow<'a, Fields>> {
        let version = self.schema.version();
        if prior.schema_version == version {
            return Ok(Cow::Borrowed(&prior.fields));
        }

        tracing::debug!(
            "{} '{}' was observed under schema version {}, upgrading to {}",
            prior.kind,
            prior.id,
            prior.schema_version,
            version
        );
        let raw = Value::Object(prior.fields.clone());
        Ok(Cow::Owned(self.schema.upgrade_fields(prior.schema_version, raw)?))
    }

    /// Read that treats absence as an error; used after mutations
    async fn reread(&self, id: &str, operation: &'static str) -> Result<ObservedState> {
        match self.read(id).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Absent => Err(ReconcileError::NotFound {
                context: self.context(operation).with_id(id),
            }),
        }
    }
}

#[async_trait]
impl Lifecycle for ResourceLifecycle {
    async fn create(&self, desired: &Fields) -> Result<ObservedState> {
        let kind = self.schema.kind();
        let fields = request_fields(desired, &self.schema);
        let request = serde_json::to_string(&fields)?;

        tracing::info!("Creating {}", kind);
        let remote = self.remote.as_ref();
        let body = &fields;
        let created = retry::call(&self.retry, &self.context("create"), &request, move || {
            remote.create_object(kind, body)
        })
        .await?;

        tracing::info!("Created {} '{}'", kind, created.id);
        self.reread(&created.id, "create")
            .await
            .map_err(|e| e.partially_created(kind, &created.id))
    }

    async fn read(&self, id: &str) -> Result<ReadOutcome> {
        let kind = self.schema.kind();
        let remote = self.remote.as_ref();
        let context = self.context("read").with_id(id);

        tracing::debug!("Reading {} '{}'", kind, id);
        match retry::call(&self.retry, &context, id, move || remote.get_object(kind, id)).await {
            Ok(fields) => Ok(ReadOutcome::Present(self.observed(id, fields))),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} '{}' no longer exists remotely", kind, id);
                Ok(ReadOutcome::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, prior: &ObservedState, desired: &Fields) -> Result<ObservedState> {
        let kind = self.schema.kind();
        let id = prior.id.as_str();
        let delta = self.detect_drift(prior, desired)?;

        let violations = delta.immutable_violations(&self.schema);
        if !violations.is_empty() {
            return Err(ReconcileError::ImmutableFieldViolation {
                kind: kind.to_string(),
                id: id.to_string(),
                fields: violations,
            });
        }

        if delta.is_empty() {
            tracing::debug!("{} '{}' is up to date", kind, id);
            return self.reread(id, "update").await;
        }

        let payload = delta.payload(desired, &self.schema);
        let request = serde_json::to_string(&payload)?;

        tracing::info!(
            "Updating {} '{}' ({})",
            kind,
            id,
            delta.touched().join(", ")
        );
        let remote = self.remote.as_ref();
        let body = &payload;
        retry::call(
            &self.retry,
            &self.context("update").with_id(id),
            &request,
            move || remote.update_object(kind, id, body),
        )
        .await?;

        self.reread(id, "update").await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let kind = self.schema.kind();
        let remote = self.remote.as_ref();
        let context = self.context("delete").with_id(id);

        tracing::info!("Deleting {} '{}'", kind, id);
        match retry::call(&self.retry, &context, id, move || remote.delete_object(kind, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} '{}' was already deleted", kind, id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
