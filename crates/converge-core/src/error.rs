//! Reconciliation error types

use crate::codec::CodecError;
use crate::decode::DecodeError;
use crate::ordering::SourceType;
use crate::quota::TeamId;
use crate::status::StatusCode;
use std::fmt;
use thiserror::Error;

/// Where a remote failure happened: operation, resource kind and object id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub operation: &'static str,
    pub kind: String,
    pub id: Option<String>,
}

impl CallContext {
    pub fn new(operation: &'static str, kind: impl Into<String>) -> Self {
        Self {
            operation,
            kind: kind.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {} '{}'", self.operation, self.kind, id),
            None => write!(f, "{} {}", self.operation, self.kind),
        }
    }
}

/// Errors surfaced by reconciliation operations
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(
        "{context}: access denied ({code}): {message}. Check that the API key is valid and grants access to this resource"
    )]
    Credentials {
        context: CallContext,
        code: StatusCode,
        message: String,
    },

    #[error("{context}: invalid argument: {message}\nrequest: {request}")]
    InvalidArgument {
        context: CallContext,
        message: String,
        request: String,
    },

    #[error("{context}: remote error ({code}): {message}")]
    Remote {
        context: CallContext,
        code: StatusCode,
        message: String,
    },

    #[error("{context}: giving up after {attempts} attempts, last error ({code}): {message}")]
    RetriesExhausted {
        context: CallContext,
        attempts: u32,
        code: StatusCode,
        message: String,
    },

    #[error("{context}: object not found")]
    NotFound { context: CallContext },

    #[error("{kind} '{id}': immutable field changed: {}", .fields.join(", "))]
    ImmutableFieldViolation {
        kind: String,
        id: String,
        fields: Vec<String>,
    },

    #[error(
        "Not enough quota on team {source_team}: {requested} units requested, {available} available"
    )]
    InsufficientQuota {
        source_team: TeamId,
        requested: f64,
        available: f64,
    },

    #[error(
        "Cannot lower quota of team {destination_team} from {current} to {desired}: transfers only grow the destination"
    )]
    QuotaShrinkNotSupported {
        destination_team: TeamId,
        current: f64,
        desired: f64,
    },

    #[error("Invalid desired quota: {0}")]
    InvalidQuota(f64),

    #[error("Cannot transfer quota from team {0} to itself")]
    SelfTransfer(TeamId),

    #[error("Member '{id}' is not part of the {source_type} collection")]
    MemberNotInCollection { source_type: SourceType, id: String },

    #[error("{kind}: schema version {found} is not supported (supported: {oldest}..={current})")]
    UnsupportedSchemaVersion {
        kind: String,
        found: u32,
        oldest: u32,
        current: u32,
    },

    #[error("{kind}: upgrade from schema version {from} failed: {message}")]
    Upgrade {
        kind: String,
        from: u32,
        message: String,
    },

    #[error("Invalid schema for {kind}: {message}")]
    InvalidSchema { kind: String, message: String },

    /// The object exists remotely, but a later step of its creation failed.
    /// Hosts should record `id` so the next run updates instead of creating.
    #[error("{kind} '{id}' was created but could not be finished: {source}")]
    PartiallyCreated {
        kind: String,
        id: String,
        source: Box<ReconcileError>,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse failure category callers can match on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Credentials,
    InvalidInput,
    ImmutableField,
    InsufficientQuota,
    Unsupported,
    Transient,
    NotFound,
    Remote,
    Schema,
}

impl ReconcileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ReconcileError::PartiallyCreated { source, .. } => source.kind(),
            ReconcileError::Credentials { .. } => FailureKind::Credentials,
            ReconcileError::InvalidArgument { .. }
            | ReconcileError::InvalidQuota(_)
            | ReconcileError::SelfTransfer(_)
            | ReconcileError::MemberNotInCollection { .. }
            | ReconcileError::Decode(_)
            | ReconcileError::Codec(_) => FailureKind::InvalidInput,
            ReconcileError::ImmutableFieldViolation { .. } => FailureKind::ImmutableField,
            ReconcileError::InsufficientQuota { .. } => FailureKind::InsufficientQuota,
            ReconcileError::QuotaShrinkNotSupported { .. } => FailureKind::Unsupported,
            ReconcileError::RetriesExhausted { .. } => FailureKind::Transient,
            ReconcileError::NotFound { .. } => FailureKind::NotFound,
            ReconcileError::Remote { .. } | ReconcileError::Json(_) => FailureKind::Remote,
            ReconcileError::UnsupportedSchemaVersion { .. }
            | ReconcileError::Upgrade { .. }
            | ReconcileError::InvalidSchema { .. } => FailureKind::Schema,
        }
    }

    /// Remote status code behind this error, if it came from the remote side
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ReconcileError::PartiallyCreated { source, .. } => source.status_code(),
            ReconcileError::Credentials { code, .. }
            | ReconcileError::Remote { code, .. }
            | ReconcileError::RetriesExhausted { code, .. } => Some(*code),
            ReconcileError::InvalidArgument { .. } => Some(StatusCode::InvalidArgument),
            ReconcileError::NotFound { .. } => Some(StatusCode::NotFound),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }

    /// Id of an object left behind by a create that did not finish
    pub fn created_id(&self) -> Option<&str> {
        match self {
            ReconcileError::PartiallyCreated { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Mark a failure that happened after `id` was created
    pub(crate) fn partially_created(self, kind: &str, id: &str) -> Self {
        match self {
            ReconcileError::PartiallyCreated { .. } => self,
            source => ReconcileError::PartiallyCreated {
                kind: kind.to_string(),
                id: id.to_string(),
                source: Box::new(source),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
