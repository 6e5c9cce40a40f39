//! Managed objects and their observed state
//!
//! Persisting observed state across restarts is up to the host. Records are
//! serialized with their schema version so that an older record can be
//! upgraded (see [`ResourceSchema::load_state`](crate::schema::ResourceSchema::load_state))
//! before it is used again.

use crate::remote::Fields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known remote state of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Remote-assigned id, immutable once created
    pub id: String,

    /// Resource kind (e.g. "alert", "tco_policy")
    pub kind: String,

    /// Schema version the fields are shaped for
    pub schema_version: u32,

    /// Remote fields, including server-side defaults
    pub fields: Fields,

    /// When the remote side was last read
    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        schema_version: u32,
        fields: Fields,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            schema_version,
            fields,
            observed_at: Utc::now(),
        }
    }

    pub fn get_field<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Result of reading an object: present, or gone from the remote side
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(ObservedState),
    /// The object no longer exists remotely and has to be created again
    Absent,
}

impl ReadOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn into_state(self) -> Option<ObservedState> {
        match self {
            ReadOutcome::Present(state) => Some(state),
            ReadOutcome::Absent => None,
        }
    }
}

/// Desired configuration of an object together with what was last observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    pub kind: String,
    pub desired: Fields,
    pub observed: Option<ObservedState>,
}

impl ManagedObject {
    pub fn new(kind: impl Into<String>, desired: Fields) -> Self {
        Self {
            kind: kind.into(),
            desired,
            observed: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.observed.as_ref().map(|s| s.id.as_str())
    }

    pub fn is_created(&self) -> bool {
        self.observed.is_some()
    }

    /// Record the state returned by a create or update
    pub fn record(&mut self, state: ObservedState) {
        self.observed = Some(state);
    }

    /// Record a refresh; an absent object loses its id
    pub fn record_read(&mut self, outcome: ReadOutcome) {
        self.observed = outcome.into_state();
    }

    /// Forget the remote object after a successful delete
    pub fn clear(&mut self) {
        self.observed = None;
    }
}
