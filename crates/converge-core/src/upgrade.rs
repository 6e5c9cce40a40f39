//! Schema-version upgrades for persisted state
//!
//! An [`Upgrader`] owns a contiguous chain of single-step migrations starting
//! at a base version. Upgrading applies every step from the stored version up
//! to the current one, in order. A step either maps the whole record or
//! fails; there is no partial or best-effort migration.

use crate::decode::DecodeError;
use crate::error::{ReconcileError, Result};
use crate::remote::Fields;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure of a single migration step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Invalid(String),
}

type StepFn = Box<dyn Fn(Fields) -> std::result::Result<Fields, StepError> + Send + Sync>;

/// Ordered chain of migrations for one resource kind
pub struct Upgrader {
    base: u32,
    steps: Vec<StepFn>,
}

impl fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrader")
            .field("base", &self.base)
            .field("current", &self.current_version())
            .finish()
    }
}

impl Default for Upgrader {
    fn default() -> Self {
        Self::at_version(0)
    }
}

impl Upgrader {
    /// An upgrader with no steps: only `version` is accepted
    pub fn at_version(version: u32) -> Self {
        Self {
            base: version,
            steps: Vec::new(),
        }
    }

    pub fn builder(base: u32) -> UpgraderBuilder {
        UpgraderBuilder {
            base,
            steps: Vec::new(),
        }
    }

    /// Oldest version this chain can start from
    pub fn base_version(&self) -> u32 {
        self.base
    }

    pub fn current_version(&self) -> u32 {
        self.base + self.steps.len() as u32
    }

    /// Bring `raw`, stored at `version`, up to the current version
    pub fn upgrade(&self, kind: &str, version: u32, raw: Value) -> Result<Fields> {
        let current = self.current_version();
        if version < self.base || version > current {
            return Err(ReconcileError::UnsupportedSchemaVersion {
                kind: kind.to_string(),
                found: version,
                oldest: self.base,
                current,
            });
        }

        let mut fields = match raw {
            Value::Object(fields) => fields,
            other => {
                return Err(ReconcileError::Upgrade {
                    kind: kind.to_string(),
                    from: version,
                    message: format!("stored state must be an object, found {other}"),
                });
            }
        };

        let first = (version - self.base) as usize;
        for (offset, step) in self.steps.iter().enumerate().skip(first) {
            let from = self.base + offset as u32;
            fields = step(fields).map_err(|e| ReconcileError::Upgrade {
                kind: kind.to_string(),
                from,
                message: e.to_string(),
            })?;
            tracing::debug!("{}: upgraded state from version {} to {}", kind, from, from + 1);
        }

        Ok(fields)
    }
}

pub struct UpgraderBuilder {
    base: u32,
    steps: Vec<(u32, StepFn)>,
}

impl UpgraderBuilder {
    /// Register the step that turns version `from` into `from + 1`
    pub fn step<F>(mut self, from: u32, step: F) -> Self
    where
        F: Fn(Fields) -> std::result::Result<Fields, StepError> + Send + Sync + 'static,
    {
        self.steps.push((from, Box::new(step)));
        self
    }

    /// Check the chain is gap-free and starts at the base version
    pub fn build(mut self, kind: &str) -> Result<Upgrader> {
        self.steps.sort_by_key(|(from, _)| *from);

        let mut expected = self.base;
        let mut steps = Vec::with_capacity(self.steps.len());
        for (from, step) in self.steps {
            if from != expected {
                return Err(ReconcileError::InvalidSchema {
                    kind: kind.to_string(),
                    message: if from < expected {
                        format!("upgrade step from version {from} is declared twice")
                    } else {
                        format!("no upgrade step from version {expected}")
                    },
                });
            }
            steps.push(step);
            expected += 1;
        }

        Ok(Upgrader {
            base: self.base,
            steps,
        })
    }
}
