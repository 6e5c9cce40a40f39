//! Quota transfers between team accounts
//!
//! [`QuotaEngine::move_toward`] grows a destination team's quota up to a
//! desired value by taking units from a source team in one atomic remote
//! transfer. It never lowers the destination, never transfers part of the
//! amount, and never drives the source below zero.

use crate::error::{CallContext, ReconcileError, Result};
use crate::remote::RemoteApi;
use crate::retry::{self, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a team owning a quota account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TeamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TeamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a transfer request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaTransfer {
    /// Source quota after the operation, as read back from the remote side
    pub source: f64,
    /// Destination quota after the operation, as read back from the remote side
    pub destination: f64,
    /// Units moved; zero when nothing had to move
    pub moved: f64,
}

/// Units to move so that the destination reaches `desired`
///
/// Returns `Ok(None)` when the destination already holds exactly `desired`.
pub fn units_to_move(
    source: &TeamId,
    source_quota: f64,
    destination: &TeamId,
    destination_quota: f64,
    desired: f64,
) -> Result<Option<f64>> {
    if !desired.is_finite() {
        return Err(ReconcileError::InvalidQuota(desired));
    }

    let units = desired - destination_quota;
    if units == 0.0 {
        return Ok(None);
    }
    if units < 0.0 {
        return Err(ReconcileError::QuotaShrinkNotSupported {
            destination_team: destination.clone(),
            current: destination_quota,
            desired,
        });
    }
    if units > source_quota {
        return Err(ReconcileError::InsufficientQuota {
            source_team: source.clone(),
            requested: units,
            available: source_quota,
        });
    }
    Ok(Some(units))
}

pub struct QuotaEngine {
    remote: Arc<dyn RemoteApi>,
    retry: RetryConfig,
}

impl QuotaEngine {
    pub fn new(remote: Arc<dyn RemoteApi>, retry: RetryConfig) -> Self {
        Self { remote, retry }
    }

    async fn quota_of(&self, team: &TeamId) -> Result<f64> {
        let remote = self.remote.as_ref();
        retry::call(
            &self.retry,
            &CallContext::new("read", "quota").with_id(team.as_str()),
            team.as_str(),
            move || remote.get_quota(team),
        )
        .await
    }

    /// Move quota from `source` to `destination` until the destination holds
    /// `desired`. Fails without transferring anything if that would lower the
    /// destination or needs more than the source has.
    ///
    /// A transfer is never repeated blindly. After a transient failure both
    /// balances are read again and the amount is recomputed, so a transfer
    /// that was applied before its response got lost is not sent twice.
    pub async fn move_toward(
        &self,
        source: &TeamId,
        destination: &TeamId,
        desired: f64,
    ) -> Result<QuotaTransfer> {
        if source == destination {
            return Err(ReconcileError::SelfTransfer(source.clone()));
        }

        let mut source_quota = self.quota_of(source).await?;
        let mut destination_quota = self.quota_of(destination).await?;
        let initial = destination_quota;

        let context =
            CallContext::new("transfer", "quota").with_id(format!("{source}->{destination}"));
        let max_attempts = self.retry.max_attempts.max(1);
        let remote = self.remote.as_ref();
        let mut attempts = 0;

        loop {
            let Some(units) =
                units_to_move(source, source_quota, destination, destination_quota, desired)?
            else {
                if attempts == 0 {
                    tracing::debug!("Team {} already holds {} units", destination, desired);
                } else {
                    tracing::info!(
                        "Team {} reached {} units despite the failed transfer",
                        destination,
                        desired
                    );
                }
                return Ok(QuotaTransfer {
                    source: source_quota,
                    destination: destination_quota,
                    moved: destination_quota - initial,
                });
            };

            attempts += 1;
            tracing::info!(
                "Transferring {} units of quota from team {} to team {}",
                units,
                source,
                destination
            );
            let request = serde_json::json!({
                "source": source,
                "destination": destination,
                "units": units,
            })
            .to_string();

            let sent = retry::call(&RetryConfig::none(), &context, &request, move || {
                remote.transfer_quota(source, destination, units)
            })
            .await;

            match sent {
                Ok(_) => {
                    return Ok(QuotaTransfer {
                        source: self.quota_of(source).await?,
                        destination: self.quota_of(destination).await?,
                        moved: destination_quota - initial + units,
                    });
                }
                Err(ReconcileError::RetriesExhausted { code, message, .. }) => {
                    let exhausted = attempts >= max_attempts;
                    if !exhausted {
                        retry::pause(&self.retry, &context, attempts, code, &message).await;
                    }

                    // The failed attempt may have been applied anyway
                    source_quota = self.quota_of(source).await?;
                    destination_quota = self.quota_of(destination).await?;

                    if exhausted && destination_quota != desired {
                        return Err(ReconcileError::RetriesExhausted {
                            context,
                            attempts,
                            code,
                            message,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
