// Rust guideline compliant 2026-08-21

//! Dispatch component -- alert creation with expanding-radius recipient
//! search, the bounded accept counter, and the alert lifecycle.
//!
//! Entry points: [`Dispatcher::create_alert`], [`Dispatcher::find_recipients`],
//! [`Dispatcher::accept`], [`Dispatcher::resolve`], [`Dispatcher::active_alerts`].
//! Configuration via [`DispatchConfig::builder`].

use chrono::Utc;
use domain::{Alert, AlertStore, NotifiedUser, StorageError, TxError, UserStore};
use geo::{Coordinate, distance_km};
use std::convert::Infallible;

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Errors that can occur during alert dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The supplied configuration is invalid.
    #[error("invalid dispatch configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// A required field is missing or a coordinate is out of range.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// No alert with the given identity exists.
    #[error("alert not found: {alert_id}")]
    NotFound {
        /// The identity that was looked up.
        alert_id: String,
    },
    /// The alert has been resolved; it no longer accepts helpers.
    #[error("alert closed: {alert_id}")]
    AlertClosed {
        /// The resolved alert.
        alert_id: String,
    },
    /// The helper cap was reached; the count is unchanged.
    #[error("helper capacity reached (cap: {cap})")]
    CapacityExceeded {
        /// The configured helper cap.
        cap: u32,
    },
    /// A storage read or write failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// DispatchConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Dispatcher`].
///
/// Construct via [`DispatchConfig::builder`].
#[derive(Debug)]
pub struct DispatchConfig {
    /// First search radius, in kilometers.
    pub start_radius_km: f64,
    /// Radius growth per search pass, in kilometers.
    pub radius_step_km: f64,
    /// Search ceiling, in kilometers.
    pub max_radius_km: f64,
    /// Minimum recipient count that stops the search early.
    pub quorum: usize,
    /// Hard cap on the accept counter.
    pub max_helpers: u32,
    /// Maximum rows returned by the active-alert listing.
    pub listing_limit: usize,
}

/// Builder for [`DispatchConfig`].
///
/// Obtain via [`DispatchConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct DispatchConfigBuilder {
    start_radius_km: f64,
    radius_step_km: f64,
    max_radius_km: f64,
    quorum: usize,
    max_helpers: u32,
    listing_limit: usize,
}

impl DispatchConfig {
    /// Create a builder with the production defaults: search 2 km to 10 km
    /// in 1 km steps, quorum of 3 recipients, cap of 10 helpers, listing
    /// limit of 20.
    #[must_use]
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder {
            start_radius_km: 2.0,
            radius_step_km: 1.0,
            max_radius_km: 10.0,
            quorum: 3,
            max_helpers: 10,
            listing_limit: 20,
        }
    }
}

impl DispatchConfigBuilder {
    /// Override the first search radius.
    #[must_use]
    pub fn start_radius_km(mut self, km: f64) -> Self {
        self.start_radius_km = km;
        self
    }

    /// Override the per-pass radius growth.
    #[must_use]
    pub fn radius_step_km(mut self, km: f64) -> Self {
        self.radius_step_km = km;
        self
    }

    /// Override the search ceiling.
    #[must_use]
    pub fn max_radius_km(mut self, km: f64) -> Self {
        self.max_radius_km = km;
        self
    }

    /// Override the recipient quorum.
    #[must_use]
    pub fn quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    /// Override the helper cap.
    #[must_use]
    pub fn max_helpers(mut self, cap: u32) -> Self {
        self.max_helpers = cap;
        self
    }

    /// Override the active-alert listing limit.
    #[must_use]
    pub fn listing_limit(mut self, limit: usize) -> Self {
        self.listing_limit = limit;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when a radius or the step is
    /// not strictly positive, the ceiling is below the start radius, or the
    /// quorum/cap is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<DispatchConfig, DispatchError> {
        if self.start_radius_km <= 0.0 || self.radius_step_km <= 0.0 {
            return Err(DispatchError::InvalidConfig {
                reason: "start_radius_km and radius_step_km must be > 0".to_owned(),
            });
        }
        if self.max_radius_km < self.start_radius_km {
            return Err(DispatchError::InvalidConfig {
                reason: "max_radius_km must be >= start_radius_km".to_owned(),
            });
        }
        if self.quorum == 0 {
            return Err(DispatchError::InvalidConfig { reason: "quorum must be >= 1".to_owned() });
        }
        if self.max_helpers == 0 {
            return Err(DispatchError::InvalidConfig {
                reason: "max_helpers must be >= 1".to_owned(),
            });
        }
        Ok(DispatchConfig {
            start_radius_km: self.start_radius_km,
            radius_step_km: self.radius_step_km,
            max_radius_km: self.max_radius_km,
            quorum: self.quorum,
            max_helpers: self.max_helpers,
            listing_limit: self.listing_limit,
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// A recipient selected by the expanding-radius search.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Recipient identity.
    pub user_id: String,
    /// Recipient display name.
    pub name: String,
    /// Recipient phone number.
    pub phone: String,
    /// Distance from the alert origin, in kilometers.
    pub distance_km: f64,
}

/// Result of creating an alert: identity, selected recipients, and the
/// radius at which the search stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Identity of the created alert.
    pub alert_id: String,
    /// Recipients sorted ascending by distance.
    pub recipients: Vec<Recipient>,
    /// Radius at which the search terminated, in kilometers.
    pub radius_km: f64,
}

/// Rejection reasons inside the atomic accept unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptReject {
    Closed,
    AtCapacity,
}

/// Creates alerts, selects nearby recipients, and maintains the bounded
/// accept counter and lifecycle state.
///
/// Generic over the storage ports for zero-cost static dispatch; stores are
/// injected per call.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a new dispatcher from `config`.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Create an alert and select its initial recipients.
    ///
    /// The alert is persisted first, then the expanding-radius search runs,
    /// and the resulting recipient list is written onto the alert as one
    /// bulk overwrite -- deliberately distinct from the matcher's
    /// dedup-append, which takes over for later location updates.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidRequest`] for missing fields or an
    /// out-of-range origin, or [`DispatchError::Storage`] on a failed read
    /// or write.
    pub async fn create_alert<A: AlertStore, U: UserStore>(
        &self,
        alerts: &A,
        users: &U,
        sender: &str,
        sender_id: &str,
        message: &str,
        origin: Coordinate,
    ) -> Result<DispatchOutcome, DispatchError> {
        if sender.is_empty() || sender_id.is_empty() {
            return Err(DispatchError::InvalidRequest {
                reason: "sender and sender_id are required".to_owned(),
            });
        }
        if message.is_empty() {
            return Err(DispatchError::InvalidRequest {
                reason: "message is required".to_owned(),
            });
        }
        if !(-90.0..=90.0).contains(&origin.latitude)
            || !(-180.0..=180.0).contains(&origin.longitude)
        {
            return Err(DispatchError::InvalidRequest {
                reason: "origin coordinate out of range".to_owned(),
            });
        }

        let now = Utc::now();
        let alert_id = format!("alert_{}", now.timestamp_millis());
        let alert = Alert {
            alert_id: alert_id.clone(),
            sender: sender.to_owned(),
            sender_id: sender_id.to_owned(),
            message: message.to_owned(),
            origin,
            timestamp: now,
            active: true,
            resolved: false,
            notified_users: vec![],
            accept_count: 0,
        };
        alerts.save(alert).await?;
        tracing::info!(alert_id = %alert_id, sender_id, "dispatch.alert.created");

        let (recipients, radius_km) = self.find_recipients(users, origin, sender_id).await?;

        // Bulk overwrite of the initial recipient list, stamped now.
        let entries: Vec<NotifiedUser> = recipients
            .iter()
            .map(|r| NotifiedUser {
                user_id: r.user_id.clone(),
                distance_km: r.distance_km,
                notified_at: Utc::now(),
            })
            .collect();
        alerts
            .update(&alert_id, move |a| {
                a.notified_users = entries;
                Ok::<(), Infallible>(())
            })
            .await
            .map_err(|e| match e {
                TxError::NotFound => DispatchError::NotFound { alert_id: alert_id.clone() },
                TxError::Rejected(never) => match never {},
                TxError::Storage(s) => DispatchError::Storage(s),
            })?;

        tracing::info!(
            alert_id = %alert_id,
            recipients = recipients.len(),
            radius_km,
            "dispatch.recipients.selected"
        );
        Ok(DispatchOutcome { alert_id, recipients, radius_km })
    }

    /// Expanding-radius recipient search.
    ///
    /// Starts at the configured radius and widens by the step until at
    /// least `quorum` recipients are inside, or the ceiling is reached.
    /// Each pass re-fetches the full active-user set -- a full rescan keeps
    /// the loop trivially correct. Falling short of the quorum at the
    /// ceiling is a degraded-coverage result, not an error: whatever was
    /// found (possibly nothing) is returned with the final radius.
    ///
    /// Recipients are sorted ascending by distance; equal distances keep
    /// the original scan order (stable sort) so output is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Storage`] when the active-user fetch fails.
    pub async fn find_recipients<U: UserStore>(
        &self,
        users: &U,
        origin: Coordinate,
        exclude_user_id: &str,
    ) -> Result<(Vec<Recipient>, f64), DispatchError> {
        let mut radius_km = self.config.start_radius_km;
        loop {
            let active = users.find_active().await?;
            let mut found: Vec<Recipient> = active
                .into_iter()
                .filter(|u| u.user_id != exclude_user_id)
                .filter_map(|u| {
                    let d = distance_km(origin, u.position);
                    (d <= radius_km).then(|| Recipient {
                        user_id: u.user_id,
                        name: u.name,
                        phone: u.phone,
                        distance_km: d,
                    })
                })
                .collect();
            found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

            tracing::debug!(radius_km, found = found.len(), "dispatch.search.pass");
            if found.len() >= self.config.quorum || radius_km >= self.config.max_radius_km {
                return Ok((found, radius_km));
            }
            radius_km = (radius_km + self.config.radius_step_km).min(self.config.max_radius_km);
        }
    }

    /// Accept an alert, incrementing the bounded counter.
    ///
    /// The read, the cap check, and the write happen inside one atomic unit
    /// on the store, so concurrent acceptances can never both observe the
    /// same pre-increment value and push past the cap.
    ///
    /// This is a plain public counter: it carries no acceptor identity and
    /// does not deduplicate callers. The helper flow with per-identity
    /// dedup lives in the helpline component.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown id,
    /// [`DispatchError::AlertClosed`] once the alert is resolved,
    /// [`DispatchError::CapacityExceeded`] at the cap (count unchanged), or
    /// [`DispatchError::Storage`] when the atomic unit aborts.
    pub async fn accept<A: AlertStore>(
        &self,
        alerts: &A,
        alert_id: &str,
    ) -> Result<u32, DispatchError> {
        let cap = self.config.max_helpers;
        let count = alerts
            .update(alert_id, |a| {
                if !a.is_open() {
                    return Err(AcceptReject::Closed);
                }
                if a.accept_count >= cap {
                    return Err(AcceptReject::AtCapacity);
                }
                a.accept_count += 1;
                Ok(a.accept_count)
            })
            .await
            .map_err(|e| match e {
                TxError::NotFound => DispatchError::NotFound { alert_id: alert_id.to_owned() },
                TxError::Rejected(AcceptReject::Closed) => {
                    DispatchError::AlertClosed { alert_id: alert_id.to_owned() }
                }
                TxError::Rejected(AcceptReject::AtCapacity) => {
                    DispatchError::CapacityExceeded { cap }
                }
                TxError::Storage(s) => DispatchError::Storage(s),
            })?;
        tracing::info!(alert_id, accept_count = count, "dispatch.alert.accepted");
        Ok(count)
    }

    /// Current accept count of an alert.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown id, or
    /// [`DispatchError::Storage`] on a failed read.
    pub async fn accept_count<A: AlertStore>(
        &self,
        alerts: &A,
        alert_id: &str,
    ) -> Result<u32, DispatchError> {
        let alert = alerts
            .find_by_id(alert_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound { alert_id: alert_id.to_owned() })?;
        Ok(alert.accept_count)
    }

    /// Resolve an alert: the terminal OPEN -> RESOLVED transition.
    ///
    /// Runs inside the atomic unit, so a concurrent match or accept either
    /// completes before the resolve or observes the closed state. There is
    /// no path back to open. Resolving an already-resolved alert succeeds
    /// (last-write-wins).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown id, or
    /// [`DispatchError::Storage`] when the atomic unit aborts.
    pub async fn resolve<A: AlertStore>(
        &self,
        alerts: &A,
        alert_id: &str,
    ) -> Result<(), DispatchError> {
        alerts
            .update(alert_id, |a| {
                a.resolved = true;
                a.active = false;
                Ok::<(), Infallible>(())
            })
            .await
            .map_err(|e| match e {
                TxError::NotFound => DispatchError::NotFound { alert_id: alert_id.to_owned() },
                TxError::Rejected(never) => match never {},
                TxError::Storage(s) => DispatchError::Storage(s),
            })?;
        tracing::info!(alert_id, "dispatch.alert.resolved");
        Ok(())
    }

    /// Open alerts, newest first, capped at the configured listing limit.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Storage`] on a failed read.
    pub async fn active_alerts<A: AlertStore>(&self, alerts: &A) -> Result<Vec<Alert>, DispatchError> {
        let mut open = alerts.find_open().await?;
        open.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        open.truncate(self.config.listing_limit);
        Ok(open)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
