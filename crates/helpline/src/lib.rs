// Rust guideline compliant 2026-08-21

//! Helpline component -- help-request lifecycle: creation, nearby lookup
//! for helpers, capped dedup acceptance, and the mark-safe transition.
//!
//! Entry points: [`Helpline::create_request`], [`Helpline::nearby_requests`],
//! [`Helpline::accept`], [`Helpline::mark_safe`]. Configuration via
//! [`HelplineConfig::builder`].

use chrono::Utc;
use domain::{HelpRequest, HelpStatus, HelpStore, StorageError, TxError};
use geo::{Coordinate, distance_km};
use std::convert::Infallible;

// ---------------------------------------------------------------------------
// HelplineError
// ---------------------------------------------------------------------------

/// Errors that can occur during help-request operations.
#[derive(Debug, thiserror::Error)]
pub enum HelplineError {
    /// The supplied configuration is invalid.
    #[error("invalid helpline configuration: {reason}")]
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
    /// No help request with the given identity exists.
    #[error("help request not found: {help_id}")]
    NotFound {
        /// The identity that was looked up.
        help_id: String,
    },
    /// The request is no longer open (marked safe).
    #[error("help request closed: {help_id}")]
    RequestClosed {
        /// The closed request.
        help_id: String,
    },
    /// This helper already accepted the request.
    #[error("helper already accepted: {helper_id}")]
    AlreadyAccepted {
        /// The duplicate helper identity.
        helper_id: String,
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
// HelplineConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Helpline`].
///
/// Construct via [`HelplineConfig::builder`].
#[derive(Debug)]
pub struct HelplineConfig {
    /// Radius within which helpers see open requests, in kilometers.
    pub search_radius_km: f64,
    /// Hard cap on accepting helpers per request.
    pub max_helpers: u32,
}

/// Builder for [`HelplineConfig`].
///
/// Obtain via [`HelplineConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct HelplineConfigBuilder {
    search_radius_km: f64,
    max_helpers: u32,
}

impl HelplineConfig {
    /// Create a builder with the production defaults: 2 km helper radius,
    /// cap of 10 helpers.
    #[must_use]
    pub fn builder() -> HelplineConfigBuilder {
        HelplineConfigBuilder { search_radius_km: 2.0, max_helpers: 10 }
    }
}

impl HelplineConfigBuilder {
    /// Override the helper search radius.
    #[must_use]
    pub fn search_radius_km(mut self, km: f64) -> Self {
        self.search_radius_km = km;
        self
    }

    /// Override the helper cap.
    #[must_use]
    pub fn max_helpers(mut self, cap: u32) -> Self {
        self.max_helpers = cap;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HelplineError::InvalidConfig`] when the radius is not
    /// strictly positive or the cap is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<HelplineConfig, HelplineError> {
        if self.search_radius_km <= 0.0 {
            return Err(HelplineError::InvalidConfig {
                reason: "search_radius_km must be > 0".to_owned(),
            });
        }
        if self.max_helpers == 0 {
            return Err(HelplineError::InvalidConfig {
                reason: "max_helpers must be >= 1".to_owned(),
            });
        }
        Ok(HelplineConfig {
            search_radius_km: self.search_radius_km,
            max_helpers: self.max_helpers,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpline
// ---------------------------------------------------------------------------

/// An open help request as seen by a prospective helper.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    /// Identity of the request.
    pub help_id: String,
    /// Requester position.
    pub position: Coordinate,
    /// Distance from the helper to the requester, in kilometers.
    pub distance_km: f64,
}

/// Rejection reasons inside the atomic accept unit.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptReject {
    Closed,
    Duplicate,
    AtCapacity,
}

/// Routes help requests to a bounded set of nearby helpers.
///
/// Unlike the dispatcher's public alert counter, acceptance here carries a
/// helper identity and deduplicates by it: `accepted_by` and
/// `accepted_count` always agree.
#[derive(Debug)]
pub struct Helpline {
    config: HelplineConfig,
}

impl Helpline {
    /// Create a new helpline component from `config`.
    #[must_use]
    pub fn new(config: HelplineConfig) -> Self {
        Self { config }
    }

    /// Create an open help request for `phone` at `position`.
    ///
    /// Returns the generated request identity (UUID v4).
    ///
    /// # Errors
    ///
    /// Returns [`HelplineError::InvalidRequest`] for an empty phone or an
    /// out-of-range coordinate, or [`HelplineError::Storage`] on a failed
    /// write.
    pub async fn create_request<H: HelpStore>(
        &self,
        store: &H,
        phone: &str,
        position: Coordinate,
    ) -> Result<String, HelplineError> {
        if phone.is_empty() {
            return Err(HelplineError::InvalidRequest { reason: "phone is required".to_owned() });
        }
        if !(-90.0..=90.0).contains(&position.latitude)
            || !(-180.0..=180.0).contains(&position.longitude)
        {
            return Err(HelplineError::InvalidRequest {
                reason: "position coordinate out of range".to_owned(),
            });
        }

        let help_id = uuid::Uuid::new_v4().to_string();
        let request = HelpRequest {
            help_id: help_id.clone(),
            phone: phone.to_owned(),
            position,
            status: HelpStatus::NeedHelp,
            accepted_count: 0,
            accepted_by: vec![],
            created_at: Utc::now(),
            active: true,
        };
        store.save(request).await?;
        tracing::info!(help_id = %help_id, phone, "helpline.request.created");
        Ok(help_id)
    }

    /// Open requests visible to a helper at `position`.
    ///
    /// Filters out requests at the helper cap, requests this helper already
    /// accepted, and requests farther than the search radius. Scan order is
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns [`HelplineError::Storage`] on a failed read.
    pub async fn nearby_requests<H: HelpStore>(
        &self,
        store: &H,
        position: Coordinate,
        helper_id: &str,
    ) -> Result<Vec<OpenRequest>, HelplineError> {
        let open = store.find_by_status(HelpStatus::NeedHelp).await?;
        let result: Vec<OpenRequest> = open
            .into_iter()
            .filter(|r| r.accepted_count < self.config.max_helpers)
            .filter(|r| !r.accepted_by.iter().any(|h| h == helper_id))
            .filter_map(|r| {
                let d = distance_km(position, r.position);
                (d <= self.config.search_radius_km).then(|| OpenRequest {
                    help_id: r.help_id,
                    position: r.position,
                    distance_km: d,
                })
            })
            .collect();
        Ok(result)
    }

    /// Accept a help request as `helper_id`.
    ///
    /// One atomic unit: the open check, the duplicate check, the cap check,
    /// and the increment happen with exclusive access to the record, so
    /// `accepted_by.len() == accepted_count` holds under any interleaving
    /// and the cap is never exceeded.
    ///
    /// # Errors
    ///
    /// Returns [`HelplineError::NotFound`] for an unknown id,
    /// [`HelplineError::RequestClosed`] once marked safe,
    /// [`HelplineError::AlreadyAccepted`] for a duplicate helper,
    /// [`HelplineError::CapacityExceeded`] at the cap (count unchanged), or
    /// [`HelplineError::Storage`] when the atomic unit aborts.
    pub async fn accept<H: HelpStore>(
        &self,
        store: &H,
        help_id: &str,
        helper_id: &str,
    ) -> Result<u32, HelplineError> {
        if helper_id.is_empty() {
            return Err(HelplineError::InvalidRequest {
                reason: "helper_id is required".to_owned(),
            });
        }
        let cap = self.config.max_helpers;
        let count = store
            .update(help_id, |r| {
                if !r.is_open() {
                    return Err(AcceptReject::Closed);
                }
                if r.accepted_by.iter().any(|h| h == helper_id) {
                    return Err(AcceptReject::Duplicate);
                }
                if r.accepted_count >= cap {
                    return Err(AcceptReject::AtCapacity);
                }
                r.accepted_by.push(helper_id.to_owned());
                r.accepted_count += 1;
                Ok(r.accepted_count)
            })
            .await
            .map_err(|e| match e {
                TxError::NotFound => HelplineError::NotFound { help_id: help_id.to_owned() },
                TxError::Rejected(AcceptReject::Closed) => {
                    HelplineError::RequestClosed { help_id: help_id.to_owned() }
                }
                TxError::Rejected(AcceptReject::Duplicate) => {
                    HelplineError::AlreadyAccepted { helper_id: helper_id.to_owned() }
                }
                TxError::Rejected(AcceptReject::AtCapacity) => {
                    HelplineError::CapacityExceeded { cap }
                }
                TxError::Storage(s) => HelplineError::Storage(s),
            })?;
        tracing::info!(help_id, helper_id, accepted_count = count, "helpline.request.accepted");
        Ok(count)
    }

    /// Mark every open request for `phone` as safe.
    ///
    /// The terminal `NeedHelp -> Safe` transition, applied to all open
    /// requests for the phone, one single-record write each. Returns the
    /// number of requests transitioned; zero matches is a success.
    ///
    /// # Errors
    ///
    /// Returns [`HelplineError::InvalidRequest`] for an empty phone, or
    /// [`HelplineError::Storage`] on a failed read or write.
    pub async fn mark_safe<H: HelpStore>(
        &self,
        store: &H,
        phone: &str,
    ) -> Result<usize, HelplineError> {
        if phone.is_empty() {
            return Err(HelplineError::InvalidRequest { reason: "phone is required".to_owned() });
        }
        let open = store.find_open_by_phone(phone).await?;
        let mut transitioned = 0;
        for request in open {
            let result = store
                .update(&request.help_id, |r| {
                    r.status = HelpStatus::Safe;
                    r.active = false;
                    Ok::<(), Infallible>(())
                })
                .await;
            match result {
                Ok(()) => transitioned += 1,
                // Deleted between the scan and the write: nothing to do.
                Err(TxError::NotFound) => {}
                Err(TxError::Rejected(never)) => match never {},
                Err(TxError::Storage(s)) => return Err(HelplineError::Storage(s)),
            }
        }
        tracing::info!(phone, transitioned, "helpline.marked_safe");
        Ok(transitioned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
