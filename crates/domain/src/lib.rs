// Rust guideline compliant 2026-08-21

//! Shared domain types for the safety-alert engine.
//!
//! Defines the persisted entities (`User`, `Alert`, `HelpRequest`,
//! `LocationSample`), the outbound `NotificationEvent`, the storage error
//! types, and the hexagonal port traits: `UserStore`, `AlertStore`, and
//! `HelpStore`. All engine components depend on this crate; no component
//! crate is imported here.

use chrono::{DateTime, Utc};
use geo::Coordinate;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A registered user with a last-known position.
///
/// `user_id` is phone-derived and unique; re-registration with the same
/// phone updates the record in place, never creates a duplicate. Users are
/// never deleted in normal operation.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Unique identity, derived from the phone number.
    pub user_id: String,
    /// Display name; may be empty for records created by a location upsert.
    pub name: String,
    /// Phone number; equals `user_id` by construction.
    pub phone: String,
    /// Last reported position.
    pub position: Coordinate,
    /// Reported GPS accuracy in meters; 0 when not reported.
    pub accuracy: f64,
    /// Timestamp of the last position overwrite.
    pub last_updated: DateTime<Utc>,
    /// Timestamp of first registration.
    pub registered_at: DateTime<Utc>,
    /// Inactive users are invisible to recipient search.
    pub is_active: bool,
}

/// One entry in an alert's notified-recipient list.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifiedUser {
    /// Identity of the notified user.
    pub user_id: String,
    /// Distance from the alert origin at notification time, in kilometers.
    pub distance_km: f64,
    /// When the notification was recorded.
    pub notified_at: DateTime<Utc>,
}

/// An emergency alert raised by a sender at a fixed origin.
///
/// `notified_users` is append-only and unique by `user_id` while the alert
/// is open. `accept_count` is monotonically non-decreasing and capped by the
/// dispatcher's helper limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Unique identity, time-derived (`alert_<unix-millis>`).
    pub alert_id: String,
    /// Sender display name.
    pub sender: String,
    /// Sender identity; excluded from recipient search.
    pub sender_id: String,
    /// Free-text emergency message.
    pub message: String,
    /// Alert origin.
    pub origin: Coordinate,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle flag; `false` permanently excludes the alert from matching.
    pub active: bool,
    /// Lifecycle flag; set together with `active = false` on resolve.
    pub resolved: bool,
    /// Recipients notified so far. Unique by `user_id`.
    pub notified_users: Vec<NotifiedUser>,
    /// Number of helpers who accepted. Never exceeds the helper cap.
    pub accept_count: u32,
}

impl Alert {
    /// An alert is open while it is active and not resolved. Only open
    /// alerts participate in matching, search, and accept.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active && !self.resolved
    }

    /// Whether `user_id` is already present in `notified_users`.
    #[must_use]
    pub fn was_notified(&self, user_id: &str) -> bool {
        self.notified_users.iter().any(|n| n.user_id == user_id)
    }
}

/// Lifecycle state of a help request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpStatus {
    /// Open: visible to helpers, accepting.
    NeedHelp,
    /// Terminal: the requester reported safe.
    Safe,
}

/// A request for help from nearby helpers.
///
/// Invariant: `accepted_by.len() == accepted_count as usize` and no helper
/// identity appears twice.
#[derive(Debug, Clone, PartialEq)]
pub struct HelpRequest {
    /// Unique identity (UUID v4).
    pub help_id: String,
    /// Requester phone number.
    pub phone: String,
    /// Requester position at creation time.
    pub position: Coordinate,
    /// Lifecycle state; `Safe` is terminal.
    pub status: HelpStatus,
    /// Number of distinct helpers who accepted.
    pub accepted_count: u32,
    /// Identities of accepting helpers. Unique.
    pub accepted_by: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Cleared together with the `Safe` transition.
    pub active: bool,
}

impl HelpRequest {
    /// A request is open while it needs help and is active.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active && self.status == HelpStatus::NeedHelp
    }
}

/// Immutable location-history entry. Write-only audit artifact: the engine
/// appends these on every location update and never reads them back.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    /// User the sample belongs to.
    pub user_id: String,
    /// Reported position.
    pub position: Coordinate,
    /// Reported GPS accuracy in meters.
    pub accuracy: f64,
    /// When the sample was reported.
    pub timestamp: DateTime<Utc>,
}

/// Outbound notification produced by the dedup matcher, one per newly
/// matched (user, alert) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// The matched alert.
    pub alert_id: String,
    /// Alert sender display name.
    pub sender: String,
    /// Alert message.
    pub message: String,
    /// Alert origin.
    pub origin: Coordinate,
    /// Distance from the user to the origin, in kilometers.
    pub distance_km: f64,
    /// Alert creation time (not match time).
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Backend unavailable or the operation timed out. Adapters log the
    /// underlying cause before mapping to this variant.
    #[error("storage unavailable")]
    Unavailable,
}

/// Outcome of an atomic read-modify-write on a single record.
///
/// `Rejected` carries the domain decision made inside the closure; the
/// adapter guarantees that nothing was persisted on that path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError<E> {
    /// No record with the given key exists.
    #[error("record not found")]
    NotFound,
    /// The update closure declined the mutation; the record is unchanged.
    #[error("update rejected: {0}")]
    Rejected(E),
    /// The transaction could not complete; no partial write occurred.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Hexagonal port: user records and the location-history log.
///
/// Implementations live in the binary crate (in-memory, SQLite). Engine
/// components depend exclusively on this trait -- never on an adapter.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait UserStore {
    /// All users with `is_active == true`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_active(&self) -> Result<Vec<User>, StorageError>;

    /// Look up a user by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StorageError>;

    /// Look up a user by phone number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StorageError>;

    /// Full-document upsert keyed by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the write fails.
    async fn save(&self, user: User) -> Result<(), StorageError>;

    /// Append one immutable sample to the location-history log.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the write fails.
    async fn append_history(&self, sample: LocationSample) -> Result<(), StorageError>;
}

/// Hexagonal port: alert records, including the atomic read-modify-write
/// primitive backing the dedup append and the bounded accept counter.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait AlertStore {
    /// All alerts with `active == true && resolved == false`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_open(&self) -> Result<Vec<Alert>, StorageError>;

    /// Look up an alert by `alert_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_by_id(&self, alert_id: &str) -> Result<Option<Alert>, StorageError>;

    /// Full-document upsert keyed by `alert_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the write fails.
    async fn save(&self, alert: Alert) -> Result<(), StorageError>;

    /// Atomic read-modify-write of one alert.
    ///
    /// `apply` runs with exclusive access to the record: no other update of
    /// the same `alert_id` can interleave between the read and the write.
    /// When `apply` returns `Ok`, the mutated record is persisted and the
    /// value is returned; when it returns `Err`, nothing is persisted and
    /// the rejection surfaces as [`TxError::Rejected`].
    ///
    /// # Errors
    ///
    /// [`TxError::NotFound`] when no such alert exists,
    /// [`TxError::Rejected`] when `apply` declines, or
    /// [`TxError::Storage`] when the transaction cannot complete (no
    /// partial write in that case).
    async fn update<T, E, F>(&self, alert_id: &str, apply: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&mut Alert) -> Result<T, E>;
}

/// Hexagonal port: help-request records, with the same atomic
/// read-modify-write contract as [`AlertStore::update`].
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait HelpStore {
    /// All help requests with the given status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_by_status(&self, status: HelpStatus) -> Result<Vec<HelpRequest>, StorageError>;

    /// All open requests (`NeedHelp`) for one phone number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backend cannot be read.
    async fn find_open_by_phone(&self, phone: &str) -> Result<Vec<HelpRequest>, StorageError>;

    /// Full-document upsert keyed by `help_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the write fails.
    async fn save(&self, request: HelpRequest) -> Result<(), StorageError>;

    /// Atomic read-modify-write of one help request. Same contract as
    /// [`AlertStore::update`].
    ///
    /// # Errors
    ///
    /// [`TxError::NotFound`], [`TxError::Rejected`], or [`TxError::Storage`]
    /// per the [`AlertStore::update`] contract.
    async fn update<T, E, F>(&self, help_id: &str, apply: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T, E>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
