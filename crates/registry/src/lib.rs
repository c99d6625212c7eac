// Rust guideline compliant 2026-08-21

//! Registry component -- user registration, location updates, and the
//! append-only location-history log.
//!
//! Entry points: [`Registry::register`], [`Registry::update_location`],
//! [`Registry::get_user`], [`Registry::all_users`].

use chrono::Utc;
use domain::{LocationSample, StorageError, User, UserStore};
use geo::Coordinate;

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required field is missing or a coordinate is out of range.
    /// Caller error; never retried.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// No user with the given identity exists.
    #[error("user not found: {user_id}")]
    UnknownUser {
        /// The identity that was looked up.
        user_id: String,
    },
    /// A storage read or write failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of a registration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Phone-derived identity of the registered or updated user.
    pub user_id: String,
    /// `true` when a new record was created, `false` on in-place update.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maintains user records keyed by phone-derived identity and appends every
/// location report to the history log.
///
/// Generic over the `UserStore` port for zero-cost static dispatch. Holds no
/// adapter references -- the store is injected per call.
#[derive(Debug)]
pub struct Registry;

/// Reject coordinates outside the valid latitude/longitude ranges.
fn check_coordinate(position: Coordinate) -> Result<(), RegistryError> {
    if !(-90.0..=90.0).contains(&position.latitude) {
        return Err(RegistryError::InvalidRequest {
            reason: format!("latitude out of range: {}", position.latitude),
        });
    }
    if !(-180.0..=180.0).contains(&position.longitude) {
        return Err(RegistryError::InvalidRequest {
            reason: format!("longitude out of range: {}", position.longitude),
        });
    }
    Ok(())
}

impl Registry {
    /// Create a new registry component.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Register a user, or update an existing one with the same phone.
    ///
    /// Identity is phone-derived: re-registration overwrites name and
    /// position in place and never creates a duplicate record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRequest`] for an empty phone or an
    /// out-of-range coordinate, or [`RegistryError::Storage`] on a failed
    /// read or write.
    pub async fn register<U: UserStore>(
        &self,
        users: &U,
        phone: &str,
        name: &str,
        position: Coordinate,
    ) -> Result<Registration, RegistryError> {
        if phone.is_empty() {
            return Err(RegistryError::InvalidRequest { reason: "phone is required".to_owned() });
        }
        check_coordinate(position)?;

        let now = Utc::now();
        if let Some(mut user) = users.find_by_phone(phone).await? {
            user.name = name.to_owned();
            user.position = position;
            user.last_updated = now;
            let user_id = user.user_id.clone();
            users.save(user).await?;
            tracing::info!(phone, "registry.user.updated");
            return Ok(Registration { user_id, created: false });
        }

        let user = User {
            user_id: phone.to_owned(),
            name: name.to_owned(),
            phone: phone.to_owned(),
            position,
            accuracy: 0.0,
            last_updated: now,
            registered_at: now,
            is_active: true,
        };
        users.save(user).await?;
        tracing::info!(phone, "registry.user.registered");
        Ok(Registration { user_id: phone.to_owned(), created: true })
    }

    /// Overwrite a user's position and append a history sample.
    ///
    /// The position fields are fully overwritten, never merged. Unknown ids
    /// are upserted as minimal records (phone = id, empty name), matching
    /// the upsert semantics of the location endpoint. The history append is
    /// best-effort: a failure there is logged and swallowed so the position
    /// update itself still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRequest`] for an empty id or an
    /// out-of-range coordinate, or [`RegistryError::Storage`] when the user
    /// record cannot be read or written.
    pub async fn update_location<U: UserStore>(
        &self,
        users: &U,
        user_id: &str,
        position: Coordinate,
        accuracy: Option<f64>,
    ) -> Result<User, RegistryError> {
        if user_id.is_empty() {
            return Err(RegistryError::InvalidRequest { reason: "user_id is required".to_owned() });
        }
        check_coordinate(position)?;

        let now = Utc::now();
        let accuracy = accuracy.unwrap_or(0.0);

        let mut user = users.find_by_id(user_id).await?.unwrap_or_else(|| User {
            user_id: user_id.to_owned(),
            name: String::new(),
            phone: user_id.to_owned(),
            position,
            accuracy,
            last_updated: now,
            registered_at: now,
            is_active: true,
        });
        user.position = position;
        user.accuracy = accuracy;
        user.last_updated = now;
        users.save(user.clone()).await?;

        let sample = LocationSample { user_id: user_id.to_owned(), position, accuracy, timestamp: now };
        if let Err(e) = users.append_history(sample).await {
            // Audit trail is best-effort; the position update stands.
            tracing::warn!(user_id, error = %e, "registry.history.append_failed");
        }

        tracing::debug!(user_id, lat = position.latitude, lon = position.longitude, "registry.location.updated");
        Ok(user)
    }

    /// Look up one user by identity.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownUser`] when absent, or
    /// [`RegistryError::Storage`] on a failed read.
    pub async fn get_user<U: UserStore>(&self, users: &U, user_id: &str) -> Result<User, RegistryError> {
        users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| RegistryError::UnknownUser { user_id: user_id.to_owned() })
    }

    /// All active users. Diagnostic listing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] on a failed read.
    pub async fn all_users<U: UserStore>(&self, users: &U) -> Result<Vec<User>, RegistryError> {
        Ok(users.find_active().await?)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{Registration, Registry, RegistryError};
    use domain::{LocationSample, StorageError, User, UserStore};
    use geo::Coordinate;
    use std::cell::RefCell;

    // ------------------------------------------------------------------
    // Mock store
    // ------------------------------------------------------------------

    struct MockUserStore {
        users: RefCell<Vec<User>>,
        history: RefCell<Vec<LocationSample>>,
        fail_history: bool,
    }

    impl MockUserStore {
        fn new() -> Self {
            Self { users: RefCell::new(vec![]), history: RefCell::new(vec![]), fail_history: false }
        }
    }

    impl UserStore for MockUserStore {
        async fn find_active(&self) -> Result<Vec<User>, StorageError> {
            Ok(self.users.borrow().iter().filter(|u| u.is_active).cloned().collect())
        }

        async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StorageError> {
            Ok(self.users.borrow().iter().find(|u| u.user_id == user_id).cloned())
        }

        async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StorageError> {
            Ok(self.users.borrow().iter().find(|u| u.phone == phone).cloned())
        }

        async fn save(&self, user: User) -> Result<(), StorageError> {
            let mut users = self.users.borrow_mut();
            match users.iter_mut().find(|u| u.user_id == user.user_id) {
                Some(existing) => *existing = user,
                None => users.push(user),
            }
            Ok(())
        }

        async fn append_history(&self, sample: LocationSample) -> Result<(), StorageError> {
            if self.fail_history {
                return Err(StorageError::Unavailable);
            }
            self.history.borrow_mut().push(sample);
            Ok(())
        }
    }

    // REG-T01: first registration creates a phone-derived record.
    #[tokio::test]
    async fn register_creates_user() {
        let store = MockUserStore::new();
        let registry = Registry::new();

        let reg = registry
            .register(&store, "555-0100", "Alice", Coordinate::new(1.0, 2.0))
            .await
            .unwrap();
        assert_eq!(reg, Registration { user_id: "555-0100".to_owned(), created: true });

        let users = store.users.borrow();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "555-0100");
        assert_eq!(users[0].phone, "555-0100");
        assert!(users[0].is_active);
    }

    // REG-T02: re-registration with the same phone updates in place.
    #[tokio::test]
    async fn register_twice_never_duplicates() {
        let store = MockUserStore::new();
        let registry = Registry::new();

        registry.register(&store, "555-0100", "Alice", Coordinate::new(1.0, 2.0)).await.unwrap();
        let reg = registry
            .register(&store, "555-0100", "Alice B.", Coordinate::new(3.0, 4.0))
            .await
            .unwrap();
        assert!(!reg.created);

        let users = store.users.borrow();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Alice B.");
        assert_eq!(users[0].position, Coordinate::new(3.0, 4.0));
    }

    // REG-T03: empty phone and out-of-range coordinates are caller errors.
    #[tokio::test]
    async fn register_validation() {
        let store = MockUserStore::new();
        let registry = Registry::new();

        let empty = registry.register(&store, "", "Alice", Coordinate::new(0.0, 0.0)).await;
        assert!(matches!(empty, Err(RegistryError::InvalidRequest { .. })));

        let bad_lat = registry.register(&store, "555-0100", "Alice", Coordinate::new(91.0, 0.0)).await;
        assert!(matches!(bad_lat, Err(RegistryError::InvalidRequest { .. })));

        let bad_lon = registry.register(&store, "555-0100", "Alice", Coordinate::new(0.0, -181.0)).await;
        assert!(matches!(bad_lon, Err(RegistryError::InvalidRequest { .. })));
        assert!(store.users.borrow().is_empty());
    }

    // REG-T04: location update overwrites position fields and appends history.
    #[tokio::test]
    async fn update_location_overwrites_and_logs() {
        let store = MockUserStore::new();
        let registry = Registry::new();
        registry.register(&store, "555-0100", "Alice", Coordinate::new(1.0, 2.0)).await.unwrap();

        let user = registry
            .update_location(&store, "555-0100", Coordinate::new(5.0, 6.0), Some(12.5))
            .await
            .unwrap();
        assert_eq!(user.position, Coordinate::new(5.0, 6.0));
        assert!((user.accuracy - 12.5).abs() < f64::EPSILON);

        let history = store.history.borrow();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, "555-0100");
        assert_eq!(history[0].position, Coordinate::new(5.0, 6.0));
    }

    // REG-T05: unknown user_id is upserted as a minimal record.
    #[tokio::test]
    async fn update_location_upserts_unknown_id() {
        let store = MockUserStore::new();
        let registry = Registry::new();

        let user = registry
            .update_location(&store, "555-0199", Coordinate::new(1.0, 1.0), None)
            .await
            .unwrap();
        assert_eq!(user.user_id, "555-0199");
        assert_eq!(user.phone, "555-0199");
        assert!(user.name.is_empty());
        assert_eq!(store.users.borrow().len(), 1);
    }

    // REG-T06: a history-append failure is swallowed; the update succeeds.
    #[tokio::test]
    async fn history_failure_does_not_fail_update() {
        let mut store = MockUserStore::new();
        store.fail_history = true;
        let registry = Registry::new();

        let user = registry
            .update_location(&store, "555-0100", Coordinate::new(1.0, 1.0), None)
            .await
            .unwrap();
        assert_eq!(user.position, Coordinate::new(1.0, 1.0));
        assert!(store.history.borrow().is_empty());
    }

    // REG-T07: get_user surfaces UnknownUser for missing ids.
    #[tokio::test]
    async fn get_user_unknown() {
        let store = MockUserStore::new();
        let registry = Registry::new();

        let result = registry.get_user(&store, "nobody").await;
        assert!(matches!(result, Err(RegistryError::UnknownUser { ref user_id }) if user_id == "nobody"));
    }
}
