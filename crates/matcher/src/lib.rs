// Rust guideline compliant 2026-08-21

//! Notification dedup matcher -- matches a user's position against all open
//! alerts and notifies each (user, alert) pair at most once.
//!
//! Entry points: [`Matcher::match_and_notify`], [`Matcher::nearby_alerts`].
//! Configuration via [`MatcherConfig::builder`].

use chrono::Utc;
use domain::{Alert, AlertStore, NotificationEvent, NotifiedUser, StorageError, TxError, UserStore};
use geo::{Coordinate, distance_km};

// ---------------------------------------------------------------------------
// MatchError
// ---------------------------------------------------------------------------

/// Errors that can occur during alert matching.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The supplied configuration is invalid.
    #[error("invalid matcher configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// No user with the given identity exists.
    #[error("user not found: {user_id}")]
    UnknownUser {
        /// The identity that was looked up.
        user_id: String,
    },
    /// The initial alert fetch failed before any match was computed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// MatcherConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Matcher`].
///
/// Construct via [`MatcherConfig::builder`].
#[derive(Debug)]
pub struct MatcherConfig {
    /// Matching radius for notifications, in kilometers.
    pub nearby_radius_km: f64,
    /// Listing radius for the per-user nearby-alerts query, in kilometers.
    pub listing_radius_km: f64,
}

/// Builder for [`MatcherConfig`].
///
/// Obtain via [`MatcherConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct MatcherConfigBuilder {
    nearby_radius_km: f64,
    listing_radius_km: f64,
}

impl MatcherConfig {
    /// Create a builder with the production defaults: notify within 5 km,
    /// list within 10 km.
    #[must_use]
    pub fn builder() -> MatcherConfigBuilder {
        MatcherConfigBuilder { nearby_radius_km: 5.0, listing_radius_km: 10.0 }
    }
}

impl MatcherConfigBuilder {
    /// Override the notification radius.
    #[must_use]
    pub fn nearby_radius_km(mut self, km: f64) -> Self {
        self.nearby_radius_km = km;
        self
    }

    /// Override the listing radius.
    #[must_use]
    pub fn listing_radius_km(mut self, km: f64) -> Self {
        self.listing_radius_km = km;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidConfig`] when either radius is not
    /// strictly positive.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<MatcherConfig, MatchError> {
        if self.nearby_radius_km <= 0.0 {
            return Err(MatchError::InvalidConfig {
                reason: "nearby_radius_km must be > 0".to_owned(),
            });
        }
        if self.listing_radius_km <= 0.0 {
            return Err(MatchError::InvalidConfig {
                reason: "listing_radius_km must be > 0".to_owned(),
            });
        }
        Ok(MatcherConfig {
            nearby_radius_km: self.nearby_radius_km,
            listing_radius_km: self.listing_radius_km,
        })
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// An open alert paired with its distance from the queried user.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertAtDistance {
    /// The open alert.
    pub alert: Alert,
    /// Distance from the user to the alert origin, in kilometers.
    pub distance_km: f64,
}

/// Reason the append-if-absent closure declined a match. Internal to the
/// matcher; both reasons mean "skip without mutation".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    AlreadyNotified,
    Closed,
}

/// Matches location updates against open alerts, recording each (user,
/// alert) notification exactly once.
///
/// Generic over the storage ports for zero-cost static dispatch; stores are
/// injected per call.
#[derive(Debug)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    /// Create a new matcher from `config`.
    #[must_use]
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Match `position` against all open alerts and record one notification
    /// per newly matched alert.
    ///
    /// Each in-radius alert goes through an atomic append-if-absent on the
    /// store: the closure re-checks open state and membership so two
    /// concurrent updates from the same user cannot double-append. One
    /// write per match, never batched.
    ///
    /// Fail-open by design: a per-alert persistence failure is logged and
    /// the scan continues -- events recorded so far are always returned.
    /// Missing a safety notification is worse than a partial result.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Storage`] only when the initial open-alert
    /// fetch fails, i.e. before any progress was made.
    pub async fn match_and_notify<A: AlertStore>(
        &self,
        alerts: &A,
        user_id: &str,
        position: Coordinate,
    ) -> Result<Vec<NotificationEvent>, MatchError> {
        let open = alerts.find_open().await?;
        tracing::debug!(user_id, open_alerts = open.len(), "matcher.scan.start");

        let mut events: Vec<NotificationEvent> = vec![];
        for alert in open {
            let d = distance_km(position, alert.origin);
            if d > self.config.nearby_radius_km {
                continue;
            }

            let appended = alerts
                .update(&alert.alert_id, |a| {
                    // Re-check under the atomic unit: the alert may have been
                    // resolved or this user notified since the scan read it.
                    if !a.is_open() {
                        return Err(Skip::Closed);
                    }
                    if a.was_notified(user_id) {
                        return Err(Skip::AlreadyNotified);
                    }
                    a.notified_users.push(NotifiedUser {
                        user_id: user_id.to_owned(),
                        distance_km: d,
                        notified_at: Utc::now(),
                    });
                    Ok(NotificationEvent {
                        alert_id: a.alert_id.clone(),
                        sender: a.sender.clone(),
                        message: a.message.clone(),
                        origin: a.origin,
                        distance_km: d,
                        timestamp: a.timestamp,
                    })
                })
                .await;

            match appended {
                Ok(event) => {
                    tracing::info!(
                        user_id,
                        alert_id = %event.alert_id,
                        distance_km = event.distance_km,
                        "matcher.notified"
                    );
                    events.push(event);
                }
                // Already notified or closed concurrently: skip, no mutation.
                Err(TxError::Rejected(_) | TxError::NotFound) => {}
                Err(TxError::Storage(e)) => {
                    tracing::warn!(user_id, alert_id = %alert.alert_id, error = %e, "matcher.persist.failed");
                }
            }
        }
        Ok(events)
    }

    /// All open alerts within the listing radius of the user's last known
    /// position, sorted ascending by distance. Ties keep scan order.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::UnknownUser`] when the user does not exist, or
    /// [`MatchError::Storage`] on a failed read.
    pub async fn nearby_alerts<A: AlertStore, U: UserStore>(
        &self,
        alerts: &A,
        users: &U,
        user_id: &str,
    ) -> Result<Vec<AlertAtDistance>, MatchError> {
        let user = users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| MatchError::UnknownUser { user_id: user_id.to_owned() })?;

        let mut nearby: Vec<AlertAtDistance> = alerts
            .find_open()
            .await?
            .into_iter()
            .map(|alert| {
                let d = distance_km(user.position, alert.origin);
                AlertAtDistance { alert, distance_km: d }
            })
            .filter(|a| a.distance_km <= self.config.listing_radius_km)
            .collect();
        // Stable sort: equal distances keep original scan order.
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(nearby)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{AlertAtDistance, MatchError, Matcher, MatcherConfig};
    use chrono::Utc;
    use domain::{Alert, AlertStore, LocationSample, StorageError, TxError, User, UserStore};
    use geo::Coordinate;
    use std::cell::RefCell;

    // ------------------------------------------------------------------
    // Mock stores
    // ------------------------------------------------------------------

    /// In-memory `AlertStore` whose `update` can be forced to fail for a
    /// chosen alert id, to exercise the fail-open path.
    struct MockAlertStore {
        alerts: RefCell<Vec<Alert>>,
        fail_update_for: Option<String>,
        fail_find_open: bool,
    }

    impl MockAlertStore {
        fn new(alerts: Vec<Alert>) -> Self {
            Self { alerts: RefCell::new(alerts), fail_update_for: None, fail_find_open: false }
        }

        fn get(&self, alert_id: &str) -> Alert {
            self.alerts.borrow().iter().find(|a| a.alert_id == alert_id).cloned().unwrap()
        }
    }

    impl AlertStore for MockAlertStore {
        async fn find_open(&self) -> Result<Vec<Alert>, StorageError> {
            if self.fail_find_open {
                return Err(StorageError::Unavailable);
            }
            Ok(self.alerts.borrow().iter().filter(|a| a.is_open()).cloned().collect())
        }

        async fn find_by_id(&self, alert_id: &str) -> Result<Option<Alert>, StorageError> {
            Ok(self.alerts.borrow().iter().find(|a| a.alert_id == alert_id).cloned())
        }

        async fn save(&self, alert: Alert) -> Result<(), StorageError> {
            let mut alerts = self.alerts.borrow_mut();
            match alerts.iter_mut().find(|a| a.alert_id == alert.alert_id) {
                Some(existing) => *existing = alert,
                None => alerts.push(alert),
            }
            Ok(())
        }

        async fn update<T, E, F>(&self, alert_id: &str, apply: F) -> Result<T, TxError<E>>
        where
            F: FnOnce(&mut Alert) -> Result<T, E>,
        {
            if self.fail_update_for.as_deref() == Some(alert_id) {
                return Err(TxError::Storage(StorageError::Unavailable));
            }
            let mut alerts = self.alerts.borrow_mut();
            let Some(alert) = alerts.iter_mut().find(|a| a.alert_id == alert_id) else {
                return Err(TxError::NotFound);
            };
            let mut draft = alert.clone();
            match apply(&mut draft) {
                Ok(value) => {
                    *alert = draft;
                    Ok(value)
                }
                Err(e) => Err(TxError::Rejected(e)),
            }
        }
    }

    struct MockUserStore {
        users: Vec<User>,
    }

    impl UserStore for MockUserStore {
        async fn find_active(&self) -> Result<Vec<User>, StorageError> {
            Ok(self.users.iter().filter(|u| u.is_active).cloned().collect())
        }

        async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StorageError> {
            Ok(self.users.iter().find(|u| u.user_id == user_id).cloned())
        }

        async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StorageError> {
            Ok(self.users.iter().find(|u| u.phone == phone).cloned())
        }

        async fn save(&self, _user: User) -> Result<(), StorageError> {
            Ok(())
        }

        async fn append_history(&self, _sample: LocationSample) -> Result<(), StorageError> {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn make_alert(alert_id: &str, origin: Coordinate) -> Alert {
        Alert {
            alert_id: alert_id.to_owned(),
            sender: "Alice".to_owned(),
            sender_id: "100".to_owned(),
            message: "help".to_owned(),
            origin,
            timestamp: Utc::now(),
            active: true,
            resolved: false,
            notified_users: vec![],
            accept_count: 0,
        }
    }

    fn make_user(user_id: &str, position: Coordinate) -> User {
        User {
            user_id: user_id.to_owned(),
            name: "Bob".to_owned(),
            phone: user_id.to_owned(),
            position,
            accuracy: 0.0,
            last_updated: Utc::now(),
            registered_at: Utc::now(),
            is_active: true,
        }
    }

    fn make_matcher() -> Matcher {
        Matcher::new(MatcherConfig::builder().build().unwrap())
    }

    // 0.01 degrees of longitude at the equator is ~1.1 km.
    const NEAR: Coordinate = Coordinate { latitude: 0.0, longitude: 0.01 };
    const ORIGIN: Coordinate = Coordinate { latitude: 0.0, longitude: 0.0 };
    // ~111 km away: outside any radius used here.
    const FAR: Coordinate = Coordinate { latitude: 1.0, longitude: 0.0 };

    // ------------------------------------------------------------------
    // match_and_notify
    // ------------------------------------------------------------------

    // MAT-T01: an in-radius alert produces one event and one appended entry.
    #[tokio::test]
    async fn in_radius_alert_notifies_once() {
        let store = MockAlertStore::new(vec![make_alert("alert_1", ORIGIN)]);
        let matcher = make_matcher();

        let events = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].alert_id, "alert_1");
        assert!(events[0].distance_km < 5.0);

        let alert = store.get("alert_1");
        assert_eq!(alert.notified_users.len(), 1);
        assert_eq!(alert.notified_users[0].user_id, "200");
    }

    // MAT-T02: idempotence -- the second identical call yields zero events
    // and no second notified entry.
    #[tokio::test]
    async fn second_call_is_idempotent() {
        let store = MockAlertStore::new(vec![make_alert("alert_1", ORIGIN)]);
        let matcher = make_matcher();

        let first = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        assert!(second.is_empty());

        let alert = store.get("alert_1");
        assert_eq!(alert.notified_users.len(), 1, "user must never appear twice");
    }

    // MAT-T03: alerts outside the radius are skipped without mutation.
    #[tokio::test]
    async fn out_of_radius_is_untouched() {
        let store = MockAlertStore::new(vec![make_alert("alert_1", ORIGIN)]);
        let matcher = make_matcher();

        let events = matcher.match_and_notify(&store, "200", FAR).await.unwrap();
        assert!(events.is_empty());
        assert!(store.get("alert_1").notified_users.is_empty());
    }

    // MAT-T04: resolved alerts never match.
    #[tokio::test]
    async fn resolved_alert_is_excluded() {
        let mut alert = make_alert("alert_1", ORIGIN);
        alert.active = false;
        alert.resolved = true;
        let store = MockAlertStore::new(vec![alert]);
        let matcher = make_matcher();

        let events = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        assert!(events.is_empty());
        assert!(store.get("alert_1").notified_users.is_empty());
    }

    // MAT-T05: a persistence failure mid-scan must not lose matches already
    // computed -- remaining alerts are still processed (fail-open).
    #[tokio::test]
    async fn mid_scan_failure_keeps_other_matches() {
        let mut store = MockAlertStore::new(vec![
            make_alert("alert_1", ORIGIN),
            make_alert("alert_2", ORIGIN),
            make_alert("alert_3", ORIGIN),
        ]);
        store.fail_update_for = Some("alert_2".to_owned());
        let matcher = make_matcher();

        let events = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        let mut ids: Vec<&str> = events.iter().map(|e| e.alert_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["alert_1", "alert_3"]);
        assert!(store.get("alert_2").notified_users.is_empty());
    }

    // MAT-T06: a failure before any progress (the open-alert fetch) surfaces.
    #[tokio::test]
    async fn initial_fetch_failure_surfaces() {
        let mut store = MockAlertStore::new(vec![make_alert("alert_1", ORIGIN)]);
        store.fail_find_open = true;
        let matcher = make_matcher();

        let result = matcher.match_and_notify(&store, "200", NEAR).await;
        assert!(matches!(result, Err(MatchError::Storage(StorageError::Unavailable))));
    }

    // MAT-T07: one scan can match several alerts, one write each.
    #[tokio::test]
    async fn multiple_alerts_match_in_one_scan() {
        let store = MockAlertStore::new(vec![
            make_alert("alert_1", ORIGIN),
            make_alert("alert_2", Coordinate::new(0.0, 0.02)),
            make_alert("alert_far", FAR),
        ]);
        let matcher = make_matcher();

        let events = matcher.match_and_notify(&store, "200", NEAR).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(store.get("alert_1").was_notified("200"));
        assert!(store.get("alert_2").was_notified("200"));
        assert!(!store.get("alert_far").was_notified("200"));
    }

    // ------------------------------------------------------------------
    // nearby_alerts
    // ------------------------------------------------------------------

    // MAT-T08: nearby listing is distance-sorted and cut at the listing radius.
    #[tokio::test]
    async fn nearby_alerts_sorted_and_filtered() {
        let store = MockAlertStore::new(vec![
            make_alert("alert_b", Coordinate::new(0.0, 0.05)),
            make_alert("alert_a", Coordinate::new(0.0, 0.01)),
            make_alert("alert_far", Coordinate::new(2.0, 0.0)),
        ]);
        let users = MockUserStore { users: vec![make_user("200", ORIGIN)] };
        let matcher = make_matcher();

        let nearby = matcher.nearby_alerts(&store, &users, "200").await.unwrap();
        let ids: Vec<&str> = nearby.iter().map(|a| a.alert.alert_id.as_str()).collect();
        assert_eq!(ids, ["alert_a", "alert_b"]);
        assert!(nearby.iter().all(|a: &AlertAtDistance| a.distance_km <= 10.0));
    }

    // MAT-T09: unknown users are rejected.
    #[tokio::test]
    async fn nearby_alerts_unknown_user() {
        let store = MockAlertStore::new(vec![]);
        let users = MockUserStore { users: vec![] };
        let matcher = make_matcher();

        let result = matcher.nearby_alerts(&store, &users, "nobody").await;
        assert!(matches!(result, Err(MatchError::UnknownUser { .. })));
    }

    // MAT-T10: config validation rejects non-positive radii.
    #[test]
    fn config_validation() {
        let bad = MatcherConfig::builder().nearby_radius_km(0.0).build();
        assert!(matches!(bad, Err(MatchError::InvalidConfig { .. })));
        let bad = MatcherConfig::builder().listing_radius_km(-1.0).build();
        assert!(matches!(bad, Err(MatchError::InvalidConfig { .. })));
    }
}
