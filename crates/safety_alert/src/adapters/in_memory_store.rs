// Rust guideline compliant 2026-08-21

//! In-memory adapter for the `UserStore`, `AlertStore`, and `HelpStore`
//! ports.
//!
//! Intended for proof-of-concept runs and tests. Safe on a `current_thread`
//! runtime: `RefCell` borrows never span an await point, and the atomic
//! `update` contract holds trivially because the whole read-apply-write runs
//! inside one `borrow_mut` scope. `StorageError::Unavailable` is part of the
//! port contracts but is never returned here; it is reserved for concrete
//! backends.

use std::cell::RefCell;

use domain::{
    Alert, AlertStore, HelpRequest, HelpStatus, HelpStore, LocationSample, StorageError, TxError,
    User, UserStore,
};

/// Storage adapter holding all records in `RefCell`-guarded vectors.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RefCell<Vec<User>>,
    history: RefCell<Vec<LocationSample>>,
    alerts: RefCell<Vec<Alert>>,
    requests: RefCell<Vec<HelpRequest>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored history samples. Used in tests to assert the
    /// write-only audit trail grows.
    #[cfg(test)]
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.borrow().len()
    }
}

impl UserStore for InMemoryStore {
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
        self.history.borrow_mut().push(sample);
        Ok(())
    }
}

impl AlertStore for InMemoryStore {
    async fn find_open(&self) -> Result<Vec<Alert>, StorageError> {
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
        let mut alerts = self.alerts.borrow_mut();
        let Some(alert) = alerts.iter_mut().find(|a| a.alert_id == alert_id) else {
            return Err(TxError::NotFound);
        };
        // Apply to a draft so a rejection leaves the record untouched.
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

impl HelpStore for InMemoryStore {
    async fn find_by_status(&self, status: HelpStatus) -> Result<Vec<HelpRequest>, StorageError> {
        Ok(self.requests.borrow().iter().filter(|r| r.status == status).cloned().collect())
    }

    async fn find_open_by_phone(&self, phone: &str) -> Result<Vec<HelpRequest>, StorageError> {
        Ok(self
            .requests
            .borrow()
            .iter()
            .filter(|r| r.phone == phone && r.is_open())
            .cloned()
            .collect())
    }

    async fn save(&self, request: HelpRequest) -> Result<(), StorageError> {
        let mut requests = self.requests.borrow_mut();
        match requests.iter_mut().find(|r| r.help_id == request.help_id) {
            Some(existing) => *existing = request,
            None => requests.push(request),
        }
        Ok(())
    }

    async fn update<T, E, F>(&self, help_id: &str, apply: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T, E>,
    {
        let mut requests = self.requests.borrow_mut();
        let Some(request) = requests.iter_mut().find(|r| r.help_id == help_id) else {
            return Err(TxError::NotFound);
        };
        let mut draft = request.clone();
        match apply(&mut draft) {
            Ok(value) => {
                *request = draft;
                Ok(value)
            }
            Err(e) => Err(TxError::Rejected(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests -- adapter behavior plus end-to-end engine scenarios
// ---------------------------------------------------------------------------
