// Rust guideline compliant 2026-08-21

//! SQLite adapter for the `UserStore`, `AlertStore`, and `HelpStore` ports.
//!
//! Persists all engine records to a SQLite file via `sqlx`. Proves that the
//! hexagonal storage ports are truly swappable without touching domain or
//! engine crates.
//!
//! # Atomicity
//!
//! The `update` port methods run read-apply-write inside one sqlx
//! transaction, and the pool is capped at a single connection, so atomic
//! units on the same record serialize: concurrent accepts can never both
//! observe the same pre-increment count.
//!
//! # Schema notes
//!
//! `alert_notified` carries `PRIMARY KEY (alert_id, user_id)`, enforcing the
//! one-notification-per-user invariant at the schema level. Timestamps are
//! stored as unix milliseconds. `save` uses `INSERT OR REPLACE` full-document
//! semantics, matching the port contract.

use chrono::{DateTime, Utc};
use domain::{
    Alert, AlertStore, HelpRequest, HelpStatus, HelpStore, LocationSample, NotifiedUser,
    StorageError, TxError, User, UserStore,
};
use geo::Coordinate;
use sqlx::Sqlite;

/// Storage adapter backed by a SQLite database file via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

/// Log the underlying sqlx error and map it to the port error.
fn unavailable(op: &str, e: &sqlx::Error) -> StorageError {
    tracing::error!(op, error = %e, "sqlite.operation_failed");
    StorageError::Unavailable
}

fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn status_str(status: HelpStatus) -> &'static str {
    match status {
        HelpStatus::NeedHelp => "NEED_HELP",
        HelpStatus::Safe => "SAFE",
    }
}

fn status_from(s: &str) -> HelpStatus {
    // Unknown strings cannot occur: the column is only ever written from
    // status_str. Treat anything else as terminal.
    if s == "NEED_HELP" { HelpStatus::NeedHelp } else { HelpStatus::Safe }
}

// Row tuples used with query_as. Column order matches the SELECT lists.
type UserRow = (String, String, String, f64, f64, f64, i64, i64, i64);
type AlertRow = (String, String, String, String, f64, f64, i64, i64, i64, i64);
type NotifiedRow = (String, f64, i64);
type HelpRow = (String, String, f64, f64, String, i64, i64, i64);

fn user_from_row(row: UserRow) -> User {
    let (user_id, name, phone, lat, lon, accuracy, last_updated, registered_at, is_active) = row;
    User {
        user_id,
        name,
        phone,
        position: Coordinate::new(lat, lon),
        accuracy,
        last_updated: from_millis(last_updated),
        registered_at: from_millis(registered_at),
        is_active: is_active != 0,
    }
}

fn alert_from_row(row: AlertRow, notified: Vec<NotifiedRow>) -> Alert {
    let (alert_id, sender, sender_id, message, lat, lon, timestamp, active, resolved, accept_count) =
        row;
    Alert {
        alert_id,
        sender,
        sender_id,
        message,
        origin: Coordinate::new(lat, lon),
        timestamp: from_millis(timestamp),
        active: active != 0,
        resolved: resolved != 0,
        notified_users: notified
            .into_iter()
            .map(|(user_id, distance_km, notified_at)| NotifiedUser {
                user_id,
                distance_km,
                notified_at: from_millis(notified_at),
            })
            .collect(),
        accept_count: u32::try_from(accept_count).unwrap_or(0),
    }
}

fn help_from_row(row: HelpRow, accepted_by: Vec<String>) -> HelpRequest {
    let (help_id, phone, lat, lon, status, accepted_count, created_at, active) = row;
    HelpRequest {
        help_id,
        phone,
        position: Coordinate::new(lat, lon),
        status: status_from(&status),
        accepted_count: u32::try_from(accepted_count).unwrap_or(0),
        accepted_by,
        created_at: from_millis(created_at),
        active: active != 0,
    }
}

const SELECT_USER: &str = "SELECT user_id, name, phone, latitude, longitude, accuracy, \
     last_updated, registered_at, is_active FROM users";

const SELECT_ALERT: &str = "SELECT alert_id, sender, sender_id, message, latitude, longitude, \
     timestamp, active, resolved, accept_count FROM alerts";

const SELECT_HELP: &str = "SELECT help_id, phone, latitude, longitude, status, accepted_count, \
     created_at, active FROM help_requests";

impl SqliteStore {
    /// Open or create a SQLite database and initialize the schema.
    ///
    /// Passes `create_if_missing(true)` so the database file is created on
    /// first run. The pool is capped at one connection on purpose: it
    /// serializes the read-modify-write transactions behind the `update`
    /// port methods (see the module-level atomicity note).
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn new(db_url: &str) -> Result<Self, sqlx::Error> {
        let opts = db_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        for ddl in [
            "CREATE TABLE IF NOT EXISTS users (
                user_id       TEXT    PRIMARY KEY,
                name          TEXT    NOT NULL,
                phone         TEXT    NOT NULL,
                latitude      REAL    NOT NULL,
                longitude     REAL    NOT NULL,
                accuracy      REAL    NOT NULL DEFAULT 0,
                last_updated  INTEGER NOT NULL,
                registered_at INTEGER NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 1
            )",
            "CREATE TABLE IF NOT EXISTS location_history (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   TEXT    NOT NULL,
                latitude  REAL    NOT NULL,
                longitude REAL    NOT NULL,
                accuracy  REAL    NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS alerts (
                alert_id     TEXT    PRIMARY KEY,
                sender       TEXT    NOT NULL,
                sender_id    TEXT    NOT NULL,
                message      TEXT    NOT NULL,
                latitude     REAL    NOT NULL,
                longitude    REAL    NOT NULL,
                timestamp    INTEGER NOT NULL,
                active       INTEGER NOT NULL DEFAULT 1,
                resolved     INTEGER NOT NULL DEFAULT 0,
                accept_count INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS alert_notified (
                alert_id    TEXT    NOT NULL,
                user_id     TEXT    NOT NULL,
                distance_km REAL    NOT NULL,
                notified_at INTEGER NOT NULL,
                PRIMARY KEY (alert_id, user_id)
            )",
            "CREATE TABLE IF NOT EXISTS help_requests (
                help_id        TEXT    PRIMARY KEY,
                phone          TEXT    NOT NULL,
                latitude       REAL    NOT NULL,
                longitude      REAL    NOT NULL,
                status         TEXT    NOT NULL,
                accepted_count INTEGER NOT NULL DEFAULT 0,
                created_at     INTEGER NOT NULL,
                active         INTEGER NOT NULL DEFAULT 1
            )",
            "CREATE TABLE IF NOT EXISTS help_accepted (
                help_id   TEXT NOT NULL,
                helper_id TEXT NOT NULL,
                PRIMARY KEY (help_id, helper_id)
            )",
        ] {
            sqlx::query(ddl).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Write one alert (row plus notified list) inside `tx`.
    async fn write_alert(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        alert: &Alert,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO alerts
             (alert_id, sender, sender_id, message, latitude, longitude,
              timestamp, active, resolved, accept_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.alert_id)
        .bind(&alert.sender)
        .bind(&alert.sender_id)
        .bind(&alert.message)
        .bind(alert.origin.latitude)
        .bind(alert.origin.longitude)
        .bind(to_millis(alert.timestamp))
        .bind(i64::from(alert.active))
        .bind(i64::from(alert.resolved))
        .bind(i64::from(alert.accept_count))
        .execute(&mut **tx)
        .await?;

        // Full-document semantics: the notified list is replaced wholesale.
        sqlx::query("DELETE FROM alert_notified WHERE alert_id = ?")
            .bind(&alert.alert_id)
            .execute(&mut **tx)
            .await?;
        for n in &alert.notified_users {
            sqlx::query(
                "INSERT INTO alert_notified (alert_id, user_id, distance_km, notified_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&alert.alert_id)
            .bind(&n.user_id)
            .bind(n.distance_km)
            .bind(to_millis(n.notified_at))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Read one alert (row plus notified list) inside `tx`.
    async fn read_alert(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        alert_id: &str,
    ) -> Result<Option<Alert>, sqlx::Error> {
        let row = sqlx::query_as::<_, AlertRow>(
            "SELECT alert_id, sender, sender_id, message, latitude, longitude,
                    timestamp, active, resolved, accept_count
             FROM alerts WHERE alert_id = ?",
        )
        .bind(alert_id)
        .fetch_optional(&mut **tx)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let notified = sqlx::query_as::<_, NotifiedRow>(
            "SELECT user_id, distance_km, notified_at FROM alert_notified
             WHERE alert_id = ? ORDER BY rowid",
        )
        .bind(alert_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(Some(alert_from_row(row, notified)))
    }

    /// Write one help request (row plus accepted list) inside `tx`.
    async fn write_help(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        request: &HelpRequest,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO help_requests
             (help_id, phone, latitude, longitude, status, accepted_count, created_at, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.help_id)
        .bind(&request.phone)
        .bind(request.position.latitude)
        .bind(request.position.longitude)
        .bind(status_str(request.status))
        .bind(i64::from(request.accepted_count))
        .bind(to_millis(request.created_at))
        .bind(i64::from(request.active))
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM help_accepted WHERE help_id = ?")
            .bind(&request.help_id)
            .execute(&mut **tx)
            .await?;
        for helper in &request.accepted_by {
            sqlx::query("INSERT INTO help_accepted (help_id, helper_id) VALUES (?, ?)")
                .bind(&request.help_id)
                .bind(helper)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Read one help request (row plus accepted list) inside `tx`.
    async fn read_help(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        help_id: &str,
    ) -> Result<Option<HelpRequest>, sqlx::Error> {
        let row = sqlx::query_as::<_, HelpRow>(
            "SELECT help_id, phone, latitude, longitude, status, accepted_count,
                    created_at, active
             FROM help_requests WHERE help_id = ?",
        )
        .bind(help_id)
        .fetch_optional(&mut **tx)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let accepted_by: Vec<String> = sqlx::query_scalar(
            "SELECT helper_id FROM help_accepted WHERE help_id = ? ORDER BY rowid",
        )
        .bind(help_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(Some(help_from_row(row, accepted_by)))
    }

    /// Load the notified list for each alert row.
    async fn attach_notified(&self, rows: Vec<AlertRow>) -> Result<Vec<Alert>, sqlx::Error> {
        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let notified = sqlx::query_as::<_, NotifiedRow>(
                "SELECT user_id, distance_km, notified_at FROM alert_notified
                 WHERE alert_id = ? ORDER BY rowid",
            )
            .bind(&row.0)
            .fetch_all(&self.pool)
            .await?;
            alerts.push(alert_from_row(row, notified));
        }
        Ok(alerts)
    }

    /// Load the accepted list for each help-request row.
    async fn attach_accepted(&self, rows: Vec<HelpRow>) -> Result<Vec<HelpRequest>, sqlx::Error> {
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let accepted_by: Vec<String> = sqlx::query_scalar(
                "SELECT helper_id FROM help_accepted WHERE help_id = ? ORDER BY rowid",
            )
            .bind(&row.0)
            .fetch_all(&self.pool)
            .await?;
            requests.push(help_from_row(row, accepted_by));
        }
        Ok(requests)
    }
}

impl UserStore for SqliteStore {
    async fn find_active(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE is_active = 1"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("users.find_active", &e))?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE user_id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("users.find_by_id", &e))?;
        Ok(row.map(user_from_row))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE phone = ?"))
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("users.find_by_phone", &e))?;
        Ok(row.map(user_from_row))
    }

    async fn save(&self, user: User) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO users
             (user_id, name, phone, latitude, longitude, accuracy,
              last_updated, registered_at, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.position.latitude)
        .bind(user.position.longitude)
        .bind(user.accuracy)
        .bind(to_millis(user.last_updated))
        .bind(to_millis(user.registered_at))
        .bind(i64::from(user.is_active))
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("users.save", &e))?;
        Ok(())
    }

    async fn append_history(&self, sample: LocationSample) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO location_history (user_id, latitude, longitude, accuracy, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&sample.user_id)
        .bind(sample.position.latitude)
        .bind(sample.position.longitude)
        .bind(sample.accuracy)
        .bind(to_millis(sample.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("history.append", &e))?;
        Ok(())
    }
}

impl AlertStore for SqliteStore {
    async fn find_open(&self) -> Result<Vec<Alert>, StorageError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "{SELECT_ALERT} WHERE active = 1 AND resolved = 0"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("alerts.find_open", &e))?;
        self.attach_notified(rows).await.map_err(|e| unavailable("alerts.find_open", &e))
    }

    async fn find_by_id(&self, alert_id: &str) -> Result<Option<Alert>, StorageError> {
        let mut tx =
            self.pool.begin().await.map_err(|e| unavailable("alerts.find_by_id", &e))?;
        let alert = Self::read_alert(&mut tx, alert_id)
            .await
            .map_err(|e| unavailable("alerts.find_by_id", &e))?;
        tx.commit().await.map_err(|e| unavailable("alerts.find_by_id", &e))?;
        Ok(alert)
    }

    async fn save(&self, alert: Alert) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| unavailable("alerts.save", &e))?;
        Self::write_alert(&mut tx, &alert)
            .await
            .map_err(|e| unavailable("alerts.save", &e))?;
        tx.commit().await.map_err(|e| unavailable("alerts.save", &e))?;
        Ok(())
    }

    async fn update<T, E, F>(&self, alert_id: &str, apply: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&mut Alert) -> Result<T, E>,
    {
        let storage = |e: &sqlx::Error| TxError::Storage(unavailable("alerts.update", e));
        let mut tx = self.pool.begin().await.map_err(|e| storage(&e))?;
        let Some(mut alert) =
            Self::read_alert(&mut tx, alert_id).await.map_err(|e| storage(&e))?
        else {
            return Err(TxError::NotFound);
        };
        match apply(&mut alert) {
            Ok(value) => {
                Self::write_alert(&mut tx, &alert).await.map_err(|e| storage(&e))?;
                tx.commit().await.map_err(|e| storage(&e))?;
                Ok(value)
            }
            // Dropping the transaction rolls back; nothing was persisted.
            Err(e) => Err(TxError::Rejected(e)),
        }
    }
}

impl HelpStore for SqliteStore {
    async fn find_by_status(&self, status: HelpStatus) -> Result<Vec<HelpRequest>, StorageError> {
        let rows = sqlx::query_as::<_, HelpRow>(&format!("{SELECT_HELP} WHERE status = ?"))
            .bind(status_str(status))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("help.find_by_status", &e))?;
        self.attach_accepted(rows).await.map_err(|e| unavailable("help.find_by_status", &e))
    }

    async fn find_open_by_phone(&self, phone: &str) -> Result<Vec<HelpRequest>, StorageError> {
        let rows = sqlx::query_as::<_, HelpRow>(&format!(
            "{SELECT_HELP} WHERE phone = ? AND status = 'NEED_HELP' AND active = 1"
        ))
        .bind(phone)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("help.find_open_by_phone", &e))?;
        self.attach_accepted(rows).await.map_err(|e| unavailable("help.find_open_by_phone", &e))
    }

    async fn save(&self, request: HelpRequest) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| unavailable("help.save", &e))?;
        Self::write_help(&mut tx, &request)
            .await
            .map_err(|e| unavailable("help.save", &e))?;
        tx.commit().await.map_err(|e| unavailable("help.save", &e))?;
        Ok(())
    }

    async fn update<T, E, F>(&self, help_id: &str, apply: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T, E>,
    {
        let storage = |e: &sqlx::Error| TxError::Storage(unavailable("help.update", e));
        let mut tx = self.pool.begin().await.map_err(|e| storage(&e))?;
        let Some(mut request) =
            Self::read_help(&mut tx, help_id).await.map_err(|e| storage(&e))?
        else {
            return Err(TxError::NotFound);
        };
        match apply(&mut request) {
            Ok(value) => {
                Self::write_help(&mut tx, &request).await.map_err(|e| storage(&e))?;
                tx.commit().await.map_err(|e| storage(&e))?;
                Ok(value)
            }
            Err(e) => Err(TxError::Rejected(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
