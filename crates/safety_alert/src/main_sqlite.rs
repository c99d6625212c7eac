// Rust guideline compliant 2026-08-21

//! Safety-alert engine entry point -- `SQLite` storage demo.
//!
//! Identical to the main `safety_alert` binary except that storage is backed
//! by a `SQLite` file (`safety_alert.db` in the current working directory)
//! instead of in-memory vectors. This demonstrates that the hexagonal storage
//! ports are truly swappable: only this entry point and the adapter change;
//! all domain and engine crates are untouched.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin safety_alert_sqlite
//! ```
//!
//! The file `safety_alert.db` is created on first run. Inspect rows with any
//! `SQLite` browser (e.g., DB Browser for `SQLite`).

// Load sqlite_store directly so it only enters this binary's module tree,
// avoiding dead_code warnings in the `safety_alert` binary (which uses
// InMemoryStore instead).
#[path = "adapters/sqlite_store.rs"]
mod sqlite_store;

use anyhow::Context as _;
use dispatch::{DispatchConfig, Dispatcher};
use geo::Coordinate;
use helpline::{Helpline, HelplineConfig};
use matcher::{Matcher, MatcherConfig};
use registry::Registry;
use sqlite_store::SqliteStore;

/// Database file created in the current working directory on first run.
///
/// Using the current working directory is acceptable for a demo adapter.
/// A production adapter would read this from configuration or environment.
const DB_URL: &str = "sqlite:safety_alert.db";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize the tracing subscriber before any async work.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SqliteStore::new(DB_URL)
        .await
        .context("failed to open SQLite store")?;

    let registry = Registry::new();
    let matcher = Matcher::new(
        MatcherConfig::builder()
            .build()
            .context("failed to build matcher config")?,
    );
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder()
            .build()
            .context("failed to build dispatch config")?,
    );
    let helpline = Helpline::new(
        HelplineConfig::builder()
            .build()
            .context("failed to build helpline config")?,
    );

    // -- Registration: re-running the demo upserts by phone, never duplicates --
    let alice = registry
        .register(&store, "555-0100", "Alice", Coordinate::new(48.8566, 2.3522))
        .await
        .context("failed to register Alice")?;
    let bob = registry
        .register(&store, "555-0101", "Bob", Coordinate::new(48.8566, 2.3672))
        .await
        .context("failed to register Bob")?;
    tracing::info!(alice = %alice.user_id, bob = %bob.user_id, "demo.users_registered");

    let bob_position = Coordinate::new(48.8570, 2.3670);
    registry
        .update_location(&store, &bob.user_id, bob_position, Some(12.0))
        .await
        .context("failed to update Bob's location")?;

    // -- Alert lifecycle against the persistent store --
    let outcome = dispatcher
        .create_alert(
            &store,
            &store,
            "Alice",
            &alice.user_id,
            "Need assistance",
            Coordinate::new(48.8566, 2.3522),
        )
        .await
        .context("failed to create alert")?;
    tracing::info!(
        alert_id = %outcome.alert_id,
        recipients = outcome.recipients.len(),
        radius_km = outcome.radius_km,
        "demo.alert_created"
    );

    let listed = matcher
        .nearby_alerts(&store, &store, &bob.user_id)
        .await
        .context("failed to list alerts near Bob")?;
    tracing::info!(listed = listed.len(), "demo.alerts_near_bob");

    let count = dispatcher
        .accept(&store, &outcome.alert_id)
        .await
        .context("failed to accept alert")?;
    dispatcher
        .resolve(&store, &outcome.alert_id)
        .await
        .context("failed to resolve alert")?;
    tracing::info!(accept_count = count, "demo.alert_resolved");

    // -- Help request lifecycle against the persistent store --
    let help_id = helpline
        .create_request(&store, "555-0101", bob_position)
        .await
        .context("failed to create help request")?;
    helpline
        .accept(&store, &help_id, &alice.user_id)
        .await
        .context("failed to accept help request")?;
    let resolved = helpline
        .mark_safe(&store, "555-0101")
        .await
        .context("failed to mark safe")?;
    tracing::info!(help_id = %help_id, resolved, "demo.help_lifecycle_complete");

    tracing::info!("demo.done");
    Ok(())
}
