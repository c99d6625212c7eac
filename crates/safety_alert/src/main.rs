// Rust guideline compliant 2026-08-21

//! Safety-alert engine entry point.
//!
//! Wires all engine components (Registry, Matcher, Dispatcher, Helpline) to
//! the in-memory storage adapter and runs a proof-of-concept end-to-end
//! scenario: register users, stream location updates, raise an alert, match
//! nearby users, accept responses up to the cap, and walk a help request
//! through its lifecycle.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run
//!
//! # Also show per-operation debug output
//! RUST_LOG=debug cargo run
//! ```

mod adapters;

use adapters::in_memory_store::InMemoryStore;
use anyhow::Context as _;
use dispatch::{DispatchConfig, DispatchError, Dispatcher};
use geo::Coordinate;
use helpline::{Helpline, HelplineConfig};
use matcher::{Matcher, MatcherConfig};
use registry::Registry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize the tracing subscriber before any async work.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // One store backs all three ports; components share it by reference.
    let store = InMemoryStore::new();

    let registry = Registry::new();
    let matcher = Matcher::new(
        MatcherConfig::builder()
            .build()
            .context("failed to build matcher config")?,
    );
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder()
            // Quorum of 2 keeps the demo small; production default is 3.
            .quorum(2)
            // Cap of 2 so the demo's third accept is rejected.
            .max_helpers(2)
            .build()
            .context("failed to build dispatch config")?,
    );
    let helpline = Helpline::new(
        HelplineConfig::builder()
            .build()
            .context("failed to build helpline config")?,
    );

    // -- Registration: three users around the alert origin --
    // Alice at the origin, Bob ~1.1 km east, Carol ~8 km east (outside the
    // initial search ring, reached only if the radius expands that far).
    let alice = registry
        .register(&store, "555-0100", "Alice", Coordinate::new(48.8566, 2.3522))
        .await
        .context("failed to register Alice")?;
    let bob = registry
        .register(&store, "555-0101", "Bob", Coordinate::new(48.8566, 2.3672))
        .await
        .context("failed to register Bob")?;
    registry
        .register(&store, "555-0102", "Carol", Coordinate::new(48.8566, 2.4610))
        .await
        .context("failed to register Carol")?;
    tracing::info!(alice = %alice.user_id, bob = %bob.user_id, "demo.users_registered");

    // -- Location update: Bob moves slightly; history records the sample --
    let bob_position = Coordinate::new(48.8570, 2.3670);
    registry
        .update_location(&store, &bob.user_id, bob_position, Some(12.0))
        .await
        .context("failed to update Bob's location")?;

    // -- Alert: Alice raises an alert at her position --
    let origin = Coordinate::new(48.8566, 2.3522);
    let outcome = dispatcher
        .create_alert(&store, &store, "Alice", &alice.user_id, "Need assistance", origin)
        .await
        .context("failed to create alert")?;
    tracing::info!(
        alert_id = %outcome.alert_id,
        recipients = outcome.recipients.len(),
        radius_km = outcome.radius_km,
        "demo.alert_created"
    );
    for r in &outcome.recipients {
        tracing::info!(user_id = %r.user_id, distance_km = r.distance_km, "demo.recipient");
    }

    // -- Matching: Bob polls and is already marked notified, so the matcher
    //    reports nothing new (exactly-once), but the listing still shows it --
    let fresh = matcher
        .match_and_notify(&store, &bob.user_id, bob_position)
        .await
        .context("failed to match alerts for Bob")?;
    let listed = matcher
        .nearby_alerts(&store, &store, &bob.user_id)
        .await
        .context("failed to list alerts near Bob")?;
    tracing::info!(fresh = fresh.len(), listed = listed.len(), "demo.matcher_results");

    // -- Accepts: two responders accept; the third hits the demo cap of 2 --
    for n in 1..=3u32 {
        match dispatcher.accept(&store, &outcome.alert_id).await {
            Ok(count) => tracing::info!(accept = n, count, "demo.accept_ok"),
            Err(DispatchError::CapacityExceeded { cap }) => {
                tracing::info!(accept = n, cap, "demo.accept_rejected_at_cap");
            }
            Err(e) => return Err(e).context("failed to accept alert"),
        }
    }

    // -- Resolution: the alert closes and leaves the active listing --
    dispatcher
        .resolve(&store, &outcome.alert_id)
        .await
        .context("failed to resolve alert")?;
    let active = dispatcher
        .active_alerts(&store)
        .await
        .context("failed to list active alerts")?;
    tracing::info!(active = active.len(), "demo.after_resolve");

    // -- Help request: Bob asks for help, Alice sees and accepts it, then
    //    Bob marks himself safe --
    let help_id = helpline
        .create_request(&store, "555-0101", bob_position)
        .await
        .context("failed to create help request")?;
    let nearby = helpline
        .nearby_requests(&store, origin, &alice.user_id)
        .await
        .context("failed to list help requests near Alice")?;
    tracing::info!(help_id = %help_id, nearby = nearby.len(), "demo.help_created");
    let accepted = helpline
        .accept(&store, &help_id, &alice.user_id)
        .await
        .context("failed to accept help request")?;
    let resolved = helpline
        .mark_safe(&store, "555-0101")
        .await
        .context("failed to mark safe")?;
    tracing::info!(accepted_count = accepted, resolved, "demo.help_lifecycle_complete");

    tracing::info!("demo.done");
    Ok(())
}
