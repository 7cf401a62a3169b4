//! Metrics collection.
//!
//! # Metrics
//! - `boxtray_probes_total` (counter): liveness probes by outcome
//! - `boxtray_notifications_total` (counter): deliveries by outcome
//!   (delivered, dropped, closed)
//! - `boxtray_subscribers` (gauge): registered subscribers
//! - `boxtray_snapshot_refreshes_total` (counter): published snapshots
//! - `boxtray_selectors` (gauge): selectors in the current snapshot
//!
//! # Design Decisions
//! - Recording is a no-op until the embedding application installs a recorder

use metrics::{counter, gauge};

pub fn record_probe(outcome: &'static str) {
    counter!("boxtray_probes_total", "outcome" => outcome).increment(1);
}

pub fn record_notification(outcome: &'static str) {
    counter!("boxtray_notifications_total", "outcome" => outcome).increment(1);
}

pub fn record_subscribers(count: usize) {
    gauge!("boxtray_subscribers").set(count as f64);
}

pub fn record_snapshot_refresh(selectors: usize) {
    counter!("boxtray_snapshot_refreshes_total").increment(1);
    gauge!("boxtray_selectors").set(selectors as f64);
}
