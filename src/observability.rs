use std::net::SocketAddr;

use crate::workflow::Action;

// ── Request-driven metrics ──────────────────────────────────────

/// Counter: inbound updates handled. Labels: kind.
pub const UPDATES_TOTAL: &str = "slotbook_updates_total";

/// Counter: booking commit attempts. Labels: status (ok, conflict, invalid, limit, error).
pub const BOOKINGS_TOTAL: &str = "slotbook_bookings_total";

/// Counter: cancellations. Labels: status (ok, not_found, error).
pub const CANCELLATIONS_TOTAL: &str = "slotbook_cancellations_total";

/// Histogram: time from inbound update to replies being ready, in seconds.
pub const HANDLE_DURATION_SECONDS: &str = "slotbook_handle_duration_seconds";

// ── Background jobs ─────────────────────────────────────────────

/// Counter: reminders delivered. Labels: kind (start, end).
pub const REMINDERS_SENT_TOTAL: &str = "slotbook_reminders_sent_total";

/// Counter: reminders the gateway failed to deliver. Labels: kind.
pub const REMINDERS_FAILED_TOTAL: &str = "slotbook_reminders_failed_total";

/// Counter: bookings removed by the expiry job.
pub const BOOKINGS_PURGED_TOTAL: &str = "slotbook_bookings_purged_total";

// ── Resource utilization ────────────────────────────────────────

/// Gauge: users with a non-idle conversation.
pub const SESSIONS_ACTIVE: &str = "slotbook_sessions_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an Action variant to a short label for metrics.
pub fn action_label(action: &Action) -> &'static str {
    match action {
        Action::Book => "book",
        Action::Cancel => "cancel_menu",
        Action::MyBookings => "my_bookings",
        Action::Date(_) => "date",
        Action::Confirm(true) => "confirm_yes",
        Action::Confirm(false) => "confirm_no",
        Action::Drop(_) => "drop",
    }
}
