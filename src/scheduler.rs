use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::model::*;
use crate::notify::Notifier;
use crate::observability::{BOOKINGS_PURGED_TOTAL, REMINDERS_FAILED_TOTAL, REMINDERS_SENT_TOTAL};
use crate::store::{Store, StoreError};
use crate::workflow::{format_booking, Reply};

const REMINDER_PERIOD: Duration = Duration::from_secs(60);
const EXPIRY_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
const COMPACT_CHECK_PERIOD: Duration = Duration::from_secs(30);

fn kind_label(kind: ReminderKind) -> &'static str {
    match kind {
        ReminderKind::Start => "start",
        ReminderKind::End => "end",
    }
}

fn reminder_text(booking: &Booking, kind: ReminderKind) -> String {
    match kind {
        ReminderKind::Start => format!(
            "You booked {}. It starts at {}.",
            format_booking(booking),
            booking.start_time.format("%H:%M")
        ),
        ReminderKind::End => format!(
            "Your booking {} has ended. Please free the machine.",
            format_booking(booking)
        ),
    }
}

/// Send every start reminder and end notice due at `now`. Each booking is
/// marked before its message goes out, so nothing is sent twice even if the
/// process dies mid-sweep. Returns the number of messages delivered.
pub async fn reminder_sweep(
    store: &Store,
    notifier: &dyn Notifier,
    now: NaiveDateTime,
) -> Result<usize, StoreError> {
    let mut due = Vec::new();
    for b in store.due_start_reminders(now).await {
        due.push((b, ReminderKind::Start));
    }
    for b in store.due_end_notices(now).await {
        due.push((b, ReminderKind::End));
    }

    let mut outgoing = Vec::with_capacity(due.len());
    for (booking, kind) in due {
        // false: another sweep got there first
        if store.mark_reminded(booking.id, kind).await? {
            outgoing.push((booking, kind));
        }
    }

    let sends = outgoing.iter().map(|(booking, kind)| async move {
        let reply = Reply::text(reminder_text(booking, *kind));
        let result = notifier.send(booking.user_id, &reply).await;
        (booking, *kind, result)
    });

    let mut delivered = 0;
    for (booking, kind, result) in join_all(sends).await {
        let label = kind_label(kind);
        match result {
            Ok(()) => {
                delivered += 1;
                metrics::counter!(REMINDERS_SENT_TOTAL, "kind" => label).increment(1);
                debug!(id = booking.id, user = booking.user_id, kind = label, "reminder sent");
            }
            Err(e) => {
                metrics::counter!(REMINDERS_FAILED_TOTAL, "kind" => label).increment(1);
                warn!(id = booking.id, user = booking.user_id, kind = label, "reminder not delivered: {e}");
            }
        }
    }
    Ok(delivered)
}

/// Delete bookings that started more than `retention_days` before `now`'s date.
pub async fn expiry_sweep(
    store: &Store,
    now: NaiveDateTime,
    retention_days: i64,
) -> Result<Vec<BookingId>, StoreError> {
    let cutoff = now.date() - chrono::Duration::days(retention_days);
    let purged = store.purge_started_before(cutoff).await?;
    if !purged.is_empty() {
        metrics::counter!(BOOKINGS_PURGED_TOTAL).increment(purged.len() as u64);
        info!(count = purged.len(), %cutoff, "purged old bookings");
    }
    Ok(purged)
}

/// Every minute, deliver due reminders until `shutdown` fires.
pub async fn run_reminders(
    store: Arc<Store>,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(REMINDER_PERIOD);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        if let Err(e) = reminder_sweep(&store, notifier.as_ref(), clock.now()).await {
            error!("reminder sweep failed: {e}");
        }
    }
    debug!("reminder task stopped");
}

/// Once a day, purge old bookings. The first sweep runs at start-up.
pub async fn run_expiry(
    store: Arc<Store>,
    clock: Clock,
    retention_days: i64,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(EXPIRY_PERIOD);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        // A failed sweep is repeated on the next tick.
        if let Err(e) = expiry_sweep(&store, clock.now(), retention_days).await {
            error!("expiry sweep failed: {e}");
        }
    }
    debug!("expiry task stopped");
}

/// Rewrite the log once more than `threshold` appends piled up since the last rewrite.
pub async fn run_compactor(store: Arc<Store>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_PERIOD);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => {
                let bookings = store.len().await;
                info!(appends, bookings, "booking log compacted");
            }
            Err(e) => error!("compaction failed: {e}"),
        }
    }
    debug!("compactor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_scheduler");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn start_reminder_fires_once() {
        let store = Store::open(test_wal_path("start_once.wal")).unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        store
            .create_booking(7, Span::new(at(10, 12, 0), at(10, 13, 0)))
            .await
            .unwrap();

        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 44)).await.unwrap(), 0);
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 45)).await.unwrap(), 1);
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 46)).await.unwrap(), 0);

        let (user, reply) = rx.recv().await.unwrap();
        assert_eq!(user, 7);
        assert!(reply.text.contains("It starts at 12:00."));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_booking_reminder_names_the_start_time() {
        let store = Store::open(test_wal_path("late_booking.wal")).unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        store
            .create_booking(7, Span::new(at(10, 12, 0), at(10, 13, 0)))
            .await
            .unwrap();

        // booked two minutes before the start, inside the reminder window
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 58)).await.unwrap(), 1);
        let (_, reply) = rx.recv().await.unwrap();
        assert_eq!(
            reply.text,
            "You booked 10.01.2030 12:00 - 10.01.2030 13:00. It starts at 12:00."
        );
    }

    #[tokio::test]
    async fn end_notice_fires_once_after_end() {
        let store = Store::open(test_wal_path("end_once.wal")).unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        store
            .create_booking(7, Span::new(at(10, 23, 30), at(11, 0, 30)))
            .await
            .unwrap();

        assert_eq!(reminder_sweep(&store, &notifier, at(11, 0, 29)).await.unwrap(), 0);
        assert_eq!(reminder_sweep(&store, &notifier, at(11, 0, 32)).await.unwrap(), 1);
        assert_eq!(reminder_sweep(&store, &notifier, at(11, 0, 33)).await.unwrap(), 0);

        let (_, reply) = rx.recv().await.unwrap();
        assert!(reply.text.contains("has ended"));
        assert!(reply.text.contains("10.01.2030 23:30 - 11.01.2030 00:30"));
    }

    #[tokio::test]
    async fn missed_window_is_skipped() {
        let store = Store::open(test_wal_path("missed.wal")).unwrap();
        let (notifier, _rx) = ChannelNotifier::new();
        store
            .create_booking(7, Span::new(at(10, 12, 0), at(10, 13, 0)))
            .await
            .unwrap();

        // process was down through the whole booking and 15 minutes after
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 13, 15)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reminders_survive_restart_without_repeats() {
        let path = test_wal_path("restart.wal");
        {
            let store = Store::open(path.clone()).unwrap();
            let (notifier, _rx) = ChannelNotifier::new();
            store
                .create_booking(7, Span::new(at(10, 12, 0), at(10, 13, 0)))
                .await
                .unwrap();
            assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 50)).await.unwrap(), 1);
        }

        let store = Store::open(path).unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 55)).await.unwrap(), 0);
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 13, 0)).await.unwrap(), 1);
        let (_, reply) = rx.recv().await.unwrap();
        assert!(reply.text.contains("has ended"));
    }

    #[tokio::test]
    async fn failed_delivery_is_not_retried() {
        let store = Store::open(test_wal_path("failed.wal")).unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.block(7);
        let b = store
            .create_booking(7, Span::new(at(10, 12, 0), at(10, 13, 0)))
            .await
            .unwrap();
        store
            .create_booking(8, Span::new(at(10, 14, 0), at(10, 15, 0)))
            .await
            .unwrap();

        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 50)).await.unwrap(), 0);
        assert!(store.get_booking(b.id).await.unwrap().start_reminded);
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 11, 51)).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());

        // other users are unaffected
        assert_eq!(reminder_sweep(&store, &notifier, at(10, 13, 50)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expiry_keeps_recent_and_drops_old() {
        let store = Store::open(test_wal_path("expiry.wal")).unwrap();
        store
            .create_booking(7, Span::new(at(1, 10, 0), at(1, 11, 0)))
            .await
            .unwrap();

        assert!(expiry_sweep(&store, at(7, 3, 0), 7).await.unwrap().is_empty());
        assert_eq!(store.len().await, 1);

        assert_eq!(expiry_sweep(&store, at(9, 3, 0), 7).await.unwrap().len(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn loops_stop_on_shutdown() {
        let store = Arc::new(Store::open(test_wal_path("shutdown.wal")).unwrap());
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        let clock = Clock::new(chrono_tz::Europe::Moscow);
        let token = CancellationToken::new();

        let handles = vec![
            tokio::spawn(run_reminders(store.clone(), notifier, clock, token.clone())),
            tokio::spawn(run_expiry(store.clone(), clock, 7, token.clone())),
            tokio::spawn(run_compactor(store.clone(), 1000, token.clone())),
        ];
        token.cancel();
        for h in handles {
            tokio::time::timeout(Duration::from_secs(5), h)
                .await
                .expect("task did not stop")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn compactor_rewrites_past_threshold() {
        let store = Arc::new(Store::open(test_wal_path("compactor.wal")).unwrap());
        for h in [6, 8, 10] {
            store
                .create_booking(7, Span::new(at(10, h, 0), at(10, h, 30)))
                .await
                .unwrap();
        }
        let token = CancellationToken::new();
        let task = tokio::spawn(run_compactor(store.clone(), 2, token.clone()));

        // the first interval tick is immediate
        for _ in 0..50 {
            if store.wal_appends_since_compact().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(store.wal_appends_since_compact().await, 0);
        assert_eq!(store.len().await, 3);

        token.cancel();
        task.await.unwrap();
    }
}
