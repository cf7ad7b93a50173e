use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use slotbook::model::UserId;
use slotbook::notify::{ChannelNotifier, Notifier};
use slotbook::scheduler::{expiry_sweep, reminder_sweep};
use slotbook::store::Store;
use slotbook::workflow::{Action, Inbound, Reply, SessionState, Workflow};

// ── Test infrastructure ──────────────────────────────────────

const ALICE: UserId = 9001;
const BOB: UserId = 9002;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2031, 3, d).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    day(d).and_hms_opt(h, m, 0).unwrap()
}

fn fresh_wal(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotbook_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// A workflow whose replies are pushed through a notifier, the way the bot
/// adapter forwards them to the chat.
struct Harness {
    workflow: Workflow,
    notifier: ChannelNotifier,
    outbox: mpsc::UnboundedReceiver<(UserId, Reply)>,
}

impl Harness {
    fn new(wal: PathBuf) -> Self {
        let store = Arc::new(Store::open(wal).unwrap());
        let (notifier, outbox) = ChannelNotifier::new();
        Self {
            workflow: Workflow::new(store),
            notifier,
            outbox,
        }
    }

    fn store(&self) -> &Store {
        self.workflow.store()
    }

    async fn send(&mut self, user: UserId, inbound: Inbound, now: NaiveDateTime) -> Vec<Reply> {
        for reply in self.workflow.handle(user, inbound, now).await {
            self.notifier.send(user, &reply).await.unwrap();
        }
        let mut received = Vec::new();
        while let Ok((to, reply)) = self.outbox.try_recv() {
            assert_eq!(to, user);
            received.push(reply);
        }
        received
    }

    async fn text(&mut self, user: UserId, text: &str, now: NaiveDateTime) -> Vec<Reply> {
        self.send(user, Inbound::Text(text.to_string()), now).await
    }

    async fn tap(&mut self, user: UserId, action: Action, now: NaiveDateTime) -> Vec<Reply> {
        self.send(user, Inbound::Action(action), now).await
    }

    /// Tap a button by its rendered callback data, as the chat client would.
    async fn tap_data(&mut self, user: UserId, data: &str, now: NaiveDateTime) -> Vec<Reply> {
        let action = Action::decode(data).unwrap();
        self.tap(user, action, now).await
    }
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn full_conversation_then_reminders_then_expiry() {
    let mut h = Harness::new(fresh_wal("full_conversation.wal"));
    let now = at(10, 8, 0);

    let menu = h.send(ALICE, Inbound::Start, now).await;
    assert_eq!(menu.len(), 1);
    let book = menu[0].buttons().find(|b| b.label == "Book").unwrap().action;

    let dates = h.tap(ALICE, book, now).await;
    assert_eq!(dates[0].buttons().count(), 7);
    let first = dates[0].buttons().next().unwrap().action;
    assert_eq!(first, Action::Date(day(10)));

    let listing = h.tap_data(ALICE, "date:2031-03-10", now).await;
    assert_eq!(listing.len(), 2);
    assert!(listing[0].text.contains("10.03.2031 00:00 - 11.03.2031 04:00"));

    let booked = h.text(ALICE, "18:00\u{2013}19:30", now).await;
    assert!(booked[0].text.starts_with("Booked: 10.03.2031 18:00 - 10.03.2031 19:30"));
    assert_eq!(h.workflow.sessions().get(ALICE), SessionState::Idle);

    // Bob sees the gap and cannot squeeze in next to Alice.
    let listing = h.tap_data(BOB, "date:2031-03-10", now).await;
    assert!(listing[0].text.contains("10.03.2031 00:00 - 10.03.2031 17:30"));
    assert!(listing[0].text.contains("10.03.2031 20:00 - 11.03.2031 04:00"));
    let refused = h.text(BOB, "19:45-20:30", now).await;
    assert!(refused[0].text.contains("overlaps"));

    // Reminders.
    let (notifier, mut rx) = ChannelNotifier::new();
    assert_eq!(reminder_sweep(h.store(), &notifier, at(10, 17, 45)).await.unwrap(), 1);
    assert_eq!(reminder_sweep(h.store(), &notifier, at(10, 17, 50)).await.unwrap(), 0);
    assert_eq!(reminder_sweep(h.store(), &notifier, at(10, 19, 30)).await.unwrap(), 1);
    let (to, start) = rx.recv().await.unwrap();
    assert_eq!(to, ALICE);
    assert!(start.text.contains("It starts at 18:00."));
    let (_, end) = rx.recv().await.unwrap();
    assert!(end.text.contains("has ended"));

    // A week later the booking is still there, eight days later it is gone.
    assert!(expiry_sweep(h.store(), at(16, 0, 0), 7).await.unwrap().is_empty());
    assert_eq!(expiry_sweep(h.store(), at(18, 0, 0), 7).await.unwrap().len(), 1);
    assert!(h.store().is_empty().await);
}

#[tokio::test]
async fn overnight_booking_blocks_next_morning() {
    let mut h = Harness::new(fresh_wal("overnight_next_morning.wal"));
    let now = at(10, 8, 0);

    h.tap_data(ALICE, "date:2031-03-10", now).await;
    let question = h.text(ALICE, "23:30-00:30", now).await;
    let yes = question[0].buttons().find(|b| b.label == "Yes").unwrap().action;
    let booked = h.tap(ALICE, yes, now).await;
    assert!(booked[0].text.starts_with("Booked: 10.03.2031 23:30 - 11.03.2031 00:30"));

    h.tap_data(BOB, "date:2031-03-11", now).await;
    let refused = h.text(BOB, "00:45-01:30", now).await;
    assert!(refused[0].text.contains("overlaps"));

    h.tap_data(BOB, "date:2031-03-11", now).await;
    let booked = h.text(BOB, "01:00-01:30", now).await;
    assert!(booked[0].text.starts_with("Booked"));
}

#[tokio::test]
async fn cancel_through_menu_and_restart() {
    let wal = fresh_wal("cancel_restart.wal");
    let now = at(10, 8, 0);
    {
        let mut h = Harness::new(wal.clone());
        h.tap_data(ALICE, "date:2031-03-11", now).await;
        h.text(ALICE, "09:00-10:00", now).await;
        h.tap_data(ALICE, "date:2031-03-12", now).await;
        h.text(ALICE, "09:00-10:00", now).await;

        let menu = h.tap(ALICE, Action::Cancel, now).await;
        let first = menu[0].buttons().next().unwrap();
        assert_eq!(first.label, "11.03.2031 09:00 - 11.03.2031 10:00");
        let data = first.action.encode();

        let done = h.tap_data(ALICE, &data, now).await;
        assert!(done[0].text.starts_with("Cancelled"));
        let again = h.tap_data(ALICE, &data, now).await;
        assert!(again[0].text.contains("no longer exists"));
    }

    // Sessions are gone after a restart, bookings are not.
    let mut h = Harness::new(wal);
    assert_eq!(h.workflow.sessions().active(), 0);
    let mine = h.tap(ALICE, Action::MyBookings, now).await;
    assert_eq!(mine[0].text, "Your bookings:\n12.03.2031 09:00 - 12.03.2031 10:00");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_users_get_one_booking() {
    let store = Arc::new(Store::open(fresh_wal("racing_users.wal")).unwrap());
    let workflow = Arc::new(Workflow::new(store.clone()));
    let now = at(10, 8, 0);

    let mut handles = Vec::new();
    for user in 100..120 {
        let workflow = workflow.clone();
        handles.push(tokio::spawn(async move {
            workflow
                .handle(user, Inbound::Action(Action::Date(day(11))), now)
                .await;
            workflow
                .handle(user, Inbound::Text("12:00-13:00".into()), now)
                .await
        }));
    }

    let mut booked = 0;
    for handle in handles {
        let replies = handle.await.unwrap();
        if replies[0].text.starts_with("Booked") {
            booked += 1;
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(store.len().await, 1);
}
