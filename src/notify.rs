use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{
    auth::new_id,
    models::{Actor, BookingStatus, NotificationType},
    state::AppState,
};

pub const EVENT_PROVIDER_BOOKED: &str = "provider-booked";
pub const EVENT_BOOKING_CONFIRMED: &str = "booking-confirmed";
pub const EVENT_BOOKING_CANCELLED: &str = "booking-cancelled";
pub const EVENT_CUSTOMER_CANCELLED: &str = "customer-cancelled-booking";
pub const EVENT_COMPLETION_APPROVAL: &str = "booking-completion-approval";
pub const EVENT_COMPLETION_REJECTED: &str = "booking-completion-rejected";
pub const EVENT_BOOKING_COMPLETED: &str = "booking-completed";
pub const EVENT_REVIEW_ADDED: &str = "customer-review-added";

/// A typed event addressed to a single user's logical channel.
#[derive(Clone, Debug, Serialize)]
pub struct UserEvent {
    pub recipient_id: String,
    pub event: String,
    pub message: String,
    pub timestamp: String,
}

/// In-process fan-out over a broadcast channel. Live connections subscribe
/// and filter down to their own user id; `emit` is fire-and-forget with
/// at-most-once delivery and no queueing for absent recipients.
#[derive(Clone)]
pub struct Relay {
    tx: broadcast::Sender<UserEvent>,
}

impl Relay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, recipient_id: &str, event: &str, message: &str) {
        // A send error only means nobody is connected right now.
        let _ = self.tx.send(UserEvent {
            recipient_id: recipient_id.to_string(),
            event: event.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }
}

/// One directed notification: a durable record plus a best-effort live event.
pub struct Notice<'a> {
    pub recipient_id: &'a str,
    pub kind: NotificationType,
    pub event: &'a str,
    pub message: String,
    pub booking_id: Option<&'a str>,
    pub service_id: Option<&'a str>,
    pub sender_id: Option<&'a str>,
}

/// Persists the notification record and pushes the live event. Both halves
/// are side effects of an already-committed primary write, so failures are
/// logged and never propagated.
pub async fn send(state: &AppState, notice: Notice<'_>) {
    persist(&state.db, &notice).await;
    state.relay.emit(notice.recipient_id, notice.event, &notice.message);
}

async fn persist(pool: &SqlitePool, notice: &Notice<'_>) {
    let result = sqlx::query(
        r#"INSERT INTO notifications
               (id, recipient_id, type, booking_id, service_id, sender_id, message, is_read, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(new_id())
    .bind(notice.recipient_id)
    .bind(notice.kind.as_str())
    .bind(notice.booking_id)
    .bind(notice.service_id)
    .bind(notice.sender_id)
    .bind(&notice.message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!(
            "Failed to persist notification for {}: {err}",
            notice.recipient_id
        );
    }
}

/// Event name and record type for a status transition, directed at the
/// counter-party of whoever performed it.
pub fn transition_event(to: BookingStatus, actor: Actor) -> (&'static str, NotificationType) {
    match (to, actor) {
        (BookingStatus::Confirmed, Actor::Provider) => {
            (EVENT_BOOKING_CONFIRMED, NotificationType::BookingUpdate)
        }
        (BookingStatus::Confirmed, Actor::Customer) => {
            (EVENT_COMPLETION_REJECTED, NotificationType::BookingUpdate)
        }
        (BookingStatus::Cancelled, Actor::Provider) => {
            (EVENT_BOOKING_CANCELLED, NotificationType::BookingUpdate)
        }
        (BookingStatus::Cancelled, Actor::Customer) => {
            (EVENT_CUSTOMER_CANCELLED, NotificationType::BookingUpdate)
        }
        (BookingStatus::AwaitingCompletion, Actor::Provider) => {
            (EVENT_COMPLETION_APPROVAL, NotificationType::AwaitingApproval)
        }
        (BookingStatus::Completed, Actor::Customer) => {
            (EVENT_BOOKING_COMPLETED, NotificationType::BookingUpdate)
        }
        // Unreachable for transitions that passed the table check.
        _ => ("booking-update", NotificationType::BookingUpdate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_map_to_their_directed_events() {
        assert_eq!(
            transition_event(BookingStatus::Confirmed, Actor::Provider).0,
            EVENT_BOOKING_CONFIRMED
        );
        assert_eq!(
            transition_event(BookingStatus::Cancelled, Actor::Provider).0,
            EVENT_BOOKING_CANCELLED
        );
        assert_eq!(
            transition_event(BookingStatus::Cancelled, Actor::Customer).0,
            EVENT_CUSTOMER_CANCELLED
        );
        assert_eq!(
            transition_event(BookingStatus::AwaitingCompletion, Actor::Provider),
            (EVENT_COMPLETION_APPROVAL, NotificationType::AwaitingApproval)
        );
        assert_eq!(
            transition_event(BookingStatus::Completed, Actor::Customer).0,
            EVENT_BOOKING_COMPLETED
        );
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let relay = Relay::new(4);
        relay.emit("nobody", EVENT_BOOKING_CONFIRMED, "hello");
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let relay = Relay::new(4);
        let mut rx = relay.subscribe();
        relay.emit("user-1", EVENT_PROVIDER_BOOKED, "booked");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.recipient_id, "user-1");
        assert_eq!(event.event, EVENT_PROVIDER_BOOKED);
        assert_eq!(event.message, "booked");
    }
}
