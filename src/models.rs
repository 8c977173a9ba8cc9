use serde::Serialize;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_PROVIDER: &str = "service_provider";

/// Lifecycle of a booking. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    AwaitingCompletion,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::AwaitingCompletion => "awaiting_completion",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "awaiting_completion" => Some(BookingStatus::AwaitingCompletion),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

/// Which side of the booking is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer,
    Provider,
}

/// The full transition table. Anything not listed here is rejected,
/// which also covers writes against a terminal status.
pub fn transition_allowed(from: BookingStatus, to: BookingStatus, actor: Actor) -> bool {
    use Actor::*;
    use BookingStatus::*;
    matches!(
        (from, to, actor),
        (Pending, Confirmed, Provider)
            | (Pending, Cancelled, Provider)
            | (Pending, Cancelled, Customer)
            | (Confirmed, Cancelled, Provider)
            | (Confirmed, Cancelled, Customer)
            | (Confirmed, AwaitingCompletion, Provider)
            | (AwaitingCompletion, Completed, Customer)
            | (AwaitingCompletion, Confirmed, Customer)
    )
}

/// Persisted notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    BookingUpdate,
    AwaitingApproval,
    ReviewSubmitted,
    System,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::BookingUpdate => "booking_update",
            NotificationType::AwaitingApproval => "awaiting_approval",
            NotificationType::ReviewSubmitted => "review_submitted",
            NotificationType::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "booking_update" => Some(NotificationType::BookingUpdate),
            "awaiting_approval" => Some(NotificationType::AwaitingApproval),
            "review_submitted" => Some(NotificationType::ReviewSubmitted),
            "system" => Some(NotificationType::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub phone: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub experience: Option<String>,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub total_bookings: i64,
    pub rating: f64,
    pub review_count: i64,
    pub created_at: String,
}

impl UserRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub provider_id: String,
    pub provider_name: Option<String>,
    pub is_active: bool,
    pub average_rating: f64,
    pub review_count: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingRow {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub date: String,
    pub time: String,
    pub status: String,
    pub is_paid: bool,
    pub payment_method: Option<String>,
    pub customer_name: String,
    pub service_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRow {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub provider_id: String,
    pub booking_id: String,
    pub service_id: String,
    pub rating: i64,
    pub comment: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub booking_id: Option<String>,
    pub service_id: Option<String>,
    pub sender_id: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use Actor::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 5] = [Pending, Confirmed, Cancelled, AwaitingCompletion, Completed];

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("declined"), None);
        assert_eq!(BookingStatus::parse(""), None);
    }

    #[test]
    fn provider_drives_confirmation_and_completion_request() {
        assert!(transition_allowed(Pending, Confirmed, Provider));
        assert!(!transition_allowed(Pending, Confirmed, Customer));
        assert!(transition_allowed(Confirmed, AwaitingCompletion, Provider));
        assert!(!transition_allowed(Confirmed, AwaitingCompletion, Customer));
    }

    #[test]
    fn customer_resolves_completion_requests() {
        assert!(transition_allowed(AwaitingCompletion, Completed, Customer));
        assert!(transition_allowed(AwaitingCompletion, Confirmed, Customer));
        assert!(!transition_allowed(AwaitingCompletion, Completed, Provider));
        assert!(!transition_allowed(AwaitingCompletion, Confirmed, Provider));
    }

    #[test]
    fn either_party_cancels_before_completion() {
        for actor in [Customer, Provider] {
            assert!(transition_allowed(Pending, Cancelled, actor));
            assert!(transition_allowed(Confirmed, Cancelled, actor));
            assert!(!transition_allowed(AwaitingCompletion, Cancelled, actor));
        }
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for from in [Completed, Cancelled] {
            assert!(from.is_terminal());
            for to in ALL {
                for actor in [Customer, Provider] {
                    assert!(!transition_allowed(from, to, actor));
                }
            }
        }
    }

    #[test]
    fn no_self_transitions() {
        for status in ALL {
            for actor in [Customer, Provider] {
                assert!(!transition_allowed(status, status, actor));
            }
        }
    }

    #[test]
    fn notification_type_round_trips() {
        for kind in [
            NotificationType::BookingUpdate,
            NotificationType::AwaitingApproval,
            NotificationType::ReviewSubmitted,
            NotificationType::System,
        ] {
            assert_eq!(NotificationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationType::parse("email"), None);
    }
}
