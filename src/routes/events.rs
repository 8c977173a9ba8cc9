use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{notify::UserEvent, state::AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/events").route(web::get().to(stream_events)));
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    user_id: Option<String>,
}

/// One live connection joins the logical channel named by its user id:
/// the process-wide broadcast is filtered down to events addressed to
/// that user. A connection without a user id stays open but never
/// receives anything.
async fn stream_events(state: web::Data<AppState>, query: web::Query<EventsQuery>) -> HttpResponse {
    let user_id = query
        .into_inner()
        .user_id
        .filter(|id| !id.trim().is_empty());
    if user_id.is_none() {
        log::warn!("Live connection opened without a user id; no events will be delivered");
    }

    let rx = state.relay.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = result.ok()?;
        if Some(event.recipient_id.as_str()) != user_id.as_deref() {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &UserEvent) -> web::Bytes {
    let payload = serde_json::json!({
        "message": event.message,
        "timestamp": event.timestamp,
    });
    web::Bytes::from(format!("event: {}\ndata: {}\n\n", event.event, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn events_serialize_as_named_sse_messages() {
        let event = UserEvent {
            recipient_id: "user-1".into(),
            event: "booking-confirmed".into(),
            message: "Booking confirmed".into(),
            timestamp: Utc::now().to_rfc3339(),
        };
        let bytes = event_to_bytes(&event);
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: booking-confirmed\ndata: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"message\":\"Booking confirmed\""));
    }
}
