use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::{new_id, AuthUser},
    db,
    error::ApiError,
    models::{BookingStatus, NotificationType, ReviewRow, ROLE_CUSTOMER},
    notify::{self, Notice, EVENT_BOOKING_COMPLETED, EVENT_REVIEW_ADDED},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/review")
            .service(web::resource("/provider/{id}").route(web::get().to(by_provider)))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            ),
    );
}

const REVIEW_COLUMNS: &str = r#"r.id, r.customer_id,
       u.first_name || ' ' || u.last_name AS customer_name,
       r.provider_id, r.booking_id, r.service_id, r.rating, r.comment,
       r.is_read, r.created_at"#;

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ReviewRow>(&format!(
        r#"SELECT {REVIEW_COLUMNS}
           FROM reviews r
           LEFT JOIN users u ON r.customer_id = u.id
           ORDER BY r.created_at DESC"#
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn by_provider(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let provider_id = path.into_inner();
    let rows = sqlx::query_as::<_, ReviewRow>(&format!(
        r#"SELECT {REVIEW_COLUMNS}
           FROM reviews r
           LEFT JOIN users u ON r.customer_id = u.id
           WHERE r.provider_id = ?
           ORDER BY r.created_at DESC"#
    ))
    .bind(&provider_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReviewPayload {
    booking_id: String,
    rating: i64,
    comment: Option<String>,
}

impl CreateReviewPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.booking_id.trim().is_empty() {
            return Err(ApiError::Validation("booking id is required".into()));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(ApiError::Validation("rating must be between 1 and 5".into()));
        }
        Ok(())
    }
}

async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateReviewPayload>,
) -> Result<HttpResponse, ApiError> {
    if user.role != ROLE_CUSTOMER {
        return Err(ApiError::Forbidden("only customers can leave reviews".into()));
    }
    let payload = payload.into_inner();
    payload.validate()?;

    let booking = db::fetch_booking(&state.db, &payload.booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;
    if booking.customer_id != user.id {
        return Err(ApiError::Forbidden("not your booking".into()));
    }

    let status = BookingStatus::parse(&booking.status).ok_or_else(|| {
        ApiError::Internal(sqlx::Error::Protocol(format!(
            "booking {} carries unknown status '{}'",
            booking.id, booking.status
        )))
    })?;

    match status {
        // Submitting the review resolves an outstanding completion request.
        BookingStatus::AwaitingCompletion => {
            let result = sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
                .bind(BookingStatus::Completed.as_str())
                .bind(&booking.id)
                .bind(BookingStatus::AwaitingCompletion.as_str())
                .execute(&state.db)
                .await?;
            if result.rows_affected() == 0 {
                return Err(ApiError::Conflict("booking status changed concurrently".into()));
            }
            notify::send(
                &state,
                Notice {
                    recipient_id: &booking.provider_id,
                    kind: NotificationType::BookingUpdate,
                    event: EVENT_BOOKING_COMPLETED,
                    message: format!(
                        "Booking for {} on {} is now completed",
                        booking.service_name, booking.date
                    ),
                    booking_id: Some(&booking.id),
                    service_id: Some(&booking.service_id),
                    sender_id: Some(&booking.customer_id),
                },
            )
            .await;
        }
        BookingStatus::Completed => {}
        _ => {
            return Err(ApiError::Conflict(
                "booking is not awaiting completion".into(),
            ));
        }
    }

    let review_id = new_id();
    let insert = sqlx::query(
        r#"INSERT INTO reviews
               (id, customer_id, provider_id, booking_id, service_id, rating, comment, is_read, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&review_id)
    .bind(&booking.customer_id)
    .bind(&booking.provider_id)
    .bind(&booking.id)
    .bind(&booking.service_id)
    .bind(payload.rating)
    .bind(payload.comment.unwrap_or_default())
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(err) = insert {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Err(ApiError::Conflict("this booking already has a review".into()));
            }
        }
        return Err(err.into());
    }

    // Review is durable; the aggregate refresh retries internally and
    // never turns into a caller-visible failure.
    db::refresh_ratings(&state.db, &booking.service_id, &booking.provider_id).await;

    notify::send(
        &state,
        Notice {
            recipient_id: &booking.provider_id,
            kind: NotificationType::ReviewSubmitted,
            event: EVENT_REVIEW_ADDED,
            message: format!(
                "{} left a {}-star review on {}",
                booking.customer_name, payload.rating, booking.service_name
            ),
            booking_id: Some(&booking.id),
            service_id: Some(&booking.service_id),
            sender_id: Some(&booking.customer_id),
        },
    )
    .await;

    let review = sqlx::query_as::<_, ReviewRow>(&format!(
        r#"SELECT {REVIEW_COLUMNS}
           FROM reviews r
           LEFT JOIN users u ON r.customer_id = u.id
           WHERE r.id = ?
           LIMIT 1"#
    ))
    .bind(&review_id)
    .fetch_one(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(review))
}
