use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::{new_id, AuthUser},
    db,
    error::ApiError,
    models::{
        transition_allowed, Actor, BookingRow, BookingStatus, NotificationType, ROLE_CUSTOMER,
    },
    notify::{self, Notice, EVENT_PROVIDER_BOOKED},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .service(web::resource("/customer/{id}").route(web::get().to(by_customer)))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(web::resource("/{id}").route(web::put().to(update))),
    );
}

async fn list(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let column = if user.role == ROLE_CUSTOMER {
        "customer_id"
    } else {
        "provider_id"
    };
    let rows = sqlx::query_as::<_, BookingRow>(&format!(
        r#"SELECT id, customer_id, provider_id, service_id, date, time, status,
                  is_paid, payment_method, customer_name, service_name,
                  customer_email, customer_phone, customer_address, created_at
           FROM bookings
           WHERE {column} = ?
           ORDER BY created_at DESC"#
    ))
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn by_customer(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let customer_id = path.into_inner();
    if user.id != customer_id {
        return Err(ApiError::Forbidden("not your bookings".into()));
    }
    let rows = sqlx::query_as::<_, BookingRow>(
        r#"SELECT id, customer_id, provider_id, service_id, date, time, status,
                  is_paid, payment_method, customer_name, service_name,
                  customer_email, customer_phone, customer_address, created_at
           FROM bookings
           WHERE customer_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(&customer_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingPayload {
    service_id: String,
    date: String,
    time: String,
    payment_method: Option<String>,
}

impl CreateBookingPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.service_id.trim().is_empty() {
            return Err(ApiError::Validation("service id is required".into()));
        }
        if self.date.trim().is_empty() {
            return Err(ApiError::Validation("date is required".into()));
        }
        if self.time.trim().is_empty() {
            return Err(ApiError::Validation("time is required".into()));
        }
        Ok(())
    }
}

async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateBookingPayload>,
) -> Result<HttpResponse, ApiError> {
    if user.role != ROLE_CUSTOMER {
        return Err(ApiError::Forbidden("only customers can create bookings".into()));
    }
    let payload = payload.into_inner();
    payload.validate()?;

    let service = db::fetch_service(&state.db, &payload.service_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    if !service.is_active {
        return Err(ApiError::Conflict("service is no longer active".into()));
    }

    let customer = db::fetch_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    // Contact fields are snapshotted at creation time and stay as they
    // were even if the customer later edits their profile.
    let booking_id = new_id();
    sqlx::query(
        r#"INSERT INTO bookings
               (id, customer_id, provider_id, service_id, date, time, status,
                is_paid, payment_method, customer_name, service_name,
                customer_email, customer_phone, customer_address, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&booking_id)
    .bind(&customer.id)
    .bind(&service.provider_id)
    .bind(&service.id)
    .bind(payload.date.trim())
    .bind(payload.time.trim())
    .bind(BookingStatus::Pending.as_str())
    .bind(&payload.payment_method)
    .bind(customer.full_name())
    .bind(&service.name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .bind(&customer.address)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    // Secondary write; a failure here must not fail the booking.
    if let Err(err) =
        sqlx::query("UPDATE users SET total_bookings = total_bookings + 1 WHERE id = ?")
            .bind(&service.provider_id)
            .execute(&state.db)
            .await
    {
        log::warn!("Failed to bump total_bookings for {}: {err}", service.provider_id);
    }

    notify::send(
        &state,
        Notice {
            recipient_id: &service.provider_id,
            kind: NotificationType::BookingUpdate,
            event: EVENT_PROVIDER_BOOKED,
            message: format!(
                "{} booked {} for {} at {}",
                customer.full_name(),
                service.name,
                payload.date.trim(),
                payload.time.trim()
            ),
            booking_id: Some(&booking_id),
            service_id: Some(&service.id),
            sender_id: Some(&customer.id),
        },
    )
    .await;

    let booking = db::fetch_booking(&state.db, &booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;
    Ok(HttpResponse::Created().json(booking))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBookingPayload {
    status: Option<String>,
    is_paid: Option<bool>,
    payment_method: Option<String>,
}

async fn update(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateBookingPayload>,
) -> Result<HttpResponse, ApiError> {
    let booking_id = path.into_inner();
    let payload = payload.into_inner();

    // Out-of-enum values are rejected before any read.
    let target = match payload.status.as_deref() {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };

    let booking = db::fetch_booking(&state.db, &booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    let actor = if user.id == booking.customer_id {
        Actor::Customer
    } else if user.id == booking.provider_id {
        Actor::Provider
    } else {
        return Err(ApiError::Forbidden("not a party to this booking".into()));
    };

    let Some(target) = target else {
        // Plain field edit, no transition.
        sqlx::query(
            r#"UPDATE bookings SET
                   is_paid = COALESCE(?, is_paid),
                   payment_method = COALESCE(?, payment_method)
               WHERE id = ?"#,
        )
        .bind(payload.is_paid)
        .bind(&payload.payment_method)
        .bind(&booking_id)
        .execute(&state.db)
        .await?;
        let booking = db::fetch_booking(&state.db, &booking_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;
        return Ok(HttpResponse::Ok().json(booking));
    };

    let current = BookingStatus::parse(&booking.status).ok_or_else(|| {
        ApiError::Internal(sqlx::Error::Protocol(format!(
            "booking {booking_id} carries unknown status '{}'",
            booking.status
        )))
    })?;

    if !transition_allowed(current, target, actor) {
        return Err(ApiError::Conflict(format!(
            "cannot move a {} booking to {}",
            current.as_str(),
            target.as_str()
        )));
    }

    // Conditional on the status we read, so a concurrent transition
    // cannot slip an invalid edge through.
    let result = sqlx::query(
        r#"UPDATE bookings SET
               status = ?,
               is_paid = COALESCE(?, is_paid),
               payment_method = COALESCE(?, payment_method)
           WHERE id = ? AND status = ?"#,
    )
    .bind(target.as_str())
    .bind(payload.is_paid)
    .bind(&payload.payment_method)
    .bind(&booking_id)
    .bind(current.as_str())
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict("booking status changed concurrently".into()));
    }

    let (recipient, sender) = match actor {
        Actor::Customer => (&booking.provider_id, &booking.customer_id),
        Actor::Provider => (&booking.customer_id, &booking.provider_id),
    };
    let (event, kind) = notify::transition_event(target, actor);
    notify::send(
        &state,
        Notice {
            recipient_id: recipient,
            kind,
            event,
            message: format!(
                "Booking for {} on {} is now {}",
                booking.service_name,
                booking.date,
                target.as_str()
            ),
            booking_id: Some(&booking_id),
            service_id: Some(&booking.service_id),
            sender_id: Some(sender),
        },
    )
    .await;

    let booking = db::fetch_booking(&state.db, &booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;
    Ok(HttpResponse::Ok().json(booking))
}
