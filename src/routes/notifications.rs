use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, AuthUser},
    error::ApiError,
    models::{NotificationRow, NotificationType},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .service(
                web::resource("/user/{id}/mark-all-read").route(web::patch().to(mark_all_read)),
            )
            .service(web::resource("/user/{id}/unread/count").route(web::get().to(unread_count)))
            .service(web::resource("/user/{id}/unread").route(web::get().to(list_unread)))
            .service(web::resource("/user/{id}").route(web::get().to(list_for_user)))
            .service(web::resource("/{id}/read").route(web::patch().to(mark_read)))
            .service(web::resource("").route(web::post().to(create))),
    );
}

const NOTIFICATION_COLUMNS: &str = r#"id, recipient_id, type, booking_id, service_id, sender_id,
       message, is_read, created_at"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateNotificationPayload {
    recipient_id: String,
    #[serde(rename = "type")]
    kind: String,
    message: String,
    booking_id: Option<String>,
    service_id: Option<String>,
}

impl CreateNotificationPayload {
    fn validate(&self) -> Result<NotificationType, ApiError> {
        if self.recipient_id.trim().is_empty() {
            return Err(ApiError::Validation("recipient id is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(ApiError::Validation("message is required".into()));
        }
        NotificationType::parse(&self.kind)
            .ok_or_else(|| ApiError::Validation(format!("unknown notification type '{}'", self.kind)))
    }
}

async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateNotificationPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let kind = payload.validate()?;

    // Direct creation is a primary write, unlike the relay side effects,
    // so a store failure here does surface to the caller.
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO notifications
               (id, recipient_id, type, booking_id, service_id, sender_id, message, is_read, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&id)
    .bind(&payload.recipient_id)
    .bind(kind.as_str())
    .bind(&payload.booking_id)
    .bind(&payload.service_id)
    .bind(&user.id)
    .bind(&payload.message)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    state
        .relay
        .emit(&payload.recipient_id, kind.as_str(), &payload.message);

    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ? LIMIT 1"
    ))
    .bind(&id)
    .fetch_one(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(row))
}

async fn list_for_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let recipient_id = path.into_inner();
    if user.id != recipient_id {
        return Err(ApiError::Forbidden("not your notifications".into()));
    }
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        r#"SELECT {NOTIFICATION_COLUMNS}
           FROM notifications
           WHERE recipient_id = ?
           ORDER BY created_at DESC"#
    ))
    .bind(&recipient_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn list_unread(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let recipient_id = path.into_inner();
    if user.id != recipient_id {
        return Err(ApiError::Forbidden("not your notifications".into()));
    }
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        r#"SELECT {NOTIFICATION_COLUMNS}
           FROM notifications
           WHERE recipient_id = ? AND is_read = 0
           ORDER BY created_at DESC"#
    ))
    .bind(&recipient_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn unread_count(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let recipient_id = path.into_inner();
    if user.id != recipient_id {
        return Err(ApiError::Forbidden("not your notifications".into()));
    }
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
    )
    .bind(&recipient_id)
    .fetch_one(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let notification_id = path.into_inner();
    let recipient = sqlx::query_scalar::<_, String>(
        "SELECT recipient_id FROM notifications WHERE id = ? LIMIT 1",
    )
    .bind(&notification_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("notification not found".into()))?;
    if recipient != user.id {
        return Err(ApiError::Forbidden("not your notification".into()));
    }

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
        .bind(&notification_id)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "notification marked read" })))
}

async fn mark_all_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let recipient_id = path.into_inner();
    if user.id != recipient_id {
        return Err(ApiError::Forbidden("not your notifications".into()));
    }
    let result =
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0")
            .bind(&recipient_id)
            .execute(&state.db)
            .await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": result.rows_affected() })))
}
