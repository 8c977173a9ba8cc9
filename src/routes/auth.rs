use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{
        clear_session_cookie, create_session, delete_session, hash_password, new_id,
        session_cookie, verify_password, AuthUser, SESSION_COOKIE,
    },
    db,
    error::ApiError,
    models::{ROLE_CUSTOMER, ROLE_PROVIDER},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(web::resource("/profile").route(web::get().to(profile)))
            .service(web::resource("/verify").route(web::get().to(verify))),
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    role: String,
    phone: Option<String>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    experience: Option<String>,
    description: Option<String>,
}

impl RegisterPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.first_name.trim().is_empty() {
            return Err(ApiError::Validation("first name is required".into()));
        }
        if self.last_name.trim().is_empty() {
            return Err(ApiError::Validation("last name is required".into()));
        }
        if !self.email.contains('@') {
            return Err(ApiError::Validation("a valid email is required".into()));
        }
        if self.password.len() < 8 {
            return Err(ApiError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        if self.role != ROLE_CUSTOMER && self.role != ROLE_PROVIDER {
            return Err(ApiError::Validation(format!(
                "role must be {ROLE_CUSTOMER} or {ROLE_PROVIDER}"
            )));
        }
        Ok(())
    }
}

async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if db::fetch_user_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict(
            "an account with that email already exists".into(),
        ));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|_| ApiError::Internal(sqlx::Error::Protocol("password hash failed".into())))?;

    sqlx::query(
        r#"INSERT INTO users
               (id, first_name, last_name, email, password_hash, role, phone, address,
                latitude, longitude, experience, description, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&email)
    .bind(password_hash)
    .bind(&payload.role)
    .bind(payload.phone.unwrap_or_default())
    .bind(payload.address.unwrap_or_default())
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.experience)
    .bind(payload.description)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "message": "account created" })))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

impl LoginPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() {
            return Err(ApiError::Validation("email is required".into()));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("password is required".into()));
        }
        Ok(())
    }
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let user = db::fetch_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("no account for that email".into()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }

    let token = create_session(&state.db, &user.id).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&req, &token))
        .json(json!({ "message": "login successful", "user": user })))
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        delete_session(&state.db, cookie.value()).await;
    }
    HttpResponse::Ok()
        .cookie(clear_session_cookie(&req))
        .json(json!({ "message": "logged out" }))
}

async fn profile(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let row = db::fetch_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    Ok(HttpResponse::Ok().json(row))
}

async fn verify(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "valid": true,
        "user": { "id": user.id, "role": user.role }
    }))
}
