use std::future::Future;
use std::pin::Pin;

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub const SESSION_COOKIE: &str = "doorstep_session";

/// Sessions expire a fixed hour after login.
const SESSION_TTL_MINUTES: i64 = 60;

/// Request-scoped identity, resolved once at the boundary from the
/// session cookie and passed down to handlers as a parameter.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub role: String,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Mints an opaque session token with a one hour expiry.
pub async fn create_session(pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    let token = new_id();
    let expires_at = (Utc::now() + chrono::Duration::minutes(SESSION_TTL_MINUTES)).to_rfc3339();
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(token)
}

pub async fn delete_session(pool: &SqlitePool, token: &str) {
    if let Err(err) = sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await
    {
        log::warn!("Failed to delete session: {err}");
    }
}

pub async fn resolve_session(pool: &SqlitePool, token: &str) -> Result<AuthUser, ApiError> {
    let row = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"SELECT u.id, u.first_name, u.last_name, u.role, s.expires_at
           FROM sessions s
           JOIN users u ON s.user_id = u.id
           WHERE s.token = ?
           LIMIT 1"#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some((id, first_name, last_name, role, expires_at)) = row else {
        return Err(ApiError::Unauthorized("invalid session".into()));
    };

    let expired = DateTime::parse_from_rfc3339(&expires_at)
        .map(|expiry| expiry.with_timezone(&Utc) < Utc::now())
        .unwrap_or(true);
    if expired {
        delete_session(pool, token).await;
        return Err(ApiError::Unauthorized("session expired".into()));
    }

    Ok(AuthUser {
        id,
        name: format!("{first_name} {last_name}"),
        role,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| ApiError::Unauthorized("missing session".into()))?
                .clone();
            let cookie = req
                .cookie(SESSION_COOKIE)
                .ok_or_else(|| ApiError::Unauthorized("missing session".into()))?;
            resolve_session(&state.db, cookie.value()).await
        })
    }
}

pub fn session_cookie(req: &HttpRequest, token: &str) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(Duration::minutes(SESSION_TTL_MINUTES));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_session_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_verification_accepts_the_original_only() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }
}
