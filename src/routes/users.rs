use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::{auth::AuthUser, db, error::ApiError, models::ROLE_PROVIDER, state::AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/user/profile").route(web::patch().to(update_profile)));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate {
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    // Provider-only fields.
    experience: Option<String>,
    description: Option<String>,
    profile_image: Option<String>,
}

impl ProfileUpdate {
    fn validate(&self, role: &str) -> Result<(), ApiError> {
        if let Some(name) = &self.first_name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("first name cannot be empty".into()));
            }
        }
        if let Some(name) = &self.last_name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("last name cannot be empty".into()));
            }
        }
        let has_provider_fields = self.experience.is_some()
            || self.description.is_some()
            || self.profile_image.is_some();
        if has_provider_fields && role != ROLE_PROVIDER {
            return Err(ApiError::Forbidden(
                "provider fields cannot be set on a customer profile".into(),
            ));
        }
        Ok(())
    }
}

async fn update_profile(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload.validate(&user.role)?;

    let mut row = db::fetch_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    if let Some(value) = payload.first_name {
        row.first_name = value.trim().to_string();
    }
    if let Some(value) = payload.last_name {
        row.last_name = value.trim().to_string();
    }
    if let Some(value) = payload.phone {
        row.phone = value;
    }
    if let Some(value) = payload.address {
        row.address = value;
    }
    if payload.latitude.is_some() {
        row.latitude = payload.latitude;
    }
    if payload.longitude.is_some() {
        row.longitude = payload.longitude;
    }
    if payload.experience.is_some() {
        row.experience = payload.experience;
    }
    if payload.description.is_some() {
        row.description = payload.description;
    }
    if payload.profile_image.is_some() {
        row.profile_image = payload.profile_image;
    }

    sqlx::query(
        r#"UPDATE users SET
               first_name = ?, last_name = ?, phone = ?, address = ?,
               latitude = ?, longitude = ?, experience = ?, description = ?, profile_image = ?
           WHERE id = ?"#,
    )
    .bind(&row.first_name)
    .bind(&row.last_name)
    .bind(&row.phone)
    .bind(&row.address)
    .bind(row.latitude)
    .bind(row.longitude)
    .bind(&row.experience)
    .bind(&row.description)
    .bind(&row.profile_image)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(row))
}
