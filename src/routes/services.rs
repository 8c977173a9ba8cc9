use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, AuthUser},
    db,
    error::ApiError,
    models::{ServiceRow, ROLE_PROVIDER},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Literal segments are registered ahead of the `{id}` catch-all.
    cfg.service(
        web::scope("/services")
            .service(web::resource("/nearby").route(web::get().to(nearby)))
            .service(web::resource("/featured-services").route(web::get().to(featured)))
            .service(web::resource("/update-all-rating").route(web::put().to(update_all_ratings)))
            .service(web::resource("/provider/{id}").route(web::get().to(by_provider)))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(detail))
                    .route(web::put().to(update))
                    .route(web::delete().to(delete)),
            ),
    );
}

const SERVICE_COLUMNS: &str = r#"s.id, s.name, s.description, s.price, s.category, s.provider_id,
       u.first_name || ' ' || u.last_name AS provider_name,
       s.is_active, s.average_rating, s.review_count,
       s.latitude, s.longitude, s.created_at"#;

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"SELECT {SERVICE_COLUMNS}
           FROM services s
           LEFT JOIN users u ON s.provider_id = u.id
           WHERE s.is_active = 1
           ORDER BY s.created_at DESC"#
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service = db::fetch_service(&state.db, &path.into_inner())
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    Ok(HttpResponse::Ok().json(service))
}

async fn featured(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"SELECT {SERVICE_COLUMNS}
           FROM services s
           LEFT JOIN users u ON s.provider_id = u.id
           WHERE s.is_active = 1
           ORDER BY s.average_rating DESC, s.review_count DESC
           LIMIT 6"#
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
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"SELECT {SERVICE_COLUMNS}
           FROM services s
           LEFT JOIN users u ON s.provider_id = u.id
           WHERE s.provider_id = ?
           ORDER BY s.created_at DESC"#
    ))
    .bind(&provider_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lng: f64,
    lat: f64,
    radius: f64,
}

async fn nearby(
    state: web::Data<AppState>,
    query: web::Query<NearbyQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    if !query.radius.is_finite() || query.radius <= 0.0 {
        return Err(ApiError::Validation("radius must be positive".into()));
    }

    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"SELECT {SERVICE_COLUMNS}
           FROM services s
           LEFT JOIN users u ON s.provider_id = u.id
           WHERE s.is_active = 1 AND s.latitude IS NOT NULL AND s.longitude IS NOT NULL"#
    ))
    .fetch_all(&state.db)
    .await?;

    let matches: Vec<ServiceRow> = rows
        .into_iter()
        .filter(|service| match (service.latitude, service.longitude) {
            (Some(lat), Some(lng)) => {
                db::within_radius(query.lat, query.lng, lat, lng, query.radius)
            }
            _ => false,
        })
        .collect();

    Ok(HttpResponse::Ok().json(matches))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateServicePayload {
    name: String,
    description: Option<String>,
    price: f64,
    category: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl CreateServicePayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("service name is required".into()));
        }
        if self.category.trim().is_empty() {
            return Err(ApiError::Validation("category is required".into()));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ApiError::Validation("price must be positive".into()));
        }
        Ok(())
    }
}

async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateServicePayload>,
) -> Result<HttpResponse, ApiError> {
    if user.role != ROLE_PROVIDER {
        return Err(ApiError::Forbidden("only providers can list services".into()));
    }
    let payload = payload.into_inner();
    payload.validate()?;

    let service_id = new_id();
    sqlx::query(
        r#"INSERT INTO services
               (id, name, description, price, category, provider_id, latitude, longitude, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&service_id)
    .bind(payload.name.trim())
    .bind(payload.description.unwrap_or_default())
    .bind(payload.price)
    .bind(payload.category.trim())
    .bind(&user.id)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let service = db::fetch_service(&state.db, &service_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    Ok(HttpResponse::Created().json(service))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateServicePayload {
    name: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    category: Option<String>,
    is_active: Option<bool>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl UpdateServicePayload {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("service name cannot be empty".into()));
            }
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price <= 0.0 {
                return Err(ApiError::Validation("price must be positive".into()));
            }
        }
        Ok(())
    }
}

async fn update(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateServicePayload>,
) -> Result<HttpResponse, ApiError> {
    let service_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate()?;

    let mut service = db::fetch_service(&state.db, &service_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    if service.provider_id != user.id {
        return Err(ApiError::Forbidden("not the owner of this service".into()));
    }

    if let Some(value) = payload.name {
        service.name = value.trim().to_string();
    }
    if let Some(value) = payload.description {
        service.description = value;
    }
    if let Some(value) = payload.price {
        service.price = value;
    }
    if let Some(value) = payload.category {
        service.category = value;
    }
    if let Some(value) = payload.is_active {
        service.is_active = value;
    }
    if payload.latitude.is_some() {
        service.latitude = payload.latitude;
    }
    if payload.longitude.is_some() {
        service.longitude = payload.longitude;
    }

    sqlx::query(
        r#"UPDATE services SET
               name = ?, description = ?, price = ?, category = ?, is_active = ?,
               latitude = ?, longitude = ?
           WHERE id = ?"#,
    )
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.price)
    .bind(&service.category)
    .bind(service.is_active)
    .bind(service.latitude)
    .bind(service.longitude)
    .bind(&service_id)
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(service))
}

async fn delete(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service_id = path.into_inner();
    let service = db::fetch_service(&state.db, &service_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    if service.provider_id != user.id {
        return Err(ApiError::Forbidden("not the owner of this service".into()));
    }

    sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(&service_id)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "service deleted" })))
}

async fn update_all_ratings(
    state: web::Data<AppState>,
    _user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let updated = db::recompute_all_ratings(&state.db).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "ratings recomputed", "updated": updated })))
}
