use std::{fs, path::Path};

use sqlx::SqlitePool;

use crate::models::{BookingRow, ServiceRow, UserRow};

/// Mean Earth radius used to turn a kilometre radius into a central angle.
pub const EARTH_RADIUS_KM: f64 = 6378.1;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn fetch_user(pool: &SqlitePool, id: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, first_name, last_name, email, password_hash, role, phone, address,
                  latitude, longitude, experience, description, profile_image,
                  total_bookings, rating, review_count, created_at
           FROM users
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, first_name, last_name, email, password_hash, role, phone, address,
                  latitude, longitude, experience, description, profile_image,
                  total_bookings, rating, review_count, created_at
           FROM users
           WHERE email = ?
           LIMIT 1"#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_service(pool: &SqlitePool, id: &str) -> Result<Option<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        r#"SELECT s.id, s.name, s.description, s.price, s.category, s.provider_id,
                  u.first_name || ' ' || u.last_name AS provider_name,
                  s.is_active, s.average_rating, s.review_count,
                  s.latitude, s.longitude, s.created_at
           FROM services s
           LEFT JOIN users u ON s.provider_id = u.id
           WHERE s.id = ?
           LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_booking(pool: &SqlitePool, id: &str) -> Result<Option<BookingRow>, sqlx::Error> {
    sqlx::query_as::<_, BookingRow>(
        r#"SELECT id, customer_id, provider_id, service_id, date, time, status,
                  is_paid, payment_method, customer_name, service_name,
                  customer_email, customer_phone, customer_address, created_at
           FROM bookings
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Full recomputation of a service's aggregate from its review set,
/// in one statement so the pair can never go out of step with each other.
pub async fn recompute_service_rating(
    pool: &SqlitePool,
    service_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE services SET
               average_rating = COALESCE(
                   (SELECT ROUND(AVG(rating), 1) FROM reviews WHERE service_id = services.id), 0),
               review_count =
                   (SELECT COUNT(*) FROM reviews WHERE service_id = services.id)
           WHERE id = ?"#,
    )
    .bind(service_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn recompute_provider_rating(
    pool: &SqlitePool,
    provider_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE users SET
               rating = COALESCE(
                   (SELECT ROUND(AVG(rating), 1) FROM reviews WHERE provider_id = users.id), 0),
               review_count =
                   (SELECT COUNT(*) FROM reviews WHERE provider_id = users.id)
           WHERE id = ?"#,
    )
    .bind(provider_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Aggregate refresh after a review write. The review is already durable,
/// so a failed recompute is retried once and otherwise only logged; it
/// must never surface to the caller of the review endpoint.
pub async fn refresh_ratings(pool: &SqlitePool, service_id: &str, provider_id: &str) {
    for attempt in 0..2 {
        let result = match recompute_service_rating(pool, service_id).await {
            Ok(()) => recompute_provider_rating(pool, provider_id).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => return,
            Err(err) if attempt == 0 => {
                log::warn!("Rating recompute failed for service {service_id}, retrying: {err}");
            }
            Err(err) => {
                log::warn!("Rating recompute failed for service {service_id}: {err}");
            }
        }
    }
}

/// Backfill pass: repeats the per-service recomputation for the whole catalog.
pub async fn recompute_all_ratings(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let ids = sqlx::query_as::<_, (String, String)>("SELECT id, provider_id FROM services")
        .fetch_all(pool)
        .await?;
    let mut updated = 0;
    for (service_id, provider_id) in ids {
        recompute_service_rating(pool, &service_id).await?;
        recompute_provider_rating(pool, &provider_id).await?;
        updated += 1;
    }
    Ok(updated)
}

/// Great-circle central angle between two points, in radians (haversine).
pub fn central_angle(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1, lat2, lng2) = (
        lat1.to_radians(),
        lng1.to_radians(),
        lat2.to_radians(),
        lng2.to_radians(),
    );
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlng = (lng2 - lng1) / 2.0;
    let a = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlng.sin().powi(2);
    2.0 * a.sqrt().asin()
}

/// Inclusive containment check: a point exactly at the radius boundary is in.
/// The epsilon absorbs float rounding in the radians conversion.
pub fn within_radius(lat1: f64, lng1: f64, lat2: f64, lng2: f64, radius_km: f64) -> bool {
    central_angle(lat1, lng1, lat2, lng2) <= radius_km / EARTH_RADIUS_KM + 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_angle_is_zero_for_identical_points() {
        assert!(central_angle(45.0, 16.0, 45.0, 16.0) < 1e-12);
    }

    #[test]
    fn central_angle_matches_equator_longitude_difference() {
        // Along the equator the central angle equals the longitude delta.
        let angle = central_angle(0.0, 0.0, 0.0, 1.0);
        assert!((angle - 1.0_f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        // A point exactly at the converted radius must be contained.
        let angle = central_angle(0.0, 0.0, 0.0, 0.05);
        let radius_km = angle * EARTH_RADIUS_KM;
        assert!(within_radius(0.0, 0.0, 0.0, 0.05, radius_km));
        // Just inside the boundary stays in, just outside falls out.
        assert!(within_radius(0.0, 0.0, 0.0, 0.05, radius_km * 1.001));
        assert!(!within_radius(0.0, 0.0, 0.0, 0.05, radius_km * 0.999));
    }

    #[test]
    fn five_km_radius_excludes_a_degree_of_longitude() {
        // One degree of longitude at the equator is about 111 km.
        assert!(!within_radius(0.0, 0.0, 0.0, 1.0, 5.0));
        assert!(within_radius(0.0, 0.0, 0.0, 0.04, 5.0));
    }
}
