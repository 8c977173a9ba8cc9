pub mod auth;
pub mod bookings;
pub mod events;
pub mod notifications;
pub mod reviews;
pub mod services;
pub mod users;

use actix_web::{web, HttpResponse};

pub fn configure(cfg: &mut web::ServiceConfig) {
    auth::configure(cfg);
    users::configure(cfg);
    services::configure(cfg);
    bookings::configure(cfg);
    reviews::configure(cfg);
    notifications::configure(cfg);
    events::configure(cfg);
    cfg.service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}
