use sqlx::SqlitePool;

use crate::notify::Relay;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub relay: Relay,
}
