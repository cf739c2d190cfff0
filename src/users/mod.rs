use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod services;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::user_routes(state)
}
