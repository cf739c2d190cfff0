use crate::state::AppState;
use axum::Router;

pub mod cache;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::contact_routes()
}
