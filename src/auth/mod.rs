use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub mod memory;
pub mod otp;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
