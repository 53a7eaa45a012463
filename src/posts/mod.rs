mod dto;
mod handlers;
#[cfg(test)]
pub mod memory;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::post_routes()
}
