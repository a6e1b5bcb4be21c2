pub mod cart_commit;
pub mod common;

use axum::Router;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    cart_commit::cart_commit_routes()
}
