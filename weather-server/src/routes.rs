use crate::handlers;
use crate::state::AppState;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Build the application router. Everything after `/weather/` is the location key.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/weather/{*location}", get(handlers::get_weather))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
