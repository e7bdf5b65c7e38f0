use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, info};
use weather_core::{ResolveError, WeatherRecord};

/// Resolver failures rendered as a 500 with the error text as body.
#[derive(Debug)]
pub struct WeatherError(pub ResolveError);

impl IntoResponse for WeatherError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<ResolveError> for WeatherError {
    fn from(err: ResolveError) -> Self {
        Self(err)
    }
}

/// GET /weather/{*location}
pub async fn get_weather(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Result<impl IntoResponse, WeatherError> {
    info!("GET: weather location={}", location);

    let record: WeatherRecord = state.resolver.resolve(&location).await.inspect_err(|err| {
        error!(location = %location, error = %err, "weather lookup failed");
    })?;

    Ok(([(header::CONTENT_TYPE, "application/json; charset=utf-8")], Json(record)))
}
