use axum::{extract::State, response::IntoResponse, Json};

use crate::middleware::OwnerId;
use crate::startup::AppState;

/// Active edition and the features it unlocks.
pub async fn get_edition(State(state): State<AppState>, _owner: OwnerId) -> impl IntoResponse {
    Json(state.features.as_ref().clone())
}
