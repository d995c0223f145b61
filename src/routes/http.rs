//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::leaderboard::SortState;
use crate::protocol::*;
use crate::state::AppState;
use crate::logic::*;
use crate::storage::StorageError;

type ApiError = (StatusCode, Json<ErrorOut>);

fn storage_failure(e: StorageError) -> ApiError {
  (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorOut { error: e.to_string() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_player(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(PlayerOut { name: state.storage.current_player().unwrap_or_default() })
}

#[instrument(level = "info", skip(state, body), fields(name_len = body.name.len()))]
pub async fn http_post_player(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PlayerIn>,
) -> Result<Json<PlayerOut>, ApiError> {
  match register_player(&state.storage, &body.name) {
    Ok(name) => Ok(Json(PlayerOut { name })),
    Err(RegisterError::Invalid(e)) => {
      info!(target: "numquest", error = %e, "Rejected player name");
      Err((StatusCode::BAD_REQUEST, Json(ErrorOut { error: e.to_string() })))
    }
    Err(RegisterError::Storage(e)) => Err(storage_failure(e)),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_player(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
  state.storage.clear_current_player().map_err(storage_failure)?;
  info!(target: "numquest", "Player signed out");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_rating(
  State(state): State<Arc<AppState>>,
  Query(q): Query<RatingQuery>,
) -> impl IntoResponse {
  let default = SortState::default();
  let mut sort = SortState { field: q.sort.unwrap_or(default.field), dir: q.dir.unwrap_or(default.dir) };
  if let Some(field) = q.toggle {
    sort.toggle(field);
  }
  let rows = rating_rows(&state.storage, sort);
  info!(target: "numquest", rows = rows.len(), field = ?sort.field, dir = ?sort.dir, "HTTP rating served");
  Json(RatingOut { sort: sort.field, dir: sort.dir, rows })
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_rating(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
  state.storage.clear_rating().map_err(storage_failure)?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_last_result(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(last_result(&state.storage))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_data(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
  state.storage.clear_all_player_data().map_err(storage_failure)?;
  Ok(StatusCode::NO_CONTENT)
}
