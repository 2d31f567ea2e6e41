//! Public endpoints, addressed by share token.

use crate::error::AppError;
use crate::extract::{ClientIp, JsonBody};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use formgate_core::intake::FormView;
use formgate_core::inventory::StockLevel;
use formgate_core::submission::{SubmitRequest, Submission};
use formgate_core::types::ShareToken;

/// `GET /api/public/forms/:token`
pub async fn get_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<FormView>, AppError> {
    let view = state.pipeline.form_view(&ShareToken::new(token)).await?;
    Ok(Json(view))
}

/// `GET /api/public/forms/:token/inventory`
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Vec<StockLevel>>, AppError> {
    let levels = state
        .pipeline
        .inventory_view(&ShareToken::new(token))
        .await?;
    Ok(Json(levels))
}

/// `POST /api/public/forms/:token/submissions`
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ClientIp(caller_ip): ClientIp,
    JsonBody(request): JsonBody<SubmitRequest>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = state
        .pipeline
        .submit(&ShareToken::new(token), &caller_ip, request)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}
