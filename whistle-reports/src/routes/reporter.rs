use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use whistle_shared::errors::{AppResult, JsonBody};
use whistle_shared::types::api::ApiResponse;

use crate::models::StatusView;
use crate::validation::SubmitReportRequest;
use crate::AppState;

/// Header carrying the reporter's access token. Kept out of the URL so it
/// does not end up in access logs or browser history.
pub const ACCESS_TOKEN_HEADER: &str = "anonymous-access-token";

/// Access token as presented. A missing or unreadable header becomes an empty
/// token so it fails in the gate like any other wrong token.
pub struct PresentedToken(pub String);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PresentedToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        Ok(Self(token))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedReport {
    pub tracking_id: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub content: String,
}

// --- Submit ---

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<SubmitReportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SubmittedReport>>)> {
    let credentials = state.service.submit_report(body)?;
    let response = SubmittedReport {
        access_token: credentials.access_token.expose().to_string(),
        tracking_id: credentials.tracking_id,
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            response,
            "store both values now; the access token cannot be recovered",
        )),
    ))
}

// --- Status ---

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    PresentedToken(token): PresentedToken,
) -> AppResult<Json<ApiResponse<StatusView>>> {
    let view = state.service.get_status(&tracking_id, &token).await?;
    Ok(Json(ApiResponse::ok(view)))
}

// --- Reply ---

pub async fn post_reply(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    PresentedToken(token): PresentedToken,
    JsonBody(body): JsonBody<ReplyRequest>,
) -> AppResult<Json<ApiResponse<StatusView>>> {
    let view = state.service.post_reply(&tracking_id, &token, &body.content).await?;
    Ok(Json(ApiResponse::ok(view)))
}
