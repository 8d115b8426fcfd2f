use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use whistle_shared::errors::{AppResult, JsonBody};
use whistle_shared::types::api::ApiResponse;
use whistle_shared::types::auth::StaffUser;
use whistle_shared::types::pagination::{Paginated, PaginationParams};

use crate::lifecycle::ReportStatus;
use crate::models::{CaseView, ReportSummary};
use crate::service::Outcome;
use crate::AppState;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct ReportFilterParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<ReportStatus>,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl ReportFilterParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub outcome: Outcome,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseRequest {
    pub note: Option<String>,
}

// --- Read ---

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(params): Query<ReportFilterParams>,
) -> AppResult<Json<ApiResponse<Paginated<ReportSummary>>>> {
    let page = state.service.list_reports(params.status, &params.pagination()).await;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(tracking_id): Path<String>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let case = state.service.case_view(&tracking_id).await?;
    Ok(Json(ApiResponse::ok(case)))
}

pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path((tracking_id, attachment_id)): Path<(String, Uuid)>,
) -> AppResult<Response> {
    let attachment = state.service.attachment(&tracking_id, attachment_id).await?;
    tracing::info!(tracking_id = %tracking_id, staff_id = %staff.id, %attachment_id, "attachment downloaded");

    let content_type = attachment
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or(HeaderValue::from_static(OCTET_STREAM));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&attachment.filename)),
        ],
        attachment.data.to_vec(),
    )
        .into_response())
}

const OCTET_STREAM: &str = "application/octet-stream";

/// `attachment; filename="..."` with every byte a header can't carry, and
/// any quote or backslash, replaced by `_`.
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or(HeaderValue::from_static("attachment"))
}

// --- Workflow ---

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path(tracking_id): Path<String>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let case = state.service.acknowledge(&staff, &tracking_id).await?;
    Ok(Json(ApiResponse::ok(case)))
}

pub async fn request_info(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path(tracking_id): Path<String>,
    JsonBody(body): JsonBody<MessageRequest>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let case = state.service.request_info(&staff, &tracking_id, &body.content).await?;
    Ok(Json(ApiResponse::ok(case)))
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path(tracking_id): Path<String>,
    JsonBody(body): JsonBody<MessageRequest>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let case = state.service.handler_message(&staff, &tracking_id, &body.content).await?;
    Ok(Json(ApiResponse::ok(case)))
}

pub async fn finalize(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path(tracking_id): Path<String>,
    JsonBody(body): JsonBody<FinalizeRequest>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let case = state
        .service
        .finalize(&staff, &tracking_id, body.outcome, body.note.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(case)))
}

pub async fn close(
    State(state): State<Arc<AppState>>,
    staff: StaffUser,
    Path(tracking_id): Path<String>,
    body: Option<JsonBody<CloseRequest>>,
) -> AppResult<Json<ApiResponse<CaseView>>> {
    let JsonBody(body) = body.unwrap_or_default();
    let case = state.service.close(&staff, &tracking_id, body.note.as_deref()).await?;
    Ok(Json(ApiResponse::ok(case)))
}
