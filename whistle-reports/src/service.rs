use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use validator::ValidationErrors;

use whistle_shared::errors::{AppError, ErrorCode};
use whistle_shared::types::auth::StaffUser;
use whistle_shared::types::pagination::{Paginated, PaginationParams};

use crate::config::AppConfig;
use crate::gate::{AccessGate, GateError};
use crate::issuer::{normalize_tracking_id, IssuedCredentials, Issuer, IssuerError};
use crate::lifecycle::{InvalidTransition, ReportStatus};
use crate::models::{Attachment, CaseView, NewReport, Report, ReportSummary, StatusView};
use crate::rate_limit::FailureLimiter;
use crate::store::{Actor, ReportStore, StoreError};
use crate::validation::{validate_message, AttachmentLimits, SubmitReportRequest};

/// The one message every credential failure renders with.
pub const UNAUTHORIZED_MESSAGE: &str = "invalid tracking id or access token";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,
    #[error("too many failed attempts, try again later")]
    RateLimited,
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
    #[error("report is {0} and accepts no further changes")]
    ReportTerminal(ReportStatus),
    #[error("could not allocate a tracking id")]
    IssuerExhausted,
    #[error("report not found")]
    NotFound,
    #[error("attachment not found")]
    AttachmentNotFound,
    #[error("tracking id already exists")]
    DuplicateId,
    #[error("report is assigned to another case handler")]
    NotAssigned,
}

impl From<StoreError> for ReportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId => Self::DuplicateId,
            StoreError::NotFound => Self::NotFound,
            StoreError::InvalidTransition(t) if t.from.is_terminal() => Self::ReportTerminal(t.from),
            StoreError::InvalidTransition(t) => Self::InvalidTransition(t),
            StoreError::ReportTerminal(status) => Self::ReportTerminal(status),
            StoreError::NotAssigned => Self::NotAssigned,
        }
    }
}

impl From<GateError> for ReportError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthorized => Self::Unauthorized,
            GateError::RateLimited => Self::RateLimited,
        }
    }
}

impl From<IssuerError> for ReportError {
    fn from(err: IssuerError) -> Self {
        tracing::error!(error = %err, "credential issuance failed");
        Self::IssuerExhausted
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        let message = err.to_string();
        match err {
            ReportError::Validation(errors) => AppError::Validation(errors),
            ReportError::Unauthorized => AppError::new(ErrorCode::Unauthorized, message),
            ReportError::RateLimited => AppError::new(ErrorCode::RateLimited, message),
            ReportError::InvalidTransition(t) => AppError::with_details(
                ErrorCode::InvalidTransition,
                message,
                serde_json::json!({ "from": t.from, "to": t.to }),
            ),
            ReportError::ReportTerminal(_) => AppError::new(ErrorCode::ReportTerminal, message),
            ReportError::IssuerExhausted => AppError::new(ErrorCode::IssuerExhausted, message),
            ReportError::NotFound => AppError::new(ErrorCode::ReportNotFound, message),
            ReportError::AttachmentNotFound => AppError::new(ErrorCode::AttachmentNotFound, message),
            ReportError::DuplicateId => AppError::new(ErrorCode::DuplicateReport, message),
            ReportError::NotAssigned => AppError::forbidden(message),
        }
    }
}

/// How a case handler ends a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Resolved,
    Closed,
    Rejected,
}

impl From<Outcome> for ReportStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Resolved => ReportStatus::Resolved,
            Outcome::Closed => ReportStatus::Closed,
            Outcome::Rejected => ReportStatus::Rejected,
        }
    }
}

/// Everything the HTTP layer calls. Owns the issuer, the store and the gate;
/// nothing here is global.
pub struct ReportService {
    issuer: Issuer,
    store: Arc<ReportStore>,
    gate: AccessGate,
    attachment_limits: AttachmentLimits,
}

impl ReportService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(ReportStore::new());
        let limiter = FailureLimiter::new(
            config.auth_max_failures,
            Duration::from_secs(config.auth_failure_window_secs),
        );
        Self {
            issuer: Issuer::new(config.issuer_max_attempts),
            gate: AccessGate::new(store.clone(), limiter),
            store,
            attachment_limits: AttachmentLimits {
                max_count: config.max_attachments,
                max_bytes: config.max_attachment_bytes,
            },
        }
    }

    // --- Reporter side ---

    /// Validate and store a new report. The returned access token is the only
    /// copy that will ever exist.
    pub fn submit_report(&self, request: SubmitReportRequest) -> Result<IssuedCredentials, ReportError> {
        let new_report = request.into_new_report(self.attachment_limits)?;
        let category = new_report.category;

        let credentials = self.insert_fresh(new_report, |id| self.store.contains(id))?;

        metrics::counter!("reports_submitted_total", "category" => category.as_str()).increment(1);
        tracing::info!(category = category.as_str(), "report submitted");
        Ok(credentials)
    }

    /// Issue credentials and insert the report under them. Another submission
    /// can take the same ID between the check and the insert; the report is
    /// then re-keyed with fresh credentials, within the issuer's attempt limit.
    fn insert_fresh(
        &self,
        new_report: NewReport,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<IssuedCredentials, ReportError> {
        let mut credentials = self.issuer.issue(&is_taken)?;
        let mut report = Report::new(
            credentials.tracking_id.clone(),
            credentials.access_token.digest(),
            new_report,
        );

        let mut attempt = 1;
        loop {
            match self.store.try_insert(report) {
                Ok(_) => return Ok(credentials),
                Err(_) if attempt >= self.issuer.max_attempts() => {
                    tracing::error!(attempts = attempt, "no tracking id could be inserted");
                    return Err(ReportError::IssuerExhausted);
                }
                Err(rejected) => {
                    tracing::warn!(attempt, "tracking id taken at insert, re-keying");
                    attempt += 1;
                    credentials = self.issuer.issue(&is_taken)?;
                    report = rejected;
                    report.tracking_id = credentials.tracking_id.clone();
                    report.access_token_hash = credentials.access_token.digest();
                }
            }
        }
    }

    pub async fn get_status(&self, tracking_id: &str, access_token: &str) -> Result<StatusView, ReportError> {
        let report = self.gate.authorize(tracking_id, access_token).await?;
        Ok(StatusView::from(report))
    }

    /// Answer a request for information. Only valid while the report is
    /// awaiting info; moves it back under review.
    pub async fn post_reply(
        &self,
        tracking_id: &str,
        access_token: &str,
        content: &str,
    ) -> Result<StatusView, ReportError> {
        let report = self.gate.authorize(tracking_id, access_token).await?;
        let content = validate_message(content)?;

        let updated = self
            .store
            .transition_with_message(&report.tracking_id, ReportStatus::UnderReview, Actor::Reporter, content)
            .await?;
        record_transition(report.status, updated.status);
        Ok(StatusView::from(updated))
    }

    // --- Case handler side ---

    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        pagination: &PaginationParams,
    ) -> Paginated<ReportSummary> {
        let (reports, total) = self.store.list(status, pagination).await;
        let items = reports.iter().map(ReportSummary::from).collect();
        Paginated::new(items, total, pagination)
    }

    pub async fn case_view(&self, tracking_id: &str) -> Result<CaseView, ReportError> {
        Ok(CaseView::from(self.load(tracking_id).await?))
    }

    pub async fn attachment(&self, tracking_id: &str, attachment_id: Uuid) -> Result<Attachment, ReportError> {
        self.load(tracking_id)
            .await?
            .attachments
            .into_iter()
            .find(|a| a.id == attachment_id)
            .ok_or(ReportError::AttachmentNotFound)
    }

    pub async fn acknowledge(&self, staff: &StaffUser, tracking_id: &str) -> Result<CaseView, ReportError> {
        let id = canonical(tracking_id)?;
        let updated = self.store.acknowledge(&id, actor(staff)).await?;
        record_transition(ReportStatus::Pending, updated.status);
        tracing::info!(tracking_id = %id, staff_id = %staff.id, role = staff.role.as_str(), "report acknowledged");
        Ok(CaseView::from(updated))
    }

    /// Ask the reporter for more detail; the question becomes the next
    /// message in the thread.
    pub async fn request_info(
        &self,
        staff: &StaffUser,
        tracking_id: &str,
        question: &str,
    ) -> Result<CaseView, ReportError> {
        let id = canonical(tracking_id)?;
        let question = validate_message(question)?;
        let updated = self
            .store
            .transition_with_message(&id, ReportStatus::AwaitingInfo, actor(staff), question)
            .await?;
        record_transition(ReportStatus::UnderReview, updated.status);
        tracing::info!(tracking_id = %id, staff_id = %staff.id, "information requested");
        Ok(CaseView::from(updated))
    }

    pub async fn handler_message(
        &self,
        staff: &StaffUser,
        tracking_id: &str,
        content: &str,
    ) -> Result<CaseView, ReportError> {
        let id = canonical(tracking_id)?;
        let content = validate_message(content)?;
        let updated = self.store.append_message(&id, actor(staff), content).await?;
        tracing::debug!(tracking_id = %id, staff_id = %staff.id, "handler message appended");
        Ok(CaseView::from(updated))
    }

    /// End the case with `outcome`. A note, when given, is appended to the
    /// thread in the same step so the reporter sees why.
    pub async fn finalize(
        &self,
        staff: &StaffUser,
        tracking_id: &str,
        outcome: Outcome,
        note: Option<&str>,
    ) -> Result<CaseView, ReportError> {
        let id = canonical(tracking_id)?;
        let to = ReportStatus::from(outcome);
        let from = self.load(&id).await?.status;

        let updated = match note.filter(|n| !n.trim().is_empty()) {
            Some(note) => {
                let note = validate_message(note)?;
                self.store.transition_with_message(&id, to, actor(staff), note).await?
            }
            None => self.store.update_status(&id, to, actor(staff)).await?,
        };

        record_transition(from, updated.status);
        tracing::info!(tracking_id = %id, staff_id = %staff.id, status = %updated.status, "report finalized");
        Ok(CaseView::from(updated))
    }

    pub async fn close(
        &self,
        staff: &StaffUser,
        tracking_id: &str,
        note: Option<&str>,
    ) -> Result<CaseView, ReportError> {
        self.finalize(staff, tracking_id, Outcome::Closed, note).await
    }

    async fn load(&self, tracking_id: &str) -> Result<Report, ReportError> {
        let id = canonical(tracking_id)?;
        self.store.get(&id).await.ok_or(ReportError::NotFound)
    }
}

fn canonical(tracking_id: &str) -> Result<String, ReportError> {
    normalize_tracking_id(tracking_id).ok_or(ReportError::NotFound)
}

fn actor(staff: &StaffUser) -> Actor {
    if staff.is_supervisor() {
        Actor::Supervisor(staff.id)
    } else {
        Actor::Handler(staff.id)
    }
}

fn record_transition(from: ReportStatus, to: ReportStatus) {
    metrics::counter!("report_transitions_total", "from" => from.as_str(), "to" => to.as_str()).increment(1);
}
