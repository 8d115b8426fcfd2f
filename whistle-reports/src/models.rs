use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::ReportStatus;

// --- Category ---

/// Closed set of report types offered by the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AccountingFinance,
    BriberyCorruption,
    ConflictInterest,
    DataPrivacy,
    DiscriminationHarassment,
    Environmental,
    Fraud,
    HealthSafety,
    InsiderTrading,
    Retaliation,
    Theft,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountingFinance => "accounting_finance",
            Self::BriberyCorruption => "bribery_corruption",
            Self::ConflictInterest => "conflict_interest",
            Self::DataPrivacy => "data_privacy",
            Self::DiscriminationHarassment => "discrimination_harassment",
            Self::Environmental => "environmental",
            Self::Fraud => "fraud",
            Self::HealthSafety => "health_safety",
            Self::InsiderTrading => "insider_trading",
            Self::Retaliation => "retaliation",
            Self::Theft => "theft",
            Self::Other => "other",
        }
    }
}

// --- Contact ---

/// How (if at all) the reporter agreed to be contacted outside the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", content = "value", rename_all = "lowercase")]
pub enum ContactPreference {
    None,
    Email(String),
    Phone(String),
}

// --- Attachment ---

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Arc<[u8]>,
}

/// Attachment listing shown to case handlers; the payload is fetched separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: usize,
}

impl From<&Attachment> for AttachmentMeta {
    fn from(a: &Attachment) -> Self {
        Self {
            id: a.id,
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            size: a.data.len(),
        }
    }
}

// --- Message ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Author {
    Reporter,
    CaseHandler,
}

/// One entry of a report's conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// --- Status history ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: ReportStatus,
    pub to: ReportStatus,
    pub at: DateTime<Utc>,
}

// --- Report ---

#[derive(Debug, Clone)]
pub struct Report {
    pub tracking_id: String,
    /// Hex SHA-256 of the access token. The token itself is never kept.
    pub access_token_hash: String,
    pub category: Category,
    pub description: String,
    pub incident_date: Option<String>,
    pub location: Option<String>,
    pub people_involved: Option<String>,
    pub attachments: Vec<Attachment>,
    pub contact: ContactPreference,
    pub status: ReportStatus,
    pub assigned_handler: Option<Uuid>,
    pub history: Vec<StatusChange>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated submission content, before credentials are attached.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub category: Category,
    pub description: String,
    pub incident_date: Option<String>,
    pub location: Option<String>,
    pub people_involved: Option<String>,
    pub attachments: Vec<Attachment>,
    pub contact: ContactPreference,
}

impl Report {
    pub fn new(tracking_id: String, access_token_hash: String, new: NewReport) -> Self {
        let now = Utc::now();
        Self {
            tracking_id,
            access_token_hash,
            category: new.category,
            description: new.description,
            incident_date: new.incident_date,
            location: new.location,
            people_involved: new.people_involved,
            attachments: new.attachments,
            contact: new.contact,
            status: ReportStatus::Pending,
            assigned_handler: None,
            history: Vec::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// --- Views ---

/// What a reporter sees after presenting valid credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub tracking_id: String,
    pub status: ReportStatus,
    pub needs_response: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl From<Report> for StatusView {
    fn from(r: Report) -> Self {
        Self {
            needs_response: r.status == ReportStatus::AwaitingInfo,
            tracking_id: r.tracking_id,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
            messages: r.messages,
        }
    }
}

/// Row in the case handler's report list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub tracking_id: String,
    pub category: Category,
    pub status: ReportStatus,
    pub assigned_handler: Option<Uuid>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Report> for ReportSummary {
    fn from(r: &Report) -> Self {
        Self {
            tracking_id: r.tracking_id.clone(),
            category: r.category,
            status: r.status,
            assigned_handler: r.assigned_handler,
            message_count: r.messages.len(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Full case file for handlers. Never includes the token digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseView {
    pub tracking_id: String,
    pub category: Category,
    pub description: String,
    pub incident_date: Option<String>,
    pub location: Option<String>,
    pub people_involved: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
    pub contact: ContactPreference,
    pub status: ReportStatus,
    pub assigned_handler: Option<Uuid>,
    pub history: Vec<StatusChange>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Report> for CaseView {
    fn from(r: Report) -> Self {
        Self {
            attachments: r.attachments.iter().map(AttachmentMeta::from).collect(),
            tracking_id: r.tracking_id,
            category: r.category,
            description: r.description,
            incident_date: r.incident_date,
            location: r.location,
            people_involved: r.people_involved,
            contact: r.contact,
            status: r.status,
            assigned_handler: r.assigned_handler,
            history: r.history,
            messages: r.messages,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        Report::new(
            "WB-ABCDEFGHJKMN".into(),
            "00".repeat(32),
            NewReport {
                category: Category::Fraud,
                description: "Ten or more characters describing the issue.".into(),
                incident_date: None,
                location: Some("Warehouse 4".into()),
                people_involved: None,
                attachments: vec![Attachment {
                    id: Uuid::new_v4(),
                    filename: "ledger.csv".into(),
                    content_type: Some("text/csv".into()),
                    data: Arc::from(vec![1u8, 2, 3]),
                }],
                contact: ContactPreference::None,
            },
        )
    }

    #[test]
    fn new_report_starts_pending_and_empty() {
        let report = sample();
        assert_eq!(report.status, ReportStatus::Pending);
        assert!(report.messages.is_empty());
        assert!(report.history.is_empty());
        assert_eq!(report.created_at, report.updated_at);
    }

    #[test]
    fn status_view_serializes_camel_case() {
        let value = serde_json::to_value(StatusView::from(sample())).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["needsResponse"], false);
        assert!(value["messages"].as_array().unwrap().is_empty());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn case_view_lists_attachment_metadata_only() {
        let value = serde_json::to_value(CaseView::from(sample())).unwrap();
        assert_eq!(value["attachments"][0]["filename"], "ledger.csv");
        assert_eq!(value["attachments"][0]["size"], 3);
        assert!(value["attachments"][0].get("data").is_none());
        assert!(value.get("accessTokenHash").is_none());
        assert_eq!(value["contact"]["method"], "none");
        assert_eq!(value["category"], "fraud");
    }
}
