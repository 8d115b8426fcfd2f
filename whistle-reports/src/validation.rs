use std::borrow::Cow;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use axum::http::HeaderValue;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{Attachment, Category, ContactPreference, NewReport};

pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MAX_MESSAGE_CHARS: usize = 10_000;
const MIN_PHONE_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    #[default]
    None,
    Email,
    Phone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: Option<String>,
    /// Base64 (standard alphabet, padded).
    pub data: String,
}

/// Raw intake form, exactly as the reporter's client posts it.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest {
    pub category: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20000, message = "description is too long"))]
    pub description: String,
    #[validate(length(max = 100, message = "incident date is too long"))]
    pub incident_date: Option<String>,
    #[validate(length(max = 500, message = "location is too long"))]
    pub location: Option<String>,
    #[validate(length(max = 2000, message = "people involved is too long"))]
    pub people_involved: Option<String>,
    #[serde(default)]
    pub contact_method: ContactMethod,
    #[validate(length(max = 254, message = "contact value is too long"))]
    pub contact_value: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

#[derive(Debug, Clone, Copy)]
pub struct AttachmentLimits {
    pub max_count: usize,
    pub max_bytes: usize,
}

fn field_error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

impl SubmitReportRequest {
    /// Check every field and turn the form into a [`NewReport`]. All
    /// problems are reported together, keyed by form field.
    pub fn into_new_report(self, limits: AttachmentLimits) -> Result<NewReport, ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_default();

        let category = match self.category.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("category", field_error("required", "category is required"));
                None
            }
            Some(raw) => {
                let parsed = parse_category(raw);
                if parsed.is_none() {
                    errors.add("category", field_error("unknown", "unknown report category"));
                }
                parsed
            }
        };

        if self.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
            errors.add(
                "description",
                field_error("length", format!("description must be at least {MIN_DESCRIPTION_CHARS} characters")),
            );
        }

        let contact = match contact_preference(self.contact_method, self.contact_value) {
            Ok(contact) => contact,
            Err(err) => {
                errors.add("contactValue", err);
                ContactPreference::None
            }
        };

        let attachments = match decode_attachments(self.attachments, limits) {
            Ok(attachments) => attachments,
            Err(err) => {
                errors.add("attachments", err);
                Vec::new()
            }
        };

        match category {
            Some(category) if errors.errors().is_empty() => Ok(NewReport {
                category,
                description: self.description.trim().to_string(),
                incident_date: non_blank(self.incident_date),
                location: non_blank(self.location),
                people_involved: non_blank(self.people_involved),
                attachments,
                contact,
            }),
            _ => Err(errors),
        }
    }
}

fn parse_category(raw: &str) -> Option<Category> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase())).ok()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A contact value is only kept when a method other than `none` is chosen;
/// with `none` whatever was typed is dropped.
fn contact_preference(method: ContactMethod, value: Option<String>) -> Result<ContactPreference, ValidationError> {
    let value = non_blank(value);
    match (method, value) {
        (ContactMethod::None, _) | (_, None) => Ok(ContactPreference::None),
        (ContactMethod::Email, Some(email)) => {
            if validator::validate_email(email.as_str()) {
                Ok(ContactPreference::Email(email))
            } else {
                Err(field_error("email", "invalid email address"))
            }
        }
        (ContactMethod::Phone, Some(phone)) => {
            if is_valid_phone(&phone) {
                Ok(ContactPreference::Phone(phone))
            } else {
                Err(field_error("phone", "invalid phone number"))
            }
        }
    }
}

/// At least eight digits once spaces, parentheses, dashes and plus signs are
/// removed, and nothing but digits left over.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(*c, '(' | ')' | '-' | '+'))
        .collect();
    digits.len() >= MIN_PHONE_DIGITS && digits.chars().all(|c| c.is_ascii_digit())
}

fn decode_attachments(
    uploads: Vec<AttachmentUpload>,
    limits: AttachmentLimits,
) -> Result<Vec<Attachment>, ValidationError> {
    if uploads.len() > limits.max_count {
        return Err(field_error(
            "count",
            format!("at most {} attachments are accepted", limits.max_count),
        ));
    }

    uploads
        .into_iter()
        .map(|upload| {
            let data = BASE64
                .decode(upload.data.as_bytes())
                .map_err(|_| field_error("encoding", "attachment data must be base64"))?;
            if data.len() > limits.max_bytes {
                return Err(field_error(
                    "size",
                    format!("attachments are limited to {} bytes", limits.max_bytes),
                ));
            }
            Ok(Attachment {
                id: Uuid::new_v4(),
                filename: sanitize_filename(&upload.filename),
                content_type: media_type(upload.content_type),
                data: Arc::from(data),
            })
        })
        .collect()
}

/// A declared content type is kept only if it looks like `type/subtype` and
/// can be sent back as a header; anything else is served as octet-stream.
fn media_type(value: Option<String>) -> Option<String> {
    non_blank(value).filter(|v| v.contains('/') && HeaderValue::from_str(v).is_ok())
}

/// Keep only the final path component and drop control characters; client
/// paths can reveal a reporter's account name.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Body of a conversation message from either side.
pub fn validate_message(content: &str) -> Result<String, ValidationErrors> {
    let trimmed = content.trim();
    let mut errors = ValidationErrors::new();
    if trimmed.is_empty() {
        errors.add("content", field_error("required", "message cannot be empty"));
    } else if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        errors.add(
            "content",
            field_error("length", format!("message is limited to {MAX_MESSAGE_CHARS} characters")),
        );
    }
    if errors.errors().is_empty() {
        Ok(trimmed.to_string())
    } else {
        Err(errors)
    }
}
