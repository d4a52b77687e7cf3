use std::backtrace::Backtrace;
use rocket::http::Status;
use rocket::response::status::Custom;
use serde::Serialize;
use crate::error::{DeleteOutcome, RegistryError};

pub(crate) const ALL_FIELDS_REQUIRED: &str = "Alle felter må fylles ut.";

/// A form field after trimming, with the column bound it is checked against.
pub(crate) struct FieldValue<'a> {
    pub label: &'static str,
    pub value: &'a str,
    pub max_len: usize,
}

pub(crate) fn require_fields(fields: &[FieldValue<'_>]) -> Result<(), RegistryError> {
    if fields.iter().any(|f| f.value.is_empty()) {
        return Err(RegistryError::Validation(ALL_FIELDS_REQUIRED.to_string()));
    }
    if let Some(f) = fields.iter().find(|f| f.value.chars().count() > f.max_len) {
        return Err(RegistryError::Validation(format!("{} kan ha maks {} tegn.", f.label, f.max_len)));
    }
    Ok(())
}

pub(crate) fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Ok,
    Info,
    Warn,
}

/// Single line of feedback rendered above the form.
#[derive(Serialize, Clone, Debug)]
pub struct PageMessage {
    pub level: MessageLevel,
    pub text: String,
}
impl PageMessage {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { level: MessageLevel::Ok, text: text.into() }
    }
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: MessageLevel::Info, text: text.into() }
    }
    pub fn warn(text: impl Into<String>) -> Self {
        Self { level: MessageLevel::Warn, text: text.into() }
    }
    pub fn from_error(err: &RegistryError) -> Self {
        Self::warn(err.to_string())
    }
    pub fn from_delete(outcome: DeleteOutcome, deleted: String, not_found: String) -> Self {
        match outcome {
            DeleteOutcome::Deleted => Self::ok(deleted),
            DeleteOutcome::NotFound => Self::info(not_found),
        }
    }
}

pub(crate) fn log_registry_error(operation: &str, err: &RegistryError) {
    match err {
        RegistryError::Store { .. } => {
            error!("{operation} failed: {err}\nbacktrace: {}", Backtrace::capture());
        }
        _ => warn!("{operation} rejected, {}: {err}", err.kind()),
    }
}

pub(crate) fn registry_to_custom_error(err: RegistryError) -> Custom<String> {
    log_registry_error("Listing", &err);
    let status = match &err {
        RegistryError::Store { .. } => Status::InternalServerError,
        _ => Status::BadRequest,
    };
    Custom(status, err.to_string())
}
