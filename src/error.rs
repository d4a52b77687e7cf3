use thiserror::Error;
use crate::db::store_error_code;

/// Failure of a registry command. `Display` is the message shown on the page.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("{field} «{key}» finnes allerede.")]
    DuplicateKey { field: &'static str, key: String },

    #[error("Klassen «{0}» finnes ikke.")]
    ForeignKey(String),

    #[error("{}", referenced_class_message(.code, .dependents))]
    ReferentialIntegrity { code: String, dependents: Option<i64> },

    #[error("Feil mot databasen: {}", store_failure_message(.code, .message))]
    Store { code: Option<String>, message: String },
}

fn referenced_class_message(code: &str, dependents: &Option<i64>) -> String {
    match *dependents {
        Some(count) => format!(
            "Kan ikke slette «{code}». Det er registrert {count} {} i denne klassen.",
            if count == 1 { "student" } else { "studenter" }
        ),
        None => format!("Kan ikke slette «{code}» fordi studenter peker på den. Slett studentene først."),
    }
}

fn store_failure_message(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("({code}) {message}"),
        None => message.to_string(),
    }
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "ValidationError",
            RegistryError::DuplicateKey { .. } => "DuplicateKeyError",
            RegistryError::ForeignKey(_) => "ForeignKeyError",
            RegistryError::ReferentialIntegrity { .. } => "ReferentialIntegrityError",
            RegistryError::Store { .. } => "StoreFailure",
        }
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Store {
            code: store_error_code(&err),
            message: err.to_string(),
        }
    }
}

/// Result of a delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

impl DeleteOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows > 0 { DeleteOutcome::Deleted } else { DeleteOutcome::NotFound }
    }
}
