//! Per-item status and severity.

use serde::{Deserialize, Serialize};

/// Severity of a status message.
///
/// `None` and `Info` are non-failing outcomes; `Error` marks a failed
/// operation and drives the process exit status.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    None,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::None => write!(f, "None"),
            Severity::Info => write!(f, "Info"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
        }
    }
}

/// The action the engine decided for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Create,
    Update,
    Delete,
    Unchanged,
}

impl Action {
    /// Past-tense label used in success details ("Created", ...).
    pub fn past_tense(&self) -> &'static str {
        match self {
            Action::Create => "Created",
            Action::Update => "Updated",
            Action::Delete => "Deleted",
            Action::Unchanged => "Up to date",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "Create"),
            Action::Update => write!(f, "Update"),
            Action::Delete => write!(f, "Delete"),
            Action::Unchanged => write!(f, "Up to date"),
        }
    }
}

/// Status attached to a resource item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub message: String,
    pub detail: String,
    pub severity: Severity,
}

impl Status {
    pub fn new(message: impl Into<String>, detail: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            severity,
        }
    }

    /// Status of an item that has not been decided yet.
    pub fn pending() -> Self {
        Self::new("Pending", "", Severity::None)
    }

    pub fn deployed(action: Action) -> Self {
        Self::new("Deployed", action.past_tense(), Severity::None)
    }

    pub fn fetched(action: Action) -> Self {
        Self::new("Fetched", action.past_tense(), Severity::None)
    }

    pub fn up_to_date() -> Self {
        Self::new("Up to date", "", Severity::None)
    }

    /// Preview status for a dry run: the message names the would-be action.
    pub fn dry_run(action: Action) -> Self {
        Self::new(action.to_string(), "Dry run", Severity::Info)
    }

    /// The file could not be read.
    pub fn failed_to_load(detail: impl Into<String>) -> Self {
        Self::new("Failed to load", detail, Severity::Error)
    }

    /// The file was read but its content is malformed.
    pub fn failed_to_read(detail: impl Into<String>) -> Self {
        Self::new("Failed to read", detail, Severity::Error)
    }

    pub fn failed_to_deploy(detail: impl Into<String>) -> Self {
        Self::new("Failed to deploy", detail, Severity::Error)
    }

    pub fn failed_to_fetch(detail: impl Into<String>) -> Self {
        Self::new("Failed to fetch", detail, Severity::Error)
    }

    /// The identifier is shared with other resources in the same run.
    pub fn duplicate(detail: impl Into<String>) -> Self {
        Self::new("Duplicate identifier", detail, Severity::Error)
    }

    pub fn cancelled() -> Self {
        Self::new("Not attempted", "Run cancelled", Severity::Error)
    }

    pub fn partial(detail: impl Into<String>) -> Self {
        Self::new("Partially succeeded", detail, Severity::Warning)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.message, self.detail)
        }
    }
}
