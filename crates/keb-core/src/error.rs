//! Failure taxonomy shared by admission and lifecycle code.
//!
//! Every failure a caller can observe carries an HTTP status. Validation
//! rules collect [`ValidationIssue`]s and only join them into a single
//! message at the boundary.

use thiserror::Error;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// A caller-visible broker failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Malformed payload or a structural/semantic rule mapped to 400.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Replayed request with different parameters.
    #[error("{0}")]
    Conflict(String),

    /// Well-formed but semantically invalid request.
    #[error("{0}")]
    Unprocessable(String),

    /// Storage or queue failure. `detail` is for logs only.
    #[error("{message}")]
    Internal { message: String, detail: String },
}

impl BrokerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable(msg.into())
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        Self::Internal {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    /// HTTP status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unprocessable(_) => 422,
            Self::Internal { .. } => 500,
        }
    }

    /// Message shown to the caller.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Unprocessable(m) => m,
            Self::Internal { message, .. } => message,
        }
    }

    /// Prefix the caller-visible message, keeping the status.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Self::BadRequest(m) => Self::BadRequest(format!("{prefix}{m}")),
            Self::NotFound(m) => Self::NotFound(format!("{prefix}{m}")),
            Self::Conflict(m) => Self::Conflict(format!("{prefix}{m}")),
            Self::Unprocessable(m) => Self::Unprocessable(format!("{prefix}{m}")),
            Self::Internal { message, detail } => Self::Internal {
                message: format!("{prefix}{message}"),
                detail,
            },
        }
    }
}

// ── Validation issues ──────────────────────────────────────────────

/// Rule group an issue belongs to. Groups decide the join separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGroup {
    Networking,
    Autoscaler,
    WorkerPools,
    Oidc,
}

impl RuleGroup {
    pub fn separator(self) -> &'static str {
        match self {
            RuleGroup::Networking | RuleGroup::WorkerPools => "; ",
            RuleGroup::Autoscaler | RuleGroup::Oidc => ", ",
        }
    }
}

/// One failed rule, kept structured until the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub group: RuleGroup,
    pub message: String,
}

/// Accumulator for issues of a single rule group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issues {
    group: RuleGroup,
    items: Vec<ValidationIssue>,
}

impl Issues {
    pub fn new(group: RuleGroup) -> Self {
        Self {
            group,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ValidationIssue {
            group: self.group,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.items.iter()
    }

    /// Join all messages with the group separator, or `None` when clean.
    pub fn joined(&self) -> Option<String> {
        if self.items.is_empty() {
            return None;
        }
        let messages: Vec<&str> = self.items.iter().map(|i| i.message.as_str()).collect();
        Some(messages.join(self.group.separator()))
    }

    /// Turn the accumulated issues into a failure built by `make`.
    pub fn into_result(self, make: impl FnOnce(String) -> BrokerError) -> BrokerResult<()> {
        match self.joined() {
            Some(msg) => Err(make(msg)),
            None => Ok(()),
        }
    }
}
