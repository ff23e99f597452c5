use thiserror::Error;
use tracing::{Span, error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invite code generation exhausted after {0} attempts")]
    CodeGenerationExhausted(u32),

    #[error("Store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

impl AppError {
    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Forbidden(msg) => {
                warn!(message = %msg, context = %ctx, "Authorization error");
                "forbidden_error"
            }
            AppError::Conflict(msg) => {
                warn!(message = %msg, context = %ctx, "Conflict error");
                "conflict_error"
            }
            AppError::CodeGenerationExhausted(attempts) => {
                error!(attempts = %attempts, context = %ctx, "Invite code generation exhausted");
                "code_generation_exhausted"
            }
            AppError::Unavailable(err) => {
                error!(error = %message, context = %ctx, store_error = %err, "Store error");
                "store_unavailable"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record("error.type", tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));
        }
    }

    /// Whether the caller may reasonably retry the same call unchanged.
    /// `Conflict` is deliberately non-retryable: the transition it guarded
    /// has already been taken by someone else.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Unavailable(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut parts: Vec<String> = Vec::new();

        for (field, field_errors) in errors.field_errors() {
            for field_error in field_errors.iter() {
                let message = field_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Invalid value".into());
                parts.push(format!("{}: {}", field, message));
            }
        }

        AppError::Validation(parts.join("; "))
    }
}
