use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - API key may be invalid or expired")]
    Unauthorized,

    #[error("Access denied by row-level policy: {0}")]
    AccessDenied(String),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Query rejected ({code}): {message}")]
    BadQuery { code: String, message: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Backend error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend URL is not configured")]
    NotConfigured,
}

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error document the table interface returns with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
    #[serde(default)]
    hint: Option<String>,
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let detail = match parsed {
            Some(ref e) => match e.hint {
                Some(ref hint) => format!("{} (hint: {})", e.message, hint),
                None => e.message.clone(),
            },
            None => truncate_body(body),
        };

        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            400 => ApiError::BadQuery {
                code: parsed.and_then(|e| e.code).unwrap_or_else(|| "400".to_string()),
                message: detail,
            },
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
