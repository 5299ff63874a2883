//! Shared HTTP plumbing: one `reqwest::Client` per run and the mapping from
//! HTTP outcomes to step error kinds.

use crate::config::HttpConfig;
use crate::error::{ErrorKind, PipelineError, Result, StepError};
use reqwest::StatusCode;

/// Build the client every network step shares
pub fn build_client(http: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(http.connect_timeout())
        .user_agent(concat!("partition-loader/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::ClientInitialization(e.to_string()))
}

/// Bytes of an error response body kept for diagnostics
pub const ERROR_BODY_LIMIT: usize = 4 * 1024;

/// Read at most [`ERROR_BODY_LIMIT`] bytes of a failed response's body
pub async fn error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while body.len() < ERROR_BODY_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(ERROR_BODY_LIMIT - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            _ => break,
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Statuses worth retrying: request timeout, rate limiting and server errors
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

pub fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Map a non-success status to a step error.
///
/// `auth` is the kind to use for 401/403 (`None` treats them as permanent),
/// `transient` the kind for retryable statuses.
pub fn status_error(
    operation: &str,
    status: StatusCode,
    body: &str,
    auth: Option<ErrorKind>,
    transient: ErrorKind,
) -> StepError {
    let kind = match auth {
        Some(auth_kind) if is_auth_status(status) => auth_kind,
        _ if is_transient_status(status) => transient,
        _ => ErrorKind::PermanentHttp,
    };

    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("{operation} returned {status}")
    } else {
        format!("{operation} returned {status}: {}", truncate(detail, 512))
    };

    StepError::new(kind, message)
}

/// Map a transport-level failure (timeout, reset, truncated body) to a step error
pub fn transport_error(operation: &str, error: &reqwest::Error, transient: ErrorKind) -> StepError {
    if error.is_builder() {
        return StepError::permanent_http(format!("{operation} could not be built: {error}"));
    }

    let cause = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_body() || error.is_decode() {
        "body terminated early"
    } else {
        "request failed"
    };

    StepError::new(transient, format!("{operation} {cause}: {error}"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text.to_string(),
    }
}
