use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can abort a work-item run.
#[derive(Debug, Error)]
pub enum Error {
    /// The service answered with a status other than the one the stage expects.
    #[error("HTTP {status} for url ({url}){}", suffix(.detail))]
    Http {
        status: u16,
        url: String,
        detail: String,
    },

    /// Connection, TLS or timeout failure below HTTP.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body was not the JSON document the stage expects.
    #[error("malformed {what} response: {source}")]
    Structure {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The outgoing work item could not be serialized.
    #[error("failed to encode work item request: {0}")]
    Encode(#[source] serde_json::Error),

    /// Well-formed body without a value the workflow needs.
    #[error("{0} is missing from the response")]
    MissingField(&'static str),

    /// The access token contains characters not allowed in a header.
    #[error("access token is not a valid header value")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("work item still running after {attempts} status checks")]
    PollLimit { attempts: u32 },

    #[error("work item still running after {elapsed:?}")]
    Deadline { elapsed: Duration },

    #[error("work item run was cancelled")]
    Cancelled,
}

impl Error {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn structure(what: &'static str, source: serde_json::Error) -> Self {
        Error::Structure { what, source }
    }
}

fn suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

/// Error bodies seen from the Autodesk endpoints.
///
/// The work-item service speaks OData (`{"error":{"code":..,"message":..}}`),
/// the authentication service returns either the legacy
/// `{"developerMessage":..,"errorCode":..}` shape or plain OAuth
/// `{"error":"..","error_description":".."}`.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default, rename = "developerMessage")]
    developer_message: Option<String>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

impl ApiErrorResponse {
    fn message(&self) -> Option<String> {
        if let Some(msg) = &self.developer_message {
            return Some(match &self.error_code {
                Some(code) => format!("{} ({})", msg, code),
                None => msg.clone(),
            });
        }

        match &self.error {
            Some(Value::Object(obj)) => {
                let code = obj.get("code").and_then(Value::as_str).unwrap_or("");
                let msg = obj.get("message").and_then(Value::as_str).unwrap_or("");
                match (code.is_empty(), msg.is_empty()) {
                    (true, true) => None,
                    (false, true) => Some(code.to_string()),
                    (true, false) => Some(msg.to_string()),
                    (false, false) => Some(format!("{} ({})", msg, code)),
                }
            }
            Some(Value::String(code)) => Some(match &self.error_description {
                Some(desc) => format!("{} ({})", desc, code),
                None => code.clone(),
            }),
            _ => self.error_description.clone(),
        }
    }
}

/// Builds [`Error::Http`] from a failed response, pulling a readable message
/// out of the body when the service sent one.
pub(crate) fn http_error(status: StatusCode, url: &str, body: &str) -> Error {
    let server = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(|e| e.message())
        .unwrap_or_else(|| body.trim().chars().take(512).collect());

    let detail = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let hint = "check the consumer key/secret and that the app has access to AutoCAD I/O";
        if server.is_empty() {
            hint.to_string()
        } else {
            format!("{}; {}", server, hint)
        }
    } else {
        server
    };

    Error::Http {
        status: status.as_u16(),
        url: url.to_string(),
        detail,
    }
}
