//! Parse Graph / identity platform JSON bodies into typed results.

use serde::Deserialize;

use crate::retry::UploadError;
use crate::session::UploadedItem;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Graph errors: `{"error": {"code": ..., "message": ...}}`.
/// Token endpoint errors: `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Graph { error: GraphError },
    OAuth {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: String,
    #[serde(default)]
    message: String,
}

fn protocol(what: &str, e: serde_json::Error) -> UploadError {
    UploadError::Protocol(format!("{}: {}", what, e))
}

/// Upload URL from a `createUploadSession` response.
pub(super) fn parse_session(body: &[u8]) -> Result<String, UploadError> {
    let s: SessionBody = serde_json::from_slice(body).map_err(|e| protocol("upload session", e))?;
    Ok(s.upload_url)
}

/// First byte the server still expects (`nextExpectedRanges[0]`, e.g. `"26-"`
/// or `"26-99"`). `None` when the server expects nothing more.
pub(super) fn parse_next_expected(body: &[u8]) -> Result<Option<u64>, UploadError> {
    let s: StatusBody = serde_json::from_slice(body).map_err(|e| protocol("session status", e))?;
    let Some(first) = s.next_expected_ranges.first() else {
        return Ok(None);
    };
    let start = first.split('-').next().unwrap_or_default().trim();
    start
        .parse::<u64>()
        .map(Some)
        .map_err(|_| UploadError::Protocol(format!("bad expected range {:?}", first)))
}

/// The driveItem returned when the last chunk is accepted.
pub(super) fn parse_item(body: &[u8]) -> Result<UploadedItem, UploadError> {
    serde_json::from_slice(body).map_err(|e| protocol("drive item", e))
}

/// Access token and lifetime in seconds.
pub(super) fn parse_token(body: &[u8]) -> Result<(String, u64), UploadError> {
    let t: TokenBody = serde_json::from_slice(body).map_err(|e| protocol("token", e))?;
    Ok((t.access_token, t.expires_in))
}

/// Map a non-2xx response to an error. A structured error code makes it a
/// provider error; anything else is a bare HTTP failure.
pub(super) fn error_from_response(status: u32, body: &[u8]) -> UploadError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody::Graph { error }) => UploadError::Provider {
            status,
            code: error.code,
            message: error.message,
        },
        Ok(ErrorBody::OAuth {
            error,
            error_description,
        }) => UploadError::Provider {
            status,
            code: error,
            message: error_description.unwrap_or_default(),
        },
        Err(_) => UploadError::Http(status),
    }
}
