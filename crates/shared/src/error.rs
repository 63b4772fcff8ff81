use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// `code` value the backend uses for a successful result.
pub const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Warning,
    Internal,
    Other(i64),
}

impl ErrorCode {
    pub const fn from_code(code: i64) -> Self {
        match code {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            601 => Self::Warning,
            500 => Self::Internal,
            other => Self::Other(other),
        }
    }
}

/// The `{ "code": 200, "msg": "..." }` wrapper the backend puts around
/// mutation results, single-row lookups and paged lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ResultEnvelope {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Reads the envelope out of an arbitrary body. Bodies that are not
    /// objects, or carry no integer `code`, have no envelope.
    pub fn from_body(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        let code = object.get("code")?.as_i64()?;
        let msg = object
            .get("msg")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { code, msg })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?} ({raw_code}): {message}")]
pub struct ApiException {
    pub code: ErrorCode,
    pub raw_code: i64,
    pub message: String,
}

impl ApiException {
    pub fn new(raw_code: i64, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_code(raw_code),
            raw_code,
            message: message.into(),
        }
    }
}

impl From<ResultEnvelope> for ApiException {
    fn from(value: ResultEnvelope) -> Self {
        Self::new(
            value.code,
            value
                .msg
                .unwrap_or_else(|| "backend reported a failure without a message".to_string()),
        )
    }
}

/// Fails when `body` carries an envelope with a non-success code. The backend
/// reports such failures with HTTP 200, so status checks alone miss them.
pub fn check_envelope(body: &Value) -> Result<(), ApiException> {
    match ResultEnvelope::from_body(body) {
        Some(envelope) if !envelope.is_success() => Err(envelope.into()),
        _ => Ok(()),
    }
}

/// Single-row lookups come back as `{ code, msg, data }`; older endpoints
/// return the row itself.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut object) if object.contains_key("code") && object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
