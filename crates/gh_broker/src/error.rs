use std::fmt;

use http::StatusCode;

/// A non-2xx answer from the platform, tagged with the endpoint that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub endpoint: String,
}

impl HttpStatusError {
    pub fn with_endpoint(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            endpoint: endpoint.into(),
        }
    }

    /// 401 and 403 mean the token itself is rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status.canonical_reason() {
            Some(reason) => write!(f, "{} {} from {}", self.status.as_u16(), reason, self.endpoint),
            None => write!(f, "status {} from {}", self.status.as_u16(), self.endpoint),
        }
    }
}

impl std::error::Error for HttpStatusError {}
