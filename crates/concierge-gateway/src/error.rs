//! Gateway error types

use concierge_core::ConciergeError;
use thiserror::Error;

/// Failure talking to the storefront backend, with a classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// HTTP status, when the backend answered at all.
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Server, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidRequest, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidResponse, message)
    }

    /// Classify a non-success HTTP answer.
    ///
    /// The message prefers the backend's own `detail` or `error` field and
    /// falls back to the status line.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 | 422 => GatewayErrorKind::InvalidRequest,
            401 | 403 => GatewayErrorKind::Unauthorized,
            404 => GatewayErrorKind::NotFound,
            s if s >= 500 => GatewayErrorKind::Server,
            _ => GatewayErrorKind::Unknown,
        };
        let message =
            backend_detail(body).unwrap_or_else(|| format!("backend returned HTTP {}", status));
        Self::new(kind, message).with_status(status)
    }
}

/// Pull a human message out of an error body: `detail`, then `error`.
fn backend_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    /// Connection refused, DNS, timeouts.
    Network,
    /// 401 / 403.
    Unauthorized,
    /// 404.
    NotFound,
    /// 5xx.
    Server,
    /// 400, or a request the client refused to build.
    InvalidRequest,
    /// The backend answered with a body that failed validation.
    InvalidResponse,
    Unknown,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            GatewayError::network(err.to_string())
        } else if err.is_decode() {
            GatewayError::invalid_response(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::from_status(status.as_u16(), "")
        } else {
            GatewayError::new(GatewayErrorKind::Unknown, err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::invalid_response(err.to_string())
    }
}

impl From<GatewayError> for ConciergeError {
    fn from(err: GatewayError) -> Self {
        ConciergeError::Gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            GatewayError::from_status(400, "").kind,
            GatewayErrorKind::InvalidRequest
        );
        assert_eq!(
            GatewayError::from_status(401, "").kind,
            GatewayErrorKind::Unauthorized
        );
        assert_eq!(
            GatewayError::from_status(403, "").kind,
            GatewayErrorKind::Unauthorized
        );
        assert_eq!(
            GatewayError::from_status(404, "").kind,
            GatewayErrorKind::NotFound
        );
        assert_eq!(
            GatewayError::from_status(503, "").kind,
            GatewayErrorKind::Server
        );
        assert_eq!(
            GatewayError::from_status(418, "").kind,
            GatewayErrorKind::Unknown
        );
    }

    #[test]
    fn test_status_message_prefers_detail() {
        let err = GatewayError::from_status(400, r#"{"detail": "Consulta vacía", "error": "x"}"#);
        assert_eq!(err.message, "Consulta vacía");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_status_message_falls_back_to_error_field() {
        let err = GatewayError::from_status(500, r#"{"error": "Error al procesar el mensaje"}"#);
        assert_eq!(err.to_string(), "Error al procesar el mensaje");
    }

    #[test]
    fn test_status_message_without_json_body() {
        let err = GatewayError::from_status(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "backend returned HTTP 502");
    }

    #[test]
    fn test_blank_detail_is_ignored() {
        let err = GatewayError::from_status(400, r#"{"detail": "  ", "error": "Datos inválidos"}"#);
        assert_eq!(err.message, "Datos inválidos");
    }

    #[test]
    fn test_serde_error_is_invalid_response() {
        let err: GatewayError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind, GatewayErrorKind::InvalidResponse);
    }

    #[test]
    fn test_into_concierge_error() {
        let err: ConciergeError = GatewayError::network("connection refused").into();
        assert!(matches!(err, ConciergeError::Gateway(_)));
        assert_eq!(err.to_string(), "Gateway error: connection refused");
    }
}
