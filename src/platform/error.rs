//! Error types for the encoding platform client.
//!
//! [`PlatformError`] separates error envelopes returned by the platform
//! (which carry a numeric error code and possibly a retry hint) from
//! transport failures and from bodies that could not be understood.

use thiserror::Error;

use super::types::RetryHint;

/// Error code reported when the account's limit of queued encodings is reached.
pub const QUEUE_LIMIT_EXCEEDED: i64 = 8004;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform answered with an error envelope (or a non-2xx status).
    #[error("API error (status {status}, code {}): {message}", code_label(.code))]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
        details: Vec<String>,
        retry_hint: Option<RetryHint>,
    },

    /// Transport-level failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// A 2xx response whose body did not match the expected envelope.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

fn code_label(code: &Option<i64>) -> String {
    code.map_or_else(|| "-".to_string(), |c| c.to_string())
}

impl PlatformError {
    pub fn error_code(&self) -> Option<i64> {
        match self {
            PlatformError::Api { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_queue_limit(&self) -> bool {
        self.error_code() == Some(QUEUE_LIMIT_EXCEEDED)
    }

    /// The explicit retry hint, if the error carries one.
    ///
    /// Rejected credentials are reported as `NoRetry`: repeating the call
    /// with the same key cannot succeed.
    pub fn retry_hint(&self) -> Option<RetryHint> {
        match self {
            PlatformError::Api {
                retry_hint: Some(hint),
                ..
            } => Some(*hint),
            PlatformError::Api {
                status: 401 | 403, ..
            } => Some(RetryHint::NoRetry),
            _ => None,
        }
    }

    /// Human-readable diagnostics: the main message followed by any details.
    ///
    /// Never empty; an envelope without text is described by its status and code.
    pub fn messages(&self) -> Vec<String> {
        match self {
            PlatformError::Api {
                status,
                code,
                message,
                details,
                ..
            } => {
                let messages: Vec<String> = std::iter::once(message.clone())
                    .chain(details.iter().cloned())
                    .filter(|m| !m.trim().is_empty())
                    .collect();
                if messages.is_empty() {
                    vec![format!(
                        "request failed with status {status} and error code {}",
                        code_label(code)
                    )]
                } else {
                    messages
                }
            }
            other => vec![other.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, code: Option<i64>, retry_hint: Option<RetryHint>) -> PlatformError {
        PlatformError::Api {
            status,
            code,
            message: "Encoding could not be started".into(),
            details: vec!["details here".into()],
            retry_hint,
        }
    }

    #[test]
    fn api_error_display() {
        let err = api_error(400, Some(8004), None);
        assert_eq!(
            err.to_string(),
            "API error (status 400, code 8004): Encoding could not be started"
        );

        let err = api_error(502, None, None);
        assert_eq!(
            err.to_string(),
            "API error (status 502, code -): Encoding could not be started"
        );
    }

    #[test]
    fn queue_limit_is_detected_by_code() {
        assert!(api_error(400, Some(QUEUE_LIMIT_EXCEEDED), None).is_queue_limit());
        assert!(!api_error(400, Some(1000), None).is_queue_limit());
        assert!(!PlatformError::UnexpectedResponse("x".into()).is_queue_limit());
    }

    #[test]
    fn retry_hint_prefers_explicit_hint() {
        assert_eq!(
            api_error(500, Some(1), Some(RetryHint::NoRetry)).retry_hint(),
            Some(RetryHint::NoRetry)
        );
        assert_eq!(
            api_error(403, Some(1), Some(RetryHint::Retry)).retry_hint(),
            Some(RetryHint::Retry)
        );
        assert_eq!(api_error(401, None, None).retry_hint(), Some(RetryHint::NoRetry));
        assert_eq!(api_error(500, None, None).retry_hint(), None);
    }

    #[test]
    fn messages_include_details() {
        let err = api_error(400, Some(1), None);
        assert_eq!(
            err.messages(),
            vec!["Encoding could not be started".to_string(), "details here".to_string()]
        );
        let err = PlatformError::UnexpectedResponse("empty body".into());
        assert_eq!(err.messages(), vec!["unexpected response: empty body".to_string()]);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PlatformError>();
    }

    #[test]
    fn messages_without_text_fall_back_to_status_and_code() {
        let err = PlatformError::Api {
            status: 400,
            code: Some(1001),
            message: String::new(),
            details: vec![" ".into()],
            retry_hint: Some(RetryHint::NoRetry),
        };
        assert_eq!(
            err.messages(),
            vec!["request failed with status 400 and error code 1001".to_string()]
        );
    }
}
