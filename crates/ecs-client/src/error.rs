use thiserror::Error;

#[derive(Debug, Error)]
pub enum EcsClientError {
    #[error("{code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("failed to decode {action} response: {source}")]
    Decode {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{action} response is missing '{field}'")]
    MissingField { action: String, field: &'static str },

    #[error("invalid endpoint '{0}'")]
    Endpoint(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl EcsClientError {
    /// Throttling, server-side faults and connection-level failures.
    ///
    /// These are the only errors the transport retries; anything the service
    /// answered with a 4xx verdict is returned to the caller untouched.
    pub fn is_transient(&self) -> bool {
        match self {
            EcsClientError::Api { status, code, .. } => *status >= 500 || is_throttle(code),
            EcsClientError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// The service received the request and refused it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EcsClientError::Api { status, code, .. }
                if (400..500).contains(status) && !is_throttle(code)
        )
    }

    /// The AWS error code, when the service returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            EcsClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

fn is_throttle(code: &str) -> bool {
    code.contains("Throttling") || code == "TooManyRequestsException"
}
