//! Error types for each stage of the collection pipeline.

/// Failure to obtain a usable payload from the weather provider.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("API request timed out: {0}")]
    Timeout(String),

    #[error("Failed to connect to API: {0}")]
    Connect(String),

    #[error("API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API response: {0}")]
    Decode(String),

    #[error("API request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Whether the failure is likely transient.
    ///
    /// Timeouts, connection failures, 429 and 5xx responses are transient.
    /// Other 4xx responses and malformed bodies will keep failing until the
    /// configuration or the provider changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Connect(_) | FetchError::Request(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display omits the source chain; keep it, minus the URL
        // which may carry the API key.
        let err = err.without_url();
        let message = error_chain(&err);
        if err.is_timeout() {
            FetchError::Timeout(message)
        } else if err.is_connect() {
            FetchError::Connect(message)
        } else if err.is_decode() {
            FetchError::Decode(message)
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                message,
            }
        } else {
            FetchError::Request(message)
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// A structurally valid response lacks a field the reading needs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Missing {0} in response")]
    MissingField(&'static str),

    #[error("Invalid {field} in response: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// A reading or message violates the output schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// The message could not be encoded to JSON.
#[derive(Debug, thiserror::Error)]
#[error("Failed to serialize message: {0}")]
pub struct SerializationError(#[from] pub serde_json::Error);

/// Broker-side failures.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Not connected to RabbitMQ")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Send(String),

    #[error("Broker rejected message for queue '{0}'")]
    Rejected(String),
}

impl From<lapin::Error> for PublishError {
    fn from(err: lapin::Error) -> Self {
        PublishError::Send(err.to_string())
    }
}

/// Any failure that ends a single collection cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Weather API error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Data extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Data validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Data serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Queue publisher error: {0}")]
    Publish(#[from] PublishError),
}

/// Invalid or unreadable startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidVar { key: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
