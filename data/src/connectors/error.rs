use thiserror::Error;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Error, Debug)]
pub enum ConnectorError {
    /// No registered connector accepts the requested source/input type
    #[error("{0}")]
    ConnectorMissing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing credential: {0}")]
    CredentialMissing(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Credential {0} not found")]
    CredentialNotFound(i32),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ConnectorError {
    pub fn is_connector_missing(&self) -> bool {
        matches!(self, ConnectorError::ConnectorMissing(_))
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        ConnectorError::HttpError(err.to_string())
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        ConnectorError::DatabaseError(err.to_string())
    }
}

impl From<recap_models::ParseSourceError> for ConnectorError {
    fn from(err: recap_models::ParseSourceError) -> Self {
        ConnectorError::ConnectorMissing(format!("Connector not found for source={}", err.0))
    }
}
