/// Centralized error types for context-sync using thiserror
///
/// Gateway failures are classified into an [`ErrorKind`] so the retry executor
/// and the connection monitor can react to them without matching on messages.
use thiserror::Error;

/// Main error type for the context synchronization engine
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Analytics gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a failure, used to decide whether it is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect, timeout or IO failure while talking to the backend
    Network,
    /// HTTP 401/403
    Authentication,
    /// Any other non-2xx status
    Remote,
    /// 2xx whose body does not match the expected shape
    Decoding,
    /// The caller gave up while the operation was pending
    Cancelled,
}

/// Errors surfaced by the analytics gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Authentication rejected with status {status}")]
    Authentication { status: u16 },

    #[error("Remote returned status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decoding(String),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Network(_) => ErrorKind::Network,
            GatewayError::Authentication { .. } => ErrorKind::Authentication,
            GatewayError::Remote { .. } => ErrorKind::Remote,
            GatewayError::Decoding(_) => ErrorKind::Decoding,
            GatewayError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Classify a reqwest transport error
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decoding(err.to_string())
        } else {
            // connect, timeout, body and request errors are all transient from our side
            GatewayError::Network(err.to_string())
        }
    }

    /// Classify a non-2xx status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => GatewayError::Authentication { status },
            _ => GatewayError::Remote { status, body },
        }
    }
}

/// Errors raised by discovery providers while resolving a file
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    #[error("File is not supported by provider '{provider}': {file}")]
    UnsupportedFile { provider: String, file: String },

    #[error("Offset {offset} is outside of {file}")]
    OffsetOutOfRange { file: String, offset: usize },

    #[error("Provider '{provider}' failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("Provider panicked while resolving {0}")]
    Panicked(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuildFailed(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Empty {0}")]
    Empty(String),

    #[error("Code object '{0}' has no backend data (placeholder context)")]
    UnlinkedMethod(String),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Other(format!("{:#}", err))
    }
}

impl SyncError {
    /// Check if this is a user error (validation, bad config value) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_) | SyncError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Gateway(GatewayError::Network(_)) | SyncError::Io(_))
    }
}
