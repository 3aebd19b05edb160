use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported relay number: {0}")]
    UnsupportedRelay(u32),

    #[error("No relay device found")]
    NoDeviceFound,

    #[error("Permission denied on {path}: {reason}")]
    PermissionDenied { path: String, reason: String },

    #[error("Device I/O error on {path}: {reason}")]
    DeviceIo { path: String, reason: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Short stable code used in failure summaries
    pub fn failure_kind(&self) -> &'static str {
        match self {
            Self::UnsupportedRelay(_) => "unsupported_relay",
            Self::NoDeviceFound => "no_device_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::DeviceIo { .. } => "device_io",
            Self::MalformedRequest(_) => "malformed_request",
            Self::Config(_) => "config",
            Self::Gpio(_) => "gpio",
            Self::Network(_) => "network",
            Self::Internal(_) => "internal",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Classify an I/O error raised while talking to a relay device
    pub fn from_device_io(path: &str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::DeviceIo {
                path: path.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether further attempts against the same device are pointless
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
