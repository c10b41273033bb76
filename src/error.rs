//! Error types and handling for `PollenCast`
//!
//! Two layers live here. Collaborator errors (`FetchError`, `GeolocationError`,
//! `StorageError`) describe what an external system reported. The state managers
//! convert them into the user-facing taxonomy (`LocationError`, `ForecastError`,
//! `SensitivityError`) before anything reaches the presentation layer.

use thiserror::Error;

/// Failures reported by a forecast provider or place search backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    InvalidApiKey(String),

    #[error("Rate limit error: {0}")]
    QuotaExceeded(String),

    #[error("No data for location: {0}")]
    NoData(String),

    #[error("Parse error: {0}")]
    MalformedResponse(String),

    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Request aborted")]
    Aborted,
}

/// Failures reported by a platform geolocation detector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Detection timed out")]
    Timeout,

    #[error("Detection aborted")]
    Aborted,

    #[error("Geolocation error: {0}")]
    Other(String),
}

/// Failures reported by key-value persistence
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The store answered but refused the write.
    #[error("Storage rejected write: {message}")]
    Rejected { message: String },

    /// The store could not be reached at all (quota, closed database, I/O).
    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

impl StorageError {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Location state errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Position unavailable: {message}")]
    PositionUnavailable { message: String },

    #[error("Location request timed out")]
    Timeout,

    #[error("Geolocation is not supported on this platform")]
    NotSupported,

    #[error("Invalid location: {message}")]
    InvalidLocation { message: String },

    #[error("Location error: {message}")]
    Unknown { message: String },
}

impl LocationError {
    /// Create a new invalid-location error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidLocation {
            message: message.into(),
        }
    }

    /// Create a new unknown location error
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Stable identifier for this error kind
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::PositionUnavailable { .. } => "POSITION_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::InvalidLocation { .. } => "INVALID_LOCATION",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => {
                "Location access was denied. Enable location permissions or enter a location manually."
            }
            Self::PositionUnavailable { .. } => {
                "Your position could not be determined. Please try again or enter a location manually."
            }
            Self::Timeout => "Finding your location took too long. Please try again.",
            Self::NotSupported => {
                "Location detection is not supported here. Please enter a location manually."
            }
            Self::InvalidLocation { .. } => {
                "That location is not valid. Latitude must be between -90 and 90 and longitude between -180 and 180."
            }
            Self::Unknown { .. } => "Something went wrong while finding your location.",
        }
    }

    /// Whether a retry can help without action outside the app
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PermissionDenied { .. })
    }
}

impl From<GeolocationError> for LocationError {
    fn from(err: GeolocationError) -> Self {
        match err {
            GeolocationError::PermissionDenied(message) => Self::PermissionDenied { message },
            GeolocationError::Unavailable(message) => Self::PositionUnavailable { message },
            GeolocationError::Timeout => Self::Timeout,
            GeolocationError::Aborted => Self::unknown("detection aborted"),
            GeolocationError::Other(message) => Self::Unknown { message },
        }
    }
}

/// Forecast retrieval errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("No pollen data available: {message}")]
    NoDataAvailable { message: String },

    #[error("Invalid API key: {message}")]
    InvalidApiKey { message: String },

    #[error("Forecast error: {message}")]
    Unknown { message: String },
}

impl ForecastError {
    pub fn no_data<S: Into<String>>(message: S) -> Self {
        Self::NoDataAvailable {
            message: message.into(),
        }
    }

    /// Stable identifier for this error kind
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NETWORK_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::NoDataAvailable { .. } => "NO_DATA_AVAILABLE",
            Self::InvalidApiKey { .. } => "INVALID_API_KEY",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network { .. } => {
                "Unable to reach the pollen service. Please check your internet connection."
            }
            Self::RateLimited { .. } => {
                "Too many requests to the pollen service. Please wait a moment and try again."
            }
            Self::NoDataAvailable { .. } => "No pollen data is available for this location.",
            Self::InvalidApiKey { .. } => {
                "The pollen service rejected the API key. Please check your configuration."
            }
            Self::Unknown { .. } => "Something went wrong while loading the pollen forecast.",
        }
    }

    /// Whether a retry can help without action outside the app
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidApiKey { .. })
    }
}

impl From<FetchError> for ForecastError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(message) => Self::Network { message },
            FetchError::InvalidApiKey(message) => Self::InvalidApiKey { message },
            FetchError::QuotaExceeded(message) => Self::RateLimited { message },
            FetchError::NoData(message) => Self::NoDataAvailable { message },
            FetchError::MalformedResponse(message) => Self::Unknown { message },
            FetchError::Http { status, message } => Self::Unknown {
                message: format!("HTTP {status}: {message}"),
            },
            FetchError::Aborted => Self::Unknown {
                message: "request aborted".to_string(),
            },
        }
    }
}

/// Sensitivity profile errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensitivityError {
    /// Local validation failure; never reaches storage.
    #[error("Invalid sensitivity: {message}")]
    ValidationFailed { message: String },

    /// Storage answered but refused the write.
    #[error("Failed to save sensitivity: {message}")]
    SaveFailed { message: String },

    /// Storage could not be reached.
    #[error("Sensitivity storage unavailable: {message}")]
    SaveException { message: String },
}

impl SensitivityError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Stable identifier for this error kind
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::SaveFailed { .. } => "SAVE_FAILED",
            Self::SaveException { .. } => "SAVE_EXCEPTION",
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "Sensitivity values must be whole numbers from 1 to 10.",
            Self::SaveFailed { .. } => "Failed to save sensitivity settings. Please try again.",
            Self::SaveException { .. } => {
                "Storage is unavailable, so your sensitivity settings could not be saved."
            }
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<StorageError> for SensitivityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected { message } => Self::SaveFailed { message },
            StorageError::Unavailable { message } => Self::SaveException { message },
        }
    }
}

/// Main error type for the `PollenCast` library and CLI
#[derive(Error, Debug)]
pub enum PollenCastError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Sensitivity(#[from] SensitivityError),

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl PollenCastError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PollenCastError::Config { .. } => {
                "Configuration error. Please check your config file and API key.".to_string()
            }
            PollenCastError::Storage(_) => {
                "Local storage is unavailable. Settings will not be kept.".to_string()
            }
            PollenCastError::Location(e) => e.user_message().to_string(),
            PollenCastError::Forecast(e) => e.user_message().to_string(),
            PollenCastError::Sensitivity(e) => e.user_message().to_string(),
            PollenCastError::Io { .. } => {
                "File system error. Please check permissions and disk space.".to_string()
            }
        }
    }
}
