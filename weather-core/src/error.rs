use std::time::Duration;

use serde_json::error::Category;

/// How a response body failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Well-formed JSON that does not match the expected shape (provider schema drift).
    Schema,
    /// Not JSON at all, or cut short (transport garbage).
    Malformed,
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeFailure::Schema => f.write_str("schema mismatch"),
            DecodeFailure::Malformed => f.write_str("malformed body"),
        }
    }
}

/// Every failure the acquisition pipeline can surface.
///
/// Values are cloneable so they can be published in [`crate::AcquisitionState`]
/// and handed to every waiter of a shared location request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Location access denied or restricted")]
    PermissionDenied,

    #[error("Location services unavailable: {0}")]
    LocationUnavailable(String),

    #[error("No location fix within {0:?}")]
    Timeout(Duration),

    #[error("No place found for '{0}'")]
    PlaceNotFound(String),

    #[error("Geocoding service unavailable: {0}")]
    ResolverUnavailable(String),

    #[error("Weather provider answered with HTTP {status}")]
    InvalidResponse { status: u16 },

    #[error("Failed to decode weather response ({kind}): {message}")]
    DecodingError {
        kind: DecodeFailure,
        message: String,
    },

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl AcquisitionError {
    /// Classify a serde_json failure into schema drift vs. garbage.
    pub fn decoding(err: &serde_json::Error) -> Self {
        let kind = match err.classify() {
            Category::Data => DecodeFailure::Schema,
            Category::Syntax | Category::Eof | Category::Io => DecodeFailure::Malformed,
        };

        AcquisitionError::DecodingError {
            kind,
            message: err.to_string(),
        }
    }

    /// Failures that come from obtaining coordinates rather than weather data.
    pub fn is_location_failure(&self) -> bool {
        matches!(
            self,
            AcquisitionError::PermissionDenied
                | AcquisitionError::LocationUnavailable(_)
                | AcquisitionError::Timeout(_)
                | AcquisitionError::PlaceNotFound(_)
                | AcquisitionError::ResolverUnavailable(_)
        )
    }
}
