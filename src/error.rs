// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for smugvision

use thiserror::Error;

/// Result type alias for smugvision operations
pub type Result<T> = std::result::Result<T, SmugvisionError>;

/// Failures reported by the vision-model collaborator
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Vision model timed out after {0}s")]
    Timeout(u64),

    #[error("Vision model returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Vision endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Image could not be prepared for the vision model: {0}")]
    Image(String),
}

/// smugvision error types
#[derive(Error, Debug)]
pub enum SmugvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("SmugMug authentication failed: {0}")]
    HostAuth(String),

    #[error("SmugMug API error ({status}): {message}")]
    HostApi { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Face recognition error: {0}")]
    Faces(String),
}

impl SmugvisionError {
    /// Whether this error means no further image in the batch can succeed
    pub fn is_fatal_for_batch(&self) -> bool {
        match self {
            Self::HostAuth(_) => true,
            Self::HostApi { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_abort_batch() {
        assert!(SmugvisionError::HostAuth("bad token".into()).is_fatal_for_batch());
        assert!(SmugvisionError::HostApi { status: 403, message: "denied".into() }.is_fatal_for_batch());
        assert!(!SmugvisionError::HostApi { status: 500, message: "oops".into() }.is_fatal_for_batch());
        assert!(!SmugvisionError::Vision(VisionError::Timeout(120)).is_fatal_for_batch());
    }

    #[test]
    fn test_vision_error_display() {
        let err: SmugvisionError = VisionError::InvalidResponse("empty".into()).into();
        assert_eq!(err.to_string(), "Vision model returned an invalid response: empty");
    }
}
