use thiserror::Error;

use crate::constants::{ErrorKind, RSP_CODES, TOKEN_INVALID_CODES};

#[derive(Error, Debug, Clone)]
pub enum ReolinkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication rejected (code {code}): {detail}")]
    Auth { code: i64, detail: String },

    #[error("Not supported by this device (code {code}): {detail}")]
    NotSupported { code: i64, detail: String },

    #[error("Invalid parameter (code {code}): {detail}")]
    InvalidParameter { code: i64, detail: String },

    #[error("Device error (code {code}): {detail}")]
    UnknownDevice { code: i64, detail: String },

    #[error("Unexpected response shape: {0}")]
    Normalization(String),

    #[error("Session is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ReolinkError {
    /// Map a device response code and its detail text to an error variant.
    ///
    /// Codes missing from the table degrade to [`ReolinkError::UnknownDevice`]
    /// instead of failing; the original code and detail are always carried.
    pub fn from_device_code(code: i64, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match RSP_CODES.get(&code).copied() {
            Some(ErrorKind::Auth) => Self::Auth { code, detail },
            Some(ErrorKind::NotSupported) => Self::NotSupported { code, detail },
            Some(ErrorKind::InvalidParameter) => Self::InvalidParameter { code, detail },
            Some(ErrorKind::Unknown) | None => Self::UnknownDevice { code, detail },
        }
    }

    /// The original device response code, when this error came from the device.
    pub fn device_code(&self) -> Option<i64> {
        match self {
            Self::Auth { code, .. }
            | Self::NotSupported { code, .. }
            | Self::InvalidParameter { code, .. }
            | Self::UnknownDevice { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether a device response code signals the session token as rejected.
    pub fn is_token_rejection(code: i64) -> bool {
        TOKEN_INVALID_CODES.contains(&code)
    }
}

pub type Result<T> = std::result::Result<T, ReolinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_their_kind() {
        assert!(matches!(
            ReolinkError::from_device_code(-6, "please login first"),
            ReolinkError::Auth { code: -6, .. }
        ));
        assert!(matches!(
            ReolinkError::from_device_code(-9, "not support"),
            ReolinkError::NotSupported { code: -9, .. }
        ));
        assert!(matches!(
            ReolinkError::from_device_code(-4, "param error"),
            ReolinkError::InvalidParameter { code: -4, .. }
        ));
    }

    #[test]
    fn unlisted_code_degrades_to_unknown_device() {
        let err = ReolinkError::from_device_code(-9999, "mystery");
        assert!(matches!(
            err,
            ReolinkError::UnknownDevice { code: -9999, .. }
        ));
        assert_eq!(err.device_code(), Some(-9999));
    }

    #[test]
    fn detail_text_is_preserved() {
        let err = ReolinkError::from_device_code(-7, "login failed, wrong password");
        assert!(err.to_string().contains("login failed, wrong password"));
    }
}
