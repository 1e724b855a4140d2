//! Error taxonomy shared by every component.
//!
//! Localization failure is not represented here: a localization attempt that
//! finds no acceptable map returns a [`crate::localization::LocalizeInfo`]
//! with non-positive confidence instead.

use thiserror::Error;

use crate::atlas::MapHandle;

/// Errors returned by the positioning core.
#[derive(Debug, Error)]
pub enum VpsError {
    /// Handle does not name a currently loaded map.
    #[error("invalid map handle {0}")]
    InvalidHandle(i32),

    /// Map source could not be read or decoded.
    #[error("failed to load map from {source_id}: {reason}")]
    MapLoad { source_id: String, reason: String },

    /// No accepted user token has been presented.
    #[error("user not validated")]
    Unauthorized,

    /// Configuration name is not a known parameter.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Matrix given to a coordinate conversion is malformed or singular.
    #[error("transform error: {0}")]
    Transform(String),

    /// Caller input has the wrong shape (image size, intrinsics, buffers).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VpsError {
    pub fn invalid_handle(handle: MapHandle) -> Self {
        Self::InvalidHandle(handle.as_raw())
    }

    pub fn map_load(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MapLoad {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHandle(_) => "INVALID_HANDLE",
            Self::MapLoad { .. } => "MAP_LOAD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UnknownParameter(_) => "UNKNOWN_PARAMETER",
            Self::Transform(_) => "TRANSFORM",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Io(_) => "IO",
        }
    }

    /// Negative status value used by the flat integer API.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidHandle(_) => -1,
            Self::MapLoad { .. } => -2,
            Self::Unauthorized => -3,
            Self::UnknownParameter(_) => -4,
            Self::Transform(_) => -5,
            Self::InvalidInput(_) => -6,
            Self::Io(_) => -7,
        }
    }
}

pub type VpsResult<T> = Result<T, VpsError>;
