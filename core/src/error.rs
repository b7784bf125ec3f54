//! The single error taxonomy every caller of this crate observes.

use std::fmt;

/// A machine-readable error kind, stable across the whole call stack.
///
/// This is the `code` field of `CoreError`. Each variant carries its own
/// recoverability; see [`CoreError::recoverable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    DeviceNotFound,
    ConnectionFailed,
    TargetNotConnected,
    TransferFailed,
    Timeout,
    InvalidData,
    EraseFailed,
    WriteFailed,
    VerifyFailed,
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::TargetNotConnected => "TARGET_NOT_CONNECTED",
            ErrorCode::TransferFailed => "TRANSFER_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidData => "INVALID_DATA",
            ErrorCode::EraseFailed => "ERASE_FAILED",
            ErrorCode::WriteFailed => "WRITE_FAILED",
            ErrorCode::VerifyFailed => "VERIFY_FAILED",
            ErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// The result-shaped error every fallible operation in this crate returns.
///
/// One flat taxonomy across the whole probe/target stack, rather than a
/// variant per architecture or transport.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CoreError {
    code: ErrorCode,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        code: ErrorCode,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Whether the surrounding caller may disconnect, back off, and retry
    /// the whole operation.
    pub fn recoverable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::TargetNotConnected | ErrorCode::TransferFailed | ErrorCode::Timeout
        )
    }

    pub fn device_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceNotFound, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    pub fn target_not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TargetNotConnected, message)
    }

    pub fn transfer_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransferFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidData, message)
    }

    pub fn erase_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EraseFailed, message)
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WriteFailed, message)
    }

    pub fn verify_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::VerifyFailed, message)
    }
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;
