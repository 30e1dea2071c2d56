//! Process exit codes
//!
//! Scripts can tell failure categories apart by the exit status.

use b2_core::Error;

/// Exit status of the `b2` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Unclassified failure
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    /// Transport failure or a transient service error
    NetworkError = 3,
    /// Credentials rejected
    AuthError = 4,
    /// Bucket or file does not exist
    NotFound = 5,
    /// Content did not match its SHA1
    IntegrityError = 6,
}

impl ExitCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exit code for a client error
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Transport(_) => ExitCode::NetworkError,
            Error::Service(e) | Error::Auth(e) if matches!(e.status, 401 | 403) => {
                ExitCode::AuthError
            }
            Error::Auth(_) => ExitCode::AuthError,
            Error::Service(e) if !e.is_fatal() => ExitCode::NetworkError,
            Error::Service(_) => ExitCode::GeneralError,
            Error::Integrity(_) => ExitCode::IntegrityError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Config(_) | Error::InvalidArgument(_) => ExitCode::UsageError,
            Error::Io(_) | Error::Json(_) => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}
