//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a rejected ceremony apart from unreadable input or an
//! unreachable metadata service.

use fidocheck_core::{MetadataError, VerificationError};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Data format error (verification failed).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open or parse input.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (metadata endpoint).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Marks an error as caused by the command's input rather than by the
/// verification itself.
#[derive(Debug)]
pub struct InputError(pub String);

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InputError {}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify by the first typed error in the chain
        let code = err
            .chain()
            .find_map(|cause| {
                if cause.is::<InputError>() || cause.is::<std::io::Error>() {
                    Some(INPUT_ERROR)
                } else if let Some(e) = cause.downcast_ref::<MetadataError>() {
                    Some(metadata_code(e))
                } else if let Some(e) = cause.downcast_ref::<VerificationError>() {
                    Some(match e {
                        VerificationError::Metadata(inner) => metadata_code(inner),
                        VerificationError::IllegalArgument(_) => INPUT_ERROR,
                        _ => VERIFICATION_FAILED,
                    })
                } else {
                    None
                }
            })
            .unwrap_or(GENERAL_ERROR);

        Self {
            code,
            message: Some(message),
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(exit: ExitCode) -> Self {
        std::process::ExitCode::from(u8::try_from(exit.code).unwrap_or(1))
    }
}

fn metadata_code(err: &MetadataError) -> i32 {
    match err {
        MetadataError::Transport(_) | MetadataError::HttpStatus(_) | MetadataError::Timeout(_) => {
            NETWORK_ERROR
        }
        MetadataError::Io(_) | MetadataError::Config(_) => INPUT_ERROR,
        MetadataError::InvalidBlob(_) | MetadataError::Untrusted(_) => VERIFICATION_FAILED,
    }
}
