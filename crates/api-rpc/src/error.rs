//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use vaultq_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::UnknownQueue(queue) => ErrorObjectOwned::owned(
            code::VALIDATION_ERROR,
            format!("Unknown queue: {}", queue),
            None::<()>,
        ),
        AppError::UnknownJobType(job_type) => ErrorObjectOwned::owned(
            code::VALIDATION_ERROR,
            format!("Unknown job type: {}", job_type),
            None::<()>,
        ),
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::InvalidState(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Io(e) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>),
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}

/// Rate-limit rejection
pub fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_not_found_to_4001() {
        let err = to_rpc_error(AppError::NotFound("Job x not found".to_string()));
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[test]
    fn maps_invalid_state_to_conflict() {
        let err = to_rpc_error(AppError::InvalidState("terminal".to_string()));
        assert_eq!(err.code(), code::CONFLICT);
    }

    #[test]
    fn maps_unknown_queue_to_validation() {
        let err = to_rpc_error(AppError::UnknownQueue("nope".to_string()));
        assert_eq!(err.code(), code::VALIDATION_ERROR);
        assert!(err.message().contains("nope"));
    }
}
