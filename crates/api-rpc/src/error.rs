//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use lifeguard_core::error::AppError;
use lifeguard_core::port::ExecutionError;
use serde_json::json;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const TIMEOUT: i32 = 4008;
    pub const IN_PROGRESS: i32 = 4009;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const EXECUTION_FAILED: i32 = 5003;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Execution(e) | AppError::RetryExhausted { last: e, .. } => {
            execution_error(message, &e)
        }
        AppError::Config(msg) | AppError::Internal(msg) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>)
        }
    }
}

fn execution_error(message: String, err: &ExecutionError) -> ErrorObjectOwned {
    match err {
        ExecutionError::Timeout(_) | ExecutionError::Cancelled => {
            ErrorObjectOwned::owned(code::TIMEOUT, message, None::<()>)
        }
        ExecutionError::Validation(_) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, None::<()>)
        }
        ExecutionError::NonZeroExit {
            code: exit_code,
            stderr,
            ..
        } => {
            let mut data = json!({ "exitCode": exit_code });
            if !stderr.is_empty() {
                data["stderr"] = json!(stderr);
            }
            ErrorObjectOwned::owned(code::EXECUTION_FAILED, message, Some(data))
        }
        _ => ErrorObjectOwned::owned(code::EXECUTION_FAILED, message, None::<()>),
    }
}

/// Non-blocking invocation accepted or still running
pub fn in_progress(action: &str, invocation_id: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::IN_PROGRESS,
        format!("action '{}' is in progress", action),
        Some(json!({ "invocationId": invocation_id })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_non_zero_exit_keeps_exit_code() {
        let err = to_rpc_error(AppError::Execution(ExecutionError::NonZeroExit {
            code: Some(2),
            message: "replica not ready\n".to_string(),
            stderr: String::new(),
        }));

        assert_eq!(err.code(), code::EXECUTION_FAILED);
        assert_eq!(err.message(), "replica not ready\n");
        assert_eq!(err.data().unwrap().get(), r#"{"exitCode":2}"#);
    }

    #[test]
    fn test_separate_stderr_travels_in_data() {
        let err = to_rpc_error(AppError::Execution(ExecutionError::NonZeroExit {
            code: Some(1),
            message: "exit status: 1".to_string(),
            stderr: "no quorum\n".to_string(),
        }));

        assert_eq!(err.message(), "exit status: 1");
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["exitCode"], 1);
        assert_eq!(data["stderr"], "no quorum\n");
    }

    #[test]
    fn test_exhausted_timeout_maps_to_timeout() {
        let err = to_rpc_error(AppError::Execution(ExecutionError::Timeout(
            Duration::from_secs(1),
        )));
        assert_eq!(err.code(), code::TIMEOUT);

        let err = to_rpc_error(AppError::RetryExhausted {
            attempts: 3,
            last: ExecutionError::StartFailed("sh: not found".to_string()),
        });
        assert_eq!(err.code(), code::EXECUTION_FAILED);
        assert!(err.message().contains("3 attempts"));
    }

    #[test]
    fn test_not_found() {
        let err = to_rpc_error(AppError::NotFound("action 'x'".to_string()));
        assert_eq!(err.code(), code::NOT_FOUND);
    }
}
