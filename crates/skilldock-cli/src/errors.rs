//! Exit-code mapping for CLI failures.

use skilldock_core::SkilldockError;

/// Exit code contract: 0 success, 1 policy or argument error, 2 I/O error,
/// 3 execution failure.
pub fn exit_code_for(error: &SkilldockError) -> i32 {
    match error {
        SkilldockError::Io(_) | SkilldockError::Serialization(_) => 2,
        SkilldockError::ScriptTimeout { .. } | SkilldockError::ScriptFailed { .. } => 3,
        _ => 1,
    }
}
