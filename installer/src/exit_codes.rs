//! Stable exit codes for the `program-installer` binary.

/// Playbook (or direct install) ran successfully, or help/version was shown.
pub const OK: i32 = 0;
/// Invalid configuration, missing credential, unsupported OS, no programs, or
/// any other error raised before the pipeline produced an outcome.
pub const INVALID: i32 = 1;
/// No model produced playbook content.
pub const GENERATION_FAILED: i32 = 2;
/// The playbook still failed its syntax check after the repair budget.
pub const VALIDATION_EXHAUSTED: i32 = 3;
/// The validated playbook (or a package-manager command) failed to run.
pub const EXECUTION_FAILED: i32 = 4;
