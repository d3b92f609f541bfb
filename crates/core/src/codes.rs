//! Failure-kind codes.
//!
//! Every error in the workspace reduces to one of these integers. They are
//! compatible with the codes the parent process already understands, so the
//! values are frozen. Store codes and sorter codes are separate namespaces;
//! a sorter code is only ever reported alongside the file it came from.
//!
//! Mapping to a process exit status happens once, at the worker boundary:
//! negative codes become `100 + code`, which keeps them below 100.

/// Success.
pub const SUCCESS: i32 = 0;

/// Store error codes.
pub mod store {
    /// Could not open a file.
    pub const OPEN_FILE: i32 = -1;
    /// Data on disk is not what the format requires.
    pub const CORRUPT: i32 = -2;
    /// Memory allocation failed.
    pub const ALLOC_FAIL: i32 = -3;
    /// A read came up short or failed.
    pub const READ: i32 = -4;
    /// A write came up short or failed.
    pub const WRITE: i32 = -7;
    /// Malformed or missing input.
    pub const INVALID_ARGUMENTS: i32 = -10;
    /// A named file does not exist.
    pub const NO_SUCH_FILE: i32 = -11;
}

/// Sort/merge engine error codes.
pub mod sorter {
    /// Could not open an input or run file.
    pub const OPEN_FILE: i32 = -1;
    /// Reading a record failed or hit a truncated record.
    pub const FILE_READ: i32 = -2;
    /// Writing a record failed.
    pub const FILE_WRITE: i32 = -3;
    /// Invalid sorter arguments.
    pub const BAD_ARG: i32 = -4;
    /// Memory allocation failed while building a record.
    pub const ALLOC: i32 = -5;
    /// Could not create a temporary run file.
    pub const TMP_FILE: i32 = -10;
    /// Could not move the sorted output over the input.
    pub const RENAME_FILE: i32 = -11;
}

/// Exit status used when the parent cancels the job with the `exit` sentinel.
pub const CANCELLED_EXIT_STATUS: i32 = 1;

/// Offset added to thread-start failures so they never collide with codes
/// produced by [`exit_status`].
pub const THREAD_START_EXIT_BASE: i32 = 100;

/// Map a failure-kind code to a process exit status.
pub fn exit_status(code: i32) -> i32 {
    if code < 0 {
        100 + code
    } else {
        code
    }
}
