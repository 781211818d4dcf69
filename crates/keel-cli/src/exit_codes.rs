//! Process exit codes
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - malformed location, credentials, or revision
pub const VALIDATION_ERROR: i32 = 2;

/// Repository, revision, or chart not found
pub const NOT_FOUND: i32 = 3;

/// Registration conflicts with an existing one
pub const CONFLICT: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Repository unreachable (sysexits.h EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;

/// Policy denied the request (sysexits.h EX_NOPERM)
pub const PERMISSION_DENIED: i32 = 77;
