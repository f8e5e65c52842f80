//! Hardsub Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

// =============================================================================
// ID Types
// =============================================================================

/// Queue job unique identifier (ULID)
pub type JobId = String;

/// Generates a fresh job identifier.
///
/// ULIDs are never reused, so an id stays unique for the lifetime of the
/// queue even after the job it named has been removed.
pub fn new_job_id() -> JobId {
    ulid::Ulid::new().to_string()
}

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;
