//! Discovery error types

use thiserror::Error;

/// The error type for partition discovery and block device operations
///
/// The variants form a small closed set: every operation in the workspace
/// either succeeds or reports exactly one of these outcomes.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reported by the underlying device
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was valid but no matching structure exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed caller input (zero capacity, unsupported sector size, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A scratch buffer could not be allocated or exceeds a resource limit
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    /// Invalid zone table or partition structure (signature, size, location)
    #[error("Invalid zone table: {0}")]
    InvalidZoneTable(String),

    /// Checksum verification failed
    #[error("Checksum verification failed: {0}")]
    ChecksumVerification(String),

    /// An address range falls outside its container
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Two partition ranges intersect
    #[error("Overlap: {0}")]
    Overlap(String),

    /// The device reports different media than the caller addressed
    #[error("Media changed: expected media {expected}, device has {actual}")]
    MediaChanged { expected: u32, actual: u32 },

    /// Write attempted on a read-only device
    #[error("Device is read-only: {0}")]
    ReadOnly(String),
}

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an out of resources error
    pub fn out_of_resources(msg: impl Into<String>) -> Self {
        Error::OutOfResources(msg.into())
    }

    /// Create an invalid zone table error
    pub fn invalid_zone_table(msg: impl Into<String>) -> Self {
        Error::InvalidZoneTable(msg.into())
    }

    /// Create a checksum verification error
    pub fn checksum(msg: impl Into<String>) -> Self {
        Error::ChecksumVerification(msg.into())
    }

    /// Create an out of range error
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    /// Create an overlap error
    pub fn overlap(msg: impl Into<String>) -> Self {
        Error::Overlap(msg.into())
    }

    /// Create a read-only error
    pub fn read_only(msg: impl Into<String>) -> Self {
        Error::ReadOnly(msg.into())
    }

    /// Does this error mean "the on-disk structure is unusable"?
    ///
    /// Structural failures make discovery fall back (to the backup GPT copy,
    /// or from GPT to MBR) instead of aborting.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidZoneTable(_)
                | Error::ChecksumVerification(_)
                | Error::OutOfRange(_)
                | Error::Overlap(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(Error::checksum("header").is_structural());
        assert!(Error::invalid_zone_table("signature").is_structural());
        assert!(Error::not_found("gpt").is_structural());
        assert!(!Error::out_of_resources("entries").is_structural());
        assert!(!Error::invalid_parameter("capacity").is_structural());

        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io.is_structural());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::MediaChanged { expected: 1, actual: 2 };
        assert_eq!(err.to_string(), "Media changed: expected media 1, device has 2");
        assert_eq!(Error::not_found("MBR").to_string(), "Not found: MBR");
    }
}
