//! Custom error types for lamprey operations.

use thiserror::Error;

/// Result type alias for lamprey operations
pub type Result<T> = std::result::Result<T, LampreyError>;

/// Error type for lamprey operations
#[derive(Error, Debug)]
pub enum LampreyError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Barcode kit name not present in the registry or custom kit file
    #[error("Unknown barcode kit '{kit_name}': not found in built-in or custom kits")]
    UnknownKit {
        /// The kit name that failed lookup
        kit_name: String,
    },

    /// Barcode name has no sequence in the registry or custom sequence table
    #[error("Unknown barcode '{barcode_name}': no sequence in built-in or custom tables")]
    UnknownBarcode {
        /// The barcode name that failed lookup
        barcode_name: String,
    },

    /// Barcode kit definition violates a structural requirement
    #[error("Invalid barcode kit '{kit_name}': {reason}")]
    InvalidKit {
        /// The offending kit
        kit_name: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Custom kit or sequence file could not be parsed
    #[error("Invalid custom kit file '{path}': {reason}")]
    InvalidCustomKit {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Input file missing or malformed
    #[error("Invalid {file_type} '{path}': {reason}")]
    InvalidFileFormat {
        /// Human-readable description of the file's role
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A read's arrays are mutually inconsistent (seq vs qual vs moves)
    #[error("Inconsistent read '{read_id}': {reason}")]
    InconsistentRead {
        /// The read id
        read_id: String,
        /// Explanation of the inconsistency
        reason: String,
    },

    /// BAM record is missing a tag required by the requested operation
    #[error("Record '{read_id}' is missing required tag '{tag}'")]
    MissingTag {
        /// The read id
        read_id: String,
        /// The two-character aux tag
        tag: String,
    },

    /// Unsupported pairing mode or node configuration
    #[error("Invalid pipeline configuration: {reason}")]
    InvalidPipeline {
        /// Explanation of the problem
        reason: String,
    },
}
