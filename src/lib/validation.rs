//! Input validation utilities
//!
//! This module provides common validation functions for command-line parameters
//! and file paths with consistent error messages.
//!
//! All validation functions use structured error types from [`crate::errors`] to provide
//! rich contextual information when validation fails.

use crate::errors::{LampreyError, Result};
use std::fmt::Display;
use std::path::Path;

/// Validate that a file exists
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Input BAM", "Custom kit file")
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use lamprey_lib::validation::validate_file_exists;
/// use std::path::Path;
///
/// let result = validate_file_exists("/nonexistent/reads.bam", "Input BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(LampreyError::InvalidFileFormat {
            file_type: description.to_string(),
            path: path_ref.display().to_string(),
            reason: "File does not exist".to_string(),
        });
    }
    Ok(())
}

/// Validate that multiple files exist
///
/// # Arguments
/// * `files` - Slice of (path, description) tuples
///
/// # Errors
/// Returns an error for the first file that doesn't exist
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    for (path, desc) in files {
        validate_file_exists(path, desc)?;
    }
    Ok(())
}

/// Validate that a fraction is in the valid range [0.0, 1.0]
///
/// Used for thresholds expressed as fractions, such as the minimum flank
/// score for barcode classification or the minimum pairing overlap.
///
/// # Arguments
/// * `value` - Fraction to validate
/// * `name` - Name of the parameter for error messages
///
/// # Errors
/// Returns an error if the value is not in [0.0, 1.0]
///
/// # Example
/// ```
/// use lamprey_lib::validation::validate_fraction;
///
/// validate_fraction(0.5, "min-flank-score").unwrap();
/// validate_fraction(1.0, "min-flank-score").unwrap();
///
/// let result = validate_fraction(1.5, "min-flank-score");
/// assert!(result.is_err());
/// ```
pub fn validate_fraction(value: f64, name: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(LampreyError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be between 0 and 1, got: {value}"),
        });
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Arguments
/// * `value` - Value to validate
/// * `name` - Name of the parameter for error messages
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use lamprey_lib::validation::validate_positive;
///
/// validate_positive(4, "threads").unwrap();
///
/// let result = validate_positive(0, "threads");
/// assert!(result.is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(LampreyError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Validate that max >= min for optional max values
///
/// # Arguments
/// * `min_val` - Minimum value
/// * `max_val` - Optional maximum value
/// * `min_name` - Name of minimum parameter for error messages
/// * `max_name` - Name of maximum parameter for error messages
///
/// # Errors
/// Returns an error if max < min
///
/// # Example
/// ```
/// use lamprey_lib::validation::validate_min_max;
///
/// // Valid: max >= min
/// validate_min_max(3, Some(9), "min-barcode-penalty-dist", "max-barcode-penalty").unwrap();
///
/// // Valid: max is None
/// validate_min_max(3, None, "min-barcode-penalty-dist", "max-barcode-penalty").unwrap();
///
/// // Invalid: max < min
/// let result = validate_min_max(10, Some(5), "min", "max");
/// assert!(result.is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_min_max<T: Ord + Display>(
    min_val: T,
    max_val: Option<T>,
    min_name: &str,
    max_name: &str,
) -> Result<()> {
    if let Some(max) = max_val {
        if max < min_val {
            return Err(LampreyError::InvalidParameter {
                parameter: max_name.to_string(),
                reason: format!("{max_name} ({max}) must be >= {min_name} ({min_val})"),
            });
        }
    }
    Ok(())
}
