//! Live-view frame validation
//!
//! Stitched frames can still be damaged when foreign packets collide with the
//! image stream. Checks, by level:
//! - Minimal: frame starts with the SOI marker
//! - Moderate: also ends with the EOI marker
//! - Strict: also the JPEG headers parse and report non-zero dimensions
//!
//! Configurable via the `DXO_FRAME_VALIDATION` environment variable.

use serde::{Deserialize, Serialize};

use crate::protocol::{JPEG_EOI, JPEG_SOI};

/// Smallest byte count that can hold SOI and EOI markers
const MIN_FRAME_SIZE: usize = JPEG_SOI.len() + JPEG_EOI.len();

/// Frame validation strictness levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidationLevel {
    /// Markers plus a successful header parse
    Strict,
    /// SOI and EOI markers
    #[default]
    Moderate,
    /// SOI marker only
    Minimal,
    /// No validation
    Off,
}

impl ValidationLevel {
    /// Parse from environment variable string
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "strict" => Self::Strict,
            "moderate" => Self::Moderate,
            "minimal" => Self::Minimal,
            "off" | "none" | "disabled" => Self::Off,
            _ => {
                log::warn!("Unknown validation level '{}', defaulting to 'moderate'", s);
                Self::Moderate
            }
        }
    }
}

/// Frame validation result with diagnostic details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the frame passed validation
    pub valid: bool,
    /// Frame size in bytes
    pub size: usize,
    /// Image dimensions from the JPEG header (Strict only)
    pub dimensions: Option<(u16, u16)>,
    /// Reason for validation failure (if any)
    pub failure_reason: Option<String>,
}

/// Validate a stitched JPEG frame
pub fn validate_jpeg_frame(data: &[u8], level: ValidationLevel) -> ValidationResult {
    let size = data.len();

    if level == ValidationLevel::Off {
        return ValidationResult {
            valid: true,
            size,
            dimensions: None,
            failure_reason: None,
        };
    }

    let mut failure_reasons = Vec::new();

    if size < MIN_FRAME_SIZE {
        failure_reasons.push(format!("Frame too short: {} bytes", size));
    } else if !data.starts_with(&JPEG_SOI) {
        failure_reasons.push(format!(
            "Missing SOI marker: starts with {:02X?}",
            &data[..JPEG_SOI.len()]
        ));
    }

    if matches!(level, ValidationLevel::Moderate | ValidationLevel::Strict)
        && !data.ends_with(&JPEG_EOI)
    {
        failure_reasons.push("Missing EOI marker at end of frame".to_string());
    }

    let dimensions = if level == ValidationLevel::Strict && failure_reasons.is_empty() {
        match read_dimensions(data) {
            Ok(dims) => Some(dims),
            Err(reason) => {
                failure_reasons.push(reason);
                None
            }
        }
    } else {
        None
    };

    let valid = failure_reasons.is_empty();
    let failure_reason = if valid {
        None
    } else {
        Some(failure_reasons.join("; "))
    };

    ValidationResult {
        valid,
        size,
        dimensions,
        failure_reason,
    }
}

/// Parse JPEG headers and return (width, height)
fn read_dimensions(data: &[u8]) -> Result<(u16, u16), String> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    decoder
        .read_info()
        .map_err(|e| format!("JPEG header parse failed: {}", e))?;

    match decoder.info() {
        Some(info) if info.width > 0 && info.height > 0 => Ok((info.width, info.height)),
        Some(info) => Err(format!(
            "JPEG header reports empty image: {}x{}",
            info.width, info.height
        )),
        None => Err("JPEG header has no frame information".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{minimal_jpeg, synthetic_jpeg};

    #[test]
    fn test_valid_frame_strict() {
        let result = validate_jpeg_frame(&minimal_jpeg(), ValidationLevel::Strict);

        assert!(result.valid, "{:?}", result.failure_reason);
        assert_eq!(result.dimensions, Some((8, 8)));
        assert!(result.failure_reason.is_none());
    }

    #[test]
    fn test_padded_frame_strict() {
        // Comment segments used for padding do not disturb header parsing
        let result = validate_jpeg_frame(&synthetic_jpeg(4000), ValidationLevel::Strict);
        assert!(result.valid, "{:?}", result.failure_reason);
        assert_eq!(result.size, 4000);
    }

    #[test]
    fn test_truncated_frame() {
        let mut frame = minimal_jpeg();
        frame.truncate(frame.len() - 10);

        let result = validate_jpeg_frame(&frame, ValidationLevel::Moderate);
        assert!(!result.valid);
        assert!(result.failure_reason.unwrap().contains("EOI"));

        // Minimal only checks the start
        assert!(validate_jpeg_frame(&frame, ValidationLevel::Minimal).valid);
    }

    #[test]
    fn test_missing_soi() {
        let frame = [0x00, 0x11, 0x22, 0xFF, 0xD9];
        let result = validate_jpeg_frame(&frame, ValidationLevel::Minimal);

        assert!(!result.valid);
        assert!(result.failure_reason.unwrap().contains("SOI"));
    }

    #[test]
    fn test_markers_only_fails_strict() {
        let frame = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xD9];

        assert!(validate_jpeg_frame(&frame, ValidationLevel::Moderate).valid);

        let result = validate_jpeg_frame(&frame, ValidationLevel::Strict);
        assert!(!result.valid);
        assert!(result.dimensions.is_none());
    }

    #[test]
    fn test_too_short() {
        let result = validate_jpeg_frame(&[0xFF, 0xD8], ValidationLevel::Minimal);
        assert!(!result.valid);
        assert!(result.failure_reason.unwrap().contains("too short"));
    }

    #[test]
    fn test_validation_off() {
        let result = validate_jpeg_frame(&[0x00; 3], ValidationLevel::Off);
        assert!(result.valid);
        assert!(result.failure_reason.is_none());
    }

    #[test]
    fn test_from_env_str() {
        assert_eq!(
            ValidationLevel::from_env_str("strict"),
            ValidationLevel::Strict
        );
        assert_eq!(
            ValidationLevel::from_env_str("STRICT"),
            ValidationLevel::Strict
        );
        assert_eq!(
            ValidationLevel::from_env_str("moderate"),
            ValidationLevel::Moderate
        );
        assert_eq!(
            ValidationLevel::from_env_str("minimal"),
            ValidationLevel::Minimal
        );
        assert_eq!(ValidationLevel::from_env_str("off"), ValidationLevel::Off);
        assert_eq!(ValidationLevel::from_env_str("none"), ValidationLevel::Off);
        assert_eq!(
            ValidationLevel::from_env_str("disabled"),
            ValidationLevel::Off
        );
        // Unknown defaults to moderate
        assert_eq!(
            ValidationLevel::from_env_str("invalid"),
            ValidationLevel::Moderate
        );
    }
}
