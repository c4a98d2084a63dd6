//! Live Feed Messages
//!
//! Decoded, schema-labelled feed frames and the numeric coercion rules shared
//! by the live stream and the snapshot pull.

use std::collections::HashMap;
use std::fmt;

/// Errors produced while decoding a feed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The category/subtype combination has no known field schema.
    #[error("unsupported message: category={category} subtype={subtype}")]
    UnsupportedMessage {
        /// Category token as received.
        category: String,
        /// Subtype token as received (may be empty).
        subtype: String,
    },

    /// A numeric field held a non-numeric value.
    #[error("malformed field {field}: {value:?}")]
    MalformedField {
        /// Schema field name.
        field: String,
        /// Raw value.
        value: String,
    },

    /// The frame does not have the outer envelope shape.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Message category selected by the frame's category token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Stock/ETF/warrant quote messages (`S`).
    Quote,
    /// Derivative quote messages (`D`).
    Derivative,
    /// Market index messages (`MI`).
    Index,
}

impl MessageCategory {
    /// Parse a category token (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::UnsupportedMessage` for an unknown token.
    pub fn parse(token: &str) -> Result<Self, DecodeError> {
        match token.to_ascii_uppercase().as_str() {
            "S" => Ok(Self::Quote),
            "D" => Ok(Self::Derivative),
            "MI" => Ok(Self::Index),
            _ => Err(DecodeError::UnsupportedMessage {
                category: token.to_string(),
                subtype: String::new(),
            }),
        }
    }

    /// Wire token.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Quote => "S",
            Self::Derivative => "D",
            Self::Index => "MI",
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Derivative => "derivative",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded frame: field name to raw string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Message category.
    pub category: MessageCategory,
    /// Subtype token (`SFU`, `SBA`, `DMA`, ...), upper-cased.
    pub subtype: String,
    /// Schema-labelled values.
    pub fields: HashMap<String, String>,
}

impl DecodedMessage {
    /// Raw value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Raw value of a field, treating empty strings as absent.
    #[must_use]
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.is_empty())
    }

    /// Numeric value of a field, if present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MalformedField` if the value is not numeric.
    pub fn number(&self, field: &str) -> Result<Option<f64>, DecodeError> {
        self.non_empty(field)
            .map(|v| coerce_number(field, v))
            .transpose()
    }

    /// Instrument code carried by the message.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.non_empty("code")
    }
}

/// Convert a raw feed value into a number.
///
/// Empty strings coerce to zero.
///
/// # Errors
///
/// Returns `DecodeError::MalformedField` for non-numeric input.
pub fn coerce_number(field: &str, value: &str) -> Result<f64, DecodeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::MalformedField {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!(MessageCategory::parse("s").unwrap(), MessageCategory::Quote);
        assert_eq!(MessageCategory::parse("mi").unwrap(), MessageCategory::Index);
        assert_eq!(
            MessageCategory::parse("D").unwrap(),
            MessageCategory::Derivative
        );
        assert!(matches!(
            MessageCategory::parse("X"),
            Err(DecodeError::UnsupportedMessage { .. })
        ));
    }

    #[test]
    fn coerce_empty_is_zero() {
        assert_eq!(coerce_number("matchPrice", "").unwrap(), 0.0);
        assert_eq!(coerce_number("matchPrice", "  ").unwrap(), 0.0);
    }

    #[test]
    fn coerce_numbers() {
        assert_eq!(coerce_number("matchPrice", "23.45").unwrap(), 23.45);
        assert_eq!(coerce_number("matchQtty", "1200").unwrap(), 1200.0);
    }

    #[test]
    fn coerce_garbage_fails() {
        let err = coerce_number("matchPrice", "ATO").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedField {
                field: "matchPrice".to_string(),
                value: "ATO".to_string(),
            }
        );
        assert!(coerce_number("matchPrice", "NaN").is_err());
    }

    #[test]
    fn message_number_skips_empty() {
        let message = DecodedMessage {
            category: MessageCategory::Quote,
            subtype: "SMA".to_string(),
            fields: HashMap::from([
                ("code".to_string(), "ABC".to_string()),
                ("matchPrice".to_string(), String::new()),
                ("matchQtty".to_string(), "10".to_string()),
            ]),
        };
        assert_eq!(message.number("matchPrice").unwrap(), None);
        assert_eq!(message.number("matchQtty").unwrap(), Some(10.0));
        assert_eq!(message.number("missing").unwrap(), None);
        assert_eq!(message.code(), Some("ABC"));
    }
}
