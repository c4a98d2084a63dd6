//! Resolution Table
//!
//! Bidirectional mapping between a bar resolution code and its storage
//! partition, upstream provider token, and wall-clock span. Only the fixed set
//! `1`, `5`, `15`, `30`, `60` (minutes) and `D` (daily) is supported.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Error returned for codes or partition names outside the fixed table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The code or partition name is not part of the supported set.
    #[error("unsupported resolution: {0}")]
    Unsupported(String),
}

/// Bar resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    /// One-minute bars.
    Minute1,
    /// Five-minute bars.
    Minute5,
    /// Fifteen-minute bars.
    Minute15,
    /// Thirty-minute bars.
    Minute30,
    /// Hourly bars.
    Minute60,
    /// Daily bars.
    Daily,
}

impl Resolution {
    /// Every supported resolution, finest first.
    pub const ALL: [Self; 6] = [
        Self::Minute1,
        Self::Minute5,
        Self::Minute15,
        Self::Minute30,
        Self::Minute60,
        Self::Daily,
    ];

    /// Parse a resolution code (`1`, `5`, `15`, `30`, `60`, `D`).
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::Unsupported` for any other code.
    pub fn parse(code: &str) -> Result<Self, ResolutionError> {
        match code.trim() {
            "1" => Ok(Self::Minute1),
            "5" => Ok(Self::Minute5),
            "15" => Ok(Self::Minute15),
            "30" => Ok(Self::Minute30),
            "60" => Ok(Self::Minute60),
            "D" | "d" => Ok(Self::Daily),
            other => Err(ResolutionError::Unsupported(other.to_string())),
        }
    }

    /// Resolution code as used in cache keys.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Minute1 => "1",
            Self::Minute5 => "5",
            Self::Minute15 => "15",
            Self::Minute30 => "30",
            Self::Minute60 => "60",
            Self::Daily => "D",
        }
    }

    /// Time-series partition holding bars of this resolution.
    #[must_use]
    pub const fn partition(self) -> &'static str {
        match self {
            Self::Minute1 => "Resolution1",
            Self::Minute5 => "Resolution5",
            Self::Minute15 => "Resolution15",
            Self::Minute30 => "Resolution30",
            Self::Minute60 => "Resolution60",
            Self::Daily => "ResolutionD",
        }
    }

    /// Look up the resolution stored in a partition.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::Unsupported` for an unknown partition name.
    pub fn from_partition(partition: &str) -> Result<Self, ResolutionError> {
        Self::ALL
            .into_iter()
            .find(|r| r.partition() == partition)
            .ok_or_else(|| ResolutionError::Unsupported(partition.to_string()))
    }

    /// Resolution token understood by the upstream history API.
    #[must_use]
    pub const fn provider_token(self) -> &'static str {
        // The upstream uses the same tokens as our codes.
        self.code()
    }

    /// Length of one bar in minutes.
    #[must_use]
    pub const fn minutes(self) -> i64 {
        match self {
            Self::Minute1 => 1,
            Self::Minute5 => 5,
            Self::Minute15 => 15,
            Self::Minute30 => 30,
            Self::Minute60 => 60,
            Self::Daily => 24 * 60,
        }
    }

    /// Wall-clock span covered by one bar.
    #[must_use]
    pub const fn duration(self) -> TimeDelta {
        TimeDelta::minutes(self.minutes())
    }

    /// Whether this is a sub-daily resolution.
    #[must_use]
    pub const fn is_intraday(self) -> bool {
        !matches!(self, Self::Daily)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Resolution {
    type Error = ResolutionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.code().to_string()
    }
}

// =============================================================================
// Code-based lookups
// =============================================================================

/// Partition name for a resolution code.
///
/// # Errors
///
/// Returns `ResolutionError::Unsupported` for an unknown code.
pub fn partition_for(code: &str) -> Result<&'static str, ResolutionError> {
    Resolution::parse(code).map(Resolution::partition)
}

/// Resolution code stored in a partition.
///
/// # Errors
///
/// Returns `ResolutionError::Unsupported` for an unknown partition name.
pub fn resolution_for(partition: &str) -> Result<&'static str, ResolutionError> {
    Resolution::from_partition(partition).map(Resolution::code)
}

/// Upstream provider token for a resolution code.
///
/// # Errors
///
/// Returns `ResolutionError::Unsupported` for an unknown code.
pub fn provider_token(code: &str) -> Result<&'static str, ResolutionError> {
    Resolution::parse(code).map(Resolution::provider_token)
}

/// Wall-clock span of one bar for a resolution code.
///
/// # Errors
///
/// Returns `ResolutionError::Unsupported` for an unknown code.
pub fn duration_for(code: &str) -> Result<TimeDelta, ResolutionError> {
    Resolution::parse(code).map(Resolution::duration)
}
