use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Supported forecast horizons. Serialized as the integer month count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TargetDuration {
    Months12,
    Months24,
    Months36,
    Months60,
}

impl TargetDuration {
    pub const ALL: [TargetDuration; 4] = [
        TargetDuration::Months12,
        TargetDuration::Months24,
        TargetDuration::Months36,
        TargetDuration::Months60,
    ];

    pub fn months(self) -> u32 {
        match self {
            Self::Months12 => 12,
            Self::Months24 => 24,
            Self::Months36 => 36,
            Self::Months60 => 60,
        }
    }

    pub fn years(self) -> f64 {
        self.months() as f64 / 12.0
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Months12 => "1y",
            Self::Months24 => "2y",
            Self::Months36 => "3y",
            Self::Months60 => "5y",
        }
    }
}

impl TryFrom<u32> for TargetDuration {
    type Error = ForecastError;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        match months {
            12 => Ok(Self::Months12),
            24 => Ok(Self::Months24),
            36 => Ok(Self::Months36),
            60 => Ok(Self::Months60),
            other => Err(ForecastError::InvalidDuration(other)),
        }
    }
}

impl From<TargetDuration> for u32 {
    fn from(d: TargetDuration) -> Self {
        d.months()
    }
}

impl fmt::Display for TargetDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.months())
    }
}
