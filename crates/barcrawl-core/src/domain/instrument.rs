use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const MAX_CODE_LEN: usize = 12;

/// Validated terminal instrument code, e.g. `A005930` or the index codes
/// `U001` / `U201`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockCode(String);

impl StockCode {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::EmptyCode);
        }
        if value.len() > MAX_CODE_LEN {
            return Err(DomainError::CodeTooLong {
                len: value.len(),
                max: MAX_CODE_LEN,
            });
        }
        for (index, ch) in value.char_indices() {
            if !ch.is_ascii_alphanumeric() {
                return Err(DomainError::CodeInvalidChar { ch, index });
            }
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The KOSPI and KOSDAQ composite indexes live in the same chart API but
    /// are not tradable instruments.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.0 == "U001" || self.0 == "U201"
    }

    /// Q-prefixed codes are the terminal's synthetic/derived series.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with('Q')
    }
}

impl Display for StockCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for StockCode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Market section an instrument is listed on, in the terminal's integer
/// coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    Unclassified,
    Exchange,
    Kosdaq,
    Kotc,
    Krm,
    Konex,
}

impl MarketKind {
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Exchange,
            2 => Self::Kosdaq,
            3 => Self::Kotc,
            4 => Self::Krm,
            5 => Self::Konex,
            _ => Self::Unclassified,
        }
    }

    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Unclassified => 0,
            Self::Exchange => 1,
            Self::Kosdaq => 2,
            Self::Kotc => 3,
            Self::Krm => 4,
            Self::Konex => 5,
        }
    }

    /// Only exchange and KOSDAQ listings enter the collection universe.
    #[must_use]
    pub const fn is_collected(self) -> bool {
        matches!(self, Self::Exchange | Self::Kosdaq)
    }
}

/// Trading status in the terminal's integer coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingStatus {
    Normal,
    Suspended,
    Halted,
}

impl TradingStatus {
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Suspended,
            2 => Self::Halted,
            _ => Self::Normal,
        }
    }

    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Suspended => 1,
            Self::Halted => 2,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: StockCode,
    pub name: String,
    pub market_kind: MarketKind,
    pub status: TradingStatus,
}
