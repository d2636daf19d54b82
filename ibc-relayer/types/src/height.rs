//! Defines the `Height` type used to locate blocks across chain upgrades.

use core::cmp::Ordering;
use core::fmt::{Debug, Display, Error as FmtError, Formatter};
use core::num::ParseIntError;
use core::str::FromStr;

use displaydoc::Display;
use ibc_proto::ibc::core::client::v1::Height as RawHeight;
use serde::{Deserialize, Serialize};

/// The height of a chain: a revision number (bumped on every hard upgrade)
/// and the number of blocks since that revision started.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Height {
    revision_number: u64,
    revision_height: u64,
}

impl Height {
    pub fn new(revision_number: u64, revision_height: u64) -> Result<Self, HeightError> {
        if revision_height == 0 {
            return Err(HeightError::ZeroHeight);
        }

        Ok(Self {
            revision_number,
            revision_height,
        })
    }

    /// The first height of the given revision.
    pub fn min(revision_number: u64) -> Self {
        Self {
            revision_number,
            revision_height: 1,
        }
    }

    pub fn revision_number(&self) -> u64 {
        self.revision_number
    }

    pub fn revision_height(&self) -> u64 {
        self.revision_height
    }

    pub fn add(&self, delta: u64) -> Height {
        Height {
            revision_number: self.revision_number,
            revision_height: self.revision_height.saturating_add(delta),
        }
    }

    pub fn increment(&self) -> Height {
        self.add(1)
    }

    pub fn sub(&self, delta: u64) -> Result<Height, HeightError> {
        if self.revision_height <= delta {
            return Err(HeightError::ZeroHeight);
        }

        Ok(Height {
            revision_number: self.revision_number,
            revision_height: self.revision_height - delta,
        })
    }

    pub fn decrement(&self) -> Result<Height, HeightError> {
        self.sub(1)
    }
}

impl PartialOrd for Height {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Height {
    fn cmp(&self, other: &Self) -> Ordering {
        self.revision_number
            .cmp(&other.revision_number)
            .then(self.revision_height.cmp(&other.revision_height))
    }
}

impl TryFrom<RawHeight> for Height {
    type Error = HeightError;

    fn try_from(raw_height: RawHeight) -> Result<Self, Self::Error> {
        Height::new(raw_height.revision_number, raw_height.revision_height)
    }
}

impl From<Height> for RawHeight {
    fn from(height: Height) -> Self {
        RawHeight {
            revision_number: height.revision_number,
            revision_height: height.revision_height,
        }
    }
}

impl Debug for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("Height")
            .field("revision", &self.revision_number)
            .field("height", &self.revision_height)
            .finish()
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

/// Encodes all errors related to chain heights
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum HeightError {
    /// cannot convert into a `Height` type from string `{height}`
    HeightConversion {
        height: String,
        error: ParseIntError,
    },
    /// attempted to build an invalid zero height
    ZeroHeight,
    /// the height(`{raw_height}`) is not valid format, this format must be used: \[revision_number\]-\[revision_height\]
    InvalidFormat { raw_height: String },
}

impl std::error::Error for HeightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            HeightError::HeightConversion { error: e, .. } => Some(e),
            HeightError::ZeroHeight | HeightError::InvalidFormat { .. } => None,
        }
    }
}

impl FromStr for Height {
    type Err = HeightError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (rev_number_str, rev_height_str) =
            value
                .split_once('-')
                .ok_or_else(|| HeightError::InvalidFormat {
                    raw_height: value.to_owned(),
                })?;

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|error| HeightError::HeightConversion {
                    height: value.to_owned(),
                    error,
                })
        };

        Height::new(parse(rev_number_str)?, parse(rev_height_str)?)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0-5", Ok((0, 5)))]
    #[case("4-18446744073709551615", Ok((4, u64::MAX)))]
    #[case("1-0", Err(HeightError::ZeroHeight))]
    #[case("10", Err(HeightError::InvalidFormat { raw_height: "10".to_owned() }))]
    fn parses_text_form(#[case] input: &str, #[case] expected: Result<(u64, u64), HeightError>) {
        let parsed = input
            .parse::<Height>()
            .map(|h| (h.revision_number(), h.revision_height()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn orders_by_revision_then_height() {
        let low = Height::new(0, 100).expect("non-zero height");
        let high = Height::new(1, 1).expect("non-zero height");
        assert!(low < high);
        assert!(low.increment() > low);
        assert_eq!(low.to_string(), "0-100");
    }
}
