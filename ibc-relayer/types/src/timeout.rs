use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use ibc_proto::ibc::core::client::v1::Height as RawHeight;

use crate::height::{Height, HeightError};

/// The height bound after which a packet can no longer be received.
///
/// On the wire an absent bound is the zero height `0-0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimeoutHeight {
    #[default]
    Never,
    At(Height),
}

impl TimeoutHeight {
    pub fn no_timeout() -> Self {
        Self::Never
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::At(_))
    }

    /// Whether the bound has been reached by a chain at `height`.
    pub fn has_expired(&self, height: Height) -> bool {
        match self {
            Self::Never => false,
            Self::At(timeout) => height >= *timeout,
        }
    }

    /// Revision number and height, `(0, 0)` when unset.
    pub fn commitment_parts(&self) -> (u64, u64) {
        match self {
            Self::Never => (0, 0),
            Self::At(height) => (height.revision_number(), height.revision_height()),
        }
    }
}

impl From<Height> for TimeoutHeight {
    fn from(height: Height) -> Self {
        Self::At(height)
    }
}

impl From<Option<RawHeight>> for TimeoutHeight {
    fn from(raw: Option<RawHeight>) -> Self {
        raw.and_then(|raw| Height::try_from(raw).ok())
            .map_or(Self::Never, Self::At)
    }
}

impl From<TimeoutHeight> for Option<RawHeight> {
    fn from(timeout: TimeoutHeight) -> Self {
        match timeout {
            TimeoutHeight::Never => None,
            TimeoutHeight::At(height) => Some(height.into()),
        }
    }
}

impl FromStr for TimeoutHeight {
    type Err = HeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Height>() {
            Ok(height) => Ok(Self::At(height)),
            Err(HeightError::ZeroHeight) => Ok(Self::Never),
            Err(e) => Err(e),
        }
    }
}

impl Display for TimeoutHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Never => write!(f, "0-0"),
            Self::At(height) => write!(f, "{height}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0-0", TimeoutHeight::Never)]
    #[case("1-0", TimeoutHeight::Never)]
    #[case("1-20", TimeoutHeight::At(Height::new(1, 20).expect("non-zero height")))]
    fn parses_event_attribute_form(#[case] input: &str, #[case] expected: TimeoutHeight) {
        assert_eq!(input.parse::<TimeoutHeight>(), Ok(expected));
    }

    #[test]
    fn expires_at_the_bound() {
        let bound = Height::new(0, 10).expect("non-zero height");
        let timeout = TimeoutHeight::At(bound);
        assert!(!timeout.has_expired(Height::new(0, 9).expect("non-zero height")));
        assert!(timeout.has_expired(bound));
        assert!(!TimeoutHeight::Never.has_expired(Height::new(9, 9).expect("non-zero height")));
    }
}
