use core::fmt::{Display, Error as FmtError, Formatter};
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// A point in time in nanoseconds since the Unix epoch. Zero encodes an
/// unset timestamp, as packets do for an absent timeout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn from_nanoseconds(nanoseconds: u64) -> Self {
        Self(nanoseconds)
    }

    pub fn nanoseconds(&self) -> u64 {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    /// Returns `None` on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let nanos = u64::try_from(duration.as_nanos()).ok()?;
        self.0.checked_add(nanos).map(Self)
    }

    /// Whether a timeout at `self` has passed on a chain whose latest block
    /// time is `now`. An unset timestamp never expires.
    pub fn has_expired_at(&self, now: Timestamp) -> bool {
        self.is_set() && now >= *self
    }
}

impl From<u64> for Timestamp {
    fn from(nanoseconds: u64) -> Self {
        Self(nanoseconds)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_timestamp_never_expires() {
        assert!(!Timestamp::none().has_expired_at(Timestamp::from_nanoseconds(u64::MAX)));
    }

    #[test]
    fn expires_once_reached() {
        let timeout = Timestamp::from_nanoseconds(1_000);
        assert!(!timeout.has_expired_at(Timestamp::from_nanoseconds(999)));
        assert!(timeout.has_expired_at(Timestamp::from_nanoseconds(1_000)));
    }
}
