use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use crate::error::IdentifierError;
use crate::validate::{validate_connection_identifier, validate_named_u64_index};

const CONNECTION_ID_PREFIX: &str = "connection";

/// Identifier of one end of a connection, always `connection-{n}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(identifier: u64) -> Self {
        Self(format!("{CONNECTION_ID_PREFIX}-{identifier}"))
    }

    pub fn prefix() -> &'static str {
        CONNECTION_ID_PREFIX
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `{n}` of `connection-{n}`.
    pub fn index(&self) -> Result<u64, IdentifierError> {
        validate_named_u64_index(&self.0, CONNECTION_ID_PREFIX)
    }
}

impl FromStr for ConnectionId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_connection_identifier(s).map(|_| Self(s.to_string()))
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for ConnectionId {
    fn eq(&self, other: &str) -> bool {
        self.as_str().eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrips_through_the_string_form() {
        let id: ConnectionId = "connection-7".parse().expect("valid connection id");
        assert_eq!(id, ConnectionId::new(7));
        assert_eq!(id.index(), Ok(7));
    }
}
