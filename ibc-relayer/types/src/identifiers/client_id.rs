use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use crate::error::IdentifierError;
use crate::validate::validate_client_identifier;

/// Identifier of a light client hosted on a chain, e.g. `07-tendermint-0`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Builds the identifier of the `counter`-th client of the given type.
    pub fn new(client_type: &str, counter: u64) -> Result<Self, IdentifierError> {
        format!("{client_type}-{counter}").parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClientId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_client_identifier(s).map(|_| Self(s.to_string()))
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}
