use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use crate::error::IdentifierError;
use crate::validate::validate_identifier_chars;

/// Identifier of a chain.
///
/// A chain id of the form `{chain name}-{revision number}` carries the
/// revision number used in the heights of that chain. Any other form is
/// accepted with a revision number of zero.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId {
    id: String,
    revision_number: u64,
}

impl ChainId {
    pub fn new(chain_id: &str) -> Result<Self, IdentifierError> {
        Self::from_str(chain_id)
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Extract the revision number from the chain identifier
    pub fn revision_number(&self) -> u64 {
        self.revision_number
    }
}

impl FromStr for ChainId {
    type Err = IdentifierError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier_chars(id)?;

        let revision_number = parse_revision_number(id).unwrap_or(0);

        Ok(Self {
            id: id.to_string(),
            revision_number,
        })
    }
}

/// Parses the `{n}` suffix of `{name}-{n}`. Leading zeros are not a revision
/// number.
fn parse_revision_number(id: &str) -> Option<u64> {
    let (name, number) = id.rsplit_once('-')?;

    if name.is_empty() || (number.len() > 1 && number.starts_with('0')) {
        return None;
    }

    number.parse().ok()
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("chainA", 0)]
    #[case("chainA-1", 1)]
    #[case("ibc-test-12", 12)]
    #[case("chainA-01", 0)]
    #[case("-5", 0)]
    fn revision_number_is_parsed_from_suffix(#[case] id: &str, #[case] revision: u64) {
        let chain_id = ChainId::new(id).expect("valid chain id");
        assert_eq!(chain_id.revision_number(), revision);
        assert_eq!(chain_id.as_str(), id);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(ChainId::new("chain/a-1").is_err());
    }
}
