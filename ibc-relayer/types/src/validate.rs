use crate::error::IdentifierError as Error;

const VALID_SPECIAL_CHARS: &str = "._+-#[]<>";

/// Checks that the identifier only contains the characters allowed by
/// ICS-24: alphanumerics and `.`, `_`, `+`, `-`, `#`, `[`, `]`, `<`, `>`.
pub fn validate_identifier_chars(id: &str) -> Result<(), Error> {
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || VALID_SPECIAL_CHARS.contains(c))
    {
        return Err(Error::InvalidCharacter(id.into()));
    }

    Ok(())
}

/// Checks that the identifier length is within `[min, max]`. Empty
/// identifiers are always rejected.
pub fn validate_identifier_length(id: &str, min: u64, max: u64) -> Result<(), Error> {
    let min = min.max(1);
    let length = id.len() as u64;
    if (min..=max).contains(&length) {
        Ok(())
    } else {
        Err(Error::InvalidLength {
            actual: id.into(),
            min,
            max,
        })
    }
}

/// Checks that the identifier has the `{name}-{u64}` form used for
/// connection and channel identifiers, e.g. `connection-0` or `channel-12`.
pub fn validate_named_u64_index(id: &str, name: &str) -> Result<u64, Error> {
    let number_s = id
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| Error::InvalidPrefix(id.into()))?;

    if number_s.starts_with('0') && number_s.len() > 1 {
        return Err(Error::InvalidPrefix(id.into()));
    }

    number_s
        .parse::<u64>()
        .map_err(|_| Error::InvalidPrefix(id.into()))
}

/// A valid client identifier must be between 9-64 characters.
pub fn validate_client_identifier(id: &str) -> Result<(), Error> {
    validate_identifier_chars(id)?;
    validate_identifier_length(id, 9, 64)
}

/// A valid connection identifier must be between 10-64 characters and carry
/// the `connection-{n}` form.
pub fn validate_connection_identifier(id: &str) -> Result<(), Error> {
    validate_identifier_chars(id)?;
    validate_identifier_length(id, 10, 64)?;
    validate_named_u64_index(id, "connection")?;
    Ok(())
}

/// A valid port identifier must be between 2-128 characters.
pub fn validate_port_identifier(id: &str) -> Result<(), Error> {
    validate_identifier_chars(id)?;
    validate_identifier_length(id, 2, 128)
}

/// A valid channel identifier must be between 8-64 characters and carry the
/// `channel-{n}` form.
pub fn validate_channel_identifier(id: &str) -> Result<(), Error> {
    validate_identifier_chars(id)?;
    validate_identifier_length(id, 8, 64)?;
    validate_named_u64_index(id, "channel")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("p")]
    #[case("port/transfer")]
    #[case("")]
    fn rejects_invalid_port_ids(#[case] id: &str) {
        assert!(validate_port_identifier(id).is_err())
    }

    #[test]
    fn rejects_overlong_port_id() {
        let id = "a".repeat(129);
        assert!(validate_port_identifier(&id).is_err())
    }

    #[rstest]
    #[case("connection-0", true)]
    #[case("connection-42", true)]
    #[case("connection-01", false)]
    #[case("connection", false)]
    #[case("connectionx-1", false)]
    #[case("conn-1", false)]
    fn connection_identifiers(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_connection_identifier(id).is_ok(), valid);
    }

    #[rstest]
    #[case("channel-0", true)]
    #[case("channel-18446744073709551615", true)]
    #[case("channel-18446744073709551616", false)]
    #[case("channel--1", false)]
    fn channel_identifiers(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_channel_identifier(id).is_ok(), valid);
    }

    #[rstest]
    #[case("07-tendermint-0", true)]
    #[case("9999-mock-0", true)]
    #[case("mock-0", false)]
    #[case("07-tendermint/0", false)]
    fn client_identifiers(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_client_identifier(id).is_ok(), valid);
    }
}
