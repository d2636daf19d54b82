//! Errors raised while parsing identifiers or converting raw chain data into
//! domain types.

use displaydoc::Display;

/// Errors that arise when parsing identifiers.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum IdentifierError {
    /// id `{actual}` has invalid length; must be between [`{min}`,`{max}`]
    InvalidLength { actual: String, min: u64, max: u64 },
    /// id `{0}` can only contain alphanumeric characters or `.`, `_`, `+`, `-`, `#`, - `[`, `]`, `<`, `>`
    InvalidCharacter(String),
    /// invalid prefix: `{0}`
    InvalidPrefix(String),
    /// failed to parse `{value}`: `{description}`
    FailedToParse { value: String, description: String },
    /// overflowed revision number
    OverflowedRevisionNumber,
}

/// Errors that occur while decoding transaction logs, protobuf payloads or
/// any other raw data into domain types.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum DecodingError {
    /// identifier error: `{0}`
    Identifier(IdentifierError),
    /// missing attribute `{key}` in `{kind}` event
    MissingAttribute { kind: String, key: String },
    /// invalid attribute `{key}` in `{kind}` event: `{description}`
    InvalidAttribute {
        kind: String,
        key: String,
        description: String,
    },
    /// malformed transaction log: `{description}`
    MalformedLog { description: String },
    /// prost decoding error: `{description}`
    Prost { description: String },
    /// invalid raw data: `{description}`
    InvalidRawData { description: String },
    /// missing raw data: `{description}`
    MissingRawData { description: String },
    /// mismatched type URLs: expected `{expected}`, actual `{actual}`
    MismatchedTypeUrls { expected: String, actual: String },
}

impl DecodingError {
    pub fn invalid_raw_data(description: impl ToString) -> Self {
        Self::InvalidRawData {
            description: description.to_string(),
        }
    }

    pub fn missing_raw_data(description: impl ToString) -> Self {
        Self::MissingRawData {
            description: description.to_string(),
        }
    }
}

impl From<IdentifierError> for DecodingError {
    fn from(e: IdentifierError) -> Self {
        Self::Identifier(e)
    }
}

impl From<prost::DecodeError> for DecodingError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Prost {
            description: e.to_string(),
        }
    }
}

impl std::error::Error for IdentifierError {}

impl std::error::Error for DecodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Identifier(e) => Some(e),
            _ => None,
        }
    }
}
