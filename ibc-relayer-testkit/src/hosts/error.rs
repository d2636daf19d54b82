use displaydoc::Display;
use ibc_relayer_types::error::{DecodingError, IdentifierError};
use ibc_relayer_types::height::{Height, HeightError};
use ibc_relayer_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId, Sequence};

/// Why a mock chain rejected a message or failed a query.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum MockError {
    /// client `{client_id}` not found
    ClientNotFound { client_id: ClientId },
    /// no consensus state for client `{client_id}` at height `{height}`
    MissingConsensusState { client_id: ClientId, height: Height },
    /// header at `{height}` does not advance client `{client_id}` beyond `{latest}`
    StaleHeader {
        client_id: ClientId,
        height: Height,
        latest: Height,
    },
    /// connection `{connection_id}` not found
    ConnectionNotFound { connection_id: ConnectionId },
    /// channel `{port_id}/{channel_id}` not found
    ChannelNotFound {
        port_id: PortId,
        channel_id: ChannelId,
    },
    /// port `{port_id}` is not bound to any module
    PortNotBound { port_id: PortId },
    /// `{what}` is in state `{actual}`, expected `{expected}`
    InvalidState {
        what: String,
        expected: String,
        actual: String,
    },
    /// counterparty mismatch: `{description}`
    CounterpartyMismatch { description: String },
    /// invalid proof for `{path}`: `{description}`
    InvalidProof { path: String, description: String },
    /// invalid client state: `{description}`
    InvalidClientState { description: String },
    /// packet `{sequence}` has timed out
    PacketTimedOut { sequence: Sequence },
    /// packet `{sequence}` has not timed out yet
    PacketNotTimedOut { sequence: Sequence },
    /// packet `{sequence}` was already received
    PacketAlreadyReceived { sequence: Sequence },
    /// packet `{actual}` out of order, expected `{expected}`
    OutOfOrder { expected: Sequence, actual: Sequence },
    /// no commitment matching packet `{sequence}`
    MissingCommitment { sequence: Sequence },
    /// height `{requested}` is above the latest height `{latest}`
    HeightUnavailable { requested: Height, latest: Height },
    /// unsupported message type `{type_url}`
    UnknownMessage { type_url: String },
    /// transaction emitted no `{kind}` event
    MissingEvent { kind: String },
    /// injected failure of `{type_url}`
    InjectedFailure { type_url: String },
    /// injected query failure
    InjectedQueryFailure,
    /// decoding error: `{0}`
    Decoding(DecodingError),
    /// identifier error: `{0}`
    Identifier(IdentifierError),
    /// height error: `{0}`
    Height(HeightError),
}

impl MockError {
    pub(crate) fn invalid_state(what: impl ToString, expected: impl ToString, actual: impl ToString) -> Self {
        Self::InvalidState {
            what: what.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn mismatch(description: impl ToString) -> Self {
        Self::CounterpartyMismatch {
            description: description.to_string(),
        }
    }
}

impl From<DecodingError> for MockError {
    fn from(e: DecodingError) -> Self {
        Self::Decoding(e)
    }
}

impl From<IdentifierError> for MockError {
    fn from(e: IdentifierError) -> Self {
        Self::Identifier(e)
    }
}

impl From<HeightError> for MockError {
    fn from(e: HeightError) -> Self {
        Self::Height(e)
    }
}

impl From<prost::DecodeError> for MockError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Decoding(e.into())
    }
}

impl std::error::Error for MockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Decoding(e) => Some(e),
            Self::Identifier(e) => Some(e),
            Self::Height(e) => Some(e),
            _ => None,
        }
    }
}
