//! Defines the relayer error type

use displaydoc::Display;
use ibc_relayer_types::error::{DecodingError, IdentifierError};
use ibc_relayer_types::height::{Height, HeightError};
use ibc_relayer_types::identifiers::{ChainId, ChannelId, ConnectionId, PortId, Sequence};

/// The steps of the connection and channel handshakes, including the light
/// client messages that precede them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum HandshakeStep {
    CreateClient,
    UpdateClient,
    ConnOpenInit,
    ConnOpenTry,
    ConnOpenAck,
    ConnOpenConfirm,
    ChanOpenInit,
    ChanOpenTry,
    ChanOpenAck,
    ChanOpenConfirm,
    Verify,
}

#[derive(Debug, Display)]
pub enum RelayerError {
    /// query on chain `{chain_id}` failed: `{description}`
    ChainQuery {
        chain_id: ChainId,
        description: String,
    },
    /// proof at height `{requested}` is not yet available on chain `{chain_id}` (latest height `{latest}`)
    ProofNotYetAvailable {
        chain_id: ChainId,
        requested: Height,
        latest: Height,
    },
    /// handshake step `{step}` failed: `{cause}`
    HandshakeFailed {
        step: HandshakeStep,
        cause: Box<RelayerError>,
    },
    /// connection `{connection_id}` on chain `{chain_id}` is in state `{state}`, expected OPEN
    ConnectionNotOpen {
        chain_id: ChainId,
        connection_id: ConnectionId,
        state: String,
    },
    /// channel `{port_id}/{channel_id}` on chain `{chain_id}` is in state `{state}`, expected OPEN
    ChannelNotOpen {
        chain_id: ChainId,
        port_id: PortId,
        channel_id: ChannelId,
        state: String,
    },
    /// connection `{connection_id}` on chain `{chain_id}` does not match its counterparty: `{description}`
    ConnectionMismatch {
        chain_id: ChainId,
        connection_id: ConnectionId,
        description: String,
    },
    /// relaying packet `{port_id}/{channel_id}#{sequence}` to chain `{chain_id}` failed: `{cause}`
    RelayFailed {
        chain_id: ChainId,
        port_id: PortId,
        channel_id: ChannelId,
        sequence: Sequence,
        cause: Box<RelayerError>,
    },
    /// an earlier packet `{sequence}` on the ordered channel was not delivered
    OrderedPredecessorFailed { sequence: Sequence },
    /// transaction rejected by chain `{chain_id}` with code `{code}`: `{log}`
    BroadcastRejected {
        chain_id: ChainId,
        code: u32,
        log: String,
    },
    /// no `{kind}` event in transaction `{tx_hash}` on chain `{chain_id}`
    MissingEvent {
        chain_id: ChainId,
        kind: String,
        tx_hash: String,
    },
    /// failed to decode chain data: `{0}`
    Decoding(DecodingError),
    /// invalid identifier: `{0}`
    Identifier(IdentifierError),
    /// invalid height: `{0}`
    Height(HeightError),
    /// invalid proof for `{path}` on chain `{chain_id}`: `{cause}`
    ProofDecoding {
        chain_id: ChainId,
        path: String,
        cause: DecodingError,
    },
}

impl RelayerError {
    /// Transient errors are worth retrying; every other error propagates.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChainQuery { .. } | Self::ProofNotYetAvailable { .. }
        )
    }

    pub fn query(chain_id: &ChainId, description: impl ToString) -> Self {
        Self::ChainQuery {
            chain_id: chain_id.clone(),
            description: description.to_string(),
        }
    }

    pub(crate) fn in_step(self, step: HandshakeStep) -> Self {
        match self {
            // keep the innermost step
            e @ Self::HandshakeFailed { .. } => e,
            e => Self::HandshakeFailed {
                step,
                cause: Box::new(e),
            },
        }
    }
}

impl From<DecodingError> for RelayerError {
    fn from(e: DecodingError) -> Self {
        Self::Decoding(e)
    }
}

impl From<IdentifierError> for RelayerError {
    fn from(e: IdentifierError) -> Self {
        Self::Identifier(e)
    }
}

impl From<HeightError> for RelayerError {
    fn from(e: HeightError) -> Self {
        Self::Height(e)
    }
}

impl std::error::Error for RelayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::HandshakeFailed { cause, .. } | Self::RelayFailed { cause, .. } => {
                Some(cause.as_ref())
            }
            Self::Decoding(e) | Self::ProofDecoding { cause: e, .. } => Some(e),
            Self::Identifier(e) => Some(e),
            Self::Height(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_id() -> ChainId {
        ChainId::new("ibc-0").expect("valid chain id")
    }

    #[test]
    fn only_query_and_stale_proof_errors_are_transient() {
        let height = Height::new(0, 3).expect("non-zero height");

        assert!(RelayerError::query(&chain_id(), "timeout").is_transient());
        assert!(RelayerError::ProofNotYetAvailable {
            chain_id: chain_id(),
            requested: height.increment(),
            latest: height,
        }
        .is_transient());
        assert!(!RelayerError::BroadcastRejected {
            chain_id: chain_id(),
            code: 5,
            log: "insufficient funds".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn nested_steps_keep_the_innermost() {
        let err = RelayerError::query(&chain_id(), "boom")
            .in_step(HandshakeStep::ConnOpenTry)
            .in_step(HandshakeStep::Verify);

        assert!(matches!(
            err,
            RelayerError::HandshakeFailed {
                step: HandshakeStep::ConnOpenTry,
                ..
            }
        ));
    }
}
