//! A light client that trusts any header it is given.
//!
//! Its states travel as protobuf `Any`s like those of real clients, so the
//! relayer handles them without knowing the client type.

use ibc_relayer_types::error::DecodingError;
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::ChainId;
use ibc_relayer_types::msgs::decode_any;
use ibc_relayer_types::proto::client::Height as RawHeight;
use ibc_relayer_types::proto::Any;
use ibc_relayer_types::timestamp::Timestamp;
use prost::Message;

pub const MOCK_CLIENT_TYPE: &str = "9999-mock";
pub const MOCK_CLIENT_STATE_TYPE_URL: &str = "/ibc.mock.ClientState";
pub const MOCK_CONSENSUS_STATE_TYPE_URL: &str = "/ibc.mock.ConsensusState";
pub const MOCK_HEADER_TYPE_URL: &str = "/ibc.mock.Header";

#[derive(Clone, PartialEq, Message)]
pub struct RawMockHeader {
    #[prost(message, optional, tag = "1")]
    pub height: Option<RawHeight>,
    #[prost(uint64, tag = "2")]
    pub timestamp: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RawMockClientState {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(message, optional, tag = "2")]
    pub latest_height: Option<RawHeight>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RawMockConsensusState {
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub root: Vec<u8>,
}

fn height_from(raw: Option<RawHeight>, field: &str) -> Result<Height, DecodingError> {
    raw.ok_or_else(|| DecodingError::missing_raw_data(format!("mock {field}")))?
        .try_into()
        .map_err(DecodingError::invalid_raw_data)
}

/// A header of the tracked chain at `height`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockHeader {
    pub height: Height,
    pub timestamp: Timestamp,
}

impl TryFrom<Any> for MockHeader {
    type Error = DecodingError;

    fn try_from(any: Any) -> Result<Self, Self::Error> {
        let raw: RawMockHeader = decode_any(&any, MOCK_HEADER_TYPE_URL)?;

        Ok(Self {
            height: height_from(raw.height, "header height")?,
            timestamp: Timestamp::from_nanoseconds(raw.timestamp),
        })
    }
}

impl From<MockHeader> for Any {
    fn from(header: MockHeader) -> Self {
        Self {
            type_url: MOCK_HEADER_TYPE_URL.to_string(),
            value: RawMockHeader {
                height: Some(header.height.into()),
                timestamp: header.timestamp.nanoseconds(),
            }
            .encode_to_vec(),
        }
    }
}

/// The tracked chain and the latest height the client trusts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockClientState {
    pub chain_id: ChainId,
    pub latest_height: Height,
}

impl MockClientState {
    pub fn with_latest_height(self, latest_height: Height) -> Self {
        Self {
            latest_height,
            ..self
        }
    }
}

impl TryFrom<Any> for MockClientState {
    type Error = DecodingError;

    fn try_from(any: Any) -> Result<Self, Self::Error> {
        let raw: RawMockClientState = decode_any(&any, MOCK_CLIENT_STATE_TYPE_URL)?;

        Ok(Self {
            chain_id: raw.chain_id.parse()?,
            latest_height: height_from(raw.latest_height, "client latest height")?,
        })
    }
}

impl From<MockClientState> for Any {
    fn from(client_state: MockClientState) -> Self {
        Self {
            type_url: MOCK_CLIENT_STATE_TYPE_URL.to_string(),
            value: RawMockClientState {
                chain_id: client_state.chain_id.to_string(),
                latest_height: Some(client_state.latest_height.into()),
            }
            .encode_to_vec(),
        }
    }
}

/// What the client remembers of one trusted header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockConsensusState {
    pub timestamp: Timestamp,
    pub root: Vec<u8>,
}

impl From<MockHeader> for MockConsensusState {
    fn from(header: MockHeader) -> Self {
        Self {
            timestamp: header.timestamp,
            root: header.height.to_string().into_bytes(),
        }
    }
}

impl TryFrom<Any> for MockConsensusState {
    type Error = DecodingError;

    fn try_from(any: Any) -> Result<Self, Self::Error> {
        let raw: RawMockConsensusState = decode_any(&any, MOCK_CONSENSUS_STATE_TYPE_URL)?;

        Ok(Self {
            timestamp: Timestamp::from_nanoseconds(raw.timestamp),
            root: raw.root,
        })
    }
}

impl From<MockConsensusState> for Any {
    fn from(consensus_state: MockConsensusState) -> Self {
        Self {
            type_url: MOCK_CONSENSUS_STATE_TYPE_URL.to_string(),
            value: RawMockConsensusState {
                timestamp: consensus_state.timestamp.nanoseconds(),
                root: consensus_state.root,
            }
            .encode_to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_state_any_keeps_chain_and_height() {
        let client_state = MockClientState {
            chain_id: ChainId::new("mock-1").expect("valid chain id"),
            latest_height: Height::new(1, 42).expect("non-zero height"),
        };

        let any = Any::from(client_state.clone());
        assert_eq!(any.type_url, MOCK_CLIENT_STATE_TYPE_URL);
        assert_eq!(MockClientState::try_from(any), Ok(client_state));
    }

    #[test]
    fn header_rejects_foreign_type_url() {
        let any = Any {
            type_url: MOCK_CLIENT_STATE_TYPE_URL.to_string(),
            value: Vec::new(),
        };

        assert!(matches!(
            MockHeader::try_from(any),
            Err(DecodingError::MismatchedTypeUrls { .. })
        ));
    }
}
