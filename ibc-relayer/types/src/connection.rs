//! Connection ends as reported by chain state.

use core::fmt::{Display, Error as FmtError, Formatter};
use core::time::Duration;

use ibc_proto::ibc::core::commitment::v1::MerklePrefix;
use ibc_proto::ibc::core::connection::v1::{
    ConnectionEnd as RawConnectionEnd, Counterparty as RawCounterparty, Version as RawVersion,
};

use crate::channel::Order;
use crate::error::DecodingError;
use crate::identifiers::{ClientId, ConnectionId};

/// The commitment prefix of the IBC store on Cosmos SDK chains.
pub const DEFAULT_COMMITMENT_PREFIX: &[u8] = b"ibc";

/// Handshake state of one connection end.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Uninitialized = 0isize,
    Init = 1isize,
    TryOpen = 2isize,
    Open = 3isize,
}

impl State {
    pub fn as_string(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Init => "INIT",
            Self::TryOpen => "TRYOPEN",
            Self::Open => "OPEN",
        }
    }

    pub fn from_i32(s: i32) -> Result<Self, DecodingError> {
        match s {
            0 => Ok(Self::Uninitialized),
            1 => Ok(Self::Init),
            2 => Ok(Self::TryOpen),
            3 => Ok(Self::Open),
            _ => Err(DecodingError::invalid_raw_data(format!(
                "connection state must be one of 0, 1, 2, 3; got {s}"
            ))),
        }
    }

    pub fn is_open(self) -> bool {
        self == State::Open
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.as_string())
    }
}

/// A connection version: an identifier plus the channel orderings it allows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub identifier: String,
    pub features: Vec<String>,
}

impl Version {
    pub fn supports(&self, order: Order) -> bool {
        self.features.iter().any(|f| f == order.as_str())
    }
}

/// Version `1`, allowing both channel orderings.
impl Default for Version {
    fn default() -> Self {
        Self {
            identifier: "1".to_string(),
            features: vec![
                Order::Ordered.as_str().to_string(),
                Order::Unordered.as_str().to_string(),
            ],
        }
    }
}

impl From<RawVersion> for Version {
    fn from(value: RawVersion) -> Self {
        Self {
            identifier: value.identifier,
            features: value.features,
        }
    }
}

impl From<Version> for RawVersion {
    fn from(value: Version) -> Self {
        Self {
            identifier: value.identifier,
            features: value.features,
        }
    }
}

/// The counterparty end as seen from a connection end. The connection id is
/// unset until the counterparty has executed its `OpenTry`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterparty {
    pub client_id: ClientId,
    pub connection_id: Option<ConnectionId>,
    pub prefix: Vec<u8>,
}

impl Counterparty {
    pub fn new(client_id: ClientId, connection_id: Option<ConnectionId>) -> Self {
        Self {
            client_id,
            connection_id,
            prefix: DEFAULT_COMMITMENT_PREFIX.to_vec(),
        }
    }
}

impl TryFrom<RawCounterparty> for Counterparty {
    type Error = DecodingError;

    fn try_from(raw: RawCounterparty) -> Result<Self, Self::Error> {
        let connection_id = if raw.connection_id.is_empty() {
            None
        } else {
            Some(raw.connection_id.parse()?)
        };

        Ok(Self {
            client_id: raw.client_id.parse()?,
            connection_id,
            prefix: raw.prefix.map(|p| p.key_prefix).unwrap_or_default(),
        })
    }
}

impl From<Counterparty> for RawCounterparty {
    fn from(value: Counterparty) -> Self {
        RawCounterparty {
            client_id: value.client_id.to_string(),
            connection_id: value
                .connection_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            prefix: Some(MerklePrefix {
                key_prefix: value.prefix,
            }),
        }
    }
}

/// One end of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEnd {
    pub state: State,
    pub client_id: ClientId,
    pub counterparty: Counterparty,
    pub versions: Vec<Version>,
    pub delay_period: Duration,
}

impl ConnectionEnd {
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl TryFrom<RawConnectionEnd> for ConnectionEnd {
    type Error = DecodingError;

    fn try_from(value: RawConnectionEnd) -> Result<Self, Self::Error> {
        let counterparty = value
            .counterparty
            .ok_or_else(|| DecodingError::missing_raw_data("connection counterparty"))?
            .try_into()?;

        Ok(Self {
            state: State::from_i32(value.state)?,
            client_id: value.client_id.parse()?,
            counterparty,
            versions: value.versions.into_iter().map(Version::from).collect(),
            delay_period: Duration::from_nanos(value.delay_period),
        })
    }
}

impl From<ConnectionEnd> for RawConnectionEnd {
    fn from(value: ConnectionEnd) -> Self {
        RawConnectionEnd {
            client_id: value.client_id.to_string(),
            versions: value.versions.into_iter().map(RawVersion::from).collect(),
            state: value.state as i32,
            counterparty: Some(value.counterparty.into()),
            delay_period: u64::try_from(value.delay_period.as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_version_supports_both_orderings() {
        let version = Version::default();
        assert!(version.supports(Order::Ordered));
        assert!(version.supports(Order::Unordered));
    }

    #[test]
    fn raw_connection_end_converts() {
        let end = ConnectionEnd {
            state: State::TryOpen,
            client_id: "07-tendermint-0".parse().expect("valid client id"),
            counterparty: Counterparty::new(
                "07-tendermint-3".parse().expect("valid client id"),
                Some(ConnectionId::new(4)),
            ),
            versions: vec![Version::default()],
            delay_period: Duration::from_secs(2),
        };

        let raw = RawConnectionEnd::from(end.clone());
        assert_eq!(raw.state, 2);
        assert_eq!(ConnectionEnd::try_from(raw), Ok(end));
    }
}
