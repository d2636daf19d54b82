//! Channel ends as reported by chain state, and the pair of ids a completed
//! channel handshake yields.

use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use ibc_proto::ibc::core::channel::v1::{
    Channel as RawChannel, Counterparty as RawCounterparty,
};

use crate::error::DecodingError;
use crate::identifiers::{ChannelId, ConnectionId, PortId};

/// The ordering guarantee of a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    Unordered = 1isize,
    Ordered = 2isize,
}

impl Order {
    /// The form used in event attributes and connection version features.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unordered => "ORDER_UNORDERED",
            Self::Ordered => "ORDER_ORDERED",
        }
    }

    pub fn from_i32(nr: i32) -> Result<Self, DecodingError> {
        match nr {
            1 => Ok(Self::Unordered),
            2 => Ok(Self::Ordered),
            _ => Err(DecodingError::invalid_raw_data(format!(
                "channel order must be one of 1, 2; got {nr}"
            ))),
        }
    }
}

impl FromStr for Order {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim_start_matches("order_") {
            "unordered" => Ok(Self::Unordered),
            "ordered" => Ok(Self::Ordered),
            _ => Err(DecodingError::invalid_raw_data(format!(
                "unknown channel order `{s}`"
            ))),
        }
    }
}

impl Display for Order {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.as_str())
    }
}

/// Handshake state of one channel end.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Uninitialized = 0isize,
    Init = 1isize,
    TryOpen = 2isize,
    Open = 3isize,
    Closed = 4isize,
}

impl State {
    pub fn as_string(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Init => "INIT",
            Self::TryOpen => "TRYOPEN",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    pub fn from_i32(s: i32) -> Result<Self, DecodingError> {
        match s {
            0 => Ok(Self::Uninitialized),
            1 => Ok(Self::Init),
            2 => Ok(Self::TryOpen),
            3 => Ok(Self::Open),
            4 => Ok(Self::Closed),
            _ => Err(DecodingError::invalid_raw_data(format!(
                "channel state must be one of 0, 1, 2, 3, 4; got {s}"
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

/// The counterparty end as seen from a channel end. The channel id is unset
/// until the counterparty has executed its `OpenTry`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterparty {
    pub port_id: PortId,
    pub channel_id: Option<ChannelId>,
}

impl Counterparty {
    pub fn new(port_id: PortId, channel_id: Option<ChannelId>) -> Self {
        Self {
            port_id,
            channel_id,
        }
    }
}

/// One end of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEnd {
    pub state: State,
    pub ordering: Order,
    pub remote: Counterparty,
    pub connection_hops: Vec<ConnectionId>,
    pub version: String,
}

impl ChannelEnd {
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl TryFrom<RawChannel> for ChannelEnd {
    type Error = DecodingError;

    fn try_from(value: RawChannel) -> Result<Self, Self::Error> {
        let remote = value
            .counterparty
            .ok_or_else(|| DecodingError::missing_raw_data("channel counterparty"))?;

        let channel_id = if remote.channel_id.is_empty() {
            None
        } else {
            Some(remote.channel_id.parse()?)
        };

        let connection_hops = value
            .connection_hops
            .iter()
            .map(|hop| hop.parse())
            .collect::<Result<Vec<ConnectionId>, _>>()?;

        Ok(Self {
            state: State::from_i32(value.state)?,
            ordering: Order::from_i32(value.ordering)?,
            remote: Counterparty::new(remote.port_id.parse()?, channel_id),
            connection_hops,
            version: value.version,
        })
    }
}

impl From<ChannelEnd> for RawChannel {
    fn from(value: ChannelEnd) -> Self {
        RawChannel {
            state: value.state as i32,
            ordering: value.ordering as i32,
            counterparty: Some(RawCounterparty {
                port_id: value.remote.port_id.to_string(),
                channel_id: value
                    .remote
                    .channel_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            }),
            connection_hops: value
                .connection_hops
                .iter()
                .map(|hop| hop.to_string())
                .collect(),
            version: value.version,
            ..Default::default()
        }
    }
}

/// The port and channel ids of both ends of an open channel, oriented from
/// side `a` of a link to side `b`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelPair {
    pub port_id_a: PortId,
    pub chan_id_a: ChannelId,
    pub port_id_b: PortId,
    pub chan_id_b: ChannelId,
}

impl ChannelPair {
    /// The same channel seen from side `b`.
    pub fn flipped(&self) -> Self {
        Self {
            port_id_a: self.port_id_b.clone(),
            chan_id_a: self.chan_id_b.clone(),
            port_id_b: self.port_id_a.clone(),
            chan_id_b: self.chan_id_a.clone(),
        }
    }
}

impl Display for ChannelPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "{}/{} <-> {}/{}",
            self.port_id_a, self.chan_id_a, self.port_id_b, self.chan_id_b
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ORDER_UNORDERED", Order::Unordered)]
    #[case("ORDER_ORDERED", Order::Ordered)]
    #[case("ordered", Order::Ordered)]
    fn parses_order_attribute(#[case] input: &str, #[case] expected: Order) {
        assert_eq!(input.parse::<Order>(), Ok(expected));
    }

    #[test]
    fn init_channel_has_no_counterparty_channel_id() {
        let raw = RawChannel {
            state: 1,
            ordering: 1,
            counterparty: Some(RawCounterparty {
                port_id: "transfer".to_string(),
                channel_id: String::new(),
            }),
            connection_hops: vec!["connection-0".to_string()],
            version: "ics20-1".to_string(),
            ..Default::default()
        };

        let end = ChannelEnd::try_from(raw).expect("valid channel end");
        assert_eq!(end.state, State::Init);
        assert_eq!(end.remote.channel_id, None);
        assert!(!end.is_open());
    }

    #[test]
    fn uninitialized_order_is_rejected() {
        assert!(Order::from_i32(0).is_err());
    }
}
