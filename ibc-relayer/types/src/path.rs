//! ICS-24 paths of the provable IBC store.

use derive_more::Display;

use crate::height::Height;
use crate::identifiers::{ChannelId, ClientId, ConnectionId, PortId, Sequence};

pub const CLIENT_PREFIX: &str = "clients";
pub const CLIENT_STATE: &str = "clientState";
pub const CONSENSUS_STATE_PREFIX: &str = "consensusStates";
pub const CONNECTION_PREFIX: &str = "connections";
pub const CHANNEL_END_PREFIX: &str = "channelEnds";
pub const PORT_PREFIX: &str = "ports";
pub const CHANNEL_PREFIX: &str = "channels";
pub const SEQUENCE_PREFIX: &str = "sequences";
pub const PACKET_COMMITMENT_PREFIX: &str = "commitments";
pub const PACKET_ACK_PREFIX: &str = "acks";
pub const PACKET_RECEIPT_PREFIX: &str = "receipts";
pub const NEXT_SEQ_RECV_PREFIX: &str = "nextSequenceRecv";

/// The store paths the relayer proves. The text form is the key under the
/// commitment prefix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Path {
    #[display(fmt = "{CLIENT_PREFIX}/{_0}/{CLIENT_STATE}")]
    ClientState(ClientId),
    #[display(fmt = "{CLIENT_PREFIX}/{_0}/{CONSENSUS_STATE_PREFIX}/{_1}")]
    ClientConsensusState(ClientId, Height),
    #[display(fmt = "{CONNECTION_PREFIX}/{_0}")]
    Connection(ConnectionId),
    #[display(fmt = "{CHANNEL_END_PREFIX}/{PORT_PREFIX}/{_0}/{CHANNEL_PREFIX}/{_1}")]
    ChannelEnd(PortId, ChannelId),
    #[display(
        fmt = "{PACKET_COMMITMENT_PREFIX}/{PORT_PREFIX}/{_0}/{CHANNEL_PREFIX}/{_1}/{SEQUENCE_PREFIX}/{_2}"
    )]
    Commitment(PortId, ChannelId, Sequence),
    #[display(fmt = "{PACKET_ACK_PREFIX}/{PORT_PREFIX}/{_0}/{CHANNEL_PREFIX}/{_1}/{SEQUENCE_PREFIX}/{_2}")]
    Ack(PortId, ChannelId, Sequence),
    #[display(
        fmt = "{PACKET_RECEIPT_PREFIX}/{PORT_PREFIX}/{_0}/{CHANNEL_PREFIX}/{_1}/{SEQUENCE_PREFIX}/{_2}"
    )]
    Receipt(PortId, ChannelId, Sequence),
    #[display(fmt = "{NEXT_SEQ_RECV_PREFIX}/{PORT_PREFIX}/{_0}/{CHANNEL_PREFIX}/{_1}")]
    SeqRecv(PortId, ChannelId),
}

impl Path {
    pub fn into_bytes(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn seq(n: u64) -> Sequence {
        Sequence::from(n)
    }

    #[rstest]
    #[case(
        Path::ClientConsensusState("07-tendermint-0".parse().expect("valid client id"), Height::new(1, 15).expect("non-zero height")),
        "clients/07-tendermint-0/consensusStates/1-15"
    )]
    #[case(Path::Connection(ConnectionId::new(2)), "connections/connection-2")]
    #[case(
        Path::ChannelEnd(PortId::transfer(), ChannelId::new(0)),
        "channelEnds/ports/transfer/channels/channel-0"
    )]
    #[case(
        Path::Commitment(PortId::transfer(), ChannelId::new(0), seq(7)),
        "commitments/ports/transfer/channels/channel-0/sequences/7"
    )]
    #[case(
        Path::Receipt(PortId::transfer(), ChannelId::new(3), seq(1)),
        "receipts/ports/transfer/channels/channel-3/sequences/1"
    )]
    #[case(
        Path::SeqRecv(PortId::transfer(), ChannelId::new(3)),
        "nextSequenceRecv/ports/transfer/channels/channel-3"
    )]
    fn renders_ics24_keys(#[case] path: Path, #[case] expected: &str) {
        assert_eq!(path.to_string(), expected);
    }
}
