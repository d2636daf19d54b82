//! Defines the packet type, its correlation key and its ICS-04 commitment.

use core::fmt::{Debug, Display, Error as FmtError, Formatter};

use ibc_proto::ibc::core::channel::v1::Packet as RawPacket;
use sha2::{Digest, Sha256};

use crate::error::DecodingError;
use crate::height::Height;
use crate::identifiers::{ChannelId, PortId, Sequence};
use crate::timeout::TimeoutHeight;
use crate::timestamp::Timestamp;

/// The packet type; this is what applications send to one another.
///
/// Each application defines the structure of the `data` field.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct Packet {
    pub seq_on_a: Sequence,
    pub port_id_on_a: PortId,
    pub chan_id_on_a: ChannelId,
    pub port_id_on_b: PortId,
    pub chan_id_on_b: ChannelId,
    pub data: Vec<u8>,
    pub timeout_height_on_b: TimeoutHeight,
    pub timeout_timestamp_on_b: Timestamp,
}

impl Packet {
    /// Checks whether the packet is timed-out relative to the latest state of
    /// the destination chain. Only the bounds that are set are checked.
    pub fn timed_out(&self, dst_chain_ts: &Timestamp, dst_chain_height: Height) -> bool {
        self.timeout_height_on_b.has_expired(dst_chain_height)
            || self.timeout_timestamp_on_b.has_expired_at(*dst_chain_ts)
    }

    pub fn key(&self) -> PacketKey {
        PacketKey {
            port_id_on_a: self.port_id_on_a.clone(),
            chan_id_on_a: self.chan_id_on_a.clone(),
            port_id_on_b: self.port_id_on_b.clone(),
            chan_id_on_b: self.chan_id_on_b.clone(),
            sequence: self.seq_on_a,
        }
    }

    /// The ICS-04 packet commitment: `sha256(timeout_timestamp || timeout_revision_number
    /// || timeout_revision_height || sha256(data))`, integers big-endian.
    pub fn commitment(&self) -> PacketCommitment {
        let (revision_number, revision_height) = self.timeout_height_on_b.commitment_parts();

        let mut hash_input = self.timeout_timestamp_on_b.nanoseconds().to_be_bytes().to_vec();
        hash_input.extend_from_slice(&revision_number.to_be_bytes());
        hash_input.extend_from_slice(&revision_height.to_be_bytes());
        hash_input.extend_from_slice(&Sha256::digest(&self.data));

        PacketCommitment(Sha256::digest(hash_input).to_vec())
    }
}

struct PacketData<'a>(&'a [u8]);

impl Debug for PacketData<'_> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(formatter, "{}", hex::encode_upper(self.0))
    }
}

impl Debug for Packet {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> Result<(), FmtError> {
        formatter
            .debug_struct("Packet")
            .field("sequence", &self.seq_on_a)
            .field("source_port", &self.port_id_on_a)
            .field("source_channel", &self.chan_id_on_a)
            .field("destination_port", &self.port_id_on_b)
            .field("destination_channel", &self.chan_id_on_b)
            .field("data", &PacketData(&self.data))
            .field("timeout_height", &self.timeout_height_on_b)
            .field("timeout_timestamp", &self.timeout_timestamp_on_b)
            .finish()
    }
}

/// Custom display output to omit the packet data
impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "seq:{}, path:{}/{}->{}/{}, toh:{}, tos:{}",
            self.seq_on_a,
            self.port_id_on_a,
            self.chan_id_on_a,
            self.port_id_on_b,
            self.chan_id_on_b,
            self.timeout_height_on_b,
            self.timeout_timestamp_on_b
        )
    }
}

impl TryFrom<RawPacket> for Packet {
    type Error = DecodingError;

    fn try_from(raw_pkt: RawPacket) -> Result<Self, Self::Error> {
        if raw_pkt.sequence == 0 {
            return Err(DecodingError::invalid_raw_data("packet sequence cannot be zero"));
        }

        if raw_pkt.data.is_empty() {
            return Err(DecodingError::invalid_raw_data("packet data cannot be empty"));
        }

        let timeout_height_on_b = TimeoutHeight::from(raw_pkt.timeout_height);
        let timeout_timestamp_on_b = Timestamp::from_nanoseconds(raw_pkt.timeout_timestamp);

        if !timeout_height_on_b.is_set() && !timeout_timestamp_on_b.is_set() {
            return Err(DecodingError::missing_raw_data("packet timeout height and timestamp"));
        }

        Ok(Packet {
            seq_on_a: Sequence::from(raw_pkt.sequence),
            port_id_on_a: raw_pkt.source_port.parse()?,
            chan_id_on_a: raw_pkt.source_channel.parse()?,
            port_id_on_b: raw_pkt.destination_port.parse()?,
            chan_id_on_b: raw_pkt.destination_channel.parse()?,
            data: raw_pkt.data,
            timeout_height_on_b,
            timeout_timestamp_on_b,
        })
    }
}

impl From<Packet> for RawPacket {
    fn from(packet: Packet) -> Self {
        RawPacket {
            sequence: packet.seq_on_a.value(),
            source_port: packet.port_id_on_a.to_string(),
            source_channel: packet.chan_id_on_a.to_string(),
            destination_port: packet.port_id_on_b.to_string(),
            destination_channel: packet.chan_id_on_b.to_string(),
            data: packet.data,
            timeout_height: packet.timeout_height_on_b.into(),
            timeout_timestamp: packet.timeout_timestamp_on_b.nanoseconds(),
        }
    }
}

/// The 5-tuple that identifies a packet on both chains.
///
/// Ordering groups keys by source port and channel, then destination port and
/// channel, then ascending sequence.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketKey {
    pub port_id_on_a: PortId,
    pub chan_id_on_a: ChannelId,
    pub port_id_on_b: PortId,
    pub chan_id_on_b: ChannelId,
    pub sequence: Sequence,
}

impl PacketKey {
    /// The source end of the channel the packet travels on.
    pub fn source(&self) -> (&PortId, &ChannelId) {
        (&self.port_id_on_a, &self.chan_id_on_a)
    }

    /// The destination end of the channel the packet travels on.
    pub fn destination(&self) -> (&PortId, &ChannelId) {
        (&self.port_id_on_b, &self.chan_id_on_b)
    }
}

impl Display for PacketKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "{}/{}->{}/{}#{}",
            self.port_id_on_a, self.chan_id_on_a, self.port_id_on_b, self.chan_id_on_b, self.sequence
        )
    }
}

/// Packet commitment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketCommitment(Vec<u8>);

impl PacketCommitment {
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for PacketCommitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PacketCommitment {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sequence: u64, data: &[u8]) -> Packet {
        Packet {
            seq_on_a: sequence.into(),
            port_id_on_a: PortId::transfer(),
            chan_id_on_a: ChannelId::new(0),
            port_id_on_b: PortId::transfer(),
            chan_id_on_b: ChannelId::new(1),
            data: data.to_vec(),
            timeout_height_on_b: TimeoutHeight::At(Height::new(0, 100).expect("non-zero height")),
            timeout_timestamp_on_b: Timestamp::none(),
        }
    }

    #[test]
    fn commitment_matches_known_vector() {
        // sha256(0u64 || 0u64 || 100u64 || sha256("hello"))
        let mut preimage = vec![0u8; 8];
        preimage.extend_from_slice(&0u64.to_be_bytes());
        preimage.extend_from_slice(&100u64.to_be_bytes());
        preimage.extend_from_slice(&Sha256::digest(b"hello"));
        let expected = Sha256::digest(preimage).to_vec();

        assert_eq!(packet(1, b"hello").commitment().into_vec(), expected);
        assert_ne!(packet(1, b"hello").commitment(), packet(1, b"world").commitment());
    }

    #[test]
    fn raw_conversion_keeps_all_fields() {
        let original = packet(3, b"{}");
        let raw = RawPacket::from(original.clone());
        assert_eq!(raw.destination_channel, "channel-1");
        assert_eq!(Packet::try_from(raw), Ok(original));
    }

    #[test]
    fn raw_packet_without_timeout_is_rejected() {
        let mut raw = RawPacket::from(packet(3, b"{}"));
        raw.timeout_height = None;
        assert!(Packet::try_from(raw).is_err());
    }

    #[test]
    fn keys_order_by_channel_then_sequence() {
        let mut keys = vec![packet(2, b"a").key(), packet(10, b"a").key(), packet(1, b"a").key()];
        keys.sort();
        let sequences: Vec<u64> = keys.iter().map(|k| k.sequence.value()).collect();
        assert_eq!(sequences, vec![1, 2, 10]);
    }

    #[test]
    fn timed_out_checks_only_set_bounds() {
        let p = packet(1, b"a");
        let ts = Timestamp::from_nanoseconds(u64::MAX);
        assert!(!p.timed_out(&ts, Height::new(0, 99).expect("non-zero height")));
        assert!(p.timed_out(&Timestamp::none(), Height::new(0, 100).expect("non-zero height")));
    }
}
