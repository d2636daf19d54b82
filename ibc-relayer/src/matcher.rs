//! Decides what is still owed to each side of a link.
//!
//! The matcher is pure: given what both chains report (packets sent, acks
//! written, packets settled, latest status) it returns the packets to
//! deliver, the acks to return and the packets to time out. Inputs may be
//! in any order and may repeat; outputs are deduplicated and sorted by
//! [`PacketKey`].

use std::collections::{BTreeMap, BTreeSet};

use ibc_relayer_types::height::Height;
use ibc_relayer_types::metadata::{AckWithMetadata, PacketWithMetadata};
use ibc_relayer_types::packet::PacketKey;
use ibc_relayer_types::timestamp::Timestamp;

/// Latest height and block time of a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChainStatus {
    pub height: Height,
    pub timestamp: Timestamp,
}

/// Everything one chain reports for a relay round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SideState {
    /// Packets sent from this chain.
    pub sent: Vec<PacketWithMetadata>,
    /// Acks this chain wrote for packets it received.
    pub written_acks: Vec<AckWithMetadata>,
    /// Packets sent from this chain whose commitment is already cleared.
    pub settled: Vec<PacketKey>,
    pub status: ChainStatus,
}

/// The work of one relay round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingRelays {
    /// Sent on A, to be received on B.
    pub packets_a_to_b: Vec<PacketWithMetadata>,
    /// Sent on B, to be received on A.
    pub packets_b_to_a: Vec<PacketWithMetadata>,
    /// Written on A for packets from B, to be returned to B.
    pub acks_a_to_b: Vec<AckWithMetadata>,
    /// Written on B for packets from A, to be returned to A.
    pub acks_b_to_a: Vec<AckWithMetadata>,
    /// Sent on A and expired on B, to be timed out on A.
    pub timed_out_on_a: Vec<PacketWithMetadata>,
    /// Sent on B and expired on A, to be timed out on B.
    pub timed_out_on_b: Vec<PacketWithMetadata>,
}

impl PendingRelays {
    pub fn is_empty(&self) -> bool {
        self.packets_a_to_b.is_empty()
            && self.packets_b_to_a.is_empty()
            && self.acks_a_to_b.is_empty()
            && self.acks_b_to_a.is_empty()
            && self.timed_out_on_a.is_empty()
            && self.timed_out_on_b.is_empty()
    }
}

/// Matches the reports of both sides.
pub fn match_pending(a: &SideState, b: &SideState) -> PendingRelays {
    let (packets_a_to_b, timed_out_on_a) = unrelayed_packets(a, b);
    let (packets_b_to_a, timed_out_on_b) = unrelayed_packets(b, a);

    PendingRelays {
        packets_a_to_b,
        packets_b_to_a,
        acks_a_to_b: unrelayed_acks(a, b),
        acks_b_to_a: unrelayed_acks(b, a),
        timed_out_on_a,
        timed_out_on_b,
    }
}

/// Packets sent on `src` that `dst` has not acknowledged and `src` has not
/// settled, split into deliverable and timed out against `dst`'s status.
fn unrelayed_packets(
    src: &SideState,
    dst: &SideState,
) -> (Vec<PacketWithMetadata>, Vec<PacketWithMetadata>) {
    let received: BTreeSet<PacketKey> = dst.written_acks.iter().map(AckWithMetadata::key).collect();
    let settled: BTreeSet<&PacketKey> = src.settled.iter().collect();

    dedup_packets(&src.sent)
        .into_iter()
        .filter(|(key, _)| !received.contains(key) && !settled.contains(key))
        .map(|(_, packet)| packet)
        .partition(|p| {
            !p.packet
                .timed_out(&dst.status.timestamp, dst.status.height)
        })
}

/// Acks written on `dst` whose packet `src` (the counterparty that sent it)
/// has not settled.
fn unrelayed_acks(dst: &SideState, src: &SideState) -> Vec<AckWithMetadata> {
    let settled: BTreeSet<&PacketKey> = src.settled.iter().collect();

    dedup_acks(&dst.written_acks)
        .into_iter()
        .filter(|(key, _)| !settled.contains(key))
        .map(|(_, ack)| ack)
        .collect()
}

/// One entry per key. On repeats the lowest commit height wins, so the
/// result does not depend on input order.
fn dedup_packets(packets: &[PacketWithMetadata]) -> BTreeMap<PacketKey, PacketWithMetadata> {
    let mut unique: BTreeMap<PacketKey, PacketWithMetadata> = BTreeMap::new();

    for packet in packets {
        let replace = unique
            .get(&packet.key())
            .map_or(true, |kept| (packet.height, &packet.sender) < (kept.height, &kept.sender));

        if replace {
            unique.insert(packet.key(), packet.clone());
        }
    }

    unique
}

fn dedup_acks(acks: &[AckWithMetadata]) -> BTreeMap<PacketKey, AckWithMetadata> {
    let mut unique: BTreeMap<PacketKey, AckWithMetadata> = BTreeMap::new();

    for ack in acks {
        let replace = unique.get(&ack.key()).map_or(true, |kept| ack.height < kept.height);

        if replace {
            unique.insert(ack.key(), ack.clone());
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use ibc_relayer_types::acknowledgement::Acknowledgement;
    use ibc_relayer_types::identifiers::{ChannelId, PortId};
    use ibc_relayer_types::packet::Packet;
    use ibc_relayer_types::timeout::TimeoutHeight;
    use rstest::*;

    use super::*;

    fn height(h: u64) -> Height {
        Height::new(0, h).expect("non-zero height")
    }

    fn status(h: u64, ts: u64) -> ChainStatus {
        ChainStatus {
            height: height(h),
            timestamp: Timestamp::from_nanoseconds(ts),
        }
    }

    /// A packet from `channel-{src}` to `channel-{dst}` on the transfer port.
    fn sent(src: u64, dst: u64, sequence: u64, timeout_height: Option<u64>) -> PacketWithMetadata {
        PacketWithMetadata {
            packet: Packet {
                seq_on_a: sequence.into(),
                port_id_on_a: PortId::transfer(),
                chan_id_on_a: ChannelId::new(src),
                port_id_on_b: PortId::transfer(),
                chan_id_on_b: ChannelId::new(dst),
                data: format!("packet-{sequence}").into_bytes(),
                timeout_height_on_b: timeout_height.map_or(TimeoutHeight::Never, |h| height(h).into()),
                timeout_timestamp_on_b: Timestamp::none(),
            },
            height: height(sequence + 1),
            sender: "cosmos1sender".to_string(),
        }
    }

    fn ack_for(packet: &PacketWithMetadata) -> AckWithMetadata {
        AckWithMetadata {
            packet: packet.packet.clone(),
            acknowledgement: Acknowledgement::try_from(b"{\"result\":\"AQ==\"}".to_vec())
                .expect("non-empty ack"),
            height: packet.height.add(3),
        }
    }

    fn side(
        sent: Vec<PacketWithMetadata>,
        written_acks: Vec<AckWithMetadata>,
        settled: Vec<PacketKey>,
    ) -> SideState {
        SideState {
            sent,
            written_acks,
            settled,
            status: status(50, 1_000),
        }
    }

    fn sequences(packets: &[PacketWithMetadata]) -> Vec<u64> {
        packets.iter().map(|p| p.packet.seq_on_a.value()).collect()
    }

    #[fixture]
    fn busy_link() -> (SideState, SideState) {
        let a_sent: Vec<_> = (1..=6).map(|s| sent(0, 1, s, None)).collect();
        let b_sent: Vec<_> = (1..=3).map(|s| sent(1, 0, s, Some(40))).collect();

        // B received A#1..=3 and A settled A#1; A received nothing
        let b_acks: Vec<_> = a_sent[..3].iter().map(ack_for).collect();
        let a_settled = vec![a_sent[0].key()];

        (
            side(a_sent, vec![], a_settled),
            side(b_sent, b_acks, vec![]),
        )
    }

    #[rstest]
    fn splits_packets_acks_and_timeouts(busy_link: (SideState, SideState)) {
        let (a, b) = busy_link;
        let pending = match_pending(&a, &b);

        assert_eq!(sequences(&pending.packets_a_to_b), vec![4, 5, 6]);
        assert!(pending.packets_b_to_a.is_empty());
        assert_eq!(sequences(&pending.timed_out_on_b), vec![1, 2, 3]);
        assert!(pending.timed_out_on_a.is_empty());

        let acked: Vec<u64> = pending
            .acks_b_to_a
            .iter()
            .map(|a| a.packet.seq_on_a.value())
            .collect();
        assert_eq!(acked, vec![2, 3]);
        assert!(pending.acks_a_to_b.is_empty());
    }

    #[rstest]
    fn result_is_independent_of_input_order(busy_link: (SideState, SideState)) {
        let (a, b) = busy_link;
        let expected = match_pending(&a, &b);

        let mut shuffled_a = a.clone();
        shuffled_a.sent.reverse();
        shuffled_a.sent.rotate_left(2);
        let mut shuffled_b = b.clone();
        shuffled_b.written_acks.reverse();
        shuffled_b.sent.swap(0, 2);

        assert_eq!(match_pending(&shuffled_a, &shuffled_b), expected);
    }

    #[rstest]
    fn repeated_inputs_collapse(busy_link: (SideState, SideState)) {
        let (mut a, b) = busy_link;
        let expected = match_pending(&a, &b);

        let mut late_duplicate = a.sent[4].clone();
        late_duplicate.height = late_duplicate.height.add(10);
        a.sent.push(late_duplicate);
        a.sent.extend(a.sent.clone());

        assert_eq!(match_pending(&a, &b), expected);
    }

    #[rstest]
    #[case(None, 1_000, false)]
    #[case(Some(51), 1_000, false)]
    #[case(Some(50), 1_000, true)]
    fn timeout_uses_counterparty_status(
        #[case] timeout_height: Option<u64>,
        #[case] timeout_timestamp: u64,
        #[case] expired: bool,
    ) {
        let mut packet = sent(0, 1, 1, timeout_height);
        packet.packet.timeout_timestamp_on_b = Timestamp::from_nanoseconds(timeout_timestamp + 1);

        let pending = match_pending(&side(vec![packet], vec![], vec![]), &side(vec![], vec![], vec![]));

        assert_eq!(pending.timed_out_on_a.len(), usize::from(expired));
        assert_eq!(pending.packets_a_to_b.len(), usize::from(!expired));
    }

    #[test]
    fn expired_timestamp_times_out() {
        let mut packet = sent(0, 1, 1, None);
        packet.packet.timeout_timestamp_on_b = Timestamp::from_nanoseconds(1_000);

        let pending = match_pending(&side(vec![packet], vec![], vec![]), &side(vec![], vec![], vec![]));
        assert_eq!(sequences(&pending.timed_out_on_a), vec![1]);
    }

    #[test]
    fn received_packets_are_never_timed_out() {
        let packet = sent(0, 1, 1, Some(10));
        let ack = ack_for(&packet);

        let pending = match_pending(&side(vec![packet], vec![], vec![]), &side(vec![], vec![ack], vec![]));
        assert!(pending.timed_out_on_a.is_empty());
        assert_eq!(pending.acks_b_to_a.len(), 1);
    }

    #[test]
    fn empty_sides_match_nothing() {
        let empty = side(vec![], vec![], vec![]);
        assert!(match_pending(&empty, &empty).is_empty());
    }
}
