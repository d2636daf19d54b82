//! Delivery of packets, acknowledgements and timeouts in one direction.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::{join_all, try_join_all};
use ibc_relayer_types::channel::{Order, State as ChannelState};
use ibc_relayer_types::error::DecodingError;
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{ChannelId, PortId, Sequence};
use ibc_relayer_types::metadata::{AckWithMetadata, PacketWithMetadata};
use ibc_relayer_types::msgs::{IbcMsg, MsgAcknowledgement, MsgRecvPacket, MsgTimeout};
use ibc_relayer_types::packet::{Packet, PacketKey};
use ibc_relayer_types::path::Path;
use tracing::{debug, warn};

use super::client::update_client;
use crate::chain::{ChainClient, ProvenValue};
use crate::endpoint::Endpoint;
use crate::error::RelayerError;
use crate::report::{RelayOpts, RelayReport};

/// Packets flowing from `src`, the chain that sent them, to `dst`.
///
/// Receives are submitted to `dst`. Acknowledgements and timeouts are
/// submitted back to `src`.
pub(crate) struct Direction<'a, S, D> {
    pub src: &'a Endpoint<S>,
    pub dst: &'a Endpoint<D>,
    pub opts: &'a RelayOpts,
}

#[derive(Copy, Clone, Debug)]
enum Outcome {
    Received,
    Acknowledged,
    TimedOut,
}

/// A message ready for submission, or the reason it could not be built.
struct Delivery {
    key: PacketKey,
    ordered: bool,
    msg: Result<IbcMsg, RelayerError>,
}

/// Packets whose commitment still exists on the sending chain, and which of
/// their channels are ordered.
#[derive(Default)]
struct Unsettled {
    keys: BTreeSet<PacketKey>,
    ordered: BTreeSet<(PortId, ChannelId)>,
}

impl Unsettled {
    fn is_ordered(&self, packet: &Packet) -> bool {
        self.ordered
            .contains(&(packet.port_id_on_a.clone(), packet.chan_id_on_a.clone()))
    }
}

impl<S, D> Direction<'_, S, D>
where
    S: ChainClient,
    D: ChainClient,
{
    /// Submits one `MsgRecvPacket` per packet to `dst`, proving each packet
    /// commitment at the height `dst`'s client was just updated to.
    pub async fn receive_packets(
        &self,
        packets: Vec<PacketWithMetadata>,
    ) -> Result<RelayReport, RelayerError> {
        let keys: Vec<PacketKey> = packets.iter().map(PacketWithMetadata::key).collect();
        let unsettled = self.unsettled(keys, true).await?;

        let packets: Vec<Packet> = packets
            .into_iter()
            .map(|p| p.packet)
            .filter(|p| unsettled.keys.contains(&p.key()))
            .collect();

        if packets.is_empty() {
            return Ok(RelayReport::default());
        }

        let proof_height = self.update_client_on_dst().await?;

        let proofs = join_all(packets.iter().map(|packet| {
            let path = Path::Commitment(
                packet.port_id_on_a.clone(),
                packet.chan_id_on_a.clone(),
                packet.seq_on_a,
            );
            async move { self.src.query_proof(&path, proof_height).await }
        }))
        .await;

        let signer = self.dst.signer();
        let deliveries = packets
            .into_iter()
            .zip(proofs)
            .map(|(packet, proof)| {
                let key = packet.key();
                let ordered = unsettled.is_ordered(&packet);
                let msg = proof.map(|proven| {
                    IbcMsg::from(MsgRecvPacket {
                        packet,
                        proof_commitment_on_a: proven.proof,
                        proof_height_on_a: proof_height,
                        signer: signer.clone(),
                    })
                });

                Delivery { key, ordered, msg }
            })
            .collect();

        Ok(submit_each(self.dst, deliveries, Outcome::Received, self.opts).await)
    }

    /// Submits one `MsgTimeout` per packet to `src`, proving that `dst` never
    /// received it.
    pub async fn timeout_packets(
        &self,
        packets: Vec<PacketWithMetadata>,
    ) -> Result<RelayReport, RelayerError> {
        let keys: Vec<PacketKey> = packets.iter().map(PacketWithMetadata::key).collect();
        let unsettled = self.unsettled(keys, true).await?;

        let packets: Vec<(Packet, bool)> = packets
            .into_iter()
            .map(|p| p.packet)
            .filter(|p| unsettled.keys.contains(&p.key()))
            .map(|p| {
                let ordered = unsettled.is_ordered(&p);
                (p, ordered)
            })
            .collect();

        if packets.is_empty() {
            return Ok(RelayReport::default());
        }

        let proof_height = self.update_client_on_src().await?;

        let proofs = join_all(
            packets
                .iter()
                .map(|(packet, ordered)| self.prove_unreceived(packet, *ordered, proof_height)),
        )
        .await;

        let signer = self.src.signer();
        let deliveries = packets
            .into_iter()
            .zip(proofs)
            .map(|((packet, ordered), proof)| {
                let key = packet.key();
                let msg = proof.map(|(next_seq_recv_on_b, proven)| {
                    IbcMsg::from(MsgTimeout {
                        packet,
                        next_seq_recv_on_b,
                        proof_unreceived_on_b: proven.proof,
                        proof_height_on_b: proof_height,
                        signer: signer.clone(),
                    })
                });

                Delivery { key, ordered, msg }
            })
            .collect();

        Ok(submit_each(self.src, deliveries, Outcome::TimedOut, self.opts).await)
    }

    /// Submits one `MsgAcknowledgement` per ack written on `dst` to `src`,
    /// proving each ack commitment on `dst`.
    pub async fn acknowledge_packets(
        &self,
        acks: Vec<AckWithMetadata>,
    ) -> Result<RelayReport, RelayerError> {
        let keys: Vec<PacketKey> = acks.iter().map(AckWithMetadata::key).collect();
        let unsettled = self.unsettled(keys, false).await?;

        let acks: Vec<AckWithMetadata> = acks
            .into_iter()
            .filter(|ack| unsettled.keys.contains(&ack.key()))
            .collect();

        if acks.is_empty() {
            return Ok(RelayReport::default());
        }

        let proof_height = self.update_client_on_src().await?;

        let proofs = join_all(acks.iter().map(|ack| {
            let path = Path::Ack(
                ack.packet.port_id_on_b.clone(),
                ack.packet.chan_id_on_b.clone(),
                ack.packet.seq_on_a,
            );
            async move { self.dst.query_proof(&path, proof_height).await }
        }))
        .await;

        let signer = self.src.signer();
        let deliveries = acks
            .into_iter()
            .zip(proofs)
            .map(|(ack, proof)| {
                let key = ack.key();
                let ordered = unsettled.is_ordered(&ack.packet);
                let msg = proof.map(|proven| {
                    IbcMsg::from(MsgAcknowledgement {
                        packet: ack.packet,
                        acknowledgement: ack.acknowledgement,
                        proof_acked_on_b: proven.proof,
                        proof_height_on_b: proof_height,
                        signer: signer.clone(),
                    })
                });

                Delivery { key, ordered, msg }
            })
            .collect();

        Ok(submit_each(self.src, deliveries, Outcome::Acknowledged, self.opts).await)
    }

    async fn update_client_on_dst(&self) -> Result<Height, RelayerError> {
        update_client(
            self.src.chain(),
            self.dst.chain(),
            self.dst.client_id(),
            &self.dst.settings().retry,
        )
        .await
    }

    async fn update_client_on_src(&self) -> Result<Height, RelayerError> {
        update_client(
            self.dst.chain(),
            self.src.chain(),
            self.src.client_id(),
            &self.src.settings().retry,
        )
        .await
    }

    /// Proves on `dst` that `packet` was not received: the absence of its
    /// receipt on unordered channels, the next sequence to receive on
    /// ordered ones.
    async fn prove_unreceived(
        &self,
        packet: &Packet,
        ordered: bool,
        height: Height,
    ) -> Result<(Sequence, ProvenValue), RelayerError> {
        let port_id = packet.port_id_on_b.clone();
        let channel_id = packet.chan_id_on_b.clone();

        if !ordered {
            let path = Path::Receipt(port_id, channel_id, packet.seq_on_a);
            let proven = self.dst.query_proof(&path, height).await?;
            return Ok((packet.seq_on_a, proven));
        }

        let path = Path::SeqRecv(port_id, channel_id);
        let proven = self.dst.query_proof(&path, height).await?;

        let next_seq_recv = proven
            .value
            .as_deref()
            .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
            .map(|bytes| Sequence::from(u64::from_be_bytes(bytes)))
            .ok_or_else(|| RelayerError::ProofDecoding {
                chain_id: self.dst.chain_id(),
                path: path.to_string(),
                cause: DecodingError::invalid_raw_data(
                    "next sequence to receive must be a big-endian u64",
                ),
            })?;

        Ok((next_seq_recv, proven))
    }

    /// Keeps the packets whose commitment is still stored on `src` and, with
    /// `only_unreceived`, that `dst` has not received. Packets of channels
    /// closed on `src` are dropped. Chains are asked once per channel.
    async fn unsettled(
        &self,
        keys: Vec<PacketKey>,
        only_unreceived: bool,
    ) -> Result<Unsettled, RelayerError> {
        let mut channels: BTreeMap<(PortId, ChannelId, PortId, ChannelId), Vec<Sequence>> =
            BTreeMap::new();
        for key in keys {
            channels
                .entry((key.port_id_on_a, key.chan_id_on_a, key.port_id_on_b, key.chan_id_on_b))
                .or_default()
                .push(key.sequence);
        }

        let checks = channels.into_iter().map(|(channel, sequences)| async move {
            let (port_a, chan_a, port_b, chan_b) = &channel;

            let (committed, unreceived, chan_end) = tokio::try_join!(
                self.src.query_unreceived_acks(port_a, chan_a, &sequences),
                async {
                    if only_unreceived {
                        self.dst
                            .query_unreceived_packets(port_b, chan_b, &sequences)
                            .await
                            .map(Some)
                    } else {
                        Ok(None)
                    }
                },
                self.src.query_channel(port_a, chan_a),
            )?;

            let ordered = chan_end
                .as_ref()
                .map_or(false, |end| end.ordering == Order::Ordered);
            if chan_end.map_or(false, |end| end.state == ChannelState::Closed) {
                debug!(chain_id = %self.src.chain_id(), port_id = %port_a, channel_id = %chan_a, "channel closed, skipping its packets");
                return Ok::<_, RelayerError>((channel, ordered, Vec::new()));
            }

            let pending: Vec<Sequence> = sequences
                .into_iter()
                .filter(|seq| committed.contains(seq))
                .filter(|seq| unreceived.as_ref().map_or(true, |u| u.contains(seq)))
                .collect();

            Ok::<_, RelayerError>((channel, ordered, pending))
        });

        let mut unsettled = Unsettled::default();
        for ((port_a, chan_a, port_b, chan_b), ordered, pending) in try_join_all(checks).await? {
            unsettled.keys.extend(pending.into_iter().map(|sequence| PacketKey {
                port_id_on_a: port_a.clone(),
                chan_id_on_a: chan_a.clone(),
                port_id_on_b: port_b.clone(),
                chan_id_on_b: chan_b.clone(),
                sequence,
            }));

            if ordered {
                unsettled.ordered.insert((port_a, chan_a));
            }
        }

        Ok(unsettled)
    }
}

/// Submits each delivery in its own transaction, in key order.
///
/// A failure is recorded against its packet and the rest go on, except on
/// ordered channels where every later packet of the channel fails with it.
/// A timeout closes an ordered channel, so the channel's remaining packets
/// are abandoned. Once the deadline passes nothing more is submitted.
async fn submit_each<T: ChainClient>(
    target: &Endpoint<T>,
    deliveries: Vec<Delivery>,
    outcome: Outcome,
    opts: &RelayOpts,
) -> RelayReport {
    let chain_id = target.chain_id();
    let mut report = RelayReport::default();
    let mut blocked: BTreeMap<(PortId, ChannelId), Sequence> = BTreeMap::new();
    let mut closed: BTreeSet<(PortId, ChannelId)> = BTreeSet::new();

    for Delivery { key, ordered, msg } in deliveries {
        if opts.deadline_passed() {
            report.abandoned.push(key);
            continue;
        }

        let channel = (key.port_id_on_a.clone(), key.chan_id_on_a.clone());
        if closed.contains(&channel) {
            debug!(%chain_id, packet = %key, "channel closed by an earlier timeout");
            report.abandoned.push(key);
            continue;
        }

        let result = match (blocked.get(&channel), msg) {
            (Some(sequence), _) => Err(RelayerError::OrderedPredecessorFailed {
                sequence: *sequence,
            }),
            (None, Ok(msg)) => target.submit(vec![msg]).await.map(|_| ()),
            (None, Err(e)) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(%chain_id, packet = %key, ?outcome, "relayed");
                match outcome {
                    Outcome::Received => report.received.push(key),
                    Outcome::Acknowledged => report.acknowledged.push(key),
                    Outcome::TimedOut => {
                        if ordered {
                            closed.insert(channel);
                        }
                        report.timed_out.push(key);
                    }
                }
            }
            Err(e) => {
                warn!(%chain_id, packet = %key, ?outcome, error = %e, "relay failed");
                if ordered {
                    blocked.entry(channel).or_insert(key.sequence);
                }

                report.failed.push(RelayerError::RelayFailed {
                    chain_id: chain_id.clone(),
                    port_id: key.port_id_on_a,
                    channel_id: key.chan_id_on_a,
                    sequence: key.sequence,
                    cause: Box::new(e),
                });
            }
        }
    }

    if !report.abandoned.is_empty() {
        warn!(%chain_id, abandoned = report.abandoned.len(), "packets left unsubmitted");
    }

    report
}
