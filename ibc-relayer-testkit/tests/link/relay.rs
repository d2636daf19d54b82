use core::time::Duration;

use ibc_relayer::chain::ChainClient;
use ibc_relayer::error::RelayerError;
use ibc_relayer::link::Side;
use ibc_relayer::report::{RelayCheckpoint, RelayOpts};
use ibc_relayer_testkit::fixtures::{custom_port, link_config, LinkFixture};
use ibc_relayer_types::channel::Order;
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::PortId;
use ibc_relayer_types::msgs::RECV_PACKET_TYPE_URL;
use ibc_relayer_types::packet::{Packet, PacketKey};
use ibc_relayer_types::path::Path;
use tokio::time::Instant;

fn keys<'a>(packets: impl IntoIterator<Item = &'a Packet>) -> Vec<PacketKey> {
    let mut keys: Vec<PacketKey> = packets.into_iter().map(|p| p.key()).collect();
    keys.sort();
    keys
}

fn sorted(mut keys: Vec<PacketKey>) -> Vec<PacketKey> {
    keys.sort();
    keys
}

#[test_log::test(tokio::test)]
async fn packets_and_acks_are_relayed_in_both_directions() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    let sent_a = fixture.send_packets(Side::A, &pair, 3).expect("packets sent");
    let sent_b = fixture.send_packets(Side::B, &pair, 2).expect("packets sent");
    let all = keys(sent_a.iter().chain(&sent_b));

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.is_complete(), "{report}");
    assert_eq!(sorted(report.received), all);
    assert_eq!(sorted(report.acknowledged), all);

    for (chain, sent) in [(&fixture.chain_a, &sent_a), (&fixture.chain_b, &sent_b)] {
        assert!(sent
            .iter()
            .all(|p| !chain.has_commitment(&p.port_id_on_a, &p.chan_id_on_a, p.seq_on_a)));
    }
}

#[test_log::test(tokio::test)]
async fn relayed_packets_are_not_relayed_again() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    fixture.send_packets(Side::A, &pair, 2).expect("packets sent");

    let (first, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");
    assert_eq!(first.received.len(), 2);

    let txs = (fixture.chain_a.tx_count(), fixture.chain_b.tx_count());
    let (second, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(second.is_empty(), "{second}");
    assert_eq!((fixture.chain_a.tx_count(), fixture.chain_b.tx_count()), txs);
}

#[test_log::test(tokio::test)]
async fn packets_and_acks_can_be_relayed_separately() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 2).expect("packets sent");

    let packets = fixture
        .link
        .relay_packets(&RelayOpts::default())
        .await
        .expect("packets relayed");
    assert_eq!(sorted(packets.received), keys(&sent));
    assert!(packets.acknowledged.is_empty());
    assert!(sent
        .iter()
        .all(|p| fixture.chain_a.has_commitment(&p.port_id_on_a, &p.chan_id_on_a, p.seq_on_a)));

    let acks = fixture
        .link
        .relay_acks(&RelayOpts::default())
        .await
        .expect("acks relayed");
    assert_eq!(sorted(acks.acknowledged), keys(&sent));
    assert!(acks.received.is_empty());
}

#[test_log::test(tokio::test)]
async fn ordered_acks_between_different_ports_are_cleared() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture
        .link
        .create_channel(Side::A, PortId::transfer(), custom_port(), Order::Ordered, None)
        .await
        .expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

    let packets = fixture
        .link
        .relay_packets(&RelayOpts::default())
        .await
        .expect("packets relayed");
    assert_eq!(packets.received, keys(&sent));

    let pending = fixture
        .link
        .pending_relays(&RelayOpts::default())
        .await
        .expect("scan succeeds");
    assert_eq!(pending.acks_b_to_a.len(), 1);
    assert_eq!(pending.acks_b_to_a[0].key(), sent[0].key());
    assert_eq!(pending.acks_b_to_a[0].packet.port_id_on_b, custom_port());
    assert!(pending.packets_a_to_b.is_empty());
    assert!(pending.acks_a_to_b.is_empty());

    let acks = fixture
        .link
        .relay_acks(&RelayOpts::default())
        .await
        .expect("acks relayed");
    assert_eq!(acks.acknowledged, keys(&sent));

    let pending = fixture
        .link
        .pending_relays(&RelayOpts::default())
        .await
        .expect("scan succeeds");
    assert!(pending.is_empty(), "{pending:?}");
    assert!(!fixture
        .chain_a
        .has_commitment(&sent[0].port_id_on_a, &sent[0].chan_id_on_a, sent[0].seq_on_a));
}

#[test_log::test(tokio::test)]
async fn links_sharing_chains_never_broadcast_at_once() {
    let first = LinkFixture::new().await.expect("link opens");
    let second = LinkFixture::with_chains(first.chain_a.clone(), first.chain_b.clone(), link_config())
        .await
        .expect("second link opens");

    let (pair_first, pair_second) = tokio::try_join!(
        first.open_channel(Order::Unordered),
        second.open_channel(Order::Unordered),
    )
    .expect("channels open");

    let sent_first = first.send_packets(Side::A, &pair_first, 2).expect("packets sent");
    let sent_second = second.send_packets(Side::A, &pair_second, 2).expect("packets sent");

    let relay_opts = RelayOpts::default();
    let ((report_first, _), (report_second, _)) = tokio::try_join!(
        first.link.relay_all(&relay_opts),
        second.link.relay_all(&relay_opts),
    )
    .expect("rounds succeed");

    assert!(report_first.is_complete(), "{report_first}");
    assert!(report_second.is_complete(), "{report_second}");
    assert_eq!(sorted(report_first.received), keys(&sent_first));
    assert_eq!(sorted(report_second.received), keys(&sent_second));

    assert_eq!(first.chain_a.peak_concurrent_broadcasts(), 1);
    assert_eq!(first.chain_b.peak_concurrent_broadcasts(), 1);
}

#[test_log::test(tokio::test)]
async fn checkpoints_resume_where_the_round_stopped() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

    let (_, checkpoint) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    let later = fixture.send_packets(Side::A, &pair, 1).expect("packet sent");
    let (report, next) = fixture
        .link
        .relay_all(&RelayOpts::from(checkpoint))
        .await
        .expect("round succeeds");

    assert_eq!(sorted(report.received), keys(&later));
    assert!(next.height_a > checkpoint.height_a);
}

#[test_log::test(tokio::test)]
async fn failures_on_ordered_channels_block_later_packets() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Ordered).await.expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 3).expect("packets sent");

    fixture.chain_b.fail_next_msgs(RECV_PACKET_TYPE_URL, 1);

    let (report, checkpoint) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.received.is_empty());
    assert_eq!(report.failed.len(), 3);
    let causes: Vec<&RelayerError> = report
        .failed
        .iter()
        .map(|e| match e {
            RelayerError::RelayFailed { cause, .. } => cause.as_ref(),
            other => other,
        })
        .collect();
    assert!(matches!(causes[0], RelayerError::BroadcastRejected { .. }));
    assert!(causes[1..].iter().all(|cause| matches!(
        cause,
        RelayerError::OrderedPredecessorFailed { sequence } if *sequence == sent[0].seq_on_a
    )));

    // nothing settled, so the next round starts over
    let first_block = |height: Height| Height::new(height.revision_number(), 1).expect("non-zero height");
    assert_eq!(
        checkpoint,
        RelayCheckpoint {
            height_a: first_block(checkpoint.height_a),
            height_b: first_block(checkpoint.height_b),
        }
    );

    let (retried, _) = fixture
        .link
        .relay_all(&RelayOpts::from(checkpoint))
        .await
        .expect("round succeeds");
    assert!(retried.is_complete(), "{retried}");
    assert_eq!(sorted(retried.received), keys(&sent));
    assert_eq!(sorted(retried.acknowledged), keys(&sent));
}

#[test_log::test(tokio::test)]
async fn failures_on_unordered_channels_stay_isolated() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 3).expect("packets sent");

    fixture.chain_b.fail_next_msgs(RECV_PACKET_TYPE_URL, 1);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        &report.failed[0],
        RelayerError::RelayFailed { sequence, .. } if *sequence == sent[0].seq_on_a
    ));
    assert_eq!(sorted(report.received), keys(&sent[1..]));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn proofs_not_yet_available_are_awaited() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

    let queried = fixture.chain_a.proof_queries();
    fixture.chain_a.withhold_next_proofs(2);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.is_complete(), "{report}");
    assert_eq!(sorted(report.received), keys(&sent));
    assert_eq!(fixture.chain_a.proof_queries() - queried, 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn proofs_wait_for_the_chain_to_reach_the_requested_height() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let end_a = fixture.link.end_a();
    let path = Path::Connection(end_a.connection_id().clone());
    let target = fixture.chain_a.latest_height().increment();
    let queried = fixture.chain_a.proof_queries();

    let chain_a = fixture.chain_a.clone();
    let producer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        chain_a.advance_blocks(1);
    });

    let proven = end_a
        .query_proof(&path, target)
        .await
        .expect("proven once the block exists");
    producer.await.expect("block produced");

    assert_eq!(proven.height, target);
    assert!(fixture.chain_a.proof_queries() - queried >= 2);

    let at_target = fixture
        .chain_a
        .query_proof(&path, target)
        .await
        .expect("height reached");
    assert!(proven.value.is_some());
    assert_eq!(proven.value, at_target.value);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn proofs_that_never_come_fail_the_packet() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

    fixture.chain_a.withhold_next_proofs(100);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.received.is_empty());
    assert!(matches!(
        &report.failed[..],
        [RelayerError::RelayFailed { cause, .. }] if matches!(**cause, RelayerError::ProofNotYetAvailable { .. })
    ));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn packets_past_the_deadline_are_abandoned() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let sent = fixture.send_packets(Side::A, &pair, 2).expect("packets sent");

    let opts = RelayOpts::default().with_deadline(Instant::now());
    let (report, checkpoint) = fixture.link.relay_all(&opts).await.expect("round succeeds");

    assert!(report.received.is_empty());
    assert_eq!(sorted(report.abandoned), keys(&sent));
    assert_eq!(checkpoint.height_a.revision_height(), 1);
    assert!(sent
        .iter()
        .all(|p| fixture.chain_a.has_commitment(&p.port_id_on_a, &p.chan_id_on_a, p.seq_on_a)));
}
