use ibc_relayer::chain::ChainClient;
use ibc_relayer::error::RelayerError;
use ibc_relayer::link::Side;
use ibc_relayer::report::RelayOpts;
use ibc_relayer_testkit::fixtures::LinkFixture;
use ibc_relayer_testkit::hosts::DEFAULT_BLOCK_TIME;
use ibc_relayer_types::channel::{ChannelPair, Order, State as ChannelState};
use ibc_relayer_types::packet::Packet;
use ibc_relayer_types::timeout::TimeoutHeight;
use ibc_relayer_types::timestamp::Timestamp;

/// Sends a packet from `A` that expires at the next height of `B`, then lets
/// `B` move past it.
fn send_expired_packet(fixture: &LinkFixture, pair: &ChannelPair) -> Packet {
    let timeout_height = fixture.chain_b.latest_height().increment();

    let packet = fixture
        .send_expiring_packet(Side::A, pair, TimeoutHeight::At(timeout_height), Timestamp::none())
        .expect("packet sent");
    fixture.chain_b.advance_blocks(2);

    packet
}

#[test_log::test(tokio::test)]
async fn expired_packets_time_out_on_unordered_channels() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let live = fixture.send_packets(Side::A, &pair, 1).expect("packet sent");
    let expired = send_expired_packet(&fixture, &pair);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.is_complete(), "{report}");
    assert_eq!(report.timed_out, vec![expired.key()]);
    assert_eq!(report.received, vec![live[0].key()]);
    assert!(!fixture
        .chain_a
        .has_commitment(&expired.port_id_on_a, &expired.chan_id_on_a, expired.seq_on_a));

    fixture.link.verify_channel(&pair).await.expect("channel stays open");
}

#[test_log::test(tokio::test)]
async fn timeouts_close_ordered_channels() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Ordered).await.expect("channel opens");
    let expired = send_expired_packet(&fixture, &pair);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert_eq!(report.timed_out, vec![expired.key()]);

    let end_a = fixture
        .chain_a
        .query_channel(&pair.port_id_a, &pair.chan_id_a)
        .await
        .expect("query succeeds")
        .expect("channel exists");
    assert_eq!(end_a.state, ChannelState::Closed);

    assert!(matches!(
        fixture.link.verify_channel(&pair).await,
        Err(RelayerError::ChannelNotOpen { .. })
    ));
}

#[test_log::test(tokio::test)]
async fn later_timeouts_on_a_closed_ordered_channel_are_not_submitted() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Ordered).await.expect("channel opens");

    let timeout_height = TimeoutHeight::At(fixture.chain_b.latest_height().increment());
    let expired: Vec<Packet> = (0..2)
        .map(|_| {
            fixture
                .send_expiring_packet(Side::A, &pair, timeout_height, Timestamp::none())
                .expect("packet sent")
        })
        .collect();
    fixture.chain_b.advance_blocks(2);

    let txs_on_a = fixture.chain_a.tx_count();
    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert_eq!(report.timed_out, vec![expired[0].key()]);
    assert_eq!(report.abandoned, vec![expired[1].key()]);
    assert!(report.failed.is_empty(), "{report}");
    // one client update, one timeout
    assert_eq!(fixture.chain_a.tx_count(), txs_on_a + 2);

    let (next, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");
    assert!(next.is_empty(), "{next}");
}

#[test_log::test(tokio::test)]
async fn timestamps_expire_packets_too() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    let timeout_timestamp = fixture
        .chain_b
        .latest_timestamp()
        .checked_add(DEFAULT_BLOCK_TIME)
        .expect("no overflow");
    let expired = fixture
        .send_expiring_packet(Side::A, &pair, TimeoutHeight::Never, timeout_timestamp)
        .expect("packet sent");
    fixture.chain_b.advance_blocks(2);

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.received.is_empty());
    assert_eq!(report.timed_out, vec![expired.key()]);
}

#[test_log::test(tokio::test)]
async fn packets_within_their_bounds_are_received() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    let timeout_height = fixture.chain_b.latest_height().add(100);
    let packet = fixture
        .send_expiring_packet(Side::A, &pair, TimeoutHeight::At(timeout_height), Timestamp::none())
        .expect("packet sent");

    let (report, _) = fixture
        .link
        .relay_all(&RelayOpts::default())
        .await
        .expect("round succeeds");

    assert!(report.timed_out.is_empty());
    assert_eq!(report.received, vec![packet.key()]);
    assert_eq!(report.acknowledged, vec![packet.key()]);
}
