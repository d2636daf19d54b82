use std::sync::Arc;

use ibc_relayer::link::Side;
use ibc_relayer::report::RelayOpts;
use ibc_relayer_testkit::fixtures::{chain_id, link_config, mock_chain, LinkFixture, CHAIN_A, CHAIN_B};
use ibc_relayer_testkit::hosts::{MockChain, MockChainConfig, SenderAttribute, DEFAULT_SIGNER};
use ibc_relayer_types::channel::Order;
use ibc_relayer_types::identifiers::Sequence;
use ibc_relayer_types::path::Path;
use ibc_relayer_types::query::{Filter, QueryOpts};

#[test_log::test(tokio::test)]
async fn sent_packets_span_several_pages() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    fixture.send_packets(Side::A, &pair, 5).expect("packets sent");

    let found = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::default())
        .await
        .expect("query succeeds");

    let sequences: Vec<Sequence> = found.iter().map(|p| p.packet.seq_on_a).collect();
    assert_eq!(sequences, (1..=5).map(Sequence::from).collect::<Vec<_>>());
    assert!(found.iter().all(|p| p.sender == DEFAULT_SIGNER));
    assert!(found.windows(2).all(|w| w[0].height < w[1].height));
}

#[test_log::test(tokio::test)]
async fn reported_heights_never_exceed_the_latest_commit() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    let mut sent_at = Vec::new();
    for _ in 0..3 {
        fixture.send_packets(Side::A, &pair, 1).expect("packet sent");
        sent_at.push(fixture.chain_a.latest_height());
        fixture.chain_a.advance_blocks(1);
    }
    fixture
        .link
        .relay_packets(&RelayOpts::default())
        .await
        .expect("packets relayed");

    let (end_a, end_b) = (fixture.link.end_a(), fixture.link.end_b());
    let (commit_a, commit_b) = tokio::try_join!(end_a.latest_commit(), end_b.latest_commit())
        .expect("commits queried");
    let query_opts = QueryOpts::default();
    let (sent, acks) = tokio::try_join!(
        end_a.query_sent_packets(&query_opts),
        end_b.query_written_acks(&query_opts),
    )
    .expect("queries succeed");

    assert_eq!(sent.iter().map(|p| p.height).collect::<Vec<_>>(), sent_at);
    assert!(sent.iter().all(|p| p.height <= commit_a.height));

    assert_eq!(acks.len(), 3);
    for ack in &acks {
        assert!(ack.height <= commit_b.height, "ack at {} above {}", ack.height, commit_b.height);

        let path = Path::Ack(
            ack.packet.port_id_on_b.clone(),
            ack.packet.chan_id_on_b.clone(),
            ack.packet.seq_on_a,
        );
        let proven = end_b.query_proof(&path, ack.height).await.expect("ack provable at its height");
        assert!(proven.value.is_some());
    }
}

#[test_log::test(tokio::test)]
async fn the_chain_may_serve_smaller_pages_than_requested() {
    let chain_a = Arc::new(MockChain::new(
        MockChainConfig::builder()
            .chain_id(chain_id(CHAIN_A))
            .max_page_size(1)
            .build(),
    ));
    let fixture = LinkFixture::with_chains(chain_a, mock_chain(CHAIN_B), link_config())
        .await
        .expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    fixture.send_packets(Side::A, &pair, 3).expect("packets sent");

    let found = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::default())
        .await
        .expect("query succeeds");

    assert_eq!(found.len(), 3);
}

#[test_log::test(tokio::test)]
async fn queries_start_at_the_minimum_height() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    fixture.send_packets(Side::A, &pair, 2).expect("packets sent");
    let from = fixture.chain_a.latest_height().increment();
    fixture.send_packets(Side::A, &pair, 3).expect("packets sent");

    let found = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::from_height(from.revision_height()))
        .await
        .expect("query succeeds");

    let sequences: Vec<u64> = found.iter().map(|p| p.packet.seq_on_a.value()).collect();
    assert_eq!(sequences, vec![3, 4, 5]);
}

#[test_log::test(tokio::test)]
async fn filters_narrow_by_channel() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let first = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let second = fixture.open_channel(Order::Unordered).await.expect("channel opens");

    fixture.send_packets(Side::A, &first, 2).expect("packets sent");
    fixture.send_packets(Side::A, &second, 1).expect("packets sent");

    let filter = Filter {
        src_channel_id: Some(second.chan_id_a.clone()),
        ..Default::default()
    };
    let found = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::default().with_filter(filter))
        .await
        .expect("query succeeds");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].packet.chan_id_on_a, second.chan_id_a);
}

#[test_log::test(tokio::test)]
async fn sender_falls_back_to_the_signer_attribute() {
    for (attribute, expected) in [
        (SenderAttribute::Sender, DEFAULT_SIGNER),
        (SenderAttribute::Signer, DEFAULT_SIGNER),
        (SenderAttribute::Omitted, ""),
    ] {
        let chain_a = Arc::new(MockChain::new(
            MockChainConfig::builder()
                .chain_id(chain_id(CHAIN_A))
                .sender_attribute(attribute)
                .build(),
        ));
        let fixture = LinkFixture::with_chains(chain_a, mock_chain(CHAIN_B), link_config())
            .await
            .expect("link opens");
        let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");

        fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

        let found = fixture
            .link
            .end_a()
            .query_sent_packets(&QueryOpts::default())
            .await
            .expect("query succeeds");

        assert_eq!(found.len(), 1, "{attribute:?}");
        assert_eq!(found[0].sender, expected, "{attribute:?}");
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn transient_search_failures_are_retried() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let pair = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    fixture.send_packets(Side::A, &pair, 1).expect("packet sent");

    fixture.chain_a.fail_next_queries(2);

    let found = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::default())
        .await
        .expect("query succeeds after retries");

    assert_eq!(found.len(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn persistent_search_failures_surface() {
    let fixture = LinkFixture::new().await.expect("link opens");

    fixture.chain_a.fail_next_queries(10);

    let result = fixture
        .link
        .end_a()
        .query_sent_packets(&QueryOpts::default())
        .await;

    assert!(result.is_err_and(|e| e.is_transient()));
}
