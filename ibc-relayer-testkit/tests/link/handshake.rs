use std::sync::Arc;

use ibc_relayer::chain::ChainClient;
use ibc_relayer::error::{HandshakeStep, RelayerError};
use ibc_relayer::handle::ChainHandle;
use ibc_relayer::link::{Link, Side};
use ibc_relayer_testkit::fixtures::{chain_id, link_config, mock_chain, LinkFixture, CHAIN_A, CHAIN_B};
use ibc_relayer_testkit::hosts::{MockChain, MockChainConfig};
use ibc_relayer_types::channel::{Order, State as ChannelState};
use ibc_relayer_types::identifiers::{ConnectionId, PortId};
use ibc_relayer_types::msgs::CONN_OPEN_TRY_TYPE_URL;

#[test_log::test(tokio::test)]
async fn new_connections_open_on_both_chains() {
    let fixture = LinkFixture::new().await.expect("link opens");

    let (conn_a, conn_b) = tokio::try_join!(
        fixture.link.end_a().query_connection(),
        fixture.link.end_b().query_connection(),
    )
    .expect("queries succeed");
    let (conn_a, conn_b) = (conn_a.expect("exists on A"), conn_b.expect("exists on B"));

    assert!(conn_a.is_open());
    assert!(conn_b.is_open());
    assert_eq!(conn_a.counterparty.connection_id.as_ref(), Some(fixture.link.end_b().connection_id()));
    assert_eq!(conn_b.counterparty.connection_id.as_ref(), Some(fixture.link.end_a().connection_id()));
    assert_eq!(&conn_a.client_id, fixture.link.end_a().client_id());
    assert_eq!(&conn_b.client_id, fixture.link.end_b().client_id());
}

#[test_log::test(tokio::test)]
async fn channels_open_from_either_side() {
    let fixture = LinkFixture::new().await.expect("link opens");

    let from_a = fixture.open_channel(Order::Unordered).await.expect("channel opens");
    let from_b = fixture
        .link
        .create_channel(Side::B, PortId::transfer(), PortId::transfer(), Order::Ordered, None)
        .await
        .expect("channel opens");

    for pair in [&from_a, &from_b] {
        let end_a = fixture
            .chain_a
            .query_channel(&pair.port_id_a, &pair.chan_id_a)
            .await
            .expect("query succeeds")
            .expect("channel exists on A");

        assert_eq!(end_a.state, ChannelState::Open);
        assert_eq!(end_a.remote.channel_id.as_ref(), Some(&pair.chan_id_b));
        assert_eq!(end_a.version, fixture.link.config().default_channel_version);
    }

    assert_ne!(from_a.chan_id_a, from_b.chan_id_a);
    fixture.link.verify_channel(&from_b).await.expect("both ends open");
}

#[test_log::test(tokio::test)]
async fn explicit_channel_versions_are_kept() {
    let fixture = LinkFixture::new().await.expect("link opens");

    let pair = fixture
        .link
        .create_channel(
            Side::A,
            PortId::transfer(),
            PortId::transfer(),
            Order::Unordered,
            Some("ics20-2".to_string()),
        )
        .await
        .expect("channel opens");

    let end_b = fixture
        .chain_b
        .query_channel(&pair.port_id_b, &pair.chan_id_b)
        .await
        .expect("query succeeds")
        .expect("channel exists on B");
    assert_eq!(end_b.version, "ics20-2");
}

#[test_log::test(tokio::test)]
async fn existing_connections_are_reused() {
    let fixture = LinkFixture::new().await.expect("link opens");

    let reused = Link::create_with_existing_connections(
        ChainHandle::from_arc(fixture.chain_a.clone()),
        ChainHandle::from_arc(fixture.chain_b.clone()),
        fixture.link.end_a().connection_id().clone(),
        fixture.link.end_b().connection_id().clone(),
        link_config(),
    )
    .await
    .expect("connections are open and match");

    assert_eq!(reused.end_a().client_id(), fixture.link.end_a().client_id());
    assert_eq!(reused.end_b().client_id(), fixture.link.end_b().client_id());

    let txs_before = (fixture.chain_a.tx_count(), fixture.chain_b.tx_count());
    reused
        .create_channel(Side::A, PortId::transfer(), PortId::transfer(), Order::Unordered, None)
        .await
        .expect("channel opens");

    assert_eq!(fixture.chain_a.connections_count(), 1);
    assert_eq!(fixture.chain_b.connections_count(), 1);
    assert!(fixture.chain_a.tx_count() > txs_before.0);
}

#[test_log::test(tokio::test)]
async fn unknown_connections_are_not_open() {
    let fixture = LinkFixture::new().await.expect("link opens");

    let result = Link::create_with_existing_connections(
        ChainHandle::from_arc(fixture.chain_a.clone()),
        ChainHandle::from_arc(fixture.chain_b.clone()),
        ConnectionId::new(7),
        fixture.link.end_b().connection_id().clone(),
        link_config(),
    )
    .await;

    assert!(matches!(result, Err(RelayerError::ConnectionNotOpen { .. })));
}

#[test_log::test(tokio::test)]
async fn connections_must_name_each_other() {
    let fixture = LinkFixture::new().await.expect("link opens");
    let other = LinkFixture::with_chains(fixture.chain_a.clone(), fixture.chain_b.clone(), link_config())
        .await
        .expect("second link opens");

    let result = Link::create_with_existing_connections(
        ChainHandle::from_arc(fixture.chain_a.clone()),
        ChainHandle::from_arc(fixture.chain_b.clone()),
        fixture.link.end_a().connection_id().clone(),
        other.link.end_b().connection_id().clone(),
        link_config(),
    )
    .await;

    assert_eq!(fixture.chain_a.connections_count(), 2);
    assert!(matches!(result, Err(RelayerError::ConnectionMismatch { .. })));
}

#[test_log::test(tokio::test)]
async fn unbound_ports_fail_the_try_step() {
    let oracle: PortId = "oracle".parse().expect("valid port");
    let chain_a = Arc::new(MockChain::new(
        MockChainConfig::builder()
            .chain_id(chain_id(CHAIN_A))
            .ports(vec![PortId::transfer(), oracle.clone()])
            .build(),
    ));
    let fixture = LinkFixture::with_chains(chain_a, mock_chain(CHAIN_B), link_config())
        .await
        .expect("link opens");

    let result = fixture
        .link
        .create_channel(Side::A, oracle.clone(), oracle, Order::Unordered, None)
        .await;

    assert!(matches!(
        result,
        Err(RelayerError::HandshakeFailed {
            step: HandshakeStep::ChanOpenTry,
            ..
        })
    ));
}

#[test_log::test(tokio::test)]
async fn rejected_steps_name_the_failing_step() {
    let chain_a = mock_chain(CHAIN_A);
    let chain_b = mock_chain(CHAIN_B);
    chain_b.fail_next_msgs(CONN_OPEN_TRY_TYPE_URL, 1);

    let result = LinkFixture::with_chains(chain_a.clone(), chain_b.clone(), link_config()).await;

    match result {
        Err(RelayerError::HandshakeFailed { step, cause }) => {
            assert_eq!(step, HandshakeStep::ConnOpenTry);
            assert!(matches!(*cause, RelayerError::BroadcastRejected { .. }));
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("handshake succeeded despite the rejected step"),
    }

    // the connection initiated on A stays behind
    assert_eq!(chain_a.connections_count(), 1);
    assert_eq!(chain_b.connections_count(), 0);
}
