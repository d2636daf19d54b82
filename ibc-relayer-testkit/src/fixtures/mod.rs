//! Chains, links and channels set up for relayer tests.

use core::time::Duration;
use std::sync::Arc;

use ibc_relayer::config::LinkConfig;
use ibc_relayer::error::RelayerError;
use ibc_relayer::handle::ChainHandle;
use ibc_relayer::link::{Link, Side};
use ibc_relayer::retry::RetryPolicy;
use ibc_relayer_types::channel::{ChannelPair, Order};
use ibc_relayer_types::identifiers::{ChainId, PortId};
use ibc_relayer_types::packet::Packet;
use ibc_relayer_types::timeout::TimeoutHeight;
use ibc_relayer_types::timestamp::Timestamp;

use crate::hosts::{MockChain, MockChainConfig, MockError, OutgoingPacket};

pub const CHAIN_A: &str = "ibc-a-0";
pub const CHAIN_B: &str = "ibc-b-0";

/// Tx searches return two transactions per page, so that a handful of
/// packets already spans several pages.
pub const TEST_PAGE_SIZE: u32 = 2;

pub fn chain_id(id: &str) -> ChainId {
    ChainId::new(id).expect("Never fails")
}

/// A port bound next to `transfer`, for channels between different modules.
pub fn custom_port() -> PortId {
    PortId::new("custom".to_string()).expect("Never fails")
}

/// A chain with `transfer` and [`custom_port`] bound.
pub fn mock_chain(id: &str) -> Arc<MockChain> {
    Arc::new(MockChain::new(
        MockChainConfig::builder()
            .chain_id(chain_id(id))
            .ports(vec![PortId::transfer(), custom_port()])
            .build(),
    ))
}

/// Retries short enough for tests running on a paused clock or not.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(100))
        .max_retries(3)
        .proof_delay(Duration::from_millis(20))
        .proof_attempts(5)
        .build()
}

pub fn link_config() -> LinkConfig {
    LinkConfig::builder()
        .page_size(TEST_PAGE_SIZE)
        .retry(fast_retry())
        .build()
}

/// Two mock chains and a link between them.
pub struct LinkFixture {
    pub chain_a: Arc<MockChain>,
    pub chain_b: Arc<MockChain>,
    pub link: Link<MockChain, MockChain>,
}

impl LinkFixture {
    /// Creates clients and opens a connection between two fresh chains.
    pub async fn new() -> Result<Self, RelayerError> {
        Self::with_chains(mock_chain(CHAIN_A), mock_chain(CHAIN_B), link_config()).await
    }

    pub async fn with_chains(
        chain_a: Arc<MockChain>,
        chain_b: Arc<MockChain>,
        config: LinkConfig,
    ) -> Result<Self, RelayerError> {
        let link = Link::create_with_new_connections(
            ChainHandle::from_arc(chain_a.clone()),
            ChainHandle::from_arc(chain_b.clone()),
            config,
        )
        .await?;

        Ok(Self {
            chain_a,
            chain_b,
            link,
        })
    }

    /// Opens a `transfer` channel from `A`.
    pub async fn open_channel(&self, ordering: Order) -> Result<ChannelPair, RelayerError> {
        self.link
            .create_channel(Side::A, PortId::transfer(), PortId::transfer(), ordering, None)
            .await
    }

    pub fn chain(&self, side: Side) -> &MockChain {
        match side {
            Side::A => &self.chain_a,
            Side::B => &self.chain_b,
        }
    }

    /// Sends `count` packets from `side` over `pair` in separate transactions.
    pub fn send_packets(
        &self,
        side: Side,
        pair: &ChannelPair,
        count: usize,
    ) -> Result<Vec<Packet>, MockError> {
        (0..count)
            .map(|_| self.chain(side).send_packet(outgoing(side, pair)))
            .collect()
    }

    /// Sends one packet from `side` that expires on the other chain at
    /// `timeout_height`.
    pub fn send_expiring_packet(
        &self,
        side: Side,
        pair: &ChannelPair,
        timeout_height: TimeoutHeight,
        timeout_timestamp: Timestamp,
    ) -> Result<Packet, MockError> {
        let mut packet = outgoing(side, pair);
        packet.timeout_height = timeout_height;
        packet.timeout_timestamp = timeout_timestamp;

        self.chain(side).send_packet(packet)
    }
}

/// A packet without timeout from `side`'s end of `pair`.
pub fn outgoing(side: Side, pair: &ChannelPair) -> OutgoingPacket {
    let (port_id, channel_id) = match side {
        Side::A => (pair.port_id_a.clone(), pair.chan_id_a.clone()),
        Side::B => (pair.port_id_b.clone(), pair.chan_id_b.clone()),
    };

    OutgoingPacket::builder()
        .port_id(port_id)
        .channel_id(channel_id)
        .build()
}
