//! The relayer's view of one chain, bound to a client and a connection.

use ibc_relayer_types::channel::ChannelEnd;
use ibc_relayer_types::connection::ConnectionEnd;
use ibc_relayer_types::events::abci::AbciMessageLog;
use ibc_relayer_types::events::attributes::PKT_CONNECTION_ID_ATTRIBUTE_KEY;
use ibc_relayer_types::events::lookup::{resolve_first, AttributeLookup};
use ibc_relayer_types::events::{
    IbcEvent, ACK_PACKET_EVENT, SEND_PACKET_EVENT, TIMEOUT_EVENT, WRITE_ACK_EVENT,
};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{
    ChainId, ChannelId, ClientId, ConnectionId, PortId, Sequence, Signer,
};
use ibc_relayer_types::metadata::{AckWithMetadata, PacketWithMetadata};
use ibc_relayer_types::msgs::IbcMsg;
use ibc_relayer_types::packet::{Packet, PacketKey};
use ibc_relayer_types::path::Path;
use ibc_relayer_types::query::{Pagination, QueryOpts, TxQuery};
use tracing::{debug, warn};

use crate::chain::{ChainClient, CommitInfo, ProvenValue, TxResponse, TxResult};
use crate::config::LinkConfig;
use crate::error::RelayerError;
use crate::handle::ChainHandle;
use crate::retry::{retry_transient, RetryPolicy};

/// How an endpoint pages through searches, retries, and finds senders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuerySettings {
    pub page_size: u32,
    pub retry: RetryPolicy,
    pub sender_lookups: Vec<AttributeLookup>,
}

impl From<&LinkConfig> for QuerySettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            retry: config.retry,
            sender_lookups: config.sender_lookups.clone(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

/// A chain handle bound to the client tracking the counterparty and to one
/// end of the connection over that client. It never reasons about the
/// counterparty itself.
pub struct Endpoint<C> {
    chain: ChainHandle<C>,
    client_id: ClientId,
    connection_id: ConnectionId,
    settings: QuerySettings,
}

impl<C> Clone for Endpoint<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            client_id: self.client_id.clone(),
            connection_id: self.connection_id.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<C: ChainClient> Endpoint<C> {
    pub fn new(chain: ChainHandle<C>, client_id: ClientId, connection_id: ConnectionId) -> Self {
        Self {
            chain,
            client_id,
            connection_id,
            settings: QuerySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn chain(&self) -> &ChainHandle<C> {
        &self.chain
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    /// The account that signs this endpoint's transactions.
    pub fn signer(&self) -> Signer {
        self.chain.signer()
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub async fn latest_commit(&self) -> Result<CommitInfo, RelayerError> {
        self.chain.latest_commit(&self.settings.retry).await
    }

    /// Packets sent over this endpoint's connection, with the height that
    /// committed them and the sender of their transaction.
    pub async fn query_sent_packets(
        &self,
        opts: &QueryOpts,
    ) -> Result<Vec<PacketWithMetadata>, RelayerError> {
        let query = opts.to_query(
            SEND_PACKET_EVENT,
            PKT_CONNECTION_ID_ATTRIBUTE_KEY,
            self.connection_id.as_str(),
        );

        let mut packets = Vec::new();
        for (tx, logs, height) in self.search_decoded(&query).await? {
            let sender = resolve_first(&self.settings.sender_lookups, &logs).unwrap_or_else(|| {
                warn!(chain_id = %self.chain_id(), tx = %tx.hash, "no message.sender nor message.signer in tx");
                String::new()
            });

            for event in IbcEvent::decode_logs(&logs) {
                match event {
                    IbcEvent::SendPacket(e) if self.accepts(&e.connection_id, &e.packet, opts) => {
                        packets.push(PacketWithMetadata {
                            packet: e.packet,
                            height,
                            sender: sender.clone(),
                        });
                    }
                    IbcEvent::Malformed { kind, reason } if kind == SEND_PACKET_EVENT => {
                        warn!(chain_id = %self.chain_id(), tx = %tx.hash, %reason, "skipping malformed send_packet event");
                    }
                    _ => {}
                }
            }
        }

        debug!(chain_id = %self.chain_id(), connection_id = %self.connection_id, %query, count = packets.len(), "queried sent packets");

        Ok(packets)
    }

    /// Acknowledgements this chain wrote for packets received over this
    /// endpoint's connection.
    pub async fn query_written_acks(
        &self,
        opts: &QueryOpts,
    ) -> Result<Vec<AckWithMetadata>, RelayerError> {
        let query = opts.to_query(
            WRITE_ACK_EVENT,
            PKT_CONNECTION_ID_ATTRIBUTE_KEY,
            self.connection_id.as_str(),
        );

        let mut acks = Vec::new();
        for (tx, logs, height) in self.search_decoded(&query).await? {
            for event in IbcEvent::decode_logs(&logs) {
                match event {
                    IbcEvent::WriteAcknowledgement(e)
                        if self.accepts(&e.connection_id, &e.packet, opts) =>
                    {
                        acks.push(AckWithMetadata {
                            packet: e.packet,
                            acknowledgement: e.acknowledgement,
                            height,
                        });
                    }
                    IbcEvent::Malformed { kind, reason } if kind == WRITE_ACK_EVENT => {
                        warn!(chain_id = %self.chain_id(), tx = %tx.hash, %reason, "skipping malformed write_acknowledgement event");
                    }
                    _ => {}
                }
            }
        }

        debug!(chain_id = %self.chain_id(), connection_id = %self.connection_id, %query, count = acks.len(), "queried written acks");

        Ok(acks)
    }

    /// Keys of packets sent from this chain whose commitment has been
    /// cleared, by an acknowledgement or a timeout.
    pub async fn query_settled_packets(
        &self,
        opts: &QueryOpts,
    ) -> Result<Vec<PacketKey>, RelayerError> {
        let connection_id = self.connection_id.as_str();
        let ack_query = opts.to_query(ACK_PACKET_EVENT, PKT_CONNECTION_ID_ATTRIBUTE_KEY, connection_id);
        let timeout_query = opts.to_query(TIMEOUT_EVENT, PKT_CONNECTION_ID_ATTRIBUTE_KEY, connection_id);

        let (acked, timed_out) = tokio::try_join!(
            self.search_decoded(&ack_query),
            self.search_decoded(&timeout_query)
        )?;

        let keys = acked
            .into_iter()
            .chain(timed_out)
            .flat_map(|(_, logs, _)| IbcEvent::decode_logs(&logs))
            .filter_map(|event| match event {
                IbcEvent::AcknowledgePacket(e) | IbcEvent::TimeoutPacket(e)
                    if self.accepts(&e.connection_id, &e.packet, opts) =>
                {
                    Some(e.packet.key())
                }
                _ => None,
            })
            .collect();

        Ok(keys)
    }

    pub async fn query_connection(&self) -> Result<Option<ConnectionEnd>, RelayerError> {
        self.query_connection_by_id(&self.connection_id).await
    }

    pub async fn query_connection_by_id(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Option<ConnectionEnd>, RelayerError> {
        self.chain
            .query_connection(connection_id, &self.settings.retry)
            .await
    }

    pub async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, RelayerError> {
        self.chain
            .query_channel(port_id, channel_id, &self.settings.retry)
            .await
    }

    pub async fn query_unreceived_packets(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError> {
        if sequences.is_empty() {
            return Ok(Vec::new());
        }

        retry_transient(self.settings.retry.query_delays(), "query_unreceived_packets", || {
            self.chain
                .client()
                .query_unreceived_packets(port_id, channel_id, sequences)
        })
        .await
    }

    pub async fn query_unreceived_acks(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError> {
        if sequences.is_empty() {
            return Ok(Vec::new());
        }

        retry_transient(self.settings.retry.query_delays(), "query_unreceived_acks", || {
            self.chain
                .client()
                .query_unreceived_acks(port_id, channel_id, sequences)
        })
        .await
    }

    pub async fn query_next_sequence_recv(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, RelayerError> {
        retry_transient(self.settings.retry.query_delays(), "query_next_sequence_recv", || {
            self.chain.client().query_next_sequence_recv(port_id, channel_id)
        })
        .await
    }

    /// The latest counterparty height known to this endpoint's client.
    pub async fn query_client_latest_height(&self) -> Result<Height, RelayerError> {
        self.chain
            .query_client_latest_height(&self.client_id, &self.settings.retry)
            .await
    }

    /// Proves `path` at `height`, waiting for the chain to reach `height` if
    /// it has not yet.
    pub async fn query_proof(&self, path: &Path, height: Height) -> Result<ProvenValue, RelayerError> {
        self.chain
            .query_proof(path, height, &self.settings.retry)
            .await
    }

    pub async fn submit(&self, msgs: Vec<IbcMsg>) -> Result<TxResult, RelayerError> {
        self.chain.submit(msgs).await
    }

    fn accepts(
        &self,
        connection_id: &ConnectionId,
        packet: &Packet,
        opts: &QueryOpts,
    ) -> bool {
        *connection_id == self.connection_id
            && opts.filter.as_ref().map_or(true, |f| f.matches(packet))
    }

    /// Runs the search and parses each transaction log. Transactions with an
    /// unreadable log are skipped with a warning.
    async fn search_decoded(
        &self,
        query: &TxQuery,
    ) -> Result<Vec<(TxResponse, Vec<AbciMessageLog>, Height)>, RelayerError> {
        let revision_number = self.chain_id().revision_number();

        let mut decoded = Vec::new();
        for tx in self.search_all(query).await? {
            let logs = match tx.logs() {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(chain_id = %self.chain_id(), tx = %tx.hash, error = %e, "skipping tx with unreadable log");
                    continue;
                }
            };

            let height = Height::new(revision_number, tx.height)?;
            decoded.push((tx, logs, height));
        }

        Ok(decoded)
    }

    /// Pages through the search until `total_count` results are collected.
    async fn search_all(&self, query: &TxQuery) -> Result<Vec<TxResponse>, RelayerError> {
        let mut page = Pagination::first(self.settings.page_size);
        let mut txs = Vec::new();

        loop {
            let result = retry_transient(self.settings.retry.query_delays(), "query_txs", || {
                self.chain.client().query_txs(query, page)
            })
            .await?;

            let fetched = result.txs.len();
            txs.extend(result.txs);

            if fetched == 0 || txs.len() >= result.total_count as usize {
                break;
            }

            page = page.next();
        }

        Ok(txs)
    }
}
