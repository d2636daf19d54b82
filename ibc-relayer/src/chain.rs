//! The interface the relayer uses to talk to a chain.

use async_trait::async_trait;
use ibc_relayer_types::channel::ChannelEnd;
use ibc_relayer_types::connection::ConnectionEnd;
use ibc_relayer_types::events::abci::{parse_raw_log, AbciMessageLog};
use ibc_relayer_types::events::IbcEvent;
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{ChainId, ChannelId, ClientId, ConnectionId, PortId, Sequence, Signer};
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proof::CommitmentProofBytes;
use ibc_relayer_types::proto::Any;
use ibc_relayer_types::query::{Pagination, TxQuery};
use ibc_relayer_types::timestamp::Timestamp;
use tendermint::Hash;
use tokio::sync::Mutex;

use crate::error::RelayerError;

/// The latest committed block of a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub height: Height,
    pub block_hash: Hash,
    pub timestamp: Timestamp,
}

/// A transaction returned by a tx search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResponse {
    pub hash: Hash,
    pub height: u64,
    pub raw_log: String,
}

impl TxResponse {
    pub fn logs(&self) -> Result<Vec<AbciMessageLog>, RelayerError> {
        Ok(parse_raw_log(&self.raw_log)?)
    }
}

/// One page of tx search results. `total_count` counts every match of the
/// query, across all pages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxSearchPage {
    pub txs: Vec<TxResponse>,
    pub total_count: u32,
}

/// The outcome of a broadcast transaction. A non-zero `code` means the
/// chain rejected it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResult {
    pub code: u32,
    pub height: Height,
    pub hash: Hash,
    pub raw_log: String,
    pub events: Vec<IbcEvent>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// A value read from the provable store with its proof.
///
/// `value` is `None` when the proof shows absence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenValue {
    pub value: Option<Vec<u8>>,
    pub proof: CommitmentProofBytes,
    pub height: Height,
}

/// Everything needed to create a light client of a chain on its counterparty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientPayload {
    pub client_state: Any,
    pub consensus_state: Any,
    pub height: Height,
}

/// Access to one chain: queries, proofs, light client data and a signing
/// account.
///
/// Implementations report transport and node failures as
/// [`RelayerError::ChainQuery`] and proofs requested above the latest height
/// as [`RelayerError::ProofNotYetAvailable`], so that callers can retry them.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// The account that signs the relayer's transactions.
    fn signer(&self) -> Signer;

    /// Held while a transaction of the signing account is in flight. One
    /// lock per account, shared by every handle to this client.
    fn tx_lock(&self) -> &Mutex<()>;

    async fn query_txs(&self, query: &TxQuery, page: Pagination) -> Result<TxSearchPage, RelayerError>;

    async fn latest_commit(&self) -> Result<CommitInfo, RelayerError>;

    /// Proves the value at `path` as of `height`.
    async fn query_proof(&self, path: &Path, height: Height) -> Result<ProvenValue, RelayerError>;

    async fn sign_and_broadcast(&self, msgs: Vec<Any>) -> Result<TxResult, RelayerError>;

    async fn query_connection(&self, connection_id: &ConnectionId) -> Result<Option<ConnectionEnd>, RelayerError>;

    async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, RelayerError>;

    /// The latest height of the counterparty known to a hosted light client.
    async fn query_client_latest_height(&self, client_id: &ClientId) -> Result<Height, RelayerError>;

    /// The subset of `sequences` this chain has not received on the channel.
    async fn query_unreceived_packets(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError>;

    /// The subset of `sequences` whose packet commitment is still stored on
    /// this chain, i.e. whose acknowledgement has not been processed.
    async fn query_unreceived_acks(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError>;

    async fn query_next_sequence_recv(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, RelayerError>;

    /// Client and consensus state for a new light client of this chain.
    async fn build_client_payload(&self) -> Result<ClientPayload, RelayerError>;

    /// A header that advances a light client of this chain to `target`.
    async fn build_header(&self, target: Height) -> Result<Any, RelayerError>;
}
