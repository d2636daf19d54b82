use core::time::Duration;
use std::collections::BTreeMap;

use async_trait::async_trait;
use ibc_relayer::chain::{
    ChainClient, ClientPayload, CommitInfo, ProvenValue, TxResponse, TxResult, TxSearchPage,
};
use ibc_relayer::error::RelayerError;
use ibc_relayer_types::channel::ChannelEnd;
use ibc_relayer_types::connection::ConnectionEnd;
use ibc_relayer_types::events::abci::{to_raw_log, AbciMessageLog, StringEvent};
use ibc_relayer_types::events::attributes::{SENDER_ATTRIBUTE_KEY, SIGNER_ATTRIBUTE_KEY};
use ibc_relayer_types::events::{IbcEvent, MESSAGE_EVENT};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{
    ChainId, ChannelId, ClientId, ConnectionId, PortId, Sequence, Signer,
};
use ibc_relayer_types::packet::Packet;
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proto::Any;
use ibc_relayer_types::query::{Pagination, TxQuery};
use ibc_relayer_types::timeout::TimeoutHeight;
use ibc_relayer_types::timestamp::Timestamp;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tendermint::Hash;
use tracing::debug;
use typed_builder::TypedBuilder;

use super::block::MockBlock;
use super::error::MockError;
use super::state::{Action, BlockCtx, ChainState, TxRecord};
use crate::clients::mock::{MockClientState, MockConsensusState};

/// 2023-11-14T22:13:20Z
pub const GENESIS_TIMESTAMP_NANOS: u64 = 1_700_000_000_000_000_000;
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SIGNER: &str = "cosmos1relayer";

const ACTION_ATTRIBUTE_KEY: &str = "action";

/// Which attribute of the `message` event names the account that signed a
/// transaction. Chains differ here, and some omit it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SenderAttribute {
    #[default]
    Sender,
    Signer,
    Omitted,
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct MockChainConfig {
    #[builder(default = ChainId::new("mock-0").expect("Never fails"))]
    pub chain_id: ChainId,
    #[builder(default = DEFAULT_BLOCK_TIME)]
    pub block_time: Duration,
    #[builder(default = Timestamp::from_nanoseconds(GENESIS_TIMESTAMP_NANOS))]
    pub genesis_time: Timestamp,
    /// Largest page the tx search returns, whatever the caller asks for.
    #[builder(default = DEFAULT_MAX_PAGE_SIZE)]
    pub max_page_size: u32,
    /// Ports with a module bound to them. Channel handshakes on any other
    /// port fail.
    #[builder(default = vec![PortId::transfer()])]
    pub ports: Vec<PortId>,
    #[builder(default)]
    pub sender_attribute: SenderAttribute,
    #[builder(default = Signer::new(DEFAULT_SIGNER))]
    pub signer: Signer,
}

impl Default for MockChainConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A packet an application asks a mock chain to send.
#[derive(Clone, Debug, TypedBuilder)]
pub struct OutgoingPacket {
    #[builder(default = PortId::transfer())]
    pub port_id: PortId,
    pub channel_id: ChannelId,
    #[builder(default = br#"{"amount":"100","denom":"stake"}"#.to_vec(), setter(into))]
    pub data: Vec<u8>,
    #[builder(default, setter(into))]
    pub timeout_height: TimeoutHeight,
    #[builder(default)]
    pub timeout_timestamp: Timestamp,
}

#[derive(Debug, Default)]
struct Faults {
    failing_msgs: BTreeMap<String, u32>,
    withheld_proofs: u32,
    failing_queries: u32,
    proof_queries: u64,
}

impl Faults {
    /// Consumes one injected failure of the first action that has one.
    fn take_msg_failure(&mut self, actions: &[Action]) -> Option<String> {
        actions.iter().find_map(|action| {
            let remaining = self.failing_msgs.get_mut(action.name())?;
            if *remaining == 0 {
                return None;
            }

            *remaining -= 1;
            Some(action.name().to_string())
        })
    }

    fn take(counter: &mut u32) -> bool {
        if *counter == 0 {
            return false;
        }

        *counter -= 1;
        true
    }
}

/// Broadcasts currently executing, and the most seen at once.
#[derive(Debug, Default)]
struct Broadcasts {
    in_flight: u32,
    peak: u32,
}

impl Broadcasts {
    fn begin(&mut self) {
        self.in_flight += 1;
        self.peak = self.peak.max(self.in_flight);
    }

    fn end(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// What a committed transaction left behind.
struct Committed {
    height: Height,
    hash: Hash,
    raw_log: String,
    events: Vec<IbcEvent>,
}

/// An in-memory chain hosting mock light clients.
///
/// Every transaction is executed atomically in a block of its own. Tests
/// drive the chain's applications through [`MockChain::send_packet`] and
/// inject faults to exercise the relayer's failure paths.
#[derive(Debug)]
pub struct MockChain {
    config: MockChainConfig,
    state: Mutex<ChainState>,
    faults: Mutex<Faults>,
    broadcasts: Mutex<Broadcasts>,
    tx_lock: tokio::sync::Mutex<()>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(MockChainConfig::default())
    }
}

impl MockChain {
    pub fn new(config: MockChainConfig) -> Self {
        let genesis = MockBlock::genesis(config.chain_id.revision_number(), config.genesis_time);
        let state = ChainState::new(
            config.chain_id.clone(),
            genesis,
            config.ports.iter().cloned().collect(),
        );

        Self {
            config,
            state: Mutex::new(state),
            faults: Mutex::new(Faults::default()),
            broadcasts: Mutex::new(Broadcasts::default()),
            tx_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MockChainConfig {
        &self.config
    }

    pub fn latest_height(&self) -> Height {
        self.state.lock().latest_block().height
    }

    pub fn latest_timestamp(&self) -> Timestamp {
        self.state.lock().latest_block().timestamp
    }

    /// Produces `n` empty blocks.
    pub fn advance_blocks(&self, n: u64) {
        let mut state = self.state.lock();
        for _ in 0..n {
            let block = state.latest_block().next(self.config.block_time);
            state.blocks.push(block);
        }
    }

    /// Sends one packet in a transaction of its own.
    pub fn send_packet(&self, packet: OutgoingPacket) -> Result<Packet, MockError> {
        first_sent(self.send_packets(vec![packet])?)
    }

    /// Sends all `packets` in a single transaction.
    pub fn send_packets(&self, packets: Vec<OutgoingPacket>) -> Result<Vec<Packet>, MockError> {
        let committed = self.execute_tx(packets.into_iter().map(Action::Send).collect())?;

        Ok(committed
            .events
            .into_iter()
            .filter_map(|event| match event {
                IbcEvent::SendPacket(e) => Some(e.packet),
                _ => None,
            })
            .collect())
    }

    /// The next `n` transactions containing a message of `type_url` are
    /// rejected.
    pub fn fail_next_msgs(&self, type_url: &str, n: u32) {
        self.faults.lock().failing_msgs.insert(type_url.to_string(), n);
    }

    /// The next `n` proof queries report the proof as not yet available.
    pub fn withhold_next_proofs(&self, n: u32) {
        self.faults.lock().withheld_proofs = n;
    }

    /// The next `n` tx searches and commit queries fail as if the node were
    /// unreachable.
    pub fn fail_next_queries(&self, n: u32) {
        self.faults.lock().failing_queries = n;
    }

    /// Proof queries served so far, including withheld ones.
    pub fn proof_queries(&self) -> u64 {
        self.faults.lock().proof_queries
    }

    pub fn connections_count(&self) -> usize {
        self.state.lock().connections_count()
    }

    /// Whether the commitment of a packet sent on `port_id/channel_id` is
    /// still stored.
    pub fn has_commitment(&self, port_id: &PortId, channel_id: &ChannelId, sequence: Sequence) -> bool {
        self.state
            .lock()
            .store
            .get(&Path::Commitment(port_id.clone(), channel_id.clone(), sequence))
            .is_some()
    }

    /// The most transactions this chain ever had in flight at once.
    pub fn peak_concurrent_broadcasts(&self) -> u32 {
        self.broadcasts.lock().peak
    }

    /// Transactions committed so far.
    pub fn tx_count(&self) -> usize {
        self.state.lock().txs.len()
    }

    fn execute_tx(&self, actions: Vec<Action>) -> Result<Committed, MockError> {
        if let Some(type_url) = self.faults.lock().take_msg_failure(&actions) {
            return Err(MockError::InjectedFailure { type_url });
        }

        let mut state = self.state.lock();
        let block = state.latest_block().next(self.config.block_time);
        let ctx = BlockCtx {
            height: block.height,
            timestamp: block.timestamp,
        };

        // executed on a copy, so that a failing message leaves no trace
        let mut next = state.clone();
        let mut logs = Vec::with_capacity(actions.len());
        let mut events = Vec::new();

        for (index, action) in actions.iter().enumerate() {
            let emitted = next.execute(ctx, action)?;

            let mut log_events = vec![self.message_event(action.name())];
            log_events.extend(emitted.iter().cloned().map(IbcEvent::into_string_event));

            logs.push(AbciMessageLog {
                msg_index: u32::try_from(index).unwrap_or(u32::MAX),
                log: String::new(),
                events: log_events,
            });
            events.extend(emitted);
        }

        let raw_log = to_raw_log(&logs);
        let hash = tx_hash(&self.config.chain_id, block.height, next.txs.len(), &raw_log);

        next.blocks.push(block);
        next.txs.push(TxRecord {
            hash,
            height: block.height,
            raw_log: raw_log.clone(),
            events: logs.into_iter().flat_map(|log| log.events).collect(),
        });
        *state = next;

        debug!(chain_id = %self.config.chain_id, height = %block.height, %hash, msgs = actions.len(), "committed transaction");

        Ok(Committed {
            height: block.height,
            hash,
            raw_log,
            events,
        })
    }

    fn message_event(&self, action: &str) -> StringEvent {
        let event = StringEvent::new(MESSAGE_EVENT).with_attribute(ACTION_ATTRIBUTE_KEY, action);
        let signer = self.config.signer.as_str();

        match self.config.sender_attribute {
            SenderAttribute::Sender => event.with_attribute(SENDER_ATTRIBUTE_KEY, signer),
            SenderAttribute::Signer => event.with_attribute(SIGNER_ATTRIBUTE_KEY, signer),
            SenderAttribute::Omitted => event,
        }
    }

    fn query_error(&self, e: MockError) -> RelayerError {
        match e {
            MockError::HeightUnavailable { requested, latest } => RelayerError::ProofNotYetAvailable {
                chain_id: self.config.chain_id.clone(),
                requested,
                latest,
            },
            e => RelayerError::query(&self.config.chain_id, e),
        }
    }

    fn check_query_fault(&self) -> Result<(), RelayerError> {
        if Faults::take(&mut self.faults.lock().failing_queries) {
            return Err(self.query_error(MockError::InjectedQueryFailure));
        }

        Ok(())
    }
}

fn first_sent(sent: Vec<Packet>) -> Result<Packet, MockError> {
    sent.into_iter().next().ok_or_else(|| MockError::MissingEvent {
        kind: "send_packet".to_string(),
    })
}

fn tx_hash(chain_id: &ChainId, height: Height, index: usize, raw_log: &str) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.as_str().as_bytes());
    hasher.update(height.revision_height().to_be_bytes());
    hasher.update(index.to_be_bytes());
    hasher.update(raw_log.as_bytes());

    Hash::Sha256(hasher.finalize().into())
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> ChainId {
        self.config.chain_id.clone()
    }

    fn signer(&self) -> Signer {
        self.config.signer.clone()
    }

    fn tx_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.tx_lock
    }

    async fn query_txs(&self, query: &TxQuery, page: Pagination) -> Result<TxSearchPage, RelayerError> {
        self.check_query_fault()?;

        let per_page = page.per_page.clamp(1, self.config.max_page_size.max(1));
        let offset = Pagination::new(page.page, per_page).offset();

        let state = self.state.lock();
        let matching: Vec<&TxRecord> = state
            .txs
            .iter()
            .filter(|tx| query.matches(tx.height.revision_height(), &tx.events))
            .collect();

        let total_count = u32::try_from(matching.len()).unwrap_or(u32::MAX);
        let txs = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|tx| TxResponse {
                hash: tx.hash,
                height: tx.height.revision_height(),
                raw_log: tx.raw_log.clone(),
            })
            .collect();

        Ok(TxSearchPage { txs, total_count })
    }

    async fn latest_commit(&self) -> Result<CommitInfo, RelayerError> {
        self.check_query_fault()?;

        let block = *self.state.lock().latest_block();
        Ok(CommitInfo {
            height: block.height,
            block_hash: block.hash,
            timestamp: block.timestamp,
        })
    }

    async fn query_proof(&self, path: &Path, height: Height) -> Result<ProvenValue, RelayerError> {
        {
            let mut faults = self.faults.lock();
            faults.proof_queries += 1;
            if Faults::take(&mut faults.withheld_proofs) {
                return Err(RelayerError::ProofNotYetAvailable {
                    chain_id: self.config.chain_id.clone(),
                    requested: height,
                    latest: self.latest_height(),
                });
            }
        }

        let (value, proof) = self
            .state
            .lock()
            .prove(path, height)
            .map_err(|e| self.query_error(e))?;

        Ok(ProvenValue {
            value,
            proof: proof.to_bytes().map_err(|e| self.query_error(e))?,
            height,
        })
    }

    async fn sign_and_broadcast(&self, msgs: Vec<Any>) -> Result<TxResult, RelayerError> {
        self.broadcasts.lock().begin();
        // lets other broadcasts start while this one is in flight
        tokio::task::yield_now().await;
        let executed = self.execute_tx(msgs.into_iter().map(Action::Deliver).collect());
        self.broadcasts.lock().end();

        match executed {
            Ok(committed) => Ok(TxResult {
                code: 0,
                height: committed.height,
                hash: committed.hash,
                raw_log: committed.raw_log,
                events: Vec::new(),
            }),
            Err(e) => {
                debug!(chain_id = %self.config.chain_id, error = %e, "rejected transaction");

                Ok(TxResult {
                    code: 1,
                    height: self.latest_height(),
                    hash: Hash::None,
                    raw_log: e.to_string(),
                    events: Vec::new(),
                })
            }
        }
    }

    async fn query_connection(&self, connection_id: &ConnectionId) -> Result<Option<ConnectionEnd>, RelayerError> {
        Ok(self.state.lock().find_connection(connection_id))
    }

    async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelEnd>, RelayerError> {
        Ok(self.state.lock().find_channel(port_id, channel_id))
    }

    async fn query_client_latest_height(&self, client_id: &ClientId) -> Result<Height, RelayerError> {
        self.state
            .lock()
            .client(client_id)
            .map(|client| client.client_state.latest_height)
            .map_err(|e| self.query_error(e))
    }

    async fn query_unreceived_packets(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError> {
        Ok(self
            .state
            .lock()
            .unreceived_packets(port_id, channel_id, sequences))
    }

    async fn query_unreceived_acks(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Result<Vec<Sequence>, RelayerError> {
        Ok(self.state.lock().unreceived_acks(port_id, channel_id, sequences))
    }

    async fn query_next_sequence_recv(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Sequence, RelayerError> {
        Ok(self.state.lock().next_sequence_recv(port_id, channel_id))
    }

    async fn build_client_payload(&self) -> Result<ClientPayload, RelayerError> {
        let block = *self.state.lock().latest_block();

        let client_state = MockClientState {
            chain_id: self.config.chain_id.clone(),
            latest_height: block.height,
        };

        Ok(ClientPayload {
            client_state: client_state.into(),
            consensus_state: MockConsensusState::from(block.header()).into(),
            height: block.height,
        })
    }

    async fn build_header(&self, target: Height) -> Result<Any, RelayerError> {
        let state = self.state.lock();
        let block = state.block_at(target).ok_or_else(|| {
            self.query_error(MockError::HeightUnavailable {
                requested: target,
                latest: state.latest_block().height,
            })
        })?;

        Ok(block.header().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejected_transactions_leave_no_block() {
        let chain = MockChain::default();
        let before = chain.latest_height();

        let result = chain
            .sign_and_broadcast(vec![Any {
                type_url: "/cosmos.bank.v1beta1.MsgSend".to_string(),
                value: Vec::new(),
            }])
            .await
            .expect("broadcast");

        assert!(!result.is_ok());
        assert!(result.raw_log.contains("unsupported message type"));
        assert_eq!(chain.latest_height(), before);
        assert_eq!(chain.tx_count(), 0);
    }

    #[tokio::test]
    async fn proofs_above_the_latest_height_are_not_yet_available() {
        let chain = MockChain::default();
        let path = Path::Connection(ConnectionId::new(0));

        let result = chain.query_proof(&path, chain.latest_height().increment()).await;

        assert!(matches!(result, Err(RelayerError::ProofNotYetAvailable { .. })));
        assert_eq!(chain.proof_queries(), 1);
    }

    #[test]
    fn a_send_without_event_is_an_error() {
        assert!(matches!(
            first_sent(Vec::new()),
            Err(MockError::MissingEvent { kind }) if kind == "send_packet"
        ));
    }

    #[tokio::test]
    async fn injected_query_failures_are_consumed() {
        let chain = MockChain::default();
        chain.fail_next_queries(1);

        assert!(matches!(chain.latest_commit().await, Err(RelayerError::ChainQuery { .. })));
        assert!(chain.latest_commit().await.is_ok());
    }

    #[test]
    fn sending_needs_an_open_channel() {
        let chain = MockChain::default();

        let result = chain.send_packet(OutgoingPacket::builder().channel_id(ChannelId::new(0)).build());

        assert!(matches!(result, Err(MockError::ChannelNotFound { .. })));
        assert_eq!(chain.tx_count(), 0);
    }
}
