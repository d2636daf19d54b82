//! The state of a mock chain and the execution of the messages it accepts.
//!
//! Handlers check what an IBC host would check: identifiers exist, ends are
//! in the expected state, counterparties agree, and proofs claim what the
//! message relies on at a height the light client trusts.

use core::time::Duration;
use std::collections::{BTreeMap, BTreeSet};

use ibc_relayer_types::acknowledgement::Acknowledgement;
use ibc_relayer_types::channel::{ChannelEnd, Order, State as ChannelState};
use ibc_relayer_types::connection::{ConnectionEnd, Counterparty, State as ConnectionState, Version};
use ibc_relayer_types::error::DecodingError;
use ibc_relayer_types::events::abci::StringEvent;
use ibc_relayer_types::events::{
    ChannelEvent, ClientEvent, ConnectionEvent, IbcEvent, PacketEvent, WriteAckEvent,
};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{
    ChainId, ChannelId, ClientId, ConnectionId, PortId, Sequence,
};
use ibc_relayer_types::msgs::*;
use ibc_relayer_types::packet::Packet;
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proto::channel::Channel as RawChannel;
use ibc_relayer_types::proto::client::Height as RawHeight;
use ibc_relayer_types::proto::connection::ConnectionEnd as RawConnectionEnd;
use ibc_relayer_types::proto::{Any, Message};
use ibc_relayer_types::timestamp::Timestamp;
use tendermint::Hash;

use super::block::MockBlock;
use super::error::MockError;
use super::mock::OutgoingPacket;
use super::store::{MockProof, VersionedStore};
use crate::clients::mock::{MockClientState, MockConsensusState, MockHeader, MOCK_CLIENT_TYPE};

/// The acknowledgement every mock application writes.
pub const SUCCESS_ACK: &[u8] = br#"{"result":"AQ=="}"#;

/// A light client hosted by a mock chain.
#[derive(Clone, Debug)]
pub(crate) struct HostedClient {
    pub client_state: MockClientState,
    pub consensus_states: BTreeMap<Height, MockConsensusState>,
}

/// A committed transaction as the tx search sees it.
#[derive(Clone, Debug)]
pub(crate) struct TxRecord {
    pub hash: Hash,
    pub height: Height,
    pub raw_log: String,
    pub events: Vec<StringEvent>,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ChannelSequences {
    pub send: Sequence,
    pub recv: Sequence,
    pub ack: Sequence,
}

impl Default for ChannelSequences {
    fn default() -> Self {
        Self {
            send: Sequence::from(1),
            recv: Sequence::from(1),
            ack: Sequence::from(1),
        }
    }
}

/// What one transaction does.
#[derive(Clone, Debug)]
pub(crate) enum Action {
    /// A message submitted by a relayer.
    Deliver(Any),
    /// A packet sent by an application.
    Send(OutgoingPacket),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Self::Deliver(any) => &any.type_url,
            Self::Send(_) => SEND_PACKET_ACTION,
        }
    }
}

pub const SEND_PACKET_ACTION: &str = "/ibc.mock.MsgSendPacket";

/// The block a transaction is executed in.
#[derive(Copy, Clone, Debug)]
pub(crate) struct BlockCtx {
    pub height: Height,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug)]
pub(crate) struct ChainState {
    pub chain_id: ChainId,
    pub blocks: Vec<MockBlock>,
    pub store: VersionedStore,
    pub txs: Vec<TxRecord>,
    pub bound_ports: BTreeSet<PortId>,
    clients: BTreeMap<ClientId, HostedClient>,
    connections: BTreeMap<ConnectionId, ConnectionEnd>,
    channels: BTreeMap<(PortId, ChannelId), ChannelEnd>,
    sequences: BTreeMap<(PortId, ChannelId), ChannelSequences>,
    client_counter: u64,
    connection_counter: u64,
    channel_counter: u64,
}

impl ChainState {
    pub fn new(chain_id: ChainId, genesis: MockBlock, bound_ports: BTreeSet<PortId>) -> Self {
        Self {
            chain_id,
            blocks: vec![genesis],
            store: VersionedStore::default(),
            txs: Vec::new(),
            bound_ports,
            clients: BTreeMap::new(),
            connections: BTreeMap::new(),
            channels: BTreeMap::new(),
            sequences: BTreeMap::new(),
            client_counter: 0,
            connection_counter: 0,
            channel_counter: 0,
        }
    }

    pub fn latest_block(&self) -> &MockBlock {
        self.blocks.last().expect("a chain has at least its genesis block")
    }

    pub fn block_at(&self, height: Height) -> Option<&MockBlock> {
        if height.revision_number() != self.chain_id.revision_number() {
            return None;
        }

        let index = usize::try_from(height.revision_height().checked_sub(1)?).ok()?;
        self.blocks.get(index)
    }

    pub fn connections_count(&self) -> usize {
        self.connections.len()
    }

    pub fn client(&self, client_id: &ClientId) -> Result<&HostedClient, MockError> {
        self.clients
            .get(client_id)
            .ok_or_else(|| MockError::ClientNotFound {
                client_id: client_id.clone(),
            })
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Result<&ConnectionEnd, MockError> {
        self.connections
            .get(connection_id)
            .ok_or_else(|| MockError::ConnectionNotFound {
                connection_id: connection_id.clone(),
            })
    }

    pub fn channel(&self, port_id: &PortId, channel_id: &ChannelId) -> Result<&ChannelEnd, MockError> {
        self.channels
            .get(&(port_id.clone(), channel_id.clone()))
            .ok_or_else(|| MockError::ChannelNotFound {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            })
    }

    pub fn find_connection(&self, connection_id: &ConnectionId) -> Option<ConnectionEnd> {
        self.connections.get(connection_id).cloned()
    }

    pub fn find_channel(&self, port_id: &PortId, channel_id: &ChannelId) -> Option<ChannelEnd> {
        self.channels
            .get(&(port_id.clone(), channel_id.clone()))
            .cloned()
    }

    fn sequences(&self, port_id: &PortId, channel_id: &ChannelId) -> ChannelSequences {
        self.sequences
            .get(&(port_id.clone(), channel_id.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn next_sequence_recv(&self, port_id: &PortId, channel_id: &ChannelId) -> Sequence {
        self.sequences(port_id, channel_id).recv
    }

    /// The value under `path` as of `height`, with its proof.
    pub fn prove(&self, path: &Path, height: Height) -> Result<(Option<Vec<u8>>, MockProof), MockError> {
        let latest = self.latest_block().height;
        if height > latest {
            return Err(MockError::HeightUnavailable {
                requested: height,
                latest,
            });
        }

        let value = self.store.get_at(path, height).map(<[u8]>::to_vec);
        let proof = MockProof::new(&self.chain_id, path, height, value.clone());

        Ok((value, proof))
    }

    /// The subset of `sequences` not yet received on the channel.
    pub fn unreceived_packets(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Vec<Sequence> {
        let ordered = self
            .find_channel(port_id, channel_id)
            .map_or(false, |end| end.ordering == Order::Ordered);
        let next_recv = self.next_sequence_recv(port_id, channel_id);

        sequences
            .iter()
            .copied()
            .filter(|seq| {
                if ordered {
                    *seq >= next_recv
                } else {
                    self.store
                        .get(&Path::Receipt(port_id.clone(), channel_id.clone(), *seq))
                        .is_none()
                }
            })
            .collect()
    }

    /// The subset of `sequences` whose packet commitment is still stored.
    pub fn unreceived_acks(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequences: &[Sequence],
    ) -> Vec<Sequence> {
        sequences
            .iter()
            .copied()
            .filter(|seq| {
                self.store
                    .get(&Path::Commitment(port_id.clone(), channel_id.clone(), *seq))
                    .is_some()
            })
            .collect()
    }

    /// Runs one action in the block `ctx`, returning the events it emits.
    pub fn execute(&mut self, ctx: BlockCtx, action: &Action) -> Result<Vec<IbcEvent>, MockError> {
        match action {
            Action::Send(packet) => self.send_packet(ctx, packet).map(|event| vec![event]),
            Action::Deliver(any) => self.deliver(ctx, any),
        }
    }

    fn deliver(&mut self, ctx: BlockCtx, any: &Any) -> Result<Vec<IbcEvent>, MockError> {
        let single = |event: IbcEvent| vec![event];

        match any.type_url.as_str() {
            CREATE_CLIENT_TYPE_URL => self
                .create_client(ctx, decode_any(any, CREATE_CLIENT_TYPE_URL)?)
                .map(single),
            UPDATE_CLIENT_TYPE_URL => self
                .update_client(ctx, decode_any(any, UPDATE_CLIENT_TYPE_URL)?)
                .map(single),
            CONN_OPEN_INIT_TYPE_URL => self
                .conn_open_init(ctx, decode_any(any, CONN_OPEN_INIT_TYPE_URL)?)
                .map(single),
            CONN_OPEN_TRY_TYPE_URL => self
                .conn_open_try(ctx, decode_any(any, CONN_OPEN_TRY_TYPE_URL)?)
                .map(single),
            CONN_OPEN_ACK_TYPE_URL => self
                .conn_open_ack(ctx, decode_any(any, CONN_OPEN_ACK_TYPE_URL)?)
                .map(single),
            CONN_OPEN_CONFIRM_TYPE_URL => self
                .conn_open_confirm(ctx, decode_any(any, CONN_OPEN_CONFIRM_TYPE_URL)?)
                .map(single),
            CHAN_OPEN_INIT_TYPE_URL => self
                .chan_open_init(ctx, decode_any(any, CHAN_OPEN_INIT_TYPE_URL)?)
                .map(single),
            CHAN_OPEN_TRY_TYPE_URL => self
                .chan_open_try(ctx, decode_any(any, CHAN_OPEN_TRY_TYPE_URL)?)
                .map(single),
            CHAN_OPEN_ACK_TYPE_URL => self
                .chan_open_ack(ctx, decode_any(any, CHAN_OPEN_ACK_TYPE_URL)?)
                .map(single),
            CHAN_OPEN_CONFIRM_TYPE_URL => self
                .chan_open_confirm(ctx, decode_any(any, CHAN_OPEN_CONFIRM_TYPE_URL)?)
                .map(single),
            RECV_PACKET_TYPE_URL => self.recv_packet(ctx, decode_any(any, RECV_PACKET_TYPE_URL)?),
            ACKNOWLEDGEMENT_TYPE_URL => self
                .acknowledge_packet(ctx, decode_any(any, ACKNOWLEDGEMENT_TYPE_URL)?)
                .map(single),
            TIMEOUT_TYPE_URL => self
                .timeout_packet(ctx, decode_any(any, TIMEOUT_TYPE_URL)?)
                .map(single),
            type_url => Err(MockError::UnknownMessage {
                type_url: type_url.to_string(),
            }),
        }
    }

    fn create_client(&mut self, ctx: BlockCtx, msg: RawMsgCreateClient) -> Result<IbcEvent, MockError> {
        let client_state = MockClientState::try_from(
            msg.client_state
                .ok_or_else(|| DecodingError::missing_raw_data("client state"))?,
        )?;
        let consensus_state = MockConsensusState::try_from(
            msg.consensus_state
                .ok_or_else(|| DecodingError::missing_raw_data("consensus state"))?,
        )?;

        let client_id = ClientId::new(MOCK_CLIENT_TYPE, self.client_counter)?;
        self.client_counter += 1;

        let height = client_state.latest_height;
        self.put_client(
            ctx,
            &client_id,
            HostedClient {
                client_state,
                consensus_states: BTreeMap::new(),
            },
        );
        self.put_consensus_state(ctx, &client_id, height, consensus_state);

        Ok(IbcEvent::CreateClient(ClientEvent { client_id }))
    }

    fn update_client(&mut self, ctx: BlockCtx, msg: RawMsgUpdateClient) -> Result<IbcEvent, MockError> {
        let client_id: ClientId = msg.client_id.parse()?;
        let header = MockHeader::try_from(
            msg.client_message
                .ok_or_else(|| DecodingError::missing_raw_data("client message"))?,
        )?;

        let mut client = self.client(&client_id)?.clone();
        let latest = client.client_state.latest_height;
        if header.height <= latest {
            return Err(MockError::StaleHeader {
                client_id,
                height: header.height,
                latest,
            });
        }

        client.client_state = client.client_state.with_latest_height(header.height);
        self.put_client(ctx, &client_id, client);
        self.put_consensus_state(ctx, &client_id, header.height, header.into());

        Ok(IbcEvent::UpdateClient(ClientEvent { client_id }))
    }

    fn conn_open_init(
        &mut self,
        ctx: BlockCtx,
        msg: RawMsgConnectionOpenInit,
    ) -> Result<IbcEvent, MockError> {
        let client_id: ClientId = msg.client_id.parse()?;
        self.client(&client_id)?;

        let counterparty: Counterparty = msg
            .counterparty
            .ok_or_else(|| DecodingError::missing_raw_data("connection counterparty"))?
            .try_into()?;

        let conn_end = ConnectionEnd {
            state: ConnectionState::Init,
            client_id: client_id.clone(),
            counterparty,
            versions: vec![msg.version.map(Version::from).unwrap_or_default()],
            delay_period: Duration::from_nanos(msg.delay_period),
        };

        let connection_id = self.next_connection_id();
        let event = connection_event(&connection_id, &conn_end);
        self.put_connection(ctx, &connection_id, conn_end);

        Ok(IbcEvent::OpenInitConnection(event))
    }

    fn conn_open_try(&mut self, ctx: BlockCtx, msg: RawMsgConnectionOpenTry) -> Result<IbcEvent, MockError> {
        let client_id: ClientId = msg.client_id.parse()?;
        let counterparty: Counterparty = msg
            .counterparty
            .ok_or_else(|| DecodingError::missing_raw_data("connection counterparty"))?
            .try_into()?;
        let conn_id_on_a = counterparty
            .connection_id
            .clone()
            .ok_or_else(|| MockError::mismatch("counterparty connection identifier is missing"))?;

        let proof_height = height_of(msg.proof_height, "proof height")?;
        let consensus_height = height_of(msg.consensus_height, "consensus height")?;

        let conn_end_on_a = self.verify_connection(&client_id, &msg.proof_init, proof_height, &conn_id_on_a)?;
        expect_connection_state(&conn_id_on_a, &conn_end_on_a, ConnectionState::Init)?;
        if conn_end_on_a.client_id != counterparty.client_id
            || conn_end_on_a.counterparty.client_id != client_id
        {
            return Err(MockError::mismatch(format!(
                "connection `{conn_id_on_a}` does not link clients `{}` and `{client_id}`",
                counterparty.client_id
            )));
        }

        self.verify_self_client(
            &client_id,
            &counterparty.client_id,
            msg.client_state,
            (msg.proof_client.as_slice(), msg.proof_consensus.as_slice()),
            proof_height,
            consensus_height,
        )?;

        let version = msg
            .counterparty_versions
            .into_iter()
            .next()
            .map(Version::from)
            .unwrap_or_default();

        let conn_end = ConnectionEnd {
            state: ConnectionState::TryOpen,
            client_id,
            counterparty,
            versions: vec![version],
            delay_period: Duration::from_nanos(msg.delay_period),
        };

        let connection_id = self.next_connection_id();
        let event = connection_event(&connection_id, &conn_end);
        self.put_connection(ctx, &connection_id, conn_end);

        Ok(IbcEvent::OpenTryConnection(event))
    }

    fn conn_open_ack(&mut self, ctx: BlockCtx, msg: RawMsgConnectionOpenAck) -> Result<IbcEvent, MockError> {
        let connection_id: ConnectionId = msg.connection_id.parse()?;
        let conn_id_on_b: ConnectionId = msg.counterparty_connection_id.parse()?;
        let mut conn_end = self.connection(&connection_id)?.clone();
        expect_connection_state(&connection_id, &conn_end, ConnectionState::Init)?;

        let proof_height = height_of(msg.proof_height, "proof height")?;
        let consensus_height = height_of(msg.consensus_height, "consensus height")?;

        let conn_end_on_b =
            self.verify_connection(&conn_end.client_id, &msg.proof_try, proof_height, &conn_id_on_b)?;
        expect_connection_state(&conn_id_on_b, &conn_end_on_b, ConnectionState::TryOpen)?;
        if conn_end_on_b.counterparty.connection_id.as_ref() != Some(&connection_id)
            || conn_end_on_b.client_id != conn_end.counterparty.client_id
        {
            return Err(MockError::mismatch(format!(
                "connection `{conn_id_on_b}` does not point back to `{connection_id}`"
            )));
        }

        self.verify_self_client(
            &conn_end.client_id,
            &conn_end.counterparty.client_id,
            msg.client_state,
            (msg.proof_client.as_slice(), msg.proof_consensus.as_slice()),
            proof_height,
            consensus_height,
        )?;

        conn_end.state = ConnectionState::Open;
        conn_end.counterparty.connection_id = Some(conn_id_on_b);
        if let Some(version) = msg.version {
            conn_end.versions = vec![version.into()];
        }

        let event = connection_event(&connection_id, &conn_end);
        self.put_connection(ctx, &connection_id, conn_end);

        Ok(IbcEvent::OpenAckConnection(event))
    }

    fn conn_open_confirm(
        &mut self,
        ctx: BlockCtx,
        msg: RawMsgConnectionOpenConfirm,
    ) -> Result<IbcEvent, MockError> {
        let connection_id: ConnectionId = msg.connection_id.parse()?;
        let mut conn_end = self.connection(&connection_id)?.clone();
        expect_connection_state(&connection_id, &conn_end, ConnectionState::TryOpen)?;

        let conn_id_on_a = conn_end
            .counterparty
            .connection_id
            .clone()
            .ok_or_else(|| MockError::mismatch("counterparty connection identifier is missing"))?;
        let proof_height = height_of(msg.proof_height, "proof height")?;

        let conn_end_on_a =
            self.verify_connection(&conn_end.client_id, &msg.proof_ack, proof_height, &conn_id_on_a)?;
        expect_connection_state(&conn_id_on_a, &conn_end_on_a, ConnectionState::Open)?;
        if conn_end_on_a.counterparty.connection_id.as_ref() != Some(&connection_id) {
            return Err(MockError::mismatch(format!(
                "connection `{conn_id_on_a}` does not point back to `{connection_id}`"
            )));
        }

        conn_end.state = ConnectionState::Open;
        let event = connection_event(&connection_id, &conn_end);
        self.put_connection(ctx, &connection_id, conn_end);

        Ok(IbcEvent::OpenConfirmConnection(event))
    }

    fn chan_open_init(&mut self, ctx: BlockCtx, msg: RawMsgChannelOpenInit) -> Result<IbcEvent, MockError> {
        let port_id = self.bound_port(&msg.port_id)?;
        let mut chan_end = ChannelEnd::try_from(
            msg.channel
                .ok_or_else(|| DecodingError::missing_raw_data("channel end"))?,
        )?;
        let connection_id = single_hop(&chan_end)?;
        self.connection(&connection_id)?;

        chan_end.state = ChannelState::Init;
        chan_end.remote.channel_id = None;

        let channel_id = self.next_channel_id();
        let event = channel_event(&port_id, &channel_id, &chan_end, connection_id);
        self.put_channel(ctx, &port_id, &channel_id, chan_end);

        Ok(IbcEvent::OpenInitChannel(event))
    }

    fn chan_open_try(&mut self, ctx: BlockCtx, msg: RawMsgChannelOpenTry) -> Result<IbcEvent, MockError> {
        let port_id = self.bound_port(&msg.port_id)?;
        let mut chan_end = ChannelEnd::try_from(
            msg.channel
                .ok_or_else(|| DecodingError::missing_raw_data("channel end"))?,
        )?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;

        let chan_id_on_a = chan_end
            .remote
            .channel_id
            .clone()
            .ok_or_else(|| MockError::mismatch("counterparty channel identifier is missing"))?;
        let proof_height = height_of(msg.proof_height, "proof height")?;

        let chan_end_on_a = self.verify_channel(
            &conn_end.client_id,
            &msg.proof_init,
            proof_height,
            &chan_end.remote.port_id,
            &chan_id_on_a,
        )?;
        expect_channel_state(&chan_id_on_a, &chan_end_on_a, ChannelState::Init)?;
        if chan_end_on_a.ordering != chan_end.ordering
            || chan_end_on_a.remote.port_id != port_id
            || chan_end_on_a.connection_hops.first() != conn_end.counterparty.connection_id.as_ref()
        {
            return Err(MockError::mismatch(format!(
                "channel `{}/{chan_id_on_a}` does not match the proposed end",
                chan_end.remote.port_id
            )));
        }

        chan_end.state = ChannelState::TryOpen;
        chan_end.version = msg.counterparty_version;

        let channel_id = self.next_channel_id();
        let event = channel_event(&port_id, &channel_id, &chan_end, connection_id);
        self.put_channel(ctx, &port_id, &channel_id, chan_end);

        Ok(IbcEvent::OpenTryChannel(event))
    }

    fn chan_open_ack(&mut self, ctx: BlockCtx, msg: RawMsgChannelOpenAck) -> Result<IbcEvent, MockError> {
        let port_id: PortId = msg.port_id.parse()?;
        let channel_id: ChannelId = msg.channel_id.parse()?;
        let chan_id_on_b: ChannelId = msg.counterparty_channel_id.parse()?;

        let mut chan_end = self.channel(&port_id, &channel_id)?.clone();
        expect_channel_state(&channel_id, &chan_end, ChannelState::Init)?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;
        let proof_height = height_of(msg.proof_height, "proof height")?;

        let chan_end_on_b = self.verify_channel(
            &conn_end.client_id,
            &msg.proof_try,
            proof_height,
            &chan_end.remote.port_id,
            &chan_id_on_b,
        )?;
        expect_channel_state(&chan_id_on_b, &chan_end_on_b, ChannelState::TryOpen)?;
        if chan_end_on_b.remote.channel_id.as_ref() != Some(&channel_id)
            || chan_end_on_b.remote.port_id != port_id
        {
            return Err(MockError::mismatch(format!(
                "channel `{}/{chan_id_on_b}` does not point back to `{port_id}/{channel_id}`",
                chan_end.remote.port_id
            )));
        }

        chan_end.state = ChannelState::Open;
        chan_end.remote.channel_id = Some(chan_id_on_b);
        chan_end.version = msg.counterparty_version;

        let event = channel_event(&port_id, &channel_id, &chan_end, connection_id);
        self.put_channel(ctx, &port_id, &channel_id, chan_end);

        Ok(IbcEvent::OpenAckChannel(event))
    }

    fn chan_open_confirm(
        &mut self,
        ctx: BlockCtx,
        msg: RawMsgChannelOpenConfirm,
    ) -> Result<IbcEvent, MockError> {
        let port_id: PortId = msg.port_id.parse()?;
        let channel_id: ChannelId = msg.channel_id.parse()?;

        let mut chan_end = self.channel(&port_id, &channel_id)?.clone();
        expect_channel_state(&channel_id, &chan_end, ChannelState::TryOpen)?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;

        let chan_id_on_a = chan_end
            .remote
            .channel_id
            .clone()
            .ok_or_else(|| MockError::mismatch("counterparty channel identifier is missing"))?;
        let proof_height = height_of(msg.proof_height, "proof height")?;

        let chan_end_on_a = self.verify_channel(
            &conn_end.client_id,
            &msg.proof_ack,
            proof_height,
            &chan_end.remote.port_id,
            &chan_id_on_a,
        )?;
        expect_channel_state(&chan_id_on_a, &chan_end_on_a, ChannelState::Open)?;
        if chan_end_on_a.remote.channel_id.as_ref() != Some(&channel_id) {
            return Err(MockError::mismatch(format!(
                "channel `{}/{chan_id_on_a}` does not point back to `{port_id}/{channel_id}`",
                chan_end.remote.port_id
            )));
        }

        chan_end.state = ChannelState::Open;
        let event = channel_event(&port_id, &channel_id, &chan_end, connection_id);
        self.put_channel(ctx, &port_id, &channel_id, chan_end);

        Ok(IbcEvent::OpenConfirmChannel(event))
    }

    fn send_packet(&mut self, ctx: BlockCtx, outgoing: &OutgoingPacket) -> Result<IbcEvent, MockError> {
        let chan_end = self.channel(&outgoing.port_id, &outgoing.channel_id)?.clone();
        expect_channel_state(&outgoing.channel_id, &chan_end, ChannelState::Open)?;
        let connection_id = single_hop(&chan_end)?;

        let chan_id_on_b = chan_end
            .remote
            .channel_id
            .clone()
            .ok_or_else(|| MockError::mismatch("counterparty channel identifier is missing"))?;

        let mut sequences = self.sequences(&outgoing.port_id, &outgoing.channel_id);
        let packet = Packet {
            seq_on_a: sequences.send,
            port_id_on_a: outgoing.port_id.clone(),
            chan_id_on_a: outgoing.channel_id.clone(),
            port_id_on_b: chan_end.remote.port_id.clone(),
            chan_id_on_b,
            data: outgoing.data.clone(),
            timeout_height_on_b: outgoing.timeout_height,
            timeout_timestamp_on_b: outgoing.timeout_timestamp,
        };

        sequences.send = sequences.send.increment();
        self.sequences
            .insert((outgoing.port_id.clone(), outgoing.channel_id.clone()), sequences);

        self.store.set(
            &Path::Commitment(
                packet.port_id_on_a.clone(),
                packet.chan_id_on_a.clone(),
                packet.seq_on_a,
            ),
            ctx.height,
            packet.commitment().into_vec(),
        );

        Ok(IbcEvent::SendPacket(PacketEvent {
            packet,
            ordering: chan_end.ordering,
            connection_id,
        }))
    }

    fn recv_packet(&mut self, ctx: BlockCtx, msg: RawMsgRecvPacket) -> Result<Vec<IbcEvent>, MockError> {
        let packet = Packet::try_from(
            msg.packet
                .ok_or_else(|| DecodingError::missing_raw_data("packet"))?,
        )?;
        let (port_id, channel_id) = (packet.port_id_on_b.clone(), packet.chan_id_on_b.clone());

        let chan_end = self.channel(&port_id, &channel_id)?.clone();
        expect_channel_state(&channel_id, &chan_end, ChannelState::Open)?;
        expect_remote(&chan_end, &packet.port_id_on_a, &packet.chan_id_on_a)?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;

        let proof_height = height_of(msg.proof_height, "proof height")?;
        self.verify_value(
            &conn_end.client_id,
            &msg.proof_commitment,
            proof_height,
            &Path::Commitment(
                packet.port_id_on_a.clone(),
                packet.chan_id_on_a.clone(),
                packet.seq_on_a,
            ),
            packet.commitment().as_ref(),
        )?;

        if packet.timed_out(&ctx.timestamp, ctx.height) {
            return Err(MockError::PacketTimedOut {
                sequence: packet.seq_on_a,
            });
        }

        let mut sequences = self.sequences(&port_id, &channel_id);
        match chan_end.ordering {
            Order::Ordered => {
                if packet.seq_on_a != sequences.recv {
                    return Err(MockError::OutOfOrder {
                        expected: sequences.recv,
                        actual: packet.seq_on_a,
                    });
                }

                sequences.recv = sequences.recv.increment();
                self.sequences
                    .insert((port_id.clone(), channel_id.clone()), sequences);
                self.store.set(
                    &Path::SeqRecv(port_id.clone(), channel_id.clone()),
                    ctx.height,
                    sequences.recv.value().to_be_bytes().to_vec(),
                );
            }
            Order::Unordered => {
                let receipt = Path::Receipt(port_id.clone(), channel_id.clone(), packet.seq_on_a);
                if self.store.get(&receipt).is_some() {
                    return Err(MockError::PacketAlreadyReceived {
                        sequence: packet.seq_on_a,
                    });
                }

                self.store.set(&receipt, ctx.height, vec![1]);
            }
        }

        let acknowledgement = Acknowledgement::try_from(SUCCESS_ACK.to_vec())?;
        self.store.set(
            &Path::Ack(port_id, channel_id, packet.seq_on_a),
            ctx.height,
            acknowledgement.commitment().into_vec(),
        );

        Ok(vec![
            IbcEvent::ReceivePacket(PacketEvent {
                packet: packet.clone(),
                ordering: chan_end.ordering,
                connection_id: connection_id.clone(),
            }),
            IbcEvent::WriteAcknowledgement(WriteAckEvent {
                packet,
                acknowledgement,
                connection_id,
            }),
        ])
    }

    fn acknowledge_packet(
        &mut self,
        ctx: BlockCtx,
        msg: RawMsgAcknowledgement,
    ) -> Result<IbcEvent, MockError> {
        let packet = Packet::try_from(
            msg.packet
                .ok_or_else(|| DecodingError::missing_raw_data("packet"))?,
        )?;
        let (port_id, channel_id) = (packet.port_id_on_a.clone(), packet.chan_id_on_a.clone());

        let chan_end = self.channel(&port_id, &channel_id)?.clone();
        expect_channel_state(&channel_id, &chan_end, ChannelState::Open)?;
        expect_remote(&chan_end, &packet.port_id_on_b, &packet.chan_id_on_b)?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;

        let commitment = Path::Commitment(port_id.clone(), channel_id.clone(), packet.seq_on_a);
        self.expect_commitment(&commitment, &packet)?;

        let acknowledgement = Acknowledgement::try_from(msg.acknowledgement)?;
        let proof_height = height_of(msg.proof_height, "proof height")?;
        self.verify_value(
            &conn_end.client_id,
            &msg.proof_acked,
            proof_height,
            &Path::Ack(
                packet.port_id_on_b.clone(),
                packet.chan_id_on_b.clone(),
                packet.seq_on_a,
            ),
            acknowledgement.commitment().as_ref(),
        )?;

        if chan_end.ordering == Order::Ordered {
            let mut sequences = self.sequences(&port_id, &channel_id);
            if packet.seq_on_a != sequences.ack {
                return Err(MockError::OutOfOrder {
                    expected: sequences.ack,
                    actual: packet.seq_on_a,
                });
            }

            sequences.ack = sequences.ack.increment();
            self.sequences.insert((port_id, channel_id), sequences);
        }

        self.store.delete(&commitment, ctx.height);

        Ok(IbcEvent::AcknowledgePacket(PacketEvent {
            packet,
            ordering: chan_end.ordering,
            connection_id,
        }))
    }

    fn timeout_packet(&mut self, ctx: BlockCtx, msg: RawMsgTimeout) -> Result<IbcEvent, MockError> {
        let packet = Packet::try_from(
            msg.packet
                .ok_or_else(|| DecodingError::missing_raw_data("packet"))?,
        )?;
        let (port_id, channel_id) = (packet.port_id_on_a.clone(), packet.chan_id_on_a.clone());

        let mut chan_end = self.channel(&port_id, &channel_id)?.clone();
        expect_channel_state(&channel_id, &chan_end, ChannelState::Open)?;
        expect_remote(&chan_end, &packet.port_id_on_b, &packet.chan_id_on_b)?;
        let connection_id = single_hop(&chan_end)?;
        let conn_end = self.open_connection(&connection_id)?;

        let commitment = Path::Commitment(port_id.clone(), channel_id.clone(), packet.seq_on_a);
        self.expect_commitment(&commitment, &packet)?;

        let proof_height = height_of(msg.proof_height, "proof height")?;
        let consensus_state = self.consensus_state(&conn_end.client_id, proof_height)?;
        if !packet.timed_out(&consensus_state.timestamp, proof_height) {
            return Err(MockError::PacketNotTimedOut {
                sequence: packet.seq_on_a,
            });
        }

        let (port_id_on_b, chan_id_on_b) = (packet.port_id_on_b.clone(), packet.chan_id_on_b.clone());
        match chan_end.ordering {
            Order::Ordered => {
                let next_seq_recv = Sequence::from(msg.next_sequence_recv);
                if packet.seq_on_a < next_seq_recv {
                    return Err(MockError::PacketAlreadyReceived {
                        sequence: packet.seq_on_a,
                    });
                }

                self.verify_value(
                    &conn_end.client_id,
                    &msg.proof_unreceived,
                    proof_height,
                    &Path::SeqRecv(port_id_on_b, chan_id_on_b),
                    &msg.next_sequence_recv.to_be_bytes(),
                )?;

                chan_end.state = ChannelState::Closed;
                self.put_channel(ctx, &port_id, &channel_id, chan_end.clone());
            }
            Order::Unordered => {
                self.verify_absence(
                    &conn_end.client_id,
                    &msg.proof_unreceived,
                    proof_height,
                    &Path::Receipt(port_id_on_b, chan_id_on_b, packet.seq_on_a),
                )?;
            }
        }

        self.store.delete(&commitment, ctx.height);

        Ok(IbcEvent::TimeoutPacket(PacketEvent {
            packet,
            ordering: chan_end.ordering,
            connection_id,
        }))
    }

    fn bound_port(&self, port_id: &str) -> Result<PortId, MockError> {
        let port_id: PortId = port_id.parse()?;
        if self.bound_ports.contains(&port_id) {
            Ok(port_id)
        } else {
            Err(MockError::PortNotBound { port_id })
        }
    }

    fn open_connection(&self, connection_id: &ConnectionId) -> Result<ConnectionEnd, MockError> {
        let conn_end = self.connection(connection_id)?.clone();
        expect_connection_state(connection_id, &conn_end, ConnectionState::Open)?;
        Ok(conn_end)
    }

    fn consensus_state(&self, client_id: &ClientId, height: Height) -> Result<&MockConsensusState, MockError> {
        let client = self.client(client_id)?;

        client
            .consensus_states
            .get(&height)
            .filter(|_| height <= client.client_state.latest_height)
            .ok_or_else(|| MockError::MissingConsensusState {
                client_id: client_id.clone(),
                height,
            })
    }

    fn expect_commitment(&self, path: &Path, packet: &Packet) -> Result<(), MockError> {
        match self.store.get(path) {
            Some(stored) if stored == packet.commitment().as_ref() => Ok(()),
            _ => Err(MockError::MissingCommitment {
                sequence: packet.seq_on_a,
            }),
        }
    }

    /// Checks that `proof` is a claim about `path` made by the chain the
    /// client tracks, at a height the client trusts. Returns the claimed
    /// value.
    fn verify(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        path: &Path,
    ) -> Result<Option<Vec<u8>>, MockError> {
        self.consensus_state(client_id, proof_height)?;
        let tracked = &self.client(client_id)?.client_state.chain_id;

        let proof = MockProof::from_bytes(path, proof)?;
        let invalid = |description: String| MockError::InvalidProof {
            path: path.to_string(),
            description,
        };

        if proof.chain_id != tracked.as_str() {
            return Err(invalid(format!(
                "proof from chain `{}`, client tracks `{tracked}`",
                proof.chain_id
            )));
        }
        if proof.height != proof_height {
            return Err(invalid(format!(
                "proof at height `{}`, message claims `{proof_height}`",
                proof.height
            )));
        }
        if proof.path != path.to_string() {
            return Err(invalid(format!("proof is for `{}`", proof.path)));
        }

        Ok(proof.value)
    }

    fn verify_value(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        path: &Path,
        expected: &[u8],
    ) -> Result<(), MockError> {
        match self.verify(client_id, proof, proof_height, path)? {
            Some(value) if value == expected => Ok(()),
            Some(_) => Err(MockError::InvalidProof {
                path: path.to_string(),
                description: "proven value differs from the expected one".to_string(),
            }),
            None => Err(MockError::InvalidProof {
                path: path.to_string(),
                description: "proof of absence where a value was expected".to_string(),
            }),
        }
    }

    fn verify_absence(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        path: &Path,
    ) -> Result<(), MockError> {
        match self.verify(client_id, proof, proof_height, path)? {
            None => Ok(()),
            Some(_) => Err(MockError::InvalidProof {
                path: path.to_string(),
                description: "value present where absence was expected".to_string(),
            }),
        }
    }

    fn verify_present(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        path: &Path,
    ) -> Result<Vec<u8>, MockError> {
        self.verify(client_id, proof, proof_height, path)?
            .ok_or_else(|| MockError::InvalidProof {
                path: path.to_string(),
                description: "proof of absence where a value was expected".to_string(),
            })
    }

    fn verify_connection(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        connection_id: &ConnectionId,
    ) -> Result<ConnectionEnd, MockError> {
        let path = Path::Connection(connection_id.clone());
        let value = self.verify_present(client_id, proof, proof_height, &path)?;

        Ok(RawConnectionEnd::decode(value.as_slice())?.try_into()?)
    }

    fn verify_channel(
        &self,
        client_id: &ClientId,
        proof: &[u8],
        proof_height: Height,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<ChannelEnd, MockError> {
        let path = Path::ChannelEnd(port_id.clone(), channel_id.clone());
        let value = self.verify_present(client_id, proof, proof_height, &path)?;

        Ok(RawChannel::decode(value.as_slice())?.try_into()?)
    }

    /// Checks the counterparty's client of this chain: it must track this
    /// chain at a height this chain has reached, and the counterparty must
    /// prove both it and the consensus state at `consensus_height`.
    fn verify_self_client(
        &self,
        client_id: &ClientId,
        counterparty_client_id: &ClientId,
        client_state: Option<Any>,
        (proof_client, proof_consensus): (&[u8], &[u8]),
        proof_height: Height,
        consensus_height: Height,
    ) -> Result<(), MockError> {
        let any = client_state.ok_or_else(|| DecodingError::missing_raw_data("client state"))?;
        self.verify_value(
            client_id,
            proof_client,
            proof_height,
            &Path::ClientState(counterparty_client_id.clone()),
            &any.encode_to_vec(),
        )?;

        let self_client = MockClientState::try_from(any)?;
        let latest = self.latest_block().height;
        if self_client.chain_id != self.chain_id {
            return Err(MockError::InvalidClientState {
                description: format!(
                    "client tracks `{}`, not `{}`",
                    self_client.chain_id, self.chain_id
                ),
            });
        }
        if self_client.latest_height > latest || consensus_height > latest {
            return Err(MockError::InvalidClientState {
                description: format!("client is ahead of the latest height `{latest}`"),
            });
        }

        self.verify_present(
            client_id,
            proof_consensus,
            proof_height,
            &Path::ClientConsensusState(counterparty_client_id.clone(), consensus_height),
        )?;

        Ok(())
    }

    fn put_client(&mut self, ctx: BlockCtx, client_id: &ClientId, client: HostedClient) {
        self.store.set(
            &Path::ClientState(client_id.clone()),
            ctx.height,
            Any::from(client.client_state.clone()).encode_to_vec(),
        );
        self.clients.insert(client_id.clone(), client);
    }

    fn put_consensus_state(
        &mut self,
        ctx: BlockCtx,
        client_id: &ClientId,
        height: Height,
        consensus_state: MockConsensusState,
    ) {
        self.store.set(
            &Path::ClientConsensusState(client_id.clone(), height),
            ctx.height,
            Any::from(consensus_state.clone()).encode_to_vec(),
        );
        if let Some(client) = self.clients.get_mut(client_id) {
            client.consensus_states.insert(height, consensus_state);
        }
    }

    fn put_connection(&mut self, ctx: BlockCtx, connection_id: &ConnectionId, conn_end: ConnectionEnd) {
        self.store.set(
            &Path::Connection(connection_id.clone()),
            ctx.height,
            RawConnectionEnd::from(conn_end.clone()).encode_to_vec(),
        );
        self.connections.insert(connection_id.clone(), conn_end);
    }

    fn put_channel(
        &mut self,
        ctx: BlockCtx,
        port_id: &PortId,
        channel_id: &ChannelId,
        chan_end: ChannelEnd,
    ) {
        let key = (port_id.clone(), channel_id.clone());

        if !self.sequences.contains_key(&key) {
            let sequences = ChannelSequences::default();
            self.store.set(
                &Path::SeqRecv(port_id.clone(), channel_id.clone()),
                ctx.height,
                sequences.recv.value().to_be_bytes().to_vec(),
            );
            self.sequences.insert(key.clone(), sequences);
        }

        self.store.set(
            &Path::ChannelEnd(port_id.clone(), channel_id.clone()),
            ctx.height,
            RawChannel::from(chan_end.clone()).encode_to_vec(),
        );
        self.channels.insert(key, chan_end);
    }

    fn next_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.connection_counter);
        self.connection_counter += 1;
        id
    }

    fn next_channel_id(&mut self) -> ChannelId {
        let id = ChannelId::new(self.channel_counter);
        self.channel_counter += 1;
        id
    }
}

fn height_of(raw: Option<RawHeight>, what: &str) -> Result<Height, MockError> {
    Ok(raw
        .ok_or_else(|| DecodingError::missing_raw_data(what))?
        .try_into()?)
}

fn single_hop(chan_end: &ChannelEnd) -> Result<ConnectionId, MockError> {
    match chan_end.connection_hops.as_slice() {
        [hop] => Ok(hop.clone()),
        hops => Err(MockError::mismatch(format!(
            "channels need exactly one connection hop, got {}",
            hops.len()
        ))),
    }
}

fn expect_connection_state(
    connection_id: &ConnectionId,
    conn_end: &ConnectionEnd,
    expected: ConnectionState,
) -> Result<(), MockError> {
    if conn_end.state == expected {
        Ok(())
    } else {
        Err(MockError::invalid_state(
            format!("connection `{connection_id}`"),
            expected,
            conn_end.state,
        ))
    }
}

fn expect_channel_state(
    channel_id: &ChannelId,
    chan_end: &ChannelEnd,
    expected: ChannelState,
) -> Result<(), MockError> {
    if chan_end.state == expected {
        Ok(())
    } else {
        Err(MockError::invalid_state(
            format!("channel `{channel_id}`"),
            expected,
            chan_end.state,
        ))
    }
}

fn expect_remote(chan_end: &ChannelEnd, port_id: &PortId, channel_id: &ChannelId) -> Result<(), MockError> {
    if chan_end.remote.port_id == *port_id && chan_end.remote.channel_id.as_ref() == Some(channel_id) {
        Ok(())
    } else {
        Err(MockError::mismatch(format!(
            "packet names `{port_id}/{channel_id}` as its other end"
        )))
    }
}

fn connection_event(connection_id: &ConnectionId, conn_end: &ConnectionEnd) -> ConnectionEvent {
    ConnectionEvent {
        connection_id: connection_id.clone(),
        client_id: conn_end.client_id.clone(),
        counterparty_client_id: conn_end.counterparty.client_id.clone(),
        counterparty_connection_id: conn_end.counterparty.connection_id.clone(),
    }
}

fn channel_event(
    port_id: &PortId,
    channel_id: &ChannelId,
    chan_end: &ChannelEnd,
    connection_id: ConnectionId,
) -> ChannelEvent {
    ChannelEvent {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
        counterparty_port_id: chan_end.remote.port_id.clone(),
        counterparty_channel_id: chan_end.remote.channel_id.clone(),
        connection_id,
    }
}
