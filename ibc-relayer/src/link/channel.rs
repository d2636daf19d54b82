//! The channel handshake over an open connection, driven from `A` towards `B`.

use ibc_relayer_types::channel::{ChannelEnd, ChannelPair, Order};
use ibc_relayer_types::events::{IbcEvent, CHANNEL_OPEN_INIT_EVENT, CHANNEL_OPEN_TRY_EVENT};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{ChannelId, PortId};
use ibc_relayer_types::msgs::{
    MsgChannelOpenAck, MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry,
};
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proto::channel::Channel as RawChannel;
use tracing::info;

use super::client::{decode_proven, update_client};
use crate::chain::{ChainClient, ProvenValue, TxResult};
use crate::endpoint::Endpoint;
use crate::error::{HandshakeStep, RelayerError};

/// Opens a channel between `port_id_on_a` and `port_id_on_b` over the
/// connection of the two endpoints. Like the connection handshake, every
/// step is written from `A`'s point of view.
pub(crate) struct ChannelHandshake<'a, A, B> {
    pub end_a: &'a Endpoint<A>,
    pub end_b: &'a Endpoint<B>,
    pub port_id_on_a: &'a PortId,
    pub port_id_on_b: &'a PortId,
    pub ordering: Order,
    pub version: &'a str,
}

impl<A, B> ChannelHandshake<'_, A, B>
where
    A: ChainClient,
    B: ChainClient,
{
    /// Runs the four steps. Returns the channel pair oriented from `A`.
    pub async fn run(&self) -> Result<ChannelPair, RelayerError> {
        let chan_id_on_a = self
            .open_init_on_a()
            .await
            .map_err(|e| e.in_step(HandshakeStep::ChanOpenInit))?;

        let chan_id_on_b = self
            .open_try_on_b(&chan_id_on_a)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ChanOpenTry))?;

        self.open_ack_on_a(&chan_id_on_a, &chan_id_on_b)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ChanOpenAck))?;

        self.open_confirm_on_b(&chan_id_on_b, &chan_id_on_a)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ChanOpenConfirm))?;

        Ok(ChannelPair {
            port_id_a: self.port_id_on_a.clone(),
            chan_id_a: chan_id_on_a,
            port_id_b: self.port_id_on_b.clone(),
            chan_id_b: chan_id_on_b,
        })
    }

    async fn open_init_on_a(&self) -> Result<ChannelId, RelayerError> {
        let msg = MsgChannelOpenInit {
            port_id_on_a: self.port_id_on_a.clone(),
            connection_hops_on_a: vec![self.end_a.connection_id().clone()],
            port_id_on_b: self.port_id_on_b.clone(),
            ordering: self.ordering,
            signer: self.end_a.signer(),
            version_proposal: self.version.to_string(),
        };

        let result = self.end_a.submit(vec![msg.into()]).await?;
        let chan_id_on_a = opened_channel(self.end_a, result, CHANNEL_OPEN_INIT_EVENT)?;

        info!(chain_id = %self.end_a.chain_id(), port_id = %self.port_id_on_a, channel_id = %chan_id_on_a, step = %HandshakeStep::ChanOpenInit, "channel handshake step done");

        Ok(chan_id_on_a)
    }

    async fn open_try_on_b(&self, chan_id_on_a: &ChannelId) -> Result<ChannelId, RelayerError> {
        let proof_height_on_a = self.update_client_on_b().await?;
        let (chan_end_on_a, proven) = self
            .prove_channel(self.end_a, self.port_id_on_a, chan_id_on_a, proof_height_on_a)
            .await?;

        let msg = MsgChannelOpenTry {
            port_id_on_b: self.port_id_on_b.clone(),
            connection_hops_on_b: vec![self.end_b.connection_id().clone()],
            port_id_on_a: self.port_id_on_a.clone(),
            chan_id_on_a: chan_id_on_a.clone(),
            version_supported_on_a: chan_end_on_a.version,
            proof_chan_end_on_a: proven.proof,
            proof_height_on_a,
            ordering: self.ordering,
            signer: self.end_b.signer(),
        };

        let result = self.end_b.submit(vec![msg.into()]).await?;
        let chan_id_on_b = opened_channel(self.end_b, result, CHANNEL_OPEN_TRY_EVENT)?;

        info!(chain_id = %self.end_b.chain_id(), port_id = %self.port_id_on_b, channel_id = %chan_id_on_b, step = %HandshakeStep::ChanOpenTry, "channel handshake step done");

        Ok(chan_id_on_b)
    }

    async fn open_ack_on_a(
        &self,
        chan_id_on_a: &ChannelId,
        chan_id_on_b: &ChannelId,
    ) -> Result<(), RelayerError> {
        let proof_height_on_b = self.update_client_on_a().await?;
        let (chan_end_on_b, proven) = self
            .prove_channel(self.end_b, self.port_id_on_b, chan_id_on_b, proof_height_on_b)
            .await?;

        let msg = MsgChannelOpenAck {
            port_id_on_a: self.port_id_on_a.clone(),
            chan_id_on_a: chan_id_on_a.clone(),
            chan_id_on_b: chan_id_on_b.clone(),
            version_on_b: chan_end_on_b.version,
            proof_chan_end_on_b: proven.proof,
            proof_height_on_b,
            signer: self.end_a.signer(),
        };

        self.end_a.submit(vec![msg.into()]).await?;

        info!(chain_id = %self.end_a.chain_id(), port_id = %self.port_id_on_a, channel_id = %chan_id_on_a, step = %HandshakeStep::ChanOpenAck, "channel handshake step done");

        Ok(())
    }

    async fn open_confirm_on_b(
        &self,
        chan_id_on_b: &ChannelId,
        chan_id_on_a: &ChannelId,
    ) -> Result<(), RelayerError> {
        let proof_height_on_a = self.update_client_on_b().await?;
        let (_, proven) = self
            .prove_channel(self.end_a, self.port_id_on_a, chan_id_on_a, proof_height_on_a)
            .await?;

        let msg = MsgChannelOpenConfirm {
            port_id_on_b: self.port_id_on_b.clone(),
            chan_id_on_b: chan_id_on_b.clone(),
            proof_chan_end_on_a: proven.proof,
            proof_height_on_a,
            signer: self.end_b.signer(),
        };

        self.end_b.submit(vec![msg.into()]).await?;

        info!(chain_id = %self.end_b.chain_id(), port_id = %self.port_id_on_b, channel_id = %chan_id_on_b, step = %HandshakeStep::ChanOpenConfirm, "channel handshake step done");

        Ok(())
    }

    async fn update_client_on_a(&self) -> Result<Height, RelayerError> {
        update_client(
            self.end_b.chain(),
            self.end_a.chain(),
            self.end_a.client_id(),
            &self.end_a.settings().retry,
        )
        .await
        .map_err(|e| e.in_step(HandshakeStep::UpdateClient))
    }

    async fn update_client_on_b(&self) -> Result<Height, RelayerError> {
        update_client(
            self.end_a.chain(),
            self.end_b.chain(),
            self.end_b.client_id(),
            &self.end_b.settings().retry,
        )
        .await
        .map_err(|e| e.in_step(HandshakeStep::UpdateClient))
    }

    /// Proves a channel end and decodes the proven value.
    async fn prove_channel<C: ChainClient>(
        &self,
        end: &Endpoint<C>,
        port_id: &PortId,
        channel_id: &ChannelId,
        height: Height,
    ) -> Result<(ChannelEnd, ProvenValue), RelayerError> {
        let path = Path::ChannelEnd(port_id.clone(), channel_id.clone());
        let proven = end.query_proof(&path, height).await?;

        let raw: RawChannel = decode_proven(end.chain(), &path, &proven)?;
        let chan_end = ChannelEnd::try_from(raw).map_err(|cause| RelayerError::ProofDecoding {
            chain_id: end.chain_id(),
            path: path.to_string(),
            cause,
        })?;

        Ok((chan_end, proven))
    }
}

/// The channel a handshake transaction opened, from its event.
fn opened_channel<C: ChainClient>(
    end: &Endpoint<C>,
    result: TxResult,
    kind: &str,
) -> Result<ChannelId, RelayerError> {
    result
        .events
        .into_iter()
        .find_map(|event| match event {
            IbcEvent::OpenInitChannel(e) | IbcEvent::OpenTryChannel(e) => Some(e.channel_id),
            _ => None,
        })
        .ok_or_else(|| RelayerError::MissingEvent {
            chain_id: end.chain_id(),
            kind: kind.to_string(),
            tx_hash: result.hash.to_string(),
        })
}
