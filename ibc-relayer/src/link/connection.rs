//! The connection handshake, driven from chain `A` towards chain `B`.

use core::time::Duration;

use ibc_relayer_types::connection::{Counterparty, Version};
use ibc_relayer_types::events::{
    IbcEvent, CONNECTION_OPEN_INIT_EVENT, CONNECTION_OPEN_TRY_EVENT,
};
use ibc_relayer_types::identifiers::{ClientId, ConnectionId};
use ibc_relayer_types::msgs::{
    MsgConnectionOpenAck, MsgConnectionOpenConfirm, MsgConnectionOpenInit, MsgConnectionOpenTry,
};
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proto::Any;
use tracing::info;

use super::client::{decode_proven, update_client};
use crate::chain::{ChainClient, TxResult};
use crate::error::{HandshakeStep, RelayerError};
use crate::handle::ChainHandle;
use crate::retry::RetryPolicy;

/// Opens a connection between two chains that already host clients of each
/// other.
///
/// All steps are written in one direction: `A` initiates, `B` follows. Field
/// names match the handshake messages, so `conn_id_on_a` is the identifier
/// of the connection end stored on `A`.
pub(crate) struct ConnectionHandshake<'a, A, B> {
    pub chain_a: &'a ChainHandle<A>,
    pub chain_b: &'a ChainHandle<B>,
    pub client_id_on_a: &'a ClientId,
    pub client_id_on_b: &'a ClientId,
    pub delay_period: Duration,
    pub retry: &'a RetryPolicy,
}

impl<A, B> ConnectionHandshake<'_, A, B>
where
    A: ChainClient,
    B: ChainClient,
{
    /// Runs the four steps. Returns the connection identifiers on `A` and `B`.
    pub async fn run(&self) -> Result<(ConnectionId, ConnectionId), RelayerError> {
        let conn_id_on_a = self
            .open_init_on_a()
            .await
            .map_err(|e| e.in_step(HandshakeStep::ConnOpenInit))?;

        let conn_id_on_b = self
            .open_try_on_b(&conn_id_on_a)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ConnOpenTry))?;

        self.open_ack_on_a(&conn_id_on_a, &conn_id_on_b)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ConnOpenAck))?;

        self.open_confirm_on_b(&conn_id_on_b, &conn_id_on_a)
            .await
            .map_err(|e| e.in_step(HandshakeStep::ConnOpenConfirm))?;

        Ok((conn_id_on_a, conn_id_on_b))
    }

    /// `A` initiates a connection with the other end on `B`.
    async fn open_init_on_a(&self) -> Result<ConnectionId, RelayerError> {
        let msg = MsgConnectionOpenInit {
            client_id_on_a: self.client_id_on_a.clone(),
            counterparty: Counterparty::new(self.client_id_on_b.clone(), None),
            version: None,
            delay_period: self.delay_period,
            signer: self.chain_a.signer(),
        };

        let result = self.chain_a.submit(vec![msg.into()]).await?;
        let conn_id_on_a = opened_connection(self.chain_a, result, CONNECTION_OPEN_INIT_EVENT)?;

        info!(chain_id = %self.chain_a.chain_id(), connection_id = %conn_id_on_a, step = %HandshakeStep::ConnOpenInit, "connection handshake step done");

        Ok(conn_id_on_a)
    }

    /// `B` answers the attempt of `A`, proving `A`'s connection end and `A`'s
    /// client of `B`.
    async fn open_try_on_b(&self, conn_id_on_a: &ConnectionId) -> Result<ConnectionId, RelayerError> {
        let proofs_height_on_a = update_client(self.chain_a, self.chain_b, self.client_id_on_b, self.retry)
            .await
            .map_err(|e| e.in_step(HandshakeStep::UpdateClient))?;

        let consensus_height_of_b_on_a = self
            .chain_a
            .query_client_latest_height(self.client_id_on_a, self.retry)
            .await?;

        let conn_path = Path::Connection(conn_id_on_a.clone());
        let client_path = Path::ClientState(self.client_id_on_a.clone());
        let consensus_path =
            Path::ClientConsensusState(self.client_id_on_a.clone(), consensus_height_of_b_on_a);

        let (conn_end, client_state, consensus_state) = tokio::try_join!(
            self.chain_a.query_proof(&conn_path, proofs_height_on_a, self.retry),
            self.chain_a.query_proof(&client_path, proofs_height_on_a, self.retry),
            self.chain_a.query_proof(&consensus_path, proofs_height_on_a, self.retry),
        )?;

        let client_state_of_b_on_a: Any = decode_proven(self.chain_a, &client_path, &client_state)?;

        let msg = MsgConnectionOpenTry {
            client_id_on_b: self.client_id_on_b.clone(),
            client_state_of_b_on_a,
            counterparty: Counterparty::new(self.client_id_on_a.clone(), Some(conn_id_on_a.clone())),
            versions_on_a: vec![Version::default()],
            proof_conn_end_on_a: conn_end.proof,
            proof_client_state_of_b_on_a: client_state.proof,
            proof_consensus_state_of_b_on_a: consensus_state.proof,
            proofs_height_on_a,
            consensus_height_of_b_on_a,
            delay_period: self.delay_period,
            signer: self.chain_b.signer(),
        };

        let result = self.chain_b.submit(vec![msg.into()]).await?;
        let conn_id_on_b = opened_connection(self.chain_b, result, CONNECTION_OPEN_TRY_EVENT)?;

        info!(chain_id = %self.chain_b.chain_id(), connection_id = %conn_id_on_b, step = %HandshakeStep::ConnOpenTry, "connection handshake step done");

        Ok(conn_id_on_b)
    }

    /// `A` accepts `B`'s answer, proving `B`'s connection end and `B`'s client
    /// of `A`.
    async fn open_ack_on_a(
        &self,
        conn_id_on_a: &ConnectionId,
        conn_id_on_b: &ConnectionId,
    ) -> Result<(), RelayerError> {
        let proofs_height_on_b = update_client(self.chain_b, self.chain_a, self.client_id_on_a, self.retry)
            .await
            .map_err(|e| e.in_step(HandshakeStep::UpdateClient))?;

        let consensus_height_of_a_on_b = self
            .chain_b
            .query_client_latest_height(self.client_id_on_b, self.retry)
            .await?;

        let conn_path = Path::Connection(conn_id_on_b.clone());
        let client_path = Path::ClientState(self.client_id_on_b.clone());
        let consensus_path =
            Path::ClientConsensusState(self.client_id_on_b.clone(), consensus_height_of_a_on_b);

        let (conn_end, client_state, consensus_state) = tokio::try_join!(
            self.chain_b.query_proof(&conn_path, proofs_height_on_b, self.retry),
            self.chain_b.query_proof(&client_path, proofs_height_on_b, self.retry),
            self.chain_b.query_proof(&consensus_path, proofs_height_on_b, self.retry),
        )?;

        let client_state_of_a_on_b: Any = decode_proven(self.chain_b, &client_path, &client_state)?;

        let msg = MsgConnectionOpenAck {
            conn_id_on_a: conn_id_on_a.clone(),
            conn_id_on_b: conn_id_on_b.clone(),
            client_state_of_a_on_b,
            proof_conn_end_on_b: conn_end.proof,
            proof_client_state_of_a_on_b: client_state.proof,
            proof_consensus_state_of_a_on_b: consensus_state.proof,
            proofs_height_on_b,
            consensus_height_of_a_on_b,
            version: Version::default(),
            signer: self.chain_a.signer(),
        };

        self.chain_a.submit(vec![msg.into()]).await?;

        info!(chain_id = %self.chain_a.chain_id(), connection_id = %conn_id_on_a, step = %HandshakeStep::ConnOpenAck, "connection handshake step done");

        Ok(())
    }

    /// `B` learns that `A` opened its end.
    async fn open_confirm_on_b(
        &self,
        conn_id_on_b: &ConnectionId,
        conn_id_on_a: &ConnectionId,
    ) -> Result<(), RelayerError> {
        let proof_height_on_a = update_client(self.chain_a, self.chain_b, self.client_id_on_b, self.retry)
            .await
            .map_err(|e| e.in_step(HandshakeStep::UpdateClient))?;

        let conn_end = self
            .chain_a
            .query_proof(&Path::Connection(conn_id_on_a.clone()), proof_height_on_a, self.retry)
            .await?;

        let msg = MsgConnectionOpenConfirm {
            conn_id_on_b: conn_id_on_b.clone(),
            proof_conn_end_on_a: conn_end.proof,
            proof_height_on_a,
            signer: self.chain_b.signer(),
        };

        self.chain_b.submit(vec![msg.into()]).await?;

        info!(chain_id = %self.chain_b.chain_id(), connection_id = %conn_id_on_b, step = %HandshakeStep::ConnOpenConfirm, "connection handshake step done");

        Ok(())
    }
}

/// The connection a handshake transaction opened, from its event.
fn opened_connection<C: ChainClient>(
    chain: &ChainHandle<C>,
    result: TxResult,
    kind: &str,
) -> Result<ConnectionId, RelayerError> {
    result
        .events
        .into_iter()
        .find_map(|event| match event {
            IbcEvent::OpenInitConnection(e) | IbcEvent::OpenTryConnection(e) => {
                Some(e.connection_id)
            }
            _ => None,
        })
        .ok_or_else(|| RelayerError::MissingEvent {
            chain_id: chain.chain_id(),
            kind: kind.to_string(),
            tx_hash: result.hash.to_string(),
        })
}
