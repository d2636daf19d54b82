//! Serialized access to a chain's signing account.

use std::sync::Arc;

use ibc_relayer_types::channel::ChannelEnd;
use ibc_relayer_types::connection::ConnectionEnd;
use ibc_relayer_types::events::abci::parse_raw_log;
use ibc_relayer_types::events::IbcEvent;
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{ChainId, ChannelId, ClientId, ConnectionId, PortId, Signer};
use ibc_relayer_types::msgs::IbcMsg;
use ibc_relayer_types::path::Path;
use tracing::{debug, warn};

use crate::chain::{ChainClient, CommitInfo, ProvenValue, TxResult};
use crate::error::RelayerError;
use crate::retry::{retry_transient, RetryPolicy};

/// A shared chain client whose transactions go out one at a time.
///
/// Submissions hold the client's [`ChainClient::tx_lock`], so at most one
/// transaction per signing account is in flight however many handles, links
/// or tasks use the chain.
pub struct ChainHandle<C> {
    client: Arc<C>,
}

impl<C> Clone for ChainHandle<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: ChainClient> ChainHandle<C> {
    pub fn new(client: C) -> Self {
        Self::from_arc(Arc::new(client))
    }

    pub fn from_arc(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn shared_client(&self) -> Arc<C> {
        Arc::clone(&self.client)
    }

    pub fn chain_id(&self) -> ChainId {
        self.client.chain_id()
    }

    pub fn signer(&self) -> Signer {
        self.client.signer()
    }

    pub async fn latest_commit(&self, retry: &RetryPolicy) -> Result<CommitInfo, RelayerError> {
        retry_transient(retry.query_delays(), "latest_commit", || {
            self.client.latest_commit()
        })
        .await
    }

    /// Proves `path` at `height`, waiting for the chain to reach `height` if
    /// it has not yet.
    pub async fn query_proof(
        &self,
        path: &Path,
        height: Height,
        retry: &RetryPolicy,
    ) -> Result<ProvenValue, RelayerError> {
        retry_transient(retry.proof_delays(), "query_proof", || {
            self.client.query_proof(path, height)
        })
        .await
    }

    /// The latest counterparty height known to a light client hosted here.
    pub async fn query_client_latest_height(
        &self,
        client_id: &ClientId,
        retry: &RetryPolicy,
    ) -> Result<Height, RelayerError> {
        retry_transient(retry.query_delays(), "query_client_latest_height", || {
            self.client.query_client_latest_height(client_id)
        })
        .await
    }

    pub async fn query_connection(
        &self,
        connection_id: &ConnectionId,
        retry: &RetryPolicy,
    ) -> Result<Option<ConnectionEnd>, RelayerError> {
        retry_transient(retry.query_delays(), "query_connection", || {
            self.client.query_connection(connection_id)
        })
        .await
    }

    pub async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        retry: &RetryPolicy,
    ) -> Result<Option<ChannelEnd>, RelayerError> {
        retry_transient(retry.query_delays(), "query_channel", || {
            self.client.query_channel(port_id, channel_id)
        })
        .await
    }

    /// Signs and broadcasts `msgs` as one transaction. A transaction the
    /// chain rejects becomes [`RelayerError::BroadcastRejected`].
    pub async fn submit(&self, msgs: Vec<IbcMsg>) -> Result<TxResult, RelayerError> {
        let chain_id = self.client.chain_id();
        let type_urls: Vec<&'static str> = msgs.iter().map(IbcMsg::type_url).collect();
        let anys = msgs.into_iter().map(IbcMsg::into_any).collect();

        let mut result = {
            let _guard = self.client.tx_lock().lock().await;
            self.client.sign_and_broadcast(anys).await?
        };

        if !result.is_ok() {
            warn!(%chain_id, code = result.code, log = %result.raw_log, ?type_urls, "transaction rejected");
            return Err(RelayerError::BroadcastRejected {
                chain_id,
                code: result.code,
                log: result.raw_log,
            });
        }

        if result.events.is_empty() {
            match parse_raw_log(&result.raw_log) {
                Ok(logs) => result.events = IbcEvent::decode_logs(&logs),
                Err(e) => warn!(%chain_id, error = %e, "cannot decode transaction log"),
            }
        }

        debug!(%chain_id, height = %result.height, hash = %result.hash, ?type_urls, "transaction committed");

        Ok(result)
    }
}
