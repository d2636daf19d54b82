//! Light client creation and updates, the prelude to every proof.

use ibc_relayer_types::error::DecodingError;
use ibc_relayer_types::events::{IbcEvent, CREATE_CLIENT_EVENT};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::ClientId;
use ibc_relayer_types::msgs::{MsgCreateClient, MsgUpdateClient};
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proto::Message;
use tracing::{debug, info};

use crate::chain::{ChainClient, ProvenValue};
use crate::error::RelayerError;
use crate::handle::ChainHandle;
use crate::retry::{retry_transient, RetryPolicy};

/// Creates a client of `src` on `dst`. Returns the client identifier on `dst`.
pub(crate) async fn create_client<S, D>(
    src: &ChainHandle<S>,
    dst: &ChainHandle<D>,
    retry: &RetryPolicy,
) -> Result<ClientId, RelayerError>
where
    S: ChainClient,
    D: ChainClient,
{
    let payload = retry_transient(retry.query_delays(), "build_client_payload", || {
        src.client().build_client_payload()
    })
    .await?;

    let msg = MsgCreateClient {
        client_state: payload.client_state,
        consensus_state: payload.consensus_state,
        signer: dst.signer(),
    };

    let result = dst.submit(vec![msg.into()]).await?;

    let client_id = result
        .events
        .into_iter()
        .find_map(|event| match event {
            IbcEvent::CreateClient(e) => Some(e.client_id),
            _ => None,
        })
        .ok_or_else(|| RelayerError::MissingEvent {
            chain_id: dst.chain_id(),
            kind: CREATE_CLIENT_EVENT.to_string(),
            tx_hash: result.hash.to_string(),
        })?;

    info!(chain_id = %dst.chain_id(), %client_id, counterparty = %src.chain_id(), height = %payload.height, "created client");

    Ok(client_id)
}

/// Brings the client of `src` hosted on `dst` up to the latest height of
/// `src`, in a transaction of its own. Returns the height the client now
/// trusts, at which proofs from `src` are to be taken.
pub(crate) async fn update_client<S, D>(
    src: &ChainHandle<S>,
    dst: &ChainHandle<D>,
    client_id_on_dst: &ClientId,
    retry: &RetryPolicy,
) -> Result<Height, RelayerError>
where
    S: ChainClient,
    D: ChainClient,
{
    let (target, trusted) = tokio::try_join!(
        src.latest_commit(retry),
        dst.query_client_latest_height(client_id_on_dst, retry)
    )?;

    if trusted >= target.height {
        debug!(chain_id = %dst.chain_id(), client_id = %client_id_on_dst, %trusted, "client already up to date");
        return Ok(trusted);
    }

    let header = retry_transient(retry.query_delays(), "build_header", || {
        src.client().build_header(target.height)
    })
    .await?;

    let msg = MsgUpdateClient {
        client_id: client_id_on_dst.clone(),
        client_message: header,
        signer: dst.signer(),
    };

    dst.submit(vec![msg.into()]).await?;

    debug!(chain_id = %dst.chain_id(), client_id = %client_id_on_dst, from = %trusted, to = %target.height, "updated client");

    Ok(target.height)
}

/// Decodes the protobuf value a proof carries. A proof of absence is an
/// error here.
pub(crate) fn decode_proven<C, T>(
    chain: &ChainHandle<C>,
    path: &Path,
    proven: &ProvenValue,
) -> Result<T, RelayerError>
where
    C: ChainClient,
    T: Message + Default,
{
    let proof_error = |cause| RelayerError::ProofDecoding {
        chain_id: chain.chain_id(),
        path: path.to_string(),
        cause,
    };

    let bytes = proven
        .value
        .as_deref()
        .ok_or_else(|| {
            proof_error(DecodingError::missing_raw_data(
                "proof of absence where a value was expected",
            ))
        })?;

    T::decode(bytes).map_err(|e| proof_error(e.into()))
}
