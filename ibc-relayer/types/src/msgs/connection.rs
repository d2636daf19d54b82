use core::time::Duration;

use ibc_proto::google::protobuf::Any;
pub use ibc_proto::ibc::core::connection::v1::{
    MsgConnectionOpenAck as RawMsgConnectionOpenAck,
    MsgConnectionOpenConfirm as RawMsgConnectionOpenConfirm,
    MsgConnectionOpenInit as RawMsgConnectionOpenInit,
    MsgConnectionOpenTry as RawMsgConnectionOpenTry,
};

use crate::connection::{Counterparty, Version};
use crate::height::Height;
use crate::identifiers::{ClientId, ConnectionId, Signer};
use crate::proof::CommitmentProofBytes;

fn delay_nanos(delay: Duration) -> u64 {
    u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX)
}

/// Starts a connection on the initiating chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenInit {
    pub client_id_on_a: ClientId,
    pub counterparty: Counterparty,
    pub version: Option<Version>,
    pub delay_period: Duration,
    pub signer: Signer,
}

impl From<MsgConnectionOpenInit> for RawMsgConnectionOpenInit {
    fn from(ics_msg: MsgConnectionOpenInit) -> Self {
        RawMsgConnectionOpenInit {
            client_id: ics_msg.client_id_on_a.as_str().to_string(),
            counterparty: Some(ics_msg.counterparty.into()),
            version: ics_msg.version.map(Into::into),
            delay_period: delay_nanos(ics_msg.delay_period),
            signer: ics_msg.signer.to_string(),
        }
    }
}

/// Answers an init on the counterparty, with proofs of the initiator's
/// connection end and of its client of this chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenTry {
    pub client_id_on_b: ClientId,
    pub client_state_of_b_on_a: Any,
    pub counterparty: Counterparty,
    pub versions_on_a: Vec<Version>,
    pub proof_conn_end_on_a: CommitmentProofBytes,
    pub proof_client_state_of_b_on_a: CommitmentProofBytes,
    pub proof_consensus_state_of_b_on_a: CommitmentProofBytes,
    pub proofs_height_on_a: Height,
    pub consensus_height_of_b_on_a: Height,
    pub delay_period: Duration,
    pub signer: Signer,
}

impl From<MsgConnectionOpenTry> for RawMsgConnectionOpenTry {
    fn from(msg: MsgConnectionOpenTry) -> Self {
        RawMsgConnectionOpenTry {
            client_id: msg.client_id_on_b.as_str().to_string(),
            client_state: Some(msg.client_state_of_b_on_a),
            counterparty: Some(msg.counterparty.into()),
            delay_period: delay_nanos(msg.delay_period),
            counterparty_versions: msg.versions_on_a.into_iter().map(Into::into).collect(),
            proof_height: Some(msg.proofs_height_on_a.into()),
            proof_init: msg.proof_conn_end_on_a.into(),
            proof_client: msg.proof_client_state_of_b_on_a.into(),
            proof_consensus: msg.proof_consensus_state_of_b_on_a.into(),
            consensus_height: Some(msg.consensus_height_of_b_on_a.into()),
            signer: msg.signer.to_string(),
            ..Default::default()
        }
    }
}

/// Completes the initiator's end once the counterparty is in `TRYOPEN`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenAck {
    pub conn_id_on_a: ConnectionId,
    pub conn_id_on_b: ConnectionId,
    pub client_state_of_a_on_b: Any,
    pub proof_conn_end_on_b: CommitmentProofBytes,
    pub proof_client_state_of_a_on_b: CommitmentProofBytes,
    pub proof_consensus_state_of_a_on_b: CommitmentProofBytes,
    pub proofs_height_on_b: Height,
    pub consensus_height_of_a_on_b: Height,
    pub version: Version,
    pub signer: Signer,
}

impl From<MsgConnectionOpenAck> for RawMsgConnectionOpenAck {
    fn from(msg: MsgConnectionOpenAck) -> Self {
        RawMsgConnectionOpenAck {
            connection_id: msg.conn_id_on_a.as_str().to_string(),
            counterparty_connection_id: msg.conn_id_on_b.as_str().to_string(),
            client_state: Some(msg.client_state_of_a_on_b),
            proof_height: Some(msg.proofs_height_on_b.into()),
            proof_try: msg.proof_conn_end_on_b.into(),
            proof_client: msg.proof_client_state_of_a_on_b.into(),
            proof_consensus: msg.proof_consensus_state_of_a_on_b.into(),
            consensus_height: Some(msg.consensus_height_of_a_on_b.into()),
            version: Some(msg.version.into()),
            signer: msg.signer.to_string(),
            ..Default::default()
        }
    }
}

/// Opens the counterparty's end after the initiator's is `OPEN`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenConfirm {
    pub conn_id_on_b: ConnectionId,
    pub proof_conn_end_on_a: CommitmentProofBytes,
    pub proof_height_on_a: Height,
    pub signer: Signer,
}

impl From<MsgConnectionOpenConfirm> for RawMsgConnectionOpenConfirm {
    fn from(msg: MsgConnectionOpenConfirm) -> Self {
        RawMsgConnectionOpenConfirm {
            connection_id: msg.conn_id_on_b.as_str().to_string(),
            proof_ack: msg.proof_conn_end_on_a.into(),
            proof_height: Some(msg.proof_height_on_a.into()),
            signer: msg.signer.to_string(),
        }
    }
}
