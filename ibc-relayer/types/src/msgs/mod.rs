//! Messages the relayer submits to chains, and their protobuf `Any` encoding.

mod channel;
mod client;
mod connection;
mod packet;

use derive_more::From;
use ibc_proto::google::protobuf::Any;
use prost::Message;

pub use self::channel::*;
pub use self::client::*;
pub use self::connection::*;
pub use self::packet::*;
use crate::error::DecodingError;

pub const CREATE_CLIENT_TYPE_URL: &str = "/ibc.core.client.v1.MsgCreateClient";
pub const UPDATE_CLIENT_TYPE_URL: &str = "/ibc.core.client.v1.MsgUpdateClient";
pub const CONN_OPEN_INIT_TYPE_URL: &str = "/ibc.core.connection.v1.MsgConnectionOpenInit";
pub const CONN_OPEN_TRY_TYPE_URL: &str = "/ibc.core.connection.v1.MsgConnectionOpenTry";
pub const CONN_OPEN_ACK_TYPE_URL: &str = "/ibc.core.connection.v1.MsgConnectionOpenAck";
pub const CONN_OPEN_CONFIRM_TYPE_URL: &str = "/ibc.core.connection.v1.MsgConnectionOpenConfirm";
pub const CHAN_OPEN_INIT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenInit";
pub const CHAN_OPEN_TRY_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenTry";
pub const CHAN_OPEN_ACK_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenAck";
pub const CHAN_OPEN_CONFIRM_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenConfirm";
pub const RECV_PACKET_TYPE_URL: &str = "/ibc.core.channel.v1.MsgRecvPacket";
pub const ACKNOWLEDGEMENT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgAcknowledgement";
pub const TIMEOUT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgTimeout";

/// Any message the relayer may put in a transaction.
#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum IbcMsg {
    CreateClient(MsgCreateClient),
    UpdateClient(MsgUpdateClient),
    ConnectionOpenInit(MsgConnectionOpenInit),
    ConnectionOpenTry(MsgConnectionOpenTry),
    ConnectionOpenAck(MsgConnectionOpenAck),
    ConnectionOpenConfirm(MsgConnectionOpenConfirm),
    ChannelOpenInit(MsgChannelOpenInit),
    ChannelOpenTry(MsgChannelOpenTry),
    ChannelOpenAck(MsgChannelOpenAck),
    ChannelOpenConfirm(MsgChannelOpenConfirm),
    RecvPacket(MsgRecvPacket),
    Acknowledgement(MsgAcknowledgement),
    Timeout(MsgTimeout),
}

impl IbcMsg {
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::CreateClient(_) => CREATE_CLIENT_TYPE_URL,
            Self::UpdateClient(_) => UPDATE_CLIENT_TYPE_URL,
            Self::ConnectionOpenInit(_) => CONN_OPEN_INIT_TYPE_URL,
            Self::ConnectionOpenTry(_) => CONN_OPEN_TRY_TYPE_URL,
            Self::ConnectionOpenAck(_) => CONN_OPEN_ACK_TYPE_URL,
            Self::ConnectionOpenConfirm(_) => CONN_OPEN_CONFIRM_TYPE_URL,
            Self::ChannelOpenInit(_) => CHAN_OPEN_INIT_TYPE_URL,
            Self::ChannelOpenTry(_) => CHAN_OPEN_TRY_TYPE_URL,
            Self::ChannelOpenAck(_) => CHAN_OPEN_ACK_TYPE_URL,
            Self::ChannelOpenConfirm(_) => CHAN_OPEN_CONFIRM_TYPE_URL,
            Self::RecvPacket(_) => RECV_PACKET_TYPE_URL,
            Self::Acknowledgement(_) => ACKNOWLEDGEMENT_TYPE_URL,
            Self::Timeout(_) => TIMEOUT_TYPE_URL,
        }
    }

    pub fn into_any(self) -> Any {
        let type_url = self.type_url().to_string();

        let value = match self {
            Self::CreateClient(msg) => RawMsgCreateClient::from(msg).encode_to_vec(),
            Self::UpdateClient(msg) => RawMsgUpdateClient::from(msg).encode_to_vec(),
            Self::ConnectionOpenInit(msg) => RawMsgConnectionOpenInit::from(msg).encode_to_vec(),
            Self::ConnectionOpenTry(msg) => RawMsgConnectionOpenTry::from(msg).encode_to_vec(),
            Self::ConnectionOpenAck(msg) => RawMsgConnectionOpenAck::from(msg).encode_to_vec(),
            Self::ConnectionOpenConfirm(msg) => {
                RawMsgConnectionOpenConfirm::from(msg).encode_to_vec()
            }
            Self::ChannelOpenInit(msg) => RawMsgChannelOpenInit::from(msg).encode_to_vec(),
            Self::ChannelOpenTry(msg) => RawMsgChannelOpenTry::from(msg).encode_to_vec(),
            Self::ChannelOpenAck(msg) => RawMsgChannelOpenAck::from(msg).encode_to_vec(),
            Self::ChannelOpenConfirm(msg) => RawMsgChannelOpenConfirm::from(msg).encode_to_vec(),
            Self::RecvPacket(msg) => RawMsgRecvPacket::from(msg).encode_to_vec(),
            Self::Acknowledgement(msg) => RawMsgAcknowledgement::from(msg).encode_to_vec(),
            Self::Timeout(msg) => RawMsgTimeout::from(msg).encode_to_vec(),
        };

        Any { type_url, value }
    }
}

/// Decodes the protobuf payload of `any`, checking its type URL first.
pub fn decode_any<T>(any: &Any, type_url: &str) -> Result<T, DecodingError>
where
    T: Message + Default,
{
    if any.type_url != type_url {
        return Err(DecodingError::MismatchedTypeUrls {
            expected: type_url.to_string(),
            actual: any.type_url.clone(),
        });
    }

    Ok(T::decode(any.value.as_slice())?)
}
