//! Attribute keys of the IBC events and typed access to their values.

use core::fmt::Display;
use core::str::FromStr;

use super::abci::StringEvent;
use crate::error::DecodingError;

pub const CLIENT_ID_ATTRIBUTE_KEY: &str = "client_id";
pub const CLIENT_TYPE_ATTRIBUTE_KEY: &str = "client_type";
pub const CONSENSUS_HEIGHT_ATTRIBUTE_KEY: &str = "consensus_height";

pub const CONN_ID_ATTRIBUTE_KEY: &str = "connection_id";
pub const COUNTERPARTY_CLIENT_ID_ATTRIBUTE_KEY: &str = "counterparty_client_id";
pub const COUNTERPARTY_CONN_ID_ATTRIBUTE_KEY: &str = "counterparty_connection_id";

pub const PORT_ID_ATTRIBUTE_KEY: &str = "port_id";
pub const CHANNEL_ID_ATTRIBUTE_KEY: &str = "channel_id";
pub const COUNTERPARTY_PORT_ID_ATTRIBUTE_KEY: &str = "counterparty_port_id";
pub const COUNTERPARTY_CHANNEL_ID_ATTRIBUTE_KEY: &str = "counterparty_channel_id";
pub const VERSION_ATTRIBUTE_KEY: &str = "version";

pub const PKT_DATA_ATTRIBUTE_KEY: &str = "packet_data";
pub const PKT_DATA_HEX_ATTRIBUTE_KEY: &str = "packet_data_hex";
pub const PKT_TIMEOUT_HEIGHT_ATTRIBUTE_KEY: &str = "packet_timeout_height";
pub const PKT_TIMEOUT_TIMESTAMP_ATTRIBUTE_KEY: &str = "packet_timeout_timestamp";
pub const PKT_SEQ_ATTRIBUTE_KEY: &str = "packet_sequence";
pub const PKT_SRC_PORT_ATTRIBUTE_KEY: &str = "packet_src_port";
pub const PKT_SRC_CHANNEL_ATTRIBUTE_KEY: &str = "packet_src_channel";
pub const PKT_DST_PORT_ATTRIBUTE_KEY: &str = "packet_dst_port";
pub const PKT_DST_CHANNEL_ATTRIBUTE_KEY: &str = "packet_dst_channel";
pub const PKT_CHANNEL_ORDERING_ATTRIBUTE_KEY: &str = "packet_channel_ordering";
pub const PKT_CONNECTION_ID_ATTRIBUTE_KEY: &str = "packet_connection";
pub const PKT_ACK_ATTRIBUTE_KEY: &str = "packet_ack";
pub const PKT_ACK_HEX_ATTRIBUTE_KEY: &str = "packet_ack_hex";

pub const SENDER_ATTRIBUTE_KEY: &str = "sender";
pub const SIGNER_ATTRIBUTE_KEY: &str = "signer";

/// Read access to the attributes of one event, reporting failures against
/// the event kind.
pub(crate) struct Attributes<'a> {
    event: &'a StringEvent,
}

impl<'a> Attributes<'a> {
    pub(crate) fn new(event: &'a StringEvent) -> Self {
        Self { event }
    }

    pub(crate) fn optional(&self, key: &str) -> Option<&'a str> {
        self.event.attribute(key).filter(|value| !value.is_empty())
    }

    pub(crate) fn required(&self, key: &str) -> Result<&'a str, DecodingError> {
        self.optional(key)
            .ok_or_else(|| DecodingError::MissingAttribute {
                kind: self.event.kind.clone(),
                key: key.to_string(),
            })
    }

    pub(crate) fn parse<T>(&self, key: &str) -> Result<T, DecodingError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.required(key)?
            .parse()
            .map_err(|e: T::Err| self.invalid(key, e))
    }

    pub(crate) fn parse_optional<T>(&self, key: &str) -> Result<Option<T>, DecodingError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)
            .map(|value| value.parse().map_err(|e: T::Err| self.invalid(key, e)))
            .transpose()
    }

    /// Bytes carried either hex-encoded under `hex_key` or verbatim under
    /// `key`. The hex form wins when both are present.
    pub(crate) fn bytes(&self, hex_key: &str, key: &str) -> Result<Option<Vec<u8>>, DecodingError> {
        if let Some(encoded) = self.optional(hex_key) {
            return hex::decode(encoded)
                .map(Some)
                .map_err(|e| self.invalid(hex_key, e));
        }

        Ok(self.optional(key).map(|value| value.as_bytes().to_vec()))
    }

    fn invalid(&self, key: &str, description: impl Display) -> DecodingError {
        DecodingError::InvalidAttribute {
            kind: self.event.kind.clone(),
            key: key.to_string(),
            description: description.to_string(),
        }
    }
}
