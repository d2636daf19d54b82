//! Typed decoding of the IBC events found in transaction logs.
//!
//! Decoding never panics and never aborts a whole log: an event of a known
//! kind that cannot be decoded becomes [`IbcEvent::Malformed`], an event of
//! any other kind becomes [`IbcEvent::Unknown`].

pub mod abci;
pub mod attributes;
pub mod lookup;

use self::abci::{AbciMessageLog, StringEvent};
use self::attributes::*;
use crate::acknowledgement::Acknowledgement;
use crate::channel::Order;
use crate::error::DecodingError;
use crate::identifiers::{ChannelId, ClientId, ConnectionId, PortId, Sequence};
use crate::packet::Packet;
use crate::timeout::TimeoutHeight;
use crate::timestamp::Timestamp;

/// Client event types
pub const CREATE_CLIENT_EVENT: &str = "create_client";
pub const UPDATE_CLIENT_EVENT: &str = "update_client";

/// Connection event types
pub const CONNECTION_OPEN_INIT_EVENT: &str = "connection_open_init";
pub const CONNECTION_OPEN_TRY_EVENT: &str = "connection_open_try";
pub const CONNECTION_OPEN_ACK_EVENT: &str = "connection_open_ack";
pub const CONNECTION_OPEN_CONFIRM_EVENT: &str = "connection_open_confirm";

/// Channel event types
pub const CHANNEL_OPEN_INIT_EVENT: &str = "channel_open_init";
pub const CHANNEL_OPEN_TRY_EVENT: &str = "channel_open_try";
pub const CHANNEL_OPEN_ACK_EVENT: &str = "channel_open_ack";
pub const CHANNEL_OPEN_CONFIRM_EVENT: &str = "channel_open_confirm";

/// Packet event types
pub const SEND_PACKET_EVENT: &str = "send_packet";
pub const RECEIVE_PACKET_EVENT: &str = "recv_packet";
pub const WRITE_ACK_EVENT: &str = "write_acknowledgement";
pub const ACK_PACKET_EVENT: &str = "acknowledge_packet";
pub const TIMEOUT_EVENT: &str = "timeout_packet";

/// The SDK event carrying the message sender.
pub const MESSAGE_EVENT: &str = "message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEvent {
    pub client_id: ClientId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connection_id: ConnectionId,
    pub client_id: ClientId,
    pub counterparty_client_id: ClientId,
    pub counterparty_connection_id: Option<ConnectionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_port_id: PortId,
    pub counterparty_channel_id: Option<ChannelId>,
    pub connection_id: ConnectionId,
}

/// A packet lifecycle event. `acknowledge_packet` and `timeout_packet`
/// events carry no data, so their packets have empty `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketEvent {
    pub packet: Packet,
    pub ordering: Order,
    pub connection_id: ConnectionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAckEvent {
    pub packet: Packet,
    pub acknowledgement: Acknowledgement,
    pub connection_id: ConnectionId,
}

/// Events emitted by the IBC modules, as seen by the relayer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IbcEvent {
    CreateClient(ClientEvent),
    UpdateClient(ClientEvent),
    OpenInitConnection(ConnectionEvent),
    OpenTryConnection(ConnectionEvent),
    OpenAckConnection(ConnectionEvent),
    OpenConfirmConnection(ConnectionEvent),
    OpenInitChannel(ChannelEvent),
    OpenTryChannel(ChannelEvent),
    OpenAckChannel(ChannelEvent),
    OpenConfirmChannel(ChannelEvent),
    SendPacket(PacketEvent),
    ReceivePacket(PacketEvent),
    WriteAcknowledgement(WriteAckEvent),
    AcknowledgePacket(PacketEvent),
    TimeoutPacket(PacketEvent),
    /// An event of a kind the relayer does not interpret.
    Unknown { kind: String },
    /// An IBC event whose attributes could not be decoded.
    Malformed { kind: String, reason: DecodingError },
}

impl IbcEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::CreateClient(_) => CREATE_CLIENT_EVENT,
            Self::UpdateClient(_) => UPDATE_CLIENT_EVENT,
            Self::OpenInitConnection(_) => CONNECTION_OPEN_INIT_EVENT,
            Self::OpenTryConnection(_) => CONNECTION_OPEN_TRY_EVENT,
            Self::OpenAckConnection(_) => CONNECTION_OPEN_ACK_EVENT,
            Self::OpenConfirmConnection(_) => CONNECTION_OPEN_CONFIRM_EVENT,
            Self::OpenInitChannel(_) => CHANNEL_OPEN_INIT_EVENT,
            Self::OpenTryChannel(_) => CHANNEL_OPEN_TRY_EVENT,
            Self::OpenAckChannel(_) => CHANNEL_OPEN_ACK_EVENT,
            Self::OpenConfirmChannel(_) => CHANNEL_OPEN_CONFIRM_EVENT,
            Self::SendPacket(_) => SEND_PACKET_EVENT,
            Self::ReceivePacket(_) => RECEIVE_PACKET_EVENT,
            Self::WriteAcknowledgement(_) => WRITE_ACK_EVENT,
            Self::AcknowledgePacket(_) => ACK_PACKET_EVENT,
            Self::TimeoutPacket(_) => TIMEOUT_EVENT,
            Self::Unknown { kind } | Self::Malformed { kind, .. } => kind,
        }
    }

    /// Decodes one string event.
    pub fn decode(event: &StringEvent) -> Self {
        let attrs = Attributes::new(event);

        let decoded = match event.kind.as_str() {
            CREATE_CLIENT_EVENT => decode_client(&attrs).map(Self::CreateClient),
            UPDATE_CLIENT_EVENT => decode_client(&attrs).map(Self::UpdateClient),
            CONNECTION_OPEN_INIT_EVENT => decode_connection(&attrs).map(Self::OpenInitConnection),
            CONNECTION_OPEN_TRY_EVENT => decode_connection(&attrs).map(Self::OpenTryConnection),
            CONNECTION_OPEN_ACK_EVENT => decode_connection(&attrs).map(Self::OpenAckConnection),
            CONNECTION_OPEN_CONFIRM_EVENT => {
                decode_connection(&attrs).map(Self::OpenConfirmConnection)
            }
            CHANNEL_OPEN_INIT_EVENT => decode_channel(&attrs).map(Self::OpenInitChannel),
            CHANNEL_OPEN_TRY_EVENT => decode_channel(&attrs).map(Self::OpenTryChannel),
            CHANNEL_OPEN_ACK_EVENT => decode_channel(&attrs).map(Self::OpenAckChannel),
            CHANNEL_OPEN_CONFIRM_EVENT => decode_channel(&attrs).map(Self::OpenConfirmChannel),
            SEND_PACKET_EVENT => decode_packet_event(&attrs, true).map(Self::SendPacket),
            RECEIVE_PACKET_EVENT => decode_packet_event(&attrs, true).map(Self::ReceivePacket),
            WRITE_ACK_EVENT => decode_write_ack(&attrs).map(Self::WriteAcknowledgement),
            ACK_PACKET_EVENT => decode_packet_event(&attrs, false).map(Self::AcknowledgePacket),
            TIMEOUT_EVENT => decode_packet_event(&attrs, false).map(Self::TimeoutPacket),
            kind => Ok(Self::Unknown {
                kind: kind.to_string(),
            }),
        };

        decoded.unwrap_or_else(|reason| Self::Malformed {
            kind: event.kind.clone(),
            reason,
        })
    }

    /// Decodes every event of every message, in log order.
    pub fn decode_logs(logs: &[AbciMessageLog]) -> Vec<Self> {
        logs.iter()
            .flat_map(|log| log.events.iter())
            .map(Self::decode)
            .collect()
    }

    /// Renders the event in the string form chains put in their logs.
    pub fn into_string_event(self) -> StringEvent {
        let kind = self.kind().to_string();

        match self {
            Self::CreateClient(e) | Self::UpdateClient(e) => {
                StringEvent::new(kind).with_attribute(CLIENT_ID_ATTRIBUTE_KEY, e.client_id.as_str())
            }
            Self::OpenInitConnection(e)
            | Self::OpenTryConnection(e)
            | Self::OpenAckConnection(e)
            | Self::OpenConfirmConnection(e) => StringEvent::new(kind)
                .with_attribute(CONN_ID_ATTRIBUTE_KEY, e.connection_id.as_str())
                .with_attribute(CLIENT_ID_ATTRIBUTE_KEY, e.client_id.as_str())
                .with_attribute(
                    COUNTERPARTY_CONN_ID_ATTRIBUTE_KEY,
                    e.counterparty_connection_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                )
                .with_attribute(
                    COUNTERPARTY_CLIENT_ID_ATTRIBUTE_KEY,
                    e.counterparty_client_id.as_str(),
                ),
            Self::OpenInitChannel(e)
            | Self::OpenTryChannel(e)
            | Self::OpenAckChannel(e)
            | Self::OpenConfirmChannel(e) => StringEvent::new(kind)
                .with_attribute(PORT_ID_ATTRIBUTE_KEY, e.port_id.as_str())
                .with_attribute(CHANNEL_ID_ATTRIBUTE_KEY, e.channel_id.as_str())
                .with_attribute(COUNTERPARTY_PORT_ID_ATTRIBUTE_KEY, e.counterparty_port_id.as_str())
                .with_attribute(
                    COUNTERPARTY_CHANNEL_ID_ATTRIBUTE_KEY,
                    e.counterparty_channel_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                )
                .with_attribute(CONN_ID_ATTRIBUTE_KEY, e.connection_id.as_str()),
            Self::SendPacket(e) | Self::ReceivePacket(e) => {
                let event = with_packet_data(StringEvent::new(kind), &e.packet);
                with_packet_attributes(event, &e.packet, e.ordering, &e.connection_id)
            }
            Self::AcknowledgePacket(e) | Self::TimeoutPacket(e) => {
                with_packet_attributes(StringEvent::new(kind), &e.packet, e.ordering, &e.connection_id)
            }
            Self::WriteAcknowledgement(e) => {
                let event = with_packet_data(StringEvent::new(kind), &e.packet);
                with_packet_attributes(event, &e.packet, Order::Unordered, &e.connection_id)
                    .with_attribute(
                        PKT_ACK_ATTRIBUTE_KEY,
                        String::from_utf8_lossy(e.acknowledgement.as_bytes()),
                    )
                    .with_attribute(
                        PKT_ACK_HEX_ATTRIBUTE_KEY,
                        hex::encode(e.acknowledgement.as_bytes()),
                    )
            }
            Self::Unknown { .. } | Self::Malformed { .. } => StringEvent::new(kind),
        }
    }
}

fn decode_client(attrs: &Attributes<'_>) -> Result<ClientEvent, DecodingError> {
    Ok(ClientEvent {
        client_id: attrs.parse(CLIENT_ID_ATTRIBUTE_KEY)?,
    })
}

fn decode_connection(attrs: &Attributes<'_>) -> Result<ConnectionEvent, DecodingError> {
    Ok(ConnectionEvent {
        connection_id: attrs.parse(CONN_ID_ATTRIBUTE_KEY)?,
        client_id: attrs.parse(CLIENT_ID_ATTRIBUTE_KEY)?,
        counterparty_client_id: attrs.parse(COUNTERPARTY_CLIENT_ID_ATTRIBUTE_KEY)?,
        counterparty_connection_id: attrs.parse_optional(COUNTERPARTY_CONN_ID_ATTRIBUTE_KEY)?,
    })
}

fn decode_channel(attrs: &Attributes<'_>) -> Result<ChannelEvent, DecodingError> {
    Ok(ChannelEvent {
        port_id: attrs.parse(PORT_ID_ATTRIBUTE_KEY)?,
        channel_id: attrs.parse(CHANNEL_ID_ATTRIBUTE_KEY)?,
        counterparty_port_id: attrs.parse(COUNTERPARTY_PORT_ID_ATTRIBUTE_KEY)?,
        counterparty_channel_id: attrs.parse_optional(COUNTERPARTY_CHANNEL_ID_ATTRIBUTE_KEY)?,
        connection_id: attrs.parse(CONN_ID_ATTRIBUTE_KEY)?,
    })
}

fn decode_packet(attrs: &Attributes<'_>, require_data: bool) -> Result<Packet, DecodingError> {
    let data = match attrs.bytes(PKT_DATA_HEX_ATTRIBUTE_KEY, PKT_DATA_ATTRIBUTE_KEY)? {
        Some(data) => data,
        None if require_data => attrs.required(PKT_DATA_ATTRIBUTE_KEY)?.as_bytes().to_vec(),
        None => Vec::new(),
    };

    let timeout_height_on_b = attrs
        .parse_optional::<TimeoutHeight>(PKT_TIMEOUT_HEIGHT_ATTRIBUTE_KEY)?
        .unwrap_or_default();

    let timeout_timestamp_on_b = attrs
        .parse_optional::<u64>(PKT_TIMEOUT_TIMESTAMP_ATTRIBUTE_KEY)?
        .map(Timestamp::from_nanoseconds)
        .unwrap_or_default();

    Ok(Packet {
        seq_on_a: attrs.parse::<Sequence>(PKT_SEQ_ATTRIBUTE_KEY)?,
        port_id_on_a: attrs.parse(PKT_SRC_PORT_ATTRIBUTE_KEY)?,
        chan_id_on_a: attrs.parse(PKT_SRC_CHANNEL_ATTRIBUTE_KEY)?,
        port_id_on_b: attrs.parse(PKT_DST_PORT_ATTRIBUTE_KEY)?,
        chan_id_on_b: attrs.parse(PKT_DST_CHANNEL_ATTRIBUTE_KEY)?,
        data,
        timeout_height_on_b,
        timeout_timestamp_on_b,
    })
}

fn decode_packet_event(
    attrs: &Attributes<'_>,
    require_data: bool,
) -> Result<PacketEvent, DecodingError> {
    Ok(PacketEvent {
        packet: decode_packet(attrs, require_data)?,
        ordering: attrs
            .parse_optional(PKT_CHANNEL_ORDERING_ATTRIBUTE_KEY)?
            .unwrap_or(Order::Unordered),
        connection_id: attrs.parse(PKT_CONNECTION_ID_ATTRIBUTE_KEY)?,
    })
}

fn decode_write_ack(attrs: &Attributes<'_>) -> Result<WriteAckEvent, DecodingError> {
    let ack = match attrs.bytes(PKT_ACK_HEX_ATTRIBUTE_KEY, PKT_ACK_ATTRIBUTE_KEY)? {
        Some(ack) => ack,
        None => attrs.required(PKT_ACK_ATTRIBUTE_KEY)?.as_bytes().to_vec(),
    };

    Ok(WriteAckEvent {
        packet: decode_packet(attrs, true)?,
        acknowledgement: Acknowledgement::try_from(ack)?,
        connection_id: attrs.parse(PKT_CONNECTION_ID_ATTRIBUTE_KEY)?,
    })
}

fn with_packet_data(event: StringEvent, packet: &Packet) -> StringEvent {
    event
        .with_attribute(PKT_DATA_ATTRIBUTE_KEY, String::from_utf8_lossy(&packet.data))
        .with_attribute(PKT_DATA_HEX_ATTRIBUTE_KEY, hex::encode(&packet.data))
}

fn with_packet_attributes(
    event: StringEvent,
    packet: &Packet,
    ordering: Order,
    connection_id: &ConnectionId,
) -> StringEvent {
    event
        .with_attribute(
            PKT_TIMEOUT_HEIGHT_ATTRIBUTE_KEY,
            packet.timeout_height_on_b.to_string(),
        )
        .with_attribute(
            PKT_TIMEOUT_TIMESTAMP_ATTRIBUTE_KEY,
            packet.timeout_timestamp_on_b.to_string(),
        )
        .with_attribute(PKT_SEQ_ATTRIBUTE_KEY, packet.seq_on_a.to_string())
        .with_attribute(PKT_SRC_PORT_ATTRIBUTE_KEY, packet.port_id_on_a.as_str())
        .with_attribute(PKT_SRC_CHANNEL_ATTRIBUTE_KEY, packet.chan_id_on_a.as_str())
        .with_attribute(PKT_DST_PORT_ATTRIBUTE_KEY, packet.port_id_on_b.as_str())
        .with_attribute(PKT_DST_CHANNEL_ATTRIBUTE_KEY, packet.chan_id_on_b.as_str())
        .with_attribute(PKT_CHANNEL_ORDERING_ATTRIBUTE_KEY, ordering.as_str())
        .with_attribute(PKT_CONNECTION_ID_ATTRIBUTE_KEY, connection_id.as_str())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::abci::parse_raw_log;
    use super::*;
    use crate::height::Height;

    fn send_packet_log(extra: &str) -> String {
        format!(
            r#"[{{"msg_index":0,"events":[{{"type":"send_packet","attributes":[
                {{"key":"packet_data","value":"{{\"amount\":\"100\"}}"}},
                {{"key":"packet_timeout_height","value":"1-500"}},
                {{"key":"packet_timeout_timestamp","value":"0"}},
                {{"key":"packet_sequence","value":"4"}},
                {{"key":"packet_src_port","value":"transfer"}},
                {{"key":"packet_src_channel","value":"channel-0"}},
                {{"key":"packet_dst_port","value":"transfer"}},
                {{"key":"packet_dst_channel","value":"channel-9"}},
                {{"key":"packet_channel_ordering","value":"ORDER_UNORDERED"}}
                {extra}
            ]}}]}}]"#
        )
    }

    #[test]
    fn decodes_send_packet() {
        let raw = send_packet_log(r#",{"key":"packet_connection","value":"connection-3"}"#);
        let logs = parse_raw_log(&raw).expect("valid raw log");
        let events = IbcEvent::decode_logs(&logs);

        let IbcEvent::SendPacket(event) = &events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };

        assert_eq!(event.connection_id, ConnectionId::new(3));
        assert_eq!(event.packet.seq_on_a, Sequence::from(4));
        assert_eq!(event.packet.data, br#"{"amount":"100"}"#.to_vec());
        assert_eq!(
            event.packet.timeout_height_on_b,
            TimeoutHeight::At(Height::new(1, 500).expect("non-zero height"))
        );
        assert!(!event.packet.timeout_timestamp_on_b.is_set());
    }

    #[test]
    fn missing_connection_is_malformed_not_fatal() {
        let logs = parse_raw_log(&send_packet_log("")).expect("valid raw log");
        let events = IbcEvent::decode_logs(&logs);

        assert!(matches!(
            &events[0],
            IbcEvent::Malformed { kind, reason: DecodingError::MissingAttribute { key, .. } }
                if kind == SEND_PACKET_EVENT && key == PKT_CONNECTION_ID_ATTRIBUTE_KEY
        ));
    }

    #[rstest]
    #[case("message")]
    #[case("coin_received")]
    fn other_kinds_are_unknown(#[case] kind: &str) {
        let event = IbcEvent::decode(&StringEvent::new(kind));
        assert_eq!(event, IbcEvent::Unknown { kind: kind.to_string() });
    }

    #[test]
    fn hex_data_takes_precedence() {
        let event = StringEvent::new(WRITE_ACK_EVENT)
            .with_attribute(PKT_DATA_ATTRIBUTE_KEY, "garbled")
            .with_attribute(PKT_DATA_HEX_ATTRIBUTE_KEY, "00ff")
            .with_attribute(PKT_TIMEOUT_TIMESTAMP_ATTRIBUTE_KEY, "1700000000000000000")
            .with_attribute(PKT_SEQ_ATTRIBUTE_KEY, "1")
            .with_attribute(PKT_SRC_PORT_ATTRIBUTE_KEY, "transfer")
            .with_attribute(PKT_SRC_CHANNEL_ATTRIBUTE_KEY, "channel-1")
            .with_attribute(PKT_DST_PORT_ATTRIBUTE_KEY, "transfer")
            .with_attribute(PKT_DST_CHANNEL_ATTRIBUTE_KEY, "channel-2")
            .with_attribute(PKT_ACK_HEX_ATTRIBUTE_KEY, "7b7d")
            .with_attribute(PKT_CONNECTION_ID_ATTRIBUTE_KEY, "connection-0");

        let IbcEvent::WriteAcknowledgement(ack) = IbcEvent::decode(&event) else {
            panic!("expected a write_acknowledgement event");
        };

        assert_eq!(ack.packet.data, vec![0x00, 0xff]);
        assert_eq!(ack.acknowledgement.as_bytes(), b"{}");
        assert_eq!(ack.packet.timeout_height_on_b, TimeoutHeight::Never);
    }

    #[test]
    fn rendered_packet_event_decodes_back() {
        let raw = send_packet_log(r#",{"key":"packet_connection","value":"connection-3"}"#);
        let logs = parse_raw_log(&raw).expect("valid raw log");
        let decoded = IbcEvent::decode(&logs[0].events[0]);

        let rendered = decoded.clone().into_string_event();
        assert_eq!(IbcEvent::decode(&rendered), decoded);
    }
}
