//! Transaction search queries in the Tendermint/CometBFT query language, and
//! the options the relayer narrows them with.

use core::fmt::{Display, Error as FmtError, Formatter};

use crate::events::abci::StringEvent;
use crate::events::attributes::{
    PKT_DST_CHANNEL_ATTRIBUTE_KEY, PKT_DST_PORT_ATTRIBUTE_KEY, PKT_SRC_CHANNEL_ATTRIBUTE_KEY,
    PKT_SRC_PORT_ATTRIBUTE_KEY,
};
use crate::identifiers::{ChannelId, PortId};
use crate::packet::Packet;

/// `{event_kind}.{key}='{value}'`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventCondition {
    pub event_kind: String,
    pub key: String,
    pub value: String,
}

impl EventCondition {
    pub fn matches(&self, events: &[StringEvent]) -> bool {
        events.iter().any(|event| {
            event.kind == self.event_kind
                && event
                    .attributes
                    .iter()
                    .any(|attr| attr.key == self.key && attr.value == self.value)
        })
    }
}

impl Display for EventCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}.{}='{}'", self.event_kind, self.key, self.value)
    }
}

/// A conjunction of event conditions, optionally bounded by `tx.height`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxQuery {
    conditions: Vec<EventCondition>,
    min_height: Option<u64>,
    max_height: Option<u64>,
}

impl TxQuery {
    pub fn event(event_kind: &str, key: &str, value: impl ToString) -> Self {
        Self {
            conditions: Vec::new(),
            min_height: None,
            max_height: None,
        }
        .and_event(event_kind, key, value)
    }

    pub fn and_event(mut self, event_kind: &str, key: &str, value: impl ToString) -> Self {
        self.conditions.push(EventCondition {
            event_kind: event_kind.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Restricts to `tx.height>=min_height`.
    pub fn with_min_height(mut self, min_height: Option<u64>) -> Self {
        self.min_height = min_height;
        self
    }

    /// Restricts to `tx.height<=max_height`.
    pub fn with_max_height(mut self, max_height: Option<u64>) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn conditions(&self) -> &[EventCondition] {
        &self.conditions
    }

    pub fn min_height(&self) -> Option<u64> {
        self.min_height
    }

    pub fn max_height(&self) -> Option<u64> {
        self.max_height
    }

    /// Whether a transaction committed at `height` with these events
    /// satisfies the query. Each condition may be met by a different event.
    pub fn matches(&self, height: u64, events: &[StringEvent]) -> bool {
        self.min_height.map_or(true, |min| height >= min)
            && self.max_height.map_or(true, |max| height <= max)
            && self.conditions.iter().all(|c| c.matches(events))
    }
}

impl Display for TxQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let mut clauses: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();

        if let Some(min) = self.min_height {
            clauses.push(format!("tx.height>={min}"));
        }
        if let Some(max) = self.max_height {
            clauses.push(format!("tx.height<={max}"));
        }

        write!(f, "{}", clauses.join(" AND "))
    }
}

/// One page of a paginated search; `page` starts at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    pub fn next(&self) -> Self {
        Self::new(self.page.saturating_add(1), self.per_page)
    }

    /// Index of the first item of the page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.per_page as usize)
    }
}

/// Restricts packet queries to given ports and channels. Unset fields match
/// anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    pub src_port_id: Option<PortId>,
    pub src_channel_id: Option<ChannelId>,
    pub dest_port_id: Option<PortId>,
    pub dest_channel_id: Option<ChannelId>,
}

impl Filter {
    /// Adds a condition on `event_kind` for every set field.
    pub fn apply(&self, query: TxQuery, event_kind: &str) -> TxQuery {
        let fields = [
            (PKT_SRC_PORT_ATTRIBUTE_KEY, self.src_port_id.as_ref().map(PortId::as_str)),
            (PKT_SRC_CHANNEL_ATTRIBUTE_KEY, self.src_channel_id.as_ref().map(ChannelId::as_str)),
            (PKT_DST_PORT_ATTRIBUTE_KEY, self.dest_port_id.as_ref().map(PortId::as_str)),
            (PKT_DST_CHANNEL_ATTRIBUTE_KEY, self.dest_channel_id.as_ref().map(ChannelId::as_str)),
        ];

        fields
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .fold(query, |query, (key, value)| query.and_event(event_kind, key, value))
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        self.src_port_id.as_ref().map_or(true, |p| *p == packet.port_id_on_a)
            && self.src_channel_id.as_ref().map_or(true, |c| *c == packet.chan_id_on_a)
            && self.dest_port_id.as_ref().map_or(true, |p| *p == packet.port_id_on_b)
            && self.dest_channel_id.as_ref().map_or(true, |c| *c == packet.chan_id_on_b)
    }
}

/// Options of the endpoint packet and ack queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOpts {
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    pub filter: Option<Filter>,
}

impl QueryOpts {
    pub fn from_height(min_height: u64) -> Self {
        Self {
            min_height: Some(min_height),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The query for `event_kind` events on `connection_id`, narrowed by these options.
    pub fn to_query(&self, event_kind: &str, connection_key: &str, connection_id: &str) -> TxQuery {
        let query = TxQuery::event(event_kind, connection_key, connection_id)
            .with_min_height(self.min_height)
            .with_max_height(self.max_height);

        match &self.filter {
            Some(filter) => filter.apply(query, event_kind),
            None => query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::attributes::PKT_CONNECTION_ID_ATTRIBUTE_KEY;
    use crate::events::SEND_PACKET_EVENT;

    #[test]
    fn renders_connection_query_with_height_bounds() {
        let opts = QueryOpts {
            min_height: Some(5),
            max_height: Some(9),
            filter: None,
        };

        let query = opts.to_query(SEND_PACKET_EVENT, PKT_CONNECTION_ID_ATTRIBUTE_KEY, "connection-0");
        assert_eq!(
            query.to_string(),
            "send_packet.packet_connection='connection-0' AND tx.height>=5 AND tx.height<=9"
        );
    }

    #[test]
    fn filter_adds_only_set_fields() {
        let filter = Filter {
            src_port_id: Some(PortId::transfer()),
            dest_channel_id: Some(ChannelId::new(4)),
            ..Default::default()
        };

        let opts = QueryOpts::default().with_filter(filter);
        let query = opts.to_query(SEND_PACKET_EVENT, PKT_CONNECTION_ID_ATTRIBUTE_KEY, "connection-1");
        assert_eq!(
            query.to_string(),
            "send_packet.packet_connection='connection-1' AND send_packet.packet_src_port='transfer' \
             AND send_packet.packet_dst_channel='channel-4'"
        );
    }

    #[test]
    fn matches_checks_heights_and_every_condition() {
        let query = TxQuery::event(SEND_PACKET_EVENT, PKT_CONNECTION_ID_ATTRIBUTE_KEY, "connection-0")
            .with_min_height(Some(3));
        let events = vec![StringEvent::new(SEND_PACKET_EVENT)
            .with_attribute(PKT_CONNECTION_ID_ATTRIBUTE_KEY, "connection-0")];

        assert!(query.matches(3, &events));
        assert!(!query.matches(2, &events));
        assert!(!query.matches(3, &[StringEvent::new(SEND_PACKET_EVENT)]));
    }

    #[test]
    fn pagination_offsets() {
        let first = Pagination::first(50);
        assert_eq!(first.offset(), 0);
        assert_eq!(first.next().offset(), 50);
    }
}
