//! Strategies to recover the account that submitted a transaction from the
//! events in its log.

use serde::{Deserialize, Serialize};

use super::abci::AbciMessageLog;
use super::attributes::{SENDER_ATTRIBUTE_KEY, SIGNER_ATTRIBUTE_KEY};
use super::MESSAGE_EVENT;

/// Looks up the first non-empty `key` attribute of any `event_kind` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLookup {
    pub event_kind: String,
    pub key: String,
}

impl AttributeLookup {
    pub fn new(event_kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_kind: event_kind.into(),
            key: key.into(),
        }
    }

    pub fn find(&self, logs: &[AbciMessageLog]) -> Option<String> {
        logs.iter()
            .flat_map(|log| log.events.iter())
            .filter(|event| event.kind == self.event_kind)
            .find_map(|event| {
                event
                    .attributes
                    .iter()
                    .find(|attr| attr.key == self.key && !attr.value.is_empty())
            })
            .map(|attr| attr.value.clone())
    }
}

/// `message.sender`, then `message.signer`.
pub fn default_sender_lookups() -> Vec<AttributeLookup> {
    vec![
        AttributeLookup::new(MESSAGE_EVENT, SENDER_ATTRIBUTE_KEY),
        AttributeLookup::new(MESSAGE_EVENT, SIGNER_ATTRIBUTE_KEY),
    ]
}

/// Tries each lookup in order and returns the first match.
pub fn resolve_first(lookups: &[AttributeLookup], logs: &[AbciMessageLog]) -> Option<String> {
    lookups.iter().find_map(|lookup| lookup.find(logs))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::events::abci::StringEvent;

    fn logs_with_message(attributes: &[(&str, &str)]) -> Vec<AbciMessageLog> {
        let event = attributes
            .iter()
            .fold(StringEvent::new(MESSAGE_EVENT), |event, (key, value)| {
                event.with_attribute(*key, *value)
            });

        vec![AbciMessageLog {
            events: vec![StringEvent::new("send_packet"), event],
            ..Default::default()
        }]
    }

    #[rstest]
    #[case(&[("sender", "cosmos1sender"), ("signer", "cosmos1signer")], Some("cosmos1sender"))]
    #[case(&[("signer", "cosmos1signer")], Some("cosmos1signer"))]
    #[case(&[("sender", ""), ("signer", "cosmos1signer")], Some("cosmos1signer"))]
    #[case(&[("action", "transfer")], None)]
    fn falls_back_from_sender_to_signer(
        #[case] attributes: &[(&str, &str)],
        #[case] expected: Option<&str>,
    ) {
        let logs = logs_with_message(attributes);
        assert_eq!(
            resolve_first(&default_sender_lookups(), &logs),
            expected.map(str::to_string)
        );
    }
}
