//! The JSON transaction log Cosmos SDK chains attach to every tx:
//! `[{"msg_index":0,"events":[{"type":"..","attributes":[{"key":"..","value":".."}]}]}]`.

use serde::{Deserialize, Serialize};

use crate::error::DecodingError;

/// The events emitted while executing one message of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciMessageLog {
    #[serde(default)]
    pub msg_index: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log: String,
    #[serde(default)]
    pub events: Vec<StringEvent>,
}

/// An event with its attributes in string form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl StringEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// The value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Parses a raw transaction log. An empty log has no messages.
pub fn parse_raw_log(raw_log: &str) -> Result<Vec<AbciMessageLog>, DecodingError> {
    if raw_log.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(raw_log).map_err(|e| DecodingError::MalformedLog {
        description: e.to_string(),
    })
}

/// Renders message logs back into the raw JSON form.
pub fn to_raw_log(logs: &[AbciMessageLog]) -> String {
    serde_json::to_string(logs).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cosmos_sdk_log() {
        let raw = r#"[{"msg_index":0,"events":[{"type":"message","attributes":[{"key":"action","value":"/ibc.applications.transfer.v1.MsgTransfer"},{"key":"sender","value":"cosmos1abc"}]},{"type":"send_packet","attributes":[{"key":"packet_sequence","value":"1"}]}]}]"#;

        let logs = parse_raw_log(raw).expect("valid raw log");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].events.len(), 2);
        assert_eq!(logs[0].events[0].attribute("sender"), Some("cosmos1abc"));
        assert_eq!(logs[0].events[1].kind, "send_packet");
    }

    #[test]
    fn failed_tx_log_is_malformed() {
        let raw = "failed to execute message; message index: 0: packet sequence is out of order";
        assert!(matches!(
            parse_raw_log(raw),
            Err(DecodingError::MalformedLog { .. })
        ));
    }

    #[test]
    fn empty_log_has_no_messages() {
        assert_eq!(parse_raw_log(""), Ok(Vec::new()));
    }
}
