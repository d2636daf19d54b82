//! Link configuration.

use core::time::Duration;

use ibc_relayer_types::events::lookup::{default_sender_lookups, AttributeLookup};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::retry::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_CHANNEL_VERSION: &str = "ics20-1";

/// Configuration shared by both endpoints of a link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct LinkConfig {
    /// Transactions requested per page of a tx search.
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Delay period of the connections this link opens.
    #[builder(default = Duration::ZERO)]
    pub delay_period: Duration,
    /// Channel version proposed when none is given.
    #[builder(default = DEFAULT_CHANNEL_VERSION.to_string(), setter(into))]
    pub default_channel_version: String,
    /// Where to find the sender of a transaction, tried in order.
    #[builder(default = default_sender_lookups())]
    pub sender_lookups: Vec<AttributeLookup>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: LinkConfig =
            serde_json::from_str(r#"{"page_size": 10}"#).expect("valid config");

        assert_eq!(config.page_size, 10);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.default_channel_version, DEFAULT_CHANNEL_VERSION);
        assert_eq!(config.sender_lookups, default_sender_lookups());
    }
}
