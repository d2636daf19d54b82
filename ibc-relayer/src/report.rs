//! Outcomes of relay rounds.

use core::fmt::{Display, Error as FmtError, Formatter};

use ibc_relayer_types::height::Height;
use ibc_relayer_types::packet::PacketKey;
use ibc_relayer_types::query::QueryOpts;
use tokio::time::Instant;

use crate::error::RelayerError;

/// Options of one relay round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayOpts {
    /// Only consider events of chain A at or above this height.
    pub min_height_a: Option<u64>,
    /// Only consider events of chain B at or above this height.
    pub min_height_b: Option<u64>,
    /// Packets not yet submitted when the deadline passes are abandoned.
    pub deadline: Option<Instant>,
}

impl RelayOpts {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn query_opts_a(&self) -> QueryOpts {
        QueryOpts {
            min_height: self.min_height_a,
            ..Default::default()
        }
    }

    pub(crate) fn query_opts_b(&self) -> QueryOpts {
        QueryOpts {
            min_height: self.min_height_b,
            ..Default::default()
        }
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// Where the next relay round may start scanning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RelayCheckpoint {
    pub height_a: Height,
    pub height_b: Height,
}

impl From<RelayCheckpoint> for RelayOpts {
    fn from(checkpoint: RelayCheckpoint) -> Self {
        Self {
            min_height_a: Some(checkpoint.height_a.revision_height()),
            min_height_b: Some(checkpoint.height_b.revision_height()),
            deadline: None,
        }
    }
}

/// What a relay round did, per packet.
///
/// Keys are oriented from the chain that sent the packet.
#[derive(Debug, Default)]
pub struct RelayReport {
    /// Packets received on their destination.
    pub received: Vec<PacketKey>,
    /// Acknowledgements processed by the sending chain.
    pub acknowledged: Vec<PacketKey>,
    /// Timeouts processed by the sending chain.
    pub timed_out: Vec<PacketKey>,
    /// One [`RelayerError::RelayFailed`] per packet that could not be relayed.
    pub failed: Vec<RelayerError>,
    /// Packets left unsubmitted, because the round's deadline passed or a
    /// timeout closed their ordered channel earlier in the round.
    pub abandoned: Vec<PacketKey>,
}

impl RelayReport {
    pub fn merge(mut self, other: RelayReport) -> Self {
        self.received.extend(other.received);
        self.acknowledged.extend(other.acknowledged);
        self.timed_out.extend(other.timed_out);
        self.failed.extend(other.failed);
        self.abandoned.extend(other.abandoned);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.received.is_empty()
            && self.acknowledged.is_empty()
            && self.timed_out.is_empty()
            && self.failed.is_empty()
            && self.abandoned.is_empty()
    }

    /// Whether every packet the round found was relayed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty()
    }
}

impl Display for RelayReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "received: {}, acknowledged: {}, timed out: {}, failed: {}, abandoned: {}",
            self.received.len(),
            self.acknowledged.len(),
            self.timed_out.len(),
            self.failed.len(),
            self.abandoned.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use ibc_relayer_types::identifiers::{ChannelId, PortId};

    use super::*;

    fn key(sequence: u64) -> PacketKey {
        PacketKey {
            port_id_on_a: PortId::transfer(),
            chan_id_on_a: ChannelId::new(0),
            port_id_on_b: PortId::transfer(),
            chan_id_on_b: ChannelId::new(1),
            sequence: sequence.into(),
        }
    }

    #[test]
    fn merge_concatenates_outcomes() {
        let first = RelayReport {
            received: vec![key(1)],
            ..Default::default()
        };
        let second = RelayReport {
            acknowledged: vec![key(1)],
            abandoned: vec![key(2)],
            ..Default::default()
        };

        let merged = first.merge(second);
        assert_eq!(merged.received, vec![key(1)]);
        assert_eq!(merged.acknowledged, vec![key(1)]);
        assert!(!merged.is_complete());
        assert_eq!(
            merged.to_string(),
            "received: 1, acknowledged: 1, timed out: 0, failed: 0, abandoned: 1"
        );
    }

    #[test]
    fn checkpoint_sets_both_lower_bounds() {
        let checkpoint = RelayCheckpoint {
            height_a: Height::new(0, 12).expect("non-zero height"),
            height_b: Height::new(1, 7).expect("non-zero height"),
        };

        let opts = RelayOpts::from(checkpoint);
        assert_eq!(opts.min_height_a, Some(12));
        assert_eq!(opts.min_height_b, Some(7));
        assert_eq!(opts.query_opts_b().min_height, Some(7));
        assert!(RelayReport::default().is_empty());
    }
}
