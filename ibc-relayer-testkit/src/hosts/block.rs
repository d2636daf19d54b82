use core::time::Duration;

use ibc_relayer_types::height::Height;
use ibc_relayer_types::timestamp::Timestamp;
use sha2::{Digest, Sha256};
use tendermint::Hash;

use crate::clients::mock::MockHeader;

/// A block of a mock chain. Blocks carry no transactions of their own; the
/// chain keeps its transaction history separately.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockBlock {
    pub height: Height,
    pub timestamp: Timestamp,
    pub hash: Hash,
}

impl MockBlock {
    pub fn genesis(revision_number: u64, timestamp: Timestamp) -> Self {
        Self::generate(Height::min(revision_number), timestamp)
    }

    /// The block following `self`, `block_time` later.
    pub fn next(&self, block_time: Duration) -> Self {
        let timestamp = self
            .timestamp
            .checked_add(block_time)
            .unwrap_or(self.timestamp);

        Self::generate(self.height.increment(), timestamp)
    }

    pub fn header(&self) -> MockHeader {
        MockHeader {
            height: self.height,
            timestamp: self.timestamp,
        }
    }

    fn generate(height: Height, timestamp: Timestamp) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(height.revision_number().to_be_bytes());
        hasher.update(height.revision_height().to_be_bytes());
        hasher.update(timestamp.nanoseconds().to_be_bytes());

        Self {
            height,
            timestamp,
            hash: Hash::Sha256(hasher.finalize().into()),
        }
    }
}
