//! Packets and acknowledgements as found in a chain's transaction history,
//! together with where they were found.

use crate::acknowledgement::Acknowledgement;
use crate::height::Height;
use crate::packet::{Packet, PacketKey};

/// A sent packet and the height of the block that committed it.
///
/// Proofs of the packet commitment exist at `height` and above. `sender` is
/// the account that submitted the sending transaction, or empty if the log
/// did not reveal it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketWithMetadata {
    pub packet: Packet,
    pub height: Height,
    pub sender: String,
}

impl PacketWithMetadata {
    pub fn key(&self) -> PacketKey {
        self.packet.key()
    }
}

/// An acknowledgement written by the receiving chain for `packet`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckWithMetadata {
    pub packet: Packet,
    pub acknowledgement: Acknowledgement,
    pub height: Height,
}

impl AckWithMetadata {
    pub fn key(&self) -> PacketKey {
        self.packet.key()
    }
}
