//! In-memory chains for driving the relayer in tests.

mod block;
mod error;
mod mock;
mod state;
mod store;

pub use block::MockBlock;
pub use error::MockError;
pub use mock::{
    MockChain, MockChainConfig, OutgoingPacket, SenderAttribute, DEFAULT_BLOCK_TIME,
    DEFAULT_MAX_PAGE_SIZE, DEFAULT_SIGNER, GENESIS_TIMESTAMP_NANOS,
};
pub use state::{SEND_PACKET_ACTION, SUCCESS_ACK};
pub use store::MockProof;
