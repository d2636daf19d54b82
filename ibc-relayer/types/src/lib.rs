//! Domain types shared by the relayer crates.
//!
//! Everything here is plain data: identifiers, heights, packets, channel and
//! connection ends, ICS-24 store paths, typed decoding of the events chains
//! report in their transaction logs, tx-search queries, and the messages the
//! relayer submits, together with their protobuf `Any` encoding.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(trivial_numeric_casts, unused_import_braces, rust_2018_idioms)]

pub mod acknowledgement;
pub mod channel;
pub mod connection;
pub mod error;
pub mod events;
pub mod height;
pub mod identifiers;
pub mod metadata;
pub mod msgs;
pub mod packet;
pub mod path;
pub mod proof;
pub mod query;
pub mod timestamp;
pub mod timeout;
pub mod validate;

/// Re-exports of the raw protobuf types the relayer exchanges with chains.
pub mod proto {
    pub use ibc_proto::google::protobuf::Any;
    pub use ibc_proto::ibc::core::channel::v1 as channel;
    pub use ibc_proto::ibc::core::client::v1 as client;
    pub use ibc_proto::ibc::core::commitment::v1 as commitment;
    pub use ibc_proto::ibc::core::connection::v1 as connection;
    pub use prost::Message;
}
