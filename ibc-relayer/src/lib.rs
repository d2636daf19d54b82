//! Relayer core for IBC.
//!
//! An [`Endpoint`](endpoint::Endpoint) is the relayer's view of one chain,
//! bound to a light client and a connection. A [`Link`](link::Link) pairs two
//! endpoints: it opens connections and channels between the chains, and in
//! every relay round it asks the [matcher](matcher) which packets,
//! acknowledgements and timeouts are still owed to each side and submits them.
//!
//! Chains are reached through the [`ChainClient`](chain::ChainClient) trait.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(trivial_numeric_casts, unused_import_braces, rust_2018_idioms)]

pub mod chain;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod link;
pub mod matcher;
pub mod report;
pub mod retry;

pub use ibc_relayer_types as types;
