//! Test support for the relayer.
//!
//! [`MockChain`](hosts::MockChain) is an in-memory chain that implements
//! [`ChainClient`](ibc_relayer::chain::ChainClient): it executes the relayer's
//! messages against a versioned store, proves store values at past heights,
//! hosts [mock light clients](clients::mock) of its counterparties and keeps a
//! searchable transaction history with cosmos-style raw logs.
#![forbid(unsafe_code)]
#![deny(trivial_numeric_casts, unused_import_braces, rust_2018_idioms)]

pub mod clients;
pub mod fixtures;
pub mod hosts;
