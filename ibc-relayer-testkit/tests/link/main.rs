//! Links between mock chains, driven end to end.

mod endpoint;
mod handshake;
mod relay;
mod timeout;
