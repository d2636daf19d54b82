//! A link pairs two endpoints over a connection and relays between them.

mod channel;
mod client;
mod connection;
mod relay;

use ibc_relayer_types::channel::{ChannelEnd, ChannelPair, Order, State as ChannelState};
use ibc_relayer_types::connection::{ConnectionEnd, State as ConnectionState};
use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::{ChannelId, ConnectionId, PortId};
use ibc_relayer_types::query::QueryOpts;
use tracing::info;

use self::channel::ChannelHandshake;
use self::client::create_client;
use self::connection::ConnectionHandshake;
use self::relay::Direction;
use crate::chain::ChainClient;
use crate::config::LinkConfig;
use crate::endpoint::{Endpoint, QuerySettings};
use crate::error::{HandshakeStep, RelayerError};
use crate::handle::ChainHandle;
use crate::matcher::{match_pending, ChainStatus, PendingRelays, SideState};
use crate::report::{RelayCheckpoint, RelayOpts, RelayReport};

/// One side of a link.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

/// Two endpoints whose connections name each other.
pub struct Link<A, B> {
    end_a: Endpoint<A>,
    end_b: Endpoint<B>,
    config: LinkConfig,
}

impl<A, B> Link<A, B>
where
    A: ChainClient,
    B: ChainClient,
{
    /// Creates a client on each chain tracking the other, then opens a
    /// connection between them from `A`.
    ///
    /// A failing step aborts with [`RelayerError::HandshakeFailed`]. What the
    /// chains already committed stays as is.
    pub async fn create_with_new_connections(
        chain_a: ChainHandle<A>,
        chain_b: ChainHandle<B>,
        config: LinkConfig,
    ) -> Result<Self, RelayerError> {
        let retry = config.retry;

        let (client_id_on_a, client_id_on_b) = tokio::try_join!(
            create_client(&chain_b, &chain_a, &retry),
            create_client(&chain_a, &chain_b, &retry),
        )
        .map_err(|e| e.in_step(HandshakeStep::CreateClient))?;

        let (conn_id_on_a, conn_id_on_b) = ConnectionHandshake {
            chain_a: &chain_a,
            chain_b: &chain_b,
            client_id_on_a: &client_id_on_a,
            client_id_on_b: &client_id_on_b,
            delay_period: config.delay_period,
            retry: &retry,
        }
        .run()
        .await?;

        let settings = QuerySettings::from(&config);
        let link = Self {
            end_a: Endpoint::new(chain_a, client_id_on_a, conn_id_on_a).with_settings(settings.clone()),
            end_b: Endpoint::new(chain_b, client_id_on_b, conn_id_on_b).with_settings(settings),
            config,
        };

        link.verify_connections()
            .await
            .map_err(|e| e.in_step(HandshakeStep::Verify))?;

        info!(
            chain_a = %link.end_a.chain_id(),
            connection_a = %link.end_a.connection_id(),
            chain_b = %link.end_b.chain_id(),
            connection_b = %link.end_b.connection_id(),
            "connection open"
        );

        Ok(link)
    }

    /// Builds a link over connections that are already open and name each
    /// other as counterparty. No transaction is submitted.
    pub async fn create_with_existing_connections(
        chain_a: ChainHandle<A>,
        chain_b: ChainHandle<B>,
        conn_id_on_a: ConnectionId,
        conn_id_on_b: ConnectionId,
        config: LinkConfig,
    ) -> Result<Self, RelayerError> {
        let retry = config.retry;

        let (conn_end_on_a, conn_end_on_b) = tokio::try_join!(
            chain_a.query_connection(&conn_id_on_a, &retry),
            chain_b.query_connection(&conn_id_on_b, &retry),
        )?;

        let conn_end_on_a = require_open(&chain_a, &conn_id_on_a, conn_end_on_a)?;
        let conn_end_on_b = require_open(&chain_b, &conn_id_on_b, conn_end_on_b)?;

        require_counterparty(&chain_a, &conn_id_on_a, &conn_end_on_a, &conn_id_on_b, &conn_end_on_b)?;
        require_counterparty(&chain_b, &conn_id_on_b, &conn_end_on_b, &conn_id_on_a, &conn_end_on_a)?;

        let settings = QuerySettings::from(&config);

        info!(
            chain_a = %chain_a.chain_id(),
            connection_a = %conn_id_on_a,
            chain_b = %chain_b.chain_id(),
            connection_b = %conn_id_on_b,
            "reusing open connection"
        );

        Ok(Self {
            end_a: Endpoint::new(chain_a, conn_end_on_a.client_id, conn_id_on_a)
                .with_settings(settings.clone()),
            end_b: Endpoint::new(chain_b, conn_end_on_b.client_id, conn_id_on_b)
                .with_settings(settings),
            config,
        })
    }

    pub fn end_a(&self) -> &Endpoint<A> {
        &self.end_a
    }

    pub fn end_b(&self) -> &Endpoint<B> {
        &self.end_b
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Opens a channel from `side` between `src_port` there and `dest_port`
    /// on the other side. `version` defaults to the configured channel
    /// version. The returned pair is oriented from `A` whichever side
    /// initiated.
    pub async fn create_channel(
        &self,
        side: Side,
        src_port: PortId,
        dest_port: PortId,
        ordering: Order,
        version: Option<String>,
    ) -> Result<ChannelPair, RelayerError> {
        let version = version.unwrap_or_else(|| self.config.default_channel_version.clone());

        let pair = match side {
            Side::A => {
                ChannelHandshake {
                    end_a: &self.end_a,
                    end_b: &self.end_b,
                    port_id_on_a: &src_port,
                    port_id_on_b: &dest_port,
                    ordering,
                    version: &version,
                }
                .run()
                .await?
            }
            Side::B => ChannelHandshake {
                end_a: &self.end_b,
                end_b: &self.end_a,
                port_id_on_a: &src_port,
                port_id_on_b: &dest_port,
                ordering,
                version: &version,
            }
            .run()
            .await?
            .flipped(),
        };

        self.verify_channel(&pair)
            .await
            .map_err(|e| e.in_step(HandshakeStep::Verify))?;

        info!(%pair, ?side, %ordering, %version, "channel open");

        Ok(pair)
    }

    /// Checks that both ends of `pair` are open.
    pub async fn verify_channel(&self, pair: &ChannelPair) -> Result<(), RelayerError> {
        let (chan_end_a, chan_end_b) = tokio::try_join!(
            self.end_a.query_channel(&pair.port_id_a, &pair.chan_id_a),
            self.end_b.query_channel(&pair.port_id_b, &pair.chan_id_b),
        )?;

        require_open_channel(&self.end_a, &pair.port_id_a, &pair.chan_id_a, chan_end_a)?;
        require_open_channel(&self.end_b, &pair.port_id_b, &pair.chan_id_b, chan_end_b)?;

        Ok(())
    }

    /// What both chains still owe each other, as the matcher sees it.
    pub async fn pending_relays(&self, opts: &RelayOpts) -> Result<PendingRelays, RelayerError> {
        let (pending, _) = self.pending(opts).await?;
        Ok(pending)
    }

    /// Delivers every pending packet in both directions, then times out the
    /// expired ones.
    pub async fn relay_packets(&self, opts: &RelayOpts) -> Result<RelayReport, RelayerError> {
        let (pending, _) = self.pending(opts).await?;
        self.deliver_packets(pending, opts).await
    }

    /// Returns every pending acknowledgement to the chain that sent the packet.
    pub async fn relay_acks(&self, opts: &RelayOpts) -> Result<RelayReport, RelayerError> {
        let (pending, _) = self.pending(opts).await?;

        let a_to_b = Direction {
            src: &self.end_a,
            dst: &self.end_b,
            opts,
        };
        let b_to_a = Direction {
            src: &self.end_b,
            dst: &self.end_a,
            opts,
        };

        let (on_a, on_b) = tokio::try_join!(
            a_to_b.acknowledge_packets(pending.acks_b_to_a),
            b_to_a.acknowledge_packets(pending.acks_a_to_b),
        )?;

        let report = on_a.merge(on_b);
        info!(%report, "relayed acknowledgements");

        Ok(report)
    }

    /// Relays packets, then acknowledgements, including those written by
    /// this round's packets.
    ///
    /// The checkpoint is where the next round may start scanning. While
    /// packets remain failed or abandoned, it stays at the bounds of `opts`.
    pub async fn relay_all(
        &self,
        opts: &RelayOpts,
    ) -> Result<(RelayReport, RelayCheckpoint), RelayerError> {
        let (pending, scanned) = self.pending(opts).await?;
        let packets = self.deliver_packets(pending, opts).await?;
        let acks = self.relay_acks(opts).await?;

        let report = packets.merge(acks);
        let checkpoint = if report.is_complete() {
            scanned
        } else {
            RelayCheckpoint {
                height_a: lower_bound(scanned.height_a, opts.min_height_a)?,
                height_b: lower_bound(scanned.height_b, opts.min_height_b)?,
            }
        };

        Ok((report, checkpoint))
    }

    async fn deliver_packets(
        &self,
        pending: PendingRelays,
        opts: &RelayOpts,
    ) -> Result<RelayReport, RelayerError> {
        let a_to_b = Direction {
            src: &self.end_a,
            dst: &self.end_b,
            opts,
        };
        let b_to_a = Direction {
            src: &self.end_b,
            dst: &self.end_a,
            opts,
        };

        let (received_on_b, received_on_a) = tokio::try_join!(
            a_to_b.receive_packets(pending.packets_a_to_b),
            b_to_a.receive_packets(pending.packets_b_to_a),
        )?;

        let (timed_out_on_a, timed_out_on_b) = tokio::try_join!(
            a_to_b.timeout_packets(pending.timed_out_on_a),
            b_to_a.timeout_packets(pending.timed_out_on_b),
        )?;

        let report = received_on_b
            .merge(received_on_a)
            .merge(timed_out_on_a)
            .merge(timed_out_on_b);
        info!(%report, "relayed packets");

        Ok(report)
    }

    /// Scans both chains and matches what they report. Also returns the
    /// heights the scan saw.
    async fn pending(&self, opts: &RelayOpts) -> Result<(PendingRelays, RelayCheckpoint), RelayerError> {
        let opts_a = opts.query_opts_a();
        let opts_b = opts.query_opts_b();

        let (side_a, side_b) = tokio::try_join!(
            side_state(&self.end_a, &opts_a),
            side_state(&self.end_b, &opts_b),
        )?;

        let scanned = RelayCheckpoint {
            height_a: side_a.status.height,
            height_b: side_b.status.height,
        };

        Ok((match_pending(&side_a, &side_b), scanned))
    }

    async fn verify_connections(&self) -> Result<(), RelayerError> {
        let (conn_end_a, conn_end_b) = tokio::try_join!(
            self.end_a.query_connection(),
            self.end_b.query_connection(),
        )?;

        require_open(self.end_a.chain(), self.end_a.connection_id(), conn_end_a)?;
        require_open(self.end_b.chain(), self.end_b.connection_id(), conn_end_b)?;

        Ok(())
    }
}

async fn side_state<C: ChainClient>(
    end: &Endpoint<C>,
    opts: &QueryOpts,
) -> Result<SideState, RelayerError> {
    let (sent, written_acks, settled, commit) = tokio::try_join!(
        end.query_sent_packets(opts),
        end.query_written_acks(opts),
        end.query_settled_packets(opts),
        end.latest_commit(),
    )?;

    Ok(SideState {
        sent,
        written_acks,
        settled,
        status: ChainStatus {
            height: commit.height,
            timestamp: commit.timestamp,
        },
    })
}

/// The configured lower bound on the chain's revision, or the first block.
fn lower_bound(scanned: Height, min_height: Option<u64>) -> Result<Height, RelayerError> {
    Ok(Height::new(
        scanned.revision_number(),
        min_height.unwrap_or(1).max(1),
    )?)
}

fn require_open<C: ChainClient>(
    chain: &ChainHandle<C>,
    connection_id: &ConnectionId,
    conn_end: Option<ConnectionEnd>,
) -> Result<ConnectionEnd, RelayerError> {
    match conn_end {
        Some(conn_end) if conn_end.is_open() => Ok(conn_end),
        other => Err(RelayerError::ConnectionNotOpen {
            chain_id: chain.chain_id(),
            connection_id: connection_id.clone(),
            state: other
                .map_or(ConnectionState::Uninitialized, |end| end.state)
                .to_string(),
        }),
    }
}

/// Checks that `conn_end` names `remote_id` and the client `remote_end` is
/// built on.
fn require_counterparty<C: ChainClient>(
    chain: &ChainHandle<C>,
    connection_id: &ConnectionId,
    conn_end: &ConnectionEnd,
    remote_id: &ConnectionId,
    remote_end: &ConnectionEnd,
) -> Result<(), RelayerError> {
    let mismatch = |description: String| RelayerError::ConnectionMismatch {
        chain_id: chain.chain_id(),
        connection_id: connection_id.clone(),
        description,
    };

    match &conn_end.counterparty.connection_id {
        Some(id) if id == remote_id => {}
        Some(id) => {
            return Err(mismatch(format!(
                "counterparty connection is `{id}`, expected `{remote_id}`"
            )))
        }
        None => return Err(mismatch(format!("no counterparty connection, expected `{remote_id}`"))),
    }

    if conn_end.counterparty.client_id != remote_end.client_id {
        return Err(mismatch(format!(
            "counterparty client is `{}`, expected `{}`",
            conn_end.counterparty.client_id, remote_end.client_id
        )));
    }

    Ok(())
}

fn require_open_channel<C: ChainClient>(
    end: &Endpoint<C>,
    port_id: &PortId,
    channel_id: &ChannelId,
    chan_end: Option<ChannelEnd>,
) -> Result<(), RelayerError> {
    match chan_end {
        Some(chan_end) if chan_end.is_open() => Ok(()),
        other => Err(RelayerError::ChannelNotOpen {
            chain_id: end.chain_id(),
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
            state: other
                .map_or(ChannelState::Uninitialized, |end| end.state)
                .to_string(),
        }),
    }
}
