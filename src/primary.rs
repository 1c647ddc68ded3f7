//! The primary side: a timer-driven handshake emitter, the REGISTER
//! acceptor, shutdown signalling, and the `takeover-from-secondary` startup
//! routine a primary runs when it finds itself displaced.
//!
//! Unlike the secondary side (`secondary.rs`), the primary's behaviour is
//! simple enough to describe directly as imperative steps rather than a
//! named state machine — so this module stays a thin async shell without a
//! separate pure-core module. `FailoverContext` still owns the one piece
//! of state that matters (`channel: Option<ControlChannel>`).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::channel::ControlChannel;
use crate::config::{Config, ShutdownPolicy};
use crate::context::FailoverContext;
use crate::error::Error;
use crate::event::HANDSHAKE_PERIOD;
use crate::liveness::{ActiveMarker, LivenessFile};
use crate::message::{FailoverReply, FailoverRequest, ReplyCode};
use crate::shutdown::Shutdown;
use crate::transport::{Connection, WireMessage};

/// Bounded deadline for dialing the secondary at startup.
pub const TAKEOVER_DIAL_DEADLINE: Duration = Duration::from_secs(4);

/// Bounded deadline for awaiting the secondary's PRIM_IS_BACK ack (spec
/// a safety margin measured in minutes, not seconds).
pub const TAKEOVER_ACK_DEADLINE: Duration = Duration::from_secs(600);

/// Bounded deadline the primary blocks on a shutdown-signal reply before
/// proceeding to local teardown regardless of whether a reply arrives.
pub const SHUTDOWN_ACK_DEADLINE: Duration = Duration::from_secs(30);

/// Bounded deadline for reading the first request off a freshly accepted
/// socket (must be REGISTER) and for writing the REGISTER reply.
const ACCEPT_DEADLINE: Duration = Duration::from_secs(8);

/// What `PrimaryController::run` returned the loop for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A clean shutdown signal was observed; local teardown may proceed.
    Shutdown,
    /// The active-marker file was sensed on a handshake tick: this
    /// primary was displaced. The caller should request a process
    /// restart; the restarted process calls [`takeover_from_secondary`]
    /// before resuming normal startup.
    Displaced,
}

pub struct PrimaryController {
    ctx: FailoverContext,
    liveness: LivenessFile,
    marker: ActiveMarker,
    listener: TcpListener,
    shutdown_policy: ShutdownPolicy,
}

impl PrimaryController {
    pub fn new(
        ctx: FailoverContext,
        liveness: LivenessFile,
        marker: ActiveMarker,
        listener: TcpListener,
        shutdown_policy: ShutdownPolicy,
    ) -> Self {
        PrimaryController {
            ctx,
            liveness,
            marker,
            listener,
            shutdown_policy,
        }
    }

    /// Runs the handshake timer, REGISTER acceptor, and peer-reply reader
    /// concurrently until shutdown or displacement, using `tokio::select!`
    /// as the central wait primitive.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<RunOutcome, Error> {
        let mut tick = interval(HANDSHAKE_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.handshake_tick().await? {
                        return Ok(RunOutcome::Displaced);
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr).await?,
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                read = read_channel(&mut self.ctx.channel) => {
                    self.handle_peer_read(read);
                }
                _ = shutdown.recv() => {
                    self.graceful_shutdown().await;
                    return Ok(RunOutcome::Shutdown);
                }
            }
        }
    }

    /// One handshake-timer tick:
    /// 1. touch the liveness file,
    /// 2. send HANDSHAKE if a secondary is registered,
    /// 3. stat the active-marker file and report displacement.
    async fn handshake_tick(&mut self) -> Result<bool, Error> {
        if let Err(e) = self.liveness.touch().await {
            warn!(error = %e, "failed to touch liveness file, will retry next tick");
        }

        if let Some(channel) = self.ctx.channel.as_mut() {
            match channel
                .connection
                .write_request(FailoverRequest::Handshake, TAKEOVER_DIAL_DEADLINE)
                .await
            {
                Ok(()) => {}
                Err(Error::PeerLost) => {
                    warn!("handshake send timed out, declaring secondary peer lost");
                    self.ctx.drop_peer();
                }
                Err(e) => return Err(e),
            }
        }

        if self.marker.exists().await? {
            warn!("secondary_active marker present: this server was displaced, requesting restart");
            return Ok(true);
        }
        Ok(false)
    }

    /// Accepting REGISTER: reject with *busy* if a peer is already
    /// connected; otherwise authenticate, reply with our host-identifier,
    /// and hold the channel open.
    async fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) -> Result<(), Error> {
        let mut conn = Connection::new(stream);

        let req = match timeout(ACCEPT_DEADLINE, conn.read_message()).await {
            Ok(Ok(Some(WireMessage::Request(req)))) => req,
            Ok(Ok(Some(WireMessage::Reply(_)))) | Ok(Ok(None)) | Err(_) => {
                debug!(%addr, "connection did not present a request before its deadline");
                return Ok(());
            }
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "failed reading first request");
                return Ok(());
            }
        };

        if req != FailoverRequest::Register {
            warn!(%addr, ?req, "first request on a new connection was not REGISTER");
            let _ = conn
                .write_reply(&FailoverReply::system_error(), ACCEPT_DEADLINE)
                .await;
            return Ok(());
        }

        if self.ctx.has_peer() {
            warn!(%addr, "rejecting REGISTER: a secondary is already connected");
            let _ = conn.write_reply(&FailoverReply::busy(), ACCEPT_DEADLINE).await;
            return Ok(());
        }

        let reply = FailoverReply::register_ok(self.ctx.local_host_id.to_decimal_string());
        if let Err(e) = conn.write_reply(&reply, ACCEPT_DEADLINE).await {
            warn!(%addr, error = %e, "failed to acknowledge REGISTER");
            return Ok(());
        }

        let mut channel = ControlChannel::new(conn);
        channel.mark_authenticated();
        self.ctx.channel = Some(channel);
        info!(secondary = %self.ctx.config.pbs_secondary, "registering {} as Secondary Server", self.ctx.config.pbs_secondary);
        Ok(())
    }

    /// Replies to HANDSHAKE (and the other signals we send) are pure
    /// acknowledgements; they are fire-and-forget in effect, so the only
    /// state change here is noticing the peer is gone.
    fn handle_peer_read(&mut self, read: Result<Option<WireMessage>, Error>) {
        match read {
            Ok(Some(WireMessage::Reply(_))) => {}
            Ok(Some(WireMessage::Request(req))) => {
                warn!(?req, "unexpected inbound request from secondary on control channel");
            }
            Ok(None) => {
                debug!("secondary closed the control channel");
                self.ctx.drop_peer();
            }
            Err(e) => {
                warn!(error = %e, "control channel read failed, treating peer as lost");
                self.ctx.drop_peer();
            }
        }
    }

    /// Shutdown signalling: send SECD_SHUTDOWN or SECD_GO_INACTIVE per
    /// operator policy, block on the reply up to a bounded deadline, then
    /// proceed regardless — failure to receive the reply is logged but not
    /// fatal.
    async fn graceful_shutdown(&mut self) {
        let Some(channel) = self.ctx.channel.as_mut() else {
            return;
        };

        let req = match self.shutdown_policy {
            ShutdownPolicy::Shutdown => FailoverRequest::SecdShutdown,
            ShutdownPolicy::GoInactive => FailoverRequest::SecdGoInactive,
        };

        if let Err(e) = channel.connection.write_request(req, SHUTDOWN_ACK_DEADLINE).await {
            warn!(error = %e, "failed to send shutdown signal to secondary");
            return;
        }

        match timeout(SHUTDOWN_ACK_DEADLINE, channel.connection.read_message()).await {
            Ok(Ok(Some(WireMessage::Reply(reply)))) if reply.code == ReplyCode::Ok => {
                info!("secondary acknowledged shutdown signal");
            }
            _ => warn!("no acknowledgement from secondary before shutdown deadline, proceeding anyway"),
        }
    }
}

/// Takeover-from-secondary: run once, at primary startup, when
/// the active-marker file was seen. Inability to dial, or absence of the
/// acknowledgement, is fatal — the caller maps the resulting
/// [`Error::Fatal`] to [`crate::error::exit_code::SECONDARY_REFUSED_IDLE`].
#[instrument(skip(config))]
pub async fn takeover_from_secondary(config: &Config) -> Result<(), Error> {
    let addr = config.secondary_addr();

    let stream = timeout(TAKEOVER_DIAL_DEADLINE, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::fatal(format!("dial to secondary {addr} timed out")))?
        .map_err(|e| Error::fatal(format!("cannot dial secondary {addr}: {e}")))?;

    let mut conn = Connection::new(stream);
    conn.write_request(FailoverRequest::PrimIsBack, TAKEOVER_DIAL_DEADLINE)
        .await
        .map_err(|_| Error::fatal("failed to send PRIM_IS_BACK to secondary"))?;

    match timeout(TAKEOVER_ACK_DEADLINE, conn.read_message()).await {
        Ok(Ok(Some(WireMessage::Reply(reply)))) if reply.code == ReplyCode::Ok => {
            info!("secondary acknowledged PRIM_IS_BACK, resuming full initialisation");
            Ok(())
        }
        Ok(Ok(other)) => Err(Error::fatal(format!(
            "secondary did not acknowledge PRIM_IS_BACK cleanly: {other:?}"
        ))),
        Ok(Err(e)) => Err(Error::fatal(format!("error awaiting PRIM_IS_BACK ack: {e}"))),
        Err(_elapsed) => Err(Error::fatal("secondary did not acknowledge PRIM_IS_BACK within 10 minutes")),
    }
}

async fn read_channel(channel: &mut Option<ControlChannel>) -> Result<Option<WireMessage>, Error> {
    match channel {
        Some(ch) => ch.connection.read_message().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecondaryDelay;
    use crate::license::HostId;
    use std::sync::Arc;
    use tokio::net::TcpListener as TestListener;

    fn test_config(priv_dir: &std::path::Path, secondary_port: u16) -> Config {
        Config {
            pbs_primary: "primary-host".to_string(),
            pbs_secondary: "127.0.0.1".to_string(),
            secondary_delay: SecondaryDelay::Seconds(30),
            auth_method: "none".to_string(),
            pbs_home_path: priv_dir.parent().unwrap().to_path_buf(),
            pbs_server_port_dis: secondary_port,
            shutdown_policy: ShutdownPolicy::Shutdown,
        }
    }

    async fn controller(listener: TcpListener, priv_dir: &std::path::Path) -> PrimaryController {
        let config = Arc::new(test_config(priv_dir, 0));
        let host_id = HostId::from_hostname("primary-host");
        let ctx = FailoverContext::new(crate::role::Role::Primary, config, host_id);
        PrimaryController::new(
            ctx,
            LivenessFile::new(priv_dir),
            ActiveMarker::new(priv_dir),
            listener,
            ShutdownPolicy::Shutdown,
        )
    }

    #[tokio::test]
    async fn accepts_register_and_replies_with_host_id() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut ctl = controller(listener, dir.path()).await;

        let client = TcpStream::connect(addr).await.unwrap();
        let mut client_conn = Connection::new(client);
        client_conn
            .write_request(FailoverRequest::Register, Duration::from_secs(1))
            .await
            .unwrap();

        let (stream, peer_addr) = ctl.listener.accept().await.unwrap();
        ctl.handle_accept(stream, peer_addr).await.unwrap();
        assert!(ctl.ctx.has_peer());

        let reply = client_conn.read_message().await.unwrap().unwrap();
        match reply {
            WireMessage::Reply(r) => {
                assert_eq!(r.code, ReplyCode::Ok);
                assert!(r.text.is_some());
            }
            _ => panic!("expected a reply"),
        }
    }

    #[tokio::test]
    async fn second_register_is_rejected_busy_without_disturbing_first_peer() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut ctl = controller(listener, dir.path()).await;

        // First secondary registers successfully.
        let first_client = TcpStream::connect(addr).await.unwrap();
        let mut first_conn = Connection::new(first_client);
        first_conn
            .write_request(FailoverRequest::Register, Duration::from_secs(1))
            .await
            .unwrap();
        let (stream, peer_addr) = ctl.listener.accept().await.unwrap();
        ctl.handle_accept(stream, peer_addr).await.unwrap();
        let _ = first_conn.read_message().await.unwrap().unwrap();
        assert!(ctl.ctx.has_peer());

        // A second secondary's REGISTER must be rejected busy.
        let second_client = TcpStream::connect(addr).await.unwrap();
        let mut second_conn = Connection::new(second_client);
        second_conn
            .write_request(FailoverRequest::Register, Duration::from_secs(1))
            .await
            .unwrap();
        let (stream, peer_addr) = ctl.listener.accept().await.unwrap();
        ctl.handle_accept(stream, peer_addr).await.unwrap();

        let reply = second_conn.read_message().await.unwrap().unwrap();
        match reply {
            WireMessage::Reply(r) => assert_eq!(r.code, ReplyCode::Busy),
            _ => panic!("expected a reply"),
        }
        // The existing peer is undisturbed: still present and it is still
        // the first connection's socket (no read error seen on it).
        assert!(ctl.ctx.has_peer());
    }

    #[tokio::test]
    async fn handshake_tick_touches_liveness_and_sends_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut ctl = controller(listener, dir.path()).await;

        let client = TcpStream::connect(addr).await.unwrap();
        let mut client_conn = Connection::new(client);
        client_conn
            .write_request(FailoverRequest::Register, Duration::from_secs(1))
            .await
            .unwrap();
        let (stream, peer_addr) = ctl.listener.accept().await.unwrap();
        ctl.handle_accept(stream, peer_addr).await.unwrap();
        let _ = client_conn.read_message().await.unwrap().unwrap();

        let displaced = ctl.handshake_tick().await.unwrap();
        assert!(!displaced);

        assert!(ctl.liveness.stat_mtime().await.unwrap().is_some());
        let msg = client_conn.read_message().await.unwrap().unwrap();
        assert_eq!(msg, WireMessage::Request(FailoverRequest::Handshake));
    }

    #[tokio::test]
    async fn handshake_tick_reports_displacement_when_marker_present() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let mut ctl = controller(listener, dir.path()).await;
        ctl.marker.create("new-active-host").await.unwrap();

        let displaced = ctl.handshake_tick().await.unwrap();
        assert!(displaced);
    }

    #[tokio::test]
    async fn takeover_from_secondary_fails_fatally_when_unreachable() {
        // Nothing listening on this port.
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let unused_addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), unused_addr.port());
        let err = takeover_from_secondary(&config).await.unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[tokio::test]
    async fn takeover_from_secondary_succeeds_on_ack() {
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), addr.port());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream);
            let msg = conn.read_message().await.unwrap().unwrap();
            assert_eq!(msg, WireMessage::Request(FailoverRequest::PrimIsBack));
            conn.write_reply(&FailoverReply::ack(), Duration::from_secs(1))
                .await
                .unwrap();
        });

        takeover_from_secondary(&config).await.unwrap();
        server.await.unwrap();
    }
}
