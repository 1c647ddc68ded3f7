//! The secondary side's I/O shell: turns ticks and socket reads into
//! [`Event`]s, feeds them through [`transition`], and performs the
//! [`Action`]s it returns. No state-machine *logic* lives here — that is
//! the point of the pure core in `event.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::ControlChannel;
use crate::context::FailoverContext;
use crate::error::Error;
use crate::event::{self, Action, Event, RegisterReplyOutcome, SecondaryRuntime, SecondaryState};
use crate::fencing::FencingHook;
use crate::license::HostId;
use crate::liveness::{ActiveMarker, LivenessFile, LivenessObserver};
use crate::message::{FailoverReply, FailoverRequest};
use crate::transport::{Connection, WireMessage};

/// The INACT wait's long deadline. An hour is long enough that it only
/// ever fires as a safety net, not as the normal path to IDLE (the normal
/// path is observing EOF when the primary closes the socket).
const INACT_EOF_DEADLINE: Duration = Duration::from_secs(3600);

/// What the run loop does once `dispatch` bottoms out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// TAKEOV completed: the caller should begin full active-server
    /// initialisation.
    BecomeActive,
    Exit(i32),
}

enum StepOutcome {
    Continue,
    FollowUp(Event),
    BecomeActive,
    Exit(i32),
}

pub struct SecondaryMachine {
    ctx: FailoverContext,
    runtime: SecondaryRuntime,
    liveness: LivenessFile,
    liveness_observer: LivenessObserver,
    marker: ActiveMarker,
    license: crate::license::LicenseFile,
    fencing: Arc<dyn FencingHook>,
    local_hostname: String,
}

impl SecondaryMachine {
    pub fn new(
        ctx: FailoverContext,
        liveness: LivenessFile,
        marker: ActiveMarker,
        license: crate::license::LicenseFile,
        fencing: Arc<dyn FencingHook>,
        local_hostname: String,
    ) -> Self {
        let now = Instant::now();
        let runtime = SecondaryRuntime::new(now, ctx.config.secondary_delay);
        SecondaryMachine {
            ctx,
            runtime,
            liveness,
            liveness_observer: LivenessObserver::default(),
            marker,
            license,
            fencing,
            local_hostname,
        }
    }

    pub fn state(&self) -> SecondaryState {
        self.runtime.state
    }

    /// Requests the operator-triggered immediate-takeover flag, checked
    /// the next time the loop is in NOCONN.
    pub fn request_immediate_takeover(&mut self) {
        self.runtime.immediate_takeover_requested = true;
    }

    /// Runs the secondary loop until it either becomes active or the
    /// process should exit. Runs once per second, with inbound requests
    /// interleaved via `tokio::select!`.
    #[instrument(skip(self), fields(state = ?self.runtime.state))]
    pub async fn run(mut self) -> Result<LoopExit, Error> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    if let Some(exit) = self.dispatch(Event::Tick).await? {
                        return Ok(exit);
                    }
                }
                read = read_channel(&mut self.ctx.channel) => {
                    if let Some(exit) = self.handle_socket_read(read).await? {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    async fn handle_socket_read(
        &mut self,
        read: Result<Option<WireMessage>, Error>,
    ) -> Result<Option<LoopExit>, Error> {
        match read {
            Ok(Some(WireMessage::Request(req))) => self.dispatch(Event::InboundRequest(req)).await,
            Ok(Some(WireMessage::Reply(reply))) => {
                if self.runtime.state == SecondaryState::RegSent {
                    let outcome = if reply.code == crate::message::ReplyCode::Ok {
                        match reply.text {
                            Some(text) => RegisterReplyOutcome::RegisteredOk {
                                host_id_decimal: text,
                            },
                            None => RegisterReplyOutcome::NoTextOrUnknown,
                        }
                    } else if reply.code == crate::message::ReplyCode::UnknownRequest {
                        RegisterReplyOutcome::NoTextOrUnknown
                    } else {
                        RegisterReplyOutcome::Err
                    };
                    self.dispatch(Event::RegisterReply(outcome)).await
                } else {
                    // A handshake ack or any other fire-and-forget reply
                    // (replies to HANDSHAKE are fire-and-forget).
                    Ok(None)
                }
            }
            Ok(None) => {
                if self.runtime.state == SecondaryState::RegSent {
                    self.dispatch(Event::RegisterReply(RegisterReplyOutcome::Eof)).await
                } else {
                    self.ctx.drop_peer();
                    self.dispatch(Event::SocketClosed).await
                }
            }
            Err(e) => {
                warn!(error = %e, "control channel read failed");
                if self.runtime.state == SecondaryState::RegSent {
                    self.dispatch(Event::RegisterReply(RegisterReplyOutcome::Err)).await
                } else {
                    self.ctx.drop_peer();
                    self.dispatch(Event::SocketClosed).await
                }
            }
        }
    }

    async fn dispatch(&mut self, event: Event) -> Result<Option<LoopExit>, Error> {
        let now = Instant::now();
        let before = self.runtime.state;
        let actions = event::transition(&mut self.runtime, event.clone(), now);
        if self.runtime.state != before {
            debug!(from = ?before, to = ?self.runtime.state, ?event, "secondary state transition");
        }

        for action in actions {
            match self.perform(action).await? {
                StepOutcome::Continue => {}
                StepOutcome::FollowUp(next) => {
                    if let Some(exit) = Box::pin(self.dispatch(next)).await? {
                        return Ok(Some(exit));
                    }
                }
                StepOutcome::BecomeActive => return Ok(Some(LoopExit::BecomeActive)),
                StepOutcome::Exit(code) => return Ok(Some(LoopExit::Exit(code))),
            }
        }
        Ok(None)
    }

    async fn perform(&mut self, action: Action) -> Result<StepOutcome, Error> {
        match action {
            Action::DialPrimary(deadline) => {
                let addr = self.ctx.config.primary_addr();
                match timeout(deadline, TcpStream::connect(&addr)).await {
                    Ok(Ok(sock)) => {
                        self.ctx.channel = Some(ControlChannel::new(Connection::new(sock)));
                        Ok(StepOutcome::FollowUp(Event::DialResult(true)))
                    }
                    Ok(Err(e)) => {
                        debug!(error = %e, %addr, "dial to primary failed");
                        Ok(StepOutcome::FollowUp(Event::DialResult(false)))
                    }
                    Err(_elapsed) => {
                        debug!(%addr, "dial to primary timed out");
                        Ok(StepOutcome::FollowUp(Event::DialResult(false)))
                    }
                }
            }
            Action::SendRegister => {
                let ok = match self.ctx.channel.as_mut() {
                    Some(channel) => channel
                        .connection
                        .write_request(FailoverRequest::Register, event::DIAL_DEADLINE)
                        .await
                        .is_ok(),
                    None => false,
                };
                Ok(StepOutcome::FollowUp(Event::SendRegisterResult(ok)))
            }
            Action::StatLiveness => {
                let mtime = self.liveness.stat_mtime().await.unwrap_or(None);
                let change = self.liveness_observer.observe(mtime);
                Ok(StepOutcome::FollowUp(Event::LivenessStatResult(change)))
            }
            Action::InvokeFencingHook => {
                let outcome = self.fencing.fence(&self.ctx.config.pbs_primary).await?;
                Ok(StepOutcome::FollowUp(Event::FenceResult(outcome)))
            }
            Action::WriteActiveMarker => {
                self.marker.create(&self.local_hostname).await?;
                info!(host = %self.local_hostname, "became active, wrote marker");
                Ok(StepOutcome::Continue)
            }
            Action::RemoveActiveMarker => {
                self.marker.remove().await?;
                Ok(StepOutcome::Continue)
            }
            Action::PersistLicenseAndRewire {
                peer_host_id_decimal,
            } => {
                let peer_id = HostId::from_decimal_string(&peer_host_id_decimal)?;
                let fingerprint = self.ctx.local_host_id.xor(peer_id);
                self.license.write(fingerprint).await?;
                Ok(StepOutcome::Continue)
            }
            Action::SendReply(reply) => {
                if let Some(channel) = self.ctx.channel.as_mut() {
                    if let Err(e) = channel
                        .connection
                        .write_reply(&reply, event::DIAL_DEADLINE)
                        .await
                    {
                        warn!(error = %e, "failed to send reply");
                    }
                }
                Ok(StepOutcome::Continue)
            }
            Action::SleepMillis(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(StepOutcome::Continue)
            }
            Action::CloseSocket => {
                self.ctx.drop_peer();
                Ok(StepOutcome::Continue)
            }
            Action::WaitForEof => {
                if let Some(channel) = self.ctx.channel.as_mut() {
                    let _ = timeout(INACT_EOF_DEADLINE, async {
                        loop {
                            match channel.connection.read_message().await {
                                Ok(None) | Err(_) => break,
                                Ok(Some(_)) => continue,
                            }
                        }
                    })
                    .await;
                }
                self.ctx.drop_peer();
                Ok(StepOutcome::FollowUp(Event::InactEof))
            }
            Action::BecomeActive => Ok(StepOutcome::BecomeActive),
            Action::ExitProcess(code) => {
                if code != crate::error::exit_code::CLEAN {
                    error!(exit_code = code, "secondary exiting");
                }
                Ok(StepOutcome::Exit(code))
            }
        }
    }
}

async fn read_channel(channel: &mut Option<ControlChannel>) -> Result<Option<WireMessage>, Error> {
    match channel {
        Some(ch) => ch.connection.read_message().await,
        None => std::future::pending().await,
    }
}
