//! The secondary state machine's pure transition core. `transition` takes
//! the current runtime snapshot and one [`Event`], and returns the
//! outbound [`Action`] list the I/O shell (`secondary::SecondaryMachine`)
//! must run. It touches no socket, no file, no clock source beyond the
//! `now` it is handed, so every transition rule and boundary case is
//! checkable here without a network.

use std::time::{Duration, Instant};

use crate::config::SecondaryDelay;
use crate::error::exit_code;
use crate::fencing::FencingOutcome;
use crate::liveness::LivenessChange;
use crate::message::{FailoverReply, FailoverRequest};

/// Periodic handshake interval the primary controller re-fires on. The
/// secondary side uses it only to judge staleness while in HANDSK.
pub const HANDSHAKE_PERIOD: Duration = Duration::from_secs(5);

/// NOHSK: liveness advancing four times running with no socket open means
/// the control channel is gone for good — force a full reconnect attempt.
pub const NOHSK_ADVANCE_LIMIT: u32 = 4;

/// NOHSK: opportunistic reconnect dial, tried every third tick.
pub const NOHSK_DIAL_EVERY_TICKS: u32 = 3;

/// NOCONN / IDLE retry backoff between dial attempts.
pub const RECONNECT_RETRY_SLEEP: Duration = Duration::from_secs(10);

/// Bounded connect deadline used everywhere the secondary dials the
/// primary (the conservative end of a several-second dial budget).
pub const DIAL_DEADLINE: Duration = Duration::from_secs(4);

/// Base grace period added to `secondary_delay` to compute the startup
/// takeover deadline: `start_time + 5 minutes + secondary_delay`.
pub const TAKEOVER_GRACE_BASE: Duration = Duration::from_secs(5 * 60);

/// TAKEOV: back off this long before retrying after a failed fence.
pub const FENCE_RETRY_SLEEP: Duration = Duration::from_secs(10);

/// SECD_TAKEOVER: grace sleep after acknowledging, before assuming active,
/// to let the primary finish its own teardown.
pub const TAKEOVER_SETTLE_SLEEP: Duration = Duration::from_secs(10);

/// INACT: sleep after observing EOF before closing and going IDLE.
pub const INACT_SETTLE_SLEEP: Duration = Duration::from_secs(10);

/// Secondary state. Owned only by the secondary process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryState {
    NoConn,
    Conn,
    RegSent,
    HandSk,
    NoHsk,
    Shutd,
    Takeov,
    Inact,
    Idle,
}

/// Outcome of the REGISTER reply, as delivered to the reply handler
/// (the reply handler for the registration reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterReplyOutcome {
    /// `ok` with the primary's host-identifier as decimal text.
    RegisteredOk { host_id_decimal: String },
    /// `ok` with no payload, or `unknown-request`.
    NoTextOrUnknown,
    Eof,
    Err,
}

/// Events the I/O shell feeds into [`transition`]. Each corresponds to one
/// completed operation or one second of wall-clock advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One second elapsed; dispatch on the current state.
    Tick,
    /// A dial-the-primary attempt completed (initial connect, NOHSK's
    /// opportunistic reconnect, or TAKEOV's last-chance dial all funnel
    /// through here — all three move to CONN on success).
    DialResult(bool),
    /// The CONN state's REGISTER send completed.
    SendRegisterResult(bool),
    /// REGISTER's reply arrived.
    RegisterReply(RegisterReplyOutcome),
    /// A liveness-file stat completed while in NOHSK.
    LivenessStatResult(LivenessChange),
    /// The fencing hook returned while in TAKEOV.
    FenceResult(FencingOutcome),
    /// An inbound FAILOVER request arrived from the primary.
    InboundRequest(FailoverRequest),
    /// The INACT wait observed EOF on the control channel.
    InactEof,
    /// The control channel was torn down outside of the flows above.
    SocketClosed,
}

/// Outbound side effects the I/O shell must perform. `transition` never
/// performs I/O itself — that split is what keeps this core testable
/// without sockets or files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DialPrimary(Duration),
    SendRegister,
    StatLiveness,
    InvokeFencingHook,
    WriteActiveMarker,
    RemoveActiveMarker,
    /// Parse the peer's decimal host id, XOR with ours, persist to
    /// `license.fo`, and rewire the connection's read side onto the
    /// failover-request dispatcher.
    PersistLicenseAndRewire { peer_host_id_decimal: String },
    SendReply(FailoverReply),
    SleepMillis(u64),
    CloseSocket,
    WaitForEof,
    BecomeActive,
    ExitProcess(i32),
}

/// All mutable state the transition function needs. Owned by
/// `secondary::SecondaryMachine`, passed in by `&mut` reference — this is
/// a single owned context value scoped to just the secondary side's
/// bookkeeping.
#[derive(Debug, Clone)]
pub struct SecondaryRuntime {
    pub state: SecondaryState,
    pub last_handshake: Instant,
    pub takeover_deadline: Instant,
    /// Updated whenever the liveness file's mtime is observed to advance
    /// while in NOHSK.
    pub mytime: Instant,
    pub nohsk_ticks: u32,
    pub nohsk_advance_count: u32,
    pub socket_open: bool,
    pub immediate_takeover_requested: bool,
    pub secondary_delay: SecondaryDelay,
}

impl SecondaryRuntime {
    pub fn new(now: Instant, secondary_delay: SecondaryDelay) -> Self {
        let grace = secondary_delay.as_duration().unwrap_or(Duration::ZERO);
        SecondaryRuntime {
            state: SecondaryState::NoConn,
            last_handshake: now,
            takeover_deadline: now + TAKEOVER_GRACE_BASE + grace,
            mytime: now,
            nohsk_ticks: 0,
            nohsk_advance_count: 0,
            socket_open: false,
            immediate_takeover_requested: false,
            secondary_delay,
        }
    }

    fn delay_or_zero(&self) -> Duration {
        self.secondary_delay.as_duration().unwrap_or(Duration::ZERO)
    }

    fn enter_nohsk(&mut self, now: Instant) {
        self.state = SecondaryState::NoHsk;
        self.nohsk_ticks = 0;
        self.nohsk_advance_count = 0;
        self.mytime = now;
    }
}

/// The one transition function the rest of the secondary side is built
/// around. See module docs.
pub fn transition(ctx: &mut SecondaryRuntime, event: Event, now: Instant) -> Vec<Action> {
    match event {
        Event::InboundRequest(req) => handle_inbound_request(ctx, req, now),
        Event::Tick => handle_tick(ctx, now),
        Event::DialResult(ok) => handle_dial_result(ctx, ok, now),
        Event::SendRegisterResult(ok) => handle_send_register_result(ctx, ok),
        Event::RegisterReply(outcome) => handle_register_reply(ctx, outcome, now),
        Event::LivenessStatResult(change) => handle_liveness_stat_result(ctx, change, now),
        Event::FenceResult(outcome) => handle_fence_result(ctx, outcome),
        Event::InactEof => {
            ctx.state = SecondaryState::Idle;
            vec![
                Action::SleepMillis(INACT_SETTLE_SLEEP.as_millis() as u64),
                Action::CloseSocket,
            ]
        }
        Event::SocketClosed => {
            ctx.socket_open = false;
            vec![]
        }
    }
}

fn handle_tick(ctx: &mut SecondaryRuntime, now: Instant) -> Vec<Action> {
    match ctx.state {
        SecondaryState::NoConn | SecondaryState::Idle => {
            vec![Action::DialPrimary(DIAL_DEADLINE)]
        }
        SecondaryState::Conn => vec![Action::SendRegister],
        SecondaryState::RegSent => vec![],
        SecondaryState::HandSk => {
            if now >= ctx.last_handshake + 2 * HANDSHAKE_PERIOD {
                ctx.enter_nohsk(now);
            }
            vec![]
        }
        SecondaryState::NoHsk => {
            ctx.nohsk_ticks += 1;
            let mut actions = vec![Action::StatLiveness];
            if ctx.nohsk_ticks % NOHSK_DIAL_EVERY_TICKS == 0 && !ctx.socket_open {
                actions.push(Action::DialPrimary(DIAL_DEADLINE));
            }
            actions
        }
        SecondaryState::Shutd => vec![Action::ExitProcess(exit_code::CLEAN)],
        SecondaryState::Takeov => vec![Action::CloseSocket, Action::DialPrimary(DIAL_DEADLINE)],
        SecondaryState::Inact => vec![],
    }
}

fn handle_dial_result(ctx: &mut SecondaryRuntime, success: bool, now: Instant) -> Vec<Action> {
    if success {
        ctx.state = SecondaryState::Conn;
        ctx.socket_open = true;
        return vec![];
    }

    match ctx.state {
        SecondaryState::NoConn => {
            let should_take_over = ctx.immediate_takeover_requested
                || matches!(ctx.secondary_delay, SecondaryDelay::StartActiveImmediately)
                || now > ctx.takeover_deadline;
            if should_take_over {
                ctx.state = SecondaryState::Takeov;
                vec![]
            } else {
                vec![Action::SleepMillis(RECONNECT_RETRY_SLEEP.as_millis() as u64)]
            }
        }
        SecondaryState::Idle => vec![Action::SleepMillis(RECONNECT_RETRY_SLEEP.as_millis() as u64)],
        SecondaryState::NoHsk => vec![],
        SecondaryState::Takeov => vec![Action::InvokeFencingHook],
        _ => vec![],
    }
}

fn handle_send_register_result(ctx: &mut SecondaryRuntime, success: bool) -> Vec<Action> {
    if success {
        ctx.state = SecondaryState::RegSent;
        vec![]
    } else {
        ctx.state = SecondaryState::NoConn;
        ctx.socket_open = false;
        vec![Action::CloseSocket]
    }
}

fn handle_register_reply(
    ctx: &mut SecondaryRuntime,
    outcome: RegisterReplyOutcome,
    now: Instant,
) -> Vec<Action> {
    match outcome {
        RegisterReplyOutcome::RegisteredOk { host_id_decimal } => {
            ctx.last_handshake = now;
            ctx.state = SecondaryState::HandSk;
            vec![Action::PersistLicenseAndRewire {
                peer_host_id_decimal: host_id_decimal,
            }]
        }
        RegisterReplyOutcome::NoTextOrUnknown => {
            vec![Action::ExitProcess(exit_code::REGISTRATION_REJECTED)]
        }
        RegisterReplyOutcome::Eof => {
            if ctx.state == SecondaryState::RegSent {
                ctx.state = SecondaryState::Takeov;
            } else {
                ctx.state = SecondaryState::NoConn;
                ctx.socket_open = false;
            }
            vec![]
        }
        RegisterReplyOutcome::Err => {
            ctx.state = SecondaryState::NoConn;
            ctx.socket_open = false;
            vec![Action::CloseSocket]
        }
    }
}

fn handle_liveness_stat_result(
    ctx: &mut SecondaryRuntime,
    change: LivenessChange,
    now: Instant,
) -> Vec<Action> {
    if ctx.state != SecondaryState::NoHsk {
        return vec![];
    }

    match change {
        LivenessChange::Advanced => {
            ctx.mytime = now;
            ctx.nohsk_advance_count += 1;
            if ctx.nohsk_advance_count > NOHSK_ADVANCE_LIMIT && !ctx.socket_open {
                ctx.state = SecondaryState::NoConn;
            }
            vec![]
        }
        LivenessChange::Stagnant => {
            if now > ctx.mytime + ctx.delay_or_zero() {
                ctx.state = SecondaryState::Takeov;
            }
            vec![]
        }
        LivenessChange::Absent => {
            if now > ctx.last_handshake + ctx.delay_or_zero() {
                ctx.state = SecondaryState::NoConn;
            }
            vec![]
        }
    }
}

fn handle_fence_result(ctx: &mut SecondaryRuntime, outcome: FencingOutcome) -> Vec<Action> {
    if ctx.state != SecondaryState::Takeov {
        return vec![];
    }

    match outcome {
        FencingOutcome::Ok | FencingOutcome::Absent => {
            vec![Action::WriteActiveMarker, Action::BecomeActive]
        }
        FencingOutcome::Failed => vec![Action::SleepMillis(FENCE_RETRY_SLEEP.as_millis() as u64)],
    }
}

fn handle_inbound_request(ctx: &mut SecondaryRuntime, req: FailoverRequest, now: Instant) -> Vec<Action> {
    match req {
        FailoverRequest::Handshake => {
            ctx.last_handshake = now;
            if ctx.state == SecondaryState::NoHsk {
                ctx.state = SecondaryState::HandSk;
            }
            vec![Action::SendReply(FailoverReply::ack())]
        }
        FailoverRequest::PrimIsBack => {
            ctx.state = SecondaryState::Idle;
            // Actions run in order and each completes before the next starts,
            // so the marker is gone (the quiesce) before the ack goes out.
            vec![Action::RemoveActiveMarker, Action::SendReply(FailoverReply::ack())]
        }
        FailoverRequest::SecdShutdown => {
            ctx.state = SecondaryState::Shutd;
            vec![Action::SendReply(FailoverReply::ack())]
        }
        FailoverRequest::SecdGoInactive => {
            ctx.state = SecondaryState::Inact;
            vec![
                Action::RemoveActiveMarker,
                Action::SendReply(FailoverReply::ack()),
                Action::WaitForEof,
            ]
        }
        FailoverRequest::SecdTakeover => {
            ctx.state = SecondaryState::Takeov;
            vec![
                Action::SendReply(FailoverReply::ack()),
                Action::SleepMillis(TAKEOVER_SETTLE_SLEEP.as_millis() as u64),
            ]
        }
        FailoverRequest::Register => vec![Action::SendReply(FailoverReply::system_error())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecondaryDelay;

    fn ctx_at(state: SecondaryState, now: Instant, secondary_delay: SecondaryDelay) -> SecondaryRuntime {
        let mut ctx = SecondaryRuntime::new(now, secondary_delay);
        ctx.state = state;
        ctx
    }

    #[test]
    fn noconn_dials_on_every_tick() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoConn, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::Tick, now);
        assert_eq!(actions, vec![Action::DialPrimary(DIAL_DEADLINE)]);
    }

    #[test]
    fn dial_success_always_moves_to_conn() {
        for state in [
            SecondaryState::NoConn,
            SecondaryState::Idle,
            SecondaryState::NoHsk,
            SecondaryState::Takeov,
        ] {
            let now = Instant::now();
            let mut ctx = ctx_at(state, now, SecondaryDelay::Seconds(30));
            let actions = transition(&mut ctx, Event::DialResult(true), now);
            assert_eq!(ctx.state, SecondaryState::Conn);
            assert!(ctx.socket_open);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn conn_sends_register_then_regsent_on_success() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Conn, now, SecondaryDelay::Seconds(30));
        assert_eq!(transition(&mut ctx, Event::Tick, now), vec![Action::SendRegister]);
        transition(&mut ctx, Event::SendRegisterResult(true), now);
        assert_eq!(ctx.state, SecondaryState::RegSent);
    }

    #[test]
    fn conn_send_failure_returns_to_noconn() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Conn, now, SecondaryDelay::Seconds(30));
        transition(&mut ctx, Event::SendRegisterResult(false), now);
        assert_eq!(ctx.state, SecondaryState::NoConn);
    }

    #[test]
    fn register_reply_ok_moves_to_handsk_and_persists_license() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::RegSent, now, SecondaryDelay::Seconds(30));
        let actions = transition(
            &mut ctx,
            Event::RegisterReply(RegisterReplyOutcome::RegisteredOk {
                host_id_decimal: "42".to_string(),
            }),
            now,
        );
        assert_eq!(ctx.state, SecondaryState::HandSk);
        assert_eq!(
            actions,
            vec![Action::PersistLicenseAndRewire {
                peer_host_id_decimal: "42".to_string()
            }]
        );
    }

    #[test]
    fn register_reply_unsupported_exits_with_registration_rejected() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::RegSent, now, SecondaryDelay::Seconds(30));
        let actions = transition(
            &mut ctx,
            Event::RegisterReply(RegisterReplyOutcome::NoTextOrUnknown),
            now,
        );
        assert_eq!(actions, vec![Action::ExitProcess(exit_code::REGISTRATION_REJECTED)]);
    }

    /// EOF during REGSENT is direct proof the primary died right after
    /// accepting the socket, so this goes straight to TAKEOV, not NOCONN.
    #[test]
    fn eof_while_regsent_goes_directly_to_takeov() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::RegSent, now, SecondaryDelay::Seconds(30));
        transition(&mut ctx, Event::RegisterReply(RegisterReplyOutcome::Eof), now);
        assert_eq!(ctx.state, SecondaryState::Takeov);
    }

    #[test]
    fn handsk_degrades_to_nohsk_after_two_periods_of_silence() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::HandSk, t0, SecondaryDelay::Seconds(30));
        ctx.last_handshake = t0;

        let almost = t0 + 2 * HANDSHAKE_PERIOD - Duration::from_millis(1);
        transition(&mut ctx, Event::Tick, almost);
        assert_eq!(ctx.state, SecondaryState::HandSk, "must not degrade early");

        let exactly = t0 + 2 * HANDSHAKE_PERIOD;
        transition(&mut ctx, Event::Tick, exactly);
        assert_eq!(ctx.state, SecondaryState::NoHsk);
    }

    #[test]
    fn inbound_handshake_recovers_nohsk_to_handsk() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoHsk, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::InboundRequest(FailoverRequest::Handshake), now);
        assert_eq!(ctx.state, SecondaryState::HandSk);
        assert_eq!(actions, vec![Action::SendReply(FailoverReply::ack())]);
    }

    /// Boundary case: stagnant mtime for *exactly* secondary_delay
    /// seconds is not yet a trigger; strict `>` is required.
    #[test]
    fn stagnant_liveness_requires_strict_greater_than() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoHsk, t0, SecondaryDelay::Seconds(30));
        ctx.mytime = t0;

        let at_exactly_delay = t0 + Duration::from_secs(30);
        transition(&mut ctx, Event::LivenessStatResult(LivenessChange::Stagnant), at_exactly_delay);
        assert_eq!(ctx.state, SecondaryState::NoHsk, "exactly == delay must not trigger takeover");

        let past_delay = t0 + Duration::from_secs(30) + Duration::from_millis(1);
        transition(&mut ctx, Event::LivenessStatResult(LivenessChange::Stagnant), past_delay);
        assert_eq!(ctx.state, SecondaryState::Takeov);
    }

    #[test]
    fn nohsk_advance_limit_forces_reconnect_when_no_socket() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoHsk, t0, SecondaryDelay::Seconds(30));
        ctx.socket_open = false;

        for i in 1..=NOHSK_ADVANCE_LIMIT {
            let t = t0 + Duration::from_secs(i as u64);
            transition(&mut ctx, Event::LivenessStatResult(LivenessChange::Advanced), t);
            assert_eq!(ctx.state, SecondaryState::NoHsk, "advance {i} must not yet reconnect");
        }

        let t = t0 + Duration::from_secs(NOHSK_ADVANCE_LIMIT as u64 + 1);
        transition(&mut ctx, Event::LivenessStatResult(LivenessChange::Advanced), t);
        assert_eq!(ctx.state, SecondaryState::NoConn);
    }

    #[test]
    fn nohsk_advance_limit_does_not_reconnect_when_socket_open() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoHsk, t0, SecondaryDelay::Seconds(30));
        ctx.socket_open = true;

        for i in 1..=(NOHSK_ADVANCE_LIMIT + 3) {
            let t = t0 + Duration::from_secs(i as u64);
            transition(&mut ctx, Event::LivenessStatResult(LivenessChange::Advanced), t);
        }
        assert_eq!(ctx.state, SecondaryState::NoHsk);
    }

    #[test]
    fn nohsk_dials_every_third_tick_when_no_socket() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoHsk, t0, SecondaryDelay::Seconds(30));
        ctx.socket_open = false;

        let a1 = transition(&mut ctx, Event::Tick, t0);
        assert_eq!(a1, vec![Action::StatLiveness]);
        let a2 = transition(&mut ctx, Event::Tick, t0);
        assert_eq!(a2, vec![Action::StatLiveness]);
        let a3 = transition(&mut ctx, Event::Tick, t0);
        assert_eq!(a3, vec![Action::StatLiveness, Action::DialPrimary(DIAL_DEADLINE)]);
    }

    /// Boundary case: `secondary_delay = -1` bypasses the deadline
    /// wait and goes directly to TAKEOV on the first NOCONN dial failure.
    #[test]
    fn secondary_delay_minus_one_takes_over_immediately() {
        let now = Instant::now();
        let mut ctx = ctx_at(
            SecondaryState::NoConn,
            now,
            SecondaryDelay::StartActiveImmediately,
        );
        transition(&mut ctx, Event::DialResult(false), now);
        assert_eq!(ctx.state, SecondaryState::Takeov);
    }

    #[test]
    fn noconn_retries_until_deadline_then_takes_over() {
        let t0 = Instant::now();
        let mut ctx = ctx_at(SecondaryState::NoConn, t0, SecondaryDelay::Seconds(30));

        let before_deadline = ctx.takeover_deadline - Duration::from_secs(1);
        let actions = transition(&mut ctx, Event::DialResult(false), before_deadline);
        assert_eq!(actions, vec![Action::SleepMillis(RECONNECT_RETRY_SLEEP.as_millis() as u64)]);
        assert_eq!(ctx.state, SecondaryState::NoConn);

        let after_deadline = ctx.takeover_deadline + Duration::from_secs(1);
        transition(&mut ctx, Event::DialResult(false), after_deadline);
        assert_eq!(ctx.state, SecondaryState::Takeov);
    }

    /// Fencing failure retry: a failed fence must not abandon the takeover.
    #[test]
    fn fencing_failure_stays_in_takeov_and_retries() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Takeov, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::FenceResult(FencingOutcome::Failed), now);
        assert_eq!(ctx.state, SecondaryState::Takeov);
        assert_eq!(actions, vec![Action::SleepMillis(FENCE_RETRY_SLEEP.as_millis() as u64)]);
    }

    /// Boundary case: missing fencing script is not an error.
    #[test]
    fn fencing_absent_becomes_active() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Takeov, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::FenceResult(FencingOutcome::Absent), now);
        assert_eq!(actions, vec![Action::WriteActiveMarker, Action::BecomeActive]);
    }

    #[test]
    fn takeov_dial_success_reverts_to_conn() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Takeov, now, SecondaryDelay::Seconds(30));
        transition(&mut ctx, Event::DialResult(true), now);
        assert_eq!(ctx.state, SecondaryState::Conn);
    }

    #[test]
    fn secd_go_inactive_removes_marker_and_waits_for_eof() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::HandSk, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::InboundRequest(FailoverRequest::SecdGoInactive), now);
        assert_eq!(ctx.state, SecondaryState::Inact);
        assert_eq!(
            actions,
            vec![
                Action::RemoveActiveMarker,
                Action::SendReply(FailoverReply::ack()),
                Action::WaitForEof
            ]
        );
    }

    #[test]
    fn inact_eof_sleeps_closes_and_goes_idle() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::Inact, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::InactEof, now);
        assert_eq!(ctx.state, SecondaryState::Idle);
        assert_eq!(
            actions,
            vec![
                Action::SleepMillis(INACT_SETTLE_SLEEP.as_millis() as u64),
                Action::CloseSocket
            ]
        );
    }

    #[test]
    fn secd_takeover_acks_then_settles_into_takeov() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::HandSk, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::InboundRequest(FailoverRequest::SecdTakeover), now);
        assert_eq!(ctx.state, SecondaryState::Takeov);
        assert_eq!(
            actions,
            vec![
                Action::SendReply(FailoverReply::ack()),
                Action::SleepMillis(TAKEOVER_SETTLE_SLEEP.as_millis() as u64)
            ]
        );
    }

    #[test]
    fn register_at_secondary_is_system_error() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::HandSk, now, SecondaryDelay::Seconds(30));
        let actions = transition(&mut ctx, Event::InboundRequest(FailoverRequest::Register), now);
        assert_eq!(actions, vec![Action::SendReply(FailoverReply::system_error())]);
    }

    #[test]
    fn shutd_state_exits_clean_on_next_tick() {
        let now = Instant::now();
        let mut ctx = ctx_at(SecondaryState::HandSk, now, SecondaryDelay::Seconds(30));
        transition(&mut ctx, Event::InboundRequest(FailoverRequest::SecdShutdown), now);
        assert_eq!(ctx.state, SecondaryState::Shutd);
        let actions = transition(&mut ctx, Event::Tick, now);
        assert_eq!(actions, vec![Action::ExitProcess(exit_code::CLEAN)]);
    }
}
