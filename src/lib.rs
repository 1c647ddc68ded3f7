//! Failover coordination core for a two-node primary/secondary
//! batch-scheduler server pair.
//!
//! Exactly one of the pair is active at any time; the other is a warm
//! standby that detects loss of the active peer, avoids split-brain via a
//! fencing (STONITH) step, and seamlessly assumes the active role. This
//! crate implements that coordination core — the surrounding scheduler
//! (job queueing, persistence, authentication, the process supervisor) is
//! specified only at the interface.
//!
//! # Layout
//!
//! - [`role`] — the process-wide `Primary`/`Secondary` value fixed at
//!   startup.
//! - [`config`] — the six configuration inputs plus the operator's
//!   shutdown policy, loaded from TOML.
//! - [`message`] — the six FAILOVER request kinds and the reply shapes
//!   that travel over the control channel.
//! - [`transport`] — the framed codec standing in for the host
//!   scheduler's batch-request transport.
//! - [`channel`] — the control-channel handle (`ControlChannel`), the "at
//!   most one peer" invariant.
//! - [`context`] — `FailoverContext`, the single owned value that replaces
//!   the source's file-static globals.
//! - [`liveness`] — the liveness file and the active-marker file, the two
//!   filesystem health signals.
//! - [`fencing`] — the STONITH hook, behind a trait so tests can inject a
//!   deterministic fake.
//! - [`license`] — host identifiers and the `license.fo` fingerprint.
//! - [`event`] — the secondary's pure state-transition core: no socket, no
//!   file, no clock beyond the `now` it is handed.
//! - [`secondary`] — the thin async shell that turns ticks and socket
//!   reads into [`event::Event`]s and performs the returned
//!   [`event::Action`]s.
//! - [`primary`] — the handshake emitter, REGISTER acceptor, shutdown
//!   signaller, and `takeover_from_secondary` startup routine.
//! - `shutdown` — the broadcast-based shutdown signal shared by both
//!   roles' event loops.
//! - [`error`] — the crate's `Error`/`Result` pair and the three error
//!   kinds of the design's error-handling policy.

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod fencing;
pub mod license;
pub mod liveness;
pub mod message;
pub mod primary;
pub mod role;
pub mod secondary;
pub mod shutdown;
pub mod transport;

pub use error::{Error, Result};
pub use role::Role;

/// Default TCP port the control channel listens on / dials when a config
/// file omits `pbs_server_port_dis`.
pub const DEFAULT_FAILOVER_PORT: u16 = 15_001;
