/// The three error kinds from the failover design: transient conditions the
/// state machine absorbs locally, protocol violations from an incompatible
/// peer, and misconfiguration that can never be retried away.
///
/// Only [`Error::Protocol`] and [`Error::Fatal`] are allowed to reach
/// `std::process::exit`; [`Error::TransientIo`] and [`Error::PeerLost`]
/// drive state transitions and are never surfaced to an operator as a
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stat failure, connect timeout, read-EAGAIN. Recovered locally; the
    /// caller treats this as "unknown, wait and retry."
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    /// A write to the control channel did not complete before its deadline.
    /// The sender must close the channel and declare the peer down.
    #[error("peer lost: control channel write timed out")]
    PeerLost,

    /// Unexpected reply, unknown request tag, or a malformed REGISTER reply.
    /// Logged at CRITICAL; the caller decides whether to revert to NOCONN or
    /// exit with [`exit_code::REGISTRATION_REJECTED`].
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Peer hostname unresolvable, `license.fo` cannot be opened, config
    /// cannot be parsed. Always terminal.
    #[error("fatal misconfiguration: {0}")]
    Fatal(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }

    /// True for the two error kinds allowed to reach process exit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Fatal(_))
    }
}

/// Process exit codes.
pub mod exit_code {
    /// Clean shutdown.
    pub const CLEAN: i32 = 0;
    /// Registration rejected, or primary unreachable at takeover.
    pub const REGISTRATION_REJECTED: i32 = 1;
    /// Secondary refused to go idle during primary reclaim.
    pub const SECONDARY_REFUSED_IDLE: i32 = 2;
}

pub type Result<T> = std::result::Result<T, Error>;
