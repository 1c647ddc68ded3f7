//! The control-channel handle: a socket wrapped together with the flags
//! that govern its lifecycle. At most one such channel exists per process
//! at any time; whenever the handle is present, the peer is authenticated
//! and the idle-timeout is disabled.

use crate::transport::Connection;

/// One control channel. `Option<ControlChannel>` is how both controllers
/// represent "no peer" — there is deliberately no third state for "peer
/// present but unauthenticated," matching the invariant above.
pub struct ControlChannel {
    pub connection: Connection,
    pub authenticated: bool,
    pub no_timeout: bool,
}

impl ControlChannel {
    /// A freshly dialed or accepted socket, not yet authenticated.
    pub fn new(connection: Connection) -> Self {
        ControlChannel {
            connection,
            authenticated: false,
            no_timeout: false,
        }
    }

    /// Marks the channel authenticated and timeout-exempt, as the primary
    /// does on accepting a registration request.
    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
        self.no_timeout = true;
    }
}
