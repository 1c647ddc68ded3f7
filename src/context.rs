//! The owned process state for the failover side of a server process, in
//! place of loose file-static globals. `FailoverContext` is created once
//! at startup and held by whichever controller (`primary` or `secondary`)
//! is driving the event loop; it is never shared behind a lock across
//! tasks.

use std::sync::Arc;

use crate::channel::ControlChannel;
use crate::config::Config;
use crate::license::HostId;
use crate::role::Role;

pub struct FailoverContext {
    pub role: Role,
    pub config: Arc<Config>,
    pub local_host_id: HostId,
    /// The single control-channel handle: at most one exists per process
    /// at any time.
    pub channel: Option<ControlChannel>,
}

impl FailoverContext {
    pub fn new(role: Role, config: Arc<Config>, local_host_id: HostId) -> Self {
        FailoverContext {
            role,
            config,
            local_host_id,
            channel: None,
        }
    }

    pub fn has_peer(&self) -> bool {
        self.channel.is_some()
    }

    pub fn drop_peer(&mut self) {
        self.channel = None;
    }
}
