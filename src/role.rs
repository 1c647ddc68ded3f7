use std::fmt;

/// A process-wide value fixed at startup and never changed. Which role a
/// process runs is a configuration decision, not a
/// runtime one — a process that should switch roles restarts instead (see
/// `primary::takeover_from_secondary`, which is only ever reached by a
/// fresh process boot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}
