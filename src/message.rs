//! Control-channel message bodies.
//!
//! Framing, authentication, and reply matching are delegated to the host
//! scheduler's request transport; this module only defines the six request
//! kinds and the two reply shapes that travel over it.

use crate::error::Error;

/// A FAILOVER request's tag, carried as a single unsigned integer in
/// `{1..6}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverRequest {
    /// secondary → primary: request to be recognised as the standby.
    Register = 1,
    /// primary → secondary: periodic "I am alive".
    Handshake = 2,
    /// primary → secondary, on primary restart after a takeover: demand the
    /// floor back.
    PrimIsBack = 3,
    /// primary → secondary: go down now.
    SecdShutdown = 4,
    /// primary → secondary: stay up but remain passive.
    SecdGoInactive = 5,
    /// primary → secondary: primary is shutting down cleanly; assume active.
    SecdTakeover = 6,
}

impl FailoverRequest {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        Ok(match tag {
            1 => FailoverRequest::Register,
            2 => FailoverRequest::Handshake,
            3 => FailoverRequest::PrimIsBack,
            4 => FailoverRequest::SecdShutdown,
            5 => FailoverRequest::SecdGoInactive,
            6 => FailoverRequest::SecdTakeover,
            other => return Err(Error::protocol(format!("unknown FAILOVER tag {other}"))),
        })
    }
}

/// Reply codes a FAILOVER request can carry back. `Ok` with no payload is
/// the pure acknowledgement case; `busy` and `system_error` are the
/// non-zero codes inbound handlers translate failures into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Ok = 0,
    Busy = 1,
    UnknownRequest = 2,
    SystemError = 3,
}

impl ReplyCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, Error> {
        Ok(match code {
            0 => ReplyCode::Ok,
            1 => ReplyCode::Busy,
            2 => ReplyCode::UnknownRequest,
            3 => ReplyCode::SystemError,
            other => return Err(Error::protocol(format!("unknown reply code {other}"))),
        })
    }
}

/// The decoded body of a reply. REGISTER's reply carries the primary's
/// host-identifier as decimal ASCII text with no trailing newline;
/// every other reply is a pure acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverReply {
    pub code: ReplyCode,
    pub text: Option<String>,
}

impl FailoverReply {
    pub fn ack() -> Self {
        FailoverReply {
            code: ReplyCode::Ok,
            text: None,
        }
    }

    pub fn busy() -> Self {
        FailoverReply {
            code: ReplyCode::Busy,
            text: None,
        }
    }

    pub fn system_error() -> Self {
        FailoverReply {
            code: ReplyCode::SystemError,
            text: None,
        }
    }

    pub fn register_ok(host_id_decimal: String) -> Self {
        FailoverReply {
            code: ReplyCode::Ok,
            text: Some(host_id_decimal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips() {
        for tag in 1u8..=6 {
            let req = FailoverRequest::from_tag(tag).unwrap();
            assert_eq!(req.tag(), tag);
        }
    }

    #[test]
    fn unknown_tag_is_protocol_error() {
        assert!(FailoverRequest::from_tag(0).is_err());
        assert!(FailoverRequest::from_tag(7).is_err());
    }

    #[test]
    fn reply_code_round_trips() {
        for code in 0u8..=3 {
            let c = ReplyCode::from_code(code).unwrap();
            assert_eq!(c.code(), code);
        }
    }
}
