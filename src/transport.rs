//! A minimal framed codec standing in for "the existing batch-request
//! transport" that the failover core treats as an external dependency.
//! The core only needs *a* reliable, ordered, length-delimited channel
//! with bounded writes; this module is the smallest thing that provides
//! one so the crate builds and tests standalone. It is not a transcription
//! of the scheduler's real wire format.
//!
//! Wire shape: `[len: u32 BE][kind: u8][body...]`, `len` counts `kind` plus
//! `body`. `kind == 0` is a request, `kind == 1` is a reply.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::error::Error;
use crate::message::{FailoverReply, FailoverRequest, ReplyCode};

const MAX_FRAME_LEN: u32 = 64 * 1024;
const REQUEST_KIND: u8 = 0;
const REPLY_KIND: u8 = 1;

/// A decoded frame delivered to the caller. The caller (primary or
/// secondary controller) dispatches on this instead of touching bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Request(FailoverRequest),
    Reply(FailoverReply),
}

/// Sends and receives [`WireMessage`]s over a single `TcpStream`. One
/// `Connection` wraps one control channel in either direction — the primary
/// holds one per registered secondary (just one, per the "at most one
/// channel" invariant), the secondary holds one for its upstream.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Reads one frame, buffering partial reads across calls. Returns
    /// `Ok(None)` on a clean EOF with no partial frame pending.
    pub async fn read_message(&mut self) -> Result<Option<WireMessage>, Error> {
        loop {
            if let Some(msg) = self.try_parse()? {
                return Ok(Some(msg));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::protocol("connection reset mid-frame"));
            }
        }
    }

    fn try_parse(&mut self) -> Result<Option<WireMessage>, Error> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.buffer[..4].try_into().unwrap());
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(Error::protocol(format!("invalid frame length {len}")));
        }
        let total = 4 + len as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(4);
        let mut body = self.buffer.split_to(len as usize);
        let kind = body.get_u8();
        let msg = match kind {
            REQUEST_KIND => {
                let tag = body.get_u8();
                WireMessage::Request(FailoverRequest::from_tag(tag)?)
            }
            REPLY_KIND => {
                let code = ReplyCode::from_code(body.get_u8())?;
                let has_text = body.get_u8() != 0;
                let text = if has_text {
                    let text_len = body.get_u16() as usize;
                    if body.remaining() < text_len {
                        return Err(Error::protocol("reply text length exceeds frame"));
                    }
                    let raw = body.split_to(text_len);
                    Some(
                        String::from_utf8(raw.to_vec())
                            .map_err(|_| Error::protocol("reply text is not UTF-8"))?,
                    )
                } else {
                    None
                };
                WireMessage::Reply(FailoverReply { code, text })
            }
            other => return Err(Error::protocol(format!("unknown frame kind {other}"))),
        };
        Ok(Some(msg))
    }

    /// Writes a request with a bounded deadline. A timeout maps to
    /// [`Error::PeerLost`]; on that error the sender closes the channel
    /// and declares the peer down.
    pub async fn write_request(
        &mut self,
        req: FailoverRequest,
        deadline: Duration,
    ) -> Result<(), Error> {
        let mut body = BytesMut::with_capacity(2);
        body.put_u8(REQUEST_KIND);
        body.put_u8(req.tag());
        self.write_framed(&body, deadline).await
    }

    pub async fn write_reply(&mut self, reply: &FailoverReply, deadline: Duration) -> Result<(), Error> {
        let mut body = BytesMut::with_capacity(4);
        body.put_u8(REPLY_KIND);
        body.put_u8(reply.code.code());
        match &reply.text {
            Some(text) => {
                body.put_u8(1);
                body.put_u16(text.len() as u16);
                body.put_slice(text.as_bytes());
            }
            None => body.put_u8(0),
        }
        self.write_framed(&body, deadline).await
    }

    async fn write_framed(&mut self, body: &[u8], deadline: Duration) -> Result<(), Error> {
        let write = async {
            self.stream.write_u32(body.len() as u32).await?;
            self.stream.write_all(body).await?;
            self.stream.flush().await
        };
        match timeout(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_io)) => Err(Error::PeerLost),
            Err(_elapsed) => Err(Error::PeerLost),
        }
    }
}
