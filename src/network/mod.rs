//! Network Module
//!
//! Handles the two TCP legs of a ring node: the inbound connection accepted
//! from the upstream peer and the outbound connection to the neighbor.

mod server;
mod client;

pub use server::{InboundListener, InboundStream, Received};
pub use client::{OutboundConnector, OutboundStream};

use bytes::BytesMut;
use tokio::sync::watch;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::{Error, Result};
use crate::protocol::Message;

/// Longest record accepted on the wire, delimiter excluded
pub const MAX_RECORD_LENGTH: usize = 1024;

/// Newline-delimited message codec
///
/// Bytes are buffered until a full line has arrived, so a record split
/// across any number of reads decodes exactly once.
#[derive(Debug)]
pub struct RingCodec {
    lines: LinesCodec,
}

impl RingCodec {
    /// Create a codec with the default record limit
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_RECORD_LENGTH),
        }
    }
}

impl Default for RingCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RingCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.lines.decode(src).map_err(lines_error)? {
            Some(line) => Message::decode(&line).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }

        // Anything left is a record the peer never finished. The line codec
        // keeps a scan offset into `src`, so it starts over once `src` is
        // drained.
        let rest = self.lines.decode_eof(src).map_err(lines_error);
        src.clear();
        self.lines = LinesCodec::new_with_max_length(MAX_RECORD_LENGTH);

        match rest? {
            Some(rest) if !rest.trim().is_empty() => Err(Error::MalformedMessage(format!(
                "stream ended inside a record ({} bytes pending)",
                rest.len()
            ))),
            _ => Ok(None),
        }
    }
}

impl Encoder<Message> for RingCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let record = item.encode_record()?;
        self.lines.encode(record, dst).map_err(lines_error)
    }
}

fn lines_error(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::MaxLineLengthExceeded => Error::MalformedMessage(format!(
            "record exceeds {} bytes",
            MAX_RECORD_LENGTH
        )),
        LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            Error::MalformedMessage(e.to_string())
        }
        LinesCodecError::Io(e) => Error::Io(e),
    }
}

/// Resolve once shutdown has been requested
///
/// Never resolves if every sender is gone without requesting shutdown.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
