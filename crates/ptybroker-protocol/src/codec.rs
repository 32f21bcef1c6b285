use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::errors::ProtocolError;

/// Newline-delimited JSON framing.
///
/// Decoding splits the buffered bytes on `\n`, keeps the trailing partial
/// line for the next read and parses every complete line as one `D`.
/// A line that does not parse is logged and skipped: the buffer has
/// already advanced past it, so the following lines stay aligned.
///
/// Encoding writes `serde_json::to_string(item)` followed by `\n`.
#[derive(Debug)]
pub struct JsonLineCodec<D> {
    /// Bytes of `src` already scanned for a newline.
    scanned: usize,
    dropped: u64,
    _marker: PhantomData<fn() -> D>,
}

impl<D> JsonLineCodec<D> {
    pub fn new() -> Self {
        Self {
            scanned: 0,
            dropped: 0,
            _marker: PhantomData,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }
}

impl<D> Default for JsonLineCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned> Decoder for JsonLineCodec<D> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtocolError> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };

            let newline = self.scanned + offset;
            self.scanned = 0;
            let frame = src.split_to(newline + 1);
            let mut line = &frame[..newline];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<D>(line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    self.dropped += 1;
                    warn!(
                        event = "protocol.codec.line_dropped",
                        error = %e,
                        line_len = line.len(),
                        preview = %String::from_utf8_lossy(&line[..line.len().min(120)]),
                    );
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtocolError> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        if !src.is_empty() {
            warn!(
                event = "protocol.codec.partial_line_discarded",
                bytes = src.len(),
            );
            src.clear();
            self.scanned = 0;
        }
        Ok(None)
    }
}

impl<D, T: Serialize> Encoder<T> for JsonLineCodec<D> {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
