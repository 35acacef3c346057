use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Longest line accepted before its bytes are discarded
///
/// Status lines are a few dozen bytes; anything near this size is garbage.
pub const MAX_LINE_LENGTH: usize = 4096;

/// One item produced by [`LineFramer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped
    Line(String),
    /// This many bytes went by without a terminator within the length limit
    /// and were dropped
    Overflow(usize),
}

/// Splits a byte stream into CRLF-terminated lines
///
/// Used through [`tokio_util::codec::FramedRead`], which keeps the read
/// buffer, so a line split across reads is still yielded once. The scan
/// position is remembered between calls, and a line that grows past the
/// maximum length is dropped up to its terminator instead of buffered.
#[derive(Debug)]
pub struct LineFramer {
    /// Offset up to which the buffer is known to hold no terminator
    next_index: usize,
    max_length: usize,
    /// Dropping the tail of an overlong line until the next terminator
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarding: false,
        }
    }

    /// Drop everything buffered except a trailing `\r` that may start a terminator
    fn discard_unterminated(&mut self, buf: &mut BytesMut) -> usize {
        let keep = usize::from(buf.last() == Some(&b'\r'));
        let dropped = buf.len() - keep;
        buf.advance(dropped);
        self.next_index = 0;
        dropped
    }
}

impl Decoder for LineFramer {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            // Back up one byte so a terminator split across reads is found
            let start = self.next_index.saturating_sub(LINE_TERMINATOR.len() - 1);

            let Some(offset) = find_terminator(&buf[start..]) else {
                if self.discarding {
                    self.discard_unterminated(buf);
                    return Ok(None);
                }
                if buf.len() > self.max_length {
                    self.discarding = true;
                    let dropped = self.discard_unterminated(buf);
                    return Ok(Some(Frame::Overflow(dropped)));
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = start + offset;
            let line = buf.split_to(end);
            buf.advance(LINE_TERMINATOR.len());
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_length {
                return Ok(Some(Frame::Overflow(line.len())));
            }
            if !line.is_empty() {
                return Ok(Some(Frame::Line(String::from_utf8_lossy(&line).into_owned())));
            }
        }
    }

    /// A partial line left when the peer closes is dropped, not an error
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        let frame = self.decode(buf)?;
        if frame.is_none() {
            buf.clear();
            self.next_index = 0;
            self.discarding = false;
        }
        Ok(frame)
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}
