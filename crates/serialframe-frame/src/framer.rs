use bytes::BytesMut;

use crate::message::Message;
use crate::policy::DelimiterPolicy;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Accumulates received bytes and cuts them into messages at flush points.
///
/// The buffer is only ever drained by [`Framer::flush`]; a policy change
/// between flushes keeps the buffered bytes, which are then cut under the
/// new policy.
#[derive(Debug)]
pub struct Framer {
    buf: BytesMut,
    continuation: bool,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            continuation: false,
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// The raw buffer, for transports that read straight into it.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes received since the last flush.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the next emitted message continues the previous one.
    pub fn is_continuing(&self) -> bool {
        self.continuation
    }

    /// Cut the buffer into messages according to `policy`.
    pub fn flush(&mut self, policy: &DelimiterPolicy) -> Vec<Message> {
        match *policy {
            DelimiterPolicy::Timed { .. } => self.flush_timed(),
            DelimiterPolicy::CodeDelimited { code } => self.flush_code(code),
        }
    }

    fn flush_timed(&mut self) -> Vec<Message> {
        if self.buf.is_empty() {
            // A quiet window ends the burst.
            self.continuation = false;
            return Vec::new();
        }

        let data = self.buf.split().freeze();
        let msg = Message::new(self.continuation, data);
        self.continuation = true;
        vec![msg]
    }

    fn flush_code(&mut self, code: u16) -> Vec<Message> {
        if self.buf.is_empty() {
            return Vec::new();
        }

        let data = self.buf.split().freeze();
        let mut out = Vec::new();
        let mut start = 0;
        for (i, &b) in data.iter().enumerate() {
            if u16::from(b) == code {
                out.push(Message::new(self.continuation, data.slice(start..=i)));
                self.continuation = false;
                start = i + 1;
            }
        }

        if start < data.len() {
            out.push(Message::new(self.continuation, data.slice(start..)));
            self.continuation = true;
        }
        out
    }
}
