//! Owned storage for the string token being scanned.
//!
//! Bytes are copied out of the read buffer as the scanner passes them, so a
//! token survives refills and may span any number of chunks. The buffer
//! starts at a baseline capacity and doubles up to a limit; a token that
//! would need more than the limit is moved into a one-off allocation which is
//! dropped as soon as that token ends.

use tracing::trace;

#[derive(Debug)]
pub(crate) struct CaptureBuffer {
    data: Vec<u8>,
    spill: Option<Vec<u8>>,
    limit: usize,
}

impl CaptureBuffer {
    pub(crate) fn new(baseline: usize, limit: usize) -> Self {
        let limit = limit.max(baseline).max(1);
        Self {
            data: Vec::with_capacity(baseline.max(1)),
            spill: None,
            limit,
        }
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        if let Some(spill) = &mut self.spill {
            spill.extend_from_slice(bytes);
            return;
        }
        let needed = self.data.len() + bytes.len();
        if needed > self.data.capacity() {
            if needed > self.limit {
                let mut spill = Vec::with_capacity(needed);
                spill.extend_from_slice(&self.data);
                spill.extend_from_slice(bytes);
                trace!(len = needed, limit = self.limit, "capture spilled");
                self.data.clear();
                self.spill = Some(spill);
                return;
            }
            let mut capacity = self.data.capacity().max(1);
            while capacity < needed {
                capacity = capacity.saturating_mul(2);
            }
            let capacity = capacity.min(self.limit);
            trace!(from = self.data.capacity(), to = capacity, "capture grown");
            self.data.reserve_exact(capacity - self.data.len());
        }
        self.data.extend_from_slice(bytes);
    }

    pub(crate) fn push_char(&mut self, c: char) {
        self.extend(c.encode_utf8(&mut [0; 4]).as_bytes());
    }

    pub(crate) fn token(&self) -> &[u8] {
        self.spill.as_deref().unwrap_or(&self.data)
    }

    /// Whether the current token has any bytes.
    pub(crate) fn is_empty(&self) -> bool {
        self.token().is_empty()
    }

    /// Discards the current token.
    pub(crate) fn end_token(&mut self) {
        self.data.clear();
        self.spill = None;
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[cfg(test)]
    pub(crate) fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_limit() {
        let mut buf = CaptureBuffer::new(4, 16);
        buf.extend(b"abc");
        assert_eq!(buf.capacity(), 4);
        buf.extend(b"defgh");
        assert_eq!(buf.capacity(), 8);
        buf.extend(b"ijklmn");
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.token(), b"abcdefghijklmn");
        assert!(!buf.is_spilled());
    }

    #[test]
    fn oversized_token_spills_and_is_not_retained() {
        let mut buf = CaptureBuffer::new(4, 16);
        buf.extend(b"0123456789");
        buf.extend(b"0123456789");
        assert!(buf.is_spilled());
        assert_eq!(buf.token().len(), 20);
        buf.extend(b"!");
        assert_eq!(buf.token(), b"01234567890123456789!");

        buf.end_token();
        assert!(!buf.is_spilled());
        assert!(buf.is_empty());
        assert!(buf.capacity() <= 16);

        buf.extend(b"small");
        assert!(!buf.is_spilled());
        assert_eq!(buf.token(), b"small");
    }

    #[test]
    fn push_char_encodes_utf8() {
        let mut buf = CaptureBuffer::new(1, 64);
        buf.push_char('é');
        buf.push_char('\u{1F600}');
        assert_eq!(buf.token(), "é\u{1F600}".as_bytes());
    }
}
