//! Pull-based byte sources.

use std::io;

/// Result of one [`ByteSource::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filled {
    /// Number of bytes written to the front of the buffer.
    pub len: usize,
    /// Whether the source is exhausted. No further reads are issued once a
    /// source reports this, and `len` may still be non-zero.
    pub end_of_input: bool,
}

/// Something the decoder can pull input from.
///
/// Every [`io::Read`] is a byte source: a read of zero bytes is taken as the
/// end of input and interrupted reads are retried.
pub trait ByteSource {
    /// Writes up to `buf.len()` bytes into `buf`.
    ///
    /// # Errors
    ///
    /// Any I/O error aborts the decode call that issued the read.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Filled>;
}

impl<R: io::Read + ?Sized> ByteSource for R {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Filled> {
        loop {
            match self.read(buf) {
                Ok(len) => {
                    return Ok(Filled {
                        len,
                        end_of_input: len == 0,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }
}

/// An in-memory source that reports end of input together with its last
/// bytes.
///
/// It deliberately does not implement [`io::Read`], so it does not pick up
/// the blanket implementation above.
#[derive(Debug, Clone, Default)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// A source over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Points this source at new data.
    pub fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
        self.pos = 0;
    }

    /// Bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Filled> {
        let rest = self.remaining();
        let len = rest.len().min(buf.len());
        buf[..len].copy_from_slice(&rest[..len]);
        self.pos += len;
        Ok(Filled {
            len,
            end_of_input: self.pos == self.data.len(),
        })
    }
}
