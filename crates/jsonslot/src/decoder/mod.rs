//! The decode loop.
//!
//! Overview
//! - A [`Decoder`] owns a fixed read buffer and a [`Scanner`]. Each call to
//!   [`Decoder::decode`] refills the read buffer from a [`ByteSource`] until
//!   the source reports end of input, handing every chunk to the scanner.
//! - The scanner is a byte-driven state machine. At the top of each step it
//!   is either inside a string, inside a number, skipping the rest of a
//!   literal, or at a control byte; the first three carry over between
//!   chunks, so a token may be split at any byte.
//! - Values are written into the destination as soon as they are complete.
//!   There is no intermediate tree and no recursion: nesting is tracked by a
//!   bounded [`Stack`] of frames.
//!
//! Strings
//! - A string that opens and closes inside one chunk without escapes is
//!   delivered straight from the read buffer.
//! - Otherwise its bytes are copied into the [`CaptureBuffer`] as the scanner
//!   passes them (escapes are decoded on the way in) and the token is
//!   delivered from there once the closing quote arrives.
//! - In name position a string selects a field through the record's field
//!   map; in value position it is validated as UTF-8 and written.
//!
//! Literals
//! - `true`, `false` and `null` are recognised by their first byte and the
//!   remainder is skipped without being checked.

mod capture;
mod escape;
mod stack;
#[cfg(test)]
mod tests;

use bstr::ByteSlice;
use tracing::{debug, trace};

use self::{
    capture::CaptureBuffer,
    escape::{EscapeDecoder, Step},
    stack::{Position, Stack},
};
use crate::{
    error::{DecodeError, ErrorKind},
    number::Accumulator,
    options::DecoderOptions,
    schema::{Record, Scalar},
    source::ByteSource,
};

/// A reusable streaming decoder.
///
/// Buffers, the destination stack, and a local copy of resolved field maps
/// are kept between calls; everything that belongs to one document is reset
/// at the start of [`decode`](Decoder::decode).
///
/// # Examples
///
/// ```rust
/// use jsonslot::{Decoder, DecoderOptions, SliceSource};
///
/// jsonslot::record! {
///     #[derive(Default)]
///     struct Credits {
///         director: String,
///         year: u16,
///     }
/// }
///
/// let mut decoder = Decoder::new(DecoderOptions::default());
/// let mut credits = Credits::default();
/// let mut source = SliceSource::new(br#"{"director":"Edward Zwick","year":2003}"#);
/// decoder.decode(&mut source, &mut credits).unwrap();
/// assert_eq!(credits.director, "Edward Zwick");
/// assert_eq!(credits.year, 2003);
/// ```
#[derive(Debug)]
pub struct Decoder {
    options: DecoderOptions,
    buffer: Vec<u8>,
    scanner: Scanner,
}

impl Decoder {
    /// Creates a decoder configured by `options`.
    #[must_use]
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            buffer: vec![0; options.read_buffer_size.max(1)],
            scanner: Scanner::new(&options),
        }
    }

    /// The options this decoder was created with.
    #[must_use]
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Reads `source` to its end, writing every field of the top-level
    /// object into `destination`.
    ///
    /// Fields are written in input order. On error, fields written before the
    /// failure keep their new values, while the rejected field keeps its old
    /// one. A list whose array had not closed keeps its previous elements.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if a name has no field in the destination,
    /// a value does not fit its field, the input is malformed or truncated,
    /// or the source fails.
    pub fn decode<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        destination: &mut dyn Record,
    ) -> Result<(), DecodeError> {
        self.scanner.reset();
        let result = self.run(source, destination);
        if let Err(err) = &result {
            debug!(
                kind = %err.kind(),
                offset = err.offset(),
                depth = self.scanner.stack.depth(),
                "decode failed"
            );
            self.scanner.stack.abandon(destination);
        }
        self.scanner.reset();
        result
    }

    fn run<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        destination: &mut dyn Record,
    ) -> Result<(), DecodeError> {
        loop {
            let filled = source
                .fill(&mut self.buffer)
                .map_err(|err| DecodeError::new(ErrorKind::Io(err), self.scanner.base))?;
            trace!(
                len = filled.len,
                end_of_input = filled.end_of_input,
                "read buffer refilled"
            );
            let len = filled.len.min(self.buffer.len());
            self.scanner.scan(&self.buffer[..len], destination)?;
            if filled.end_of_input {
                return self.scanner.finish();
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderOptions::default())
    }
}

/// How a string token is used once it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Name,
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Control,
    String { escaping: bool, role: Role },
    Number,
    Literal { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before the opening `{`.
    Before,
    In,
    /// After the closing `}`.
    After,
}

#[derive(Debug)]
struct Scanner {
    lex: Lex,
    phase: Phase,
    /// Absolute offset of the first byte of the current chunk.
    base: usize,
    allow_trailing: bool,
    capture: CaptureBuffer,
    number: Accumulator,
    escape: EscapeDecoder,
    stack: Stack,
}

impl Scanner {
    fn new(options: &DecoderOptions) -> Self {
        Self {
            lex: Lex::Control,
            phase: Phase::Before,
            base: 0,
            allow_trailing: options.allow_trailing_characters,
            capture: CaptureBuffer::new(options.capture_buffer_size, options.capture_buffer_limit),
            number: Accumulator::default(),
            escape: EscapeDecoder::default(),
            stack: Stack::new(options.max_depth),
        }
    }

    fn reset(&mut self) {
        self.lex = Lex::Control;
        self.phase = Phase::Before;
        self.base = 0;
        self.capture.end_token();
        self.number.reset();
        self.stack.reset();
    }

    fn scan(&mut self, chunk: &[u8], root: &mut dyn Record) -> Result<(), DecodeError> {
        let mut i = 0;
        let result = self.scan_chunk(chunk, root, &mut i);
        let offset = self.base + i;
        self.base += chunk.len();
        result.map_err(|kind| DecodeError::new(kind, offset))
    }

    /// On error, `i` is left at the offending byte.
    fn scan_chunk(
        &mut self,
        chunk: &[u8],
        root: &mut dyn Record,
        i: &mut usize,
    ) -> Result<(), ErrorKind> {
        // Start of the not yet captured part of the current string.
        let mut run = 0;
        while *i < chunk.len() {
            match self.lex {
                Lex::String {
                    escaping: true,
                    role,
                } => {
                    if self.escape.feed(chunk[*i], &mut self.capture)? == Step::Done {
                        self.lex = Lex::String {
                            escaping: false,
                            role,
                        };
                        run = *i + 1;
                    }
                    *i += 1;
                }
                Lex::String {
                    escaping: false,
                    role,
                } => {
                    let Some(found) = chunk[*i..].find_byteset(b"\"\\") else {
                        *i = chunk.len();
                        break;
                    };
                    let end = *i + found;
                    *i = end;
                    if chunk[end] == b'\\' {
                        self.capture.extend(&chunk[run..end]);
                        self.escape.start();
                        self.lex = Lex::String {
                            escaping: true,
                            role,
                        };
                    } else {
                        self.end_string(&chunk[run..end], role, root)?;
                        self.lex = Lex::Control;
                    }
                    *i += 1;
                }
                Lex::Number => {
                    let b = chunk[*i];
                    if self.number.push(b) {
                        *i += 1;
                    } else {
                        // `b` is dispatched again as a control byte.
                        self.end_number(b, root)?;
                        self.lex = Lex::Control;
                    }
                }
                Lex::Literal { remaining } => {
                    let skip = remaining.min(chunk.len() - *i);
                    *i += skip;
                    self.lex = match remaining - skip {
                        0 => Lex::Control,
                        remaining => Lex::Literal { remaining },
                    };
                }
                Lex::Control => {
                    let b = chunk[*i];
                    match self.phase {
                        Phase::Before => match b {
                            b' ' | b'\t' | b'\n' | b'\r' => {}
                            b'{' => {
                                self.stack.begin(root);
                                self.phase = Phase::In;
                            }
                            _ => return Err(ErrorKind::UnexpectedCharacter(char::from(b))),
                        },
                        Phase::In => {
                            if !self.dispatch(b, root)? {
                                continue;
                            }
                        }
                        Phase::After => match b {
                            b' ' | b'\t' | b'\n' | b'\r' => {}
                            _ if self.allow_trailing => {
                                *i = chunk.len();
                                break;
                            }
                            _ => return Err(ErrorKind::TrailingCharacters),
                        },
                    }
                    *i += 1;
                    if let Lex::String { .. } = self.lex {
                        run = *i;
                    }
                }
            }
        }
        if let Lex::String {
            escaping: false, ..
        } = self.lex
        {
            self.capture.extend(&chunk[run.min(chunk.len())..]);
        }
        Ok(())
    }

    /// Handles one byte in control position. Returns `false` if the byte was
    /// not consumed and must be scanned again in the new mode.
    fn dispatch(&mut self, b: u8, root: &mut dyn Record) -> Result<bool, ErrorKind> {
        match b {
            b' ' | b'\t' | b'\n' | b'\r' | b':' | b',' => {}
            b'"' => {
                let role = match self.stack.position() {
                    Position::Name => Role::Name,
                    Position::Key(_) => Role::Key,
                    _ => Role::Value,
                };
                self.lex = Lex::String {
                    escaping: false,
                    role,
                };
            }
            b'-' | b'0'..=b'9' => {
                self.expect_value(b)?;
                self.number.reset();
                self.lex = Lex::Number;
                return Ok(false);
            }
            b't' => {
                self.expect_value(b)?;
                self.stack.write(root, Scalar::Boolean(true))?;
                self.lex = Lex::Literal { remaining: 3 };
            }
            b'f' => {
                self.expect_value(b)?;
                self.stack.write(root, Scalar::Boolean(false))?;
                self.lex = Lex::Literal { remaining: 4 };
            }
            b'n' => {
                self.expect_value(b)?;
                self.stack.write_null(root)?;
                self.lex = Lex::Literal { remaining: 3 };
            }
            b'{' => self.stack.open_object(root)?,
            b'}' => {
                if self.stack.close_object() {
                    self.phase = Phase::After;
                }
            }
            b'[' => self.stack.open_array(root)?,
            b']' => self.stack.close_array(root)?,
            _ => return Err(ErrorKind::UnexpectedCharacter(char::from(b))),
        }
        Ok(true)
    }

    fn expect_value(&self, b: u8) -> Result<(), ErrorKind> {
        if self.stack.position().expects_value() {
            Ok(())
        } else {
            Err(ErrorKind::UnexpectedCharacter(char::from(b)))
        }
    }

    fn end_string(
        &mut self,
        tail: &[u8],
        role: Role,
        root: &mut dyn Record,
    ) -> Result<(), ErrorKind> {
        let token = if self.capture.is_empty() {
            tail
        } else {
            self.capture.extend(tail);
            self.capture.token()
        };
        let result = match role {
            Role::Name => self.stack.select(token),
            Role::Key => token
                .to_str()
                .map_err(|_| ErrorKind::InvalidUtf8)
                .map(|key| self.stack.set_key(key)),
            Role::Value => token
                .to_str()
                .map_err(|_| ErrorKind::InvalidUtf8)
                .and_then(|value| self.stack.write(root, Scalar::String(value))),
        };
        self.capture.end_token();
        result
    }

    fn end_number(&mut self, terminator: u8, root: &mut dyn Record) -> Result<(), ErrorKind> {
        if !self.number.has_digits() {
            return Err(ErrorKind::UnexpectedCharacter(char::from(terminator)));
        }
        self.stack.write(root, Scalar::Number(self.number.finish()))
    }

    fn finish(&mut self) -> Result<(), DecodeError> {
        if self.phase == Phase::After && self.lex == Lex::Control {
            Ok(())
        } else {
            Err(DecodeError::new(ErrorKind::UnexpectedEndOfInput, self.base))
        }
    }
}
