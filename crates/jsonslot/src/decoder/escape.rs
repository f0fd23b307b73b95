//! Backslash escapes, decoded byte by byte so they may straddle refills.

use super::capture::CaptureBuffer;
use crate::error::ErrorKind;

const HIGH_SURROGATES: core::ops::RangeInclusive<u32> = 0xD800..=0xDBFF;
const LOW_SURROGATES: core::ops::RangeInclusive<u32> = 0xDC00..=0xDFFF;

/// Accumulates the four hexadecimal digits of a `\u` escape into one UTF-16
/// code unit.
#[derive(Debug, Default)]
pub(crate) struct UnicodeEscapeBuffer {
    acc: u32,
    len: u8,
}

impl UnicodeEscapeBuffer {
    pub(crate) fn reset(&mut self) {
        self.acc = 0;
        self.len = 0;
    }

    fn hex_val(b: u8) -> Option<u32> {
        match b {
            b'0'..=b'9' => Some(u32::from(b - b'0')),
            b'a'..=b'f' => Some(u32::from(b - b'a') + 10),
            b'A'..=b'F' => Some(u32::from(b - b'A') + 10),
            _ => None,
        }
    }

    /// Feeds one digit; the fourth returns the code unit and resets.
    pub(crate) fn feed(&mut self, b: u8) -> Result<Option<u32>, ErrorKind> {
        let d = Self::hex_val(b).ok_or(ErrorKind::InvalidUnicodeEscapeChar(char::from(b)))?;
        self.acc = (self.acc << 4) | d;
        self.len += 1;
        if self.len < 4 {
            return Ok(None);
        }
        let unit = self.acc;
        self.reset();
        Ok(Some(unit))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Right after the backslash.
    #[default]
    Escape,
    Unicode,
    /// A high surrogate was decoded; its low half must follow as `\uXXXX`.
    LowBackslash,
    LowU,
    LowUnicode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Pending,
    Done,
}

#[derive(Debug, Default)]
pub(crate) struct EscapeDecoder {
    state: State,
    hex: UnicodeEscapeBuffer,
    high: u32,
}

impl EscapeDecoder {
    /// Prepares for the byte following a backslash.
    pub(crate) fn start(&mut self) {
        self.state = State::Escape;
        self.hex.reset();
        self.high = 0;
    }

    pub(crate) fn feed(&mut self, b: u8, out: &mut CaptureBuffer) -> Result<Step, ErrorKind> {
        match self.state {
            State::Escape => {
                let decoded = match b {
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'u' => {
                        self.state = State::Unicode;
                        return Ok(Step::Pending);
                    }
                    other => return Err(ErrorKind::InvalidEscape(char::from(other))),
                };
                out.extend(&[decoded]);
                Ok(Step::Done)
            }
            State::Unicode => match self.hex.feed(b)? {
                None => Ok(Step::Pending),
                Some(unit) if HIGH_SURROGATES.contains(&unit) => {
                    self.high = unit;
                    self.state = State::LowBackslash;
                    Ok(Step::Pending)
                }
                Some(unit) => {
                    let c = char::from_u32(unit)
                        .ok_or(ErrorKind::InvalidUnicodeEscapeSequence(unit))?;
                    out.push_char(c);
                    Ok(Step::Done)
                }
            },
            State::LowBackslash if b == b'\\' => {
                self.state = State::LowU;
                Ok(Step::Pending)
            }
            State::LowU if b == b'u' => {
                self.state = State::LowUnicode;
                Ok(Step::Pending)
            }
            State::LowBackslash | State::LowU => {
                Err(ErrorKind::InvalidUnicodeEscapeSequence(self.high))
            }
            State::LowUnicode => match self.hex.feed(b)? {
                None => Ok(Step::Pending),
                Some(low) if LOW_SURROGATES.contains(&low) => {
                    let code = 0x1_0000 + ((self.high - 0xD800) << 10) + (low - 0xDC00);
                    let c = char::from_u32(code)
                        .ok_or(ErrorKind::InvalidUnicodeEscapeSequence(code))?;
                    out.push_char(c);
                    Ok(Step::Done)
                }
                Some(low) => Err(ErrorKind::InvalidUnicodeEscapeSequence(low)),
            },
        }
    }
}
