//! Entry points backed by the global [`Pool`].

use crate::{
    error::DecodeError,
    pool::Pool,
    schema::Record,
    source::{ByteSource, SliceSource},
};

/// Decodes everything `source` yields into `destination`, using a decoder
/// from [`Pool::global`].
///
/// `source` may be any [`std::io::Read`]; it is read until it reports end of
/// input.
///
/// ```rust
/// jsonslot::record! {
///     #[derive(Default)]
///     struct Cast {
///         starring: Vec<String>,
///     }
/// }
///
/// let mut cast = Cast::default();
/// let mut reader = &br#"{"starring":["Tom Cruise","Ken Watanabe"]}"#[..];
/// jsonslot::decode(&mut reader, &mut cast).unwrap();
/// assert_eq!(cast.starring, ["Tom Cruise", "Ken Watanabe"]);
/// ```
///
/// # Errors
///
/// See [`Decoder::decode`](crate::Decoder::decode).
pub fn decode<S: ByteSource + ?Sized>(
    source: &mut S,
    destination: &mut dyn Record,
) -> Result<(), DecodeError> {
    Pool::global().acquire().decode(source, destination)
}

/// Decodes a complete document held in memory.
///
/// # Errors
///
/// See [`Decoder::decode`](crate::Decoder::decode).
pub fn unmarshal(bytes: &[u8], destination: &mut dyn Record) -> Result<(), DecodeError> {
    decode(&mut SliceSource::new(bytes), destination)
}
