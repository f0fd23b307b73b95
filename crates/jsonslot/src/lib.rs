//! A streaming JSON decoder that writes straight into typed records.
//!
//! Destinations are declared with [`record!`], which generates a per-type
//! accessor table instead of relying on reflection. A [`Decoder`] pulls the
//! document from a [`ByteSource`] in fixed-size chunks and writes every field
//! the moment its value is complete, without building an intermediate tree.
//! Tokens may be split across chunks at any byte.
//!
//! ```rust
//! jsonslot::record! {
//!     #[derive(Debug, Default)]
//!     pub struct Movie {
//!         pub title: String,
//!         pub year: u16,
//!         pub rating: f64,
//!         pub starring: Vec<String>,
//!     }
//! }
//!
//! let mut movie = Movie::default();
//! jsonslot::unmarshal(
//!     br#"{"title":"The Last Samurai","year":2003,"rating":7.7,"starring":["Tom Cruise"]}"#,
//!     &mut movie,
//! )
//! .unwrap();
//! assert_eq!(movie.year, 2003);
//! assert_eq!(movie.starring, ["Tom Cruise"]);
//! ```
//!
//! Field maps are resolved once per type and shared process-wide (see
//! [`cache`]); decoders are recycled through a [`Pool`].

pub mod cache;
mod decoder;
mod error;
mod number;
mod options;
mod pool;
mod schema;
mod source;
mod unmarshal;

pub use cache::{FieldMap, Slot};
pub use decoder::Decoder;
pub use error::{DecodeError, ErrorKind, Found};
pub use number::Number;
pub use options::DecoderOptions;
pub use pool::{Pool, PooledDecoder};
pub use schema::{
    Element, ElementKind, Field, FieldDef, FieldMut, FloatSlot, IntegerSlot, Kind, ListSlot,
    MapSlot, OptionalSlot, Record, Reject, Scalar, Schema,
};
pub use source::{ByteSource, Filled, SliceSource};
pub use unmarshal::{decode, unmarshal};

#[doc(hidden)]
pub mod __private {
    pub use std::sync::Arc;
}
