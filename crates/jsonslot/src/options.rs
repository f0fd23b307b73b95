/// Configuration options for a [`Decoder`](crate::Decoder).
///
/// These options size the decoder's buffers and bound its destination stack.
/// They are fixed for the lifetime of a decoder; a [`Pool`](crate::Pool)
/// hands every decoder it creates the same options.
///
/// # Examples
///
/// ```rust
/// use jsonslot::{Decoder, DecoderOptions};
///
/// let decoder = Decoder::new(DecoderOptions {
///     read_buffer_size: 512,
///     max_depth: 8,
///     ..Default::default()
/// });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    /// Length of the fixed read buffer refilled from the byte source.
    ///
    /// Tokens may span refills, so this only trades syscalls for memory.
    /// Values below 1 are treated as 1.
    ///
    /// # Default
    ///
    /// `4096`
    pub read_buffer_size: usize,

    /// Baseline capacity of the capture buffer that holds string tokens.
    ///
    /// # Default
    ///
    /// `4096`
    pub capture_buffer_size: usize,

    /// Upper bound the capture buffer may double up to.
    ///
    /// A single string longer than this is captured into a one-off spill
    /// allocation that is dropped once the string has been written.
    ///
    /// # Default
    ///
    /// `1 MiB`
    pub capture_buffer_limit: usize,

    /// Maximum number of nested objects, including the top-level one.
    ///
    /// # Default
    ///
    /// `32`
    pub max_depth: usize,

    /// Whether to ignore anything after the top-level object closes.
    ///
    /// When `false`, only whitespace may follow the closing `}`.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_trailing_characters: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            capture_buffer_size: 4096,
            capture_buffer_limit: 1 << 20,
            max_depth: 32,
            allow_trailing_characters: false,
        }
    }
}
