//! Recycling of decoders between calls.

use core::{
    cell::Cell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::trace;

use crate::{decoder::Decoder, options::DecoderOptions};

/// Number of independently locked free lists.
const NUM_SEGMENTS: usize = 16;

static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Free list used by the current thread.
    static SEGMENT_INDEX: Cell<usize> =
        Cell::new(THREAD_COUNTER.fetch_add(1, Ordering::Relaxed) % NUM_SEGMENTS);
}

/// A pool of idle decoders.
///
/// Idle decoders are spread over several free lists, and each thread takes
/// from and returns to its own list, so threads decoding concurrently rarely
/// contend. A decoder taken from the pool keeps the buffers it grew and the
/// field maps it resolved while it was last in use.
#[derive(Debug)]
pub struct Pool {
    segments: [Mutex<Vec<Decoder>>; NUM_SEGMENTS],
    options: DecoderOptions,
}

impl Pool {
    /// A pool of decoders with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DecoderOptions::default())
    }

    /// A pool whose decoders are all created with `options`.
    #[must_use]
    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            segments: core::array::from_fn(|_| Mutex::new(Vec::new())),
            options,
        }
    }

    /// The process-wide pool used by [`decode`](crate::decode) and
    /// [`unmarshal`](crate::unmarshal).
    pub fn global() -> &'static Pool {
        static GLOBAL: OnceLock<Pool> = OnceLock::new();
        GLOBAL.get_or_init(Pool::new)
    }

    /// Options given to every decoder this pool creates.
    #[must_use]
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Takes an idle decoder, creating one if there is none.
    ///
    /// The decoder goes back to the pool when the guard is dropped.
    pub fn acquire(&self) -> PooledDecoder<'_> {
        let recycled = self.segment().lock().unwrap_or_else(PoisonError::into_inner).pop();
        trace!(recycled = recycled.is_some(), "decoder acquired");
        let decoder = recycled.unwrap_or_else(|| Decoder::new(self.options));
        PooledDecoder {
            pool: self,
            decoder: Some(decoder),
        }
    }

    /// Returns a decoder to the pool.
    pub fn release(&self, decoder: Decoder) {
        self.segment()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decoder);
    }

    /// Number of idle decoders.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    fn segment(&self) -> &Mutex<Vec<Decoder>> {
        &self.segments[SEGMENT_INDEX.with(Cell::get)]
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoder checked out of a [`Pool`].
///
/// Dereferences to [`Decoder`] and returns it to the pool when dropped,
/// including when a decode call fails or panics.
#[derive(Debug)]
pub struct PooledDecoder<'p> {
    pool: &'p Pool,
    decoder: Option<Decoder>,
}

impl PooledDecoder<'_> {
    /// Returns the decoder to its pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Keeps the decoder instead of returning it to the pool.
    #[must_use]
    pub fn detach(mut self) -> Decoder {
        match self.decoder.take() {
            Some(decoder) => decoder,
            None => Decoder::new(self.pool.options),
        }
    }
}

impl Deref for PooledDecoder<'_> {
    type Target = Decoder;

    fn deref(&self) -> &Decoder {
        match &self.decoder {
            Some(decoder) => decoder,
            None => unreachable!("pooled decoder used after release"),
        }
    }
}

impl DerefMut for PooledDecoder<'_> {
    fn deref_mut(&mut self) -> &mut Decoder {
        match &mut self.decoder {
            Some(decoder) => decoder,
            None => unreachable!("pooled decoder used after release"),
        }
    }
}

impl Drop for PooledDecoder<'_> {
    fn drop(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            self.pool.release(decoder);
        }
    }
}
