//! Low-compressibility download bodies.
//!
//! Bytes come from a xorshift32 generator, four at a time, so neither
//! transport compression nor a caching middlebox can shortcut the
//! transfer.

use bytes::Bytes;
use futures::stream::{self, Stream};
use std::convert::Infallible;

/// Size of each generated body chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

const SEED_MIX: u64 = 0x9E37_79B9;

/// Marsaglia's 32-bit xorshift (13, 17, 5).
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    /// Zero is a fixed point of xorshift and is replaced.
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { SEED_MIX as u32 } else { seed };
        Self { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for word in buf.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            word.copy_from_slice(&bytes[..word.len()]);
        }
    }
}

/// Seed from the request time and size so consecutive bodies differ.
pub fn seed_for(unix_ms: u64, total_bytes: u64) -> u32 {
    (unix_ms ^ total_bytes ^ SEED_MIX) as u32
}

/// Lazily generated body of exactly `total_bytes` bytes.
pub fn body_stream(
    total_bytes: u64,
    seed: u32,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(
        (Xorshift32::new(seed), 0u64),
        move |(mut rng, sent)| async move {
            if sent >= total_bytes {
                return None;
            }

            let len = (total_bytes - sent).min(CHUNK_SIZE as u64) as usize;
            let mut chunk = vec![0u8; len];
            rng.fill(&mut chunk);

            Some((Ok(Bytes::from(chunk)), (rng, sent + len as u64)))
        },
    )
}
