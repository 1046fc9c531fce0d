//! Key and value generation for benchmark phases.
//!
//! Keys are rendered as fixed-width, zero-padded decimal strings (see [`KEY_LEN`]) so that their
//! byte order matches their numeric order. This matters for stores that order keys lexically.
//!
//! Values come from a [`ValuePool`], a precomputed buffer whose content compresses to roughly a
//! given fraction of its size. Handing out windows of the pool keeps value generation off the
//! measured path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of every generated key, in bytes.
pub const KEY_LEN: usize = 16;

/// Seed shared by the key stream and the value pool, so repeated runs with the same configuration
/// see the same keys and values.
pub const DEFAULT_SEED: u64 = 301;

/// Minimum size of the value pool.
const POOL_SIZE: usize = 1 << 20;

/// Fragment size used when blending random bytes with fixed-byte runs.
const FRAGMENT_LEN: usize = 100;

/// The byte used for the compressible runs in the value pool.
const FILLER: u8 = b' ';

/// The order in which a phase visits the key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOrder {
    Sequential,
    Random,
}

/// Number of distinct keys that fit in [`KEY_LEN`] digits.
pub const MAX_KEYS: u64 = 10u64.pow(KEY_LEN as u32);

/// A fixed-width key, stored inline.
pub type Key = [u8; KEY_LEN];

/// Render `k` as a 16-digit, zero-padded decimal key. `k` must be below [`MAX_KEYS`], which
/// `BenchOpt::sanity` guarantees for every key a benchmark draws.
pub fn format_key(k: u64) -> Key {
    debug_assert!(k < MAX_KEYS, "key {} has more than 16 digits", k);
    let mut key = [b'0'; KEY_LEN];
    let mut rest = k;
    for b in key.iter_mut().rev() {
        *b = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
    key
}

/// Key generator for a benchmark run.
///
/// The random stream is created once and shared by all phases, so the sequence of random keys
/// depends only on the seed and the number of keys drawn so far.
#[derive(Debug)]
pub struct KeyGenerator {
    rng: StdRng,
}

impl KeyGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The key of the `j`-th item of a batch starting at `iter`. Random keys are drawn uniformly
    /// from `[0, domain)`.
    pub fn next(&mut self, order: KeyOrder, iter: usize, j: usize, domain: usize) -> Key {
        let k = match order {
            KeyOrder::Sequential => iter + j,
            KeyOrder::Random => self.uniform(domain),
        };
        format_key(k as u64)
    }

    /// A uniform draw from `[0, n)`, or 0 when `n` is 0.
    pub fn uniform(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.rng.random_range(0..n)
    }
}

/// A precomputed buffer of pseudorandom bytes that compresses to roughly `ratio` of its size.
///
/// The pool is built from fragments of [`FRAGMENT_LEN`] bytes: the first `ratio * FRAGMENT_LEN`
/// bytes of each fragment are random printable characters and the rest is a run of a fixed byte.
///
/// Printable characters carry at most log2(95), about 6.6 bits, per byte, so a general-purpose
/// compressor shrinks the pool to roughly `0.82 * ratio` of its size rather than `ratio` exactly.
#[derive(Debug)]
pub struct ValuePool {
    data: Box<[u8]>,
    pos: usize,
}

impl ValuePool {
    /// Build a pool that can serve values of up to `max_len` bytes.
    pub fn new(ratio: f64, max_len: usize, seed: u64) -> Self {
        let size = POOL_SIZE.max(max_len.saturating_mul(2));
        let raw = ((FRAGMENT_LEN as f64 * ratio).round() as usize).clamp(1, FRAGMENT_LEN);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Vec::with_capacity(size + FRAGMENT_LEN);
        while data.len() < size {
            for _ in 0..raw {
                data.push(b' ' + rng.random_range(0..95u8));
            }
            data.extend(std::iter::repeat(FILLER).take(FRAGMENT_LEN - raw));
        }
        data.truncate(size);
        Self {
            data: data.into_boxed_slice(),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return the next `n` bytes of the pool. The window restarts at the beginning of the pool
    /// when it would run past the end.
    pub fn generate(&mut self, n: usize) -> &[u8] {
        assert!(n <= self.data.len(), "value of {} bytes exceeds the pool", n);
        if self.pos + n > self.data.len() {
            self.pos = 0;
        }
        let start = self.pos;
        self.pos += n;
        &self.data[start..self.pos]
    }
}
