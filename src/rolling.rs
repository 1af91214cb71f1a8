//! Rolling weak checksum: Adler-32 over a fixed-size sliding window.
//!
//! The delta scan slides a window one byte at a time through regions that do
//! not match any known block, so the checksum must update in O(1) per byte.
//! Below [`BLOCK_SIZE`] bytes the accumulator behaves like plain Adler-32;
//! once the window is full, each fed byte evicts the oldest one.

/// Block granularity of the whole engine.
///
/// Beware when changing this: `BLOCK_SIZE * 255` must fit in a `u32`,
/// otherwise the rolled `s2` term overflows and the checksum misbehaves.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Largest prime smaller than 65536.
const MOD: u32 = 65521;

/// Largest n such that 255 * n * (n+1) / 2 + (n+1) * (MOD-1) <= 2^32 - 1.
/// Mentioned in RFC 1950 (search for "5552").
const NMAX: usize = 5552;

/// Adler-32 accumulator over a ring buffer of the last [`BLOCK_SIZE`] bytes.
pub struct RollingChecksum {
    digest: u32,
    window: Vec<u8>,
    head: usize,
    len: usize,
}

impl RollingChecksum {
    pub fn new() -> Self {
        Self {
            digest: 1,
            window: vec![0u8; BLOCK_SIZE],
            head: 0,
            len: 0,
        }
    }

    /// Return to the empty-window initial state.
    pub fn reset(&mut self) {
        self.digest = 1;
        self.head = 0;
        self.len = 0;
    }

    /// Number of bytes currently in the window.
    pub fn window_len(&self) -> usize {
        self.len
    }

    /// Append bytes. While the window is short of [`BLOCK_SIZE`] they are
    /// accumulated; afterwards every byte rolls the window by one.
    pub fn feed(&mut self, bytes: &[u8]) {
        let mut bytes = bytes;
        if self.len < BLOCK_SIZE {
            let fill = (BLOCK_SIZE - self.len).min(bytes.len());
            let (filling, rolling) = bytes.split_at(fill);
            self.window[self.len..self.len + fill].copy_from_slice(filling);
            self.add(filling);
            self.len += fill;
            bytes = rolling;
        }
        for &incoming in bytes {
            let outgoing = self.window[self.head];
            self.roll(outgoing, incoming);
            self.window[self.head] = incoming;
            self.head = (self.head + 1) % BLOCK_SIZE;
        }
    }

    /// Current packed digest: `(s2 << 16) | s1`.
    pub fn sum32(&self) -> u32 {
        self.digest
    }

    /// Plain Adler-32 accumulation, reducing every NMAX bytes so the
    /// unreduced sums stay inside u32.
    fn add(&mut self, bytes: &[u8]) {
        let mut s1 = self.digest & 0xffff;
        let mut s2 = self.digest >> 16;
        for chunk in bytes.chunks(NMAX) {
            for &b in chunk {
                s1 += u32::from(b);
                s2 += s1;
            }
            s1 %= MOD;
            s2 %= MOD;
        }
        self.digest = (s2 << 16) | s1;
    }

    /// O(1) window slide. MOD is added before the subtractions so the
    /// arithmetic never underflows in the unsigned domain.
    fn roll(&mut self, outgoing: u8, incoming: u8) {
        let mut s1 = self.digest & 0xffff;
        let mut s2 = self.digest >> 16;
        s1 = (s1 + MOD + u32::from(incoming) - u32::from(outgoing)) % MOD;
        s2 = (s2 + MOD + s1 - (BLOCK_SIZE as u32 * u32::from(outgoing)) % MOD - 1) % MOD;
        self.digest = (s2 << 16) | s1;
    }
}

impl Default for RollingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Adler-32 of a complete buffer, computed from scratch.
pub fn weak_checksum(data: &[u8]) -> u32 {
    let mut acc = RollingChecksum::new();
    debug_assert!(data.len() <= BLOCK_SIZE);
    acc.feed(data);
    acc.sum32()
}
