use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

const WORD_BITS: usize = 64;

/// Fixed-capacity bit vector whose bits can be set concurrently.
///
/// Single-bit writes go through a word-granularity atomic OR, so many threads
/// may call [`set`](DynamicBitset::set) at once. Everything that needs `&mut`
/// (resize, reset, merge) happens in the serial phases of the build.
#[derive(Debug, Default)]
pub struct DynamicBitset {
    words: Vec<AtomicU64>,
    num_bits: usize,
}

impl DynamicBitset {
    pub fn new(num_bits: usize) -> Self {
        let words = (0..num_bits.div_ceil(WORD_BITS))
            .map(|_| AtomicU64::new(0))
            .collect();
        Self { words, num_bits }
    }

    /// Number of bits this set can hold.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Grow or shrink to `num_bits`, keeping bits that remain in range.
    pub fn resize(&mut self, num_bits: usize) {
        self.words
            .resize_with(num_bits.div_ceil(WORD_BITS), || AtomicU64::new(0));
        if num_bits < self.num_bits {
            let last = num_bits / WORD_BITS;
            if let Some(word) = self.words.get_mut(last) {
                *word.get_mut() &= (1u64 << (num_bits % WORD_BITS)) - 1;
            }
        }
        self.num_bits = num_bits;
    }

    /// Set bit `idx`. Safe to call from many threads at once.
    pub fn set(&self, idx: usize) {
        debug_assert!(idx < self.num_bits);
        self.words[idx / WORD_BITS].fetch_or(1 << (idx % WORD_BITS), Ordering::Relaxed);
    }

    pub fn test(&self, idx: usize) -> bool {
        debug_assert!(idx < self.num_bits);
        self.words[idx / WORD_BITS].load(Ordering::Relaxed) & (1 << (idx % WORD_BITS)) != 0
    }

    /// Clear every bit.
    pub fn reset(&mut self) {
        for word in &mut self.words {
            *word.get_mut() = 0;
        }
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// Positions of all set bits, ascending.
    pub fn offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.count());
        for (wi, word) in self.words.iter().enumerate() {
            let mut bits = word.load(Ordering::Relaxed);
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                offsets.push((wi * WORD_BITS + bit) as u32);
                bits &= bits - 1;
            }
        }
        offsets
    }

    /// Snapshot of the raw words, for the dense wire encoding.
    pub fn words(&self) -> Vec<u64> {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect()
    }

    /// OR-merge raw words of a same-capacity bitset into this one.
    pub fn union_words(&mut self, words: &[u64]) {
        assert!(words.len() <= self.words.len());
        for (mine, theirs) in self.words.iter_mut().zip(words) {
            *mine.get_mut() |= theirs;
        }
    }

    /// OR-merge another bitset into this one.
    pub fn union(&mut self, other: &DynamicBitset) {
        assert_eq!(self.num_bits, other.num_bits);
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine.get_mut() |= theirs.load(Ordering::Relaxed);
        }
    }
}

const EMPTY: u8 = 0;
const ALLOCATING: u8 = 1;
const READY: u8 = 2;

/// A per-peer bitset that is only allocated once somebody actually needs it.
///
/// Pre-allocating one global-sized bitset per peer costs
/// `num_hosts * num_global_nodes / 8` bytes per host, which does not fit in
/// memory on large graphs, so allocation is deferred until the first edge
/// toward that peer shows up. A tri-state indicator gates the allocation:
/// 0 = not allocated, 1 = allocating, 2 = ready. Exactly one thread wins the
/// CAS from 0 to 1 and allocates; everyone else spins until it publishes 2.
#[derive(Debug, Default)]
pub struct LazyBitset {
    status: AtomicU8,
    bits: OnceLock<DynamicBitset>,
}

impl LazyBitset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bit `idx`, allocating a zeroed `num_bits`-sized bitset first if
    /// no thread has done so yet.
    pub fn set(&self, idx: usize, num_bits: usize) {
        if self.status.load(Ordering::Acquire) != READY {
            if self
                .status
                .compare_exchange(EMPTY, ALLOCATING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let won = self.bits.set(DynamicBitset::new(num_bits)).is_ok();
                debug_assert!(won);
                self.status.store(READY, Ordering::Release);
            } else {
                while self.status.load(Ordering::Acquire) != READY {
                    std::hint::spin_loop();
                }
            }
        }
        // indicator reads 2, so the slot is populated
        self.bits.get().expect("bitset published").set(idx);
    }

    /// The bitset, if any thread allocated it.
    pub fn get(&self) -> Option<&DynamicBitset> {
        (self.status.load(Ordering::Acquire) == READY).then(|| self.bits.get()).flatten()
    }

    /// Reclaim the bitset, leaving the slot empty.
    pub fn take(&mut self) -> Option<DynamicBitset> {
        self.bits.take()
    }
}
