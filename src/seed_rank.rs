//! Seed placement rank (SPR): groups seeds into the bracket tiers they are expected to finish in.

use {
    std::num::NonZeroU32,
    crate::prelude::*,
};

/// Number of consecutive seeds sharing each rank, starting at seed 1.
///
/// Seeds 1 to 4 each get their own rank, after that each tier doubles in size every two ranks,
/// matching the placements of a double elimination bracket.
const BANDS: [usize; 17] = [1, 1, 1, 1, 2, 2, 4, 4, 8, 8, 16, 16, 32, 32, 64, 64, 128];

/// The highest seed covered by [`BANDS`]. Larger seeds rank as themselves.
pub(crate) const MAX_RANKED_SEED: u32 = 384;

static TABLE: [u32; MAX_RANKED_SEED as usize + 1] = build_table();

const fn build_table() -> [u32; MAX_RANKED_SEED as usize + 1] {
    let mut table = [0; MAX_RANKED_SEED as usize + 1];
    let mut seed = 1;
    let mut rank = 0;
    while rank < BANDS.len() {
        let mut i = 0;
        while i < BANDS[rank] {
            table[seed] = rank as u32;
            seed += 1;
            i += 1;
        }
        rank += 1;
    }
    table
}

/// A competitor's 1-based seed within a phase. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub(crate) struct Seed(NonZeroU32);

impl Seed {
    pub(crate) fn new(seed: i64) -> Option<Self> {
        u32::try_from(seed).ok().and_then(NonZeroU32::new).map(Self)
    }

    pub(crate) fn get(self) -> u32 {
        self.0.get()
    }

    /// The seed placement rank of this seed.
    pub(crate) fn rank(self) -> u32 {
        TABLE.get(self.get() as usize).copied().unwrap_or(self.get())
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
