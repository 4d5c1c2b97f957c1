//! `ArenaOffset` (§4.1.1 REDESIGN FLAG): a checked integer handle into the
//! arena's byte-addressed mapped region, replacing the original's raw
//! pointer. Stable across process restarts because it is relative to the
//! arena's logical base, not a process address.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaOffset(u64);

impl ArenaOffset {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn segment_index(self, segment_size: u64) -> u32 {
        (self.0 / segment_size) as u32
    }

    #[must_use]
    pub const fn in_segment_offset(self, segment_size: u64) -> usize {
        (self.0 % segment_size) as usize
    }
}

impl fmt::Display for ArenaOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_segment_and_local_offset() {
        let off = ArenaOffset::new(4 * (4 << 20) + 100);
        assert_eq!(off.segment_index(4 << 20), 4);
        assert_eq!(off.in_segment_offset(4 << 20), 100);
    }
}
