//! The arena allocator proper (§4.1): a sequence of fixed-size mapped
//! segments, two-ended bump allocation within each (aligned objects grow
//! from the bottom, unaligned string bytes grow from the top), and the
//! integrity header gating warm-start vs. cold-rebuild.
//!
//! Per §4.1.1 this backs two concrete uses: interning repeated tag/post
//! string fields, and the per-connection scratch budget (`scratch.rs`).
//! The typed graph (posts, tags, edges) lives in ordinary `HashMap`/`Vec`
//! collections, not serialized into these bytes; see DESIGN.md.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use wellpapp_error::{Error, Result};

use crate::header::ArenaHeader;
use crate::offset::ArenaOffset;
use crate::segment::{Segment, SEGMENT_SIZE};

/// One segment's two-ended bump cursors: `bottom` grows upward for aligned
/// allocations, `top` grows downward for unaligned string bytes. They meet
/// when the segment is full.
struct Cursors {
    bottom: usize,
    top: usize,
}

impl Cursors {
    const fn fresh() -> Self {
        Self {
            bottom: 0,
            top: SEGMENT_SIZE,
        }
    }

    const fn remaining(&self) -> usize {
        self.top.saturating_sub(self.bottom)
    }
}

pub struct Arena {
    dir: PathBuf,
    base_addr: u64,
    segments: Vec<Segment>,
    cursors: Vec<Cursors>,
    /// String interning table, keyed by the bytes themselves so repeated
    /// identical strings share one allocation (§4.1.1).
    interned: HashMap<Vec<u8>, ArenaOffset>,
}

impl Arena {
    /// Creates a fresh arena (no segments yet beyond the first) at
    /// `base_addr`, backed by `<basedir>/mm_cache/`.
    pub fn create(basedir: &Path, base_addr: u64) -> Result<Self> {
        let dir = basedir.join("mm_cache");
        let first = Segment::open(&dir, 0, base_addr)?;
        Ok(Self {
            dir,
            base_addr,
            segments: vec![first],
            cursors: vec![Cursors::fresh()],
            interned: HashMap::new(),
        })
    }

    /// Reopens an existing arena's segment files without any integrity
    /// assumption about their contents — the caller is expected to have
    /// already validated the header via [`ArenaHeader::validate_against`]
    /// and to discard this arena for a fresh `create` + WAL replay on
    /// mismatch.
    pub fn reopen(basedir: &Path, base_addr: u64, segment_count: u32) -> Result<Self> {
        let dir = basedir.join("mm_cache");
        let mut segments = Vec::with_capacity(segment_count as usize);
        let mut cursors = Vec::with_capacity(segment_count as usize);
        for index in 0..segment_count {
            segments.push(Segment::open(&dir, index, base_addr)?);
            // A reopened arena is only ever used as a string-interning cache
            // that gets fully repopulated by WAL replay (§4.1.1's recorded
            // simplification), so cursors restart fresh rather than being
            // recovered from segment contents.
            cursors.push(Cursors::fresh());
        }
        Ok(Self {
            dir,
            base_addr,
            segments,
            cursors,
            interned: HashMap::new(),
        })
    }

    #[must_use]
    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    #[must_use]
    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    fn append_segment(&mut self) -> Result<()> {
        let index = self.segments.len() as u32;
        let seg = Segment::open(&self.dir, index, 0)?;
        info!(segment = index, "arena grew a new segment");
        self.segments.push(seg);
        self.cursors.push(Cursors::fresh());
        Ok(())
    }

    /// Bump-allocates `len` unaligned bytes from the top of the current (or
    /// a freshly appended) segment, returning the global offset of the
    /// first byte written.
    pub fn alloc_bytes(&mut self, data: &[u8]) -> Result<ArenaOffset> {
        if data.len() > SEGMENT_SIZE {
            return Err(Error::Oom);
        }
        let mut seg_idx = self.segments.len() - 1;
        if self.cursors[seg_idx].remaining() < data.len() {
            self.append_segment()?;
            seg_idx = self.segments.len() - 1;
        }
        let cursor = &mut self.cursors[seg_idx];
        cursor.top -= data.len();
        let local_off = cursor.top;
        self.segments[seg_idx].as_slice_mut()[local_off..local_off + data.len()]
            .copy_from_slice(data);
        Ok(ArenaOffset::new(seg_idx as u64 * SEGMENT_SIZE as u64 + local_off as u64))
    }

    /// Reads back `len` bytes previously written by `alloc_bytes`.
    #[must_use]
    pub fn read_bytes(&self, offset: ArenaOffset, len: usize) -> &[u8] {
        let seg_idx = offset.segment_index(SEGMENT_SIZE as u64) as usize;
        let local = offset.in_segment_offset(SEGMENT_SIZE as u64);
        &self.segments[seg_idx].as_slice()[local..local + len]
    }

    /// Interns `s`, returning the existing offset if this exact string was
    /// already allocated, else bump-allocating a fresh copy.
    pub fn intern(&mut self, s: &str) -> Result<ArenaOffset> {
        if let Some(&off) = self.interned.get(s.as_bytes()) {
            return Ok(off);
        }
        let off = self.alloc_bytes(s.as_bytes())?;
        self.interned.insert(s.as_bytes().to_vec(), off);
        Ok(off)
    }

    #[must_use]
    pub fn intern_lookup(&self, offset: ArenaOffset, len: usize) -> Option<String> {
        String::from_utf8(self.read_bytes(offset, len).to_vec()).ok()
    }

    pub fn flush(&self) -> Result<()> {
        for seg in &self.segments {
            seg.flush()?;
        }
        Ok(())
    }
}

/// Decides whether an on-disk arena header is still usable, per §4.1's
/// "any mismatch... forces a cold rebuild" rule. Returns `Ok(())` to warm
/// start, or `Err(reason)` naming the mismatched field to cold rebuild.
pub fn check_header(stored: Option<&ArenaHeader>, expected: &ArenaHeader) -> Result<(), &'static str> {
    match stored {
        None => Err("missing"),
        Some(stored) => {
            let result = stored.validate_against(expected);
            if let Err(reason) = result {
                warn!(reason, "arena header mismatch, forcing cold rebuild");
            }
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_string_twice_shares_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = Arena::create(dir.path(), 0).unwrap();
        let a = arena.intern("hello").unwrap();
        let b = arena.intern("hello").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_get_distinct_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = Arena::create(dir.path(), 0).unwrap();
        let a = arena.intern("hello").unwrap();
        let b = arena.intern("world").unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.intern_lookup(a, 5).unwrap(), "hello");
        assert_eq!(arena.intern_lookup(b, 5).unwrap(), "world");
    }

    #[test]
    fn allocations_larger_than_a_segment_grow_new_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = Arena::create(dir.path(), 0).unwrap();
        let big = vec![b'x'; SEGMENT_SIZE - 16];
        arena.alloc_bytes(&big).unwrap();
        // Second allocation of similar size should force a new segment.
        arena.alloc_bytes(&big).unwrap();
        assert_eq!(arena.segment_count(), 2);
    }

    #[test]
    fn header_mismatch_is_reported_by_field() {
        let expected = ArenaHeader::fresh(SEGMENT_SIZE as u32, 0x1000, [1u8; 16]);
        let mut stored = expected.clone();
        stored.clean = true;
        let mut mismatched_expected = expected;
        mismatched_expected.clean = true;
        mismatched_expected.config_md5 = [2u8; 16];
        assert_eq!(
            check_header(Some(&stored), &mismatched_expected),
            Err("config_md5")
        );
    }

    #[test]
    fn missing_header_is_a_cold_rebuild() {
        let expected = ArenaHeader::fresh(SEGMENT_SIZE as u32, 0x1000, [1u8; 16]);
        assert_eq!(check_header(None, &expected), Err("missing"));
    }
}
