//! The search request shape (§4.5): included/excluded tag criteria (each
//! optionally weak-qualified), an ordering list, a field-projection flag
//! set, and an optional point-lookup fingerprint.

use bitflags::bitflags;
use wellpapp_types::{ContentHash, Guid, OrderKey, Truth};

pub const MAX_INCLUDED_TAGS: usize = 16;
pub const MAX_EXCLUDED_TAGS: usize = 16;
pub const MAX_ORDERINGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagCriterion {
    pub guid: Guid,
    /// `Truth::No` would mean strong-only but the wire protocol only ever
    /// spells the weak qualifier (`~`) explicitly; an unqualified tag means
    /// "either" (`DontCare`).
    pub weak: Truth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub key: OrderKey,
    /// Per §4.5.1: a bare ordering token sorts ascending, a negated one
    /// descending.
    pub descending: bool,
}

bitflags! {
    /// Which fields a search reply projects (§4.5, §6's `RP` line shape).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProjectFlags: u16 {
        const TAG_NAMES = 1 << 0;
        const TAG_GUIDS = 1 << 1;
        const EXTENSION = 1 << 2;
        const DATE      = 1 << 3;
        const WIDTH     = 1 << 4;
        const HEIGHT    = 1 << 5;
        const SCORE     = 1 << 6;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub included: Vec<TagCriterion>,
    pub excluded: Vec<TagCriterion>,
    pub orderings: Vec<Ordering>,
    pub flags: ProjectFlags,
    pub fingerprint: Option<ContentHash>,
}

impl SearchRequest {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: ProjectFlags::empty(),
            ..Default::default()
        }
    }
}
