//! The fixed enum tables from §3/§3.1. `TagType` and `Rating` have
//! configurable display-name labels (bound positionally by the `tagtypes=`
//! and `ratings=` configuration keys); their ordinal meaning is fixed here.
//! `FileType` has no configurable labels, matching the original's
//! compiled-in `filetype_names[]`.

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum TagType {
    Unspecified = 0,
    InImage = 1,
    Artist = 2,
    Character = 3,
    Copyright = 4,
    Meta = 5,
    Ambiguous = 6,
}

impl TagType {
    pub const ALL: [Self; 7] = [
        Self::Unspecified,
        Self::InImage,
        Self::Artist,
        Self::Character,
        Self::Copyright,
        Self::Meta,
        Self::Ambiguous,
    ];

    #[must_use]
    pub const fn from_ordinal(ord: u16) -> Option<Self> {
        match ord {
            0 => Some(Self::Unspecified),
            1 => Some(Self::InImage),
            2 => Some(Self::Artist),
            3 => Some(Self::Character),
            4 => Some(Self::Copyright),
            5 => Some(Self::Meta),
            6 => Some(Self::Ambiguous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Rating {
    Unspecified = 0,
    Safe = 1,
    Questionable = 2,
    Explicit = 3,
}

impl Rating {
    pub const ALL: [Self; 4] = [Self::Unspecified, Self::Safe, Self::Questionable, Self::Explicit];

    #[must_use]
    pub const fn from_ordinal(ord: u16) -> Option<Self> {
        match ord {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Safe),
            2 => Some(Self::Questionable),
            3 => Some(Self::Explicit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum FileType {
    Jpeg = 0,
    Gif = 1,
    Png = 2,
    Bmp = 3,
    Flash = 4,
}

impl FileType {
    pub const NAMES: [&'static str; 5] = ["jpeg", "gif", "png", "bmp", "flash"];

    #[must_use]
    pub const fn from_ordinal(ord: u16) -> Option<Self> {
        match ord {
            0 => Some(Self::Jpeg),
            1 => Some(Self::Gif),
            2 => Some(Self::Png),
            3 => Some(Self::Bmp),
            4 => Some(Self::Flash),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

/// Weak-qualifier discipline for tag lookups (§4.3, §4.5): `T_NO` means
/// "strong only", `T_YES` means "weak only", `T_DONTCARE` means either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    No,
    Yes,
    DontCare,
}

impl std::ops::Not for Truth {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::No => Self::Yes,
            Self::Yes => Self::No,
            Self::DontCare => Self::DontCare,
        }
    }
}

/// The two orderable fields (§4.5): `date` keys on `created`, `score` keys
/// on `score`, each independently negatable for descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    Date,
    Score,
}

bitflags! {
    /// A user's capability bitmask (§3). The spec does not enumerate exact
    /// bits; this is an implementation decision recorded in DESIGN.md.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u32 {
        const VIEW    = 1 << 0;
        const UPLOAD  = 1 << 1;
        const TAG     = 1 << 2;
        const ALIAS   = 1 << 3;
        const IMPLY   = 1 << 4;
        const DELETE  = 1 << 5;
        const ADMIN   = 1 << 6;
    }
}

impl Capability {
    /// The default capability set for the anonymous user (§3): can view and
    /// search but not mutate anything.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self::VIEW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_type_ordinal_round_trips() {
        for t in TagType::ALL {
            assert_eq!(TagType::from_ordinal(t as u16), Some(t));
        }
        assert_eq!(TagType::from_ordinal(99), None);
    }

    #[test]
    fn truth_negation_is_involutive() {
        assert_eq!(!!Truth::Yes, Truth::Yes);
        assert_eq!(!Truth::DontCare, Truth::DontCare);
    }

    #[test]
    fn anonymous_capability_cannot_mutate() {
        let anon = Capability::anonymous();
        assert!(anon.contains(Capability::VIEW));
        assert!(!anon.contains(Capability::UPLOAD));
    }
}
