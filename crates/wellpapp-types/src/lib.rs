//! Core value types shared across the workspace: content hashes, GUIDs,
//! the fixed enum tables, and tag-name canonicalisation.

pub mod enums;
pub mod guid;
pub mod hash;
pub mod normalize;

pub use enums::{Capability, FileType, OrderKey, Rating, TagType, Truth};
pub use guid::{Guid, GuidGenerator, GuidType};
pub use hash::ContentHash;
pub use normalize::{fuzz_key, fuzz_normalize, nfc_compose};
