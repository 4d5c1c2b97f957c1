//! The graph's entity types (§3): posts, tags, tag aliases, implication
//! edges, and users. These are plain owned Rust structs held in the
//! `Store`'s `HashMap`s rather than serialized byte-for-byte into the
//! arena — §4.1.1's recorded simplification.

use std::collections::{HashMap, HashSet};

use wellpapp_types::{Capability, ContentHash, FileType, Guid, Rating, TagType};

use crate::hole_list::HoleList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplicationRule {
    pub to_tag: Guid,
    pub positive: bool,
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub hash: ContentHash,
    pub source: String,
    pub title: String,
    pub created: i64,
    pub modified: i64,
    pub user_id: u32,
    pub score: i16,
    pub width: u16,
    pub height: u16,
    pub file_type: FileType,
    pub rating: Rating,
    /// The materialised strong/weak edge set (§3): the union of explicitly
    /// requested tags and currently implied ones, mirrored symmetrically
    /// into `Tag::strong_posts`/`weak_posts`. This is what search queries
    /// and `has()` observe.
    pub tags_strong: HoleList<Guid>,
    pub tags_weak: HoleList<Guid>,
    /// Tags a `T`/`t` command directly requested, with the strength the
    /// user asked for. Consulted by the implication engine so that removing
    /// the rule that once implied a tag never clobbers a tag the user also
    /// explicitly added (DESIGN.md: "explicit vs. implied materialisation").
    pub explicit: HashMap<Guid, bool>,
    /// The implied-only subset of `tags_strong`/`tags_weak` — exactly the
    /// fixed point the implication engine maintains (§3, §4.4, §8).
    pub implied_strong_tags: HashSet<Guid>,
    pub implied_weak_tags: HashSet<Guid>,
    pub related: HoleList<ContentHash>,
}

impl Post {
    #[must_use]
    pub fn new(hash: ContentHash, source: String, title: String, created: i64, user_id: u32) -> Self {
        Self {
            hash,
            source,
            title,
            created,
            modified: created,
            user_id,
            score: 0,
            width: 0,
            height: 0,
            file_type: FileType::Jpeg,
            rating: Rating::Unspecified,
            tags_strong: HoleList::new(),
            tags_weak: HoleList::new(),
            explicit: HashMap::new(),
            implied_strong_tags: HashSet::new(),
            implied_weak_tags: HashSet::new(),
            related: HoleList::new(),
        }
    }

    /// A post's tags partition into strong and weak (§3 invariant): the tag
    /// is in at most one bag.
    #[must_use]
    pub fn materialized_strength(&self, tag: Guid) -> Option<bool> {
        if self.tags_strong.contains(|g| *g == tag) {
            Some(false)
        } else if self.tags_weak.contains(|g| *g == tag) {
            Some(true)
        } else {
            None
        }
    }

    /// All currently materialised tags, strong first then weak, as the
    /// implication engine's candidate-gathering step reads each round
    /// (§4.4 step 1 — cascading rounds must see tags implied by the
    /// previous round, not just the originally explicit ones).
    pub fn materialized_tags(&self) -> impl Iterator<Item = (Guid, bool)> + '_ {
        self.tags_strong
            .iter()
            .map(|&g| (g, false))
            .chain(self.tags_weak.iter().map(|&g| (g, true)))
    }
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub guid: Guid,
    pub name: String,
    pub display_name: String,
    pub tag_type: TagType,
    pub strong_posts: HoleList<ContentHash>,
    pub weak_posts: HoleList<ContentHash>,
    pub implications: Vec<ImplicationRule>,
}

impl Tag {
    #[must_use]
    pub fn new(guid: Guid, name: String, display_name: String, tag_type: TagType) -> Self {
        Self {
            guid,
            name,
            display_name,
            tag_type,
            strong_posts: HoleList::new(),
            weak_posts: HoleList::new(),
            implications: Vec::new(),
        }
    }

    #[must_use]
    pub fn post_count(&self) -> usize {
        self.strong_posts.of_posts() + self.weak_posts.of_posts()
    }
}

#[derive(Debug, Clone)]
pub struct TagAlias {
    pub name: String,
    pub target: Guid,
}

#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub password_hash: String,
    pub capabilities: Capability,
}

impl User {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            password_hash: String::new(),
            capabilities: Capability::anonymous(),
        }
    }
}
