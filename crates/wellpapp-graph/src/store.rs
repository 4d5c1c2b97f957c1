//! The `Store` (§5, §9's "thread the global indices as an explicit value"
//! design note): the five associative indices plus the edge/relation
//! primitives and the implication engine, all behind one struct passed by
//! unique reference to command handlers. No interior mutability or locking
//! — the cooperative single-threaded server model makes it unnecessary.

use std::collections::HashMap;

use tracing::{debug, trace};
use wellpapp_error::{Error, Result};
use wellpapp_types::{fuzz_key, ContentHash, Guid, GuidGenerator, Truth};

use crate::entities::{ImplicationRule, Post, Tag, TagAlias, User};

pub struct Store {
    pub posts: HashMap<ContentHash, Post>,
    pub tags: HashMap<Guid, Tag>,
    /// Fuzz-normalised-name hash → tag GUID (§4.2).
    pub tag_names: HashMap<ContentHash, Guid>,
    /// Fuzz-normalised-name hash → alias target GUID; a second map in the
    /// same name-hash namespace as `tag_names` (§4.2).
    pub tag_aliases: HashMap<ContentHash, TagAlias>,
    /// Fuzz-normalised-name hash → user (§4.2).
    pub users: HashMap<ContentHash, User>,
    pub guids: GuidGenerator,
    pub server_guid: Guid,
}

impl Store {
    #[must_use]
    pub fn new(server_guid: Guid) -> Self {
        let mut users = HashMap::new();
        let anon = User::anonymous();
        users.insert(fuzz_key(&anon.name), anon);
        Self {
            posts: HashMap::new(),
            tags: HashMap::new(),
            tag_names: HashMap::new(),
            tag_aliases: HashMap::new(),
            users,
            guids: GuidGenerator::new(server_guid, (0, 0)),
            server_guid,
        }
    }

    // ---- entity lookups -------------------------------------------------

    pub fn post(&self, hash: ContentHash) -> Result<&Post> {
        self.posts
            .get(&hash)
            .ok_or_else(|| Error::NoSuchPost(hash.to_string()))
    }

    pub fn tag_by_guid(&self, guid: Guid) -> Result<&Tag> {
        self.tags
            .get(&guid)
            .ok_or_else(|| Error::NoSuchTag(guid.to_string()))
    }

    /// Resolves a tag by name, consulting the alias table if the name
    /// itself doesn't resolve directly (§4.2, §4.3's "lookup by name may
    /// consult aliases").
    pub fn resolve_tag_name(&self, name: &str) -> Result<Guid> {
        let key = fuzz_key(name);
        if let Some(&guid) = self.tag_names.get(&key) {
            return Ok(guid);
        }
        if let Some(alias) = self.tag_aliases.get(&key) {
            return Ok(alias.target);
        }
        Err(Error::NoSuchTag(name.to_string()))
    }

    // ---- entity creation -------------------------------------------------

    pub fn add_post(&mut self, post: Post) -> Result<()> {
        if self.posts.contains_key(&post.hash) {
            return Ok(());
        }
        self.posts.insert(post.hash, post);
        Ok(())
    }

    pub fn add_tag(&mut self, tag: Tag) -> Result<()> {
        let key = fuzz_key(&tag.name);
        if self.tags.contains_key(&tag.guid) || self.tag_names.contains_key(&key) {
            return Err(Error::Syntax(format!("tag already exists: {}", tag.name)));
        }
        self.tag_names.insert(key, tag.guid);
        self.tags.insert(tag.guid, tag);
        Ok(())
    }

    pub fn add_alias(&mut self, name: &str, target: Guid) -> Result<()> {
        if !self.tags.contains_key(&target) {
            return Err(Error::NoSuchTag(target.to_string()));
        }
        let key = fuzz_key(name);
        if self.tag_names.contains_key(&key) || self.tag_aliases.contains_key(&key) {
            return Err(Error::Syntax(format!("name already taken: {name}")));
        }
        self.tag_aliases.insert(
            key,
            TagAlias {
                name: name.to_string(),
                target,
            },
        );
        Ok(())
    }

    pub fn add_user(&mut self, user: User) -> Result<()> {
        let key = fuzz_key(&user.name);
        if self.users.contains_key(&key) {
            return Err(Error::Syntax(format!("user already exists: {}", user.name)));
        }
        self.users.insert(key, user);
        Ok(())
    }

    // ---- post<->tag edges (§4.3) ----------------------------------------

    /// The raw edge primitive: inserts into the first hole of the post's
    /// materialised tag bag and the tag's post-list (symmetric), or appends.
    /// A no-op if the edge already exists with the requested strength; an
    /// opposite-strength edge is removed first. Does not touch `explicit`
    /// or the implied-tag bookkeeping — callers decide that.
    fn raw_add(&mut self, post_hash: ContentHash, tag_guid: Guid, weak: bool) -> Result<()> {
        if let Some(existing) = self
            .posts
            .get(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?
            .materialized_strength(tag_guid)
        {
            if existing == weak {
                return Ok(());
            }
            self.raw_remove(post_hash, tag_guid)?;
        }

        let post = self
            .posts
            .get_mut(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?;
        let tag = self
            .tags
            .get_mut(&tag_guid)
            .ok_or_else(|| Error::NoSuchTag(tag_guid.to_string()))?;
        if weak {
            post.tags_weak.insert(tag_guid);
            tag.weak_posts.insert(post_hash);
        } else {
            post.tags_strong.insert(tag_guid);
            tag.strong_posts.insert(post_hash);
        }
        Ok(())
    }

    /// The raw removal primitive (§4.3): searches strong then weak, clears
    /// both endpoints. Fails if the edge is not present in either bag.
    fn raw_remove(&mut self, post_hash: ContentHash, tag_guid: Guid) -> Result<()> {
        let post = self
            .posts
            .get_mut(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?;
        let removed_weak = if post.tags_strong.remove_where(|g| *g == tag_guid) {
            false
        } else if post.tags_weak.remove_where(|g| *g == tag_guid) {
            true
        } else {
            return Err(Error::EdgeAbsent);
        };

        let tag = self
            .tags
            .get_mut(&tag_guid)
            .ok_or_else(|| Error::NoSuchTag(tag_guid.to_string()))?;
        if removed_weak {
            tag.weak_posts.remove_where(|p| *p == post_hash);
        } else {
            tag.strong_posts.remove_where(|p| *p == post_hash);
        }
        Ok(())
    }

    /// The live `T`/`t` command entry point for tagging: records the user's
    /// intent in `explicit`, applies the raw edge primitive, and recomputes
    /// implications for the post (§4.3, §4.4).
    pub fn tag_post(&mut self, post_hash: ContentHash, tag_guid: Guid, weak: bool) -> Result<()> {
        self.tag_by_guid(tag_guid)?;
        self.raw_add(post_hash, tag_guid, weak)?;
        self.posts
            .get_mut(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?
            .explicit
            .insert(tag_guid, weak);
        self.recompute_implications(post_hash)
    }

    /// The live `t` command entry point for untagging (§4.7.1): removes the
    /// edge via the raw primitive, drops the explicit-intent record, and
    /// recomputes implications (an implication rule may re-materialise the
    /// same tag if another explicit tag still implies it).
    pub fn untag_post(&mut self, post_hash: ContentHash, tag_guid: Guid) -> Result<()> {
        self.raw_remove(post_hash, tag_guid)?;
        self.posts
            .get_mut(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?
            .explicit
            .remove(&tag_guid);
        self.recompute_implications(post_hash)
    }

    #[must_use]
    pub fn has_tag(&self, post_hash: ContentHash, tag_guid: Guid, weak: Truth) -> bool {
        let Some(post) = self.posts.get(&post_hash) else {
            return false;
        };
        match weak {
            Truth::No => post.tags_strong.contains(|g| *g == tag_guid),
            Truth::Yes => post.tags_weak.contains(|g| *g == tag_guid),
            Truth::DontCare => post.materialized_strength(tag_guid).is_some(),
        }
    }

    // ---- post-post relations (§4.3) -------------------------------------

    pub fn rel_add(&mut self, a: ContentHash, b: ContentHash) -> Result<()> {
        let a_has_b = self.posts.get(&a).is_some_and(|p| p.related.contains(|h| *h == b));
        let b_has_a = self.posts.get(&b).is_some_and(|p| p.related.contains(|h| *h == a));
        if a_has_b || b_has_a {
            return Err(Error::GraphInvariant(
                "related_posts symmetry violated before rel_add".into(),
            ));
        }
        self.posts
            .get_mut(&a)
            .ok_or_else(|| Error::NoSuchPost(a.to_string()))?
            .related
            .insert(b);
        self.posts
            .get_mut(&b)
            .ok_or_else(|| Error::NoSuchPost(b.to_string()))?
            .related
            .insert(a);
        Ok(())
    }

    pub fn rel_remove(&mut self, a: ContentHash, b: ContentHash) -> Result<()> {
        let a_has_b = self
            .posts
            .get_mut(&a)
            .ok_or_else(|| Error::NoSuchPost(a.to_string()))?
            .related
            .remove_where(|h| *h == b);
        let b_has_a = self
            .posts
            .get_mut(&b)
            .ok_or_else(|| Error::NoSuchPost(b.to_string()))?
            .related
            .remove_where(|h| *h == a);
        if a_has_b != b_has_a {
            return Err(Error::GraphInvariant(
                "related_posts symmetry violated during rel_remove".into(),
            ));
        }
        if !a_has_b {
            return Err(Error::EdgeAbsent);
        }
        Ok(())
    }

    // ---- implications (§4.4) --------------------------------------------

    pub fn add_implication(&mut self, from: Guid, to_tag: Guid, positive: bool, priority: i32) -> Result<()> {
        self.tag_by_guid(to_tag)?;
        let tag = self
            .tags
            .get_mut(&from)
            .ok_or_else(|| Error::NoSuchTag(from.to_string()))?;
        if tag.implications.iter().any(|r| r.to_tag == to_tag) {
            return Ok(());
        }
        tag.implications.push(ImplicationRule {
            to_tag,
            positive,
            priority,
        });
        self.recompute_rule_subjects(from)
    }

    pub fn remove_implication(&mut self, from: Guid, to_tag: Guid) -> Result<()> {
        let tag = self
            .tags
            .get_mut(&from)
            .ok_or_else(|| Error::NoSuchTag(from.to_string()))?;
        let before = tag.implications.len();
        tag.implications.retain(|r| r.to_tag != to_tag);
        if tag.implications.len() == before {
            return Err(Error::EdgeAbsent);
        }
        self.recompute_rule_subjects(from)
    }

    /// Recomputes every post currently carrying `from_tag`, strong and weak
    /// (§4.4: "adding/removing a rule recomputes all posts in the rule's
    /// source-tag post-lists").
    fn recompute_rule_subjects(&mut self, from_tag: Guid) -> Result<()> {
        let tag = self.tag_by_guid(from_tag)?;
        let subjects: Vec<ContentHash> = tag
            .strong_posts
            .iter()
            .chain(tag.weak_posts.iter())
            .copied()
            .collect();
        for post_hash in subjects {
            self.recompute_implications(post_hash)?;
        }
        Ok(())
    }

    /// The implication fixed-point engine (§4.4). Recomputes from scratch
    /// each round (§4.4's resolved open question) until a round changes
    /// nothing.
    pub fn recompute_implications(&mut self, post_hash: ContentHash) -> Result<()> {
        let mut round = 0u32;
        loop {
            round += 1;
            let changed = self.recompute_round(post_hash)?;
            trace!(post = %post_hash, round, changed, "implication engine round");
            if !changed {
                break;
            }
        }
        debug!(post = %post_hash, rounds = round, "implication engine converged");
        Ok(())
    }

    fn recompute_round(&mut self, post_hash: ContentHash) -> Result<bool> {
        #[derive(Clone, Copy)]
        struct Candidate {
            target: Guid,
            positive: bool,
            priority: i32,
            source_weak: bool,
        }

        let post = self.post(post_hash)?;
        let mut candidates = Vec::new();
        for (source_guid, source_weak) in post.materialized_tags() {
            let Ok(source_tag) = self.tag_by_guid(source_guid) else {
                continue;
            };
            for rule in &source_tag.implications {
                candidates.push(Candidate {
                    target: rule.to_tag,
                    positive: rule.positive,
                    priority: rule.priority,
                    source_weak,
                });
            }
        }

        // Descending priority; strong (source_weak=false) before weak at
        // equal priority (§4.4 step 2).
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.source_weak.cmp(&b.source_weak)));

        let mut seen = std::collections::HashSet::new();
        let mut new_implied_strong = std::collections::HashSet::new();
        let mut new_implied_weak = std::collections::HashSet::new();
        for cand in candidates {
            if !seen.insert(cand.target) {
                continue;
            }
            if cand.positive {
                if cand.source_weak {
                    new_implied_weak.insert(cand.target);
                } else {
                    new_implied_strong.insert(cand.target);
                }
            }
            // Negative candidates are absorbed: the target is suppressed,
            // simply by having claimed `seen` so no later, lower-priority
            // candidate for the same target can win.
        }

        let post = self.post(post_hash)?;
        let to_add_strong: Vec<Guid> = new_implied_strong
            .difference(&post.implied_strong_tags)
            .copied()
            .collect();
        let to_add_weak: Vec<Guid> = new_implied_weak
            .difference(&post.implied_weak_tags)
            .copied()
            .collect();
        let to_remove_strong: Vec<Guid> = post
            .implied_strong_tags
            .difference(&new_implied_strong)
            .copied()
            .collect();
        let to_remove_weak: Vec<Guid> = post
            .implied_weak_tags
            .difference(&new_implied_weak)
            .copied()
            .collect();

        let changed = !to_add_strong.is_empty()
            || !to_add_weak.is_empty()
            || !to_remove_strong.is_empty()
            || !to_remove_weak.is_empty();

        for guid in &to_add_strong {
            self.raw_add(post_hash, *guid, false)?;
        }
        for guid in &to_add_weak {
            self.raw_add(post_hash, *guid, true)?;
        }
        for guid in &to_remove_strong {
            self.remove_stale_implied(post_hash, *guid, false)?;
        }
        for guid in &to_remove_weak {
            self.remove_stale_implied(post_hash, *guid, true)?;
        }

        let post = self
            .posts
            .get_mut(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?;
        post.implied_strong_tags = new_implied_strong;
        post.implied_weak_tags = new_implied_weak;

        Ok(changed)
    }

    /// Drops a tag that's no longer implied, unless the user also
    /// explicitly requested it — in which case the materialised edge stays
    /// and only the implied-bookkeeping entry is cleared.
    fn remove_stale_implied(&mut self, post_hash: ContentHash, tag_guid: Guid, weak: bool) -> Result<()> {
        let post = self
            .posts
            .get(&post_hash)
            .ok_or_else(|| Error::NoSuchPost(post_hash.to_string()))?;
        let still_explicit = post.explicit.get(&tag_guid).is_some_and(|&w| w == weak);
        if !still_explicit {
            self.raw_remove(post_hash, tag_guid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellpapp_types::{FileType, Rating, TagType};

    fn server_guid() -> Guid {
        Guid::new_server_guid([0xaa; 7])
    }

    fn store() -> Store {
        Store::new(server_guid())
    }

    fn mk_post(store: &mut Store, byte: u8) -> ContentHash {
        let hash = ContentHash::from_bytes([byte; 16]);
        store
            .add_post(Post::new(hash, String::new(), String::new(), 1000, 0))
            .unwrap();
        hash
    }

    fn mk_tag(store: &mut Store, name: &str) -> Guid {
        let guid = store.guids.next_tag_guid();
        store
            .add_tag(Tag::new(guid, name.to_string(), name.to_string(), TagType::Unspecified))
            .unwrap();
        guid
    }

    #[test]
    fn symmetric_edge_invariant_holds_after_add_and_remove() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let tag = mk_tag(&mut store, "cat");
        store.tag_post(post, tag, false).unwrap();
        assert!(store.posts[&post].tags_strong.contains(|g| *g == tag));
        assert!(store.tags[&tag].strong_posts.contains(|h| *h == post));

        store.untag_post(post, tag).unwrap();
        assert!(!store.posts[&post].tags_strong.contains(|g| *g == tag));
        assert!(!store.tags[&tag].strong_posts.contains(|h| *h == post));
    }

    #[test]
    fn adding_same_tag_twice_is_a_no_op() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let tag = mk_tag(&mut store, "cat");
        store.tag_post(post, tag, false).unwrap();
        store.tag_post(post, tag, false).unwrap();
        assert_eq!(store.posts[&post].tags_strong.of_posts(), 1);
    }

    #[test]
    fn strong_add_after_weak_moves_the_post_out_of_weak() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let tag = mk_tag(&mut store, "cat");
        store.tag_post(post, tag, true).unwrap();
        store.tag_post(post, tag, false).unwrap();
        assert!(store.posts[&post].tags_strong.contains(|g| *g == tag));
        assert!(!store.posts[&post].tags_weak.contains(|g| *g == tag));
        assert!(store.has_tag(post, tag, Truth::No));
        assert!(!store.has_tag(post, tag, Truth::Yes));
    }

    #[test]
    fn untagging_absent_tag_is_an_error() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let tag = mk_tag(&mut store, "cat");
        assert!(store.untag_post(post, tag).is_err());
    }

    #[test]
    fn related_posts_are_symmetric() {
        let mut store = store();
        let a = mk_post(&mut store, 1);
        let b = mk_post(&mut store, 2);
        store.rel_add(a, b).unwrap();
        assert!(store.posts[&a].related.contains(|h| *h == b));
        assert!(store.posts[&b].related.contains(|h| *h == a));
        store.rel_remove(a, b).unwrap();
        assert!(!store.posts[&a].related.contains(|h| *h == b));
        assert!(!store.posts[&b].related.contains(|h| *h == a));
    }

    #[test]
    fn implication_cascades_and_unwinds() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let x = mk_tag(&mut store, "x");
        let y = mk_tag(&mut store, "y");
        let z = mk_tag(&mut store, "z");
        store.add_implication(x, y, true, 10).unwrap();
        store.add_implication(y, z, true, 5).unwrap();

        store.tag_post(post, x, false).unwrap();
        assert!(store.has_tag(post, y, Truth::DontCare));
        assert!(store.has_tag(post, z, Truth::DontCare));

        store.untag_post(post, x).unwrap();
        assert!(!store.has_tag(post, y, Truth::DontCare));
        assert!(!store.has_tag(post, z, Truth::DontCare));
    }

    #[test]
    fn negative_implication_suppresses_target() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let x = mk_tag(&mut store, "x");
        let y = mk_tag(&mut store, "y");
        store.add_implication(x, y, false, 10).unwrap();
        store.tag_post(post, x, false).unwrap();
        assert!(!store.has_tag(post, y, Truth::DontCare));
    }

    #[test]
    fn higher_priority_wins_over_lower() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let x = mk_tag(&mut store, "x");
        let w = mk_tag(&mut store, "w");
        let y = mk_tag(&mut store, "y");
        store.add_implication(x, y, true, 1).unwrap();
        store.add_implication(w, y, false, 100).unwrap();
        store.tag_post(post, x, false).unwrap();
        store.tag_post(post, w, false).unwrap();
        assert!(!store.has_tag(post, y, Truth::DontCare));
    }

    #[test]
    fn explicit_tag_survives_rule_removal() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let x = mk_tag(&mut store, "x");
        let y = mk_tag(&mut store, "y");
        store.add_implication(x, y, true, 10).unwrap();
        store.tag_post(post, x, false).unwrap();
        store.tag_post(post, y, false).unwrap();
        store.remove_implication(x, y).unwrap();
        assert!(store.has_tag(post, y, Truth::DontCare));
    }

    #[test]
    fn rating_and_filetype_defaults_are_unspecified_and_jpeg() {
        let mut store = store();
        let post = mk_post(&mut store, 1);
        let post = store.post(post).unwrap();
        assert_eq!(post.rating, Rating::Unspecified);
        assert_eq!(post.file_type, FileType::Jpeg);
    }
}
