//! Search execution (§4.5): point lookup, smallest-tag-first seeding,
//! intersection, exclusion, lexicographic stable ordering.

use std::collections::HashSet;

use wellpapp_error::{Error, Result};
use wellpapp_types::{ContentHash, OrderKey};
use wellpapp_graph::Store;

use crate::request::{SearchRequest, TagCriterion};

/// Result buffers grow by doubling from an initial capacity of 64 (§4.5).
const INITIAL_CAPACITY: usize = 64;

pub fn execute(store: &Store, req: &SearchRequest) -> Result<Vec<ContentHash>> {
    if let Some(fingerprint) = req.fingerprint {
        if !req.included.is_empty() || !req.excluded.is_empty() {
            return Err(Error::Syntax(
                "fingerprint search cannot be combined with tag criteria".into(),
            ));
        }
        return Ok(if store.posts.contains_key(&fingerprint) {
            vec![fingerprint]
        } else {
            Vec::new()
        });
    }

    if req.included.is_empty() {
        return Err(Error::Syntax("search requires at least one included tag".into()));
    }

    let mut included = req.included.clone();
    included.sort_by_key(|c| tag_post_count(store, c));

    let first = included[0];
    let mut results = seed(store, first);
    for crit in &included[1..] {
        results.retain(|&post| store.has_tag(post, crit.guid, crit.weak));
    }
    for crit in &req.excluded {
        results.retain(|&post| !store.has_tag(post, crit.guid, crit.weak));
    }

    sort_results(store, &mut results, &req.orderings);
    Ok(results)
}

fn tag_post_count(store: &Store, crit: &TagCriterion) -> usize {
    store.tags.get(&crit.guid).map_or(0, wellpapp_graph::Tag::post_count)
}

/// Full scan over the seeding tag's chained post-lists, immediately
/// filtered by its own weak discipline (§4.5 steps 2-3).
fn seed(store: &Store, crit: TagCriterion) -> Vec<ContentHash> {
    let mut out = Vec::with_capacity(INITIAL_CAPACITY);
    let Some(tag) = store.tags.get(&crit.guid) else {
        return out;
    };
    let mut seen = HashSet::new();
    for &post in tag.strong_posts.iter().chain(tag.weak_posts.iter()) {
        if seen.insert(post) && store.has_tag(post, crit.guid, crit.weak) {
            out.push(post);
        }
    }
    out
}

fn sort_results(store: &Store, results: &mut [ContentHash], orderings: &[crate::request::Ordering]) {
    results.sort_by(|&a, &b| {
        for ord in orderings {
            let (pa, pb) = match (store.posts.get(&a), store.posts.get(&b)) {
                (Some(pa), Some(pb)) => (pa, pb),
                _ => continue,
            };
            let cmp = match ord.key {
                OrderKey::Date => pa.created.cmp(&pb.created),
                OrderKey::Score => pa.score.cmp(&pb.score),
            };
            let cmp = if ord.descending { cmp.reverse() } else { cmp };
            if cmp != std::cmp::Ordering::Equal {
                return cmp;
            }
        }
        std::cmp::Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Ordering, ProjectFlags};
    use wellpapp_graph::{Post, Tag};
    use wellpapp_types::{Guid, TagType, Truth};

    fn server_guid() -> Guid {
        Guid::new_server_guid([1; 7])
    }

    fn mk_post(store: &mut Store, byte: u8, score: i16, created: i64) -> ContentHash {
        let hash = ContentHash::from_bytes([byte; 16]);
        let mut post = Post::new(hash, String::new(), String::new(), created, 0);
        post.score = score;
        store.add_post(post).unwrap();
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
    fn tag_two_posts_and_search_finds_both() {
        let mut store = Store::new(server_guid());
        let cat = mk_tag(&mut store, "cat");
        let a = mk_post(&mut store, 1, 0, 1);
        let b = mk_post(&mut store, 2, 0, 2);
        store.tag_post(a, cat, true).unwrap();
        store.tag_post(b, cat, false).unwrap();

        let req = SearchRequest {
            included: vec![TagCriterion {
                guid: cat,
                weak: Truth::DontCare,
            }],
            flags: ProjectFlags::TAG_NAMES,
            ..SearchRequest::new()
        };
        let mut results = execute(&store, &req).unwrap();
        results.sort();
        let mut expect = vec![a, b];
        expect.sort();
        assert_eq!(results, expect);
    }

    #[test]
    fn strong_wins_over_weak_in_strong_only_query() {
        let mut store = Store::new(server_guid());
        let x = mk_tag(&mut store, "x");
        let post = mk_post(&mut store, 1, 0, 1);
        store.tag_post(post, x, true).unwrap();
        store.tag_post(post, x, false).unwrap();

        let strong_only = SearchRequest {
            included: vec![TagCriterion { guid: x, weak: Truth::No }],
            ..SearchRequest::new()
        };
        assert_eq!(execute(&store, &strong_only).unwrap(), vec![post]);

        let weak_only = SearchRequest {
            included: vec![TagCriterion { guid: x, weak: Truth::Yes }],
            ..SearchRequest::new()
        };
        assert!(execute(&store, &weak_only).unwrap().is_empty());
    }

    #[test]
    fn exclusion_filters_out_matching_posts() {
        let mut store = Store::new(server_guid());
        let x = mk_tag(&mut store, "x");
        let y = mk_tag(&mut store, "y");
        let a = mk_post(&mut store, 1, 0, 1);
        let b = mk_post(&mut store, 2, 0, 2);
        let c = mk_post(&mut store, 3, 0, 3);
        store.tag_post(a, x, false).unwrap();
        store.tag_post(a, y, false).unwrap();
        store.tag_post(b, x, false).unwrap();
        store.tag_post(c, y, false).unwrap();

        let req = SearchRequest {
            included: vec![TagCriterion { guid: x, weak: Truth::DontCare }],
            excluded: vec![TagCriterion { guid: y, weak: Truth::DontCare }],
            ..SearchRequest::new()
        };
        assert_eq!(execute(&store, &req).unwrap(), vec![b]);
    }

    #[test]
    fn ordering_by_score_ascending_and_descending() {
        let mut store = Store::new(server_guid());
        let tag = mk_tag(&mut store, "tag");
        let a = mk_post(&mut store, 1, 5, 1);
        let b = mk_post(&mut store, 2, 3, 2);
        let c = mk_post(&mut store, 3, 9, 3);
        for post in [a, b, c] {
            store.tag_post(post, tag, false).unwrap();
        }

        let ascending = SearchRequest {
            included: vec![TagCriterion { guid: tag, weak: Truth::DontCare }],
            orderings: vec![Ordering {
                key: OrderKey::Score,
                descending: false,
            }],
            ..SearchRequest::new()
        };
        assert_eq!(execute(&store, &ascending).unwrap(), vec![b, a, c]);

        let descending = SearchRequest {
            included: vec![TagCriterion { guid: tag, weak: Truth::DontCare }],
            orderings: vec![Ordering {
                key: OrderKey::Score,
                descending: true,
            }],
            ..SearchRequest::new()
        };
        assert_eq!(execute(&store, &descending).unwrap(), vec![c, a, b]);
    }

    #[test]
    fn fingerprint_mixed_with_tags_is_a_user_error() {
        let mut store = Store::new(server_guid());
        let tag = mk_tag(&mut store, "x");
        let post = mk_post(&mut store, 1, 0, 1);
        let req = SearchRequest {
            included: vec![TagCriterion { guid: tag, weak: Truth::DontCare }],
            fingerprint: Some(post),
            ..SearchRequest::new()
        };
        assert!(execute(&store, &req).is_err());
    }

    #[test]
    fn fingerprint_only_is_a_point_lookup() {
        let mut store = Store::new(server_guid());
        let post = mk_post(&mut store, 1, 0, 1);
        let req = SearchRequest {
            fingerprint: Some(post),
            ..SearchRequest::new()
        };
        assert_eq!(execute(&store, &req).unwrap(), vec![post]);

        let missing = SearchRequest {
            fingerprint: Some(ContentHash::from_bytes([0xff; 16])),
            ..SearchRequest::new()
        };
        assert!(execute(&store, &missing).unwrap().is_empty());
    }
}
