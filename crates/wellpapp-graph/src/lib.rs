//! The tag/post graph (§3, §4.3, §4.4): entities, post↔tag edges,
//! post-post relations, and the implication fixed-point engine, threaded
//! through a single `Store` value per §5/§9's design note.

pub mod entities;
pub mod hole_list;
pub mod store;

pub use entities::{ImplicationRule, Post, Tag, TagAlias, User};
pub use hole_list::HoleList;
pub use store::Store;
