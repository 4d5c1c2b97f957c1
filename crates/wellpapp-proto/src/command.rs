//! Command parsing (§4.7): the first character of the first token selects
//! the top-level handler; sub-items within and after that token are parsed
//! by the same first-char-selects-handler convention recursively. The
//! concrete per-command grammar below is this implementation's resolution
//! of the spec's schematic description (§4.7 gives examples, not a full
//! grammar) — recorded in DESIGN.md.

use wellpapp_error::{Error, Result};
use wellpapp_search::{Ordering as SearchOrdering, ProjectFlags, SearchRequest, TagCriterion};
use wellpapp_types::{ContentHash, FileType, Guid, OrderKey, Rating, TagType, Truth};

use crate::tagref::TagRef;
use crate::tokenize::{rest_of_line, tokenize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    Add { tag: TagRef, weak: bool },
    Remove { tag: TagRef, weak_only: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUntagSpec {
    pub post: ContentHash,
    pub edits: Vec<TagEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPostSpec {
    pub hash: ContentHash,
    pub source: Option<String>,
    pub user_id: u32,
    pub score: i16,
    pub width: u16,
    pub height: u16,
    pub file_type: FileType,
    pub rating: Rating,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTagSpec {
    pub tag_type: TagType,
    pub name: String,
    /// An explicit GUID to restore rather than mint fresh. Unset on every
    /// live client command (clients never choose a tag's GUID); set only by
    /// the offline dump format, which must reproduce exactly the GUIDs
    /// every other dumped line references (aliases, implications, post
    /// tag-edits) rather than relying on the generator replaying in lockstep.
    pub guid: Option<Guid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAliasSpec {
    pub target: Guid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUserSpec {
    pub capabilities: u32,
    pub password_hash: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddSpec {
    Post(AddPostSpec),
    Tag(AddTagSpec),
    Alias(AddAliasSpec),
    User(AddUserSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyPostSpec {
    pub hash: ContentHash,
    pub score: Option<i16>,
    pub rating: Option<Rating>,
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub file_type: Option<FileType>,
    pub source: Option<String>,
}

impl ModifyPostSpec {
    fn for_hash(hash: ContentHash) -> Self {
        Self {
            hash,
            score: None,
            rating: None,
            width: None,
            height: None,
            file_type: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyTagSpec {
    pub guid: Guid,
    pub new_type: Option<TagType>,
    pub rename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifySpec {
    Post(ModifyPostSpec),
    Tag(ModifyTagSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSpec {
    Alias(String),
    Implication { from: Guid, to: Guid },
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub a: ContentHash,
    pub b: ContentHash,
    pub add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicationSpec {
    pub from: Guid,
    pub to: Guid,
    pub positive: bool,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTagSpec {
    pub guid: Guid,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSpec {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchSpec {
    Posts(SearchRequest),
    TagLookup(TagRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(SearchSpec),
    TagUntag(TagUntagSpec),
    Add(AddSpec),
    Modify(ModifySpec),
    Delete(DeleteSpec),
    Relation(RelationSpec),
    Implication(ImplicationSpec),
    Rename(RenameTagSpec),
    Noop,
    Quit,
    Auth(AuthSpec),
}

impl Command {
    /// Whether this command mutates the graph and must therefore be
    /// wrapped in a log transaction (§4.7: "all mutating commands are
    /// wrapped in a log transaction before dispatch").
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::Search(_) | Self::Noop | Self::Quit | Self::Auth(_))
    }
}

fn split_first_char(s: &str) -> Result<(char, &str)> {
    let mut chars = s.chars();
    let first = chars.next().ok_or_else(|| Error::Syntax(s.to_string()))?;
    Ok((first, chars.as_str()))
}

fn parse_hash(s: &str) -> Result<ContentHash> {
    s.parse().map_err(|_| Error::BadMd5(s.to_string()))
}

fn parse_guid(s: &str) -> Result<Guid> {
    s.parse()
}

/// Parses a full command line: NFC-composition happens upstream (§4.7),
/// this function only tokenises and dispatches.
pub fn parse_line(line: &str) -> Result<Command> {
    let tokens = tokenize(line)?;
    let first = *tokens.first().ok_or_else(|| Error::Syntax("empty line".into()))?;
    let (top, rest) = split_first_char(first)?;
    match top {
        'S' => parse_search(rest, &tokens),
        'T' => parse_tag_untag(rest, &tokens),
        'A' => parse_add(rest, &tokens),
        'M' => parse_modify(rest, &tokens),
        'D' => parse_delete(rest),
        'R' => parse_relation(rest, &tokens),
        'I' => parse_implication(rest, &tokens),
        'O' => parse_rename(rest, &tokens),
        'N' => Ok(Command::Noop),
        'Q' => Ok(Command::Quit),
        'a' => parse_auth(rest, &tokens),
        other => Err(Error::UnknownCommand(other.to_string())),
    }
}

// ---- search (§4.5, §4.7) -------------------------------------------------

fn parse_search(rest: &str, tokens: &[&str]) -> Result<Command> {
    let (mode, rest) = split_first_char(rest)?;
    match mode {
        'T' => Ok(Command::Search(SearchSpec::TagLookup(TagRef::parse(rest)?))),
        'P' => {
            let mut req = SearchRequest::new();
            let mut items: Vec<&str> = Vec::new();
            if !rest.is_empty() {
                items.push(rest);
            }
            items.extend(&tokens[1..]);
            for item in items {
                apply_search_item(&mut req, item)?;
            }
            if req.included.len() > wellpapp_search::MAX_INCLUDED_TAGS {
                return Err(Error::Overflow {
                    what: "included tags",
                    count: req.included.len(),
                    limit: wellpapp_search::MAX_INCLUDED_TAGS,
                });
            }
            if req.excluded.len() > wellpapp_search::MAX_EXCLUDED_TAGS {
                return Err(Error::Overflow {
                    what: "excluded tags",
                    count: req.excluded.len(),
                    limit: wellpapp_search::MAX_EXCLUDED_TAGS,
                });
            }
            if req.orderings.len() > wellpapp_search::MAX_ORDERINGS {
                return Err(Error::Overflow {
                    what: "orderings",
                    count: req.orderings.len(),
                    limit: wellpapp_search::MAX_ORDERINGS,
                });
            }
            Ok(Command::Search(SearchSpec::Posts(req)))
        }
        _ => Err(Error::Syntax(rest.to_string())),
    }
}

fn apply_search_item(req: &mut SearchRequest, item: &str) -> Result<()> {
    let (kind, rest) = split_first_char(item)?;
    match kind {
        'T' | 't' => {
            let (weak, tagref_str) = if let Some(stripped) = rest.strip_prefix('~') {
                (true, stripped)
            } else {
                (false, rest)
            };
            let guid = resolve_tagref_to_guid_placeholder(TagRef::parse(tagref_str)?);
            let crit = TagCriterion {
                guid,
                weak: if weak { Truth::Yes } else { Truth::DontCare },
            };
            if kind == 'T' {
                req.included.push(crit);
            } else {
                req.excluded.push(crit);
            }
            Ok(())
        }
        'O' => {
            let (descending, key_char) = if let Some(stripped) = rest.strip_prefix('-') {
                (true, stripped)
            } else {
                (false, rest)
            };
            let key = match key_char {
                "d" => OrderKey::Date,
                "s" => OrderKey::Score,
                other => return Err(Error::Syntax(format!("unknown ordering key: {other}"))),
            };
            req.orderings.push(SearchOrdering { key, descending });
            Ok(())
        }
        'F' => {
            let flag = match rest {
                "tagname" => ProjectFlags::TAG_NAMES,
                "tagguid" => ProjectFlags::TAG_GUIDS,
                "ext" => ProjectFlags::EXTENSION,
                "date" => ProjectFlags::DATE,
                "width" => ProjectFlags::WIDTH,
                "height" => ProjectFlags::HEIGHT,
                "score" => ProjectFlags::SCORE,
                other => return Err(Error::Syntax(format!("unknown field: {other}"))),
            };
            req.flags |= flag;
            Ok(())
        }
        'M' => {
            req.fingerprint = Some(parse_hash(rest)?);
            Ok(())
        }
        other => Err(Error::Syntax(format!("unknown search item: {other}"))),
    }
}

/// A `TagRef` by name cannot become a `Guid` without consulting the store,
/// which this crate does not depend on. Callers resolving a `Name` variant
/// at dispatch time are expected to look it up; this placeholder exists
/// only so `SearchRequest`'s criteria are always GUID-keyed internally.
/// `wellpapp-server`'s dispatcher performs the real by-name resolution
/// before handing criteria to the search engine — see `dispatch.rs`.
fn resolve_tagref_to_guid_placeholder(tagref: TagRef) -> Guid {
    match tagref {
        TagRef::Guid(guid) => guid,
        TagRef::Name(_) => Guid::from_bytes([0u8; 16]),
    }
}

// ---- tag/untag (§4.3, §4.7, §4.7.1) --------------------------------------

fn parse_tag_untag(rest: &str, tokens: &[&str]) -> Result<Command> {
    let (sel, post_str) = split_first_char(rest)?;
    if sel != 'P' {
        return Err(Error::Syntax(rest.to_string()));
    }
    let post = parse_hash(post_str)?;
    let mut edits = Vec::new();
    for &token in &tokens[1..] {
        let (kind, item_rest) = split_first_char(token)?;
        let (weak, tagref_str) = if let Some(stripped) = item_rest.strip_prefix('~') {
            (true, stripped)
        } else {
            (false, item_rest)
        };
        let tag = TagRef::parse(tagref_str)?;
        match kind {
            'T' => edits.push(TagEdit::Add { tag, weak }),
            't' => edits.push(TagEdit::Remove { tag, weak_only: weak }),
            other => return Err(Error::Syntax(format!("unknown tag/untag item: {other}"))),
        }
    }
    Ok(Command::TagUntag(TagUntagSpec { post, edits }))
}

// ---- add (§3, §4.7) ------------------------------------------------------

fn parse_add(rest: &str, tokens: &[&str]) -> Result<Command> {
    let (sel, arg) = split_first_char(rest)?;
    match sel {
        'P' => parse_add_post(arg, tokens),
        'T' => parse_add_tag(arg, tokens),
        'L' => parse_add_alias(arg, tokens),
        'U' => parse_add_user(arg, tokens),
        other => Err(Error::Syntax(format!("unknown add sub-entity: {other}"))),
    }
}

fn parse_add_post(hash_str: &str, tokens: &[&str]) -> Result<Command> {
    let hash = parse_hash(hash_str)?;
    let mut spec = AddPostSpec {
        hash,
        source: None,
        user_id: 0,
        score: 0,
        width: 0,
        height: 0,
        file_type: FileType::Jpeg,
        rating: Rating::Unspecified,
        title: String::new(),
    };
    let mut idx = 1;
    while idx < tokens.len() {
        let (kind, field_rest) = split_first_char(tokens[idx])?;
        match kind {
            'S' => spec.source = Some(field_rest.to_string()),
            'U' => spec.user_id = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?,
            'R' => spec.score = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?,
            'W' => spec.width = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?,
            'H' => spec.height = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?,
            'E' => {
                let ord: u16 = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?;
                spec.file_type = FileType::from_ordinal(ord).ok_or_else(|| Error::Syntax(tokens[idx].to_string()))?;
            }
            'G' => {
                let ord: u16 = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?;
                spec.rating = Rating::from_ordinal(ord).ok_or_else(|| Error::Syntax(tokens[idx].to_string()))?;
            }
            'N' => {
                let mut title = field_rest.to_string();
                let joined = rest_of_line(tokens, idx + 1);
                if !joined.is_empty() {
                    title.push(' ');
                    title.push_str(&joined);
                }
                spec.title = title;
                idx = tokens.len();
                continue;
            }
            other => return Err(Error::Syntax(format!("unknown post field: {other}"))),
        }
        idx += 1;
    }
    Ok(Command::Add(AddSpec::Post(spec)))
}

fn parse_add_tag(type_digit: &str, tokens: &[&str]) -> Result<Command> {
    let ord: u16 = type_digit.parse().map_err(|_| Error::Syntax(type_digit.to_string()))?;
    let tag_type = TagType::from_ordinal(ord).ok_or_else(|| Error::Syntax(type_digit.to_string()))?;
    let (guid, name_start) = match tokens.get(1) {
        Some(token) if token.starts_with('G') => (Some(parse_guid(&token[1..])?), 2),
        _ => (None, 1),
    };
    let name = rest_of_line(tokens, name_start);
    if name.is_empty() {
        return Err(Error::Syntax("missing tag name".into()));
    }
    Ok(Command::Add(AddSpec::Tag(AddTagSpec { tag_type, name, guid })))
}

fn parse_add_alias(guid_str: &str, tokens: &[&str]) -> Result<Command> {
    let target = parse_guid(guid_str)?;
    let name = rest_of_line(tokens, 1);
    if name.is_empty() {
        return Err(Error::Syntax("missing alias name".into()));
    }
    Ok(Command::Add(AddSpec::Alias(AddAliasSpec { target, name })))
}

fn parse_add_user(cap_str: &str, tokens: &[&str]) -> Result<Command> {
    let capabilities =
        u32::from_str_radix(cap_str, 16).map_err(|_| Error::Syntax(cap_str.to_string()))?;
    let password_hash = (*tokens.get(1).ok_or_else(|| Error::Syntax("missing password hash".into()))?).to_string();
    let name = rest_of_line(tokens, 2);
    if name.is_empty() {
        return Err(Error::Syntax("missing user name".into()));
    }
    Ok(Command::Add(AddSpec::User(AddUserSpec {
        capabilities,
        password_hash,
        name,
    })))
}

// ---- modify ---------------------------------------------------------------

fn parse_modify(rest: &str, tokens: &[&str]) -> Result<Command> {
    let (sel, arg) = split_first_char(rest)?;
    match sel {
        'P' => {
            let mut spec = ModifyPostSpec::for_hash(parse_hash(arg)?);
            for &token in &tokens[1..] {
                let (kind, field_rest) = split_first_char(token)?;
                match kind {
                    'R' => spec.score = Some(field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?),
                    'W' => spec.width = Some(field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?),
                    'H' => spec.height = Some(field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?),
                    'S' => spec.source = Some(field_rest.to_string()),
                    'E' => {
                        let ord: u16 = field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?;
                        spec.file_type = Some(FileType::from_ordinal(ord).ok_or_else(|| Error::Syntax(token.to_string()))?);
                    }
                    'G' => {
                        let ord: u16 = field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?;
                        spec.rating = Some(Rating::from_ordinal(ord).ok_or_else(|| Error::Syntax(token.to_string()))?);
                    }
                    other => return Err(Error::Syntax(format!("unknown modify field: {other}"))),
                }
            }
            Ok(Command::Modify(ModifySpec::Post(spec)))
        }
        'T' => {
            let guid = parse_guid(arg)?;
            let mut new_type = None;
            let mut rename = None;
            let mut idx = 1;
            while idx < tokens.len() {
                let (kind, field_rest) = split_first_char(tokens[idx])?;
                match kind {
                    'Y' => {
                        let ord: u16 = field_rest.parse().map_err(|_| Error::Syntax(tokens[idx].to_string()))?;
                        new_type = Some(TagType::from_ordinal(ord).ok_or_else(|| Error::Syntax(tokens[idx].to_string()))?);
                    }
                    'N' => {
                        rename = Some(rest_of_line(tokens, idx + 1));
                        idx = tokens.len();
                        continue;
                    }
                    other => return Err(Error::Syntax(format!("unknown tag-modify field: {other}"))),
                }
                idx += 1;
            }
            Ok(Command::Modify(ModifySpec::Tag(ModifyTagSpec { guid, new_type, rename })))
        }
        other => Err(Error::Syntax(format!("unknown modify sub-entity: {other}"))),
    }
}

// ---- delete (alias / implication-rule / user; posts and tags persist for
// the process lifetime per §3's lifecycle note, so they have no delete
// form) --------------------------------------------------------------------

fn parse_delete(rest: &str) -> Result<Command> {
    let (sel, arg) = split_first_char(rest)?;
    match sel {
        'L' => Ok(Command::Delete(DeleteSpec::Alias(arg.to_string()))),
        'U' => Ok(Command::Delete(DeleteSpec::User(arg.to_string()))),
        'I' => {
            let mut parts = arg.split(',');
            let from = parse_guid(parts.next().ok_or_else(|| Error::Syntax(arg.to_string()))?)?;
            let to = parse_guid(parts.next().ok_or_else(|| Error::Syntax(arg.to_string()))?)?;
            Ok(Command::Delete(DeleteSpec::Implication { from, to }))
        }
        other => Err(Error::Syntax(format!("unknown delete target: {other}"))),
    }
}

// ---- relations (§4.3, §4.7) -----------------------------------------------

fn parse_relation(rest: &str, tokens: &[&str]) -> Result<Command> {
    let (sel, first_hash) = split_first_char(rest)?;
    let add = match sel {
        'R' => true,
        'r' => false,
        other => return Err(Error::Syntax(other.to_string())),
    };
    let a = parse_hash(first_hash)?;
    let b = parse_hash(tokens.get(1).ok_or_else(|| Error::Syntax("missing second post".into()))?)?;
    Ok(Command::Relation(RelationSpec { a, b, add }))
}

// ---- implications (§4.4, §4.7) --------------------------------------------

fn parse_implication(rest: &str, tokens: &[&str]) -> Result<Command> {
    let from = parse_guid(rest)?;
    let second = tokens.get(1).ok_or_else(|| Error::Syntax("missing implication target".into()))?;
    let (sel, to_str) = split_first_char(second)?;
    if sel != 'I' {
        return Err(Error::Syntax((*second).to_string()));
    }
    let to = parse_guid(to_str)?;
    let mut positive = true;
    let mut priority = 0i32;
    for &token in &tokens[2..] {
        let (kind, field_rest) = split_first_char(token)?;
        match kind {
            'P' => priority = field_rest.parse().map_err(|_| Error::Syntax(token.to_string()))?,
            '+' => positive = true,
            '-' => positive = false,
            other => return Err(Error::Syntax(format!("unknown implication field: {other}"))),
        }
    }
    Ok(Command::Implication(ImplicationSpec {
        from,
        to,
        positive,
        priority,
    }))
}

// ---- rename (§4.7's "O — Ordering/rename") --------------------------------

fn parse_rename(rest: &str, tokens: &[&str]) -> Result<Command> {
    let guid = parse_guid(rest)?;
    let new_name = rest_of_line(tokens, 1);
    if new_name.is_empty() {
        return Err(Error::Syntax("missing new name".into()));
    }
    Ok(Command::Rename(RenameTagSpec { guid, new_name }))
}

// ---- auth (§4.7) -----------------------------------------------------------

fn parse_auth(rest: &str, tokens: &[&str]) -> Result<Command> {
    let username = rest.to_string();
    let password = (*tokens
        .get(1)
        .ok_or_else(|| Error::Syntax("missing password".into()))?)
    .to_string();
    Ok(Command::Auth(AuthSpec { username, password }))
}
