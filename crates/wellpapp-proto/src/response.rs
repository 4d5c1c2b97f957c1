//! Reply formatting (§6): every reply is a `\n`-terminated line. Successful
//! mutations reply `OK`; failures reply `E<code> <message>`; a search reply
//! is one `RP` line per matching post, a tag lookup one `RG` line.

use wellpapp_error::Error;
use wellpapp_types::{ContentHash, Guid, TagType};

#[must_use]
pub fn ok_line() -> String {
    "OK\n".to_string()
}

/// A stable short code per error kind, so clients can branch without
/// string-matching the human-readable message.
fn error_code(err: &Error) -> &'static str {
    match err {
        Error::LineTooLong => "E_LINE",
        Error::ReadFailed(_) => "E_READ",
        Error::UnknownCommand(_) => "E_CMD",
        Error::Syntax(_) => "E_SYNTAX",
        Error::Overflow { .. } => "E_OVERFLOW",
        Error::Oom => "E_OOM",
        Error::BadAuth => "E_AUTH",
        Error::Utf8Invalid => "E_UTF8",
        Error::NoSuchTag(_) => "E_NOTAG",
        Error::NoSuchPost(_) => "E_NOPOST",
        Error::NoSuchUser(_) => "E_NOUSER",
        Error::EdgeAbsent => "E_EDGEABSENT",
        Error::EdgeAlreadyPresent => "E_EDGEPRESENT",
        Error::BadGuid(_) => "E_GUID",
        Error::BadMd5(_) => "E_MD5",
        Error::ArenaCorrupt(_) => "E_ARENA",
        Error::WalCorrupt(_) => "E_WAL",
        Error::GraphInvariant(_) => "E_GRAPH",
        Error::Io(_) => "E_IO",
        Error::Internal(_) => "E_INTERNAL",
    }
}

#[must_use]
pub fn error_line(err: &Error) -> String {
    format!("{} {}\n", error_code(err), err)
}

/// A protocol-level error reply that echoes the offending raw token rather
/// than a structured error (§4.8: per-token errors for recoverable syntax
/// problems the connection need not be dropped for).
#[must_use]
pub fn reject_token_line(token: &str) -> String {
    format!("RE {token}\n")
}

#[derive(Debug, Clone, Default)]
pub struct SearchReplyRow {
    pub hash: ContentHash,
    pub strong_tag_names: Vec<String>,
    pub weak_tag_names: Vec<String>,
    pub strong_tag_guids: Vec<Guid>,
    pub weak_tag_guids: Vec<Guid>,
    pub extension: Option<&'static str>,
    pub date: Option<u64>,
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub score: Option<i16>,
}

#[must_use]
pub fn search_reply_line(row: &SearchReplyRow) -> String {
    let mut line = format!("RP{}", row.hash);
    if !row.strong_tag_names.is_empty() {
        line.push_str(" N");
        line.push_str(&row.strong_tag_names.join(","));
    }
    if !row.weak_tag_names.is_empty() {
        line.push_str(" N~");
        line.push_str(&row.weak_tag_names.join(","));
    }
    if !row.strong_tag_guids.is_empty() {
        line.push_str(" G");
        let guids: Vec<String> = row.strong_tag_guids.iter().map(ToString::to_string).collect();
        line.push_str(&guids.join(","));
    }
    if !row.weak_tag_guids.is_empty() {
        line.push_str(" G~");
        let guids: Vec<String> = row.weak_tag_guids.iter().map(ToString::to_string).collect();
        line.push_str(&guids.join(","));
    }
    if let Some(ext) = row.extension {
        line.push_str(" E");
        line.push_str(ext);
    }
    if let Some(date) = row.date {
        line.push_str(&format!(" D{date}"));
    }
    if let Some(width) = row.width {
        line.push_str(&format!(" W{width}"));
    }
    if let Some(height) = row.height {
        line.push_str(&format!(" H{height}"));
    }
    if let Some(score) = row.score {
        line.push_str(&format!(" R{score}"));
    }
    line.push('\n');
    line
}

#[must_use]
pub fn tag_lookup_reply_line(guid: &Guid, name: &str, tag_type: TagType, post_count: usize) -> String {
    format!("RG{guid} N{name} T{} P{post_count}\n", tag_type as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_line_is_bare() {
        assert_eq!(ok_line(), "OK\n");
    }

    #[test]
    fn error_line_carries_a_stable_code() {
        let line = error_line(&Error::NoSuchTag("cat".into()));
        assert!(line.starts_with("E_NOTAG"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn search_reply_projects_only_present_fields() {
        let row = SearchReplyRow {
            hash: ContentHash::from_bytes([1; 16]),
            strong_tag_names: vec!["cat".to_string(), "dog".to_string()],
            weak_tag_names: vec!["maybe".to_string()],
            score: Some(5),
            ..Default::default()
        };
        let line = search_reply_line(&row);
        assert!(line.contains(" Ncat,dog"));
        assert!(line.contains(" N~maybe"));
        assert!(line.contains(" R5"));
        assert!(!line.contains(" W"));
    }

    #[test]
    fn tag_lookup_line_has_type_and_count() {
        let guid = Guid::new_server_guid([9; 7]);
        let line = tag_lookup_reply_line(&guid, "cat", TagType::Artist, 3);
        assert!(line.starts_with("RG"));
        assert!(line.contains("T2"));
        assert!(line.contains("P3"));
    }
}
