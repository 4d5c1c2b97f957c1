//! `TagRef`: a tag named either by GUID (`G<guid>`) or by display name
//! (`N<name>`), the two ways the wire protocol identifies a tag (§4.7).

use std::str::FromStr;

use wellpapp_error::{Error, Result};
use wellpapp_types::Guid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRef {
    Guid(Guid),
    Name(String),
}

impl TagRef {
    /// Parses a `G<guid>` or `N<name>` token remainder.
    pub fn parse(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let kind = chars.next().ok_or_else(|| Error::Syntax(s.to_string()))?;
        let rest = chars.as_str();
        match kind {
            'G' => Ok(Self::Guid(Guid::from_str(rest)?)),
            'N' => Ok(Self::Name(rest.to_string())),
            _ => Err(Error::Syntax(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guid_and_name_forms() {
        let guid = Guid::new_server_guid([1; 7]);
        let text = format!("G{guid}");
        assert_eq!(TagRef::parse(&text).unwrap(), TagRef::Guid(guid));
        assert_eq!(TagRef::parse("Ncat").unwrap(), TagRef::Name("cat".to_string()));
    }

    #[test]
    fn rejects_unknown_selector() {
        assert!(TagRef::parse("Xfoo").is_err());
    }
}
