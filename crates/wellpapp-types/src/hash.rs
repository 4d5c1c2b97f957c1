use std::fmt;
use std::str::FromStr;

use wellpapp_error::Error;

/// A 128-bit MD5 digest, used both as a post's content fingerprint and as the
/// raw key type for the associative indices (§4.2): post MD5s are used
/// directly, tag/user name keys are derived by hashing the normalised name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// First 16 bytes of MD5 of `data` — used for the name-derived keys
    /// (§4.2). MD5 is already 16 bytes, so this is just `of`, but the name
    /// documents the specific contract from the spec's glossary.
    #[must_use]
    pub fn first16_of_md5(data: &[u8]) -> Self {
        Self::of(data)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::BadMd5(s.to_string()));
        }
        let mut out = [0u8; 16];
        for (i, chunk) in out.iter_mut().enumerate() {
            let hex = &s[i * 2..i * 2 + 2];
            *chunk = u8::from_str_radix(hex, 16).map_err(|_| Error::BadMd5(s.to_string()))?;
        }
        Ok(Self(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let hash = ContentHash::of(b"hello world");
        let text = hash.to_string();
        assert_eq!(text.len(), 32);
        let parsed: ContentHash = text.parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<ContentHash>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(32);
        assert!(bad.parse::<ContentHash>().is_err());
    }
}
