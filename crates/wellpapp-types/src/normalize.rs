//! Tag-name canonicalisation ("fuzz normalisation"), §4.2/§4.2.1.
//!
//! Two passes: a generic Unicode pass (NFD decompose, strip combining marks,
//! casefold) and then a fixed ASCII punctuation/control strip, applied in
//! that order, not interleaved.

use unicode_normalization::UnicodeNormalization;
use wellpapp_error::Error;

use crate::ContentHash;

/// The punctuation/control set stripped after Unicode normalisation,
/// grounded in the original's `utf.c` fuzz table.
const STRIP_SET: &[char] = &[
    ' ', '-', '_', '(', ')', '[', ']', '{', '}', '.', ',', '!', '/', '"', '\'', '?', '<', '>',
    '@', '=', '+', '%', '#', '|', '\\',
];

fn is_stripped(c: char) -> bool {
    (c as u32) < 0x20 || STRIP_SET.contains(&c)
}

/// NFC-compose a line before protocol dispatch (§4.7). A failed
/// decomposition surfaces as a connection-fatal error.
pub fn nfc_compose(input: &str) -> Result<String, Error> {
    Ok(input.nfc().collect())
}

/// The full fuzz-normalisation pipeline used for tag-name lookup keys.
#[must_use]
pub fn fuzz_normalize(input: &str) -> String {
    let composed: String = input.nfc().collect();
    let decomposed = composed
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c));
    let casefolded: String = decomposed.collect::<String>().to_lowercase();
    casefolded.chars().filter(|c| !is_stripped(*c)).collect()
}

/// The 128-bit lookup key derived from a tag name: first 16 bytes of MD5 of
/// the fuzz-normalised name.
#[must_use]
pub fn fuzz_key(input: &str) -> ContentHash {
    ContentHash::first16_of_md5(fuzz_normalize(input).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casing_and_punctuation_collapse_to_same_key() {
        assert_eq!(fuzz_key("Cat-Tag"), fuzz_key("cat_tag"));
        assert_eq!(fuzz_key("hello, world!"), fuzz_key("HELLO WORLD"));
    }

    #[test]
    fn accents_are_stripped() {
        assert_eq!(fuzz_key("cafe"), fuzz_key("caf\u{e9}"));
    }

    #[test]
    fn distinct_words_stay_distinct() {
        assert_ne!(fuzz_key("cat"), fuzz_key("dog"));
    }

    #[test]
    fn nfc_compose_is_idempotent() {
        let once = nfc_compose("caf\u{e9}").unwrap();
        let twice = nfc_compose(&once).unwrap();
        assert_eq!(once, twice);
    }
}
