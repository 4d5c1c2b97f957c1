use std::fmt;
use std::str::FromStr;

use wellpapp_error::Error;

const CHARSET: &[u8; 41] = b"abcdefghkopqrstyABCDEFGHKLPQRSTY234567890";
const BASE: u32 = 41;

/// Distinguishes the two kinds of GUID this system mints, per §6: server
/// GUIDs (configured, group 2 and 3 always zero) and tag GUIDs (server GUID
/// prefix plus a monotonic counter in groups 2 and 3). The discriminant also
/// feeds the checksum byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidType {
    Server = 0,
    Tag = 1,
}

/// A 128-bit GUID: four big-endian u32 groups, each textually rendered in a
/// 41-character alphabet, joined by `-`. Byte 7 carries a checksum.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    fn group_u32(&self, idx: usize) -> u32 {
        let b = &self.0[idx * 4..idx * 4 + 4];
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    fn checksum(&self, what: GuidType) -> u8 {
        let mut sum: u8 = what as u8;
        for (i, byte) in self.0.iter().enumerate() {
            if i != 7 {
                sum = sum.wrapping_add(*byte);
            }
        }
        sum
    }

    #[must_use]
    pub fn is_valid(&self, what: GuidType) -> bool {
        self.0[7] == self.checksum(what)
    }

    #[must_use]
    pub fn is_valid_server_guid(&self) -> bool {
        self.is_valid(GuidType::Server) && self.group_u32(2) == 0 && self.group_u32(3) == 0
    }

    #[must_use]
    pub fn is_valid_tag_guid(&self, must_be_local: bool, server: &Guid) -> bool {
        if !self.is_valid(GuidType::Tag) {
            return false;
        }
        if must_be_local && self.0[..7] != server.0[..7] {
            return false;
        }
        true
    }

    /// Builds a server GUID from a 7-byte prefix, computing the checksum and
    /// zeroing groups 2 and 3 as `is_valid_server_guid` requires.
    #[must_use]
    pub fn new_server_guid(prefix7: [u8; 7]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..7].copy_from_slice(&prefix7);
        let mut guid = Self(bytes);
        guid.0[7] = guid.checksum(GuidType::Server);
        guid
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in 0..4 {
            let mut val = self.group_u32(group);
            let mut digits = [0u8; 6];
            for slot in digits.iter_mut().rev() {
                *slot = CHARSET[(val % BASE) as usize];
                val /= BASE;
            }
            // SAFETY-free: charset is ASCII, so this is valid UTF-8.
            f.write_str(std::str::from_utf8(&digits).unwrap())?;
            if group != 3 {
                f.write_str("-")?;
            }
        }
        Ok(())
    }
}

fn char_to_digit(c: u8) -> Option<u32> {
    CHARSET.iter().position(|&ch| ch == c).map(|i| i as u32)
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut groups = [0u32; 4];
        let mut group_idx = 0usize;
        let mut consumed = 0usize;
        for c in s.bytes() {
            if c == b'-' {
                if consumed != 6 {
                    return Err(Error::BadGuid(s.to_string()));
                }
                consumed = 0;
                group_idx += 1;
                if group_idx == 4 {
                    return Err(Error::BadGuid(s.to_string()));
                }
            } else {
                let digit = char_to_digit(c).ok_or_else(|| Error::BadGuid(s.to_string()))?;
                let prev = groups[group_idx];
                groups[group_idx] = groups[group_idx]
                    .checked_mul(BASE)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| Error::BadGuid(s.to_string()))?;
                if groups[group_idx] / BASE != prev {
                    return Err(Error::BadGuid(s.to_string()));
                }
                consumed += 1;
            }
        }
        if consumed != 6 || group_idx != 3 {
            return Err(Error::BadGuid(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for (group, val) in groups.iter().enumerate() {
            bytes[group * 4..group * 4 + 4].copy_from_slice(&val.to_be_bytes());
        }
        Ok(Self(bytes))
    }
}

/// Hands out successive tag GUIDs from a server GUID and a persisted
/// monotonic counter (the arena header's `tag_guid_last` field, per
/// `mm.c`/`guid.c`).
#[derive(Debug, Clone)]
pub struct GuidGenerator {
    server: Guid,
    last: (u32, u32),
}

impl GuidGenerator {
    #[must_use]
    pub const fn new(server: Guid, last: (u32, u32)) -> Self {
        Self { server, last }
    }

    #[must_use]
    pub const fn last(&self) -> (u32, u32) {
        self.last
    }

    pub fn next_tag_guid(&mut self) -> Guid {
        self.last.1 = self.last.1.wrapping_add(1);
        if self.last.1 == 0 {
            self.last.0 = self.last.0.wrapping_add(1);
        }
        let mut bytes = *self.server.as_bytes();
        bytes[8..12].copy_from_slice(&self.last.0.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.last.1.to_be_bytes());
        let mut guid = Guid(bytes);
        guid.0[7] = guid.checksum(GuidType::Tag);
        guid
    }

    /// Advances the persisted counter to reflect a GUID observed during log
    /// replay, so a subsequent live mint never reuses an id (`guid_update_last`).
    pub fn observe(&mut self, guid: &Guid) {
        if guid.0[..7] != self.server.0[..7] {
            return;
        }
        let hi = guid.group_u32(2);
        let lo = guid.group_u32(3);
        if hi > self.last.0 || (hi == self.last.0 && lo > self.last.1) {
            self.last = (hi, lo);
        }
    }
}
