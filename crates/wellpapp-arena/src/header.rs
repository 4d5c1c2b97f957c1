//! The arena integrity header (§4.1): two magic numbers, sizing info, a
//! struct-size fingerprint, the configuration's MD5, and a clean flag.
//! Validated in full on every startup; any mismatch forces a cold rebuild.

pub const MAGIC0: u32 = 0x4d4d_0402;
pub const MAGIC1: u32 = 0x4d4d_4845;

/// A coarse layout fingerprint standing in for the original's
/// `sizeof(...)` table (`mm.c`'s `sizes[]`): the sizes of the handful of
/// fixed-size records this implementation persists. Any change to these
/// forces a cold rebuild exactly as a real struct-layout change would.
pub const STRUCT_SIZES: [u64; 4] = [
    size_of::<u128>() as u64,     // Guid / ContentHash width
    size_of::<u64>() as u64,      // ArenaOffset width
    size_of::<u32>() as u64,      // segment index width
    size_of::<[u8; 16]>() as u64, // config md5 width
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaHeader {
    pub magic0: u32,
    pub magic1: u32,
    pub total_size: u64,
    pub segment_size: u32,
    pub segment_count: u32,
    pub base_addr: u64,
    pub struct_sizes: [u64; 4],
    pub config_md5: [u8; 16],
    pub clean: bool,
}

pub const HEADER_LEN: usize = 4 + 4 + 8 + 4 + 4 + 8 + (8 * 4) + 16 + 1;

impl ArenaHeader {
    #[must_use]
    pub fn fresh(segment_size: u32, base_addr: u64, config_md5: [u8; 16]) -> Self {
        Self {
            magic0: MAGIC0,
            magic1: MAGIC1,
            total_size: u64::from(segment_size),
            segment_size,
            segment_count: 1,
            base_addr,
            struct_sizes: STRUCT_SIZES,
            config_md5,
            clean: false,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut pos = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let bytes = $bytes;
                out[pos..pos + bytes.len()].copy_from_slice(&bytes);
                pos += bytes.len();
            }};
        }
        put!(self.magic0.to_le_bytes());
        put!(self.magic1.to_le_bytes());
        put!(self.total_size.to_le_bytes());
        put!(self.segment_size.to_le_bytes());
        put!(self.segment_count.to_le_bytes());
        put!(self.base_addr.to_le_bytes());
        for size in self.struct_sizes {
            put!(size.to_le_bytes());
        }
        put!(self.config_md5);
        out[pos] = u8::from(self.clean);
        pos += 1;
        debug_assert_eq!(pos, HEADER_LEN);
        out
    }

    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let mut pos = 0;
        macro_rules! take {
            ($ty:ty) => {{
                const N: usize = size_of::<$ty>();
                let val = <$ty>::from_le_bytes(bytes[pos..pos + N].try_into().ok()?);
                pos += N;
                val
            }};
        }
        let magic0 = take!(u32);
        let magic1 = take!(u32);
        let total_size = take!(u64);
        let segment_size = take!(u32);
        let segment_count = take!(u32);
        let base_addr = take!(u64);
        let mut struct_sizes = [0u64; 4];
        for slot in &mut struct_sizes {
            *slot = take!(u64);
        }
        let mut config_md5 = [0u8; 16];
        config_md5.copy_from_slice(&bytes[pos..pos + 16]);
        pos += 16;
        let clean = bytes[pos] != 0;
        Some(Self {
            magic0,
            magic1,
            total_size,
            segment_size,
            segment_count,
            base_addr,
            struct_sizes,
            config_md5,
            clean,
        })
    }

    /// Returns `Ok(())` if `self` (read from disk) matches what a fresh
    /// header for this configuration/base address would look like, else the
    /// name of the first mismatched field (§4.1: "any mismatch... forces a
    /// cold rebuild").
    pub fn validate_against(&self, expected: &Self) -> Result<(), &'static str> {
        if self.magic0 != expected.magic0 || self.magic1 != expected.magic1 {
            return Err("magic");
        }
        if self.base_addr != expected.base_addr {
            return Err("base_addr");
        }
        if self.segment_size != expected.segment_size {
            return Err("segment_size");
        }
        if self.struct_sizes != expected.struct_sizes {
            return Err("struct_sizes");
        }
        if self.config_md5 != expected.config_md5 {
            return Err("config_md5");
        }
        if !self.clean {
            return Err("unclean shutdown");
        }
        Ok(())
    }
}
