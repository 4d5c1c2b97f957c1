//! Log line framing (§4.6): the three record kinds, plus the `L` line a
//! dump ends with. Parsing is purely syntactic — it does not interpret
//! `D` payloads, which are live server commands handled by the caller.

use wellpapp_error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// `T<16-hex-id><O|U><16-hex-unix-time>`. `committed` is `true` once the
    /// writer has flipped `U` to `O`.
    TransactionStart {
        trans_id: u64,
        committed: bool,
        time: u64,
    },
    /// `D<16-hex-id> <payload>`.
    Data { trans_id: u64, payload: String },
    /// `E<16-hex-id>`.
    End { trans_id: u64 },
    /// `L<16-hex-next-log-index>`, terminating a dump file.
    NextLogIndex { index: u32 },
}

fn hex16(v: u64) -> String {
    format!("{v:016x}")
}

fn parse_hex16(s: &str) -> Result<u64> {
    u64::from_str_radix(s, 16).map_err(|_| Error::WalCorrupt(format!("bad hex field: {s}")))
}

impl LogLine {
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::TransactionStart {
                trans_id,
                committed,
                time,
            } => {
                let flag = if *committed { 'O' } else { 'U' };
                format!("T{}{flag}{}", hex16(*trans_id), hex16(*time))
            }
            Self::Data { trans_id, payload } => format!("D{} {payload}", hex16(*trans_id)),
            Self::End { trans_id } => format!("E{}", hex16(*trans_id)),
            Self::NextLogIndex { index } => format!("L{index:016x}"),
        }
    }

    /// Byte offset, within the line, of the commit flag — so the writer can
    /// seek back and flip `U` to `O` without re-emitting the whole line.
    #[must_use]
    pub const fn commit_flag_offset() -> usize {
        1 + 16
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut chars = line.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::WalCorrupt("empty log line".into()))?;
        let rest = chars.as_str();
        match kind {
            'T' => {
                if rest.len() < 17 {
                    return Err(Error::WalCorrupt(format!("short T line: {line}")));
                }
                let trans_id = parse_hex16(&rest[..16])?;
                let flag = rest.as_bytes()[16] as char;
                let committed = match flag {
                    'O' => true,
                    'U' => false,
                    other => return Err(Error::WalCorrupt(format!("bad commit flag: {other}"))),
                };
                let time = parse_hex16(&rest[17..])?;
                Ok(Self::TransactionStart {
                    trans_id,
                    committed,
                    time,
                })
            }
            'D' => {
                if rest.len() < 16 {
                    return Err(Error::WalCorrupt(format!("short D line: {line}")));
                }
                let trans_id = parse_hex16(&rest[..16])?;
                let payload = rest.get(17..).unwrap_or("").to_string();
                Ok(Self::Data { trans_id, payload })
            }
            'E' => {
                let trans_id = parse_hex16(rest)?;
                Ok(Self::End { trans_id })
            }
            'L' => {
                let index = u32::from_str_radix(rest, 16)
                    .map_err(|_| Error::WalCorrupt(format!("bad L line: {line}")))?;
                Ok(Self::NextLogIndex { index })
            }
            other => Err(Error::WalCorrupt(format!("unknown log line kind: {other}"))),
        }
    }
}
