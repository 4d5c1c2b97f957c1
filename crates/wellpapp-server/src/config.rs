//! The configuration loader (§4.9): a `key=value`, `#`-comment text format,
//! hand-parsed since it is an operator-facing settings file rather than a
//! self-describing data-interchange format.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use wellpapp_error::{Error, Result};
use wellpapp_types::Guid;

#[derive(Debug, Clone)]
pub struct Config {
    pub tagtypes: Vec<String>,
    pub ratings: Vec<String>,
    pub basedir: PathBuf,
    pub guid: Guid,
    pub port: u16,
    pub mm_base: u64,
    /// The raw file bytes this config was parsed from, retained so its MD5
    /// can be recorded in the arena header (§4.1, §4.9).
    raw: Vec<u8>,
}

impl Config {
    /// Loads and parses `path`, computing the configuration MD5 over its raw
    /// bytes exactly as the arena header expects (§4.9).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Self::parse(&raw)
    }

    fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| Error::Utf8Invalid)?;

        let mut tagtypes = None;
        let mut ratings = None;
        let mut basedir = None;
        let mut guid = None;
        let mut port = None;
        let mut mm_base = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Syntax(format!("malformed config line: {line}")))?;
            match key.trim() {
                "tagtypes" => tagtypes = Some(split_names(value)),
                "ratings" => ratings = Some(split_names(value)),
                "basedir" => basedir = Some(PathBuf::from(value.trim())),
                "guid" => guid = Some(Guid::from_str(value.trim())?),
                "port" => {
                    port = Some(
                        value
                            .trim()
                            .parse::<u16>()
                            .map_err(|_| Error::Syntax(format!("bad port: {value}")))?,
                    );
                }
                "mm_base" => {
                    mm_base = Some(
                        u64::from_str_radix(value.trim().trim_start_matches("0x"), 16)
                            .map_err(|_| Error::Syntax(format!("bad mm_base: {value}")))?,
                    );
                }
                other => return Err(Error::Syntax(format!("unknown config key: {other}"))),
            }
        }

        let guid = guid.ok_or_else(|| Error::Syntax("missing guid=".into()))?;
        if !guid.is_valid_server_guid() {
            return Err(Error::BadGuid(guid.to_string()));
        }

        Ok(Self {
            tagtypes: tagtypes.unwrap_or_default(),
            ratings: ratings.unwrap_or_default(),
            basedir: basedir.ok_or_else(|| Error::Syntax("missing basedir=".into()))?,
            guid,
            port: port.ok_or_else(|| Error::Syntax("missing port=".into()))?,
            mm_base: mm_base.unwrap_or(0),
            raw: raw.to_vec(),
        })
    }

    #[must_use]
    pub fn md5(&self) -> [u8; 16] {
        md5::compute(&self.raw).0
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.basedir.join("log")
    }

    #[must_use]
    pub fn dump_dir(&self) -> PathBuf {
        self.basedir.join("dump")
    }
}

fn split_names(value: &str) -> Vec<String> {
    value.split_whitespace().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_guid() -> Guid {
        Guid::new_server_guid([1, 2, 3, 4, 5, 6, 7])
    }

    #[test]
    fn parses_well_formed_config() {
        let text = format!(
            "# a comment\n\ntagtypes=unspecified inimage artist\nratings=unspecified safe\nbasedir=/var/wellpapp\nguid={}\nport=8080\nmm_base=0x7f0000000000\n",
            sample_guid()
        );
        let cfg = Config::parse(text.as_bytes()).unwrap();
        assert_eq!(cfg.tagtypes, vec!["unspecified", "inimage", "artist"]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.basedir, PathBuf::from("/var/wellpapp"));
        assert_eq!(cfg.mm_base, 0x7f0000000000);
    }

    #[test]
    fn rejects_unknown_keys() {
        let text = "bogus=1\n";
        assert!(Config::parse(text.as_bytes()).is_err());
    }

    #[test]
    fn rejects_non_server_guid() {
        let bad_guid = {
            let mut g = sample_guid();
            let bytes = *g.as_bytes();
            let mut bytes = bytes;
            bytes[2] = 9;
            g = Guid::from_bytes(bytes);
            g
        };
        let text = format!("basedir=/x\nguid={bad_guid}\nport=1\n");
        assert!(Config::parse(text.as_bytes()).is_err());
    }

    #[test]
    fn md5_is_stable_over_raw_bytes() {
        let text = format!("basedir=/x\nguid={}\nport=1\n", sample_guid());
        let cfg = Config::parse(text.as_bytes()).unwrap();
        assert_eq!(cfg.md5(), md5::compute(text.as_bytes()).0);
    }
}
