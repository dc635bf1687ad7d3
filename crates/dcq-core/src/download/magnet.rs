//! Magnet link parsing.
//!
//! Recognises `magnet:?xt=urn:tree:tiger:<base32>&xl=<size>&dn=<name>`. The
//! older `urn:bitprint:<sha1>.<tiger>` form is accepted too; only its Tiger
//! half is kept.

use serde::{Deserialize, Serialize};

use super::errors::{DownloadError, DownloadResult};
use super::types::{ContentId, TigerHash};

/// A parsed magnet link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnetLink {
    /// Tree root of the content.
    pub content: ContentId,
    /// Exact length (`xl`).
    pub size: u64,
    /// Display name (`dn`), if present.
    pub name: Option<String>,
}

impl MagnetLink {
    /// File name to save under: the display name, or the base32 root.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.name
            .as_deref()
            .map(sanitize_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.content.to_base32())
    }
}

/// Parse a magnet URI.
pub fn parse_magnet(link: &str) -> DownloadResult<MagnetLink> {
    let query = link
        .trim()
        .strip_prefix("magnet:?")
        .ok_or_else(|| DownloadError::invalid_magnet("missing magnet:? prefix"))?;

    let mut content = None;
    let mut size = None;
    let mut name = None;

    for (key, value) in query_pairs(query) {
        match key.as_str() {
            "xt" => {
                let lower = value.to_ascii_lowercase();
                if let Some(rest) = lower.strip_prefix("urn:tree:tiger:") {
                    content = TigerHash::from_base32(rest);
                } else if let Some(rest) = lower.strip_prefix("urn:bitprint:") {
                    if let Some((_, tiger)) = rest.split_once('.') {
                        content = TigerHash::from_base32(tiger);
                    }
                }
            }
            "xl" => {
                size = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| DownloadError::invalid_magnet(format!("bad xl: {value}")))?,
                );
            }
            "dn" if !value.is_empty() => name = Some(value),
            _ => {}
        }
    }

    let content =
        content.ok_or_else(|| DownloadError::invalid_magnet("missing urn:tree:tiger hash"))?;
    let size = size.ok_or_else(|| DownloadError::invalid_magnet("missing xl (exact length)"))?;

    Ok(MagnetLink {
        content,
        size,
        name,
    })
}

fn query_pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query.split('&').filter(|p| !p.is_empty()).map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (percent_decode(key), percent_decode(value))
    })
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'%' if idx + 2 < bytes.len() => {
                let hex = |b: u8| (b as char).to_digit(16);
                if let (Some(hi), Some(lo)) = (hex(bytes[idx + 1]), hex(bytes[idx + 2])) {
                    #[allow(clippy::cast_possible_truncation)]
                    out.push((hi * 16 + lo) as u8);
                    idx += 3;
                    continue;
                }
            }
            b'+' => {
                out.push(b' ');
                idx += 1;
                continue;
            }
            _ => {}
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Strip path separators so a display name cannot escape its directory.
fn sanitize_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "LWPNACQDBZRYXW3VHJVCJ64QBZNGHOHHHZWCLNQ";

    #[test]
    fn test_parse_full_magnet() {
        let link = format!("magnet:?xt=urn:tree:tiger:{ROOT}&xl=1048576&dn=Some+File%20v2.iso");
        let magnet = parse_magnet(&link).unwrap();
        assert_eq!(magnet.content.to_base32(), ROOT);
        assert_eq!(magnet.size, 1_048_576);
        assert_eq!(magnet.name.as_deref(), Some("Some File v2.iso"));
        assert_eq!(magnet.file_name(), "Some File v2.iso");
    }

    #[test]
    fn test_parse_bitprint() {
        let link = format!(
            "magnet:?xt=urn:bitprint:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ.{ROOT}&xl=0"
        );
        let magnet = parse_magnet(&link).unwrap();
        assert_eq!(magnet.content.to_base32(), ROOT);
        assert_eq!(magnet.file_name(), ROOT);
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(matches!(
            parse_magnet("http://example.com"),
            Err(DownloadError::InvalidMagnet { .. })
        ));
        assert!(parse_magnet("magnet:?xl=10").is_err());
        assert!(parse_magnet(&format!("magnet:?xt=urn:tree:tiger:{ROOT}")).is_err());
        assert!(parse_magnet(&format!("magnet:?xt=urn:tree:tiger:{ROOT}&xl=abc")).is_err());
    }

    #[test]
    fn test_display_name_cannot_escape() {
        let link = format!("magnet:?xt=urn:tree:tiger:{ROOT}&xl=5&dn=..%2F..%2Fetc%2Fpasswd");
        let magnet = parse_magnet(&link).unwrap();
        assert_eq!(magnet.file_name(), "passwd");
    }
}
