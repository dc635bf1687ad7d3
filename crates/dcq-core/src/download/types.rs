//! Core domain types for the download queue.
//!
//! Pure data types with no I/O dependencies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Length of a Tiger digest in bytes.
pub const TIGER_HASH_LEN: usize = 24;

/// Length of the unpadded base32 rendering of a Tiger digest.
pub const TIGER_BASE32_LEN: usize = 39;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A 192-bit Tiger digest.
///
/// Used both for tree nodes and, as the tree root, for the content
/// identifier of a file. Rendered as unpadded base32 (39 characters), the
/// form used in magnet links and search queries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TigerHash([u8; TIGER_HASH_LEN]);

/// Content identifier: the root of a file's hash tree.
pub type ContentId = TigerHash;

impl TigerHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; TIGER_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TIGER_HASH_LEN] {
        &self.0
    }

    /// Encode as unpadded base32.
    #[must_use]
    pub fn to_base32(&self) -> String {
        let mut out = String::with_capacity(TIGER_BASE32_LEN);
        let mut buffer: u32 = 0;
        let mut bits: u8 = 0;
        for byte in self.0 {
            buffer = (buffer << 8) | u32::from(byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
            }
        }
        if bits > 0 {
            out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
        }
        out
    }

    /// Decode from base32 (case-insensitive, padding tolerated).
    #[must_use]
    pub fn from_base32(value: &str) -> Option<Self> {
        let mut out = Vec::with_capacity(TIGER_HASH_LEN);
        let mut buffer: u32 = 0;
        let mut bits: u8 = 0;
        for ch in value.trim().chars() {
            if ch == '=' {
                break;
            }
            let val = base32_value(ch)?;
            buffer = (buffer << 5) | u32::from(val);
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                #[allow(clippy::cast_possible_truncation)]
                out.push(((buffer >> bits) & 0xff) as u8);
            }
        }
        <[u8; TIGER_HASH_LEN]>::try_from(out.as_slice())
            .ok()
            .map(Self)
    }
}

fn base32_value(ch: char) -> Option<u8> {
    let ch = ch.to_ascii_uppercase();
    match ch {
        'A'..='Z' => Some((ch as u8) - b'A'),
        '2'..='7' => Some((ch as u8) - b'2' + 26),
        _ => None,
    }
}

impl fmt::Display for TigerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl fmt::Debug for TigerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TigerHash({})", self.to_base32())
    }
}

impl FromStr for TigerHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base32(s).ok_or_else(|| format!("not a base32 tiger hash: {s}"))
    }
}

impl Serialize for TigerHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> Deserialize<'de> for TigerHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Stable identifier of a queue item within one queue instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A remote peer as seen through one hub.
///
/// The same user reachable through two hubs counts as two sources.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerHandle {
    /// Opaque user identity (CID or nick, as the session layer provides).
    pub user: String,
    /// Hub URL the user was seen on.
    pub hub: String,
}

impl PeerHandle {
    /// Create a new peer handle.
    pub fn new(user: impl Into<String>, hub: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            hub: hub.into(),
        }
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.hub)
    }
}

/// Scheduling class of a queue item.
///
/// The derived order is the scheduling precedence: `Highest` runs first,
/// `Paused` never receives new segment assignments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Paused,
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

impl Priority {
    /// Numeric level (0 = paused .. 5 = highest).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Paused => 0,
            Self::Lowest => 1,
            Self::Low => 2,
            Self::Normal => 3,
            Self::High => 4,
            Self::Highest => 5,
        }
    }

    /// Parse a numeric level; out-of-range values are rejected.
    #[must_use]
    pub const fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(Self::Paused),
            1 => Some(Self::Lowest),
            2 => Some(Self::Low),
            3 => Some(Self::Normal),
            4 => Some(Self::High),
            5 => Some(Self::Highest),
            _ => None,
        }
    }

    /// Whether this priority stops new assignments.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Lowercase name used in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Highest => "highest",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a queue item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Queued, no transfer in flight.
    Waiting,
    /// At least one segment is assigned or transferring.
    Running,
    /// Priority is `Paused`.
    Paused,
    /// All data verified and moved to the target path.
    Finished,
    /// Unrecoverable failure (e.g. the target could not be written).
    Failed,
}

impl ItemStatus {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Whether the item no longer takes part in scheduling.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// State of one segment of a queue item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Pending,
    Assigned,
    Transferring,
    Verifying,
    Verified,
    /// A transfer or block check failed. Segment maps reset such a segment
    /// to `Pending` with its data discarded straight away, so it is never
    /// stored in this state.
    Failed,
}

impl SegmentState {
    /// Whether a source currently holds this segment.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Assigned | Self::Transferring | Self::Verifying)
    }
}

/// What kind of content an item carries.
///
/// Listing items (a peer's full file list) have their own auto-drop toggle
/// and are exempt from the minimum-size drop gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    File,
    Listing,
}

/// A peer offering some content, as reported by the discovery layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOffer {
    /// The offering peer.
    pub peer: PeerHandle,
    /// Content identifier the peer declared.
    pub content: ContentId,
    /// Size the peer declared.
    pub size: u64,
}

impl SourceOffer {
    /// Create a new source offer.
    pub const fn new(peer: PeerHandle, content: ContentId, size: u64) -> Self {
        Self {
            peer,
            content,
            size,
        }
    }
}

/// Request to add a new item to the queue.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    /// Content identifier (tree root).
    pub content: ContentId,
    /// Declared size in bytes.
    pub size: u64,
    /// Final path of the completed file.
    pub target: PathBuf,
    /// Explicit priority; `None` applies automatic classification.
    pub priority: Option<Priority>,
    /// Regular file or peer listing.
    pub kind: ItemKind,
}

impl EnqueueRequest {
    /// Create a request for a regular file with automatic priority.
    pub fn new(content: ContentId, size: u64, target: impl Into<PathBuf>) -> Self {
        Self {
            content,
            size,
            target: target.into(),
            priority: None,
            kind: ItemKind::File,
        }
    }

    /// Set an explicit priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the item kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }
}
