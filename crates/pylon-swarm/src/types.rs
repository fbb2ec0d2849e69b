//! Core data model: peers, groups, file records.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Opaque peer identifier
pub type PeerId = String;

/// Unix timestamp in milliseconds, stamped on outbound messages.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A file as declared by an announcing peer. The `{name, size, hash}`
/// triple comes from the external metadata parser and is consumed as-is;
/// the registry sanitizes `name` and validates `hash` before storing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Content fingerprint, 64 lowercase hex characters
    pub hash: String,
    /// Declared file name
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
}

/// File record as reported to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Content fingerprint
    pub hash: String,
    /// Sanitized file name
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Number of current seeders
    pub seeders: usize,
}

/// A connected or announced peer.
#[derive(Debug, Clone)]
pub(crate) struct Peer {
    pub id: PeerId,
    /// Groups this peer currently belongs to
    pub groups: HashSet<String>,
    /// Free-form metadata (user agent, capabilities, bandwidth), capped
    pub metadata: HashMap<String, String>,
    /// Messages handled on behalf of this peer
    pub message_count: u64,
    pub created_at: Instant,
    pub last_active: Instant,
}

impl Peer {
    pub fn new(id: PeerId) -> Self {
        let now = Instant::now();
        Self {
            id,
            groups: HashSet::new(),
            metadata: HashMap::new(),
            message_count: 0,
            created_at: now,
            last_active: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
        self.message_count += 1;
    }
}

/// A room (signaling) or swarm (tracker).
#[derive(Debug)]
pub(crate) struct Group {
    pub id: String,
    pub members: HashSet<PeerId>,
    pub files: HashMap<String, FileRecord>,
    #[allow(dead_code)]
    pub created_at: Instant,
    pub last_active: Instant,
}

impl Group {
    pub fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            members: HashSet::new(),
            files: HashMap::new(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

/// One announced file inside a group.
#[derive(Debug, Clone)]
pub(crate) struct FileRecord {
    pub hash: String,
    pub name: String,
    pub size: u64,
    /// Peers that have the complete file
    pub seeders: HashSet<PeerId>,
    /// Peers currently acquiring it; disjoint from `seeders`
    pub leechers: HashSet<PeerId>,
    #[allow(dead_code)]
    pub announced_by: PeerId,
    pub announced_at: Instant,
}

impl FileRecord {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            hash: self.hash.clone(),
            name: self.name.clone(),
            size: self.size,
            seeders: self.seeders.len(),
        }
    }
}

/// Strip markup-significant and control characters, then cap the length
/// on a character boundary.
pub(crate) fn sanitize(raw: &str, max_len: usize) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .take(max_len)
        .collect()
}

/// Whether `hash` is a 64-character lowercase hex fingerprint.
pub(crate) fn valid_file_hash(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(sanitize("<script>alert('x')</script>", 255), "scriptalert(x)/script");
        assert_eq!(sanitize("plain-name.iso", 255), "plain-name.iso");
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize("a\x00b\nc", 255), "abc");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(1000);
        assert_eq!(sanitize(&long, 255).len(), 255);
    }

    #[test]
    fn test_valid_file_hash() {
        assert!(valid_file_hash(&"ab12".repeat(16)));
        assert!(!valid_file_hash(&"AB12".repeat(16))); // uppercase rejected
        assert!(!valid_file_hash("ab12")); // too short
        assert!(!valid_file_hash(&"zz12".repeat(16))); // non-hex
    }

    #[test]
    fn test_now_millis_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // sanity: after Sep 2020
    }
}
