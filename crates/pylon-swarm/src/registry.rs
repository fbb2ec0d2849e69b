//! In-memory peer/room/file bookkeeping.
//!
//! One registry instance backs one gateway. Every public operation takes
//! the single inner lock for its whole duration, so each is atomic with
//! respect to the peer/group/file maps it touches; callers deliver any
//! resulting broadcasts after the lock is released.

use crate::error::SwarmError;
use crate::types::{FileRecord, FileSummary, Group, Peer, PeerId, sanitize, valid_file_hash};
use crate::FileInfo;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Registry limits and behavior knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Member capacity per group; joining a full group is rejected
    pub max_group_members: usize,
    /// Delete a group the moment its member set empties (signaling rooms)
    /// instead of waiting for the staleness sweep (tracker swarms)
    pub drop_empty_groups: bool,
    /// Metadata entries kept per peer
    pub max_metadata_entries: usize,
    /// Metadata key length cap (characters)
    pub max_metadata_key_len: usize,
    /// Metadata value length cap (characters)
    pub max_metadata_value_len: usize,
    /// Declared file name length cap (characters)
    pub max_file_name_len: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_group_members: 64,
            drop_empty_groups: true,
            max_metadata_entries: 16,
            max_metadata_key_len: 32,
            max_metadata_value_len: 256,
            max_file_name_len: 255,
        }
    }
}

impl RegistryConfig {
    /// Profile for tracker swarms: bigger groups, kept through polling gaps.
    #[must_use]
    pub fn tracker() -> Self {
        Self {
            max_group_members: 4096,
            drop_empty_groups: false,
            ..Self::default()
        }
    }
}

/// Membership and files of one group, as seen at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Group identifier
    pub group: String,
    /// Current members, the subject peer included
    pub members: Vec<PeerId>,
    /// Files currently announced in the group
    pub files: Vec<FileSummary>,
}

/// A peer's exit from one group, for `peer-left` fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Group the peer left
    pub group: String,
    /// Members remaining after the departure
    pub remaining: Vec<PeerId>,
}

/// What a staleness sweep deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle empty groups removed
    pub groups_removed: usize,
    /// Orphaned file records removed
    pub files_removed: usize,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<PeerId, Peer>,
    groups: HashMap<String, Group>,
}

/// The registry proper. Cheap to construct; tests instantiate isolated
/// instances instead of sharing ambient global state.
pub struct SwarmRegistry {
    config: RegistryConfig,
    inner: Mutex<Inner>,
}

impl SwarmRegistry {
    /// New empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register `peer` on first contact. Idempotent.
    pub fn ensure_peer(&self, peer: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .peers
            .entry(peer.to_string())
            .or_insert_with(|| Peer::new(peer.to_string()));
    }

    /// Join `peer` to `group`, creating the group lazily. Re-joining is
    /// idempotent and returns the current snapshot.
    ///
    /// # Errors
    ///
    /// [`SwarmError::GroupFull`] when the group is at capacity.
    pub fn join(&self, group: &str, peer: &str) -> Result<RoomSnapshot, SwarmError> {
        let mut inner = self.inner.lock().unwrap();

        inner
            .peers
            .entry(peer.to_string())
            .or_insert_with(|| Peer::new(peer.to_string()));

        let capacity = self.config.max_group_members;
        let entry = inner
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Group::new(group.to_string()));

        if !entry.members.contains(peer) && entry.members.len() >= capacity {
            return Err(SwarmError::GroupFull {
                group: group.to_string(),
                capacity,
            });
        }

        entry.members.insert(peer.to_string());
        entry.touch();
        let snapshot = RoomSnapshot {
            group: group.to_string(),
            members: entry.members.iter().cloned().collect(),
            files: entry.files.values().map(FileRecord::summary).collect(),
        };

        if let Some(p) = inner.peers.get_mut(peer) {
            p.groups.insert(group.to_string());
            p.touch();
        }

        debug!(group, peer, "peer joined group");
        Ok(snapshot)
    }

    /// Remove `peer` from `group`, dropping its seeder/leecher entries
    /// there. An empty signaling room is deleted immediately.
    ///
    /// # Errors
    ///
    /// [`SwarmError::UnknownGroup`] if the group does not exist.
    pub fn leave(&self, group: &str, peer: &str) -> Result<Departure, SwarmError> {
        let mut inner = self.inner.lock().unwrap();
        let departure = Self::detach(&mut inner, &self.config, group, peer)?;

        if let Some(p) = inner.peers.get_mut(peer) {
            p.groups.remove(group);
            p.touch();
        }

        Ok(departure)
    }

    /// Shared leave/remove-peer path. Caller fixes up the peer record.
    fn detach(
        inner: &mut Inner,
        config: &RegistryConfig,
        group: &str,
        peer: &str,
    ) -> Result<Departure, SwarmError> {
        let entry = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| SwarmError::UnknownGroup(group.to_string()))?;

        entry.members.remove(peer);
        entry.files.retain(|_, record| {
            record.seeders.remove(peer);
            record.leechers.remove(peer);
            !(record.seeders.is_empty() && record.leechers.is_empty())
        });
        entry.touch();

        let departure = Departure {
            group: group.to_string(),
            remaining: entry.members.iter().cloned().collect(),
        };

        if config.drop_empty_groups && entry.members.is_empty() {
            inner.groups.remove(group);
            debug!(group, "empty group deleted");
        }

        debug!(group, peer, "peer left group");
        Ok(departure)
    }

    /// Record a file announcement. The announcer becomes a seeder (and
    /// stops being a leecher, if it was one). Re-announcing an existing
    /// fingerprint adds a seeder and keeps the original name and size.
    ///
    /// # Errors
    ///
    /// Rejects unknown groups, non-members and malformed fingerprints.
    pub fn announce_file(
        &self,
        group: &str,
        peer: &str,
        file: &FileInfo,
    ) -> Result<FileSummary, SwarmError> {
        if !valid_file_hash(&file.hash) {
            return Err(SwarmError::InvalidFileHash(file.hash.clone()));
        }

        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| SwarmError::UnknownGroup(group.to_string()))?;

        if !entry.members.contains(peer) {
            return Err(SwarmError::NotAMember {
                peer: peer.to_string(),
                group: group.to_string(),
            });
        }

        let record = entry
            .files
            .entry(file.hash.clone())
            .or_insert_with(|| FileRecord {
                hash: file.hash.clone(),
                name: sanitize(&file.name, self.config.max_file_name_len),
                size: file.size,
                seeders: Default::default(),
                leechers: Default::default(),
                announced_by: peer.to_string(),
                announced_at: std::time::Instant::now(),
            });

        record.leechers.remove(peer);
        record.seeders.insert(peer.to_string());
        let summary = record.summary();
        entry.touch();

        if let Some(p) = inner.peers.get_mut(peer) {
            p.touch();
        }

        debug!(group, peer, hash = %summary.hash, "file announced");
        Ok(summary)
    }

    /// Record a download request: the requester becomes a leecher (unless
    /// it already seeds the file) and the current seeder set is returned
    /// so the gateway can notify them.
    ///
    /// # Errors
    ///
    /// Rejects unknown groups, non-members and unannounced fingerprints.
    pub fn request_file(
        &self,
        group: &str,
        peer: &str,
        hash: &str,
    ) -> Result<Vec<PeerId>, SwarmError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| SwarmError::UnknownGroup(group.to_string()))?;

        if !entry.members.contains(peer) {
            return Err(SwarmError::NotAMember {
                peer: peer.to_string(),
                group: group.to_string(),
            });
        }

        let record = entry
            .files
            .get_mut(hash)
            .ok_or_else(|| SwarmError::UnknownFile(hash.to_string()))?;

        if !record.seeders.contains(peer) {
            record.leechers.insert(peer.to_string());
        }
        let seeders: Vec<PeerId> = record.seeders.iter().cloned().collect();
        entry.touch();

        if let Some(p) = inner.peers.get_mut(peer) {
            p.touch();
        }

        Ok(seeders)
    }

    /// Merge sanitized metadata into the peer's record, respecting the
    /// entry-count and length caps. Keys beyond the cap are dropped.
    ///
    /// # Errors
    ///
    /// [`SwarmError::UnknownPeer`] if the peer was never registered.
    pub fn update_metadata(
        &self,
        peer: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), SwarmError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .peers
            .get_mut(peer)
            .ok_or_else(|| SwarmError::UnknownPeer(peer.to_string()))?;

        for (key, value) in metadata {
            let key = sanitize(key, self.config.max_metadata_key_len);
            if key.is_empty() {
                continue;
            }
            if record.metadata.len() >= self.config.max_metadata_entries
                && !record.metadata.contains_key(&key)
            {
                warn!(peer, "metadata entry cap reached, dropping key");
                continue;
            }
            record
                .metadata
                .insert(key, sanitize(value, self.config.max_metadata_value_len));
        }
        record.touch();
        Ok(())
    }

    /// A peer's metadata snapshot.
    #[must_use]
    pub fn metadata(&self, peer: &str) -> Option<HashMap<String, String>> {
        let inner = self.inner.lock().unwrap();
        inner.peers.get(peer).map(|p| p.metadata.clone())
    }

    /// Remove `peer` everywhere: every group it belongs to, every
    /// seeder/leecher set, then the peer record itself. Idempotent - a
    /// second call returns no departures and changes nothing.
    pub fn remove_peer(&self, peer: &str) -> Vec<Departure> {
        let mut inner = self.inner.lock().unwrap();

        let Some(record) = inner.peers.remove(peer) else {
            return Vec::new();
        };

        let mut departures = Vec::with_capacity(record.groups.len());
        for group in &record.groups {
            // Group may already be gone if it was swept between touches.
            if let Ok(departure) = Self::detach(&mut inner, &self.config, group, peer) {
                departures.push(departure);
            }
        }

        debug!(peer, groups = departures.len(), "peer removed");
        departures
    }

    /// Delete empty groups idle beyond `max_idle`, and file records with
    /// neither seeders nor leechers that are older than `max_idle`.
    /// Deletion of a populated group would be a programming error and is
    /// skipped defensively.
    pub fn sweep_stale(&self, max_idle: Duration) -> SweepReport {
        let mut inner = self.inner.lock().unwrap();
        let mut report = SweepReport::default();

        for group in inner.groups.values_mut() {
            let before = group.files.len();
            group.files.retain(|_, record| {
                !(record.seeders.is_empty()
                    && record.leechers.is_empty()
                    && record.announced_at.elapsed() >= max_idle)
            });
            report.files_removed += before - group.files.len();
        }

        let stale: Vec<String> = inner
            .groups
            .values()
            .filter(|g| g.last_active.elapsed() >= max_idle)
            .map(|g| g.id.clone())
            .collect();

        for id in stale {
            let Some(group) = inner.groups.get(&id) else {
                continue;
            };
            debug_assert!(
                group.members.is_empty(),
                "stale group {id} still has members"
            );
            if !group.members.is_empty() {
                warn!(group = %id, "skipping sweep of populated group");
                continue;
            }
            inner.groups.remove(&id);
            report.groups_removed += 1;
        }

        if report.groups_removed > 0 || report.files_removed > 0 {
            debug!(
                groups = report.groups_removed,
                files = report.files_removed,
                "stale state swept"
            );
        }
        report
    }

    /// Current members of `group`, if it exists.
    #[must_use]
    pub fn members(&self, group: &str) -> Option<Vec<PeerId>> {
        let inner = self.inner.lock().unwrap();
        inner
            .groups
            .get(group)
            .map(|g| g.members.iter().cloned().collect())
    }

    /// Refresh a group's idle clock (tracker re-announce path).
    pub fn touch_group(&self, group: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(g) = inner.groups.get_mut(group) {
            g.touch();
        }
    }

    /// Number of live groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.inner.lock().unwrap().groups.len()
    }

    /// Number of known peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.inner.lock().unwrap().peers.len()
    }
}

impl Default for SwarmRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
