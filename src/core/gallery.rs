//! Gallery: a bounded ring of completed artifacts for later reuse.
//!
//! Independent of undo/redo by design — undoing a structural edit must not
//! erase the record of what was generated. Oldest entries are evicted past
//! the capacity bound.

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::MAX_GALLERY_SIZE;
use crate::entities::{Artifact, CacheKey, NodeId, NodeType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub node: NodeId,
    pub kind: NodeType,
    pub artifact: Artifact,
    pub produced_at: SystemTime,
    /// Key the artifact was produced under; lets hosts re-attach a gallery
    /// artifact to an identical lineage without regenerating.
    pub cache_key: CacheKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
    capacity: usize,
}

impl Default for Gallery {
    fn default() -> Self {
        Self::with_capacity(MAX_GALLERY_SIZE)
    }
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.max(1) }
    }

    pub fn record(&mut self, entry: GalleryEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, newest first.
    pub fn latest(&self, n: usize) -> Vec<&GalleryEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: u64) -> GalleryEntry {
        GalleryEntry {
            node: NodeId(i),
            kind: NodeType::Renderer,
            artifact: Artifact::image(format!("gen://img/{i}")),
            produced_at: SystemTime::now(),
            cache_key: CacheKey::from_raw(format!("{i:016x}")),
        }
    }

    #[test]
    fn test_record_and_latest() {
        let mut gallery = Gallery::with_capacity(10);
        for i in 0..3 {
            gallery.record(entry(i));
        }
        assert_eq!(gallery.len(), 3);
        let latest = gallery.latest(2);
        assert_eq!(latest[0].node, NodeId(2));
        assert_eq!(latest[1].node, NodeId(1));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut gallery = Gallery::with_capacity(4);
        for i in 0..6 {
            gallery.record(entry(i));
        }
        assert_eq!(gallery.len(), 4);
        let oldest = gallery.iter().next().unwrap();
        assert_eq!(oldest.node, NodeId(2));
    }
}
