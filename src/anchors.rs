use std::collections::HashMap;

use crate::access::DocumentAccess;
use crate::model::{Anchor, AnchorKind};

/// Set of valid reference targets, keyed case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct AnchorIndex {
    anchors: HashMap<String, Anchor>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl AnchorIndex {
    /// Scans bookmark starts and, when `text_anchors` is set, heading and
    /// emphasised text. Must complete before any reference is classified.
    pub fn build(doc: &dyn DocumentAccess, text_anchors: bool) -> Self {
        let mut index = Self::default();
        for bm in doc.bookmarks() {
            index.insert(Anchor {
                name: bm.name,
                kind: AnchorKind::Bookmark,
                location: bm.location,
            });
        }
        if text_anchors {
            let mut informal = doc.text_anchors();
            // headings win over plain emphasis when both carry the same text
            informal.sort_by_key(|a| a.kind != AnchorKind::Heading);
            for anchor in informal {
                index.insert(anchor);
            }
        }
        index
    }

    /// Inserts unless the key is already present; duplicates are harmless no-ops.
    pub fn insert(&mut self, anchor: Anchor) -> bool {
        let k = key(&anchor.name);
        if k.is_empty() || self.anchors.contains_key(&k) {
            return false;
        }
        self.anchors.insert(k, anchor);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Anchor> {
        self.anchors.get(&key(name))
    }

    /// Forgets a deleted bookmark. Informal anchors sharing the key are kept.
    pub fn remove_bookmark(&mut self, name: &str) -> Option<Anchor> {
        let k = key(name);
        match self.anchors.get(&k) {
            Some(a) if a.kind == AnchorKind::Bookmark => self.anchors.remove(&k),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn count_of(&self, kind: AnchorKind) -> usize {
        self.anchors.values().filter(|a| a.kind == kind).count()
    }
}
