use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;

use crate::refinement::key::RefinementKey;

/// Synthesized previews by key. Append-only for one scan; reset wholesale on scan change.
#[derive(Clone, Debug, Default)]
pub struct RefinementCache {
    entries: HashMap<RefinementKey, Arc<RgbaImage>>,
}

impl RefinementCache {
    /// Store `image` under `key` unless the key is already present. Returns `true` if stored.
    pub fn insert(&mut self, key: RefinementKey, image: Arc<RgbaImage>) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, image);
        true
    }

    /// Cached image for `key`.
    pub fn get(&self, key: RefinementKey) -> Option<&Arc<RgbaImage>> {
        self.entries.get(&key)
    }

    /// Number of cached images.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything (new scan).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
