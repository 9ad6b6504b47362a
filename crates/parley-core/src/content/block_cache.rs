use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use super::segmenter::{split_into_blocks, split_streaming_content};

/// A content hash used as cache key, computed from message content plus
/// whether the message is still streaming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentCacheKey(u64);

impl ContentCacheKey {
    pub fn new(content: &str, streaming: bool) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        streaming.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Segmentation result handed to a renderer: completed blocks are shared
/// pointers that stay identical across recomputations, so a renderer can
/// memoize per block without comparing content.
#[derive(Clone, Debug)]
pub struct SegmentedMessage {
    pub completed_blocks: Vec<Arc<str>>,
    pub pending: String,
}

/// Cache for segmented message content.
///
/// Completed blocks are interned by (block index, content hash) rather
/// than by object identity: a growing buffer re-derives the same prefix of
/// blocks, and this keying hands back the same `Arc` for each of them. A
/// whole-result memo keyed by content keeps repeated renders of unchanged
/// content referentially stable.
pub struct SegmentCache {
    results: HashMap<ContentCacheKey, SegmentedMessage>,
    blocks: HashMap<(usize, u64), Arc<str>>,
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentCache {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    /// Segment message content. While `streaming` is true the tail past
    /// the last committed boundary is returned as `pending`; settled
    /// messages are fully committed with an empty pending tail.
    pub fn segment(&mut self, content: &str, streaming: bool) -> SegmentedMessage {
        let key = ContentCacheKey::new(content, streaming);
        if let Some(cached) = self.results.get(&key) {
            return cached.clone();
        }

        let (raw_blocks, pending) = if streaming {
            let split = split_streaming_content(content);
            (split.completed_blocks, split.pending)
        } else {
            (split_into_blocks(content), String::new())
        };

        let completed_blocks = raw_blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| self.intern(index, block))
            .collect();

        let result = SegmentedMessage {
            completed_blocks,
            pending,
        };
        self.results.insert(key, result.clone());
        result
    }

    fn intern(&mut self, index: usize, block: String) -> Arc<str> {
        let mut hasher = DefaultHasher::new();
        block.hash(&mut hasher);
        let key = (index, hasher.finish());
        self.blocks
            .entry(key)
            .or_insert_with(|| Arc::from(block.as_str()))
            .clone()
    }

    /// Clear the entire cache (e.g. on conversation switch).
    pub fn clear(&mut self) {
        self.results.clear();
        self.blocks.clear();
    }
}
