pub mod block_cache;
pub mod segmenter;

pub use block_cache::{ContentCacheKey, SegmentCache, SegmentedMessage};
pub use segmenter::{StreamingContent, split_into_blocks, split_streaming_content};
