//! Fence-aware segmentation of streaming message content.
//!
//! A streaming response is recomputed from the full buffer on every call:
//! no persistent parse state, at the cost of an O(n) rescan. Because block
//! boundaries only ever extend as the buffer grows, a block that was once
//! emitted as completed is re-derived byte-identical on every later call,
//! which is what makes downstream render memoization safe.

/// Blank-line separator that delimits blocks outside fenced regions.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Marker that opens and closes a fenced region.
const FENCE_MARKER: &str = "```";

/// Result of segmenting a buffer that is still growing.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StreamingContent {
    /// Blocks that are final and safe to render exactly once.
    pub completed_blocks: Vec<String>,
    /// The suffix not yet known to be block-complete; shown as raw text.
    pub pending: String,
}

/// Split settled content into blocks on blank lines, keeping fenced
/// regions intact even when they contain blank lines themselves.
///
/// Fence balance is tracked by counting `` ``` `` occurrences textually
/// (non-overlapping), including ones inside inline spans. That can
/// misclassify a block containing an inline triple-backtick; preserved as
/// observed behavior.
pub fn split_into_blocks(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut marker_count = 0usize;

    for candidate in text.split(BLOCK_SEPARATOR) {
        if !current.is_empty() {
            current.push_str(BLOCK_SEPARATOR);
        }
        current.push_str(candidate);
        marker_count += candidate.matches(FENCE_MARKER).count();

        // A boundary only commits when every fence seen so far is closed.
        if marker_count % 2 == 0 {
            if !current.trim().is_empty() {
                blocks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            marker_count = 0;
        }
    }

    // An unclosed trailing fence stays attached to whatever follows it.
    if !current.trim().is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Split a still-growing buffer into completed blocks and a pending tail.
pub fn split_streaming_content(text: &str) -> StreamingContent {
    if text.is_empty() {
        return StreamingContent::default();
    }

    let marker_positions: Vec<usize> = text
        .match_indices(FENCE_MARKER)
        .map(|(idx, _)| idx)
        .collect();
    // A separator is only a commit point when every fence opened before it
    // has closed; a separator inside a fence never ends a block, and one
    // would retract or rewrite already-emitted blocks on a later call.
    let balanced_before =
        |pos: usize| marker_positions.partition_point(|&m| m < pos) % 2 == 0;

    let (completed, pending) = if marker_positions.len() % 2 == 1 {
        // Inside an open fence: hold everything from the blank line before
        // the fence onward as pending, so the fence never renders as a
        // half-finished block.
        let fence_start = marker_positions[marker_positions.len() - 1];
        match last_separator_before(text, fence_start, balanced_before) {
            Some(separator) => (&text[..separator], &text[separator..]),
            None => ("", text),
        }
    } else {
        match last_separator_before(text, text.len(), balanced_before) {
            Some(separator) => (
                &text[..separator],
                &text[separator + BLOCK_SEPARATOR.len()..],
            ),
            None => ("", text),
        }
    };

    StreamingContent {
        completed_blocks: split_into_blocks(completed),
        pending: pending.to_string(),
    }
}

/// Rightmost block separator strictly before `limit` whose prefix is a
/// valid commit point.
fn last_separator_before(
    text: &str,
    limit: usize,
    is_commit_point: impl Fn(usize) -> bool,
) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut end = limit;
    while end >= 2 {
        if bytes[end - 2] == b'\n' && bytes[end - 1] == b'\n' && is_commit_point(end - 2) {
            return Some(end - 2);
        }
        end -= 1;
    }
    None
}
