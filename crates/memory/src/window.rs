//! Budgeted selection over a conversation's stored messages.
//!
//! Shared by every store so windowing behaves identically whether history
//! lives in memory or on disk.

use contextweave_core::message::Message;
use contextweave_core::tokenizer::TokenMeter;

/// Rough per-record token estimate kept on [`MemoryRecord`]s.
///
/// 4 characters per token plus 4 tokens of message framing.
///
/// [`MemoryRecord`]: contextweave_core::memory::MemoryRecord
pub fn approx_tokens(message: &Message) -> usize {
    4 + message.content.len().div_ceil(4)
}

/// Longest suffix of `messages` whose exact cost fits in `budget`.
///
/// A suffix never costs less than a shorter suffix of the same messages,
/// so the fitting lengths form a prefix of `0..=len` and the cut-off is
/// found by binary search. The window stays contiguous, and the result for
/// a larger budget always contains the result for a smaller one.
pub fn recent_window(messages: &[Message], budget: usize, meter: TokenMeter<'_>) -> Vec<Message> {
    let n = messages.len();
    let fits = |len: usize| meter.count(&messages[n - len..]) <= budget;

    let (mut lo, mut hi) = (0, n);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    messages[n - lo..].to_vec()
}

/// Greedy selection of the highest-scoring messages that fit in `budget`.
///
/// `scores[i]` is the relevance of `messages[i]`; a missing or non-finite
/// score counts as 0. Ties rank the more recent message first. The selection is returned in chronological order
/// and its cost is checked over the exact selected set at every step.
pub fn relevant_selection(
    messages: &[Message],
    scores: &[f32],
    budget: usize,
    meter: TokenMeter<'_>,
) -> Vec<Message> {
    let mut ranked: Vec<usize> = (0..messages.len()).collect();
    let score = |i: usize| {
        scores
            .get(i)
            .copied()
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
    };
    ranked.sort_by(|&a, &b| score(b).total_cmp(&score(a)).then(b.cmp(&a)));

    let mut chosen: Vec<usize> = Vec::new();
    for idx in ranked {
        let pos = chosen.partition_point(|&c| c < idx);
        chosen.insert(pos, idx);
        let candidate: Vec<Message> = chosen.iter().map(|&i| messages[i].clone()).collect();
        if meter.count(&candidate) > budget {
            chosen.remove(pos);
        }
    }

    chosen.into_iter().map(|i| messages[i].clone()).collect()
}

/// Keyword relevance: fraction of the query's distinct words found in `text`.
pub fn keyword_score(query: &str, text: &str) -> f32 {
    let text_lower = text.to_lowercase();
    let mut words: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect();
    words.sort();
    words.dedup();

    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| text_lower.contains(w.as_str())).count();
    hits as f32 / words.len() as f32
}
