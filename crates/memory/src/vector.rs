//! Vector similarity for relevance-ranked history reads.

use contextweave_core::memory::MemoryRecord;

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// Mismatched lengths, empty inputs, zero vectors and non-finite
/// components score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (f64::from(x), f64::from(y)))
        .fold((0.0, 0.0, 0.0), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });

    let magnitude = (sq_a * sq_b).sqrt();
    let cosine = dot / magnitude;
    if magnitude < 1e-10 || !cosine.is_finite() {
        0.0
    } else {
        cosine as f32
    }
}

/// Similarity of every record to the query embedding, in record order.
/// Records without an embedding score 0.
pub fn embedding_scores(records: &[MemoryRecord], query_embedding: &[f32]) -> Vec<f32> {
    records
        .iter()
        .map(|r| {
            r.embedding
                .as_deref()
                .map(|e| cosine_similarity(e, query_embedding))
                .unwrap_or(0.0)
        })
        .collect()
}
