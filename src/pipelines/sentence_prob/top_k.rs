/// Returns the `min(k, distribution.len())` highest-probability entries of a
/// distribution as `(token_id, probability)` pairs, strictly descending by
/// probability with ties broken by ascending token id.
///
/// Pure read-only helper for tracing which tokens the model favored at a
/// masked position; it never influences a sentence score.
pub fn top_k(distribution: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexes: Vec<usize> = (0..distribution.len()).collect();
    indexes.sort_unstable_by(|&a, &b| {
        distribution[b]
            .total_cmp(&distribution[a])
            .then_with(|| a.cmp(&b))
    });
    indexes.truncate(k.min(distribution.len()));
    indexes
        .into_iter()
        .map(|i| (i as u32, distribution[i]))
        .collect()
}
