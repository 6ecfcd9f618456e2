/// Task partitioning helpers used to chunk work before scatter/gather
/// (§4.1). These are pure functions over slices — the executor decides
/// *whether* to go parallel; these decide how to slice the work once it
/// does.

/// Split `items` into chunks of at most `chunk_size` each, preserving order.
pub fn partition_by_size<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Split `items` into exactly `n` chunks (fewer if `items` is shorter),
/// spreading the remainder over the first `len % n` chunks so no chunk
/// differs from another by more than one element.
pub fn partition_by_count<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 || items.is_empty() {
        return Vec::new();
    }
    let n = n.min(items.len());
    let base = items.len() / n;
    let remainder = items.len() % n;

    let mut out = Vec::with_capacity(n);
    let mut start = 0usize;
    for i in 0..n {
        let extra = if i < remainder { 1 } else { 0 };
        let end = start + base + extra;
        out.push(items[start..end].to_vec());
        start = end;
    }
    out
}

/// Partition targeting roughly `2 * n_workers` chunks, to amortise tail
/// effects (a straggler chunk delays the whole gather less when chunks are
/// smaller and more numerous than the worker count).
pub fn auto_partition<T: Clone>(items: &[T], n_workers: usize) -> Vec<Vec<T>> {
    let target_chunks = (n_workers.max(1) * 2).min(items.len().max(1));
    partition_by_count(items, target_chunks)
}

/// Split row indices `0..n_rows` by row, for DataFrame-shaped partitioning.
pub fn partition_rows_by_count(n_rows: usize, n: usize) -> Vec<std::ops::Range<usize>> {
    let indices: Vec<usize> = (0..n_rows).collect();
    partition_by_count(&indices, n)
        .into_iter()
        .filter_map(|chunk| {
            let start = *chunk.first()?;
            let end = *chunk.last()? + 1;
            Some(start..end)
        })
        .collect()
}
