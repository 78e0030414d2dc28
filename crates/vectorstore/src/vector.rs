//! Vector similarity utilities shared by the local backends.

use ragweave_core::Document;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ, either vector is empty, or either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank documents by cosine similarity to `query`, most similar first,
/// and return the texts of the best `top_k`.
///
/// The sort is stable: documents with equal similarity keep their
/// insertion order.
pub fn rank_documents(documents: &[Document], query: &[f32], top_k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &Document)> = documents
        .iter()
        .map(|doc| (cosine_similarity(&doc.embedding, query), doc))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored.into_iter().map(|(_, d)| d.text.clone()).collect()
}

/// Serialize an embedding vector to little-endian bytes.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_blob`]. Trailing partial chunks are ignored.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
