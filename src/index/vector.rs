//! In-memory flat vector index with cosine (inner product) search.
//!
//! Embeddings are L2-normalized on insert so inner-product ranking
//! approximates cosine similarity. Row *i* of the index always
//! corresponds to `passages[i]`; every mutation path keeps that
//! alignment or rolls back entirely.
//!
//! A snapshot is two linked artifacts under the persist directory:
//! `index.bin` (binary embedding matrix) and `passages.json` (ordered
//! passage records). Both must be present to load.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::Embedder;

use super::Passage;

const INDEX_FILE: &str = "index.bin";
const PASSAGES_FILE: &str = "passages.json";

/// Dense vector store over an ordered passage corpus.
pub struct EmbeddingIndex {
    dimension: usize,
    rows: Vec<Vec<f32>>,
    passages: Vec<Passage>,
    persist_path: Option<PathBuf>,
}

impl EmbeddingIndex {
    /// Create an empty, non-persisted index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            passages: Vec::new(),
            persist_path: None,
        }
    }

    /// Create an empty index that persists under `path`.
    pub fn with_persist(dimension: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            persist_path: Some(path.into()),
            ..Self::new(dimension)
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    /// Ordered `doc_name` sequence, one entry per passage.
    pub fn doc_names(&self) -> Vec<&str> {
        self.passages.iter().map(Passage::doc_name).collect()
    }

    /// Embed and append passages, keeping row/passage alignment.
    ///
    /// All embeddings are computed and validated before anything is
    /// appended, so a failing embed call leaves the index untouched.
    /// No-op on empty input.
    pub async fn add(&mut self, passages: Vec<Passage>, embedder: &Arc<dyn Embedder>) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let mut embeddings = embedder.encode(&texts).await?;

        if embeddings.len() != passages.len() {
            return Err(Error::EmbeddingError(format!(
                "embedder returned {} vectors for {} passages",
                embeddings.len(),
                passages.len()
            )));
        }
        for embedding in &mut embeddings {
            if embedding.len() != self.dimension {
                return Err(Error::EmbeddingError(format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    embedding.len()
                )));
            }
            l2_normalize(embedding);
        }

        debug!("Adding {} passages to vector index", passages.len());
        self.rows.extend(embeddings);
        self.passages.extend(passages);
        Ok(())
    }

    /// Top-k passages by descending inner product with the query
    /// embedding. Returns fewer than `top_k` on a small corpus and an
    /// empty vec on an empty corpus. Ties keep insertion order.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        embedder: &Arc<dyn Embedder>,
    ) -> Result<Vec<Passage>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query_embedding = embedder
            .encode(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingError("no embedding returned for query".to_string()))?;
        l2_normalize(&mut query_embedding);

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, dot(&query_embedding, row)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, _)| self.passages[i].clone())
            .collect())
    }

    /// Write the snapshot artifacts to the configured persist path.
    pub fn save(&self) -> Result<()> {
        let dir = self
            .persist_path
            .as_ref()
            .ok_or(Error::MissingPersistPath)?;
        std::fs::create_dir_all(dir)?;

        let index_path = dir.join(INDEX_FILE);
        let mut writer = BufWriter::new(std::fs::File::create(&index_path)?);
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&(self.rows.len() as u32).to_le_bytes())?;
        for row in &self.rows {
            for value in row {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;

        let passages_path = dir.join(PASSAGES_FILE);
        let file = std::fs::File::create(&passages_path)?;
        serde_json::to_writer(BufWriter::new(file), &self.passages)?;

        info!(
            "Saved {} passages to snapshot at {}",
            self.passages.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load the snapshot if both artifacts exist; otherwise the index
    /// stays empty (missing or unreadable snapshots are not errors).
    pub fn load(&mut self) -> Result<()> {
        let Some(dir) = self.persist_path.clone() else {
            return Err(Error::MissingPersistPath);
        };
        let index_path = dir.join(INDEX_FILE);
        let passages_path = dir.join(PASSAGES_FILE);

        if !index_path.exists() || !passages_path.exists() {
            info!(
                "No snapshot at {}, starting with an empty index",
                dir.display()
            );
            return Ok(());
        }

        match self.read_snapshot(&index_path, &passages_path) {
            Ok((rows, passages)) => {
                info!(
                    "Loaded {} passages from snapshot at {}",
                    passages.len(),
                    dir.display()
                );
                self.rows = rows;
                self.passages = passages;
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Snapshot at {} is unreadable ({}), starting empty",
                    dir.display(),
                    err
                );
                Ok(())
            }
        }
    }

    fn read_snapshot(
        &self,
        index_path: &Path,
        passages_path: &Path,
    ) -> Result<(Vec<Vec<f32>>, Vec<Passage>)> {
        let mut reader = BufReader::new(std::fs::File::open(index_path)?);
        let mut u32_buf = [0u8; 4];
        reader.read_exact(&mut u32_buf)?;
        let dimension = u32::from_le_bytes(u32_buf) as usize;
        reader.read_exact(&mut u32_buf)?;
        let count = u32::from_le_bytes(u32_buf) as usize;

        if dimension != self.dimension {
            return Err(Error::SerializationError(format!(
                "snapshot dimension {} does not match index dimension {}",
                dimension, self.dimension
            )));
        }

        let mut rows = Vec::with_capacity(count);
        let mut f32_buf = [0u8; 4];
        for _ in 0..count {
            let mut row = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                reader.read_exact(&mut f32_buf)?;
                row.push(f32::from_le_bytes(f32_buf));
            }
            rows.push(row);
        }

        let file = std::fs::File::open(passages_path)?;
        let passages: Vec<Passage> = serde_json::from_reader(BufReader::new(file))?;

        if passages.len() != rows.len() {
            return Err(Error::SerializationError(format!(
                "snapshot misaligned: {} rows vs {} passages",
                rows.len(),
                passages.len()
            )));
        }

        Ok((rows, passages))
    }

    /// Drop all in-memory state and delete the snapshot directory.
    pub fn clear(&mut self) -> Result<()> {
        self.rows.clear();
        self.passages.clear();
        if let Some(dir) = &self.persist_path {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

/// Scale a vector to unit length; the zero vector stays zero.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity over raw (not necessarily normalized) vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}
