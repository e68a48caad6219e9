use std::cmp::Ordering;
use std::path::Path;

use crate::error::SnapshotError;

const MAGIC: &[u8; 4] = b"KGIX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

/// Append-only exact inner-product index over fixed-length vectors.
/// Row `i` is the `i`-th vector added.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<usize, SnapshotError> {
        self.check_dim(vector)?;
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// The `k` best rows by inner product, highest first. Equal scores keep
    /// row order so results are reproducible.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, SnapshotError> {
        self.check_dim(query)?;

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, vector)| SearchHit {
                row,
                score: vector.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.row.cmp(&b.row))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Little-endian blob: magic, version, dimension, row count, then rows.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err("not a vector index file".to_string());
        }

        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let version = word(4);
        if version != VERSION {
            return Err(format!("unsupported index version {}", version));
        }
        let dim = word(8) as usize;
        let mut rows_bytes = [0u8; 8];
        rows_bytes.copy_from_slice(&bytes[12..20]);
        let rows = u64::from_le_bytes(rows_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| "row count overflows".to_string())?;
        if body.len() != expected {
            return Err(format!(
                "expected {} bytes of vectors for {} rows of dimension {}, found {}",
                expected,
                rows,
                dim,
                body.len()
            ));
        }

        let data = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self { dim, data })
    }

    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, self.to_bytes())
            .await
            .map_err(|e| SnapshotError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| SnapshotError::io(path, e))
    }

    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::MissingIndex(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SnapshotError::io(path, e))?;
        Self::from_bytes(&bytes).map_err(|reason| SnapshotError::corrupt(path, reason))
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), SnapshotError> {
        if vector.len() != self.dim || self.dim == 0 {
            return Err(SnapshotError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        Ok(())
    }
}
