// Weighted Reciprocal Rank Fusion

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMetadata;
use crate::store::RetrievalHit;
use crate::{Error, Result};

/// RRF rank offset, the usual value from the Cormack et al. paper (SIGIR 2009).
///
/// Larger values flatten the difference between top and lower ranks.
pub const RRF_K: f32 = 60.0;

/// Dense and sparse weights must sum to 1 within this tolerance.
pub const WEIGHT_TOLERANCE: f32 = 0.01;

/// Prior used by the reranker for results that never went through fusion.
pub const NEUTRAL_PRIOR: f32 = 0.5;

/// A chunk ranked by the hybrid retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedResult {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub fused_score: f32,
    /// 1-based rank in the dense list, if the chunk was there
    pub dense_rank: Option<usize>,
    /// 1-based rank in the sparse list, if the chunk was there
    pub sparse_rank: Option<usize>,
}

impl From<RetrievalHit> for FusedResult {
    /// Wrap an unfused hit; its source score is not comparable to fused
    /// scores, so it gets the neutral prior.
    fn from(hit: RetrievalHit) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            content: hit.content,
            metadata: hit.metadata,
            fused_score: NEUTRAL_PRIOR,
            dense_rank: None,
            sparse_rank: None,
        }
    }
}

/// Validated pair of fusion weights.
///
/// Deserialization goes through [`FusionWeights::new`], so a stored pair that
/// does not sum to 1.0 is rejected like any other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights")]
pub struct FusionWeights {
    dense: f32,
    sparse: f32,
}

#[derive(Deserialize)]
struct RawWeights {
    dense: f32,
    sparse: f32,
}

impl TryFrom<RawWeights> for FusionWeights {
    type Error = Error;

    fn try_from(raw: RawWeights) -> Result<Self> {
        Self::new(raw.dense, raw.sparse)
    }
}

impl FusionWeights {
    /// Fails with a configuration error unless `dense + sparse` is 1.0
    /// within [`WEIGHT_TOLERANCE`]. Weights are never renormalized.
    pub fn new(dense: f32, sparse: f32) -> Result<Self> {
        let drift = (dense + sparse - 1.0).abs();
        // written so NaN weights fail too
        if !(drift <= WEIGHT_TOLERANCE) {
            return Err(Error::Configuration(format!(
                "dense_weight + sparse_weight must equal 1.0 (got {dense} + {sparse})"
            )));
        }
        Ok(Self { dense, sparse })
    }

    #[must_use]
    pub fn dense(&self) -> f32 {
        self.dense
    }

    #[must_use]
    pub fn sparse(&self) -> f32 {
        self.sparse
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            dense: 0.7,
            sparse: 0.3,
        }
    }
}

/// Fuse two ranked lists by weighted RRF.
///
/// Each hit at 1-based rank `r` contributes `weight / (RRF_K + r)`. A chunk
/// in both lists sums both contributions and records both ranks. Output is
/// sorted by fused score, descending; ties keep encounter order (dense list
/// first, then sparse-only hits).
#[must_use]
pub fn weighted_rrf(
    dense: &[RetrievalHit],
    sparse: &[RetrievalHit],
    weights: FusionWeights,
) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::with_capacity(dense.len() + sparse.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (rank, hit) in (1..).zip(dense) {
        // a duplicate within one list keeps its best rank
        if positions.contains_key(&hit.chunk_id) {
            continue;
        }
        let partial = weights.dense / (RRF_K + rank as f32);
        positions.insert(hit.chunk_id.clone(), fused.len());
        fused.push(FusedResult {
            dense_rank: Some(rank),
            ..seed(hit, partial)
        });
    }

    for (rank, hit) in (1..).zip(sparse) {
        let partial = weights.sparse / (RRF_K + rank as f32);
        match positions.get(&hit.chunk_id) {
            Some(&i) if fused[i].sparse_rank.is_none() => {
                fused[i].fused_score += partial;
                fused[i].sparse_rank = Some(rank);
            }
            Some(_) => continue,
            None => {
                positions.insert(hit.chunk_id.clone(), fused.len());
                fused.push(FusedResult {
                    sparse_rank: Some(rank),
                    ..seed(hit, partial)
                });
            }
        }
    }

    // stable
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
    });
    fused
}

fn seed(hit: &RetrievalHit, score: f32) -> FusedResult {
    FusedResult {
        chunk_id: hit.chunk_id.clone(),
        content: hit.content.clone(),
        metadata: hit.metadata.clone(),
        fused_score: score,
        dense_rank: None,
        sparse_rank: None,
    }
}
