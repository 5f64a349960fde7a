//! Collaborator interfaces the engine fetches through.
//!
//! The engine owns no wire protocol; these traits capture only the
//! request/response shapes it consumes. Implementations are expected to
//! map transport failures to [`AnalysisError::Network`] and absent
//! entities to [`AnalysisError::NotFound`].

use crate::data::{
    ActivityEntry, GeneId, ModelId, ParticipationRecord, SampleDetail, SampleId, SignatureDetail,
    SignatureId,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Query for one sample's activity vector under one model.
///
/// The response is ordered by signature id ascending (server-guaranteed),
/// one entry per signature in the trained model. An empty response means
/// "no activity for this sample under this model" and is a valid,
/// non-error outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub model: ModelId,
    pub sample: SampleId,
}

#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn sample(&self, id: SampleId) -> Result<SampleDetail>;
}

#[async_trait]
pub trait SignatureSource: Send + Sync {
    async fn signature(&self, id: SignatureId) -> Result<SignatureDetail>;

    /// Bulk fetch. The response order is not guaranteed to match the input.
    async fn signature_set(&self, ids: &[SignatureId]) -> Result<Vec<SignatureDetail>>;
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn activity(&self, query: ActivityQuery) -> Result<Vec<ActivityEntry>>;
}

#[async_trait]
pub trait ParticipationSource: Send + Sync {
    /// All participation records linking the model's signatures to the
    /// given genes, in one unbounded request.
    async fn participations(
        &self,
        model: ModelId,
        genes: &[GeneId],
    ) -> Result<Vec<ParticipationRecord>>;
}

#[async_trait]
pub trait GeneSource: Send + Sync {
    /// Total number of genes in the universe (used as N for enrichment).
    async fn total_gene_count(&self) -> Result<u64>;
}

/// Distance metric for hierarchical clustering. Policy is fixed; the enum
/// exists so the collaborator contract is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Euclidean,
}

/// Linkage criterion for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    Average,
}

/// Parameters handed to the external clustering routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub distance: Distance,
    pub linkage: Linkage,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            distance: Distance::Euclidean,
            linkage: Linkage::Average,
        }
    }
}

/// One entity (sample or signature) as seen by the clustering routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: i64,
    pub activity: Vec<f64>,
}

/// External hierarchical-clustering routine: consumes records, returns the
/// input ids in dendrogram leaf order.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, records: &[ClusterRecord], config: &ClusterConfig) -> Vec<i64>;
}
