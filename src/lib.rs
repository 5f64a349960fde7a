//! Sample/signature activity aggregation and statistical-enrichment engine.
//!
//! This library is the data-side core of a gene-expression exploration
//! front end: users select biological samples, group them, and view
//! clustered heatmaps, volcano plots and gene-set enrichment computed from
//! precomputed signature-activity values. Rendering, routing and transport
//! are external collaborators reached through the narrow interfaces in
//! [`fetch`].
//!
//! # Overview
//!
//! The engine is organized into small, independently testable modules:
//!
//! - **data**: Core identifiers and record types
//! - **stats**: Means, t-test, hypergeometric tail, BH correction
//! - **cache**: Session-scoped entity caches with fetch coalescing
//! - **selection**: The working set of selected samples and its ordering
//! - **fetch**: Collaborator traits (sources and the clustering routine)
//! - **aggregate**: Activity refetch/reshape for the heatmap
//! - **cluster**: Sample/signature record reshaping for clustering
//! - **volcano**: Differential activity between two sample groups
//! - **enrich**: Hypergeometric enrichment per participation type
//! - **session**: The session context and orchestration surface
//!
//! # Example
//!
//! ```no_run
//! use signature_analysis::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo(sources: SourceSet, clusterer: Arc<dyn Clusterer>) {
//! let session = AnalysisSession::new(sources, clusterer);
//! session.set_model(ModelId(3));
//! session.add_samples(&[SampleId(1), SampleId(2), SampleId(3)]);
//! session.set_group(SampleId(1), GroupLabel::Base);
//! session.set_group(SampleId(2), GroupLabel::Comp);
//! session.refresh_for_model(None).await;
//! session.compute_volcano().await.unwrap();
//! # }
//! ```

pub mod aggregate;
pub mod cache;
pub mod cluster;
pub mod data;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod selection;
pub mod session;
pub mod stats;
pub mod volcano;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::cache::EntityCache;
    pub use crate::cluster::{
        apply_cluster_order, sample_records, signature_records, ClusterTarget, SampleRecord,
        SignatureRecord,
    };
    pub use crate::data::{
        ActivityEntry, EnrichedSignature, GeneId, GroupLabel, HeatmapData, ModelId,
        ParticipationRecord, SampleDetail, SampleId, SignatureDetail, SignatureId, VolcanoPoint,
    };
    pub use crate::enrich::{compute_enrichment, EnrichmentAnalysis, EnrichmentReport};
    pub use crate::error::{AnalysisError, Result};
    pub use crate::fetch::{
        ActivityQuery, ActivitySource, ClusterConfig, ClusterRecord, Clusterer, Distance,
        GeneSource, Linkage, ParticipationSource, SampleSource, SignatureSource,
    };
    pub use crate::selection::{Removal, SampleSelection};
    pub use crate::session::{AnalysisContext, AnalysisSession, SourceSet};
    pub use crate::stats::{
        bh_adjust, hypergeometric_enrichment, mean, round_sig, two_sample_t_test, TTest,
    };
    pub use crate::volcano::VolcanoOutcome;
}
