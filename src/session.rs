//! Analysis-session context and orchestration.
//!
//! [`AnalysisContext`] is the explicit, session-owned home of all state the
//! engine mutates: the sample selection, the three entity caches, and the
//! derived output slots. [`AnalysisSession`] wires the context to the
//! collaborator sources and exposes the operation surface the UI drives.

use crate::aggregate;
use crate::cache::{lock_unpoisoned, EntityCache};
use crate::cluster::{self, ClusterTarget};
use crate::data::{
    ActivityEntry, HeatmapData, ModelId, SampleDetail, SampleId, SignatureDetail, SignatureId,
    VolcanoPoint,
};
use crate::error::Result;
use crate::fetch::{
    ActivitySource, ClusterConfig, Clusterer, SampleSource, SignatureSource,
};
use crate::selection::{Removal, SampleSelection};
use crate::volcano::{self, VolcanoOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};

/// All mutable state of one analysis session.
///
/// State lives behind plain mutexes that are never held across a
/// suspension point; async coordination (fetch coalescing, the rebuild
/// barrier) is layered on top in the cache and aggregator.
pub struct AnalysisContext {
    model: Mutex<Option<ModelId>>,
    selection: Mutex<SampleSelection>,
    /// SampleId -> sample detail record.
    pub samples: EntityCache<SampleId, SampleDetail>,
    /// SampleId -> per-sample activity vector (signature-ascending).
    pub activity: EntityCache<SampleId, Vec<ActivityEntry>>,
    /// SignatureId -> signature detail record.
    pub signatures: EntityCache<SignatureId, SignatureDetail>,
    heatmap: Mutex<HeatmapData>,
    volcano: Mutex<Vec<VolcanoPoint>>,
    rebuild_generation: AtomicU64,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
            selection: Mutex::new(SampleSelection::new()),
            samples: EntityCache::new(),
            activity: EntityCache::new(),
            signatures: EntityCache::new(),
            heatmap: Mutex::new(HeatmapData::default()),
            volcano: Mutex::new(Vec::new()),
            rebuild_generation: AtomicU64::new(0),
        }
    }

    pub fn model(&self) -> Option<ModelId> {
        *lock_unpoisoned(&self.model)
    }

    pub fn set_model(&self, model: ModelId) {
        *lock_unpoisoned(&self.model) = Some(model);
    }

    /// Exclusive access to the selection. Callers must not hold the guard
    /// across an await.
    pub fn selection(&self) -> MutexGuard<'_, SampleSelection> {
        lock_unpoisoned(&self.selection)
    }

    /// Snapshot of the flattened heatmap activity.
    pub fn heatmap(&self) -> HeatmapData {
        lock_unpoisoned(&self.heatmap).clone()
    }

    pub(crate) fn set_heatmap(&self, data: HeatmapData) {
        *lock_unpoisoned(&self.heatmap) = data;
    }

    /// Snapshot of the volcano-plot source array.
    pub fn volcano(&self) -> Vec<VolcanoPoint> {
        lock_unpoisoned(&self.volcano).clone()
    }

    pub(crate) fn set_volcano(&self, points: Vec<VolcanoPoint>) {
        *lock_unpoisoned(&self.volcano) = points;
    }

    /// Claim a new rebuild generation.
    pub(crate) fn begin_rebuild(&self) -> u64 {
        self.rebuild_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Is `generation` still the most recently claimed rebuild?
    pub(crate) fn is_current_rebuild(&self, generation: u64) -> bool {
        self.rebuild_generation.load(Ordering::SeqCst) == generation
    }
}

/// Resolve detail records for `ids`, bulk-fetching only the uncached
/// subset and populating the cache with what comes back. The returned
/// order is the union of cached + fetched and is not guaranteed to match
/// the input.
pub async fn resolve_signature_set(
    cache: &EntityCache<SignatureId, SignatureDetail>,
    source: &dyn SignatureSource,
    ids: &[SignatureId],
) -> Result<Vec<SignatureDetail>> {
    let mut resolved = Vec::with_capacity(ids.len());
    let mut uncached = Vec::new();
    for &id in ids {
        match cache.get(&id) {
            Some(detail) => resolved.push(detail),
            None => uncached.push(id),
        }
    }
    if uncached.is_empty() {
        return Ok(resolved);
    }

    let fetched = source.signature_set(&uncached).await.map_err(|err| {
        error!(%err, requested = uncached.len(), "signature set fetch failed");
        err
    })?;
    for detail in fetched {
        cache.put(detail.id, detail.clone());
        resolved.push(detail);
    }
    Ok(resolved)
}

/// The collaborator sources a session fetches through.
#[derive(Clone)]
pub struct SourceSet {
    pub samples: Arc<dyn SampleSource>,
    pub signatures: Arc<dyn SignatureSource>,
    pub activity: Arc<dyn ActivitySource>,
}

/// One user-facing analysis session: context, sources, and the external
/// clustering routine.
pub struct AnalysisSession {
    ctx: Arc<AnalysisContext>,
    sources: SourceSet,
    clusterer: Arc<dyn Clusterer>,
    cluster_config: ClusterConfig,
}

impl AnalysisSession {
    pub fn new(sources: SourceSet, clusterer: Arc<dyn Clusterer>) -> Self {
        Self {
            ctx: Arc::new(AnalysisContext::new()),
            sources,
            clusterer,
            cluster_config: ClusterConfig::default(),
        }
    }

    /// The session's state, e.g. for rendering-sink consumers.
    pub fn ctx(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub fn set_model(&self, model: ModelId) {
        self.ctx.set_model(model);
    }

    /// Add a sample to the working selection. Activity is not fetched
    /// here; the next refresh picks it up.
    pub fn add_sample(&self, id: SampleId) {
        self.ctx.selection().add(id);
    }

    /// Add every sample of an experiment, preserving input order.
    pub fn add_samples(&self, ids: &[SampleId]) {
        self.ctx.selection().add_bulk(ids);
    }

    pub fn has_sample(&self, id: SampleId) -> bool {
        self.ctx.selection().contains(id)
    }

    /// Are all of `ids` already selected (composite search items)?
    pub fn has_all(&self, ids: &[SampleId]) -> bool {
        self.ctx.selection().contains_all(ids)
    }

    pub fn sample_count(&self) -> usize {
        self.ctx.selection().len()
    }

    pub fn set_group(&self, id: SampleId, label: crate::data::GroupLabel) {
        self.ctx.selection().set_group(id, label);
    }

    /// Remove a sample; removing a with-activity member rebuilds the
    /// derived activity for the remaining membership.
    pub async fn remove_sample(&self, id: SampleId) {
        let (removal, remaining) = {
            let mut selection = self.ctx.selection();
            (selection.remove(id), selection.samples().to_vec())
        };
        if removal == Removal::WithActivity {
            aggregate::rebuild(
                &self.ctx,
                &*self.sources.activity,
                self.ctx.model(),
                remaining,
            )
            .await;
        }
    }

    /// Clear the working selection and the derived activity. No fetch is
    /// issued for the empty membership.
    pub async fn clear_samples(&self) {
        self.ctx.selection().clear();
        aggregate::rebuild(&self.ctx, &*self.sources.activity, self.ctx.model(), Vec::new()).await;
    }

    pub fn clear_missing(&self) {
        self.ctx.selection().clear_missing();
    }

    /// Refetch/reshape activity for the current selection. Defaults to the
    /// last-used model; a no-op (with a warning) if neither is available.
    pub async fn refresh_for_model(&self, model: Option<ModelId>) {
        let model = match model.or_else(|| self.ctx.model()) {
            Some(model) => model,
            None => {
                warn!("refresh requested before a model was chosen");
                return;
            }
        };
        self.ctx.set_model(model);
        let samples = self.ctx.selection().samples().to_vec();
        aggregate::rebuild(&self.ctx, &*self.sources.activity, Some(model), samples).await;
    }

    /// Fetch (and cache) a sample's detail record. Concurrent calls for
    /// the same id coalesce to one dispatch.
    pub async fn fetch_sample_detail(&self, id: SampleId) -> Result<SampleDetail> {
        if let Some(detail) = self.ctx.samples.get(&id) {
            return Ok(detail);
        }
        let _guard = self.ctx.samples.begin_fetch(&id).await;
        if let Some(detail) = self.ctx.samples.get(&id) {
            return Ok(detail);
        }
        match self.sources.samples.sample(id).await {
            Ok(detail) => {
                self.ctx.samples.put(id, detail.clone());
                Ok(detail)
            }
            Err(err) => {
                error!(sample = %id, %err, "sample detail fetch failed");
                Err(err)
            }
        }
    }

    /// Fetch (and cache) one signature's detail record, coalesced.
    pub async fn signature(&self, id: SignatureId) -> Result<SignatureDetail> {
        if let Some(detail) = self.ctx.signatures.get(&id) {
            return Ok(detail);
        }
        let _guard = self.ctx.signatures.begin_fetch(&id).await;
        if let Some(detail) = self.ctx.signatures.get(&id) {
            return Ok(detail);
        }
        match self.sources.signatures.signature(id).await {
            Ok(detail) => {
                self.ctx.signatures.put(id, detail.clone());
                Ok(detail)
            }
            Err(err) => {
                error!(signature = %id, %err, "signature fetch failed");
                Err(err)
            }
        }
    }

    /// Resolve many signatures at once through the cache-fallback bulk
    /// fetch.
    pub async fn signature_set(&self, ids: &[SignatureId]) -> Result<Vec<SignatureDetail>> {
        resolve_signature_set(&self.ctx.signatures, &*self.sources.signatures, ids).await
    }

    /// Reorder heatmap rows by hierarchically clustering the samples.
    pub async fn cluster_samples(&self) {
        cluster::cluster_and_apply(
            &self.ctx,
            &*self.clusterer,
            &self.cluster_config,
            ClusterTarget::Samples,
        )
        .await;
    }

    /// Reorder heatmap columns by hierarchically clustering the
    /// signatures.
    pub async fn cluster_signatures(&self) {
        cluster::cluster_and_apply(
            &self.ctx,
            &*self.clusterer,
            &self.cluster_config,
            ClusterTarget::Signatures,
        )
        .await;
    }

    /// Compute the volcano-plot source for the base/comp group split.
    pub async fn compute_volcano(&self) -> Result<VolcanoOutcome> {
        volcano::compute(&self.ctx, &*self.sources.signatures).await
    }
}
