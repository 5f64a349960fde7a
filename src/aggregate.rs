//! Keeps the activity cache and the derived heatmap activity consistent
//! with the current sample selection.

use crate::data::{HeatmapData, ModelId, SampleId};
use crate::fetch::{ActivityQuery, ActivitySource};
use crate::session::AnalysisContext;
use futures::future::join_all;
use tracing::{debug, error, info};

/// Refetch and reshape activity for `samples` under `model`.
///
/// Semantics:
/// - No-op (log only) when `model` is `None`; a model must be chosen
///   before any activity can be fetched.
/// - Dispatches one fetch per sample not already in the activity cache, in
///   input order; completions populate the cache as they settle. A sample
///   whose response is empty is left uncached and surfaces as a
///   missing-activity exclusion during reconciliation.
/// - Reconciliation (exclude missing members, build the flattened
///   activity, initialize the signature order from the first cached
///   vector) runs only after every dispatched fetch has settled, and only
///   if no fetch failed. On any failure the batch is logged and abandoned;
///   cache entries from the successful fetches are kept.
///
/// Overlapping rebuilds are serialized by a generation counter: a rebuild
/// whose generation is no longer current when its fetches settle discards
/// its reconciliation instead of clobbering the newer call's output.
///
/// Failures never propagate to the caller; the selection and output slots
/// are always left consistent.
pub async fn rebuild(
    ctx: &AnalysisContext,
    source: &dyn ActivitySource,
    model: Option<ModelId>,
    samples: Vec<SampleId>,
) {
    let Some(model) = model else {
        info!("rebuild skipped: no model selected");
        return;
    };
    let generation = ctx.begin_rebuild();

    let uncached: Vec<SampleId> = samples
        .iter()
        .copied()
        .filter(|id| !ctx.activity.contains(id))
        .collect();
    for id in &uncached {
        debug!(sample = %id, "activity cache miss");
    }

    let fetches = uncached.iter().map(|&sample| async move {
        // single-flight per key: an overlapping rebuild already fetching
        // this sample wins, and we take its cached result instead
        let _guard = ctx.activity.begin_fetch(&sample).await;
        if ctx.activity.contains(&sample) {
            return true;
        }
        match source.activity(ActivityQuery { model, sample }).await {
            Ok(entries) if !entries.is_empty() => {
                // key by the id the server reported, as with the original
                // response envelope
                let key = entries[0].sample;
                debug!(sample = %key, signatures = entries.len(), "populating activity cache");
                ctx.activity.put(key, entries);
                true
            }
            // empty response: valid "no activity" outcome, left uncached
            // and detected at reconciliation
            Ok(_) => true,
            Err(err) => {
                error!(sample = %sample, %err, "activity fetch failed");
                false
            }
        }
    });
    let settled = join_all(fetches).await;
    let failures = settled.iter().filter(|ok| !**ok).count();

    if !ctx.is_current_rebuild(generation) {
        debug!(generation, "discarding stale rebuild completion");
        return;
    }
    if failures > 0 {
        error!(failures, "rebuild aborted: activity fetches failed");
        return;
    }

    let mut flattened = Vec::new();
    let mut excluded = Vec::new();
    {
        let mut selection = ctx.selection();
        for &sample in &samples {
            match ctx.activity.get(&sample) {
                Some(entries) if !entries.is_empty() => {
                    if selection.signature_order().is_empty() {
                        // first cached vector sets the canonical column order
                        selection
                            .set_signature_order(entries.iter().map(|e| e.signature).collect());
                    }
                    flattened.extend(entries);
                }
                _ => {
                    error!(sample = %sample, "no activity for sample; excluding from heatmap");
                    excluded.push(sample);
                }
            }
        }
        for sample in excluded {
            selection.exclude_missing(sample);
        }
    }
    ctx.set_heatmap(HeatmapData {
        activity: flattened,
    });
}
