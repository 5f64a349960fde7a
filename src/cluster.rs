//! Record reshaping for hierarchical clustering, and applying the
//! clustering output back onto the selection ordering.

use crate::data::{SampleId, SignatureId};
use crate::fetch::{ClusterConfig, ClusterRecord, Clusterer};
use crate::selection::SampleSelection;
use crate::session::AnalysisContext;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which ordering a clustering pass rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTarget {
    /// Heatmap rows (sample order).
    Samples,
    /// Heatmap columns (signature order).
    Signatures,
}

/// One sample's record for clustering. `activity` is absent when the
/// sample's detail record was never fetched; consumers must tolerate the
/// partial record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: SampleId,
    pub activity: Option<Vec<f64>>,
}

/// One signature's record for clustering: its activity across the selected
/// samples, in current sample order. The transpose of [`SampleRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: SignatureId,
    pub activity: Vec<f64>,
}

/// Sample-major records for the with-activity members, in current row
/// order. Values follow the cache's natural signature-ascending order.
pub fn sample_records(ctx: &AnalysisContext) -> Vec<SampleRecord> {
    let samples = ctx.selection().samples().to_vec();
    samples
        .into_iter()
        .map(|id| {
            let activity = if ctx.samples.contains(&id) {
                ctx.activity
                    .get(&id)
                    .map(|entries| entries.iter().map(|e| e.value).collect())
            } else {
                None
            };
            SampleRecord { id, activity }
        })
        .collect()
}

/// Signature-major records: the transpose of [`sample_records`], one
/// record per position of the first sample's vector.
///
/// Every sample's vector is expected to carry the same signature id at a
/// given index as the first sample's. A mismatch is a data-integrity
/// error: it is logged and the mismatched value is still used.
pub fn signature_records(ctx: &AnalysisContext) -> Vec<SignatureRecord> {
    let samples = ctx.selection().samples().to_vec();
    let Some(first) = samples.first().and_then(|id| ctx.activity.get(id)) else {
        return Vec::new();
    };

    first
        .iter()
        .enumerate()
        .map(|(index, lead)| SignatureRecord {
            id: lead.signature,
            activity: samples
                .iter()
                .map(|&sample| {
                    match ctx.activity.get(&sample).as_ref().and_then(|e| e.get(index)) {
                        Some(entry) => {
                            if entry.signature != lead.signature {
                                warn!(
                                    expected = %lead.signature,
                                    found = %entry.signature,
                                    sample = %sample,
                                    index,
                                    "signature id mismatch across samples"
                                );
                            }
                            entry.value
                        }
                        None => {
                            warn!(sample = %sample, index, "no cached activity while transposing");
                            f64::NAN
                        }
                    }
                })
                .collect(),
        })
        .collect()
}

/// Overwrite the targeted ordering with externally computed clustering
/// output.
pub fn apply_cluster_order(selection: &mut SampleSelection, ordered: &[i64], target: ClusterTarget) {
    match target {
        ClusterTarget::Samples => {
            selection.set_sample_order(ordered.iter().map(|&id| SampleId(id)).collect());
        }
        ClusterTarget::Signatures => {
            selection.set_signature_order(ordered.iter().map(|&id| SignatureId(id)).collect());
        }
    }
}

/// Run one clustering pass and write the resulting order back.
///
/// Yields to the scheduler before the (potentially expensive) clustering
/// executes, so a caller can surface a progress indicator first.
pub async fn cluster_and_apply(
    ctx: &AnalysisContext,
    clusterer: &dyn Clusterer,
    config: &ClusterConfig,
    target: ClusterTarget,
) {
    tokio::task::yield_now().await;

    let records: Vec<ClusterRecord> = match target {
        ClusterTarget::Samples => sample_records(ctx)
            .into_iter()
            .map(|r| ClusterRecord {
                id: r.id.0,
                activity: r.activity.unwrap_or_default(),
            })
            .collect(),
        ClusterTarget::Signatures => signature_records(ctx)
            .into_iter()
            .map(|r| ClusterRecord {
                id: r.id.0,
                activity: r.activity,
            })
            .collect(),
    };
    if records.is_empty() {
        warn!(?target, "nothing to cluster");
        return;
    }

    let ordered = clusterer.cluster(&records, config);
    apply_cluster_order(&mut ctx.selection(), &ordered, target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ActivityEntry, SampleDetail};
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    fn vector(sample: i64, signatures: &[i64], values: &[f64]) -> Vec<ActivityEntry> {
        signatures
            .iter()
            .zip(values)
            .map(|(&signature, &value)| ActivityEntry {
                signature: SignatureId(signature),
                sample: SampleId(sample),
                value,
            })
            .collect()
    }

    fn detail(id: i64) -> SampleDetail {
        SampleDetail {
            id: SampleId(id),
            name: format!("sample {}", id),
            annotations: serde_json::Value::Null,
        }
    }

    fn populated_context() -> AnalysisContext {
        let ctx = AnalysisContext::new();
        {
            let mut sel = ctx.selection();
            sel.add(SampleId(1));
            sel.add(SampleId(2));
        }
        for id in [1, 2] {
            ctx.samples.put(SampleId(id), detail(id));
        }
        ctx.activity
            .put(SampleId(1), vector(1, &[10, 11], &[0.1, 0.2]));
        ctx.activity
            .put(SampleId(2), vector(2, &[10, 11], &[0.3, 0.4]));
        ctx
    }

    #[test]
    fn test_sample_and_signature_records_are_transposes() {
        let ctx = populated_context();
        let by_sample = sample_records(&ctx);
        let by_signature = signature_records(&ctx);

        assert_eq!(by_sample.len(), 2);
        assert_eq!(by_signature.len(), 2);
        for (i, sample) in by_sample.iter().enumerate() {
            let activity = sample.activity.as_ref().unwrap();
            for (j, signature) in by_signature.iter().enumerate() {
                assert_relative_eq!(activity[j], signature.activity[i]);
            }
        }
    }

    #[test]
    fn test_sample_record_partial_without_detail() {
        let ctx = populated_context();
        ctx.selection().add(SampleId(3));
        ctx.activity.put(SampleId(3), vector(3, &[10, 11], &[0.5, 0.6]));
        // no sample detail for 3 -> partial record

        let records = sample_records(&ctx);
        assert_eq!(records.len(), 3);
        assert!(records[2].activity.is_none());
    }

    #[test]
    fn test_signature_mismatch_is_fail_soft() {
        let ctx = populated_context();
        // sample 2's vector disagrees on the signature at index 0
        ctx.activity
            .put(SampleId(2), vector(2, &[99, 11], &[0.3, 0.4]));

        let records = signature_records(&ctx);
        // the mismatched value is still used
        assert_relative_eq!(records[0].activity[1], 0.3);
        assert_eq!(records[0].id, SignatureId(10));
    }

    #[test]
    fn test_apply_cluster_order() {
        let ctx = populated_context();
        apply_cluster_order(&mut ctx.selection(), &[2, 1], ClusterTarget::Samples);
        assert_eq!(ctx.selection().samples(), &[SampleId(2), SampleId(1)]);

        apply_cluster_order(&mut ctx.selection(), &[11, 10], ClusterTarget::Signatures);
        assert_eq!(
            ctx.selection().signature_order(),
            &[SignatureId(11), SignatureId(10)]
        );
    }

    /// Orders records by descending first activity value.
    struct ByFirstValueDesc {
        seen: Mutex<Vec<usize>>,
    }

    impl Clusterer for ByFirstValueDesc {
        fn cluster(&self, records: &[ClusterRecord], _config: &ClusterConfig) -> Vec<i64> {
            self.seen.lock().unwrap().push(records.len());
            let mut sorted: Vec<&ClusterRecord> = records.iter().collect();
            sorted.sort_by(|a, b| {
                let a0 = a.activity.first().copied().unwrap_or(f64::NEG_INFINITY);
                let b0 = b.activity.first().copied().unwrap_or(f64::NEG_INFINITY);
                b0.partial_cmp(&a0).unwrap_or(std::cmp::Ordering::Equal)
            });
            sorted.iter().map(|r| r.id).collect()
        }
    }

    #[tokio::test]
    async fn test_cluster_and_apply_both_targets() {
        let ctx = populated_context();
        let clusterer = ByFirstValueDesc {
            seen: Mutex::new(Vec::new()),
        };
        let config = ClusterConfig::default();

        cluster_and_apply(&ctx, &clusterer, &config, ClusterTarget::Samples).await;
        assert_eq!(ctx.selection().samples(), &[SampleId(2), SampleId(1)]);

        cluster_and_apply(&ctx, &clusterer, &config, ClusterTarget::Signatures).await;
        // signature 11 activity starts at 0.2 > signature 10's 0.1, but the
        // sample order was flipped above, so first values are 0.4 and 0.3
        assert_eq!(
            ctx.selection().signature_order(),
            &[SignatureId(11), SignatureId(10)]
        );
        assert_eq!(*clusterer.seen.lock().unwrap(), vec![2, 2]);
    }
}
