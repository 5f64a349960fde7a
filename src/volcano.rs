//! Differential-activity analysis between the base and comp sample
//! groups, producing the volcano-plot source array.

use crate::data::{GroupLabel, SampleId, VolcanoPoint};
use crate::error::{AnalysisError, Result};
use crate::fetch::SignatureSource;
use crate::session::{resolve_signature_set, AnalysisContext};
use crate::stats;
use tracing::{error, info, warn};

/// Outcome of a volcano computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolcanoOutcome {
    /// Base or comp group is empty: a valid idle state, no output
    /// produced and any prior output left unchanged.
    InsufficientGroups,
    /// Output written; carries the number of signatures tested.
    Computed(usize),
}

/// Compute per-signature differential statistics for the base/comp split.
///
/// For each signature in the universe (taken from the first base-group
/// sample's cached vector): `diff` = mean(base) - mean(comp), a two-sided
/// two-sample t-test p-value, BH-adjusted p, and `logsig` =
/// -log10(adjusted p). The result replaces the context's volcano slot;
/// fetch errors propagate after logging and leave the prior slot
/// untouched.
pub async fn compute(
    ctx: &AnalysisContext,
    signatures: &dyn SignatureSource,
) -> Result<VolcanoOutcome> {
    let (base, comp) = {
        let groups = ctx.selection().groups();
        (
            groups.get(&GroupLabel::Base).cloned().unwrap_or_default(),
            groups.get(&GroupLabel::Comp).cloned().unwrap_or_default(),
        )
    };
    if base.is_empty() || comp.is_empty() {
        info!(
            base = base.len(),
            comp = comp.len(),
            "volcano: base and comp groups must both be non-empty"
        );
        return Ok(VolcanoOutcome::InsufficientGroups);
    }

    // the first base-group sample's vector defines the signature universe
    let lead = base[0];
    let Some(lead_vector) = ctx.activity.get(&lead) else {
        error!(sample = %lead, "volcano: activity not loaded for lead sample");
        return Err(AnalysisError::Precondition(format!(
            "no cached activity for sample {}; refresh the heatmap first",
            lead
        )));
    };
    let universe: Vec<_> = lead_vector.iter().map(|e| e.signature).collect();

    resolve_signature_set(&ctx.signatures, signatures, &universe).await?;

    let extract = |samples: &[SampleId], index: usize, expected| -> Vec<f64> {
        samples
            .iter()
            .map(|&sample| {
                match ctx.activity.get(&sample).as_ref().and_then(|e| e.get(index)) {
                    Some(entry) => {
                        if entry.signature != expected {
                            error!(
                                expected = %expected,
                                found = %entry.signature,
                                sample = %sample,
                                index,
                                "volcano: signature id mismatch across samples"
                            );
                        }
                        entry.value
                    }
                    None => {
                        error!(sample = %sample, index, "volcano: missing cached activity");
                        f64::NAN
                    }
                }
            })
            .collect()
    };

    let mut points: Vec<VolcanoPoint> = universe
        .iter()
        .enumerate()
        .map(|(index, &signature)| {
            let activity_base = extract(&base, index, signature);
            let activity_comp = extract(&comp, index, signature);
            let diff = stats::mean(&activity_base) - stats::mean(&activity_comp);
            let raw_p_value = match stats::two_sample_t_test(&activity_base, &activity_comp) {
                Ok(test) => test.p_value,
                Err(err) => {
                    warn!(signature = %signature, %err, "volcano: t-test undefined");
                    f64::NAN
                }
            };
            let name = match ctx.signatures.get(&signature) {
                Some(detail) => detail.name,
                None => {
                    warn!(signature = %signature, "volcano: signature name unresolved");
                    format!("signature {}", signature)
                }
            };
            VolcanoPoint {
                id: signature,
                name,
                activity_base,
                activity_comp,
                diff,
                raw_p_value,
                adjusted_p_value: f64::NAN,
                logsig: f64::NAN,
            }
        })
        .collect();

    let raw: Vec<f64> = points.iter().map(|p| p.raw_p_value).collect();
    let adjusted = stats::bh_adjust(&raw);
    for (point, q) in points.iter_mut().zip(adjusted) {
        point.adjusted_p_value = q;
        point.logsig = -q.log10();
    }

    let count = points.len();
    ctx.set_volcano(points);
    Ok(VolcanoOutcome::Computed(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ActivityEntry, ModelId, SignatureDetail, SignatureId};
    use crate::fetch::SignatureSource;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSignatures {
        bulk_calls: AtomicUsize,
        bulk_sizes: std::sync::Mutex<Vec<usize>>,
    }

    impl FakeSignatures {
        fn new() -> Self {
            Self {
                bulk_calls: AtomicUsize::new(0),
                bulk_sizes: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SignatureSource for FakeSignatures {
        async fn signature(&self, id: SignatureId) -> crate::error::Result<SignatureDetail> {
            Ok(detail(id))
        }

        async fn signature_set(
            &self,
            ids: &[SignatureId],
        ) -> crate::error::Result<Vec<SignatureDetail>> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            self.bulk_sizes.lock().unwrap().push(ids.len());
            Ok(ids.iter().map(|&id| detail(id)).collect())
        }
    }

    fn detail(id: SignatureId) -> SignatureDetail {
        SignatureDetail {
            id,
            name: format!("Node {}", id),
            annotations: serde_json::Value::Null,
        }
    }

    /// Six samples, one signature (id 7): base activity [1,2,3], comp
    /// [4,5,6], plus a second signature (id 8) with a weaker split.
    fn grouped_context() -> AnalysisContext {
        let ctx = AnalysisContext::new();
        ctx.set_model(ModelId(1));
        let values_s7 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let values_s8 = [0.9, 1.0, 1.1, 1.0, 1.1, 1.2];
        {
            let mut sel = ctx.selection();
            for i in 0..6 {
                let id = SampleId(i as i64 + 1);
                sel.add(id);
                sel.set_group(
                    id,
                    if i < 3 { GroupLabel::Base } else { GroupLabel::Comp },
                );
            }
        }
        for i in 0..6 {
            let sample = SampleId(i as i64 + 1);
            ctx.activity.put(
                sample,
                vec![
                    ActivityEntry {
                        signature: SignatureId(7),
                        sample,
                        value: values_s7[i],
                    },
                    ActivityEntry {
                        signature: SignatureId(8),
                        sample,
                        value: values_s8[i],
                    },
                ],
            );
        }
        ctx
    }

    #[tokio::test]
    async fn test_insufficient_groups_is_idle_not_error() {
        let ctx = AnalysisContext::new();
        {
            let mut sel = ctx.selection();
            sel.add(SampleId(1));
            sel.set_group(SampleId(1), GroupLabel::Base);
            // no comp group
        }
        let source = FakeSignatures::new();
        let outcome = compute(&ctx, &source).await.unwrap();
        assert_eq!(outcome, VolcanoOutcome::InsufficientGroups);
        assert!(ctx.volcano().is_empty());
        assert_eq!(source.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_form_scenario() {
        let ctx = grouped_context();
        let source = FakeSignatures::new();

        let outcome = compute(&ctx, &source).await.unwrap();
        assert_eq!(outcome, VolcanoOutcome::Computed(2));

        let points = ctx.volcano();
        let p7 = &points[0];
        assert_eq!(p7.id, SignatureId(7));
        assert_eq!(p7.name, "Node 7");
        assert_eq!(p7.activity_base, vec![1.0, 2.0, 3.0]);
        assert_eq!(p7.activity_comp, vec![4.0, 5.0, 6.0]);
        assert_relative_eq!(p7.diff, -3.0, epsilon = 1e-12);
        // Student's t closed form for these inputs (df = 4)
        assert_relative_eq!(p7.raw_p_value, 0.0213116411, epsilon = 1e-7);
        assert!(p7.adjusted_p_value >= p7.raw_p_value);
        assert_relative_eq!(p7.logsig, -p7.adjusted_p_value.log10(), epsilon = 1e-12);

        // weaker signature: larger p-value, smaller |diff|
        let p8 = &points[1];
        assert!(p8.raw_p_value > p7.raw_p_value);
        assert_relative_eq!(p8.diff, -0.1, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_degenerate_signature_stays_insignificant() {
        // one signature is constant in both groups, so its t-test is
        // undefined; it must come out NaN everywhere and must not shift
        // the other signature's corrected p-value
        let ctx = AnalysisContext::new();
        ctx.set_model(ModelId(1));
        let strong = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        {
            let mut sel = ctx.selection();
            for i in 0..6 {
                let id = SampleId(i as i64 + 1);
                sel.add(id);
                sel.set_group(
                    id,
                    if i < 3 { GroupLabel::Base } else { GroupLabel::Comp },
                );
            }
        }
        for i in 0..6 {
            let sample = SampleId(i as i64 + 1);
            ctx.activity.put(
                sample,
                vec![
                    ActivityEntry {
                        signature: SignatureId(7),
                        sample,
                        value: strong[i],
                    },
                    ActivityEntry {
                        signature: SignatureId(9),
                        sample,
                        value: 1.0,
                    },
                ],
            );
        }

        let outcome = compute(&ctx, &FakeSignatures::new()).await.unwrap();
        assert_eq!(outcome, VolcanoOutcome::Computed(2));

        let points = ctx.volcano();
        let flat = &points[1];
        assert_eq!(flat.id, SignatureId(9));
        assert!(flat.raw_p_value.is_nan());
        assert!(flat.adjusted_p_value.is_nan());
        assert!(flat.logsig.is_nan());

        // the one valid test is corrected as a family of size one
        let strong_point = &points[0];
        assert_relative_eq!(
            strong_point.adjusted_p_value,
            strong_point.raw_p_value,
            epsilon = 1e-12
        );
    }

    #[tokio::test]
    async fn test_bulk_fetch_only_uncached_subset() {
        let ctx = grouped_context();
        ctx.signatures.put(SignatureId(7), detail(SignatureId(7)));
        let source = FakeSignatures::new();

        compute(&ctx, &source).await.unwrap();
        assert_eq!(source.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*source.bulk_sizes.lock().unwrap(), vec![1]);
        // cache now holds both
        assert!(ctx.signatures.contains(&SignatureId(8)));

        // second run: everything cached, no bulk request at all
        compute(&ctx, &source).await.unwrap();
        assert_eq!(source.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_prior_output() {
        struct FailingSignatures;

        #[async_trait]
        impl SignatureSource for FailingSignatures {
            async fn signature(
                &self,
                id: SignatureId,
            ) -> crate::error::Result<SignatureDetail> {
                Ok(detail(id))
            }

            async fn signature_set(
                &self,
                _ids: &[SignatureId],
            ) -> crate::error::Result<Vec<SignatureDetail>> {
                Err(crate::error::AnalysisError::network(
                    "signature_set",
                    "503 service unavailable",
                ))
            }
        }

        let ctx = grouped_context();
        let good = FakeSignatures::new();
        compute(&ctx, &good).await.unwrap();
        let prior = ctx.volcano();
        assert_eq!(prior.len(), 2);

        // invalidate nothing, but make the next run fail at the name fetch
        let ctx2 = grouped_context();
        let result = compute(&ctx2, &FailingSignatures).await;
        assert!(result.is_err());
        assert!(ctx2.volcano().is_empty());
    }
}
