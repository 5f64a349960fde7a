//! Hypergeometric gene-set enrichment of signatures against a user gene
//! list, FDR-corrected per participation type.

use crate::data::{EnrichedSignature, GeneId, ModelId, ParticipationRecord, SignatureId};
use crate::error::Result;
use crate::fetch::{GeneSource, ParticipationSource};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Significant digits applied to adjusted p-values before the cutoff
/// comparison and in the emitted results.
const P_VALUE_SIG_DIGITS: u32 = 3;

/// Enrichment output: per participation type, the qualifying signatures
/// sorted ascending by adjusted p-value. A participation type with no
/// qualifying signature is simply absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub by_type: BTreeMap<String, Vec<EnrichedSignature>>,
}

impl EnrichmentReport {
    pub fn participation_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn get(&self, participation_type: &str) -> Option<&[EnrichedSignature]> {
        self.by_type.get(participation_type).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Pure enrichment core over already-fetched participation records.
///
/// Records are grouped by participation type, then by signature, with the
/// distinct genes observed per pair. Per participation type, each
/// signature gets an upper-tail hypergeometric p-value (`k` = overlap
/// with the user list, `m` = user list size, `n` = the signature's
/// observed gene-set size, `N` = `universe`); the type's p-values are
/// BH-corrected, rounded to 3 significant digits, filtered to `< cutoff`
/// and sorted ascending.
pub fn compute_enrichment(
    participations: &[ParticipationRecord],
    user_genes: &[GeneId],
    universe: u64,
    cutoff: f64,
) -> Result<EnrichmentReport> {
    let user_set: HashSet<GeneId> = user_genes.iter().copied().collect();
    let m = user_genes.len() as u64;

    let mut grouped: BTreeMap<String, BTreeMap<SignatureId, Vec<GeneId>>> = BTreeMap::new();
    for record in participations {
        let genes = grouped
            .entry(record.participation_type.clone())
            .or_default()
            .entry(record.signature)
            .or_default();
        if !genes.contains(&record.gene) {
            genes.push(record.gene);
        }
    }

    let mut by_type = BTreeMap::new();
    for (participation_type, signatures) in grouped {
        let mut p_values = Vec::with_capacity(signatures.len());
        for genes in signatures.values() {
            let k = genes.iter().filter(|g| user_set.contains(g)).count() as u64;
            let n = genes.len() as u64;
            p_values.push(stats::hypergeometric_enrichment(k, m, n, universe)?);
        }

        let adjusted = stats::bh_adjust(&p_values);
        let mut qualifying: Vec<EnrichedSignature> = signatures
            .into_iter()
            .zip(adjusted)
            .filter_map(|((signature, genes), q)| {
                let p_value = stats::round_sig(q, P_VALUE_SIG_DIGITS);
                (p_value < cutoff).then_some(EnrichedSignature {
                    signature,
                    genes,
                    p_value,
                })
            })
            .collect();
        qualifying.sort_by(|a, b| {
            a.p_value
                .partial_cmp(&b.p_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if !qualifying.is_empty() {
            by_type.insert(participation_type, qualifying);
        }
    }
    Ok(EnrichmentReport { by_type })
}

/// Enrichment analysis bound to its collaborator sources.
pub struct EnrichmentAnalysis {
    participations: Arc<dyn ParticipationSource>,
    genes: Arc<dyn GeneSource>,
}

impl EnrichmentAnalysis {
    pub fn new(participations: Arc<dyn ParticipationSource>, genes: Arc<dyn GeneSource>) -> Self {
        Self {
            participations,
            genes,
        }
    }

    /// Run enrichment for `user_genes` under `model`, using the gene
    /// universe size reported by the gene source.
    pub async fn run(
        &self,
        model: ModelId,
        user_genes: &[GeneId],
        cutoff: f64,
    ) -> Result<EnrichmentReport> {
        if user_genes.is_empty() {
            info!("enrichment requested with no genes; returning empty report");
            return Ok(EnrichmentReport::default());
        }
        let universe = self.genes.total_gene_count().await?;
        self.run_with_universe(model, user_genes, universe, cutoff)
            .await
    }

    /// Run enrichment with a caller-supplied gene universe size.
    pub async fn run_with_universe(
        &self,
        model: ModelId,
        user_genes: &[GeneId],
        universe: u64,
        cutoff: f64,
    ) -> Result<EnrichmentReport> {
        if user_genes.is_empty() {
            info!("enrichment requested with no genes; returning empty report");
            return Ok(EnrichmentReport::default());
        }
        let records = self.participations.participations(model, user_genes).await?;
        compute_enrichment(&records, user_genes, universe, cutoff)
    }
}
