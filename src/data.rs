//! Core data types shared across the analysis engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

id_type!(
    /// Integer identifier for a biological sample.
    SampleId
);
id_type!(
    /// Integer identifier for a signature (model-specific latent factor).
    SignatureId
);
id_type!(
    /// Integer identifier for a gene.
    GeneId
);
id_type!(
    /// Identifier for a trained model (selects the signature set in effect).
    ModelId
);

/// Group assignment for a selected sample.
///
/// Only `Base` and `Comp` are meaningful to the volcano computation; every
/// other label (including the default `Other`) is tracked but inert there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupLabel {
    Base,
    Comp,
    Other,
    Custom(String),
}

impl GroupLabel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Base => "base-group",
            Self::Comp => "comp-group",
            Self::Other => "other",
            Self::Custom(name) => name,
        }
    }
}

impl Default for GroupLabel {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for GroupLabel {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "base-group" => Self::Base,
            "comp-group" => Self::Comp,
            "other" => Self::Other,
            _ => Self::Custom(raw),
        }
    }
}

impl From<&str> for GroupLabel {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<GroupLabel> for String {
    fn from(label: GroupLabel) -> Self {
        label.as_str().to_string()
    }
}

/// One activity value: the expression of a signature in a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub signature: SignatureId,
    pub sample: SampleId,
    pub value: f64,
}

/// Detail record for a sample.
///
/// `annotations` carries server-side fields the engine does not interpret
/// (strain, medium, experiment accession, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleDetail {
    pub id: SampleId,
    pub name: String,
    #[serde(default)]
    pub annotations: serde_json::Value,
}

/// Detail record for a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDetail {
    pub id: SignatureId,
    pub name: String,
    #[serde(default)]
    pub annotations: serde_json::Value,
}

/// A recorded association between a gene and a signature, typed by
/// participation kind (e.g. "high-weight").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub signature: SignatureId,
    pub gene: GeneId,
    pub participation_type: String,
}

/// Flattened activity output consumed by the heatmap rendering sink.
///
/// Row/column ordering lives in [`crate::selection::SampleSelection`]; this
/// is only the mark data, one entry per (sample, signature) cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeatmapData {
    pub activity: Vec<ActivityEntry>,
}

/// Per-signature output of the differential (volcano) analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolcanoPoint {
    pub id: SignatureId,
    pub name: String,
    pub activity_base: Vec<f64>,
    pub activity_comp: Vec<f64>,
    /// mean(base activity) - mean(comp activity)
    pub diff: f64,
    pub raw_p_value: f64,
    pub adjusted_p_value: f64,
    /// -log10(adjusted p-value)
    pub logsig: f64,
}

/// One qualifying signature from the enrichment analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSignature {
    pub signature: SignatureId,
    pub genes: Vec<GeneId>,
    /// BH-adjusted p-value, rounded to 3 significant digits.
    pub p_value: f64,
}
