//! The mutable working set of selected samples.
//!
//! Selected samples are partitioned into two disjoint sets: the
//! with-activity set (eligible for the heatmap, each member carrying a
//! group label) and the missing-activity list (samples whose activity
//! fetch came back empty). A sample id is in at most one of the two at any
//! time.
//!
//! This type is pure state: it performs no I/O and never triggers a
//! rebuild itself. The session layer reacts to the returned outcomes,
//! which keeps every mutation site reentrancy-safe.

use crate::data::{GroupLabel, SampleId, SignatureId};
use std::collections::HashMap;
use tracing::warn;

/// Outcome of [`SampleSelection::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Removed from the with-activity set; derived activity must be rebuilt.
    WithActivity,
    /// Removed from the missing-activity list only; no rebuild needed.
    MissingOnly,
    /// Not present anywhere.
    NotPresent,
}

/// Working set of selected samples and their ordering state.
#[derive(Debug, Clone, Default)]
pub struct SampleSelection {
    /// With-activity members in heatmap row order.
    order: Vec<SampleId>,
    /// Group label per with-activity member.
    groups: HashMap<SampleId, GroupLabel>,
    /// Samples for which no activity data exists under the current model.
    missing: Vec<SampleId>,
    /// Column order applied uniformly to all cached activity vectors.
    /// Empty means "natural" (server order).
    signature_order: Vec<SignatureId>,
}

impl SampleSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample to the with-activity set with the default group label.
    ///
    /// Idempotent: a double add is logged and ignored. Returns whether the
    /// membership changed. Any change resets the signature order to
    /// natural.
    pub fn add(&mut self, id: SampleId) -> bool {
        if self.groups.contains_key(&id) {
            warn!(sample = %id, "sample already selected; ignoring");
            return false;
        }
        // keep the two sets disjoint if the sample was previously parked on
        // the missing-activity list
        self.missing.retain(|&m| m != id);
        self.order.push(id);
        self.groups.insert(id, GroupLabel::default());
        self.signature_order.clear();
        true
    }

    /// Add every id in order; duplicates against current state are ignored
    /// per [`add`](Self::add).
    pub fn add_bulk(&mut self, ids: &[SampleId]) {
        for &id in ids {
            self.add(id);
        }
    }

    /// Remove a sample from whichever set holds it.
    pub fn remove(&mut self, id: SampleId) -> Removal {
        if self.groups.remove(&id).is_some() {
            self.order.retain(|&s| s != id);
            self.signature_order.clear();
            return Removal::WithActivity;
        }
        let before = self.missing.len();
        self.missing.retain(|&s| s != id);
        if self.missing.len() != before {
            Removal::MissingOnly
        } else {
            warn!(sample = %id, "remove: sample not selected");
            Removal::NotPresent
        }
    }

    /// Empty the with-activity set and its group labels.
    pub fn clear(&mut self) {
        self.order.clear();
        self.groups.clear();
        self.signature_order.clear();
    }

    /// Empty the missing-activity list.
    pub fn clear_missing(&mut self) {
        self.missing.clear();
    }

    /// Membership in the with-activity set only.
    pub fn contains(&self, id: SampleId) -> bool {
        self.groups.contains_key(&id)
    }

    /// Are all of `ids` already in the with-activity set? Used to answer
    /// "is this whole experiment already selected".
    pub fn contains_all(&self, ids: &[SampleId]) -> bool {
        ids.iter().all(|&id| self.contains(id))
    }

    /// Size of the with-activity set.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// With-activity members in current heatmap row order.
    pub fn samples(&self) -> &[SampleId] {
        &self.order
    }

    /// The missing-activity list.
    pub fn missing(&self) -> &[SampleId] {
        &self.missing
    }

    /// Assign a group label to a with-activity member.
    pub fn set_group(&mut self, id: SampleId, label: GroupLabel) {
        match self.groups.get_mut(&id) {
            Some(slot) => *slot = label,
            None => warn!(sample = %id, "set_group: sample not in with-activity set"),
        }
    }

    pub fn group(&self, id: SampleId) -> Option<&GroupLabel> {
        self.groups.get(&id)
    }

    /// Mapping from group label to the member ids carrying it, derived
    /// fresh from the label map on every call.
    pub fn groups(&self) -> HashMap<GroupLabel, Vec<SampleId>> {
        let mut by_group: HashMap<GroupLabel, Vec<SampleId>> = HashMap::new();
        for &id in &self.order {
            if let Some(label) = self.groups.get(&id) {
                by_group.entry(label.clone()).or_default().push(id);
            }
        }
        by_group
    }

    /// Move a with-activity member to the missing-activity list
    /// (deduplicated). Used by the aggregator when a sample turns out to
    /// have no activity data under the current model.
    pub fn exclude_missing(&mut self, id: SampleId) {
        self.order.retain(|&s| s != id);
        self.groups.remove(&id);
        if !self.missing.contains(&id) {
            self.missing.push(id);
        }
    }

    /// Current signature (column) order; empty means natural order.
    pub fn signature_order(&self) -> &[SignatureId] {
        &self.signature_order
    }

    pub fn set_signature_order(&mut self, order: Vec<SignatureId>) {
        self.signature_order = order;
    }

    pub fn reset_signature_order(&mut self) {
        self.signature_order.clear();
    }

    /// Overwrite the sample (row) order, e.g. with clustering output.
    pub fn set_sample_order(&mut self, order: Vec<SampleId>) {
        self.order = order;
    }
}
