//! Snapshot reconciliation.
//!
//! A [`Snapshot`] is the section-partitioned list of identities that a
//! rendering surface currently shows. Reconciling a section against a target
//! sequence yields a [`Changeset`]: the deletes, inserts and reconfigures that
//! turn the rendered section into the target without disturbing the items
//! that did not change.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use tracing::debug;

/// 64-bit content hash used to detect records that changed in place. Only
/// comparable within one process; never persist it.
pub fn fingerprint<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<K> {
    Delete(K),
    Insert(K),
    Reconfigure(K),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset<K> {
    /// Identities leaving their current position, in snapshot order.
    pub deletes: Vec<K>,
    /// Identities entering the section, in target order.
    pub inserts: Vec<K>,
    /// Identities kept in place whose content changed, in target order.
    pub reconfigures: Vec<K>,
}

impl<K> Default for Changeset<K> {
    fn default() -> Self {
        Self {
            deletes: Vec::new(),
            inserts: Vec::new(),
            reconfigures: Vec::new(),
        }
    }
}

impl<K> Changeset<K> {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty() && self.reconfigures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletes.len() + self.inserts.len() + self.reconfigures.len()
    }

    /// Operations in application order: every delete precedes every insert,
    /// so an identity removed and re-added in one pass is never visible twice.
    pub fn operations(&self) -> impl Iterator<Item = Operation<&K>> {
        self.deletes
            .iter()
            .map(Operation::Delete)
            .chain(self.inserts.iter().map(Operation::Insert))
            .chain(self.reconfigures.iter().map(Operation::Reconfigure))
    }
}

#[derive(Debug, Clone)]
struct Section<S, K> {
    id: S,
    items: Vec<K>,
    fingerprints: HashMap<K, u64>,
}

/// Ordered sections of rendered identities. An identity appears at most once
/// across all sections.
#[derive(Debug, Clone)]
pub struct Snapshot<S, K> {
    sections: Vec<Section<S, K>>,
    owners: HashMap<K, S>,
}

impl<S, K> Default for Snapshot<S, K> {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            owners: HashMap::new(),
        }
    }
}

impl<S, K> Snapshot<S, K>
where
    S: Clone + Eq + Hash,
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_identifiers(&self) -> impl Iterator<Item = &S> {
        self.sections.iter().map(|section| &section.id)
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    /// Items of a section, empty if the section was never created.
    pub fn items(&self, section: &S) -> &[K] {
        self.section(section)
            .map(|s| s.items.as_slice())
            .unwrap_or_default()
    }

    /// All identities, section by section.
    pub fn item_identifiers(&self) -> impl Iterator<Item = &K> {
        self.sections.iter().flat_map(|section| section.items.iter())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.owners.contains_key(id)
    }

    pub fn section_of(&self, id: &K) -> Option<&S> {
        self.owners.get(id)
    }

    pub fn index_of(&self, id: &K) -> Option<usize> {
        let owner = self.owners.get(id)?;
        self.items(owner).iter().position(|item| item == id)
    }

    pub fn fingerprint_of(&self, id: &K) -> Option<u64> {
        let owner = self.owners.get(id)?;
        self.section(owner)?.fingerprints.get(id).copied()
    }

    /// Computes the changeset that turns `section` into `target` without
    /// modifying the snapshot.
    ///
    /// `target` pairs each identity with its content fingerprint. Identities
    /// already rendered in `section` keep their place unless their relative
    /// order disagrees with the target; the smallest set of such displaced
    /// identities is expressed as delete + insert. Identities rendered in a
    /// different section are moved the same way.
    pub fn reconcile(&self, section: &S, target: &[(K, u64)]) -> Changeset<K> {
        let target = dedup_target(target);
        let current = self.section(section);

        let positions: HashMap<&K, usize> = current
            .map(|s| s.items.iter().enumerate().map(|(i, k)| (k, i)).collect())
            .unwrap_or_default();

        // Identities of this section that survive, in target order
        let mut survivors: Vec<(&K, u64, usize)> = Vec::new();
        let mut leaving: HashSet<&K> = HashSet::new();
        let mut fresh: HashSet<&K> = HashSet::new();

        for &(id, fp) in &target {
            match positions.get(id) {
                Some(&position) => survivors.push((id, *fp, position)),
                None => {
                    if self.owners.contains_key(id) {
                        // rendered in another section
                        leaving.insert(id);
                    }
                    fresh.insert(id);
                }
            }
        }

        let order: Vec<usize> = survivors.iter().map(|&(_, _, pos)| pos).collect();
        let kept = longest_increasing(&order);

        let mut changeset = Changeset::default();
        for (&(id, fp, _), keep) in survivors.iter().zip(&kept) {
            if *keep {
                let previous = current.and_then(|s| s.fingerprints.get(id)).copied();
                if previous != Some(fp) {
                    changeset.reconfigures.push(id.clone());
                }
            } else {
                leaving.insert(id);
                fresh.insert(id);
            }
        }

        if let Some(current) = current {
            let targeted: HashSet<&K> = target.iter().map(|&(id, _)| id).collect();
            for id in &current.items {
                if !targeted.contains(id) {
                    leaving.insert(id);
                }
            }
        }

        // deletes in snapshot order
        changeset.deletes = self
            .item_identifiers()
            .filter(|id| leaving.contains(id))
            .cloned()
            .collect();

        changeset.inserts = target
            .iter()
            .filter(|&&(id, _)| fresh.contains(id))
            .map(|&(id, _)| id.clone())
            .collect();

        changeset
    }

    /// Reconciles `section` against `target` and commits the result. After
    /// this call the section lists exactly the target identities, in target
    /// order. A section is created the first time it receives an item and is
    /// kept, possibly empty, afterwards.
    pub fn apply(&mut self, section: S, target: &[(K, u64)]) -> Changeset<K> {
        let changeset = self.reconcile(&section, target);
        if changeset.is_empty() {
            return changeset;
        }

        {
            let deleted: HashSet<&K> = changeset.deletes.iter().collect();
            for s in &mut self.sections {
                if s.items.iter().any(|id| deleted.contains(id)) {
                    s.items.retain(|id| !deleted.contains(id));
                    s.fingerprints.retain(|id, _| !deleted.contains(id));
                }
            }
        }
        for id in &changeset.deletes {
            self.owners.remove(id);
        }

        let target = dedup_target(target);
        if target.is_empty() {
            return changeset;
        }

        let index = match self.sections.iter().position(|s| s.id == section) {
            Some(index) => index,
            None => {
                debug!("creating snapshot section on first insert");
                self.sections.push(Section {
                    id: section.clone(),
                    items: Vec::new(),
                    fingerprints: HashMap::new(),
                });
                self.sections.len() - 1
            }
        };

        let entry = &mut self.sections[index];
        entry.items = target.iter().map(|&(id, _)| id.clone()).collect();
        entry.fingerprints = target.iter().map(|&(id, fp)| (id.clone(), *fp)).collect();
        for &(id, _) in &target {
            self.owners.insert(id.clone(), section.clone());
        }

        changeset
    }

    fn section(&self, id: &S) -> Option<&Section<S, K>> {
        self.sections.iter().find(|section| &section.id == id)
    }
}

/// Drops repeated identities, keeping the first occurrence.
fn dedup_target<K: Eq + Hash>(target: &[(K, u64)]) -> Vec<(&K, &u64)> {
    let mut seen = HashSet::with_capacity(target.len());
    let deduped: Vec<(&K, &u64)> = target
        .iter()
        .filter(|(id, _)| seen.insert(id))
        .map(|(id, fp)| (id, fp))
        .collect();
    if deduped.len() != target.len() {
        debug!(
            dropped = target.len() - deduped.len(),
            "ignoring duplicate identities in target"
        );
    }
    deduped
}

/// Marks the members of one longest strictly increasing subsequence.
fn longest_increasing(values: &[usize]) -> Vec<bool> {
    // tails[l] = index into `values` of the smallest tail of an increasing run of length l + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (i, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&t| values[t] < value);
        if slot > 0 {
            previous[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut kept = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        kept[i] = true;
        cursor = previous[i];
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_increasing_keeps_sorted_input() {
        assert_eq!(longest_increasing(&[0, 1, 2]), vec![true, true, true]);
        assert!(longest_increasing(&[]).is_empty());
    }

    #[test]
    fn longest_increasing_drops_displaced_values() {
        // 3 moved to the front
        assert_eq!(longest_increasing(&[3, 0, 1, 2]), vec![false, true, true, true]);
        assert_eq!(
            longest_increasing(&[2, 1, 0]).iter().filter(|k| **k).count(),
            1
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let target = [(1, 10), (2, 20), (1, 30)];
        let deduped = dedup_target(&target);
        assert_eq!(deduped, vec![(&1, &10), (&2, &20)]);
    }
}
