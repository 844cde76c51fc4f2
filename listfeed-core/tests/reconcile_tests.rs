use std::collections::HashSet;

use listfeed_core::{fingerprint, Changeset, Operation, Snapshot};
use proptest::prelude::*;

const MAIN: u32 = 0;
const OTHER: u32 = 1;

/// Target entries whose content is derived from the identity alone.
fn target(ids: &[i64]) -> Vec<(i64, u64)> {
    ids.iter().map(|id| (*id, fingerprint(&format!("record-{id}")))).collect()
}

fn snapshot_of(ids: &[i64]) -> Snapshot<u32, i64> {
    let mut snapshot = Snapshot::new();
    snapshot.apply(MAIN, &target(ids));
    snapshot
}

#[test]
fn first_load_inserts_in_target_order() {
    let mut snapshot = Snapshot::new();
    let changeset = snapshot.apply(MAIN, &target(&[1, 2]));

    assert_eq!(changeset.inserts, vec![1, 2]);
    assert!(changeset.deletes.is_empty());
    assert!(changeset.reconfigures.is_empty());
    assert_eq!(snapshot.items(&MAIN), &[1, 2]);
}

#[test]
fn batched_remove_and_load_collapses_to_one_delete_and_one_insert() {
    let mut snapshot = snapshot_of(&[1, 2, 3]);
    let changeset = snapshot.apply(MAIN, &target(&[1, 3, 4]));

    assert_eq!(changeset.deletes, vec![2]);
    assert_eq!(changeset.inserts, vec![4]);
    assert!(changeset.reconfigures.is_empty());
    assert_eq!(snapshot.items(&MAIN), &[1, 3, 4]);
}

#[test]
fn unchanged_target_is_a_no_op() {
    let mut snapshot = snapshot_of(&[5, 6, 7]);
    let changeset = snapshot.apply(MAIN, &target(&[5, 6, 7]));
    assert!(changeset.is_empty());
    assert_eq!(changeset.len(), 0);
}

#[test]
fn changed_content_reconfigures_only_that_identity() {
    let mut snapshot = snapshot_of(&[1, 2, 3]);
    let mut next = target(&[1, 2, 3]);
    next[1].1 = fingerprint("record-2 favorited");

    let changeset = snapshot.apply(MAIN, &next);
    assert_eq!(
        changeset,
        Changeset {
            deletes: vec![],
            inserts: vec![],
            reconfigures: vec![2],
        }
    );
    assert_eq!(snapshot.fingerprint_of(&2), Some(next[1].1));
}

#[test]
fn empty_target_deletes_everything_but_keeps_the_section() {
    let mut snapshot = snapshot_of(&[1, 2]);
    let changeset = snapshot.apply(MAIN, &[]);

    assert_eq!(changeset.deletes, vec![1, 2]);
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.section_identifiers().collect::<Vec<_>>(), vec![&MAIN]);
}

#[test]
fn section_is_created_lazily() {
    let mut snapshot: Snapshot<u32, i64> = Snapshot::new();
    assert!(snapshot.apply(MAIN, &[]).is_empty());
    assert_eq!(snapshot.number_of_sections(), 0);

    snapshot.apply(MAIN, &target(&[1]));
    assert_eq!(snapshot.number_of_sections(), 1);
}

#[test]
fn reconcile_does_not_modify_the_snapshot() {
    let snapshot = snapshot_of(&[1, 2]);
    let changeset = snapshot.reconcile(&MAIN, &target(&[2, 3]));
    assert_eq!(changeset.deletes, vec![1]);
    assert_eq!(changeset.inserts, vec![3]);
    assert_eq!(snapshot.items(&MAIN), &[1, 2]);
}

#[test]
fn reordering_moves_the_fewest_identities() {
    let mut snapshot = snapshot_of(&[1, 2, 3, 4]);
    let changeset = snapshot.apply(MAIN, &target(&[4, 1, 2, 3]));

    assert_eq!(changeset.deletes, vec![4]);
    assert_eq!(changeset.inserts, vec![4]);
    assert!(changeset.reconfigures.is_empty());
    assert_eq!(snapshot.items(&MAIN), &[4, 1, 2, 3]);
}

#[test]
fn readded_identity_is_deleted_before_it_is_inserted() {
    let snapshot = snapshot_of(&[1, 2]);
    let changeset = snapshot.reconcile(&MAIN, &target(&[2, 1]));

    let operations: Vec<_> = changeset.operations().collect();
    let delete = operations
        .iter()
        .position(|op| matches!(op, Operation::Delete(_)))
        .unwrap();
    let insert = operations
        .iter()
        .position(|op| matches!(op, Operation::Insert(_)))
        .unwrap();
    assert!(delete < insert);
}

#[test]
fn identity_moving_between_sections_stays_unique() {
    let mut snapshot = snapshot_of(&[1, 2]);
    let changeset = snapshot.apply(OTHER, &target(&[2, 9]));

    assert_eq!(changeset.deletes, vec![2]);
    assert_eq!(changeset.inserts, vec![2, 9]);
    assert_eq!(snapshot.items(&MAIN), &[1]);
    assert_eq!(snapshot.items(&OTHER), &[2, 9]);
    assert_eq!(snapshot.section_of(&2), Some(&OTHER));
    assert_eq!(snapshot.len(), 3);
}

#[test]
fn duplicate_identities_in_target_keep_the_first() {
    let mut snapshot = Snapshot::new();
    let changeset = snapshot.apply(MAIN, &target(&[3, 1, 3]));
    assert_eq!(changeset.inserts, vec![3, 1]);
    assert_eq!(snapshot.index_of(&1), Some(1));
}

fn unique_ids() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..40, 0..30).prop_map(|ids| {
        let mut seen = HashSet::new();
        ids.into_iter().filter(|id| seen.insert(*id)).collect()
    })
}

proptest! {
    #[test]
    fn applying_the_same_target_twice_is_idempotent(before in unique_ids(), after in unique_ids()) {
        let mut snapshot = snapshot_of(&before);
        snapshot.apply(MAIN, &target(&after));
        prop_assert!(snapshot.apply(MAIN, &target(&after)).is_empty());
    }

    #[test]
    fn section_ends_in_target_order(before in unique_ids(), after in unique_ids()) {
        let mut snapshot = snapshot_of(&before);
        let changeset = snapshot.apply(MAIN, &target(&after));

        prop_assert_eq!(snapshot.items(&MAIN), after.as_slice());

        // untouched identities keep the relative order they had before
        let moved: HashSet<i64> = changeset.inserts.iter().copied().collect();
        let untouched: Vec<i64> = after.iter().copied().filter(|id| !moved.contains(id)).collect();
        let previous: Vec<i64> = before.iter().copied().filter(|id| untouched.contains(id)).collect();
        prop_assert_eq!(untouched, previous);
    }

    #[test]
    fn identities_are_unique_across_sections(
        first in unique_ids(),
        second in unique_ids(),
        third in unique_ids(),
    ) {
        let mut snapshot = Snapshot::new();
        snapshot.apply(MAIN, &target(&first));
        snapshot.apply(OTHER, &target(&second));
        snapshot.apply(MAIN, &target(&third));

        let all: Vec<i64> = snapshot.item_identifiers().copied().collect();
        let distinct: HashSet<i64> = all.iter().copied().collect();
        prop_assert_eq!(all.len(), distinct.len());
        prop_assert_eq!(all.len(), snapshot.len());
    }

    #[test]
    fn deletes_and_inserts_are_disjoint_from_reconfigures(before in unique_ids(), after in unique_ids()) {
        let snapshot = snapshot_of(&before);
        let changeset = snapshot.reconcile(&MAIN, &target(&after));
        for id in &changeset.reconfigures {
            prop_assert!(!changeset.deletes.contains(id));
            prop_assert!(!changeset.inserts.contains(id));
        }
    }
}
