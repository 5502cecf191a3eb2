//! Property-based tests for the presence registry.
//!
//! Uses proptest to verify, under arbitrary sequences of joins, leaves and
//! roster snapshots:
//! 1. No identity is ever held twice, and the empty identity is never held.
//! 2. Joins and leaves behave like an insertion-ordered set.
//! 3. A snapshot never brings in the local user; only an earlier join does.

use huddle::chat::presence::PresenceRegistry;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Join(String),
    Leave(String),
    Snapshot(Vec<String>),
}

/// A small alphabet so operations collide often.
fn arb_identity() -> impl Strategy<Value = String> {
    "[abc]{0,2}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_identity().prop_map(Op::Join),
        2 => arb_identity().prop_map(Op::Leave),
        1 => prop::collection::vec(arb_identity(), 0..6).prop_map(Op::Snapshot),
    ]
}

fn has_duplicates(identities: &[String]) -> bool {
    identities
        .iter()
        .enumerate()
        .any(|(i, id)| identities[..i].contains(id))
}

proptest! {
    #[test]
    fn registry_never_holds_duplicates(
        local in arb_identity(),
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut registry = PresenceRegistry::new();
        for op in ops {
            match op {
                Op::Join(id) => { registry.add(&id); }
                Op::Leave(id) => { registry.remove(&id); }
                Op::Snapshot(ids) => { registry.replace_from_snapshot(&ids, &local); }
            }
            let identities = registry.identities();
            prop_assert!(!has_duplicates(&identities), "duplicates in {:?}", identities);
            prop_assert!(identities.iter().all(|id| !id.is_empty()));
            prop_assert_eq!(identities.len(), registry.len());
        }
    }

    #[test]
    fn joins_and_leaves_match_ordered_set(
        ops in prop::collection::vec(
            prop_oneof![
                arb_identity().prop_map(Op::Join),
                arb_identity().prop_map(Op::Leave),
            ],
            0..40,
        ),
    ) {
        let mut registry = PresenceRegistry::new();
        let mut model: Vec<String> = Vec::new();
        for op in ops {
            match op {
                Op::Join(id) => {
                    let expected = !id.is_empty() && !model.contains(&id);
                    if expected {
                        model.push(id.clone());
                    }
                    prop_assert_eq!(registry.add(&id), expected);
                }
                Op::Leave(id) => {
                    let expected = model.contains(&id);
                    model.retain(|m| m != &id);
                    prop_assert_eq!(registry.remove(&id), expected);
                }
                Op::Snapshot(_) => unreachable!(),
            }
            prop_assert_eq!(registry.identities(), model.clone());
        }
    }

    #[test]
    fn snapshot_keeps_local_only_if_already_present(
        local in "[abc]{1,2}",
        before in prop::collection::vec(arb_identity(), 0..6),
        snapshot in prop::collection::vec(arb_identity(), 1..6),
    ) {
        let mut registry = PresenceRegistry::new();
        for id in &before {
            registry.add(id);
        }
        let had_local = registry.contains(&local);

        registry.replace_from_snapshot(&snapshot, &local);

        prop_assert_eq!(registry.contains(&local), had_local);
        for id in snapshot.iter().filter(|id| !id.is_empty() && **id != local) {
            prop_assert!(registry.contains(id));
        }
        for id in registry.identities() {
            prop_assert!(id == local || snapshot.contains(&id));
        }
    }

    #[test]
    fn empty_snapshot_changes_nothing(
        local in arb_identity(),
        before in prop::collection::vec(arb_identity(), 0..6),
    ) {
        let mut registry = PresenceRegistry::new();
        for id in &before {
            registry.add(id);
        }
        let identities = registry.identities();

        prop_assert!(!registry.replace_from_snapshot(&[], &local));
        prop_assert_eq!(registry.identities(), identities);
    }
}
