//! Structural invariants of memory graphs.
//!
//! Every check is independent and logs what it found on failure. The
//! verifiers run all checks even after the first failure, so one log shows
//! every broken invariant at once.

use super::{CLangSmg, ObjectId, Smg, SymbolicValue};
use log::error;
use std::collections::BTreeSet;

fn check(holds: bool, message: &str) -> bool {
    if !holds {
        error!("inconsistent memory graph: {}", message);
    }

    holds
}

fn verify_null_object(smg: &Smg) -> bool {
    let null_objects = smg
        .objects()
        .filter(|(_, o)| o.is_null())
        .map(|(id, _)| id)
        .collect::<Vec<_>>();

    if !check(
        null_objects == vec![smg.null_object()],
        "there has to be exactly one null object",
    ) {
        return false;
    }

    let null = smg.null_object();
    let size_is_zero = smg.object(null).map_or(false, |o| o.size() == 0);
    let is_invalid = smg.is_object_valid(null) == Ok(false);
    let has_no_fields = smg.has_value_edges_of(null).next().is_none();

    check(size_is_zero, "null object has a non-zero size")
        & check(is_invalid, "null object is valid")
        & check(has_no_fields, "null object has a has-value edge")
}

fn verify_null_value(smg: &Smg) -> bool {
    let null = smg.null_object();

    let pointing_to_null = smg
        .points_to_edges()
        .filter(|e| e.object == null)
        .map(|e| e.value)
        .collect::<Vec<_>>();

    let null_value_target = smg.points_to_edge(SymbolicValue::NULL).map(|e| e.object);

    check(
        pointing_to_null == vec![SymbolicValue::NULL],
        "exactly the null value has to point to the null object",
    ) & check(
        null_value_target == Some(null),
        "null value does not point to the null object",
    )
}

fn verify_field_bounds(smg: &Smg) -> bool {
    let machine = smg.machine_model();

    smg.has_value_edges().fold(true, |ok, edge| {
        let within = smg
            .object(edge.object)
            .map_or(true, |o| edge.end(&machine) <= o.size());

        ok & check(
            within,
            &format!("has-value edge {} exceeds its object", edge),
        )
    })
}

fn verify_invalid_objects(smg: &Smg) -> bool {
    smg.has_value_edges().fold(true, |ok, edge| {
        let invalid = smg.is_object_valid(edge.object) == Ok(false);

        ok & check(
            !invalid || edge.object == smg.null_object(),
            &format!("invalid object {} has has-value edge {}", edge.object, edge),
        )
    })
}

fn verify_edge_endpoints(smg: &Smg) -> bool {
    let has_value_ok = smg.has_value_edges().fold(true, |ok, edge| {
        ok & check(
            smg.contains_object(edge.object) && smg.contains_value(edge.value),
            &format!("has-value edge {} references a missing node", edge),
        )
    });

    let points_to_ok = smg.points_to_edges().fold(true, |ok, edge| {
        ok & check(
            smg.contains_object(edge.object) && smg.contains_value(edge.value),
            &format!("points-to edge {} references a missing node", edge),
        )
    });

    let validity_ok = smg
        .objects()
        .all(|(id, _)| smg.is_object_valid(id).is_ok());

    has_value_ok
        & points_to_ok
        & check(validity_ok, "object without validity information")
}

fn verify_has_value_consistency(smg: &Smg) -> bool {
    let edges = smg.has_value_edges().collect::<Vec<_>>();

    let conflict = edges.iter().enumerate().find_map(|(i, e1)| {
        edges[i + 1..]
            .iter()
            .find(|e2| !e1.is_consistent_with(e2))
            .map(|e2| (*e1, *e2))
    });

    match conflict {
        Some((e1, e2)) => check(
            false,
            &format!("has-value edges {} and {} disagree", e1, e2),
        ),
        None => true,
    }
}

fn verify_points_to_consistency(smg: &Smg) -> bool {
    let edges = smg.points_to_edges().collect::<Vec<_>>();

    let conflict = edges.iter().enumerate().find_map(|(i, e1)| {
        edges[i + 1..]
            .iter()
            .find(|e2| !e1.is_consistent_with(e2))
            .map(|e2| (*e1, *e2))
    });

    match conflict {
        Some((e1, e2)) => check(
            false,
            &format!("points-to edges {} and {} are not one-to-one", e1, e2),
        ),
        None => true,
    }
}

/// Checks the invariants every memory graph has to satisfy.
pub fn verify_smg(smg: &Smg) -> bool {
    time_debug!("verified memory graph", {
        let results = [
            verify_null_object(smg),
            verify_null_value(smg),
            verify_field_bounds(smg),
            verify_invalid_objects(smg),
            verify_edge_endpoints(smg),
            verify_has_value_consistency(smg),
            verify_points_to_consistency(smg),
        ];

        results.iter().all(|ok| *ok)
    })
}

fn verify_disjoint_scopes(smg: &CLangSmg) -> bool {
    let heap = smg.heap_objects();
    let globals = smg.global_objects().values().copied().collect::<BTreeSet<_>>();
    let stack = smg.stack_objects();

    check(heap.is_disjoint(&globals), "heap and global objects overlap")
        & check(heap.is_disjoint(&stack), "heap and stack objects overlap")
        & check(globals.is_disjoint(&stack), "global and stack objects overlap")
}

fn verify_scopes_cover_graph(smg: &CLangSmg) -> bool {
    let mut scoped = smg.heap_objects().clone();
    scoped.extend(smg.global_objects().values().copied());
    scoped.extend(smg.stack_objects());

    check(
        scoped == smg.smg().object_ids(),
        "heap, global and stack objects do not add up to the graph's objects",
    )
}

fn verify_null_placement(smg: &CLangSmg) -> bool {
    let is_null = |id: &ObjectId| smg.smg().object(*id).map_or(false, |o| o.is_null());

    let null_in_stack = smg.stack_objects().iter().any(is_null);
    let null_in_globals = smg.global_objects().values().any(is_null);
    let null_in_heap = smg.heap_objects().iter().filter(|o| is_null(*o)).count();

    check(!null_in_stack, "null object on the stack")
        & check(!null_in_globals, "null object among the globals")
        & check(null_in_heap <= 1, "more than one null object on the heap")
        & check(
            smg.heap_objects().iter().filter(|o| is_null(*o)).all(|o| *o == smg.smg().null_object()),
            "heap contains a null object that is not the canonical one",
        )
}

fn verify_global_names(smg: &CLangSmg) -> bool {
    smg.global_objects().iter().fold(true, |ok, (name, id)| {
        let label_matches = smg.smg().object(*id).map_or(false, |o| o.label() == name.as_str());

        ok & check(
            label_matches,
            &format!("global `{}` maps to an object with a different label", name),
        )
    })
}

fn verify_stack_uniqueness(smg: &CLangSmg) -> bool {
    let mut seen = BTreeSet::new();

    let unique = smg
        .stack_frames()
        .iter()
        .flat_map(|frame| frame.objects())
        .all(|o| seen.insert(o));

    check(unique, "an object appears more than once on the stack")
}

/// Checks the core invariants plus the partitioning into stack, globals and heap.
pub fn verify_clang_smg(smg: &CLangSmg) -> bool {
    let results = [
        verify_smg(smg.smg()),
        verify_disjoint_scopes(smg),
        verify_scopes_cover_graph(smg),
        verify_null_placement(smg),
        verify_global_names(smg),
        verify_stack_uniqueness(smg),
    ];

    results.iter().all(|ok| *ok)
}
