//! Deterministic linearisation of a wiring.
//!
//! Components become graph nodes and every wire an edge from requirer to provider. Strongly
//! connected components collapse into a single ordering unit whose members keep (name, version)
//! order. Units are then emitted greedily: the unit with the fewest dependencies on units not
//! yet emitted goes first, ties broken by the earliest run requirement the unit satisfies and
//! finally by the unit's smallest component id.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use petgraph::{algo::tarjan_scc, graph::DiGraph};
use strata_model::{Component, ComponentId, Requirement, StartLevelOrder, Wiring};

pub fn order(
    wiring: &Wiring,
    requirements: &[Requirement],
    policy: StartLevelOrder,
) -> Vec<Arc<Component>> {
    match policy {
        StartLevelOrder::Random => wiring.components().cloned().collect(),
        StartLevelOrder::LeastDependenciesFirst => least_dependencies_first(wiring, requirements),
        StartLevelOrder::LeastDependenciesLast => {
            let mut order = least_dependencies_first(wiring, requirements);
            order.reverse();
            order
        }
    }
}

struct Unit {
    /// Node indices, ascending; nodes are numbered in component id order.
    members: Vec<usize>,
    dependencies: BTreeSet<usize>,
    rank: usize,
}

fn least_dependencies_first(wiring: &Wiring, requirements: &[Requirement]) -> Vec<Arc<Component>> {
    let mut nodes: Vec<&Arc<Component>> = wiring.components().collect();
    nodes.sort_by(|a, b| a.id().cmp(b.id()));
    let index: BTreeMap<&ComponentId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, component)| (component.id(), idx))
        .collect();

    let mut edges = BTreeSet::new();
    for wire in wiring.wires() {
        if let (Some(&from), Some(&to)) = (index.get(&wire.requirer), index.get(&wire.provider))
            && from != to
        {
            edges.insert((from, to));
        }
    }

    let mut graph = DiGraph::<(), ()>::with_capacity(nodes.len(), edges.len());
    let handles: Vec<_> = nodes.iter().map(|_| graph.add_node(())).collect();
    for &(from, to) in &edges {
        graph.add_edge(handles[from], handles[to], ());
    }

    let mut unit_of = vec![0; nodes.len()];
    let mut units: Vec<Unit> = tarjan_scc(&graph)
        .into_iter()
        .enumerate()
        .map(|(unit, scc)| {
            let mut members: Vec<usize> = scc.into_iter().map(|node| node.index()).collect();
            members.sort_unstable();
            for &member in &members {
                unit_of[member] = unit;
            }
            let rank = members
                .iter()
                .map(|&member| declaration_rank(nodes[member], requirements))
                .min()
                .unwrap_or(usize::MAX);
            Unit {
                members,
                dependencies: BTreeSet::new(),
                rank,
            }
        })
        .collect();

    for &(from, to) in &edges {
        let (from, to) = (unit_of[from], unit_of[to]);
        if from != to {
            units[from].dependencies.insert(to);
        }
    }

    let mut emitted = vec![false; units.len()];
    let mut order = Vec::with_capacity(nodes.len());
    for _ in 0..units.len() {
        let next = (0..units.len())
            .filter(|&unit| !emitted[unit])
            .min_by_key(|&unit| {
                let remaining = units[unit]
                    .dependencies
                    .iter()
                    .filter(|&&dep| !emitted[dep])
                    .count();
                (remaining, units[unit].rank, units[unit].members[0])
            });
        let Some(next) = next else { break };
        emitted[next] = true;
        order.extend(units[next].members.iter().map(|&member| Arc::clone(nodes[member])));
    }
    order
}

/// Index of the first run requirement `component` satisfies, or `usize::MAX`.
fn declaration_rank(component: &Component, requirements: &[Requirement]) -> usize {
    requirements
        .iter()
        .position(|requirement| requirement.provided_by(component).is_some())
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_model::{Component, Requirement, StartLevelOrder, Wire, Wiring};

    use super::order;
    use crate::testing::component;

    fn wire(from: &Arc<Component>, to: &Arc<Component>) -> Wire {
        let requirement = Requirement::identity(to.name());
        let capability = requirement.provided_by(to).unwrap().clone();
        Wire {
            requirer: from.id().clone(),
            requirement,
            provider: to.id().clone(),
            capability,
        }
    }

    fn names(order: &[Arc<Component>]) -> Vec<&str> {
        order.iter().map(|c| c.name()).collect()
    }

    fn shared(name: &str) -> Arc<Component> {
        Arc::new(component(name, &[], &[]))
    }

    #[test]
    fn providers_come_before_requirers() {
        let (a, b, c) = (shared("a"), shared("b"), shared("c"));
        let wiring = Wiring::from_parts([
            (Arc::clone(&a), vec![wire(&a, &b)]),
            (Arc::clone(&b), vec![wire(&b, &c)]),
            (Arc::clone(&c), vec![]),
        ])
        .unwrap();

        let first = order(&wiring, &[], StartLevelOrder::LeastDependenciesFirst);
        assert_eq!(names(&first), ["c", "b", "a"]);
        let last = order(&wiring, &[], StartLevelOrder::LeastDependenciesLast);
        assert_eq!(names(&last), ["a", "b", "c"]);
        let random = order(&wiring, &[], StartLevelOrder::Random);
        assert_eq!(names(&random), ["a", "b", "c"]);
    }

    #[test]
    fn independent_of_wiring_presentation_order() {
        let (a, b, c, d) = (shared("a"), shared("b"), shared("c"), shared("d"));
        let parts = vec![
            (Arc::clone(&a), vec![wire(&a, &c), wire(&a, &b), wire(&a, &b)]),
            (Arc::clone(&b), vec![wire(&b, &d), wire(&b, &b)]),
            (Arc::clone(&c), vec![wire(&c, &d)]),
            (Arc::clone(&d), vec![]),
        ];

        let mut expected = None;
        for rotation in 0..parts.len() {
            let mut parts = parts.clone();
            parts.rotate_left(rotation);
            for (_, wires) in &mut parts {
                wires.reverse();
            }
            let wiring = Wiring::from_parts(parts).unwrap();
            let first = order(&wiring, &[], StartLevelOrder::LeastDependenciesFirst);
            let first: Vec<String> = names(&first).into_iter().map(String::from).collect();
            match &expected {
                None => expected = Some(first),
                Some(expected) => assert_eq!(&first, expected),
            }
        }
        assert_eq!(expected.unwrap(), ["d", "b", "c", "a"]);
    }

    #[test]
    fn last_is_exact_reverse_of_first() {
        let (a, b, c, d) = (shared("a"), shared("b"), shared("c"), shared("d"));
        let wiring = Wiring::from_parts([
            (Arc::clone(&a), vec![wire(&a, &b)]),
            (Arc::clone(&b), vec![]),
            (Arc::clone(&c), vec![wire(&c, &b)]),
            (Arc::clone(&d), vec![]),
        ])
        .unwrap();

        let mut first = order(&wiring, &[], StartLevelOrder::LeastDependenciesFirst);
        let last = order(&wiring, &[], StartLevelOrder::LeastDependenciesLast);
        first.reverse();
        assert_eq!(names(&first), names(&last));
    }

    #[test]
    fn cycles_form_one_unit_in_name_order() {
        let (a, b, c, z) = (shared("a"), shared("b"), shared("c"), shared("z"));
        let wiring = Wiring::from_parts([
            (Arc::clone(&z), vec![wire(&z, &c)]),
            (Arc::clone(&c), vec![wire(&c, &b)]),
            (Arc::clone(&b), vec![wire(&b, &c)]),
            (Arc::clone(&a), vec![wire(&a, &z)]),
        ])
        .unwrap();

        let first = order(&wiring, &[], StartLevelOrder::LeastDependenciesFirst);
        assert_eq!(names(&first), ["b", "c", "z", "a"]);
    }

    #[test]
    fn ties_follow_run_requirement_order() {
        let (a, b, c) = (shared("a"), shared("b"), shared("c"));
        let wiring = Wiring::from_parts([
            (Arc::clone(&a), vec![]),
            (Arc::clone(&b), vec![]),
            (Arc::clone(&c), vec![]),
        ])
        .unwrap();

        let requirements = [Requirement::identity("c"), Requirement::identity("a")];
        let first = order(&wiring, &requirements, StartLevelOrder::LeastDependenciesFirst);
        // b matches no run requirement and sorts after the declared ones.
        assert_eq!(names(&first), ["c", "a", "b"]);
    }
}
