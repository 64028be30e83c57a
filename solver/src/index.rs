//! Reference solver over a [`Universe`].
//!
//! This is a plain greedy matcher, not a backtracking search: each requirement is bound to an
//! already selected provider when one exists, otherwise to the highest-versioned candidate in
//! the universe, and the first choice is final. It is good enough for repositories without
//! conflicting alternatives and keeps the [`Solver`] seam exercised end to end.

use std::{collections::VecDeque, sync::Arc};

use indexmap::IndexMap;
use strata_model::{Capability, Component, ComponentId, Requirement, Wire, Wiring};
use tokio_util::sync::CancellationToken;

use crate::{SolveError, SolveFuture, Solver, UnmetRequirement, Universe};

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexSolver;

impl IndexSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for IndexSolver {
    fn solve<'a>(
        &'a self,
        requirements: &'a [Requirement],
        universe: &'a Universe,
        cancel: &'a CancellationToken,
    ) -> SolveFuture<'a> {
        Box::pin(solve(requirements, universe, cancel))
    }
}

struct Pending {
    requirer: Option<Arc<Component>>,
    requirement: Requirement,
    chain: Vec<ComponentId>,
}

async fn solve(
    requirements: &[Requirement],
    universe: &Universe,
    cancel: &CancellationToken,
) -> Result<Wiring, SolveError> {
    let mut selected: IndexMap<ComponentId, Arc<Component>> = IndexMap::new();
    let mut wires = Vec::new();
    let mut unmet = Vec::new();
    let mut optional = Vec::new();

    let mut queue: VecDeque<Pending> = requirements
        .iter()
        .map(|requirement| Pending {
            requirer: None,
            requirement: requirement.clone(),
            chain: Vec::new(),
        })
        .collect();

    while let Some(pending) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }

        let provider = selected_provider(&selected, &pending.requirement).or_else(|| {
            if pending.requirement.optional {
                return None;
            }
            best_candidate(universe, &pending.requirement)
        });

        let Some((provider, capability)) = provider else {
            if pending.requirement.optional {
                optional.push(pending);
            } else {
                tracing::debug!(requirement = %pending.requirement, "no provider");
                unmet.push(UnmetRequirement {
                    requirer: pending.requirer.as_ref().map(|c| c.id().clone()),
                    requirement: pending.requirement,
                    chain: pending.chain,
                });
            }
            continue;
        };

        if !selected.contains_key(provider.id()) {
            tracing::trace!(component = %provider.id(), "selected");
            selected.insert(provider.id().clone(), Arc::clone(&provider));
            let mut chain = pending.chain.clone();
            chain.push(provider.id().clone());
            for requirement in provider.requirements() {
                queue.push_back(Pending {
                    requirer: Some(Arc::clone(&provider)),
                    requirement: requirement.clone(),
                    chain: chain.clone(),
                });
            }
        }

        if let Some(requirer) = &pending.requirer {
            wires.push(Wire {
                requirer: requirer.id().clone(),
                requirement: pending.requirement,
                provider: provider.id().clone(),
                capability,
            });
        }

        tokio::task::yield_now().await;
    }

    // Optional requirements only wire to components that ended up selected anyway.
    for pending in optional {
        if let (Some(requirer), Some((provider, capability))) = (
            &pending.requirer,
            selected_provider(&selected, &pending.requirement),
        ) {
            wires.push(Wire {
                requirer: requirer.id().clone(),
                requirement: pending.requirement,
                provider: provider.id().clone(),
                capability,
            });
        }
    }

    if !unmet.is_empty() {
        return Err(SolveError::Unsatisfied { unmet });
    }

    let mut wiring = Wiring::new();
    for component in selected.into_values() {
        wiring.insert(component);
    }
    for wire in wires {
        wiring
            .add_wire(wire)
            .map_err(|err| SolveError::Failed(Box::new(err)))?;
    }
    Ok(wiring)
}

fn selected_provider(
    selected: &IndexMap<ComponentId, Arc<Component>>,
    requirement: &Requirement,
) -> Option<(Arc<Component>, Capability)> {
    selected.values().find_map(|component| {
        requirement
            .provided_by(component)
            .map(|capability| (Arc::clone(component), capability.clone()))
    })
}

fn best_candidate(
    universe: &Universe,
    requirement: &Requirement,
) -> Option<(Arc<Component>, Capability)> {
    let mut candidates = universe.providers(requirement);
    // Stable sort keeps universe order among equal versions.
    candidates.sort_by(|a, b| b.0.version().cmp(a.0.version()));
    candidates
        .into_iter()
        .next()
        .map(|(component, capability)| (Arc::clone(component), capability.clone()))
}

#[cfg(test)]
mod tests {
    use strata_model::{Filter, Requirement};
    use tokio_util::sync::CancellationToken;

    use super::IndexSolver;
    use crate::{
        SolveError, Solver,
        tests::{component, universe},
    };

    fn names(wiring: &strata_model::Wiring) -> Vec<String> {
        wiring
            .components()
            .map(|c| format!("{}@{}", c.name(), c.version()))
            .collect()
    }

    #[tokio::test]
    async fn wires_transitive_requirements() {
        let universe = universe(vec![
            component("app", (1, 0, 0), &[], &["Log"]),
            component("log", (1, 0, 0), &["Log"], &["Config"]),
            component("config", (1, 0, 0), &["Config"], &[]),
            component("unused", (1, 0, 0), &["Unused"], &[]),
        ]);

        let requirements = [Requirement::identity("app")];
        let wiring = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(names(&wiring), ["app@1.0.0", "log@1.0.0", "config@1.0.0"]);
        assert_eq!(wiring.wires().count(), 2);
        let app = wiring.components().next().unwrap();
        let wire = &wiring.get(app.id()).unwrap().wires[0];
        assert_eq!(&*wire.provider.name, "log");
    }

    #[tokio::test]
    async fn prefers_selected_then_highest_version() {
        let universe = universe(vec![
            component("app", (1, 0, 0), &[], &["Log"]),
            component("log", (1, 0, 0), &["Log"], &[]),
            component("log", (2, 1, 0), &["Log"], &[]),
        ]);

        let requirements = [Requirement::identity("app")];
        let wiring = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&wiring), ["app@1.0.0", "log@2.1.0"]);

        // Explicitly selecting log 1.0.0 first makes it the provider for app.
        let requirements = [
            Requirement::new(
                strata_model::IDENTITY_NAMESPACE,
                "(&(name=log)(version<=1.0.0))".parse::<Filter>().unwrap(),
            ),
            Requirement::identity("app"),
        ];
        let wiring = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&wiring), ["log@1.0.0", "app@1.0.0"]);
    }

    #[tokio::test]
    async fn reports_unmet_requirements_with_chain() {
        let universe = universe(vec![
            component("app", (1, 0, 0), &[], &["Log"]),
            component("log", (1, 0, 0), &["Log"], &["Missing"]),
        ]);

        let requirements = [Requirement::identity("app")];
        let err = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap_err();

        let SolveError::Unsatisfied { unmet } = err else {
            panic!("expected Unsatisfied");
        };
        assert_eq!(unmet.len(), 1);
        assert_eq!(&*unmet[0].requirer.as_ref().unwrap().name, "log");
        let chain: Vec<_> = unmet[0].chain.iter().map(|id| id.name.to_string()).collect();
        assert_eq!(chain, ["app", "log"]);
    }

    #[tokio::test]
    async fn optional_requirements_never_pull_components() {
        let optional = |service: &str| {
            Requirement::new("service", Filter::equal("objectClass", service)).optional()
        };
        let app = strata_model::RawComponent::from(component("app", (1, 0, 0), &[], &[]))
            .requirement(optional("Metrics"))
            .requirement(optional("Missing"))
            .validate()
            .unwrap();
        let universe = universe(vec![
            app,
            component("metrics", (1, 0, 0), &["Metrics"], &[]),
        ]);

        let requirements = [Requirement::identity("app")];
        let wiring = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&wiring), ["app@1.0.0"]);

        let requirements = [Requirement::identity("app"), Requirement::identity("metrics")];
        let wiring = IndexSolver
            .solve(&requirements, &universe, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&wiring), ["app@1.0.0", "metrics@1.0.0"]);
        assert_eq!(wiring.wires().count(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_resolution() {
        let universe = universe(vec![component("app", (1, 0, 0), &[], &[])]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let requirements = [Requirement::identity("app")];
        let err = IndexSolver
            .solve(&requirements, &universe, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SolveError::Cancelled));
    }
}
