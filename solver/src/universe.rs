use std::{collections::HashSet, sync::Arc};

use strata_model::{Capability, Component, ComponentId, Fingerprint, Repository, Requirement};
use url::Url;

/// The components available to a resolution, drawn from an ordered list of repositories.
///
/// When two repositories carry the same component identity, the earlier repository wins.
#[derive(Clone, Debug, Default)]
pub struct Universe {
    repositories: Arc<[Repository]>,
}

impl Universe {
    pub fn new<I>(repositories: I) -> Self
    where
        I: IntoIterator<Item = Repository>,
    {
        Self {
            repositories: repositories.into_iter().collect(),
        }
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Repository identities (URL and index digest), in repository order.
    pub fn identity(&self) -> Vec<(Url, Fingerprint)> {
        self.repositories
            .iter()
            .map(|repo| (repo.url().clone(), repo.digest()))
            .collect()
    }

    /// All distinct components, in repository then index order.
    pub fn components(&self) -> impl Iterator<Item = &Arc<Component>> {
        let mut seen: HashSet<&ComponentId> = HashSet::new();
        self.repositories
            .iter()
            .flat_map(|repo| repo.components().iter())
            .filter(move |component| seen.insert(component.id()))
    }

    /// Candidates whose capabilities satisfy `requirement`, in universe order.
    pub fn providers<'a>(
        &'a self,
        requirement: &Requirement,
    ) -> Vec<(&'a Arc<Component>, &'a Capability)> {
        self.components()
            .filter_map(|component| {
                requirement
                    .provided_by(component)
                    .map(|capability| (component, capability))
            })
            .collect()
    }
}
